use std::{
	collections::HashMap,
	sync::{Arc, RwLock}
};

pub type Key = String;
pub type Value = String;

/// Local storage of a node. Never routes, never looks at the ring.
pub trait KVStore {
	fn get(&self, key: &str) -> Option<Value>;
	fn put(&self, key: Key, value: Value);
	fn delete(&self, key: &str);
	fn entries(&self) -> Vec<(Key, Value)>;
}

/// Thread-safe key-value data store
#[derive(Clone, Default)]
pub struct DataStore {
	data: Arc<RwLock<HashMap<Key, Value>>>
}

impl DataStore {
	pub fn new() -> Self {
		DataStore {
			data: Arc::new(RwLock::new(HashMap::new()))
		}
	}
}

impl KVStore for DataStore {
	fn get(&self, key: &str) -> Option<Value> {
		let data = self.data.read().unwrap();
		data.get(key).cloned()
	}

	/// Insert or overwrite
	fn put(&self, key: Key, value: Value) {
		let mut data = self.data.write().unwrap();
		data.insert(key, value);
	}

	/// Remove the entry if present
	fn delete(&self, key: &str) {
		let mut data = self.data.write().unwrap();
		data.remove(key);
	}

	fn entries(&self) -> Vec<(Key, Value)> {
		let data = self.data.read().unwrap();
		let mut entries: Vec<_> = data.iter()
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect();
		entries.sort();
		entries
	}
}
