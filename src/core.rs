pub mod node;
pub mod ring;
pub mod config;
pub mod data_store;
pub mod error;
pub mod port;

pub use node::*;
pub use config::*;
pub use error::*;

use sha1::{Digest as _, Sha1};
use self::ring::{Digest, DIGEST_BYTES};

/// SHA-1 of the input interpreted as a 160-bit big-endian integer
pub fn calculate_hash(data: &[u8]) -> Digest {
	let mut hasher = Sha1::new();
	hasher.update(data);
	let mut bytes = [0u8; DIGEST_BYTES];
	bytes.copy_from_slice(&hasher.finalize());
	Digest::new(bytes)
}

pub fn construct_node(addr: &str) -> Node {
	Node {
		addr: addr.to_string(),
		id: calculate_hash(addr.as_bytes())
	}
}
