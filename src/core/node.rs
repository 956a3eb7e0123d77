use std::{
	fmt,
	sync::{Arc, RwLock},
	time::{Duration, SystemTime}
};
use tarpc::{
	context,
	tokio_serde::formats::Bincode,
	server::Channel
};
use serde::{Serialize, Deserialize};
use futures::{future, prelude::*};
use log::{info, warn, debug};
use super::{
	ring::*,
	config::*,
	data_store::*,
	port::*,
	error::{
		*,
		DhtError::*
	}
};
use crate::{rpc::*, server::ServerManager, client::TarpcPort};
use super::calculate_hash;

// Data part of the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
	pub id: Digest,
	pub addr: String
}

impl fmt::Display for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Node({}, {})", self.id, self.addr)
	}
}

/// Solitary until a successor has been set once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
	Solitary,
	Joined
}

struct RingState {
	membership: Membership,
	successor: Option<Node>,
	predecessor: Option<Node>,
	// consecutive rounds the successor failed to answer
	successor_failures: u32
}

impl RingState {
	// A node that lost both neighbours is a ring of one again
	fn leave_if_alone(&mut self) {
		if self.successor.is_none() && self.predecessor.is_none() {
			self.membership = Membership::Solitary;
		}
	}
}

/// Time kept back at each forward so the caller hears about a failure
/// further along the ring before its own deadline expires
const FORWARD_MARGIN: Duration = Duration::from_millis(50);

enum Route {
	Local,
	Forward(Node)
}

/// Snapshot of a node for diagnostics
#[derive(Debug, Clone)]
pub struct NodeStatus {
	pub node: Node,
	pub membership: Membership,
	pub successor: Option<Node>,
	pub predecessor: Option<Node>,
	pub entries: Vec<(Key, Value)>
}

impl fmt::Display for NodeStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "Table Data:")?;
		for (key, value) in self.entries.iter() {
			writeln!(f, "  {} => {}", key, value)?;
		}
		match self.successor.as_ref() {
			Some(n) => writeln!(f, "Successor: {}", n)?,
			None => writeln!(f, "Successor: <nil>")?
		};
		writeln!(f, "Self: {}", self.node.addr)?;
		match self.predecessor.as_ref() {
			Some(n) => writeln!(f, "Predecessor: {}", n)?,
			None => writeln!(f, "Predecessor: <nil>")?
		};
		writeln!(f, "Membership: {:?}", self.membership)?;
		write!(f, "Identifier: {}", self.node.id)
	}
}

#[derive(Clone)]
pub struct NodeServer {
	node: Node,
	store: DataStore,
	config: Config,
	// successor and predecessor are guarded together
	ring: Arc<RwLock<RingState>>,
	port: Arc<dyn RemotePort>
}

impl NodeServer {
	pub fn new(node: Node, config: Config) -> Self {
		let port = TarpcPort::new(config.rpc_timeout);
		Self::with_port(node, config, Arc::new(port))
	}

	pub fn with_port(node: Node, config: Config, port: Arc<dyn RemotePort>) -> Self {
		NodeServer {
			node,
			store: DataStore::new(),
			config,
			ring: Arc::new(RwLock::new(RingState {
				membership: Membership::Solitary,
				successor: None,
				predecessor: None,
				successor_failures: 0
			})),
			port
		}
	}

	pub fn node(&self) -> &Node {
		&self.node
	}

	pub fn membership(&self) -> Membership {
		self.ring.read().unwrap().membership
	}

	pub fn get_successor(&self) -> Option<Node> {
		self.ring.read().unwrap().successor.clone()
	}

	/// Setting a successor leaves the solitary state for good
	pub fn set_successor(&self, node: Option<Node>) {
		let mut ring = self.ring.write().unwrap();
		if node.is_some() {
			ring.membership = Membership::Joined;
		}
		ring.successor = node;
		ring.successor_failures = 0;
	}

	pub fn get_predecessor(&self) -> Option<Node> {
		self.ring.read().unwrap().predecessor.clone()
	}

	pub fn set_predecessor(&self, node: Option<Node>) {
		self.ring.write().unwrap().predecessor = node;
	}

	pub fn dump(&self) -> NodeStatus {
		let (membership, successor, predecessor) = {
			let ring = self.ring.read().unwrap();
			(ring.membership, ring.successor.clone(), ring.predecessor.clone())
		};
		NodeStatus {
			node: self.node.clone(),
			membership,
			successor,
			predecessor,
			entries: self.store.entries()
		}
	}

	/// Start a new ring with only this node
	pub async fn create(&self) -> DhtResult<ServerManager> {
		self.start(None).await
	}

	/// Start the server
	/// Returns if the listener starts
	pub async fn start(&self, join_node: Option<Node>) -> DhtResult<ServerManager> {
		// channel used to shutdown (true means shutdown)
		let (tx, rx) = tokio::sync::watch::channel(false);

		// Listen locally first
		let mut listener = tarpc::serde_transport::tcp::listen(&self.node.addr, Bincode::default).await?;
		let server = self.clone();
		let mut listener_rx = rx.clone();
		let channel_rx = rx.clone();
		// Listen for rpc call
		let listener_handle = tokio::spawn(async move {
			listener.config_mut().max_frame_length(usize::MAX);
			// Peers keep their connections open, so every channel
			// gets its own task instead of a bounded slot
			let listener_fut = listener
				.filter_map(|r| future::ready(r.ok()))
				.map(tarpc::server::BaseChannel::with_defaults)
				.for_each(|channel| {
					// Clone a new server to share the data in Arc
					let server = server.clone();
					let mut rx = channel_rx.clone();
					tokio::spawn(async move {
						tokio::select! {
							_ = channel.execute(server.serve()) => (),
							_ = rx.changed() => ()
						};
					});
					async {}
				});

			debug!("{}: listening", server.node);

			tokio::select! {
				_ = listener_fut => {
					warn!("{}: listener terminated", server.node);
				},
				_ = listener_rx.changed() => {
					debug!("{}: listener stopped gracefully", server.node);
				}
			};
		});

		// Join node after server starts
		if let Some(n) = join_node.as_ref() {
			if let Err(e) = self.join(n).await {
				// listener is useless without a ring
				tx.send(true).unwrap_or(());
				return Err(JoinFailure {
					node: n.clone(),
					message: e.to_string()
				});
			}
		}

		let stabilize_handle = self.spawn_stabilize_task(rx);

		info!("{}: listening at {}", self.node, self.node.addr);
		Ok(ServerManager::new(vec![listener_handle, stabilize_handle], tx))
	}

	/// Periodically stabilize until shutdown is signaled
	pub fn spawn_stabilize_task(&self, mut rx: tokio::sync::watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
		let server = self.clone();
		let stabilize_interval = self.config.stabilize_interval;
		tokio::spawn(async move {
			if stabilize_interval == 0 {
				return;
			}
			let mut interval = tokio::time::interval(
				tokio::time::Duration::from_millis(stabilize_interval)
			);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = interval.tick() => {
						// failures are retried in the next round
						if let Err(e) = server.stabilize().await {
							warn!("{}: fail to stabilize: {}", server.node, e);
						}
					},
					_ = rx.changed() => {
						debug!("{}: stabilize task stopped gracefully", server.node);
						break;
					}
				};
			}
		})
	}

	// Figure 7: n.join
	pub async fn join(&self, node: &Node) -> DhtResult<()> {
		debug!("{}: joining {}", self.node, node);
		self.set_predecessor(None);
		let succ = match self.config.join_mode {
			JoinMode::Direct => node.clone(),
			JoinMode::Lookup => {
				match self.port.invoke(&node.addr, Request::FindSuccessor { id: self.node.id, hops: 0 }).await? {
					Response::Node(Some(n)) => n,
					_ => return Err(UnexpectedReply("find_successor"))
				}
			}
		};
		debug!("{}: joined {} with successor {}", self.node, node, succ);
		self.set_successor(Some(succ));
		Ok(())
	}

	/// One round of pointer repair.
	///
	/// A node without successor but with a predecessor first falls back to its
	/// predecessor (keeps a two-node ring connected). Then the successor is asked
	/// for its predecessor, which may replace the successor, and is notified of
	/// this node. Finally the predecessor is checked for liveness.
	///
	/// Returns the first remote failure; pointers are left as they were in that case.
	pub async fn stabilize(&self) -> DhtResult<()> {
		{
			let mut ring = self.ring.write().unwrap();
			if ring.successor.is_none() {
				if let Some(p) = ring.predecessor.clone() {
					debug!("{}: no successor, falling back to predecessor {}", self.node, p);
					ring.successor = Some(p);
					ring.membership = Membership::Joined;
				}
			}
		}

		let result = match self.get_successor() {
			Some(succ) => self.stabilize_successor(succ).await,
			None => Ok(())
		};

		if self.config.check_predecessor {
			self.check_predecessor().await;
		}
		result
	}

	async fn stabilize_successor(&self, mut succ: Node) -> DhtResult<()> {
		let x = match self.port.invoke(&succ.addr, Request::GetPredecessor).await {
			Ok(Response::Node(x)) => x,
			Ok(_) => return Err(UnexpectedReply("get_predecessor")),
			Err(e) => {
				self.successor_failed(&succ);
				return Err(e);
			}
		};
		self.ring.write().unwrap().successor_failures = 0;

		if let Some(x) = x {
			if self.should_adopt(&x, &succ) {
				debug!("{}: new successor set in stabilize: {}", self.node, x);
				self.set_successor(Some(x.clone()));
				succ = x;
			}
		}

		match self.port.invoke(&succ.addr, Request::Notify(self.node.clone())).await? {
			Response::Done => Ok(()),
			_ => Err(UnexpectedReply("notify"))
		}
	}

	fn should_adopt(&self, x: &Node, succ: &Node) -> bool {
		if x.id == self.node.id {
			return false;
		}
		match self.config.protocol {
			Protocol::Strict => in_range(x.id, self.node.id, succ.id),
			Protocol::Lenient => true
		}
	}

	fn successor_failed(&self, succ: &Node) {
		let limit = self.config.successor_failure_limit;
		let mut ring = self.ring.write().unwrap();
		// successor changed concurrently
		if ring.successor.as_ref() != Some(succ) {
			return;
		}
		ring.successor_failures += 1;
		if limit > 0 && ring.successor_failures >= limit {
			warn!("{}: successor {} failed {} rounds, dropping it", self.node, succ, ring.successor_failures);
			ring.successor = None;
			ring.successor_failures = 0;
			ring.leave_if_alone();
		}
	}

	async fn check_predecessor(&self) {
		let pred = match self.get_predecessor() {
			Some(p) if p.id != self.node.id => p,
			_ => return
		};
		if let Err(e) = self.port.invoke(&pred.addr, Request::Ping).await {
			warn!("{}: predecessor {} is unreachable: {}", self.node, pred, e);
			let mut ring = self.ring.write().unwrap();
			if ring.predecessor.as_ref() == Some(&pred) {
				ring.predecessor = None;
				ring.leave_if_alone();
			}
		}
	}

	// Figure 7: n.notify
	pub fn notify(&self, node: Node) {
		let mut ring = self.ring.write().unwrap();
		match self.config.protocol {
			Protocol::Strict => {
				if let Some(p) = ring.predecessor.as_ref() {
					if !in_range(node.id, p.id, self.node.id) {
						return;
					}
				}
				debug!("{}: new predecessor set in notify: {}", self.node, node);
				ring.predecessor = Some(node);
			},
			Protocol::Lenient => {
				let replace = match ring.predecessor.as_ref() {
					Some(p) => p.id <= node.id,
					None => true
				};
				if replace {
					debug!("{}: new predecessor set in notify: {}", self.node, node);
					ring.predecessor = Some(node);
				}
				else {
					debug!("{}: new successor set in notify: {}", self.node, node);
					ring.successor = Some(node);
					ring.membership = Membership::Joined;
					ring.successor_failures = 0;
				}
			}
		};
	}

	// Deadline of a request started at this node
	fn deadline(&self) -> SystemTime {
		SystemTime::now() + Duration::from_millis(self.config.rpc_timeout)
	}

	async fn forward(&self, succ: &Node, request: Request, deadline: SystemTime) -> DhtResult<Response> {
		let deadline = deadline.checked_sub(FORWARD_MARGIN).unwrap_or(deadline);
		if deadline <= SystemTime::now() {
			return Err(DeadlineExceeded(request.method()));
		}
		self.port.invoke_until(&succ.addr, request, deadline).await
	}

	/// Walk successor pointers until the node responsible for id is found
	pub async fn find_successor(&self, id: Digest, hops: u32) -> DhtResult<Node> {
		self.find_successor_until(id, hops, self.deadline()).await
	}

	pub async fn find_successor_until(&self, id: Digest, hops: u32, deadline: SystemTime) -> DhtResult<Node> {
		let succ = match self.route(id, hops)? {
			Route::Local => return Ok(self.get_successor().unwrap_or_else(|| self.node.clone())),
			Route::Forward(succ) => succ
		};
		match self.forward(&succ, Request::FindSuccessor { id, hops: hops + 1 }, deadline).await? {
			Response::Node(Some(n)) => Ok(n),
			_ => Err(UnexpectedReply("find_successor"))
		}
	}

	// This node owns (self, successor]
	fn route(&self, id: Digest, hops: u32) -> DhtResult<Route> {
		if hops >= self.config.max_hops {
			return Err(HopLimit(self.config.max_hops));
		}
		let ring = self.ring.read().unwrap();
		match ring.successor.as_ref() {
			Some(succ) => {
				if in_range_incl(id, self.node.id, succ.id) {
					Ok(Route::Local)
				}
				else {
					Ok(Route::Forward(succ.clone()))
				}
			},
			None => match ring.membership {
				Membership::Solitary => Ok(Route::Local),
				Membership::Joined => Err(NoSuccessor)
			}
		}
	}

	pub fn get_local(&self, key: &str) -> Option<Value> {
		self.store.get(key)
	}

	// Put key on the ring
	pub async fn put(&self, key: Key, value: Value, hops: u32) -> DhtResult<()> {
		self.put_until(key, value, hops, self.deadline()).await
	}

	pub async fn put_until(&self, key: Key, value: Value, hops: u32, deadline: SystemTime) -> DhtResult<()> {
		let id = calculate_hash(key.as_bytes());
		match self.route(id, hops)? {
			Route::Local => {
				debug!("{}: storing key digest {}", self.node, id);
				self.store.put(key, value);
				Ok(())
			},
			Route::Forward(succ) => {
				debug!("{}: forwarding put of key digest {} to {}", self.node, id, succ);
				match self.forward(&succ, Request::Put { key, value, hops: hops + 1 }, deadline).await? {
					Response::Done => Ok(()),
					_ => Err(UnexpectedReply("put"))
				}
			}
		}
	}

	// Get key on the ring
	pub async fn get(&self, key: Key, hops: u32) -> DhtResult<Option<Value>> {
		self.get_until(key, hops, self.deadline()).await
	}

	pub async fn get_until(&self, key: Key, hops: u32, deadline: SystemTime) -> DhtResult<Option<Value>> {
		if !self.config.route_reads {
			return Ok(self.store.get(&key));
		}
		let id = calculate_hash(key.as_bytes());
		match self.route(id, hops)? {
			Route::Local => Ok(self.store.get(&key)),
			Route::Forward(succ) => {
				match self.forward(&succ, Request::Get { key, hops: hops + 1 }, deadline).await? {
					Response::Value(v) => Ok(v),
					_ => Err(UnexpectedReply("get"))
				}
			}
		}
	}

	// Delete key on the ring
	pub async fn delete(&self, key: Key, hops: u32) -> DhtResult<()> {
		self.delete_until(key, hops, self.deadline()).await
	}

	pub async fn delete_until(&self, key: Key, hops: u32, deadline: SystemTime) -> DhtResult<()> {
		if !self.config.route_reads {
			self.store.delete(&key);
			return Ok(());
		}
		let id = calculate_hash(key.as_bytes());
		match self.route(id, hops)? {
			Route::Local => {
				self.store.delete(&key);
				Ok(())
			},
			Route::Forward(succ) => {
				match self.forward(&succ, Request::Delete { key, hops: hops + 1 }, deadline).await? {
					Response::Done => Ok(()),
					_ => Err(UnexpectedReply("delete"))
				}
			}
		}
	}

	/// Ping the node at addr through the remote port
	pub async fn ping(&self, addr: &str) -> DhtResult<String> {
		match self.port.invoke(addr, Request::Ping).await? {
			Response::Pong(s) => Ok(s),
			_ => Err(UnexpectedReply("ping"))
		}
	}
}

#[tarpc::server]
impl NodeService for NodeServer {
	async fn ping_rpc(self, _: context::Context) -> String {
		debug!("{}: pinged", self.node);
		PONG.to_string()
	}

	async fn get_node_rpc(self, _: context::Context) -> Node {
		self.node.clone()
	}

	async fn get_predecessor_rpc(self, _: context::Context) -> Option<Node> {
		self.get_predecessor()
	}

	async fn get_successor_rpc(self, _: context::Context) -> Option<Node> {
		self.get_successor()
	}

	async fn find_successor_rpc(self, ctx: context::Context, id: Digest, hops: u32) -> Result<Node, ServiceError> {
		self.find_successor_until(id, hops, ctx.deadline).await.map_err(ServiceError::from)
	}

	async fn notify_rpc(self, _: context::Context, node: Node) {
		self.notify(node)
	}

	async fn get_local_rpc(self, _: context::Context, key: Key) -> Option<Value> {
		self.get_local(&key)
	}

	async fn put_rpc(self, ctx: context::Context, key: Key, value: Value, hops: u32) -> Result<(), ServiceError> {
		self.put_until(key, value, hops, ctx.deadline).await.map_err(ServiceError::from)
	}

	async fn get_rpc(self, ctx: context::Context, key: Key, hops: u32) -> Result<Option<Value>, ServiceError> {
		self.get_until(key, hops, ctx.deadline).await.map_err(ServiceError::from)
	}

	async fn delete_rpc(self, ctx: context::Context, key: Key, hops: u32) -> Result<(), ServiceError> {
		self.delete_until(key, hops, ctx.deadline).await.map_err(ServiceError::from)
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;
	use futures::future::BoxFuture;

	type Responder = Box<dyn Fn(&str, &Request) -> DhtResult<Response> + Send + Sync>;

	/// Records every call and answers with the responder
	struct MockPort {
		calls: Mutex<Vec<(String, Request)>>,
		deadlines: Mutex<Vec<SystemTime>>,
		responder: Responder
	}

	impl MockPort {
		fn new(responder: impl Fn(&str, &Request) -> DhtResult<Response> + Send + Sync + 'static) -> Arc<Self> {
			Arc::new(MockPort {
				calls: Mutex::new(Vec::new()),
				deadlines: Mutex::new(Vec::new()),
				responder: Box::new(responder)
			})
		}

		fn calls(&self) -> Vec<(String, Request)> {
			self.calls.lock().unwrap().clone()
		}
	}

	impl RemotePort for MockPort {
		fn invoke<'a>(&'a self, addr: &'a str, request: Request) -> BoxFuture<'a, DhtResult<Response>> {
			let reply = (self.responder)(addr, &request);
			self.calls.lock().unwrap().push((addr.to_string(), request));
			future::ready(reply).boxed()
		}

		fn invoke_until<'a>(&'a self, addr: &'a str, request: Request, deadline: SystemTime) -> BoxFuture<'a, DhtResult<Response>> {
			self.deadlines.lock().unwrap().push(deadline);
			self.invoke(addr, request)
		}
	}

	fn down(addr: &str, _: &Request) -> DhtResult<Response> {
		Err(Unreachable {
			addr: addr.to_string(),
			message: "connection refused".to_string()
		})
	}

	fn node(addr: &str, id: Digest) -> Node {
		Node {
			addr: addr.to_string(),
			id
		}
	}

	fn config() -> Config {
		Config {
			stabilize_interval: 0,
			..Config::default()
		}
	}

	#[tokio::test]
	async fn test_put_owned_key_stays_local() -> DhtResult<()> {
		let port = MockPort::new(down);
		let x = NodeServer::with_port(node("x:1", Digest::ZERO), config(), port.clone());
		x.set_successor(Some(node("y:1", Digest::MAX)));

		x.put("apple".to_string(), "red".to_string(), 0).await?;
		assert_eq!(x.get_local("apple").unwrap(), "red");
		assert!(port.calls().is_empty());
		Ok(())
	}

	#[tokio::test]
	async fn test_put_foreign_key_forwarded_once() -> DhtResult<()> {
		let port = MockPort::new(|_, _| Ok(Response::Done));
		// apple is the node's own id, outside (x, y]
		let x = NodeServer::with_port(node("x:1", calculate_hash(b"apple")), config(), port.clone());
		x.set_successor(Some(node("y:1", Digest::from(42))));

		x.put("apple".to_string(), "red".to_string(), 0).await?;
		assert_eq!(x.get_local("apple"), None);
		assert_eq!(port.calls(), vec![(
			"y:1".to_string(),
			Request::Put {
				key: "apple".to_string(),
				value: "red".to_string(),
				hops: 1
			}
		)]);
		Ok(())
	}

	#[tokio::test]
	async fn test_forward_failure_is_returned() {
		let port = MockPort::new(down);
		let x = NodeServer::with_port(node("x:1", calculate_hash(b"apple")), config(), port.clone());
		x.set_successor(Some(node("y:1", Digest::from(42))));

		let r = x.put("apple".to_string(), "red".to_string(), 0).await;
		assert!(matches!(r, Err(Unreachable { .. })));
		let r = x.get("apple".to_string(), 0).await;
		assert!(matches!(r, Err(Unreachable { .. })));
		assert_eq!(x.get_local("apple"), None);
	}

	#[tokio::test]
	async fn test_solitary_node_is_a_local_map() -> DhtResult<()> {
		let port = MockPort::new(down);
		let s = NodeServer::with_port(node("s:1", Digest::from(7)), config(), port.clone());
		assert_eq!(s.membership(), Membership::Solitary);

		for i in 0..20 {
			s.put(format!("key{}", i), format!("value{}", i), 0).await?;
		}
		for i in 0..20 {
			assert_eq!(s.get(format!("key{}", i), 0).await?.unwrap(), format!("value{}", i));
		}
		s.delete("key3".to_string(), 0).await?;
		s.delete("key3".to_string(), 0).await?;
		assert_eq!(s.get("key3".to_string(), 0).await?, None);
		assert!(port.calls().is_empty());

		// stabilizing alone contacts nobody
		s.stabilize().await?;
		assert_eq!(s.get_successor(), None);
		assert!(port.calls().is_empty());
		Ok(())
	}

	#[tokio::test]
	async fn test_joined_without_successor_refuses_writes() {
		let port = MockPort::new(down);
		let s = NodeServer::with_port(node("s:1", Digest::from(7)), config(), port);
		s.set_successor(Some(node("t:1", Digest::from(9))));
		s.set_successor(None);

		let r = s.put("apple".to_string(), "red".to_string(), 0).await;
		assert!(matches!(r, Err(NoSuccessor)));
		assert!(s.dump().entries.is_empty());
	}

	#[tokio::test]
	async fn test_hop_limit() {
		let port = MockPort::new(down);
		let s = NodeServer::with_port(node("s:1", Digest::from(7)), config(), port.clone());
		let r = s.put("apple".to_string(), "red".to_string(), Config::default().max_hops).await;
		assert!(matches!(r, Err(HopLimit(_))));
		assert!(port.calls().is_empty());
	}

	#[tokio::test]
	async fn test_local_reads() -> DhtResult<()> {
		let port = MockPort::new(down);
		let cfg = Config {
			route_reads: false,
			..config()
		};
		let x = NodeServer::with_port(node("x:1", calculate_hash(b"apple")), cfg, port.clone());
		x.set_successor(Some(node("y:1", Digest::from(42))));

		// never forwarded even though the key belongs elsewhere
		assert_eq!(x.get("apple".to_string(), 0).await?, None);
		x.delete("apple".to_string(), 0).await?;
		assert!(port.calls().is_empty());
		Ok(())
	}

	#[test]
	fn test_strict_notify() {
		let port = MockPort::new(down);
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), config(), port);

		s.notify(node("a:1", Digest::from(3)));
		assert_eq!(s.get_predecessor().unwrap().id, Digest::from(3));
		// closer to s
		s.notify(node("b:1", Digest::from(6)));
		assert_eq!(s.get_predecessor().unwrap().id, Digest::from(6));
		// farther away
		s.notify(node("a:1", Digest::from(3)));
		assert_eq!(s.get_predecessor().unwrap().id, Digest::from(6));
		assert_eq!(s.get_successor(), None);
	}

	#[test]
	fn test_lenient_notify() {
		let port = MockPort::new(down);
		let cfg = Config {
			protocol: Protocol::Lenient,
			..config()
		};
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), cfg, port);

		s.notify(node("b:1", Digest::from(6)));
		assert_eq!(s.get_predecessor().unwrap().id, Digest::from(6));
		s.notify(node("c:1", Digest::from(20)));
		assert_eq!(s.get_predecessor().unwrap().id, Digest::from(20));
		// rejected candidate becomes the successor
		s.notify(node("a:1", Digest::from(3)));
		assert_eq!(s.get_predecessor().unwrap().id, Digest::from(20));
		assert_eq!(s.get_successor().unwrap().id, Digest::from(3));
		assert_eq!(s.membership(), Membership::Joined);
	}

	#[tokio::test]
	async fn test_stabilize_adopts_closer_successor() -> DhtResult<()> {
		let closer = node("b:1", Digest::from(15));
		let reply = closer.clone();
		let port = MockPort::new(move |_, req| match req {
			Request::GetPredecessor => Ok(Response::Node(Some(reply.clone()))),
			_ => Ok(Response::Done)
		});
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), config(), port.clone());
		s.set_successor(Some(node("c:1", Digest::from(20))));

		s.stabilize().await?;
		assert_eq!(s.get_successor().unwrap(), closer);
		let calls = port.calls();
		assert_eq!(calls[0], ("c:1".to_string(), Request::GetPredecessor));
		assert_eq!(calls[1], ("b:1".to_string(), Request::Notify(s.node().clone())));
		Ok(())
	}

	#[tokio::test]
	async fn test_stabilize_keeps_successor() -> DhtResult<()> {
		let port = MockPort::new(|_, req| match req {
			// behind this node, not between it and its successor
			Request::GetPredecessor => Ok(Response::Node(Some(Node {
				addr: "a:1".to_string(),
				id: Digest::from(5)
			}))),
			_ => Ok(Response::Done)
		});
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), config(), port.clone());
		s.set_successor(Some(node("c:1", Digest::from(20))));
		s.stabilize().await?;
		assert_eq!(s.get_successor().unwrap().id, Digest::from(20));
		assert_eq!(port.calls()[1], ("c:1".to_string(), Request::Notify(s.node().clone())));
		Ok(())
	}

	#[tokio::test]
	async fn test_stabilize_ignores_self() -> DhtResult<()> {
		let me = node("s:1", Digest::from(10));
		let reply = me.clone();
		let cfg = Config {
			protocol: Protocol::Lenient,
			..config()
		};
		let port = MockPort::new(move |_, req| match req {
			Request::GetPredecessor => Ok(Response::Node(Some(reply.clone()))),
			_ => Ok(Response::Done)
		});
		let s = NodeServer::with_port(me, cfg, port);
		s.set_successor(Some(node("c:1", Digest::from(20))));
		s.stabilize().await?;
		assert_eq!(s.get_successor().unwrap().id, Digest::from(20));
		Ok(())
	}

	#[tokio::test]
	async fn test_stabilize_falls_back_to_predecessor() -> DhtResult<()> {
		let port = MockPort::new(|_, req| match req {
			Request::GetPredecessor => Ok(Response::Node(None)),
			Request::Ping => Ok(Response::Pong(PONG.to_string())),
			_ => Ok(Response::Done)
		});
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), config(), port.clone());
		s.notify(node("p:1", Digest::from(3)));
		s.stabilize().await?;

		assert_eq!(s.get_successor().unwrap().id, Digest::from(3));
		assert_eq!(s.membership(), Membership::Joined);
		assert!(port.calls().contains(&("p:1".to_string(), Request::Notify(s.node().clone()))));
		Ok(())
	}

	#[tokio::test]
	async fn test_stabilize_tolerates_failures() {
		let port = MockPort::new(down);
		let cfg = Config {
			successor_failure_limit: 2,
			..config()
		};
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), cfg, port.clone());
		s.set_successor(Some(node("c:1", Digest::from(20))));

		assert!(s.stabilize().await.is_err());
		assert_eq!(s.get_successor().unwrap().id, Digest::from(20));
		assert!(s.stabilize().await.is_err());
		// dropped after two failed rounds
		assert_eq!(s.get_successor(), None);
		assert_eq!(port.calls().len(), 2);
	}

	#[tokio::test]
	async fn test_unreachable_predecessor_is_cleared() -> DhtResult<()> {
		let port = MockPort::new(down);
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), config(), port.clone());
		s.notify(node("p:1", Digest::from(3)));
		s.set_successor(None);

		// fallback to p fails, then p fails the ping
		assert!(s.stabilize().await.is_err());
		assert_eq!(s.get_predecessor(), None);
		Ok(())
	}

	#[tokio::test]
	async fn test_orphaned_node_becomes_solitary() -> DhtResult<()> {
		let port = MockPort::new(down);
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), config(), port.clone());
		let b = node("b:1", Digest::from(20));
		s.set_successor(Some(b.clone()));
		s.notify(b);

		for _ in 0..4 {
			let _ = s.stabilize().await;
		}
		assert_eq!(s.get_successor(), None);
		assert_eq!(s.get_predecessor(), None);
		assert_eq!(s.membership(), Membership::Solitary);

		// serves the whole ring again
		let calls = port.calls().len();
		s.put("apple".to_string(), "red".to_string(), 0).await?;
		assert_eq!(s.get_local("apple").unwrap(), "red");
		assert_eq!(s.find_successor(Digest::from(99), 0).await?, s.node().clone());
		assert_eq!(port.calls().len(), calls);
		Ok(())
	}

	#[tokio::test]
	async fn test_forward_keeps_caller_deadline() -> DhtResult<()> {
		let port = MockPort::new(|_, _| Ok(Response::Done));
		let x = NodeServer::with_port(node("x:1", calculate_hash(b"apple")), config(), port.clone());
		x.set_successor(Some(node("y:1", Digest::from(42))));

		let deadline = SystemTime::now() + Duration::from_secs(2);
		x.put_until("apple".to_string(), "red".to_string(), 1, deadline).await?;
		let forwarded = port.deadlines.lock().unwrap().clone();
		assert_eq!(forwarded.len(), 1);
		assert!(forwarded[0] < deadline);
		assert!(forwarded[0] > SystemTime::now());

		// nothing is sent once the deadline has passed
		let r = x.get_until("apple".to_string(), 1, SystemTime::now()).await;
		assert!(matches!(r, Err(DeadlineExceeded("get"))));
		assert_eq!(port.calls().len(), 1);
		Ok(())
	}

	#[tokio::test]
	async fn test_stabilize_task_survives_failures() {
		let port = MockPort::new(down);
		let cfg = Config {
			stabilize_interval: 10,
			successor_failure_limit: 0,
			..config()
		};
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), cfg, port.clone());
		s.set_successor(Some(node("c:1", Digest::from(20))));

		let (tx, rx) = tokio::sync::watch::channel(false);
		let handle = s.spawn_stabilize_task(rx);
		tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
		assert!(port.calls().len() >= 3);
		assert!(!handle.is_finished());

		tx.send(true).unwrap();
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn test_join_modes() -> DhtResult<()> {
		let found = node("b:1", Digest::from(15));
		let reply = found.clone();
		let port = MockPort::new(move |_, req| match req {
			Request::FindSuccessor { .. } => Ok(Response::Node(Some(reply.clone()))),
			_ => Ok(Response::Done)
		});
		let known = node("a:1", Digest::from(3));

		let s = NodeServer::with_port(node("s:1", Digest::from(10)), config(), port.clone());
		s.join(&known).await?;
		assert_eq!(s.get_successor().unwrap(), found);
		assert_eq!(port.calls(), vec![(
			"a:1".to_string(),
			Request::FindSuccessor { id: Digest::from(10), hops: 0 }
		)]);

		let cfg = Config {
			join_mode: JoinMode::Direct,
			..config()
		};
		let d = NodeServer::with_port(node("d:1", Digest::from(11)), cfg, port.clone());
		d.join(&known).await?;
		assert_eq!(d.get_successor().unwrap(), known);
		assert_eq!(port.calls().len(), 1);
		Ok(())
	}

	#[tokio::test]
	async fn test_find_successor() -> DhtResult<()> {
		let port = MockPort::new(|_, _| Ok(Response::Node(Some(Node {
			addr: "far:1".to_string(),
			id: Digest::from(100)
		}))));
		let s = NodeServer::with_port(node("s:1", Digest::from(10)), config(), port.clone());
		// alone: owns everything
		assert_eq!(s.find_successor(Digest::from(50), 0).await?.id, Digest::from(10));

		s.set_successor(Some(node("c:1", Digest::from(20))));
		assert_eq!(s.find_successor(Digest::from(15), 0).await?.id, Digest::from(20));
		assert_eq!(s.find_successor(Digest::from(50), 0).await?.id, Digest::from(100));
		assert_eq!(port.calls(), vec![(
			"c:1".to_string(),
			Request::FindSuccessor { id: Digest::from(50), hops: 1 }
		)]);
		Ok(())
	}
}
