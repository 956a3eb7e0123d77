use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
	time::{Duration, SystemTime}
};
use futures::{future::BoxFuture, FutureExt};
use log::debug;
use tarpc::{
	context,
	tokio_serde::formats::Bincode
};
use crate::{
	core::{
		port::*,
		error::*,
		ServiceError
	},
	rpc::NodeServiceClient
};

pub async fn setup_client(addr: &str) -> std::io::Result<NodeServiceClient> {
	let transport = tarpc::serde_transport::tcp::connect(addr, Bincode::default).await?;
	Ok(NodeServiceClient::new(tarpc::client::Config::default(), transport).spawn())
}

/// Remote port backed by tarpc over TCP.
/// Connections are cached per address and dropped when a call fails.
#[derive(Clone)]
pub struct TarpcPort {
	timeout: Duration,
	connection_map: Arc<RwLock<HashMap<String, NodeServiceClient>>>
}

impl TarpcPort {
	pub fn new(timeout_ms: u64) -> Self {
		TarpcPort {
			timeout: Duration::from_millis(timeout_ms),
			connection_map: Arc::new(RwLock::new(HashMap::new()))
		}
	}

	fn context(&self, deadline: SystemTime) -> context::Context {
		let mut ctx = context::current();
		ctx.deadline = deadline;
		ctx
	}

	async fn get_connection(&self, addr: &str) -> DhtResult<NodeServiceClient> {
		// Use block to drop map immediately after use
		{
			let map = self.connection_map.read().unwrap();
			if let Some(c) = map.get(addr) {
				// client can be cloned with lost cost
				return Ok(c.clone());
			}
		}

		debug!("connecting to {}", addr);
		let c = match tokio::time::timeout(self.timeout, setup_client(addr)).await {
			Ok(Ok(c)) => c,
			Ok(Err(e)) => return Err(unreachable(addr, e)),
			Err(_) => return Err(unreachable(addr, "connect timed out"))
		};
		debug!("connected to {}", addr);
		let mut map = self.connection_map.write().unwrap();
		map.insert(addr.to_string(), c.clone());
		Ok(c)
	}

	fn drop_connection(&self, addr: &str) {
		let mut map = self.connection_map.write().unwrap();
		map.remove(addr);
	}

	async fn call(&self, addr: &str, request: Request, deadline: SystemTime) -> DhtResult<Response> {
		let c = self.get_connection(addr).await?;
		let ctx = self.context(deadline);
		debug!("calling {} on {}", request.method(), addr);
		let response = match request {
			Request::Ping => {
				Response::Pong(c.ping_rpc(ctx).await.map_err(|e| unreachable(addr, e))?)
			},
			Request::GetPredecessor => {
				Response::Node(c.get_predecessor_rpc(ctx).await.map_err(|e| unreachable(addr, e))?)
			},
			Request::FindSuccessor { id, hops } => {
				let n = flatten(addr, c.find_successor_rpc(ctx, id, hops).await)?;
				Response::Node(Some(n))
			},
			Request::Notify(node) => {
				c.notify_rpc(ctx, node).await.map_err(|e| unreachable(addr, e))?;
				Response::Done
			},
			Request::Put { key, value, hops } => {
				flatten(addr, c.put_rpc(ctx, key, value, hops).await)?;
				Response::Done
			},
			Request::Get { key, hops } => {
				Response::Value(flatten(addr, c.get_rpc(ctx, key, hops).await)?)
			},
			Request::Delete { key, hops } => {
				flatten(addr, c.delete_rpc(ctx, key, hops).await)?;
				Response::Done
			}
		};
		Ok(response)
	}
}

impl RemotePort for TarpcPort {
	fn invoke<'a>(&'a self, addr: &'a str, request: Request) -> BoxFuture<'a, DhtResult<Response>> {
		self.invoke_until(addr, request, SystemTime::now() + self.timeout)
	}

	fn invoke_until<'a>(&'a self, addr: &'a str, request: Request, deadline: SystemTime) -> BoxFuture<'a, DhtResult<Response>> {
		async move {
			let result = self.call(addr, request, deadline).await;
			// Reconnect on the next call since the connection may be broken
			if let Err(DhtError::Unreachable { .. }) = &result {
				self.drop_connection(addr);
			}
			result
		}.boxed()
	}
}

fn unreachable(addr: &str, e: impl std::fmt::Display) -> DhtError {
	DhtError::Unreachable {
		addr: addr.to_string(),
		message: e.to_string()
	}
}

// Transport failures and expired deadlines both mean the peer did not answer
fn flatten<T>(addr: &str, r: Result<Result<T, ServiceError>, tarpc::client::RpcError>) -> DhtResult<T> {
	match r {
		Ok(Ok(v)) => Ok(v),
		Ok(Err(e)) => Err(DhtError::Service(e)),
		Err(e) => Err(unreachable(addr, e))
	}
}
