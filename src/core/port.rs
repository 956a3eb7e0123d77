use std::time::SystemTime;
use futures::future::BoxFuture;
use super::{
	ring::Digest,
	data_store::{Key, Value},
	error::DhtResult,
	Node
};

/// Reply of the ping method
pub const PONG: &str = "pong!";

/// A method call on a remote node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
	Ping,
	GetPredecessor,
	FindSuccessor {
		id: Digest,
		hops: u32
	},
	Notify(Node),
	Put {
		key: Key,
		value: Value,
		hops: u32
	},
	Get {
		key: Key,
		hops: u32
	},
	Delete {
		key: Key,
		hops: u32
	}
}

impl Request {
	pub fn method(&self) -> &'static str {
		match self {
			Request::Ping => "ping",
			Request::GetPredecessor => "get_predecessor",
			Request::FindSuccessor { .. } => "find_successor",
			Request::Notify(_) => "notify",
			Request::Put { .. } => "put",
			Request::Get { .. } => "get",
			Request::Delete { .. } => "delete"
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
	Pong(String),
	Node(Option<Node>),
	Value(Option<Value>),
	Done
}

/// Delivers a request to the node listening at `addr`.
///
/// The caller blocks until a reply or a failure. Unreachable nodes,
/// expired deadlines and errors raised by the remote handler all come back
/// as `Err`, so an `Ok` reply is always a valid (possibly empty) answer.
/// The port never retries; that decision belongs to the caller.
pub trait RemotePort: Send + Sync {
	fn invoke<'a>(&'a self, addr: &'a str, request: Request) -> BoxFuture<'a, DhtResult<Response>>;

	/// Same as `invoke`, but the remote node must answer before `deadline`.
	/// Forwarded requests use it to stay within the deadline of the original call.
	fn invoke_until<'a>(&'a self, addr: &'a str, request: Request, _deadline: SystemTime) -> BoxFuture<'a, DhtResult<Response>> {
		self.invoke(addr, request)
	}
}
