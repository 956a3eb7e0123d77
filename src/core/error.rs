use thiserror::Error;
use serde::{Serialize, Deserialize};
use std::result::Result;
use super::Node;

/// Failure reported back by a remote handler.
/// Crosses the wire inside rpc replies.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceError {
	#[error("cannot reach {addr}: {message}")]
	Unreachable {
		addr: String,
		message: String
	},
	#[error("no successor known")]
	NoSuccessor,
	#[error("request forwarded more than {0} times")]
	HopLimit(u32),
	#[error("deadline passed before forwarding {0}")]
	DeadlineExceeded(String),
	#[error("{0}")]
	Internal(String)
}

#[derive(Error, Debug)]
pub enum DhtError {
	#[error("cannot reach {addr}: {message}")]
	Unreachable {
		addr: String,
		message: String
	},
	#[error("no successor known")]
	NoSuccessor,
	#[error("request forwarded more than {0} times")]
	HopLimit(u32),
	#[error("deadline passed before forwarding {0}")]
	DeadlineExceeded(&'static str),
	#[error("remote error: {0}")]
	Service(#[from] ServiceError),
	#[error("fail to join {node}: {message}")]
	JoinFailure {
		node: Node,
		message: String
	},
	#[error("unexpected reply to {0}")]
	UnexpectedReply(&'static str),
	#[error("IO error")]
	IoError(#[from] std::io::Error),
	#[error("task error")]
	TaskError(#[from] tokio::task::JoinError),
	#[error("fail to signal shutdown")]
	ShutdownError(#[from] tokio::sync::watch::error::SendError<bool>)
}

pub type DhtResult<T> = Result<T, DhtError>;

impl From<DhtError> for ServiceError {
	fn from(e: DhtError) -> Self {
		match e {
			DhtError::Service(e) => e,
			DhtError::Unreachable { addr, message } => ServiceError::Unreachable { addr, message },
			DhtError::NoSuccessor => ServiceError::NoSuccessor,
			DhtError::HopLimit(n) => ServiceError::HopLimit(n),
			DhtError::DeadlineExceeded(m) => ServiceError::DeadlineExceeded(m.to_string()),
			e => ServiceError::Internal(e.to_string())
		}
	}
}
