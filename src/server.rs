use crate::core::error::*;
use futures::future;
use log::debug;
use tokio::{sync::watch, task::JoinHandle};

/// Handle over the tasks of a running node (listener and stabilizer)
pub struct ServerManager {
	handle: future::JoinAll<JoinHandle<()>>,
	// true means shutdown
	tx: watch::Sender<bool>
}

impl ServerManager {
	pub fn new(tasks: Vec<JoinHandle<()>>, tx: watch::Sender<bool>) -> Self {
		ServerManager {
			// An aggregated handle for all tasks
			handle: future::join_all(tasks),
			tx
		}
	}

	/// Wait for every task of the node to terminate
	pub async fn wait(self) -> DhtResult<()> {
		self.handle.await
			.into_iter()
			.collect::<Result<Vec<_>, tokio::task::JoinError>>()?;

		Ok(())
	}

	/// Stop the listener and the stabilizer gracefully
	pub async fn stop(self) -> DhtResult<()> {
		if self.tx.is_closed() {
			// every task already returned
			debug!("tasks already stopped");
		}
		else {
			self.tx.send(true)?;
		}
		self.wait().await
	}
}
