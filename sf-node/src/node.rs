use std::{io, sync::Arc, time::Duration};

use multiaddr::PeerId;
use tokio::time::Instant;
use tracing::{error, info};

use crate::{
	config::DialConfig,
	connection::Connection,
	dial::{DialRequest, manager::Manager},
	error::DialError,
};

/// Entry point for establishing connections to remote peers.
///
/// Cloning is cheap and every clone drives the same dial workers and connection registry.
#[derive(Clone)]
pub struct Node {
	manager: Arc<Manager>,
}

impl Node {
	pub(crate) fn new(manager: Manager) -> Self {
		Self {
			manager: Arc::new(manager),
		}
	}

	pub fn local_peer_id(&self) -> PeerId {
		self.manager.local_peer_id
	}

	pub fn config(&self) -> &DialConfig {
		&self.manager.config
	}

	/// Returns a connection to `peer_id`, dialing it if needed, waiting at most `timeout`.
	///
	/// Concurrent calls for the same peer share a single dial and receive the same connection.
	pub async fn dial(&self, peer_id: PeerId, timeout: Duration) -> Result<Connection, DialError> {
		self.dial_with_deadline(peer_id, Instant::now().checked_add(timeout))
			.await
	}

	/// Like [`Node::dial`], with an absolute deadline.
	pub async fn dial_until(&self, peer_id: PeerId, deadline: Instant) -> Result<Connection, DialError> {
		self.dial_with_deadline(peer_id, Some(deadline)).await
	}

	async fn dial_with_deadline(&self, peer_id: PeerId, deadline: Option<Instant>) -> Result<Connection, DialError> {
		info!(local_peer_id = %self.manager.local_peer_id, %peer_id, "Attempting to dial");

		let (request, response) = DialRequest::new(peer_id, deadline);
		self.submit(request).await;

		response
			.await
			.unwrap_or(Err(DialError::WorkerGone(peer_id)))
			.inspect_err(|e| {
				error!(local_peer_id = %self.manager.local_peer_id, %peer_id, %e, "Failed to dial");
			})
	}

	/// Hands a request to the worker owning its peer. The response arrives on the receiver returned
	/// by [`DialRequest::new`].
	pub async fn submit(&self, request: DialRequest) {
		if request.peer_id() == self.manager.local_peer_id {
			request.respond(Err(DialError::DialToSelf));
			return;
		}

		self.manager.submit(request).await;
	}

	/// The live connection to `peer_id`, if any.
	pub fn connection(&self, peer_id: &PeerId) -> Option<Connection> {
		self.manager.registry.lookup(peer_id)
	}

	pub fn connected_peers(&self) -> Vec<PeerId> {
		self.manager.registry.peers()
	}

	/// Closes the connection to `peer_id`. Returns `false` when there was none.
	pub async fn disconnect(&self, peer_id: &PeerId) -> io::Result<bool> {
		let Some(connection) = self.manager.registry.remove(peer_id) else {
			return Ok(false);
		};

		info!(%peer_id, "Disconnecting");
		connection.close().await?;
		Ok(true)
	}

	/// Whether a dial worker currently owns `peer_id`.
	pub fn is_dialing(&self, peer_id: &PeerId) -> bool {
		self.manager.workers.contains_key(peer_id)
	}

	/// Number of peers with a running dial worker.
	pub fn active_workers(&self) -> usize {
		self.manager.active_workers()
	}
}
