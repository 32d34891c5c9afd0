use dashmap::{DashMap, mapref::entry::Entry};
use multiaddr::PeerId;
use tracing::{debug, warn};

use crate::connection::Connection;

/// Outcome of [`ConnectionRegistry::publish`].
#[derive(Debug)]
pub enum Publish {
	Accepted,
	/// Another live connection to the peer was already published; it is the canonical one.
	AlreadyPresent(Connection),
}

/// Holds at most one live connection per peer.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
	connections: DashMap<PeerId, Connection>,
}

impl ConnectionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// The live connection to `peer_id`, if any. A connection found closed is evicted.
	pub fn lookup(&self, peer_id: &PeerId) -> Option<Connection> {
		let connection = self.connections.get(peer_id).map(|entry| entry.value().clone())?;
		if !connection.is_closed() {
			return Some(connection);
		}

		self.connections
			.remove_if(peer_id, |_, current| current.ptr_eq(&connection));
		debug!(%peer_id, "evicted closed connection");
		None
	}

	/// Publishes `connection` unless a live one is already held for the same peer.
	pub fn publish(&self, connection: Connection) -> Publish {
		let peer_id = connection.peer_id();

		match self.connections.entry(peer_id) {
			Entry::Vacant(entry) => {
				entry.insert(connection);
				Publish::Accepted
			}
			Entry::Occupied(mut entry) if entry.get().is_closed() => {
				entry.insert(connection);
				Publish::Accepted
			}
			Entry::Occupied(entry) if entry.get().ptr_eq(&connection) => Publish::Accepted,
			Entry::Occupied(entry) => {
				warn!(%peer_id, address = %connection.remote_address(), "connection already published for peer");
				Publish::AlreadyPresent(entry.get().clone())
			}
		}
	}

	/// Removes the connection held for `peer_id` without closing it.
	pub fn remove(&self, peer_id: &PeerId) -> Option<Connection> {
		self.connections.remove(peer_id).map(|(_, connection)| connection)
	}

	pub fn peers(&self) -> Vec<PeerId> {
		self.connections
			.iter()
			.filter(|entry| !entry.value().is_closed())
			.map(|entry| *entry.key())
			.collect()
	}

	pub fn len(&self) -> usize {
		self.connections.len()
	}

	pub fn is_empty(&self) -> bool {
		self.connections.is_empty()
	}
}
