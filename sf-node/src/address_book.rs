use std::{collections::HashMap, time::Duration};

use dashmap::DashMap;
use multiaddr::{Multiaddr, PeerId};
use tokio::time::Instant;

/// TTL for addresses that never expire.
pub const PERMANENT_ADDR_TTL: Duration = Duration::MAX;

/// Source of candidate addresses for a peer.
///
/// The dial worker reads it once per cycle; updates made meanwhile are seen by the next cycle.
pub trait AddressBook: Send + Sync + 'static {
	fn addresses_for(&self, peer_id: &PeerId) -> Vec<Multiaddr>;
}

/// In-memory [`AddressBook`] where every address carries an expiry.
#[derive(Debug, Default)]
pub struct MemoryAddressBook {
	peers: DashMap<PeerId, HashMap<Multiaddr, Option<Instant>>>,
}

impl MemoryAddressBook {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `address` for `peer_id`, valid for `ttl`. Re-adding an address only ever extends its validity.
	pub fn add_address(&self, peer_id: PeerId, address: Multiaddr, ttl: Duration) {
		let expires_at = Instant::now().checked_add(ttl);
		let mut addresses = self.peers.entry(peer_id).or_default();

		match addresses.get_mut(&address) {
			Some(current) => {
				*current = match (*current, expires_at) {
					(None, _) | (_, None) => None,
					(Some(current), Some(new)) => Some(current.max(new)),
				};
			}
			None => {
				addresses.insert(address, expires_at);
			}
		}
	}

	pub fn add_addresses(&self, peer_id: PeerId, addresses: impl IntoIterator<Item = Multiaddr>, ttl: Duration) {
		for address in addresses {
			self.add_address(peer_id, address, ttl);
		}
	}

	pub fn remove_address(&self, peer_id: &PeerId, address: &Multiaddr) {
		self.peers.remove_if_mut(peer_id, |_, addresses| {
			addresses.remove(address);
			addresses.is_empty()
		});
	}

	pub fn clear_peer(&self, peer_id: &PeerId) {
		self.peers.remove(peer_id);
	}
}

impl AddressBook for MemoryAddressBook {
	fn addresses_for(&self, peer_id: &PeerId) -> Vec<Multiaddr> {
		let now = Instant::now();
		let live: Vec<_> = {
			let Some(mut addresses) = self.peers.get_mut(peer_id) else {
				return Vec::new();
			};

			addresses.retain(|_, expires_at| expires_at.is_none_or(|at| at > now));
			addresses.keys().cloned().collect()
		};

		if live.is_empty() {
			self.peers.remove_if(peer_id, |_, addresses| addresses.is_empty());
		}
		live
	}
}
