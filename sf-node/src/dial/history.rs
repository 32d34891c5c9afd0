use std::{collections::HashMap, time::Duration};

use dashmap::DashMap;
use multiaddr::{Multiaddr, PeerId};
use tokio::time::Instant;

use crate::{config::DialConfig, error::AttemptError};

/// Why and how often an address failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
	count: u32,
	last_failure: Instant,
	reason: String,
}

impl FailureRecord {
	pub fn count(&self) -> u32 {
		self.count
	}

	pub fn last_failure(&self) -> Instant {
		self.last_failure
	}

	pub fn reason(&self) -> &str {
		&self.reason
	}

	/// `base * 2^(count - 1)`, capped at `max`.
	pub(crate) fn backoff(&self, base: Duration, max: Duration) -> Duration {
		let exponent = self.count.saturating_sub(1).min(31);
		base.saturating_mul(1 << exponent).min(max)
	}
}

/// What is known about one peer's addresses from earlier dials.
#[derive(Debug, Clone, Default)]
pub(crate) struct PeerHistory {
	last_success: Option<Multiaddr>,
	failures: HashMap<Multiaddr, FailureRecord>,
}

impl PeerHistory {
	pub(crate) fn is_last_success(&self, address: &Multiaddr) -> bool {
		self.last_success.as_ref() == Some(address)
	}

	pub(crate) fn failure(&self, address: &Multiaddr) -> Option<&FailureRecord> {
		self.failures.get(address)
	}

	fn decay(&mut self, now: Instant, ttl: Duration) {
		self.failures
			.retain(|_, record| now.saturating_duration_since(record.last_failure) < ttl);
	}

	fn evict_oldest(&mut self, keep: usize) {
		while self.failures.len() > keep {
			let Some(oldest) = self
				.failures
				.iter()
				.min_by_key(|(_, record)| record.last_failure)
				.map(|(address, _)| address.clone())
			else {
				break;
			};
			self.failures.remove(&oldest);
		}
	}
}

#[derive(Debug)]
struct Entry {
	history: PeerHistory,
	touched: Instant,
}

/// Per-peer dial history kept for the lifetime of the process, bounded in peers, addresses per
/// peer and age.
#[derive(Debug)]
pub(crate) struct DialHistory {
	peers: DashMap<PeerId, Entry>,
	max_peers: usize,
	max_per_peer: usize,
	ttl: Duration,
}

impl DialHistory {
	pub(crate) fn new(config: &DialConfig) -> Self {
		Self {
			peers: DashMap::new(),
			max_peers: config.history_peers,
			max_per_peer: config.history_per_peer,
			ttl: config.history_ttl,
		}
	}

	pub(crate) fn snapshot(&self, peer_id: &PeerId) -> PeerHistory {
		let now = Instant::now();
		let Some(mut entry) = self.peers.get_mut(peer_id) else {
			return PeerHistory::default();
		};

		entry.touched = now;
		entry.history.decay(now, self.ttl);
		entry.history.clone()
	}

	pub(crate) fn record_failure(&self, peer_id: &PeerId, address: &Multiaddr, error: &AttemptError) {
		self.update(peer_id, |history, now| {
			if history.is_last_success(address) {
				history.last_success = None;
			}

			let record = history
				.failures
				.entry(address.clone())
				.or_insert_with(|| FailureRecord {
					count: 0,
					last_failure: now,
					reason: String::new(),
				});
			record.count = record.count.saturating_add(1);
			record.last_failure = now;
			record.reason = error.to_string();
		});
	}

	pub(crate) fn record_success(&self, peer_id: &PeerId, address: &Multiaddr) {
		self.update(peer_id, |history, _| {
			history.failures.remove(address);
			history.last_success = Some(address.clone());
		});
	}

	pub(crate) fn len(&self) -> usize {
		self.peers.len()
	}

	fn update(&self, peer_id: &PeerId, update: impl FnOnce(&mut PeerHistory, Instant)) {
		let now = Instant::now();
		self.make_room(peer_id);

		let mut entry = self.peers.entry(*peer_id).or_insert_with(|| Entry {
			history: PeerHistory::default(),
			touched: now,
		});
		entry.touched = now;
		entry.history.decay(now, self.ttl);
		update(&mut entry.history, now);
		entry.history.evict_oldest(self.max_per_peer);
	}

	// Must not be called while holding a reference into `peers`.
	fn make_room(&self, peer_id: &PeerId) {
		if self.peers.contains_key(peer_id) || self.peers.len() < self.max_peers {
			return;
		}

		let oldest = self
			.peers
			.iter()
			.min_by_key(|entry| entry.touched)
			.map(|entry| *entry.key());
		if let Some(oldest) = oldest {
			self.peers.remove(&oldest);
		}
	}
}
