use std::time::Duration;

use crate::resource::Reservation;

/// Tunables of the dial engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DialConfig {
	/// Attempts allowed in flight at once for a single peer.
	pub max_parallel_dials: usize,
	/// Deadline of each individual attempt.
	pub dial_timeout: Duration,
	/// Requests that can be queued on a peer's worker before `dial` waits for room.
	pub request_queue_capacity: usize,
	/// Budget reserved for each pending attempt.
	pub reservation: Reservation,
	/// Backoff after the first failure of an address, doubled for every further failure.
	pub backoff_base: Duration,
	pub backoff_max: Duration,
	/// Addresses with a failure record kept per peer.
	pub history_per_peer: usize,
	/// Peers with a failure history kept at once.
	pub history_peers: usize,
	/// Failure records older than this are forgotten.
	pub history_ttl: Duration,
}

impl Default for DialConfig {
	fn default() -> Self {
		Self {
			max_parallel_dials: 8,
			dial_timeout: Duration::from_secs(10),
			request_queue_capacity: 32,
			reservation: Reservation::default(),
			backoff_base: Duration::from_secs(5),
			backoff_max: Duration::from_secs(5 * 60),
			history_per_peer: 32,
			history_peers: 1024,
			history_ttl: Duration::from_secs(30 * 60),
		}
	}
}

impl DialConfig {
	pub fn with_max_parallel_dials(mut self, max_parallel_dials: usize) -> Self {
		self.max_parallel_dials = max_parallel_dials.max(1);
		self
	}

	pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
		self.dial_timeout = dial_timeout;
		self
	}

	pub fn with_request_queue_capacity(mut self, capacity: usize) -> Self {
		self.request_queue_capacity = capacity.max(1);
		self
	}

	pub fn with_reservation(mut self, reservation: Reservation) -> Self {
		self.reservation = reservation;
		self
	}

	pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
		self.backoff_base = base;
		self.backoff_max = max.max(base);
		self
	}

	pub fn with_history_limits(mut self, per_peer: usize, peers: usize, ttl: Duration) -> Self {
		self.history_per_peer = per_peer.max(1);
		self.history_peers = peers.max(1);
		self.history_ttl = ttl;
		self
	}

	/// Clamps values that would stall the engine. Applied when a node is built, so it also covers
	/// configs assembled field by field or deserialized.
	pub(crate) fn sanitized(mut self) -> Self {
		self.max_parallel_dials = self.max_parallel_dials.max(1);
		self.request_queue_capacity = self.request_queue_capacity.max(1);
		self.history_per_peer = self.history_per_peer.max(1);
		self.history_peers = self.history_peers.max(1);
		self.backoff_max = self.backoff_max.max(self.backoff_base);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = DialConfig::default();
		assert_eq!(config.max_parallel_dials, 8);
		assert_eq!(config.dial_timeout, Duration::from_secs(10));
		assert_eq!(config.request_queue_capacity, 32);
		assert_eq!(config.reservation, Reservation::default());
	}

	#[test]
	fn test_setters_clamp_to_one() {
		let config = DialConfig::default()
			.with_max_parallel_dials(0)
			.with_request_queue_capacity(0)
			.with_history_limits(0, 0, Duration::from_secs(1));
		assert_eq!(config.max_parallel_dials, 1);
		assert_eq!(config.request_queue_capacity, 1);
		assert_eq!(config.history_per_peer, 1);
		assert_eq!(config.history_peers, 1);
	}

	#[test]
	fn test_sanitized() {
		let config = DialConfig {
			max_parallel_dials: 0,
			request_queue_capacity: 0,
			backoff_base: Duration::from_secs(10),
			backoff_max: Duration::from_secs(1),
			..DialConfig::default()
		}
		.sanitized();

		assert_eq!(config.max_parallel_dials, 1);
		assert_eq!(config.request_queue_capacity, 1);
		assert_eq!(config.backoff_max, Duration::from_secs(10));
	}

	#[cfg(feature = "serde")]
	#[test]
	fn test_deserialize_partial() {
		let config: DialConfig = serde_json::from_str(r#"{"max_parallel_dials": 4}"#).unwrap();
		assert_eq!(config.max_parallel_dials, 4);
		assert_eq!(config.dial_timeout, DialConfig::default().dial_timeout);
	}
}
