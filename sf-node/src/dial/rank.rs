use std::{cmp::Ordering, time::Duration};

use multiaddr::Multiaddr;
use sf_core::Protocol;
use tokio::time::Instant;

use crate::dial::history::{FailureRecord, PeerHistory};

/// An address of the peer being dialed, along with what earlier dials taught us about it.
#[derive(Debug, Clone)]
pub struct Candidate {
	address: Multiaddr,
	protocol: Option<Protocol>,
	last_good: bool,
	failure: Option<FailureRecord>,
	backed_off: bool,
}

impl Candidate {
	pub(crate) fn new(
		address: Multiaddr,
		history: &PeerHistory,
		now: Instant,
		backoff_base: Duration,
		backoff_max: Duration,
	) -> Self {
		let failure = history.failure(&address).cloned();
		let backed_off = failure.as_ref().is_some_and(|record| {
			now.saturating_duration_since(record.last_failure()) < record.backoff(backoff_base, backoff_max)
		});

		Self {
			protocol: Protocol::from_multiaddr(&address),
			last_good: history.is_last_success(&address),
			address,
			failure,
			backed_off,
		}
	}

	pub fn address(&self) -> &Multiaddr {
		&self.address
	}

	pub(crate) fn into_address(self) -> Multiaddr {
		self.address
	}

	/// The transport tag of the address, `None` when no known transport could dial it.
	pub fn protocol(&self) -> Option<Protocol> {
		self.protocol
	}

	/// The last successful dial to this peer went through this address.
	pub fn is_last_good(&self) -> bool {
		self.last_good
	}

	pub fn failure(&self) -> Option<&FailureRecord> {
		self.failure.as_ref()
	}

	pub fn failures(&self) -> u32 {
		self.failure.as_ref().map_or(0, FailureRecord::count)
	}

	/// The address failed recently enough to still be inside its backoff window.
	pub fn is_backed_off(&self) -> bool {
		self.backed_off
	}
}

/// Orders the candidate addresses of a dial cycle. Addresses comparing `Less` are tried first.
///
/// Ranking only reorders: a backed off address is still dialed once better ones are exhausted.
///
/// `compare` must be a total order. The sort may panic otherwise, taking the peer's dial worker
/// down with it.
pub trait AddressRanker: Send + Sync + 'static {
	fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering;
}

impl<F> AddressRanker for F
where
	F: Fn(&Candidate, &Candidate) -> Ordering + Send + Sync + 'static,
{
	fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
		self(a, b)
	}
}

/// Last known good address first, then addresses outside their backoff window, then by transport
/// preference, then by fewest recorded failures.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRanker;

impl AddressRanker for DefaultRanker {
	fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
		b.is_last_good()
			.cmp(&a.is_last_good())
			.then_with(|| a.is_backed_off().cmp(&b.is_backed_off()))
			.then_with(|| transport_preference(a.protocol()).cmp(&transport_preference(b.protocol())))
			.then_with(|| a.failures().cmp(&b.failures()))
	}
}

fn transport_preference(protocol: Option<Protocol>) -> u8 {
	match protocol {
		Some(Protocol::Memory) => 0,
		Some(Protocol::Quic) => 1,
		Some(Protocol::WebTransport) => 2,
		Some(Protocol::Tcp) => 3,
		Some(Protocol::WebSocket) => 4,
		Some(Protocol::WebRTC) => 5,
		None => u8::MAX,
	}
}

/// Stable: candidates the ranker considers equal keep address book order.
pub(crate) fn rank(ranker: &dyn AddressRanker, candidates: &mut [Candidate]) {
	candidates.sort_by(|a, b| ranker.compare(a, b));
}
