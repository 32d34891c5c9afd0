use std::{fmt, io, sync::Arc, time::Duration};

use multiaddr::{Multiaddr, PeerId};
use sf_core::Protocol;

use crate::resource::ResourceError;

/// Error returned to a caller of [`Node::dial`](crate::Node::dial).
///
/// Cloneable so that one outcome can be handed to every request coalesced on the same dial cycle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DialError {
	#[error("no dialable addresses for peer {0}")]
	NoAddresses(PeerId),

	#[error(transparent)]
	Aggregate(Arc<AggregateDialError>),

	#[error("caller gave up waiting for a connection to {0}")]
	CallerCancelled(PeerId),

	#[error("refusing to dial the local peer")]
	DialToSelf,

	#[error("dial worker for {0} stopped without answering")]
	WorkerGone(PeerId),
}

impl DialError {
	/// The per-address failures, if every address of a cycle failed.
	pub fn attempts(&self) -> Option<&AggregateDialError> {
		match self {
			Self::Aggregate(aggregate) => Some(aggregate),
			_ => None,
		}
	}
}

/// Failure of a single dial attempt on one address.
///
/// These never reach a caller on their own; they are collected into an [`AggregateDialError`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttemptError {
	#[error("no transport registered for address")]
	UnsupportedTransport,

	#[error("{0} transport does not support this address")]
	AddressNotSupported(Protocol),

	#[error("resource limit reached: {0}")]
	ResourceExhausted(#[source] ResourceError),

	#[error("timed out after {0:?}")]
	Timeout(Duration),

	#[error("transport failure: {0}")]
	Transport(#[source] Arc<io::Error>),
}

impl AttemptError {
	/// Whether the failure says something about the reachability of the address.
	pub(crate) fn is_address_failure(&self) -> bool {
		matches!(self, Self::Timeout(_) | Self::Transport(_))
	}
}

impl From<io::Error> for AttemptError {
	fn from(error: io::Error) -> Self {
		Self::Transport(Arc::new(error))
	}
}

/// Every address tried during one dial cycle failed.
#[derive(Debug)]
pub struct AggregateDialError {
	peer_id: PeerId,
	failures: Vec<(Multiaddr, AttemptError)>,
}

impl AggregateDialError {
	pub(crate) fn new(peer_id: PeerId, failures: Vec<(Multiaddr, AttemptError)>) -> Self {
		Self { peer_id, failures }
	}

	pub fn peer_id(&self) -> PeerId {
		self.peer_id
	}

	/// One entry per attempted address, in completion order.
	pub fn failures(&self) -> &[(Multiaddr, AttemptError)] {
		&self.failures
	}

	pub fn len(&self) -> usize {
		self.failures.len()
	}

	pub fn is_empty(&self) -> bool {
		self.failures.is_empty()
	}
}

impl fmt::Display for AggregateDialError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "failed to dial {}: all {} addresses failed", self.peer_id, self.failures.len())?;
		for (address, error) in &self.failures {
			write!(f, "\n  * [{address}] {error}")?;
		}
		Ok(())
	}
}

impl std::error::Error for AggregateDialError {}
