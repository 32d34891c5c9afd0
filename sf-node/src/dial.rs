use multiaddr::PeerId;
use tokio::{sync::oneshot, time::Instant};

use crate::{connection::Connection, error::DialError};

pub(crate) mod history;
pub(crate) mod manager;
pub(crate) mod rank;
pub(crate) mod task;
pub(crate) mod worker;

/// Outcome delivered to every request of a dial cycle.
pub type DialResponse = Result<Connection, DialError>;

/// A caller's demand for a connection to one peer.
///
/// Consumed exactly once by the worker owning the peer: [`DialRequest::respond`] takes the request
/// by value, so a reply can neither be skipped silently nor sent twice.
#[derive(Debug)]
pub struct DialRequest {
	peer_id: PeerId,
	deadline: Option<Instant>,
	reply: oneshot::Sender<DialResponse>,
}

impl DialRequest {
	/// Creates a request and the receiver its response will be delivered on. Dropping the receiver
	/// cancels the request.
	pub fn new(peer_id: PeerId, deadline: Option<Instant>) -> (Self, oneshot::Receiver<DialResponse>) {
		let (reply, response) = oneshot::channel();
		(
			Self {
				peer_id,
				deadline,
				reply,
			},
			response,
		)
	}

	pub fn peer_id(&self) -> PeerId {
		self.peer_id
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	pub(crate) fn is_expired(&self, now: Instant) -> bool {
		self.deadline.is_some_and(|deadline| deadline <= now)
	}

	/// The caller dropped its receiver and no longer waits for an answer.
	pub(crate) fn is_abandoned(&self) -> bool {
		self.reply.is_closed()
	}

	pub(crate) fn respond(self, response: DialResponse) {
		// The caller may have given up already.
		let _ = self.reply.send(response);
	}
}
