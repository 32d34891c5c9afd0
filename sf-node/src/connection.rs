use std::{
	fmt, io,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, Ordering},
	},
};

use multiaddr::{Multiaddr, PeerId};
use sf_core::{BoxedConnection, Connection as _};

use crate::resource::ResourceScope;

/// A live, secured and multiplexed connection to a peer.
///
/// Cloning hands out another reference to the same connection; use [`Connection::ptr_eq`] to tell
/// whether two handles are the same connection. The resource scope reserved for the dial is owned
/// by the connection and released when it is closed.
#[derive(Clone)]
pub struct Connection {
	inner: Arc<Inner>,
}

struct Inner {
	peer_id: PeerId,
	raw: BoxedConnection,
	scope: Mutex<ResourceScope>,
	closed: AtomicBool,
}

impl Connection {
	pub(crate) fn new(peer_id: PeerId, raw: BoxedConnection, scope: ResourceScope) -> Self {
		Self {
			inner: Arc::new(Inner {
				peer_id,
				raw,
				scope: Mutex::new(scope),
				closed: AtomicBool::new(false),
			}),
		}
	}

	pub fn peer_id(&self) -> PeerId {
		self.inner.peer_id
	}

	pub fn remote_address(&self) -> &Multiaddr {
		self.inner.raw.remote_address()
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	/// Whether both handles refer to the very same connection.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Closes the connection and releases its resource scope. Only the first call does anything.
	pub async fn close(&self) -> io::Result<()> {
		if self.inner.closed.swap(true, Ordering::AcqRel) {
			return Ok(());
		}

		let result = self.inner.raw.close().await;
		self.inner
			.scope
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.release();
		result
	}
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("peer_id", &self.inner.peer_id)
			.field("remote_address", self.remote_address())
			.field("closed", &self.is_closed())
			.finish()
	}
}
