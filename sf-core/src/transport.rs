use futures::future::Future;
use multiaddr::{Multiaddr, PeerId};

use crate::{Connection, Protocol};

mod boxed;

pub use boxed::{Boxed, boxed};

/// A pluggable implementation able to dial addresses of one [`Protocol`].
///
/// The returned [`Transport::Dial`] future performs the network handshake. Dropping it before it
/// resolves must abandon the attempt and close any partially established socket.
pub trait Transport: Send + Sync + 'static {
	type Connection: Connection;
	type Error: std::error::Error + Send + Sync + 'static;
	type Dial: Future<Output = Result<Self::Connection, Self::Error>> + Send + 'static;

	fn protocol(&self) -> Protocol;

	fn dial(&self, peer_id: PeerId, address: Multiaddr) -> Result<Self::Dial, TransportError<Self::Error>>;
}

/// Error returned synchronously by [`Transport::dial`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError<E> {
	/// The address is not understood by this transport.
	#[error("multiaddr is not supported: {0}")]
	MultiaddrNotSupported(Multiaddr),

	#[error("{0}")]
	Other(E),
}

impl<E> TransportError<E> {
	pub fn map<F, T>(self, map: F) -> TransportError<T>
	where
		F: FnOnce(E) -> T,
	{
		match self {
			Self::MultiaddrNotSupported(address) => TransportError::MultiaddrNotSupported(address),
			Self::Other(error) => TransportError::Other(map(error)),
		}
	}
}
