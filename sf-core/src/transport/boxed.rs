use std::{error::Error, fmt, io, sync::Arc};

use futures::{future::BoxFuture, prelude::*};
use multiaddr::{Multiaddr, PeerId};

use crate::{
	Protocol,
	connection::{self, BoxedConnection},
	transport::{Transport, TransportError},
};

/// Creates a new [`Boxed`] transport from the given transport.
pub fn boxed<T>(transport: T) -> Boxed
where
	T: Transport,
{
	Boxed {
		inner: Arc::new(transport) as Arc<_>,
	}
}

/// A type-erased [`Transport`] so that transports of different kinds can live side by side.
///
/// Errors are turned into [`io::Error`] and connections into [`BoxedConnection`]. Cloning is cheap.
#[derive(Clone)]
pub struct Boxed {
	inner: Arc<dyn Abstract>,
}

type Dial = BoxFuture<'static, io::Result<BoxedConnection>>;

trait Abstract: Send + Sync {
	fn protocol(&self) -> Protocol;
	fn dial(&self, peer_id: PeerId, address: Multiaddr) -> Result<Dial, TransportError<io::Error>>;
}

impl fmt::Debug for Boxed {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BoxedTransport({})", self.inner.protocol())
	}
}

impl Transport for Boxed {
	type Connection = BoxedConnection;
	type Error = io::Error;
	type Dial = Dial;

	fn protocol(&self) -> Protocol {
		self.inner.protocol()
	}

	fn dial(&self, peer_id: PeerId, address: Multiaddr) -> Result<Self::Dial, TransportError<Self::Error>> {
		self.inner.dial(peer_id, address)
	}
}

impl<T> Abstract for T
where
	T: Transport,
{
	fn protocol(&self) -> Protocol {
		Transport::protocol(self)
	}

	fn dial(&self, peer_id: PeerId, address: Multiaddr) -> Result<Dial, TransportError<io::Error>> {
		let fut = Transport::dial(self, peer_id, address)
			.map_err(|e| e.map(box_err))?
			.map(|r| {
				r.map(|connection| Box::new(connection::Boxed(connection)) as BoxedConnection)
					.map_err(box_err)
			});
		Ok(Box::pin(fut) as Dial)
	}
}

fn box_err<E: Error + Send + Sync + 'static>(e: E) -> io::Error {
	io::Error::other(e)
}
