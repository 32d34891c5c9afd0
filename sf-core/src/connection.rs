use std::io;

use futures::future::BoxFuture;
use multiaddr::Multiaddr;

/// A raw connection handed out by a [`Transport`](crate::Transport) once the secure channel and the
/// stream multiplexer have been negotiated.
pub trait Connection: Send + Sync + 'static {
	type Error: std::error::Error + Send + Sync + 'static;

	/// The address the connection was dialed on.
	fn remote_address(&self) -> &Multiaddr;

	/// Closes the underlying socket. Implementations must tolerate being called more than once.
	fn close(&self) -> BoxFuture<'_, Result<(), Self::Error>>;
}

pub type BoxedConnection = Box<dyn Connection<Error = io::Error>>;

/// Wraps a concrete connection, erasing its error type into [`io::Error`].
pub(crate) struct Boxed<C>(pub(crate) C);

impl<C> Connection for Boxed<C>
where
	C: Connection,
{
	type Error = io::Error;

	fn remote_address(&self) -> &Multiaddr {
		self.0.remote_address()
	}

	fn close(&self) -> BoxFuture<'_, Result<(), Self::Error>> {
		Box::pin(async move { self.0.close().await.map_err(io::Error::other) })
	}
}

impl Connection for BoxedConnection {
	type Error = io::Error;

	fn remote_address(&self) -> &Multiaddr {
		self.as_ref().remote_address()
	}

	fn close(&self) -> BoxFuture<'_, Result<(), Self::Error>> {
		self.as_ref().close()
	}
}
