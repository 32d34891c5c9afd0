mod connection;
mod protocol;
pub mod transport;

pub use connection::{BoxedConnection, Connection};
pub use protocol::Protocol;
pub use transport::{Transport, TransportError};

pub mod util {
	use std::convert::Infallible;

	/// A safe version of [`std::intrinsics::unreachable`].
	#[inline(always)]
	pub fn unreachable(x: Infallible) -> ! {
		match x {}
	}
}
