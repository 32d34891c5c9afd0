use std::collections::HashMap;

use multiaddr::Multiaddr;
use sf_core::{Protocol, Transport, transport::Boxed};
use tracing::warn;

/// Maps a transport tag to the transport able to dial it.
#[derive(Debug, Default, Clone)]
pub struct TransportRegistry {
	transports: HashMap<Protocol, Boxed>,
}

impl TransportRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `transport` for its protocol, replacing any previous one.
	pub fn insert(&mut self, transport: Boxed) {
		let protocol = transport.protocol();
		if self.transports.insert(protocol, transport).is_some() {
			warn!(%protocol, "replaced previously registered transport");
		}
	}

	pub fn get(&self, protocol: Protocol) -> Option<&Boxed> {
		self.transports.get(&protocol)
	}

	/// The transport for `address`, with the tag it was selected by.
	pub fn transport_for(&self, address: &Multiaddr) -> Option<(Protocol, &Boxed)> {
		let protocol = Protocol::from_multiaddr(address)?;
		self.get(protocol).map(|transport| (protocol, transport))
	}

	pub fn protocols(&self) -> impl Iterator<Item = Protocol> + '_ {
		self.transports.keys().copied()
	}

	pub fn is_empty(&self) -> bool {
		self.transports.is_empty()
	}
}
