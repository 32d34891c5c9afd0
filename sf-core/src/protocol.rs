use std::fmt;

use multiaddr::{Multiaddr, Protocol as MultiaddrProtocol};

/// Transport tag of an address, used to pick the transport able to dial it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
	Memory,
	Tcp,
	Quic,
	WebTransport,
	WebRTC,
	WebSocket,
}

impl Protocol {
	/// Extracts the transport tag of `address`.
	///
	/// Components are layered left to right, so the outermost recognised one wins:
	/// `/ip4/1.2.3.4/udp/443/quic-v1/webtransport` is [`Protocol::WebTransport`] and
	/// `/ip4/1.2.3.4/tcp/80/ws` is [`Protocol::WebSocket`]. A trailing `/p2p/..` is ignored.
	pub fn from_multiaddr(address: &Multiaddr) -> Option<Self> {
		let mut protocol = None;

		for component in address.iter() {
			match component {
				MultiaddrProtocol::Memory(_) => protocol = Some(Self::Memory),
				MultiaddrProtocol::Tcp(_) => protocol = Some(Self::Tcp),
				MultiaddrProtocol::Quic | MultiaddrProtocol::QuicV1 => protocol = Some(Self::Quic),
				MultiaddrProtocol::WebTransport => protocol = Some(Self::WebTransport),
				MultiaddrProtocol::WebRTC | MultiaddrProtocol::WebRTCDirect => protocol = Some(Self::WebRTC),
				MultiaddrProtocol::Ws(_) | MultiaddrProtocol::Wss(_) => protocol = Some(Self::WebSocket),
				_ => {}
			}
		}

		protocol
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Memory => "memory",
			Self::Tcp => "tcp",
			Self::Quic => "quic",
			Self::WebTransport => "webtransport",
			Self::WebRTC => "webrtc",
			Self::WebSocket => "websocket",
		}
	}
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
