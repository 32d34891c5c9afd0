use std::{
	collections::HashMap,
	io,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use multiaddr::{Multiaddr, PeerId};
use sf_core::{Protocol, Transport, TransportError};
use sf_node::{Builder, DialConfig, MemoryAddressBook, Node, PERMANENT_ADDR_TTL, ResourceManager};

/// What a dial to a given address does.
#[derive(Debug, Clone, Copy)]
pub enum Script {
	Succeed(Duration),
	Fail(Duration),
	Hang,
}

#[derive(Debug, Default)]
pub struct Stats {
	dials: AtomicUsize,
	in_flight: AtomicUsize,
	peak_in_flight: AtomicUsize,
	live_connections: AtomicUsize,
}

impl Stats {
	pub fn dials(&self) -> usize {
		self.dials.load(Ordering::SeqCst)
	}

	pub fn in_flight(&self) -> usize {
		self.in_flight.load(Ordering::SeqCst)
	}

	pub fn peak_in_flight(&self) -> usize {
		self.peak_in_flight.load(Ordering::SeqCst)
	}

	pub fn live_connections(&self) -> usize {
		self.live_connections.load(Ordering::SeqCst)
	}
}

/// Counts a dial as in flight until its future completes or is dropped.
struct InFlight(Arc<Stats>);

impl InFlight {
	fn new(stats: Arc<Stats>) -> Self {
		let current = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		stats.peak_in_flight.fetch_max(current, Ordering::SeqCst);
		Self(stats)
	}
}

impl Drop for InFlight {
	fn drop(&mut self) {
		self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
	}
}

pub struct MockConnection {
	address: Multiaddr,
	stats: Arc<Stats>,
	closed: AtomicBool,
}

impl MockConnection {
	fn new(address: Multiaddr, stats: Arc<Stats>) -> Self {
		stats.live_connections.fetch_add(1, Ordering::SeqCst);
		Self {
			address,
			stats,
			closed: AtomicBool::new(false),
		}
	}

	fn mark_closed(&self) {
		if !self.closed.swap(true, Ordering::SeqCst) {
			self.stats.live_connections.fetch_sub(1, Ordering::SeqCst);
		}
	}
}

impl Drop for MockConnection {
	fn drop(&mut self) {
		self.mark_closed();
	}
}

impl sf_core::Connection for MockConnection {
	type Error = io::Error;

	fn remote_address(&self) -> &Multiaddr {
		&self.address
	}

	fn close(&self) -> BoxFuture<'_, Result<(), Self::Error>> {
		self.mark_closed();
		futures::future::ready(Ok(())).boxed()
	}
}

/// TCP transport whose dials follow a per-address script. Unscripted addresses fail at once.
#[derive(Clone, Default)]
pub struct MockTransport {
	scripts: Arc<Mutex<HashMap<Multiaddr, Script>>>,
	stats: Arc<Stats>,
}

impl MockTransport {
	pub fn script(&self, address: &Multiaddr, script: Script) {
		self.scripts.lock().unwrap().insert(address.clone(), script);
	}

	pub fn stats(&self) -> Arc<Stats> {
		self.stats.clone()
	}
}

impl Transport for MockTransport {
	type Connection = MockConnection;
	type Error = io::Error;
	type Dial = BoxFuture<'static, io::Result<MockConnection>>;

	fn protocol(&self) -> Protocol {
		Protocol::Tcp
	}

	fn dial(&self, _peer_id: PeerId, address: Multiaddr) -> Result<Self::Dial, TransportError<Self::Error>> {
		if Protocol::from_multiaddr(&address) != Some(Protocol::Tcp) {
			return Err(TransportError::MultiaddrNotSupported(address));
		}

		let script = self
			.scripts
			.lock()
			.unwrap()
			.get(&address)
			.copied()
			.unwrap_or(Script::Fail(Duration::ZERO));
		self.stats.dials.fetch_add(1, Ordering::SeqCst);

		let stats = self.stats.clone();
		let in_flight = InFlight::new(stats.clone());
		Ok(async move {
			let _in_flight = in_flight;
			match script {
				Script::Succeed(delay) => {
					tokio::time::sleep(delay).await;
					Ok(MockConnection::new(address, stats))
				}
				Script::Fail(delay) => {
					tokio::time::sleep(delay).await;
					Err(io::Error::new(io::ErrorKind::ConnectionRefused, format!("{address} refused")))
				}
				Script::Hang => futures::future::pending().await,
			}
		}
		.boxed())
	}
}

pub struct Harness {
	pub node: Node,
	pub peer_id: PeerId,
	pub address_book: Arc<MemoryAddressBook>,
	pub transport: MockTransport,
}

impl Harness {
	pub fn new(config: DialConfig) -> Self {
		Self::build(config, None)
	}

	pub fn with_resources(config: DialConfig, resources: Arc<dyn ResourceManager>) -> Self {
		Self::build(config, Some(resources))
	}

	fn build(config: DialConfig, resources: Option<Arc<dyn ResourceManager>>) -> Self {
		let address_book = Arc::new(MemoryAddressBook::new());
		let transport = MockTransport::default();

		let mut builder = Builder::new(PeerId::random())
			.add_transport(transport.clone())
			.address_book(address_book.clone())
			.config(config);
		if let Some(resources) = resources {
			builder = builder.resource_manager(resources);
		}

		Self {
			node: builder.build(),
			peer_id: PeerId::random(),
			address_book,
			transport,
		}
	}

	/// Makes `address` known for the remote peer and scripts what dialing it does.
	pub fn add(&self, address: &Multiaddr, script: Script) {
		self.transport.script(address, script);
		self.address_book
			.add_address(self.peer_id, address.clone(), PERMANENT_ADDR_TTL);
	}

	pub fn stats(&self) -> Arc<Stats> {
		self.transport.stats()
	}
}

pub fn tcp(host: u8) -> Multiaddr {
	format!("/ip4/10.0.0.{host}/tcp/4001").parse().unwrap()
}
