use std::{convert::Infallible, sync::Arc, time::Duration};

use futures::{
	channel::{mpsc, oneshot},
	future::{Either, poll_fn},
};
use multiaddr::{Multiaddr, PeerId};
use sf_core::{Transport as _, TransportError};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::{
	connection::Connection,
	error::AttemptError,
	resource::{Reservation, ResourceManager},
	transport::TransportRegistry,
};

pub(crate) type AttemptId = u64;

pub(crate) struct AttemptEvent {
	pub(crate) id: AttemptId,
	pub(crate) address: Multiaddr,
	pub(crate) result: Result<Connection, AttemptError>,
}

/// Everything a single attempt needs, shared by all attempts of one worker.
#[derive(Clone)]
pub(crate) struct AttemptContext {
	pub(crate) peer_id: PeerId,
	pub(crate) transports: Arc<TransportRegistry>,
	pub(crate) resources: Arc<dyn ResourceManager>,
	pub(crate) reservation: Reservation,
	pub(crate) timeout: Duration,
}

/// Dials `address` once.
///
/// The resource scope is reserved before anything touches the network and is either handed over to
/// the returned connection or released when this future returns or is dropped.
pub(crate) async fn dial(context: &AttemptContext, address: Multiaddr) -> Result<Connection, AttemptError> {
	let Some((protocol, transport)) = context.transports.transport_for(&address) else {
		return Err(AttemptError::UnsupportedTransport);
	};

	let scope = context
		.resources
		.reserve(&context.peer_id, context.reservation)
		.map_err(AttemptError::ResourceExhausted)?;

	let dial = match transport.dial(context.peer_id, address) {
		Ok(dial) => dial,
		Err(TransportError::MultiaddrNotSupported(_)) => return Err(AttemptError::AddressNotSupported(protocol)),
		Err(TransportError::Other(e)) => return Err(e.into()),
	};

	match tokio::time::timeout(context.timeout, dial).await {
		Ok(Ok(raw)) => Ok(Connection::new(context.peer_id, raw, scope)),
		Ok(Err(e)) => Err(e.into()),
		Err(_) => Err(AttemptError::Timeout(context.timeout)),
	}
}

pub(crate) async fn new_pending_attempt(
	id: AttemptId,
	address: Multiaddr,
	context: AttemptContext,
	abort_receiver: oneshot::Receiver<Infallible>,
	mut events: mpsc::Sender<AttemptEvent>,
) {
	let started_at = Instant::now();
	let attempt = Box::pin(dial(&context, address.clone()));

	match futures::future::select(abort_receiver, attempt).await {
		Either::Left((Err(oneshot::Canceled), _)) => {
			trace!(elapsed = ?started_at.elapsed(), "attempt aborted");
		}
		Either::Left((Ok(v), _)) => sf_core::util::unreachable(v),
		Either::Right((result, _)) => {
			match &result {
				Ok(_) => debug!(elapsed = ?started_at.elapsed(), "attempt succeeded"),
				Err(error) => debug!(elapsed = ?started_at.elapsed(), %error, "attempt failed"),
			}

			let event = AttemptEvent { id, address, result };
			let sent = match poll_fn(|cx| events.poll_ready(cx)).await {
				Ok(()) => events.try_send(event).map_err(|e| e.into_inner()),
				Err(_) => Err(event),
			};

			if let Err(event) = sent {
				trace!("dial worker dropped before attempt completed");
				if let Ok(connection) = event.result {
					close_unused(connection).await;
				}
			}
		}
	}
}

/// Closes a connection nobody will use.
pub(crate) async fn close_unused(connection: Connection) {
	if let Err(e) = connection.close().await {
		warn!(peer_id = %connection.peer_id(), ?e, "failed to close unused connection");
	}
}

/// An attempt in flight, owned by its worker.
pub(crate) struct PendingAttempt {
	/// When dropped, notifies the task which then knows to terminate.
	abort_notifier: Option<oneshot::Sender<Infallible>>,
	started_at: Instant,
}

impl PendingAttempt {
	pub(crate) fn new(abort_notifier: oneshot::Sender<Infallible>) -> Self {
		Self {
			abort_notifier: Some(abort_notifier),
			started_at: Instant::now(),
		}
	}

	pub(crate) fn started_at(&self) -> Instant {
		self.started_at
	}

	/// Aborts the attempt. Its partial connection and resource scope are dropped with the task.
	pub(crate) fn abort(&mut self) {
		if let Some(notifier) = self.abort_notifier.take() {
			drop(notifier);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{
		io,
		sync::atomic::{AtomicUsize, Ordering},
	};

	use futures::{
		FutureExt, StreamExt,
		future::{self, BoxFuture},
	};
	use sf_core::{BoxedConnection, Protocol, Transport, transport::boxed};

	use super::*;
	use crate::{
		connection::tests::CountingConnection,
		resource::{LimitedResourceManager, UnlimitedResourceManager},
	};

	#[derive(Clone, Copy)]
	enum Behaviour {
		Succeed,
		Refuse,
		Reject,
		Hang,
	}

	struct Scripted {
		behaviour: Behaviour,
		dials: Arc<AtomicUsize>,
	}

	impl Transport for Scripted {
		type Connection = BoxedConnection;
		type Error = io::Error;
		type Dial = BoxFuture<'static, io::Result<BoxedConnection>>;

		fn protocol(&self) -> Protocol {
			Protocol::Tcp
		}

		fn dial(&self, _peer_id: PeerId, address: Multiaddr) -> Result<Self::Dial, TransportError<Self::Error>> {
			self.dials.fetch_add(1, Ordering::SeqCst);
			match self.behaviour {
				Behaviour::Succeed => Ok(future::ready(Ok(Box::new(CountingConnection {
					address,
					closes: Arc::default(),
				}) as BoxedConnection))
				.boxed()),
				Behaviour::Refuse => Ok(future::ready::<io::Result<BoxedConnection>>(Err(io::Error::from(
					io::ErrorKind::ConnectionRefused,
				)))
				.boxed()),
				Behaviour::Reject => Err(TransportError::MultiaddrNotSupported(address)),
				Behaviour::Hang => Ok(future::pending::<io::Result<BoxedConnection>>().boxed()),
			}
		}
	}

	fn context(behaviour: Behaviour, resources: Arc<dyn ResourceManager>) -> (AttemptContext, Arc<AtomicUsize>) {
		let dials = Arc::new(AtomicUsize::new(0));
		let mut transports = TransportRegistry::new();
		transports.insert(boxed(Scripted {
			behaviour,
			dials: dials.clone(),
		}));

		let context = AttemptContext {
			peer_id: PeerId::random(),
			transports: Arc::new(transports),
			resources,
			reservation: Reservation::default(),
			timeout: Duration::from_secs(10),
		};
		(context, dials)
	}

	fn tcp() -> Multiaddr {
		"/ip4/10.0.0.1/tcp/4001".parse().unwrap()
	}

	#[tokio::test]
	async fn test_success_hands_scope_to_connection() {
		let resources = Arc::new(LimitedResourceManager::new(1, usize::MAX));
		let (context, _) = context(Behaviour::Succeed, resources.clone());

		let connection = dial(&context, tcp()).await.unwrap();
		assert_eq!(connection.peer_id(), context.peer_id);
		assert_eq!(resources.usage().connections, 1);

		connection.close().await.unwrap();
		assert_eq!(resources.usage().connections, 0);
	}

	#[tokio::test]
	async fn test_unsupported_transport_reserves_nothing() {
		let resources = Arc::new(LimitedResourceManager::new(0, 0));
		let (context, dials) = context(Behaviour::Succeed, resources);

		let error = dial(&context, "/ip4/10.0.0.1/udp/4001/quic-v1".parse().unwrap())
			.await
			.unwrap_err();
		assert!(matches!(error, AttemptError::UnsupportedTransport));
		assert_eq!(dials.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_resource_exhaustion_skips_network() {
		let resources = Arc::new(LimitedResourceManager::new(0, usize::MAX));
		let (context, dials) = context(Behaviour::Succeed, resources);

		let error = dial(&context, tcp()).await.unwrap_err();
		assert!(matches!(error, AttemptError::ResourceExhausted(_)));
		assert_eq!(dials.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_rejected_address() {
		let resources = Arc::new(LimitedResourceManager::new(1, usize::MAX));
		let (context, _) = context(Behaviour::Reject, resources.clone());

		let error = dial(&context, tcp()).await.unwrap_err();
		assert!(matches!(error, AttemptError::AddressNotSupported(Protocol::Tcp)));
		assert_eq!(resources.usage().connections, 0);
	}

	#[tokio::test]
	async fn test_transport_failure_releases_scope() {
		let resources = Arc::new(LimitedResourceManager::new(1, usize::MAX));
		let (context, _) = context(Behaviour::Refuse, resources.clone());

		let error = dial(&context, tcp()).await.unwrap_err();
		assert!(matches!(&error, AttemptError::Transport(e) if e.kind() == io::ErrorKind::ConnectionRefused));
		assert_eq!(resources.usage().connections, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_timeout() {
		let resources = Arc::new(LimitedResourceManager::new(1, usize::MAX));
		let (mut context, _) = context(Behaviour::Hang, resources.clone());
		context.timeout = Duration::from_millis(250);

		let error = dial(&context, tcp()).await.unwrap_err();
		assert!(matches!(error, AttemptError::Timeout(timeout) if timeout == Duration::from_millis(250)));
		assert_eq!(resources.usage().connections, 0);
	}

	#[tokio::test]
	async fn test_aborted_attempt_reports_nothing() {
		let resources = Arc::new(LimitedResourceManager::new(1, usize::MAX));
		let (context, _) = context(Behaviour::Hang, resources.clone());
		let (abort_notifier, abort_receiver) = oneshot::channel();
		let (events_tx, mut events_rx) = mpsc::channel(0);

		let task = tokio::spawn(new_pending_attempt(1, tcp(), context, abort_receiver, events_tx));
		tokio::task::yield_now().await;
		assert_eq!(resources.usage().connections, 1);

		let mut attempt = PendingAttempt::new(abort_notifier);
		attempt.abort();
		task.await.unwrap();

		assert!(events_rx.next().await.is_none());
		assert_eq!(resources.usage().connections, 0);
	}

	#[tokio::test]
	async fn test_completed_attempt_reports_event() {
		let (context, _) = context(Behaviour::Refuse, Arc::new(UnlimitedResourceManager));
		let (_abort_notifier, abort_receiver) = oneshot::channel();
		let (events_tx, mut events_rx) = mpsc::channel(0);

		tokio::spawn(new_pending_attempt(7, tcp(), context, abort_receiver, events_tx));

		let event = events_rx.next().await.unwrap();
		assert_eq!(event.id, 7);
		assert_eq!(event.address, tcp());
		assert!(event.result.is_err());
	}
}
