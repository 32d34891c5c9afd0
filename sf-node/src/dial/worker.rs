use std::{
	collections::{HashMap, HashSet, VecDeque},
	convert::Infallible,
	mem,
	sync::Arc,
};

use futures::{
	StreamExt,
	channel::{mpsc as attempt_mpsc, oneshot},
	future,
};
use multiaddr::{Multiaddr, PeerId, Protocol as MultiaddrProtocol};
use tokio::{sync::mpsc, time::Instant};
use tracing::{Instrument, debug, info, trace, warn};

use crate::{
	connection::Connection,
	dial::{
		DialRequest, DialResponse,
		manager::Manager,
		rank::{self, Candidate},
		task::{self, AttemptContext, AttemptEvent, AttemptId, PendingAttempt},
	},
	error::{AggregateDialError, AttemptError, DialError},
	registry::Publish,
};

/// One round of attempts over the peer's addresses, shared by every request waiting on it.
struct Cycle {
	/// Ranked addresses not attempted yet.
	pending: VecDeque<Multiaddr>,
	in_flight: HashMap<AttemptId, PendingAttempt>,
	failures: Vec<(Multiaddr, AttemptError)>,
	started_at: Instant,
}

/// Owns every dial to a single peer.
///
/// Requests are coalesced onto at most one cycle at a time and all of them receive that cycle's
/// outcome. The worker deregisters and stops once it has nothing queued and no cycle running.
pub(crate) struct DialWorker {
	id: u64,
	peer_id: PeerId,
	manager: Arc<Manager>,
	context: AttemptContext,
	requests: mpsc::Receiver<DialRequest>,
	attempt_events_tx: attempt_mpsc::Sender<AttemptEvent>,
	attempt_events_rx: attempt_mpsc::Receiver<AttemptEvent>,
	waiters: Vec<DialRequest>,
	cycle: Option<Cycle>,
	next_attempt_id: AttemptId,
}

impl DialWorker {
	pub(crate) fn new(
		id: u64,
		peer_id: PeerId,
		manager: Arc<Manager>,
		context: AttemptContext,
		requests: mpsc::Receiver<DialRequest>,
	) -> Self {
		let (attempt_events_tx, attempt_events_rx) = attempt_mpsc::channel(manager.config.max_parallel_dials);

		Self {
			id,
			peer_id,
			manager,
			context,
			requests,
			attempt_events_tx,
			attempt_events_rx,
			waiters: Vec::new(),
			cycle: None,
			next_attempt_id: 0,
		}
	}

	pub(crate) async fn run(mut self) {
		debug!("dial worker started");

		loop {
			self.waiters.retain(|waiter| !waiter.is_abandoned());

			if self.is_idle() && self.manager.deregister(&self.peer_id, self.id, &self.requests) {
				break;
			}

			let deadline = self.waiters.iter().filter_map(DialRequest::deadline).min();

			tokio::select! {
				Some(request) = self.requests.recv() => self.handle_request(request),
				Some(event) = self.attempt_events_rx.next() => self.handle_attempt_event(event),
				() = sleep_until(deadline) => self.expire_waiters(),
			}
		}

		self.shutdown().await;
	}

	fn is_idle(&self) -> bool {
		self.cycle.is_none() && self.waiters.is_empty()
	}

	fn handle_request(&mut self, request: DialRequest) {
		if request.is_expired(Instant::now()) {
			trace!("dial request expired before it was handled");
			request.respond(Err(DialError::CallerCancelled(self.peer_id)));
			return;
		}

		if let Some(connection) = self.manager.registry.lookup(&self.peer_id) {
			trace!("reusing existing connection");
			request.respond(Ok(connection));
			return;
		}

		self.waiters.push(request);
		if self.cycle.is_none() {
			self.start_cycle();
		} else {
			trace!(waiters = self.waiters.len(), "joined running dial cycle");
		}
	}

	fn expire_waiters(&mut self) {
		let now = Instant::now();
		let (expired, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.waiters)
			.into_iter()
			.partition(|waiter| waiter.is_expired(now));
		self.waiters = waiting;

		for waiter in expired {
			debug!("dial request deadline expired");
			waiter.respond(Err(DialError::CallerCancelled(self.peer_id)));
		}
	}

	fn start_cycle(&mut self) {
		let addresses = self.dialable_addresses();
		if addresses.is_empty() {
			debug!("no addresses to dial");
			self.resolve_waiters(Err(DialError::NoAddresses(self.peer_id)));
			return;
		}

		let now = Instant::now();
		let history = self.manager.history.snapshot(&self.peer_id);
		let config = &self.manager.config;
		let mut candidates: Vec<_> = addresses
			.into_iter()
			.map(|address| Candidate::new(address, &history, now, config.backoff_base, config.backoff_max))
			.collect();
		rank::rank(&*self.manager.ranker, &mut candidates);

		debug!(addresses = candidates.len(), "starting dial cycle");
		self.cycle = Some(Cycle {
			pending: candidates.into_iter().map(Candidate::into_address).collect(),
			in_flight: HashMap::new(),
			failures: Vec::new(),
			started_at: now,
		});
		self.launch_attempts();
	}

	/// The peer's addresses, deduplicated, without those that name another peer.
	fn dialable_addresses(&self) -> Vec<Multiaddr> {
		let mut seen = HashSet::new();

		self.manager
			.address_book
			.addresses_for(&self.peer_id)
			.into_iter()
			.filter(|address| match address.iter().last() {
				Some(MultiaddrProtocol::P2p(peer_id)) => peer_id == self.peer_id,
				_ => true,
			})
			.filter(|address| seen.insert(address.clone()))
			.collect()
	}

	fn launch_attempts(&mut self) {
		let Some(cycle) = self.cycle.as_mut() else {
			return;
		};

		while cycle.in_flight.len() < self.manager.config.max_parallel_dials {
			let Some(address) = cycle.pending.pop_front() else {
				break;
			};

			let id = self.next_attempt_id;
			self.next_attempt_id += 1;
			let (abort_notifier, abort_receiver) = oneshot::channel::<Infallible>();

			let span = tracing::debug_span!(parent: tracing::Span::none(), "dial_attempt", peer_id = %self.peer_id, %address, id);
			span.follows_from(tracing::Span::current());

			self.manager.task_executor.spawn(
				task::new_pending_attempt(
					id,
					address,
					self.context.clone(),
					abort_receiver,
					self.attempt_events_tx.clone(),
				)
				.instrument(span),
			);
			cycle.in_flight.insert(id, PendingAttempt::new(abort_notifier));
		}
	}

	fn handle_attempt_event(&mut self, event: AttemptEvent) {
		let AttemptEvent { id, address, result } = event;

		let Some(attempt) = self.cycle.as_mut().and_then(|cycle| cycle.in_flight.remove(&id)) else {
			// Finished while being aborted: a cycle already resolved without it.
			if let Ok(connection) = result {
				warn!(%address, "closing connection of an attempt that lost the race");
				self.manager.task_executor.spawn(task::close_unused(connection));
			}
			return;
		};

		match result {
			Ok(connection) => self.on_attempt_succeeded(address, attempt, connection),
			Err(error) => self.on_attempt_failed(address, attempt, error),
		}
	}

	fn on_attempt_succeeded(&mut self, address: Multiaddr, attempt: PendingAttempt, connection: Connection) {
		let connection = match self.manager.registry.publish(connection.clone()) {
			Publish::Accepted => connection,
			Publish::AlreadyPresent(existing) => {
				debug!(%address, "peer already connected, dropping the new connection");
				self.manager.task_executor.spawn(task::close_unused(connection));
				existing
			}
		};
		self.manager
			.history
			.record_success(&self.peer_id, connection.remote_address());

		info!(%address, elapsed = ?attempt.started_at().elapsed(), "connection established");
		self.finish_cycle(Ok(connection));
	}

	fn on_attempt_failed(&mut self, address: Multiaddr, attempt: PendingAttempt, error: AttemptError) {
		debug!(%address, %error, elapsed = ?attempt.started_at().elapsed(), "dial attempt failed");
		if error.is_address_failure() {
			self.manager.history.record_failure(&self.peer_id, &address, &error);
		}

		let Some(cycle) = self.cycle.as_mut() else {
			return;
		};
		cycle.failures.push((address, error));

		if !cycle.pending.is_empty() || !cycle.in_flight.is_empty() {
			self.launch_attempts();
			return;
		}

		let error = AggregateDialError::new(self.peer_id, mem::take(&mut cycle.failures));
		warn!(attempts = error.len(), "every address of the peer failed");
		self.finish_cycle(Err(DialError::Aggregate(Arc::new(error))));
	}

	/// Ends the running cycle, aborting the attempts still in flight, and answers every waiter.
	fn finish_cycle(&mut self, response: DialResponse) {
		if let Some(mut cycle) = self.cycle.take() {
			for (_, mut attempt) in cycle.in_flight.drain() {
				attempt.abort();
			}
			debug!(elapsed = ?cycle.started_at.elapsed(), "dial cycle finished");
		}

		self.resolve_waiters(response);
	}

	fn resolve_waiters(&mut self, response: DialResponse) {
		for waiter in self.waiters.drain(..) {
			waiter.respond(response.clone());
		}
	}

	async fn shutdown(mut self) {
		self.requests.close();
		let mut leftovers = Vec::new();
		while let Ok(request) = self.requests.try_recv() {
			leftovers.push(request);
		}

		self.attempt_events_rx.close();
		while let Ok(Some(event)) = self.attempt_events_rx.try_next() {
			if let Ok(connection) = event.result {
				self.manager.task_executor.spawn(task::close_unused(connection));
			}
		}

		// Queued by a sender that found the queue full right before this worker deregistered.
		for request in leftovers {
			trace!("handing over request queued during shutdown");
			self.manager.submit(request).await;
		}

		debug!("dial worker stopped");
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => future::pending().await,
	}
}
