use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use multiaddr::PeerId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{Instrument, trace};

use crate::{
	address_book::AddressBook,
	config::DialConfig,
	dial::{DialRequest, history::DialHistory, rank::AddressRanker, task::AttemptContext, worker::DialWorker},
	executor::TaskExecutor,
	registry::ConnectionRegistry,
	resource::ResourceManager,
	transport::TransportRegistry,
};

pub(crate) struct WorkerHandle {
	id: u64,
	sender: mpsc::Sender<DialRequest>,
}

/// Routes dial requests to the single worker owning each peer, spawning workers on demand.
pub(crate) struct Manager {
	pub(crate) local_peer_id: PeerId,
	pub(crate) config: DialConfig,
	pub(crate) transports: Arc<TransportRegistry>,
	pub(crate) address_book: Arc<dyn AddressBook>,
	pub(crate) resources: Arc<dyn ResourceManager>,
	pub(crate) ranker: Arc<dyn AddressRanker>,
	pub(crate) registry: ConnectionRegistry,
	pub(crate) history: DialHistory,
	pub(crate) workers: DashMap<PeerId, WorkerHandle>,
	pub(crate) task_executor: TaskExecutor,
	next_worker_id: AtomicU64,
}

impl Manager {
	pub(crate) fn new(
		local_peer_id: PeerId,
		config: DialConfig,
		transports: TransportRegistry,
		address_book: Arc<dyn AddressBook>,
		resources: Arc<dyn ResourceManager>,
		ranker: Arc<dyn AddressRanker>,
		task_executor: TaskExecutor,
	) -> Self {
		let config = config.sanitized();

		Self {
			local_peer_id,
			history: DialHistory::new(&config),
			config,
			transports: Arc::new(transports),
			address_book,
			resources,
			ranker,
			registry: ConnectionRegistry::new(),
			workers: DashMap::new(),
			task_executor,
			next_worker_id: AtomicU64::new(0),
		}
	}

	/// Hands `request` to the worker owning its peer.
	///
	/// Waits for room when that worker's queue is full. A worker that exited between lookup and
	/// send is replaced and the request handed to its successor.
	pub(crate) async fn submit(self: &Arc<Self>, mut request: DialRequest) {
		let peer_id = request.peer_id();

		loop {
			let (worker_id, sender) = {
				let handle = self
					.workers
					.entry(peer_id)
					.or_insert_with(|| self.spawn_worker(peer_id));

				// The worker cannot deregister while its entry is held, so a request pushed here is
				// always seen by it.
				let sent = handle.sender.try_send(request);
				match sent {
					Ok(()) => return,
					Err(TrySendError::Full(returned)) => {
						request = returned;
						(handle.id, handle.sender.clone())
					}
					Err(TrySendError::Closed(returned)) => {
						request = returned;
						let worker_id = handle.id;
						drop(handle);
						self.forget_worker(&peer_id, worker_id);
						continue;
					}
				}
			};

			trace!(%peer_id, worker_id, "dial worker queue full, waiting");
			match sender.send(request).await {
				Ok(()) => return,
				Err(mpsc::error::SendError(returned)) => {
					request = returned;
					self.forget_worker(&peer_id, worker_id);
				}
			}
		}
	}

	/// Number of peers with a running worker.
	pub(crate) fn active_workers(&self) -> usize {
		self.workers.len()
	}

	fn forget_worker(&self, peer_id: &PeerId, worker_id: u64) {
		self.workers.remove_if(peer_id, |_, handle| handle.id == worker_id);
	}

	fn spawn_worker(self: &Arc<Self>, peer_id: PeerId) -> WorkerHandle {
		let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
		let (sender, receiver) = mpsc::channel(self.config.request_queue_capacity);

		let context = AttemptContext {
			peer_id,
			transports: self.transports.clone(),
			resources: self.resources.clone(),
			reservation: self.config.reservation,
			timeout: self.config.dial_timeout,
		};
		let worker = DialWorker::new(id, peer_id, Arc::clone(self), context, receiver);

		let span = tracing::debug_span!(parent: tracing::Span::none(), "dial_worker", %peer_id, id);
		span.follows_from(tracing::Span::current());
		self.task_executor.spawn(worker.run().instrument(span));

		WorkerHandle { id, sender }
	}

	/// Removes the worker entry for `peer_id` if it still belongs to `worker_id` and nothing is queued
	/// on it. Returns whether the worker may exit.
	pub(crate) fn deregister(&self, peer_id: &PeerId, worker_id: u64, requests: &mpsc::Receiver<DialRequest>) -> bool {
		self.workers
			.remove_if(peer_id, |_, handle| handle.id == worker_id && requests.is_empty())
			.is_some()
	}
}
