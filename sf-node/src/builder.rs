use std::sync::Arc;

use multiaddr::PeerId;
use sf_core::{Transport, transport::boxed};

use crate::{
	Node,
	address_book::{AddressBook, MemoryAddressBook},
	config::DialConfig,
	dial::{
		manager::Manager,
		rank::{AddressRanker, DefaultRanker},
	},
	executor::{Executor, TaskExecutor},
	resource::{ResourceManager, UnlimitedResourceManager},
	transport::TransportRegistry,
};

pub struct Builder {
	local_peer_id: PeerId,

	transports: TransportRegistry,
	address_book: Arc<dyn AddressBook>,
	resources: Arc<dyn ResourceManager>,
	ranker: Arc<dyn AddressRanker>,
	config: DialConfig,
	task_executor: TaskExecutor,
}

impl Builder {
	pub fn new(local_peer_id: PeerId) -> Self {
		Self {
			local_peer_id,
			transports: TransportRegistry::new(),
			address_book: Arc::new(MemoryAddressBook::new()),
			resources: Arc::new(UnlimitedResourceManager),
			ranker: Arc::new(DefaultRanker),
			config: DialConfig::default(),
			task_executor: TaskExecutor::default(),
		}
	}

	/// Registers `transport` for the protocol it reports, replacing any earlier one.
	pub fn add_transport(mut self, transport: impl Transport) -> Self {
		self.transports.insert(boxed(transport));
		self
	}

	pub fn address_book(mut self, address_book: Arc<dyn AddressBook>) -> Self {
		self.address_book = address_book;
		self
	}

	pub fn resource_manager(mut self, resources: Arc<dyn ResourceManager>) -> Self {
		self.resources = resources;
		self
	}

	pub fn ranker(mut self, ranker: impl AddressRanker) -> Self {
		self.ranker = Arc::new(ranker);
		self
	}

	pub fn config(mut self, config: DialConfig) -> Self {
		self.config = config;
		self
	}

	/// Runs dial workers and attempts on `executor` instead of the ambient tokio runtime.
	pub fn executor(mut self, executor: impl Executor + Send + Sync + 'static) -> Self {
		self.task_executor = TaskExecutor::new(executor);
		self
	}

	pub fn build(self) -> Node {
		Node::new(Manager::new(
			self.local_peer_id,
			self.config,
			self.transports,
			self.address_book,
			self.resources,
			self.ranker,
			self.task_executor,
		))
	}
}
