use std::{future::Future, pin::Pin, sync::Arc};

use futures::FutureExt;

pub trait Executor {
	/// Run the given future in the background until it ends.
	#[track_caller]
	fn exec(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

impl<F: Fn(Pin<Box<dyn Future<Output = ()> + Send>>)> Executor for F {
	fn exec(&self, f: Pin<Box<dyn Future<Output = ()> + Send>>) {
		self(f)
	}
}

/// Spawns on the ambient tokio runtime.
#[derive(Default, Debug, Clone, Copy)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
	fn exec(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
		tokio::spawn(future);
	}
}

/// Executor shared by the node, its dial workers and their attempts.
#[derive(Clone)]
pub(crate) struct TaskExecutor(Arc<dyn Executor + Send + Sync>);

impl TaskExecutor {
	pub(crate) fn new(executor: impl Executor + Send + Sync + 'static) -> Self {
		Self(Arc::new(executor))
	}

	#[track_caller]
	pub(crate) fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) {
		let future = future.boxed();

		self.0.exec(future);
	}
}

impl Default for TaskExecutor {
	fn default() -> Self {
		Self::new(TokioExecutor)
	}
}
