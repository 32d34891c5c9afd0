use std::{
	fmt,
	sync::{Arc, Mutex},
};

use multiaddr::PeerId;

/// Size class of a pending connection, reserved before a dial touches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reservation {
	pub connections: usize,
	pub memory: usize,
}

impl Default for Reservation {
	fn default() -> Self {
		Self {
			connections: 1,
			memory: 64 * 1024,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
	#[error("{resource} limit exceeded: requested {requested}, available {available}")]
	LimitExceeded {
		resource: &'static str,
		requested: usize,
		available: usize,
	},
}

/// Grants or denies budget for outbound dials.
///
/// Shared by every peer's dial worker, so implementations synchronise internally.
pub trait ResourceManager: Send + Sync + 'static {
	fn reserve(&self, peer_id: &PeerId, reservation: Reservation) -> Result<ResourceScope, ResourceError>;
}

/// A held budget reservation. Released exactly once, either explicitly or on drop.
#[must_use = "dropping a scope releases its reservation"]
pub struct ResourceScope {
	release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ResourceScope {
	pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
		Self {
			release: Some(Box::new(release)),
		}
	}

	/// A scope that holds nothing.
	pub fn empty() -> Self {
		Self { release: None }
	}

	pub fn release(&mut self) {
		if let Some(release) = self.release.take() {
			release();
		}
	}

	pub fn is_released(&self) -> bool {
		self.release.is_none()
	}
}

impl Drop for ResourceScope {
	fn drop(&mut self) {
		self.release();
	}
}

impl fmt::Debug for ResourceScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResourceScope")
			.field("released", &self.is_released())
			.finish()
	}
}

/// Never denies a reservation.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedResourceManager;

impl ResourceManager for UnlimitedResourceManager {
	fn reserve(&self, _peer_id: &PeerId, _reservation: Reservation) -> Result<ResourceScope, ResourceError> {
		Ok(ResourceScope::empty())
	}
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
	pub connections: usize,
	pub memory: usize,
}

/// Enforces process-wide connection and memory limits.
#[derive(Debug, Clone)]
pub struct LimitedResourceManager {
	limits: Usage,
	usage: Arc<Mutex<Usage>>,
}

impl LimitedResourceManager {
	pub fn new(max_connections: usize, max_memory: usize) -> Self {
		Self {
			limits: Usage {
				connections: max_connections,
				memory: max_memory,
			},
			usage: Arc::default(),
		}
	}

	/// Budget currently held by pending dials and open connections.
	pub fn usage(&self) -> Usage {
		*lock(&self.usage)
	}
}

impl ResourceManager for LimitedResourceManager {
	fn reserve(&self, peer_id: &PeerId, reservation: Reservation) -> Result<ResourceScope, ResourceError> {
		let mut usage = lock(&self.usage);

		let available = self.limits.connections.saturating_sub(usage.connections);
		if reservation.connections > available {
			tracing::debug!(%peer_id, ?reservation, "connection budget exhausted");
			return Err(ResourceError::LimitExceeded {
				resource: "connections",
				requested: reservation.connections,
				available,
			});
		}

		let available = self.limits.memory.saturating_sub(usage.memory);
		if reservation.memory > available {
			tracing::debug!(%peer_id, ?reservation, "memory budget exhausted");
			return Err(ResourceError::LimitExceeded {
				resource: "memory",
				requested: reservation.memory,
				available,
			});
		}

		usage.connections += reservation.connections;
		usage.memory += reservation.memory;
		drop(usage);

		let shared = self.usage.clone();
		Ok(ResourceScope::new(move || {
			let mut usage = lock(&shared);
			usage.connections -= reservation.connections;
			usage.memory -= reservation.memory;
		}))
	}
}

// The guarded counters are always left consistent, so a poisoned lock is still usable.
fn lock(usage: &Mutex<Usage>) -> std::sync::MutexGuard<'_, Usage> {
	usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn test_scope_releases_once() {
		let released = Arc::new(AtomicUsize::new(0));
		let counter = released.clone();
		let mut scope = ResourceScope::new(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		assert!(!scope.is_released());
		scope.release();
		scope.release();
		assert!(scope.is_released());
		drop(scope);

		assert_eq!(released.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_scope_releases_on_drop() {
		let released = Arc::new(AtomicUsize::new(0));
		let counter = released.clone();
		drop(ResourceScope::new(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		}));

		assert_eq!(released.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_limited_connections() {
		let manager = LimitedResourceManager::new(2, usize::MAX);
		let peer_id = PeerId::random();

		let first = manager.reserve(&peer_id, Reservation::default()).unwrap();
		let _second = manager.reserve(&peer_id, Reservation::default()).unwrap();
		assert_eq!(manager.usage().connections, 2);

		let error = manager.reserve(&peer_id, Reservation::default()).unwrap_err();
		assert_eq!(
			error,
			ResourceError::LimitExceeded {
				resource: "connections",
				requested: 1,
				available: 0,
			}
		);

		drop(first);
		assert_eq!(manager.usage().connections, 1);
		assert!(manager.reserve(&peer_id, Reservation::default()).is_ok());
	}

	#[test]
	fn test_limited_memory() {
		let manager = LimitedResourceManager::new(10, 100);
		let peer_id = PeerId::random();
		let reservation = Reservation {
			connections: 1,
			memory: 60,
		};

		let _scope = manager.reserve(&peer_id, reservation).unwrap();
		assert_eq!(
			manager.usage(),
			Usage {
				connections: 1,
				memory: 60
			}
		);

		let error = manager.reserve(&peer_id, reservation).unwrap_err();
		assert_eq!(error.to_string(), "memory limit exceeded: requested 60, available 40");
		assert_eq!(manager.usage().connections, 1);
	}

	#[test]
	fn test_unlimited() {
		let scope = UnlimitedResourceManager
			.reserve(&PeerId::random(), Reservation::default())
			.unwrap();
		assert!(scope.is_released());
	}
}
