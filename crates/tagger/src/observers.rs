//! Subscribe/unsubscribe registry of typed handler objects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

struct Registry<H: ?Sized> {
	next_id: AtomicU64,
	handlers: RwLock<Vec<(u64, Arc<H>)>>,
}

/// Observer list owning `Arc<H>` handlers.
///
/// Handlers stay registered until their [`Subscription`] is dropped or
/// explicitly unsubscribed. Dispatch iterates a copy of the list taken under
/// the read lock, so handlers may subscribe or unsubscribe while being called.
pub struct Observers<H: ?Sized> {
	registry: Arc<Registry<H>>,
}

/// Clones share the same handler list.
impl<H: ?Sized> Clone for Observers<H> {
	fn clone(&self) -> Self {
		Self {
			registry: Arc::clone(&self.registry),
		}
	}
}

impl<H: ?Sized + Send + Sync + 'static> Default for Observers<H> {
	fn default() -> Self {
		Self::new()
	}
}

impl<H: ?Sized + Send + Sync + 'static> Observers<H> {
	pub fn new() -> Self {
		Self {
			registry: Arc::new(Registry {
				next_id: AtomicU64::new(0),
				handlers: RwLock::new(Vec::new()),
			}),
		}
	}

	/// Registers a handler.
	#[must_use = "dropping the subscription unsubscribes the handler"]
	pub fn subscribe(&self, handler: Arc<H>) -> Subscription {
		let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
		self.registry.handlers.write().push((id, handler));
		let weak: Weak<Registry<H>> = Arc::downgrade(&self.registry);
		Subscription::from_fn(move || {
			if let Some(registry) = weak.upgrade() {
				registry.handlers.write().retain(|(hid, _)| *hid != id);
			}
		})
	}

	/// Calls `f` for every handler in subscription order.
	pub fn for_each(&self, mut f: impl FnMut(&H)) {
		let handlers: Vec<Arc<H>> = self.registry.handlers.read().iter().map(|(_, h)| Arc::clone(h)).collect();
		for handler in &handlers {
			f(handler);
		}
	}

	pub fn len(&self) -> usize {
		self.registry.handlers.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drops every handler. Outstanding subscriptions become no-ops.
	pub fn clear(&self) {
		self.registry.handlers.write().clear();
	}
}

/// Guard keeping one handler registered.
pub struct Subscription {
	remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
	fn from_fn(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
		Self {
			remove: Some(Box::new(remove)),
		}
	}

	/// Unregisters the handler now.
	pub fn unsubscribe(mut self) {
		self.release();
	}

	fn release(&mut self) {
		if let Some(remove) = self.remove.take() {
			remove();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.release();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription").field("active", &self.remove.is_some()).finish()
	}
}
