use std::{
	collections::BTreeMap,
	fmt::{self, Debug, Formatter},
	mem,
	sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{
	connection::{ConnectionId, Link},
	trace,
};

/// Capability of objects that can be bound to a [`Signal`](`crate::Signal`) with
/// [`Signal::subscribe_to`](`crate::Signal::subscribe_to`).
///
/// Adopt it by embedding a [`Receptor`] and returning it here.
/// When the object is dropped, its [`Receptor`] disconnects everything bound to it.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use stamen::{Receiver, Receptor, Signal};
///
/// #[derive(Default)]
/// struct Log {
/// 	entries: Mutex<Vec<i32>>,
/// 	receptor: Receptor,
/// }
///
/// impl Receiver for Log {
/// 	fn receptor(&self) -> &Receptor {
/// 		&self.receptor
/// 	}
/// }
///
/// impl Log {
/// 	fn push(&self, value: &i32) {
/// 		self.entries.lock().unwrap().push(*value);
/// 	}
/// }
///
/// let signal = Signal::<i32>::new();
/// let log = Arc::new(Log::default());
/// signal.subscribe_to(&log, Log::push);
///
/// signal.broadcast(&42);
/// assert_eq!(*log.entries.lock().unwrap(), [42]);
///
/// drop(log);
/// assert_eq!(signal.count(), 0);
/// signal.broadcast(&43);
/// ```
pub trait Receiver: 'static + Send + Sync {
	/// The connection set owned by this object.
	fn receptor(&self) -> &Receptor;
}

/// The set of connections bound to one [`Receiver`].
///
/// Dropping a [`Receptor`] detaches each of its connections from its signal.
pub struct Receptor {
	core: Arc<ReceptorCore>,
}

pub(crate) struct ReceptorCore {
	links: Mutex<BTreeMap<ConnectionId, Arc<Link>>>,
}

impl ReceptorCore {
	pub(crate) fn insert(&self, link: Arc<Link>) {
		self.links.lock().insert(link.id(), link);
	}

	pub(crate) fn remove(&self, id: ConnectionId) -> bool {
		let removed = self.links.lock().remove(&id);
		removed.is_some()
	}
}

impl Receptor {
	/// Creates an empty [`Receptor`].
	#[must_use]
	pub fn new() -> Self {
		Self {
			core: Arc::new(ReceptorCore {
				links: Mutex::new(BTreeMap::new()),
			}),
		}
	}

	/// The number of connections currently bound here.
	#[must_use]
	pub fn len(&self) -> usize {
		self.core.links.lock().len()
	}

	/// Whether no connections are currently bound here.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.core.links.lock().is_empty()
	}

	pub(crate) fn core(&self) -> &ReceptorCore {
		&self.core
	}

	pub(crate) fn downgrade(&self) -> Weak<ReceptorCore> {
		Arc::downgrade(&self.core)
	}
}

impl Default for Receptor {
	fn default() -> Self {
		Self::new()
	}
}

impl Debug for Receptor {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Receptor")
			.field("len", &self.len())
			.finish_non_exhaustive()
	}
}

impl Drop for Receptor {
	fn drop(&mut self) {
		// The owning receiver is already unreachable through its `Weak`s.
		// Finishing claimed links doesn't need this set's lock.
		let claimed: Vec<_> = {
			let mut links = self.core.links.lock();
			mem::take(&mut *links)
				.into_values()
				.filter(|link| link.begin_detach())
				.collect()
		};
		trace!(connections = claimed.len(), "Receptor dropped.");

		for link in &claimed {
			link.finish_detach();
		}
	}
}
