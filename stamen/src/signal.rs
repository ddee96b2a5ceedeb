use std::{
	cell::RefCell,
	collections::BTreeMap,
	fmt::{self, Debug, Formatter},
	mem,
	sync::{Arc, Weak},
};

use parking_lot::ReentrantMutex;

use crate::{
	connection::{ConnectionId, Detach, Link},
	receiver::{Receiver, Receptor},
	trace, Connection,
};

type Target<T> = Arc<dyn Send + Sync + Fn(&T)>;

struct Slot<T: ?Sized> {
	link: Arc<Link>,
	target: Target<T>,
}

impl<T: ?Sized> Clone for Slot<T> {
	fn clone(&self) -> Self {
		Self {
			link: Arc::clone(&self.link),
			target: Arc::clone(&self.target),
		}
	}
}

struct SignalCore<T: ?Sized> {
	/// The [`RefCell`] is only ever borrowed briefly and never across a callback,
	/// so callbacks may use the signal that is broadcasting to them.
	slots: ReentrantMutex<RefCell<BTreeMap<ConnectionId, Slot<T>>>>,
}

impl<T: ?Sized> Detach for SignalCore<T> {
	fn detach(&self, id: ConnectionId) -> bool {
		let removed = self.slots.lock().borrow_mut().remove(&id);
		removed.is_some()
	}

	fn is_held_by_current_thread(&self) -> bool {
		self.slots.is_owned_by_current_thread()
	}
}

/// A broadcaster of `&T` to any number of subscribed callbacks.
///
/// Pass multiple values as a tuple.
///
/// Callbacks are invoked in subscription order, one broadcast at a time.
/// The signal's lock is reentrant, so a callback may subscribe, unsubscribe, disconnect
/// or even broadcast again on the same signal. Connections added during a broadcast are
/// first invoked by the next one. Connections removed during a broadcast are skipped if
/// their turn hasn't come yet.
///
/// Dropping the [`Signal`] disconnects all of its connections.
///
/// ```
/// use std::sync::{
/// 	atomic::{AtomicUsize, Ordering},
/// 	Arc,
/// };
/// use stamen::Signal;
///
/// let signal = Signal::<()>::new();
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// let connection = signal.subscribe({
/// 	let counter = Arc::clone(&counter);
/// 	move |_| {
/// 		counter.fetch_add(1, Ordering::Relaxed);
/// 	}
/// });
///
/// signal.broadcast(&());
/// signal.broadcast(&());
/// signal.broadcast(&());
/// assert_eq!(counter.load(Ordering::Relaxed), 3);
///
/// assert!(connection.disconnect());
/// signal.broadcast(&());
/// assert_eq!(counter.load(Ordering::Relaxed), 3);
/// ```
pub struct Signal<T: ?Sized + 'static> {
	core: Arc<SignalCore<T>>,
}

impl<T: ?Sized + 'static> Signal<T> {
	/// Creates a [`Signal`] without connections.
	#[must_use]
	pub fn new() -> Self {
		Self {
			core: Arc::new(SignalCore {
				slots: ReentrantMutex::new(RefCell::new(BTreeMap::new())),
			}),
		}
	}

	/// Subscribes a free callback that isn't affiliated with any [`Receiver`].
	pub fn subscribe(&self, callback: impl 'static + Send + Sync + Fn(&T)) -> Connection {
		self.connect(Arc::new(callback), None)
	}

	/// Subscribes `method` to be called on `receiver`.
	///
	/// The [`Signal`] only holds on to `receiver` weakly.
	/// Once `receiver` starts dropping, `method` isn't called anymore,
	/// and its [`Receptor`] removes the connection from this [`Signal`].
	///
	/// Only [`Receiver`]s can be bound:
	///
	/// ```compile_fail
	/// use std::sync::Arc;
	/// use stamen::Signal;
	///
	/// struct NotAReceiver;
	///
	/// let signal = Signal::<()>::new();
	/// signal.subscribe_to(&Arc::new(NotAReceiver), |_, _| ());
	/// ```
	pub fn subscribe_to<R: Receiver>(
		&self,
		receiver: &Arc<R>,
		method: impl 'static + Send + Sync + Fn(&R, &T),
	) -> Connection {
		let weak = Arc::downgrade(receiver);
		let target: Target<T> = Arc::new(move |value: &T| {
			if let Some(receiver) = weak.upgrade() {
				method(&*receiver, value);
			}
		});
		self.connect(target, Some(receiver.receptor()))
	}

	fn connect(&self, target: Target<T>, receptor: Option<&Receptor>) -> Connection {
		let link = Link::new(
			Arc::downgrade(&self.core) as Weak<dyn Detach>,
			receptor.map(Receptor::downgrade),
		);

		// The receptor learns about the link first. If it severs the link before it's slotted here,
		// the link is no longer active and is left out.
		if let Some(receptor) = receptor {
			receptor.core().insert(Arc::clone(&link));
		}
		{
			let slots = self.core.slots.lock();
			if link.is_active() {
				slots.borrow_mut().insert(
					link.id(),
					Slot {
						link: Arc::clone(&link),
						target,
					},
				);
			}
		}

		trace!(connection = ?link.id(), bound = receptor.is_some(), "Subscribed.");
		Connection::new(link)
	}

	/// Removes `connection` from this [`Signal`] and from its [`Receiver`], if any.
	///
	/// **Idempotent** aside from the return value.
	/// **Returns** whether this call detached `connection`.
	/// Connections of other signals are left alone.
	#[allow(clippy::must_use_candidate)]
	pub fn unsubscribe(&self, connection: &Connection) -> bool {
		let link = connection.link();
		link.belongs_to(Arc::as_ptr(&self.core)) && link.detach()
	}

	/// Removes all connections, also from their [`Receiver`]s.
	///
	/// The [`Signal`] is empty when this returns, unless a callback subscribes during it.
	/// **Returns** how many connections this call detached.
	#[allow(clippy::must_use_candidate)]
	pub fn unsubscribe_all(&self) -> usize {
		// Slots that some other party is already detaching only need to leave the map.
		let claimed: Vec<_> = {
			let slots = self.core.slots.lock();
			let taken = mem::take(&mut *slots.borrow_mut());
			taken
				.into_values()
				.filter(|slot| slot.link.begin_detach())
				.collect()
		};

		for slot in &claimed {
			slot.link.finish_detach();
		}

		trace!(connections = claimed.len(), "Unsubscribed all.");
		claimed.len()
	}

	/// Calls each connected callback once with `value`.
	///
	/// Other threads' subscription changes and broadcasts on this [`Signal`] wait until this returns.
	/// A disconnect from another thread that has already claimed a connection doesn't stop that
	/// connection's callback from running here, since the slot stays in place until this returns.
	pub fn broadcast(&self, value: &T) {
		let slots = self.core.slots.lock();
		let snapshot: Vec<Slot<T>> = slots.borrow().values().cloned().collect();
		trace!(connections = snapshot.len(), "Broadcasting.");

		for slot in &snapshot {
			// Only removals from this thread, i.e. by earlier callbacks, can happen meanwhile.
			let live = slots.borrow().contains_key(&slot.link.id());
			if live {
				(slot.target)(value);
			}
		}
	}

	/// The number of connected callbacks.
	#[must_use]
	pub fn count(&self) -> usize {
		let slots = self.core.slots.lock();
		let count = slots.borrow().len();
		count
	}

	/// Whether there are no connected callbacks.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.count() == 0
	}
}

impl<T: ?Sized + 'static> Default for Signal<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: ?Sized + 'static> Debug for Signal<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signal")
			.field("count", &self.count())
			.finish_non_exhaustive()
	}
}

impl<T: ?Sized + 'static> Drop for Signal<T> {
	fn drop(&mut self) {
		self.unsubscribe_all();
	}
}
