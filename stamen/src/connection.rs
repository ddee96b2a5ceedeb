use core::{
	ptr,
	sync::atomic::{AtomicU64, AtomicU8, Ordering},
};
use std::{
	fmt::{self, Debug, Formatter},
	hash::{Hash, Hasher},
	ops::Deref,
	sync::{Arc, Weak},
	thread::{self, ThreadId},
};

use parking_lot::{Condvar, Mutex};
use scopeguard::{guard, ScopeGuard};

use crate::{receiver::ReceptorCore, trace};

/// Process-unique identity of one subscription.
///
/// Ids are handed out in increasing order, so they also record registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
	fn next() -> Self {
		static COUNTER: AtomicU64 = AtomicU64::new(0);

		let id = COUNTER.fetch_add(1, Ordering::Relaxed);
		assert_ne!(id, u64::MAX, "Ran out of connection ids.");
		Self(id)
	}

	/// The raw counter value.
	#[must_use]
	pub fn get(self) -> u64 {
		self.0
	}
}

/// The type-erased side of a signal, as seen by its connections.
pub(crate) trait Detach: Send + Sync {
	/// Removes the entry for `id`, if any.
	///
	/// **Returns** whether an entry was removed.
	fn detach(&self, id: ConnectionId) -> bool;

	/// Whether the current thread is inside this signal's exclusion, e.g. in one of its callbacks.
	fn is_held_by_current_thread(&self) -> bool;
}

const ACTIVE: u8 = 0;
const DETACHING: u8 = 1;
const DETACHED: u8 = 2;

/// Shared state behind every handle to one connection.
///
/// The back-references are individually cleared by whoever wins the `ACTIVE → DETACHING` transition.
/// Nobody else writes them afterwards.
pub(crate) struct Link {
	id: ConnectionId,
	state: AtomicU8,
	/// The signal this link was created by. Unlike `signal`, this is never cleared.
	home: Weak<dyn Detach>,
	signal: Mutex<Option<Weak<dyn Detach>>>,
	receptor: Mutex<Option<Weak<ReceptorCore>>>,
	/// The thread running [`Link::finish_detach`], once claimed.
	detacher: Mutex<Option<ThreadId>>,
	/// Guards the `DETACHING → DETACHED` store against missed wake-ups.
	settle: Mutex<()>,
	settled: Condvar,
}

impl Link {
	pub(crate) fn new(signal: Weak<dyn Detach>, receptor: Option<Weak<ReceptorCore>>) -> Arc<Self> {
		Arc::new(Self {
			id: ConnectionId::next(),
			state: AtomicU8::new(ACTIVE),
			home: signal.clone(),
			signal: Mutex::new(Some(signal)),
			receptor: Mutex::new(receptor),
			detacher: Mutex::new(None),
			settle: Mutex::new(()),
			settled: Condvar::new(),
		})
	}

	pub(crate) fn id(&self) -> ConnectionId {
		self.id
	}

	pub(crate) fn is_active(&self) -> bool {
		self.state.load(Ordering::Acquire) == ACTIVE
	}

	pub(crate) fn belongs_to<S: ?Sized>(&self, signal: *const S) -> bool {
		ptr::addr_eq(self.home.as_ptr(), signal)
	}

	/// Claims this link for detaching.
	///
	/// Exactly one caller ever sees `true`, and that caller **must** follow up with [`Link::finish_detach`].
	pub(crate) fn begin_detach(&self) -> bool {
		let claimed = self
			.state
			.compare_exchange(ACTIVE, DETACHING, Ordering::AcqRel, Ordering::Acquire)
			.is_ok();
		if claimed {
			*self.detacher.lock() = Some(thread::current().id());
		}
		claimed
	}

	/// Removes this link from its signal and receptor, one lock at a time.
	///
	/// Either owner may have dropped its own entry already, in which case that step is a no-op.
	pub(crate) fn finish_detach(&self) {
		debug_assert_eq!(self.state.load(Ordering::Acquire), DETACHING);
		let _detached = guard(self, |this| {
			let _settle = this.settle.lock();
			this.state.store(DETACHED, Ordering::Release);
			this.settled.notify_all();
		});

		let signal = self.signal.lock().take();
		if let Some(signal) = signal.as_ref().and_then(Weak::upgrade) {
			signal.detach(self.id);
		}

		let receptor = self.receptor.lock().take();
		if let Some(receptor) = receptor.as_ref().and_then(Weak::upgrade) {
			receptor.remove(self.id);
		}

		trace!(connection = ?self.id, "Detached.");
	}

	/// Blocks until whoever claimed this link has finished detaching it.
	///
	/// Doesn't block on the claiming thread itself, or while this thread holds the signal's lock.
	/// The claimant may be waiting for that very lock.
	fn wait_detached(&self) {
		if *self.detacher.lock() == Some(thread::current().id())
			|| self
				.home
				.upgrade()
				.is_some_and(|signal| signal.is_held_by_current_thread())
		{
			return;
		}

		let mut settle = self.settle.lock();
		while self.state.load(Ordering::Acquire) != DETACHED {
			self.settled.wait(&mut settle);
		}
	}

	/// **Returns** whether this call claimed the link.
	/// Otherwise, waits for the claimant per [`Link::wait_detached`].
	pub(crate) fn detach(&self) -> bool {
		if self.begin_detach() {
			self.finish_detach();
			true
		} else {
			self.wait_detached();
			false
		}
	}

	fn status(&self) -> &'static str {
		match self.state.load(Ordering::Acquire) {
			ACTIVE => "active",
			DETACHING => "detaching",
			_ => "detached",
		}
	}
}

/// Token for one subscription, as returned by [`Signal::subscribe`](`crate::Signal::subscribe`)
/// and [`Signal::subscribe_to`](`crate::Signal::subscribe_to`).
///
/// Handles are cheap to clone and all refer to the same subscription.
/// Dropping a handle does **not** disconnect it. Use [`Connection::scoped`] for that.
#[derive(Clone)]
pub struct Connection {
	link: Arc<Link>,
}

impl Connection {
	pub(crate) fn new(link: Arc<Link>) -> Self {
		Self { link }
	}

	pub(crate) fn link(&self) -> &Link {
		&self.link
	}

	/// The identity of this subscription.
	#[must_use]
	pub fn id(&self) -> ConnectionId {
		self.link.id
	}

	/// Whether the callback may still be invoked by future broadcasts.
	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.link.is_active()
	}

	/// Removes this subscription from its signal and, if bound, from its receiver.
	///
	/// **Idempotent** aside from the return value, and safe to call from any thread,
	/// including from inside a broadcast of the same signal.
	/// **Returns** whether this call was the one that detached the connection.
	///
	/// If another party is detaching the connection concurrently, this waits for it to finish.
	/// Once this returns, the callback isn't running on another thread and won't be invoked again.
	/// (From inside a broadcast of the same signal, the callback may be the one that's running.)
	#[allow(clippy::must_use_candidate)]
	pub fn disconnect(&self) -> bool {
		self.link.detach()
	}

	/// Wraps this handle so that the subscription ends when the wrapper is dropped.
	pub fn scoped(self) -> ScopedConnection {
		ScopedConnection(guard(self, disconnect_on_drop as fn(Connection)))
	}
}

impl Debug for Connection {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.link.id)
			.field("status", &self.link.status())
			.finish_non_exhaustive()
	}
}

impl PartialEq for Connection {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.link, &other.link)
	}
}

impl Eq for Connection {}

impl Hash for Connection {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.link.id.hash(state);
	}
}

fn disconnect_on_drop(connection: Connection) {
	connection.disconnect();
}

/// A [`Connection`] that disconnects when dropped.
#[must_use = "Scoped connections are disconnected when dropped."]
#[derive(Debug)]
pub struct ScopedConnection(ScopeGuard<Connection, fn(Connection)>);

impl ScopedConnection {
	/// Turns this back into a plain [`Connection`] without disconnecting it.
	#[must_use = "Use `drop(self)` to disconnect instead."]
	pub fn release(self) -> Connection {
		ScopeGuard::into_inner(self.0)
	}
}

impl Deref for ScopedConnection {
	type Target = Connection;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl From<Connection> for ScopedConnection {
	fn from(connection: Connection) -> Self {
		connection.scoped()
	}
}
