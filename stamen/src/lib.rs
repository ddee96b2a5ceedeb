#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! Each [`Signal`] serialises its own subscription changes and broadcasts with a reentrant lock.
//! A [`Connection`]'s detach state is a separate atomic, so severing a connection never holds more
//! than one lock at a time, regardless of whether it was started by the token, the signal or the receiver.

mod connection;
mod receiver;
mod signal;

pub use connection::{Connection, ConnectionId, ScopedConnection};
pub use receiver::{Receiver, Receptor};
pub use signal::Signal;

/// Lifecycle events go to [`tracing`](https://docs.rs/tracing) at `trace` level when the `tracing` feature is enabled.
macro_rules! trace {
	($($tt:tt)*) => {
		#[cfg(feature = "tracing")]
		::tracing::trace!($($tt)*);
	};
}
pub(crate) use trace;
