use std::{collections::HashSet, sync::Arc};

use stamen::{ScopedConnection, Signal};
mod _validator;
use _validator::{Log, Validator};

#[test]
fn token_detaches_both_sides() {
	let signal = Signal::<i32>::new();
	let log = Arc::new(Log::<i32>::default());

	let connection = signal.subscribe_to(&log, Log::record);
	assert_eq!(signal.count(), 1);
	assert_eq!(log.receptor_len(), 1);

	assert!(connection.disconnect());
	assert_eq!(signal.count(), 0);
	assert_eq!(log.receptor_len(), 0);
	assert!(!connection.is_connected());

	assert!(!connection.disconnect());
	assert_eq!(signal.count(), 0);

	signal.broadcast(&1);
	log.entries.expect([]);
}

#[test]
fn signal_detaches_both_sides() {
	let signal = Signal::<i32>::new();
	let log = Arc::new(Log::<i32>::default());

	let connection = signal.subscribe_to(&log, Log::record);
	assert!(signal.unsubscribe(&connection));
	assert_eq!(signal.count(), 0);
	assert_eq!(log.receptor_len(), 0);

	assert!(!signal.unsubscribe(&connection));
	assert!(!connection.disconnect());
}

#[test]
fn foreign_connections_are_ignored() {
	let a = Signal::<()>::new();
	let b = Signal::<()>::new();

	let on_a = a.subscribe(|()| ());
	assert!(!b.unsubscribe(&on_a));
	assert!(on_a.is_connected());
	assert_eq!(a.count(), 1);

	assert!(a.unsubscribe(&on_a));
}

#[test]
fn clones_share_one_subscription() {
	let signal = Signal::<()>::new();
	let v = Arc::new(Validator::new());

	let connection = signal.subscribe({
		let v = Arc::clone(&v);
		move |()| v.push(())
	});
	let clone = connection.clone();
	assert_eq!(connection, clone);
	assert_eq!(connection.id(), clone.id());

	drop(connection);
	signal.broadcast(&());
	v.expect([()]);

	assert!(clone.disconnect());
	signal.broadcast(&());
	v.expect([]);
}

#[test]
fn ids_are_unique() {
	let a = Signal::<()>::new();
	let b = Signal::<u8>::new();

	let connections: Vec<_> = (0..8)
		.flat_map(|_| [a.subscribe(|()| ()), b.subscribe(|_| ())])
		.collect();
	let ids: HashSet<_> = connections.iter().map(|c| c.id()).collect();
	assert_eq!(ids.len(), connections.len());

	let set: HashSet<_> = connections.iter().cloned().collect();
	assert_eq!(set.len(), connections.len());
}

#[test]
fn dropping_a_token_keeps_the_subscription() {
	let signal = Signal::<()>::new();
	let v = Arc::new(Validator::new());

	drop(signal.subscribe({
		let v = Arc::clone(&v);
		move |()| v.push("still here")
	}));

	signal.broadcast(&());
	v.expect(["still here"]);
	assert_eq!(signal.count(), 1);
}

#[test]
fn scoped() {
	let signal = Signal::<()>::new();
	let v = Arc::new(Validator::new());

	let scoped = signal
		.subscribe({
			let v = Arc::clone(&v);
			move |()| v.push("scoped")
		})
		.scoped();
	assert!(scoped.is_connected());

	signal.broadcast(&());
	v.expect(["scoped"]);

	drop(scoped);
	assert_eq!(signal.count(), 0);
	signal.broadcast(&());
	v.expect([]);
}

#[test]
fn scoped_release() {
	let signal = Signal::<()>::new();

	let scoped: ScopedConnection = signal.subscribe(|()| ()).into();
	let connection = scoped.release();
	assert!(connection.is_connected());
	assert_eq!(signal.count(), 1);

	let scoped = connection.clone().scoped();
	assert!(scoped.disconnect());
	drop(scoped);
	assert!(!connection.is_connected());
}

#[test]
fn disconnect_after_signal_drop() {
	let log = Arc::new(Log::<i32>::default());
	let signal = Signal::<i32>::new();

	let bound = signal.subscribe_to(&log, Log::record);
	let free = signal.subscribe(|_| ());
	drop(signal);

	assert!(!bound.is_connected());
	assert!(!free.is_connected());
	assert!(!bound.disconnect());
	assert!(!free.disconnect());
	assert_eq!(log.receptor_len(), 0);
}
