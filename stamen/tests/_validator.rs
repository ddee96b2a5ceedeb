#![allow(dead_code)]

use std::{collections::VecDeque, fmt::Debug};

use parking_lot::Mutex;
use stamen::{Receiver, Receptor};

/// Records values from any thread and checks them in order.
pub struct Validator<T>(Mutex<VecDeque<T>>);

impl<T> Validator<T> {
	pub fn new() -> Self {
		Self(Mutex::new(VecDeque::new()))
	}

	pub fn push(&self, value: T) {
		self.0.lock().push_back(value);
	}

	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	#[track_caller]
	pub fn expect(&self, expected: impl IntoIterator<Item = T>)
	where
		T: Debug + Eq,
	{
		let actual: Vec<T> = self.0.lock().drain(..).collect();
		let expected: Vec<T> = expected.into_iter().collect();
		assert_eq!(actual, expected);
	}
}

impl<T> Default for Validator<T> {
	fn default() -> Self {
		Self::new()
	}
}

/// A [`Receiver`] that logs every value it's sent.
pub struct Log<T> {
	pub entries: Validator<T>,
	receptor: Receptor,
}

impl<T> Default for Log<T> {
	fn default() -> Self {
		Self {
			entries: Validator::new(),
			receptor: Receptor::new(),
		}
	}
}

impl<T> Log<T> {
	pub fn receptor_len(&self) -> usize {
		self.receptor.len()
	}
}

impl<T: 'static + Send + Clone> Log<T> {
	pub fn record(&self, value: &T) {
		self.entries.push(value.clone());
	}
}

impl<T: 'static + Send> Receiver for Log<T> {
	fn receptor(&self) -> &Receptor {
		&self.receptor
	}
}
