//! C8: Validation Queue — priority-ordered deferred post-read callbacks.

use crate::error::DecodeError;

/// A deferred consistency check registered from within a read hook.
pub type ValidationCallback = Box<dyn FnOnce() -> Result<(), DecodeError>>;

struct Entry {
	callback: ValidationCallback,
	priority: i32,
	sequence: usize,
}

/// Allocated lazily on first registration; drained and discarded once per
/// outermost read, whether it completed normally or failed.
#[derive(Default)]
pub struct ValidationQueue {
	entries: Vec<Entry>,
	next_sequence: usize,
}

impl ValidationQueue {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts so the array stays sorted by priority descending, ties broken by
	/// insertion order.
	pub fn register(&mut self, callback: ValidationCallback, priority: i32) {
		let sequence = self.next_sequence;
		self.next_sequence += 1;
		let index = self
			.entries
			.iter()
			.position(|e| e.priority < priority)
			.unwrap_or(self.entries.len());
		self.entries.insert(index, Entry { callback, priority, sequence });
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Empties the queue without invoking anything — used when the outermost
	/// read fails, since entries registered before a failure must not fire.
	pub fn discard(&mut self) {
		self.entries.clear();
		self.next_sequence = 0;
	}

	/// Invokes every callback in priority order. Any failure aborts the drain
	/// midway — entries are discarded either way.
	pub fn drain(&mut self) -> Result<(), DecodeError> {
		let entries = std::mem::take(&mut self.entries);
		#[cfg(feature = "tracing")]
		tracing::debug!(count = entries.len(), "draining validation queue");
		self.next_sequence = 0;
		for entry in entries {
			(entry.callback)()?;
		}
		Ok(())
	}

	#[cfg(test)]
	fn priorities_in_order(&self) -> Vec<i32> {
		self.entries.iter().map(|e| e.priority).collect()
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::*;

	proptest! {
		#[test]
		fn drain_order_matches_a_stable_sort_by_descending_priority(
			priorities in proptest::collection::vec(-10i32..10, 0..30)
		) {
			let mut queue = ValidationQueue::new();
			for p in &priorities {
				queue.register(Box::new(|| Ok(())), *p);
			}
			let mut expected: Vec<(usize, i32)> = priorities.iter().copied().enumerate().collect();
			expected.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
			let expected_order: Vec<i32> = expected.into_iter().map(|(_, p)| p).collect();
			prop_assert_eq!(queue.priorities_in_order(), expected_order);
		}
	}

	#[test]
	fn equal_priority_ties_preserve_insertion_order() {
		let mut queue = ValidationQueue::new();
		for priority in [3, 1, 3, 2] {
			queue.register(Box::new(|| Ok(())), priority);
		}
		assert_eq!(queue.priorities_in_order(), vec![3, 3, 2, 1]);
	}

	#[test]
	fn drain_invokes_in_priority_order_and_empties_queue() {
		let order = Rc::new(RefCell::new(Vec::new()));
		let mut queue = ValidationQueue::new();
		for (tag, priority) in [(0, 3), (1, 1), (2, 3), (3, 2)] {
			let order = order.clone();
			queue.register(Box::new(move || {
				order.borrow_mut().push(tag);
				Ok(())
			}), priority);
		}
		queue.drain().unwrap();
		assert_eq!(*order.borrow(), vec![0, 2, 3, 1]);
		assert!(queue.is_empty());
	}

	#[test]
	fn failure_midway_still_empties_queue() {
		let mut queue = ValidationQueue::new();
		queue.register(Box::new(|| Err(DecodeError::NotActive)), 1);
		queue.register(Box::new(|| Ok(())), 0);
		assert!(queue.drain().is_err());
		assert!(queue.is_empty());
	}
}
