//! C4: Handle Table — dense monotonic handle -> materialized value mapping.

use crate::error::DecodeError;
use crate::value::Value;

/// Handles are drawn from a strictly increasing counter starting here (part of the wire contract).
pub const BASE_WIRE_HANDLE: u32 = 0x7E_0000;

#[derive(Debug)]
enum Slot {
	Value(Value),
	/// Recorded by `readUnshared` — any later `REFERENCE` to this handle must fail.
	Unshared,
}

/// Dense handle -> value map, plus the monotonic handle counter.
#[derive(Debug, Default)]
pub struct HandleTable {
	slots: Vec<Slot>,
}

impl HandleTable {
	pub fn new() -> Self {
		Self { slots: Vec::new() }
	}

	/// Returns the next handle without registering anything. Actual assignment
	/// happens at `register`, which pushes exactly one new slot.
	pub fn next_handle(&self) -> u32 {
		BASE_WIRE_HANDLE + self.slots.len() as u32
	}

	/// Assigns a fresh handle and reserves its slot with a placeholder, so the
	/// handle exists (for self-referential annotations) before the real value is known.
	pub fn reserve(&mut self) -> u32 {
		let handle = self.next_handle();
		self.slots.push(Slot::Value(Value::Null));
		handle
	}

	/// Fills in a handle reserved by `reserve`, or assigns and fills a brand new one
	/// if `handle` is exactly the next free slot.
	pub fn register(&mut self, handle: u32, value: Value, unshared: bool) {
		#[cfg(feature = "tracing")]
		tracing::trace!(handle = format_args!("0x{handle:06X}"), unshared, "handle assigned");
		let index = (handle - BASE_WIRE_HANDLE) as usize;
		let slot = if unshared { Slot::Unshared } else { Slot::Value(value) };
		if index == self.slots.len() {
			self.slots.push(slot);
		} else {
			self.slots[index] = slot;
		}
	}

	pub fn lookup(&self, handle: u32) -> Result<Value, DecodeError> {
		let index = handle.checked_sub(BASE_WIRE_HANDLE).map(|i| i as usize);
		match index.and_then(|i| self.slots.get(i)) {
			Some(Slot::Value(value)) => Ok(value.clone()),
			Some(Slot::Unshared) => Err(DecodeError::InvalidObject(format!(
				"reference to unshared handle 0x{handle:06X}"
			))),
			None => Err(DecodeError::StreamCorrupted(format!(
				"reference to unregistered handle 0x{handle:06X}"
			))),
		}
	}

	/// RESET: discard every entry and restart the counter at the base.
	pub fn reset(&mut self) {
		#[cfg(feature = "tracing")]
		tracing::debug!(reclaimed = self.slots.len(), "handle table reset");
		self.slots.clear();
	}

	pub fn len(&self) -> usize {
		self.slots.len()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	proptest! {
		#[test]
		fn reserved_handles_are_monotonic_and_gapless_for_any_count(count in 0usize..200) {
			let mut table = HandleTable::new();
			for i in 0..count as u32 {
				let handle = table.reserve();
				prop_assert_eq!(handle, BASE_WIRE_HANDLE + i);
			}
			prop_assert_eq!(table.len(), count);
		}
	}

	#[test]
	fn handles_are_monotonic_and_gapless() {
		let mut table = HandleTable::new();
		for i in 0..5u32 {
			let handle = table.reserve();
			assert_eq!(handle, BASE_WIRE_HANDLE + i);
		}
	}

	#[test]
	fn reset_restarts_the_counter() {
		let mut table = HandleTable::new();
		table.reserve();
		table.reserve();
		table.reset();
		assert_eq!(table.next_handle(), BASE_WIRE_HANDLE);
	}

	#[test]
	fn unshared_reference_fails() {
		let mut table = HandleTable::new();
		let handle = table.next_handle();
		table.register(handle, Value::Null, true);
		assert!(matches!(table.lookup(handle), Err(DecodeError::InvalidObject(_))));
	}
}
