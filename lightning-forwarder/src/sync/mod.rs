// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Lock and reference-counting primitives used across the crate.
//!
//! Everything is re-exported from `std` so a lock-order checking implementation can be swapped in
//! without touching call sites.

pub use std::sync::{Arc, Condvar, Mutex};

/// Per-key serialization of critical sections.
///
/// Each key gets its own [`Mutex`], created on first use. The map lock itself is only held while
/// looking up (or inserting) the per-key lock, never while the returned lock is held.
pub(crate) struct KeyedMutex<K: core::hash::Hash + Eq + Clone> {
	locks: Mutex<crate::util::hash_tables::HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: core::hash::Hash + Eq + Clone> KeyedMutex<K> {
	pub(crate) fn new() -> Self {
		Self { locks: Mutex::new(crate::util::hash_tables::new_hash_map()) }
	}

	/// Returns the lock for `key`. Callers lock it for the duration of their critical section.
	pub(crate) fn get(&self, key: &K) -> Arc<Mutex<()>> {
		let mut locks = self.locks.lock().unwrap();
		Arc::clone(locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_key_shares_lock() {
		let keyed = KeyedMutex::new();
		let a = keyed.get(&1u64);
		let b = keyed.get(&1u64);
		let c = keyed.get(&2u64);
		assert!(Arc::ptr_eq(&a, &b));
		assert!(!Arc::ptr_eq(&a, &c));

		let _held = a.lock().unwrap();
		assert!(b.try_lock().is_err());
		assert!(c.try_lock().is_ok());
	}
}
