//! Generally we use `std`'s `HashMap`s, however when the `hashbrown` feature is enabled the
//! `hashbrown` maps (seeded with `std`'s `RandomState`) are used instead.
//!
//! This module simply re-exports the `HashMap` used in the crate for public consumption.

#[cfg(not(feature = "hashbrown"))]
mod std_hashtables {
	pub use std::collections::HashMap;
	pub(crate) use std::collections::HashSet;

	/// Builds a new [`HashMap`].
	pub fn new_hash_map<K, V>() -> HashMap<K, V> {
		HashMap::new()
	}

	pub(crate) fn new_hash_set<K>() -> HashSet<K> {
		HashSet::new()
	}
}
#[cfg(not(feature = "hashbrown"))]
pub use std_hashtables::*;

#[cfg(feature = "hashbrown")]
mod hashbrown_tables {
	pub use std::collections::hash_map::RandomState;

	/// The HashMap type used in the crate.
	pub type HashMap<K, V> = hashbrown::HashMap<K, V, RandomState>;
	pub(crate) type HashSet<K> = hashbrown::HashSet<K, RandomState>;

	/// Builds a new [`HashMap`].
	pub fn new_hash_map<K, V>() -> HashMap<K, V> {
		HashMap::with_hasher(RandomState::new())
	}

	pub(crate) fn new_hash_set<K>() -> HashSet<K> {
		HashSet::with_hasher(RandomState::new())
	}
}
#[cfg(feature = "hashbrown")]
pub use hashbrown_tables::*;
