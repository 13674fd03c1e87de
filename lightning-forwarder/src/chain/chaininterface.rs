// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Traits and utility impls which allow other parts of lightning-forwarder to learn about the
//! feerates the chain currently demands.

use core::fmt;

/// Minimum feerate that takes a sane approach to bitcoind weight-to-vbytes rounding.
/// See the following Core Lightning commit for an explanation:
/// <https://github.com/ElementsProject/lightning/commit/2e687b9b352c9092b5e8bd4a688916ac50b44af0>
pub const FEERATE_FLOOR_SATS_PER_KW: u32 = 253;

/// [`FEERATE_FLOOR_SATS_PER_KW`] expressed per 1000 virtual bytes.
pub const FEERATE_FLOOR_SATS_PER_KVB: u32 = FEERATE_FLOOR_SATS_PER_KW * 4;

/// The unit a feerate is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeerateStyle {
	/// Satoshis per 1000 virtual bytes.
	PerKb,
	/// Satoshis per 1000 weight units.
	PerKw,
}

impl FeerateStyle {
	/// Both styles, in the order they are reported.
	pub const ALL: [FeerateStyle; 2] = [FeerateStyle::PerKb, FeerateStyle::PerKw];

	/// Converts a sat/kVB feerate into this style, rounding down and never going below the
	/// absolute floor for the style.
	pub fn from_perkb(&self, feerate_perkb: u32) -> u32 {
		match self {
			FeerateStyle::PerKb => core::cmp::max(feerate_perkb, FEERATE_FLOOR_SATS_PER_KVB),
			FeerateStyle::PerKw => core::cmp::max(feerate_perkb / 4, FEERATE_FLOOR_SATS_PER_KW),
		}
	}

	/// The absolute minimum feerate in this style.
	pub fn absolute_floor(&self) -> u32 {
		match self {
			FeerateStyle::PerKb => FEERATE_FLOOR_SATS_PER_KVB,
			FeerateStyle::PerKw => FEERATE_FLOOR_SATS_PER_KW,
		}
	}
}

impl fmt::Display for FeerateStyle {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			FeerateStyle::PerKb => f.write_str("perkb"),
			FeerateStyle::PerKw => f.write_str("perkw"),
		}
	}
}

/// A single estimate: the feerate needed to confirm within `blockcount` blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeerateEstimate {
	/// The confirmation target, in blocks.
	pub blockcount: u32,
	/// The estimated feerate, in sat/kVB.
	pub feerate_perkb: u32,
}

/// Everything the [`FeerateOracle`] knows about current feerates, in sat/kVB.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeerateEstimates {
	/// Estimates for a number of confirmation targets, in any order.
	pub estimates: Vec<FeerateEstimate>,
	/// The minimum feerate our bitcoin node relays.
	pub min_relay_feerate_perkb: u32,
	/// The minimum feerate currently accepted into our bitcoin node's mempool.
	pub mempool_min_feerate_perkb: u32,
}

impl FeerateEstimates {
	/// The usable estimates, ordered by increasing blockcount. Zero feerates (an estimator with no
	/// data) are dropped, as are repeated blockcounts after their first occurrence.
	pub fn sorted_estimates(&self) -> Vec<FeerateEstimate> {
		let mut estimates: Vec<FeerateEstimate> =
			self.estimates.iter().filter(|e| e.feerate_perkb != 0).cloned().collect();
		estimates.sort_by_key(|e| e.blockcount);
		estimates.dedup_by_key(|e| e.blockcount);
		estimates
	}
}

/// The feerate source could not be queried.
#[derive(Clone, PartialEq, Eq)]
pub struct OracleUnavailable {
	/// A human-readable error message
	pub err: String,
}

impl fmt::Debug for OracleUnavailable {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Feerate oracle unavailable: {}", self.err)
	}
}

impl fmt::Display for OracleUnavailable {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// A trait which should be implemented to provide feerate information on a number of time
/// horizons, typically by asking a bitcoin node's fee estimator.
///
/// It is called from [`FeeratePolicy::refresh`] with no locks held, so it may block.
///
/// [`FeeratePolicy::refresh`]: crate::chain::feerates::FeeratePolicy::refresh
pub trait FeerateOracle {
	/// Gets the current feerate estimates, or an error if the source is unreachable.
	fn get_feerate_estimates(&self) -> Result<FeerateEstimates, OracleUnavailable>;
}
