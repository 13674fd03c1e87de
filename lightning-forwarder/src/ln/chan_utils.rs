// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Transaction weights used to turn feerates into on-chain fee estimates.

/// Weight of a typical channel funding transaction: one P2WPKH input, the funding output and a
/// change output.
pub const OPENING_TX_WEIGHT: u64 = 702;
/// Weight of a mutual close transaction with two P2WPKH outputs.
pub const MUTUAL_CLOSE_TX_WEIGHT: u64 = 673;
/// Weight of an anchor commitment transaction with no HTLCs, plus the anchor spend.
pub const ANCHOR_COMMITMENT_TX_WEIGHT: u64 = 1124;
/// Weight of a non-anchor commitment transaction with no HTLCs.
pub const COMMITMENT_TX_WEIGHT: u64 = 724;
/// Weight of an HTLC-timeout transaction on an anchor channel.
pub const HTLC_TIMEOUT_ANCHOR_TX_WEIGHT: u64 = 666;
/// Weight of an HTLC-success transaction on an anchor channel.
pub const HTLC_SUCCESS_ANCHOR_TX_WEIGHT: u64 = 706;
/// Weight of an HTLC-timeout transaction on a non-anchor channel.
pub const HTLC_TIMEOUT_TX_WEIGHT: u64 = 663;
/// Weight of an HTLC-success transaction on a non-anchor channel.
pub const HTLC_SUCCESS_TX_WEIGHT: u64 = 703;

/// The fee, in satoshis, of a transaction of `weight` at `feerate_per_kw`, rounded down.
pub fn fee_for_weight(feerate_per_kw: u32, weight: u64) -> u64 {
	(feerate_per_kw as u64).saturating_mul(weight) / 1000
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fee_rounds_down() {
		assert_eq!(fee_for_weight(253, OPENING_TX_WEIGHT), 177);
		assert_eq!(fee_for_weight(1000, COMMITMENT_TX_WEIGHT), 724);
		assert_eq!(fee_for_weight(u32::max_value(), u64::max_value()), u64::max_value() / 1000);
	}
}
