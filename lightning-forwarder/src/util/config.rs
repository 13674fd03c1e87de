// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Various user-configurable feerate limits and forwarding settings which the [`Forwarder`] and
//! [`FeeratePolicy`] apply for you.
//!
//! [`Forwarder`]: crate::ln::forwarder::Forwarder
//! [`FeeratePolicy`]: crate::chain::feerates::FeeratePolicy

use crate::util::errors::APIError;

/// Options which apply to how feerate estimates are turned into published feerate tables.
///
/// Default::default() provides sane defaults.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FeePolicyConfig {
	/// The weight given to a new estimate when folding it into the smoothed feerate of its
	/// blockcount bucket. Must be in `(0, 1]`; `1.0` disables smoothing.
	///
	/// Default value: 0.1.
	pub smoothing_factor: f64,
	/// The highest feerate we accept from a peer, as a multiple of the highest estimate we have.
	/// Proposals above this are treated as channel-fatal, so setting it too low risks closing
	/// channels whenever our peer's estimator disagrees with ours.
	///
	/// Default value: 10.
	pub max_feerate_multiplier: u32,
	/// The confirmation target whose estimate (halved) defines the lowest feerate we accept. The
	/// first estimate bucket at or beyond this many blocks is used, or the slowest bucket if none
	/// is that slow.
	///
	/// Default value: 100.
	pub min_acceptable_blockcount: u32,
	/// Confirmation target used for channel opening transactions.
	///
	/// Default value: 12.
	pub opening_blockcount: u32,
	/// Confirmation target used for mutual close transactions.
	///
	/// Default value: 100.
	pub mutual_close_blockcount: u32,
	/// Confirmation target used for non-anchor commitment transactions.
	///
	/// Default value: 6.
	pub unilateral_close_blockcount: u32,
	/// Confirmation target used for anchor commitment transactions, which can be bumped later.
	///
	/// Default value: 100.
	pub unilateral_anchor_close_blockcount: u32,
	/// Confirmation target used for penalty transactions.
	///
	/// Default value: 12.
	pub penalty_blockcount: u32,
	/// Confirmation target of the deprecated `delayed_to_us` feerate.
	///
	/// Default value: 12.
	pub delayed_to_us_blockcount: u32,
	/// Confirmation target of the deprecated `htlc_resolution` feerate.
	///
	/// Default value: 6.
	pub htlc_resolution_blockcount: u32,
	/// Whether the deprecated `delayed_to_us` and `htlc_resolution` feerates are included in
	/// feerate reports. They are always computed.
	///
	/// Default value: true.
	pub emit_deprecated_feerates: bool,
}

impl Default for FeePolicyConfig {
	fn default() -> Self {
		FeePolicyConfig {
			smoothing_factor: 0.1,
			max_feerate_multiplier: 10,
			min_acceptable_blockcount: 100,
			opening_blockcount: 12,
			mutual_close_blockcount: 100,
			unilateral_close_blockcount: 6,
			unilateral_anchor_close_blockcount: 100,
			penalty_blockcount: 12,
			delayed_to_us_blockcount: 12,
			htlc_resolution_blockcount: 6,
			emit_deprecated_feerates: true,
		}
	}
}

impl FeePolicyConfig {
	/// Checks the config for values we cannot work with.
	pub fn validate(&self) -> Result<(), APIError> {
		if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
			return Err(APIError::APIMisuseError {
				err: format!("smoothing_factor must be in (0, 1], got {}", self.smoothing_factor),
			});
		}
		if self.max_feerate_multiplier == 0 {
			return Err(APIError::APIMisuseError { err: "max_feerate_multiplier must be non-zero".to_owned() });
		}
		Ok(())
	}
}

/// Per-channel forwarding fee policy, advertised in our channel updates.
///
/// Default::default() provides sane defaults for most configurations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelConfig {
	/// Amount (in millionths of a satoshi) charged per satoshi for payments forwarded outbound
	/// over the channel.
	///
	/// Default value: 0.
	pub forwarding_fee_proportional_millionths: u32,
	/// Amount (in milli-satoshi) charged for payments forwarded outbound over the channel, in
	/// excess of [`forwarding_fee_proportional_millionths`].
	///
	/// Default value: 1000.
	///
	/// [`forwarding_fee_proportional_millionths`]: ChannelConfig::forwarding_fee_proportional_millionths
	pub forwarding_fee_base_msat: u32,
}

impl Default for ChannelConfig {
	/// Provides sane defaults for most configurations (but with zero proportional relay fees!).
	fn default() -> Self {
		ChannelConfig { forwarding_fee_proportional_millionths: 0, forwarding_fee_base_msat: 1000 }
	}
}

impl ChannelConfig {
	/// The fee, in msat, we require to forward `out_msat` over a channel with this config, or
	/// `None` if it does not fit in a `u64`.
	pub fn required_fee_msat(&self, out_msat: u64) -> Option<u64> {
		let proportional = (out_msat as u128)
			.checked_mul(self.forwarding_fee_proportional_millionths as u128)?
			/ 1_000_000;
		u64::try_from(proportional).ok()?.checked_add(self.forwarding_fee_base_msat as u64)
	}
}

/// Options for the [`Forwarder`]. Feerate tables are configured separately through
/// [`FeePolicyConfig`].
///
/// Default::default() provides sane defaults for most configurations.
///
/// [`Forwarder`]: crate::ln::forwarder::Forwarder
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ForwarderConfig {
	/// The most HTLC resolutions we buffer before [`Forwarder::push_resolution`] starts refusing
	/// them.
	///
	/// Default value: 10000.
	///
	/// [`Forwarder::push_resolution`]: crate::ln::forwarder::Forwarder::push_resolution
	pub max_pending_resolutions: usize,
}

impl Default for ForwarderConfig {
	fn default() -> Self {
		ForwarderConfig { max_pending_resolutions: 10_000 }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn required_fee() {
		let config = ChannelConfig { forwarding_fee_proportional_millionths: 100, forwarding_fee_base_msat: 1000 };
		assert_eq!(config.required_fee_msat(1_000_000), Some(1100));
		assert_eq!(config.required_fee_msat(9_999), Some(1000));
		assert_eq!(ChannelConfig::default().required_fee_msat(u64::max_value()), Some(1000));

		let config = ChannelConfig { forwarding_fee_proportional_millionths: u32::max_value(), forwarding_fee_base_msat: 0 };
		assert_eq!(config.required_fee_msat(u64::max_value()), None);
	}

	#[test]
	fn fee_policy_validation() {
		assert!(FeePolicyConfig::default().validate().is_ok());
		let mut config = FeePolicyConfig::default();
		config.smoothing_factor = 0.0;
		assert!(config.validate().is_err());
		config.smoothing_factor = 1.0;
		assert!(config.validate().is_ok());
		config.smoothing_factor = f64::NAN;
		assert!(config.validate().is_err());
		config.smoothing_factor = 0.5;
		config.max_feerate_multiplier = 0;
		assert!(config.validate().is_err());
	}
}
