// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The feerate policy: turns raw estimates from a [`FeerateOracle`] into published, smoothed
//! feerate tables with the bounds we hold our peers' feerate proposals to.
//!
//! Tables for both [`FeerateStyle`]s are published together as one immutable
//! [`FeerateSnapshot`]. Readers take a reference to the current snapshot without locking and are
//! never exposed to a half-built table.

use crate::chain::chaininterface::{FeerateEstimate, FeerateEstimates, FeerateOracle, FeerateStyle, OracleUnavailable};
use crate::ln::chan_utils;
use crate::sync::{Arc, Mutex};
use crate::util::config::FeePolicyConfig;
use crate::util::errors::APIError;
use crate::util::hash_tables::{new_hash_map, HashMap};
use crate::util::logger::Logger;

use arc_swap::ArcSwap;
use serde::Serialize;

use core::cmp;
use core::ops::Deref;

/// The warning reported while the oracle cannot give us estimates.
pub const MISSING_FEERATES_WARNING: &str = "Some fee estimates unavailable: feerate oracle not responding?";

/// One confirmation-target bucket of a [`FeerateTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FeerateBucket {
	/// The confirmation target, in blocks.
	pub blockcount: u32,
	/// The latest estimate for this target.
	pub feerate: u32,
	/// The moving average of estimates for this target across refreshes.
	pub smoothed_feerate: u32,
}

/// A complete feerate table in one [`FeerateStyle`].
///
/// `floor <= min_acceptable <= max_acceptable` always holds, and every operation target lies
/// within `[floor, max_acceptable]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeerateTable {
	/// The unit all feerates in this table are expressed in.
	pub style: FeerateStyle,
	/// The lowest feerate our bitcoin node will relay or accept into its mempool.
	pub floor: u32,
	/// The lowest feerate we accept from a peer on a non-anchor channel.
	pub min_acceptable: u32,
	/// The highest feerate we accept from a peer.
	pub max_acceptable: u32,
	/// The latest estimates, ordered by increasing blockcount.
	pub estimates: Vec<FeerateBucket>,
	/// Feerate for channel funding transactions.
	pub opening: u32,
	/// Feerate for mutual close transactions.
	pub mutual_close: u32,
	/// Feerate for non-anchor commitment transactions.
	pub unilateral_close: u32,
	/// Feerate for anchor commitment transactions.
	pub unilateral_anchor_close: u32,
	/// Feerate for penalty transactions.
	pub penalty: u32,
	/// Deprecated feerate for sweeping our delayed outputs.
	pub delayed_to_us: u32,
	/// Deprecated feerate for HTLC resolution transactions.
	pub htlc_resolution: u32,
}

/// An immutable, atomically published pair of feerate tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeerateSnapshot {
	/// Bumped on every publication of new tables. Zero until the first successful refresh.
	pub generation: u64,
	/// The sat/kVB table, if we ever had estimates.
	pub perkb: Option<FeerateTable>,
	/// The sat/kW table, if we ever had estimates.
	pub perkw: Option<FeerateTable>,
	/// Set when the latest refresh failed and these tables are the last good ones (if any).
	pub warning_missing_feerates: bool,
}

impl FeerateSnapshot {
	fn empty() -> Self {
		FeerateSnapshot { generation: 0, perkb: None, perkw: None, warning_missing_feerates: false }
	}

	/// The table in the given style, if any has been published.
	pub fn table(&self, style: FeerateStyle) -> Option<&FeerateTable> {
		match style {
			FeerateStyle::PerKb => self.perkb.as_ref(),
			FeerateStyle::PerKw => self.perkw.as_ref(),
		}
	}
}

/// A [`FeerateTable`] as reported to users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeerateTableReport {
	#[allow(missing_docs)]
	pub opening: u32,
	#[allow(missing_docs)]
	pub mutual_close: u32,
	#[allow(missing_docs)]
	pub unilateral_close: u32,
	#[allow(missing_docs)]
	pub unilateral_anchor_close: u32,
	/// Only reported with [`FeePolicyConfig::emit_deprecated_feerates`].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub delayed_to_us: Option<u32>,
	/// Only reported with [`FeePolicyConfig::emit_deprecated_feerates`].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub htlc_resolution: Option<u32>,
	#[allow(missing_docs)]
	pub penalty: u32,
	#[allow(missing_docs)]
	pub min_acceptable: u32,
	#[allow(missing_docs)]
	pub max_acceptable: u32,
	#[allow(missing_docs)]
	pub floor: u32,
	#[allow(missing_docs)]
	pub estimates: Vec<FeerateBucket>,
}

/// Estimated on-chain fees, in satoshis, for the transactions a channel may need.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OnchainFeeEstimates {
	/// Fee of a channel funding transaction.
	pub opening_channel_satoshis: u64,
	/// Fee of a mutual close transaction.
	pub mutual_close_satoshis: u64,
	/// Fee of an anchor commitment transaction.
	pub unilateral_close_satoshis: u64,
	/// Fee of a non-anchor commitment transaction.
	pub unilateral_close_nonanchor_satoshis: u64,
	/// Fee of an HTLC-timeout transaction on an anchor channel.
	pub htlc_timeout_satoshis: u64,
	/// Fee of an HTLC-success transaction on an anchor channel.
	pub htlc_success_satoshis: u64,
	/// Fee of an HTLC-timeout transaction on a non-anchor channel.
	pub htlc_timeout_nonanchor_satoshis: u64,
	/// Fee of an HTLC-success transaction on a non-anchor channel.
	pub htlc_success_nonanchor_satoshis: u64,
}

/// The full feerate report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeeratesReport {
	/// Present while the oracle is failing.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub warning_missing_feerates: Option<String>,
	/// Present once we have had estimates.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub perkb: Option<FeerateTableReport>,
	/// Present once we have had estimates.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub perkw: Option<FeerateTableReport>,
	/// Present once we have had estimates.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub onchain_fee_estimates: Option<OnchainFeeEstimates>,
}

struct SmoothingState {
	perkb: HashMap<u32, u32>,
	perkw: HashMap<u32, u32>,
}

impl SmoothingState {
	fn for_style(&mut self, style: FeerateStyle) -> &mut HashMap<u32, u32> {
		match style {
			FeerateStyle::PerKb => &mut self.perkb,
			FeerateStyle::PerKw => &mut self.perkw,
		}
	}
}

/// Folds `feerate` into the moving average `prev`, giving `feerate` the weight `smoothing_factor`.
///
/// Written as `prev + w * (feerate - prev)` so a steady feerate leaves the average unchanged.
pub(crate) fn smooth_feerate(prev: u32, feerate: u32, smoothing_factor: f64) -> u32 {
	let smoothed = prev as f64 + smoothing_factor * (feerate as f64 - prev as f64);
	smoothed.floor() as u32
}

/// The first bucket at or beyond `blockcount`, or the slowest bucket if none is.
fn bucket_for(buckets: &[FeerateBucket], blockcount: u32) -> Option<&FeerateBucket> {
	buckets.iter().find(|b| b.blockcount >= blockcount).or_else(|| buckets.last())
}

fn build_table(
	style: FeerateStyle, estimates: &[FeerateEstimate], min_relay_feerate_perkb: u32,
	mempool_min_feerate_perkb: u32, config: &FeePolicyConfig, smoothed: &mut HashMap<u32, u32>,
) -> Option<FeerateTable> {
	let floor = cmp::max(style.from_perkb(min_relay_feerate_perkb), style.from_perkb(mempool_min_feerate_perkb));

	let buckets: Vec<FeerateBucket> = estimates
		.iter()
		.map(|estimate| {
			let feerate = style.from_perkb(estimate.feerate_perkb);
			let smoothed_feerate = match smoothed.get(&estimate.blockcount) {
				Some(prev) => smooth_feerate(*prev, feerate, config.smoothing_factor),
				None => feerate,
			};
			smoothed.insert(estimate.blockcount, smoothed_feerate);
			FeerateBucket { blockcount: estimate.blockcount, feerate, smoothed_feerate }
		})
		.collect();

	let min_target = bucket_for(&buckets, config.min_acceptable_blockcount)?;
	let min_acceptable = cmp::max(min_target.feerate / 2, floor);
	let highest = buckets.iter().map(|b| b.feerate).max()?;
	let max_acceptable = cmp::max(
		cmp::min(highest as u64 * config.max_feerate_multiplier as u64, u32::max_value() as u64) as u32,
		min_acceptable,
	);

	let target = |blockcount: u32| -> Option<u32> {
		let bucket = bucket_for(&buckets, blockcount)?;
		Some(cmp::min(cmp::max(bucket.smoothed_feerate, floor), max_acceptable))
	};

	Some(FeerateTable {
		style,
		floor,
		min_acceptable,
		max_acceptable,
		opening: target(config.opening_blockcount)?,
		mutual_close: target(config.mutual_close_blockcount)?,
		unilateral_close: target(config.unilateral_close_blockcount)?,
		unilateral_anchor_close: target(config.unilateral_anchor_close_blockcount)?,
		penalty: target(config.penalty_blockcount)?,
		delayed_to_us: target(config.delayed_to_us_blockcount)?,
		htlc_resolution: target(config.htlc_resolution_blockcount)?,
		estimates: buckets,
	})
}

/// Maintains the published [`FeerateSnapshot`].
///
/// Call [`FeeratePolicy::refresh`] periodically (eg every block, or every 30 seconds) to poll the
/// oracle. Readers use [`FeeratePolicy::current`] from any thread.
pub struct FeeratePolicy<F: Deref, L: Deref>
where
	F::Target: FeerateOracle,
	L::Target: Logger,
{
	config: FeePolicyConfig,
	oracle: F,
	logger: L,
	snapshot: ArcSwap<FeerateSnapshot>,
	// Held while building and publishing, so refreshes apply their smoothing in order.
	smoothing: Mutex<SmoothingState>,
}

impl<F: Deref, L: Deref> FeeratePolicy<F, L>
where
	F::Target: FeerateOracle,
	L::Target: Logger,
{
	/// Constructs a new `FeeratePolicy` with no tables published yet.
	///
	/// Fails if `config` is not usable, see [`FeePolicyConfig::validate`].
	pub fn new(config: FeePolicyConfig, oracle: F, logger: L) -> Result<Self, APIError> {
		config.validate()?;
		Ok(FeeratePolicy {
			config,
			oracle,
			logger,
			snapshot: ArcSwap::from_pointee(FeerateSnapshot::empty()),
			smoothing: Mutex::new(SmoothingState { perkb: new_hash_map(), perkw: new_hash_map() }),
		})
	}

	/// The currently published snapshot.
	pub fn current(&self) -> Arc<FeerateSnapshot> {
		self.snapshot.load_full()
	}

	/// Polls the oracle and publishes new tables, returning the snapshot now published.
	///
	/// Never fails: if the oracle cannot be reached the last good tables stay published with
	/// [`FeerateSnapshot::warning_missing_feerates`] set.
	pub fn refresh(&self) -> Arc<FeerateSnapshot> {
		let estimates = self.oracle.get_feerate_estimates();
		self.refresh_from(estimates)
	}

	/// Publishes new tables built from the given oracle response. See [`Self::refresh`].
	pub fn refresh_from(&self, estimates: Result<FeerateEstimates, OracleUnavailable>) -> Arc<FeerateSnapshot> {
		let mut smoothing = self.smoothing.lock().unwrap();
		let prev = self.snapshot.load_full();

		let estimates = match estimates {
			Ok(estimates) => estimates,
			Err(e) => {
				log_warn!(self.logger, "{}; keeping feerates from generation {}", e, prev.generation);
				return self.publish_degraded(&prev);
			},
		};
		let sorted = estimates.sorted_estimates();
		if sorted.is_empty() {
			log_warn!(self.logger, "Feerate oracle returned no estimates; keeping feerates from generation {}", prev.generation);
			return self.publish_degraded(&prev);
		}

		let mut tables = FeerateStyle::ALL.iter().map(|style| {
			build_table(
				*style,
				&sorted,
				estimates.min_relay_feerate_perkb,
				estimates.mempool_min_feerate_perkb,
				&self.config,
				smoothing.for_style(*style),
			)
		});
		let (perkb, perkw) = match (tables.next().flatten(), tables.next().flatten()) {
			(Some(perkb), Some(perkw)) => (perkb, perkw),
			_ => {
				debug_assert!(false, "tables are always built from non-empty estimates");
				return self.publish_degraded(&prev);
			},
		};

		log_debug!(
			self.logger,
			"Publishing feerates generation {}: perkw floor {} min {} max {}",
			prev.generation + 1,
			perkw.floor,
			perkw.min_acceptable,
			perkw.max_acceptable
		);
		let snapshot = Arc::new(FeerateSnapshot {
			generation: prev.generation + 1,
			perkb: Some(perkb),
			perkw: Some(perkw),
			warning_missing_feerates: false,
		});
		self.snapshot.store(Arc::clone(&snapshot));
		snapshot
	}

	fn publish_degraded(&self, prev: &FeerateSnapshot) -> Arc<FeerateSnapshot> {
		let snapshot = Arc::new(FeerateSnapshot { warning_missing_feerates: true, ..prev.clone() });
		self.snapshot.store(Arc::clone(&snapshot));
		snapshot
	}

	/// Estimated fees for common channel transactions at the current sat/kW feerates.
	pub fn onchain_fee_estimates(&self) -> Option<OnchainFeeEstimates> {
		let snapshot = self.current();
		snapshot.perkw.as_ref().map(onchain_fee_estimates)
	}

	/// The current feerates as reported to users.
	pub fn feerates_report(&self) -> FeeratesReport {
		let snapshot = self.current();
		let report = |table: &FeerateTable| FeerateTableReport {
			opening: table.opening,
			mutual_close: table.mutual_close,
			unilateral_close: table.unilateral_close,
			unilateral_anchor_close: table.unilateral_anchor_close,
			delayed_to_us: if self.config.emit_deprecated_feerates { Some(table.delayed_to_us) } else { None },
			htlc_resolution: if self.config.emit_deprecated_feerates { Some(table.htlc_resolution) } else { None },
			penalty: table.penalty,
			min_acceptable: table.min_acceptable,
			max_acceptable: table.max_acceptable,
			floor: table.floor,
			estimates: table.estimates.clone(),
		};
		FeeratesReport {
			warning_missing_feerates: if snapshot.warning_missing_feerates {
				Some(MISSING_FEERATES_WARNING.to_owned())
			} else {
				None
			},
			perkb: snapshot.perkb.as_ref().map(report),
			perkw: snapshot.perkw.as_ref().map(report),
			onchain_fee_estimates: snapshot.perkw.as_ref().map(onchain_fee_estimates),
		}
	}
}

/// A source of published feerate snapshots, as consulted by the [`BoundEnforcer`].
///
/// [`BoundEnforcer`]: crate::ln::bound_enforcer::BoundEnforcer
pub trait FeerateSource {
	/// The currently published snapshot.
	fn current_feerates(&self) -> Arc<FeerateSnapshot>;
}

impl<F: Deref, L: Deref> FeerateSource for FeeratePolicy<F, L>
where
	F::Target: FeerateOracle,
	L::Target: Logger,
{
	fn current_feerates(&self) -> Arc<FeerateSnapshot> {
		self.current()
	}
}

/// Estimated fees for common channel transactions given a sat/kW table.
pub fn onchain_fee_estimates(perkw: &FeerateTable) -> OnchainFeeEstimates {
	debug_assert_eq!(perkw.style, FeerateStyle::PerKw);
	OnchainFeeEstimates {
		opening_channel_satoshis: chan_utils::fee_for_weight(perkw.opening, chan_utils::OPENING_TX_WEIGHT),
		mutual_close_satoshis: chan_utils::fee_for_weight(perkw.mutual_close, chan_utils::MUTUAL_CLOSE_TX_WEIGHT),
		unilateral_close_satoshis: chan_utils::fee_for_weight(
			perkw.unilateral_anchor_close,
			chan_utils::ANCHOR_COMMITMENT_TX_WEIGHT,
		),
		unilateral_close_nonanchor_satoshis: chan_utils::fee_for_weight(
			perkw.unilateral_close,
			chan_utils::COMMITMENT_TX_WEIGHT,
		),
		htlc_timeout_satoshis: chan_utils::fee_for_weight(
			perkw.unilateral_close,
			chan_utils::HTLC_TIMEOUT_ANCHOR_TX_WEIGHT,
		),
		htlc_success_satoshis: chan_utils::fee_for_weight(
			perkw.unilateral_close,
			chan_utils::HTLC_SUCCESS_ANCHOR_TX_WEIGHT,
		),
		htlc_timeout_nonanchor_satoshis: chan_utils::fee_for_weight(
			perkw.unilateral_close,
			chan_utils::HTLC_TIMEOUT_TX_WEIGHT,
		),
		htlc_success_nonanchor_satoshis: chan_utils::fee_for_weight(
			perkw.unilateral_close,
			chan_utils::HTLC_SUCCESS_TX_WEIGHT,
		),
	}
}
