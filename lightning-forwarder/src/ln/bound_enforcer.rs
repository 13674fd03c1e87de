// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Holds peer feerate proposals to the bounds of the published feerate tables.
//!
//! A proposal outside the bounds is fatal to the channel: before commitments are secured we walk
//! away from the funding, afterwards we close unilaterally. Proposals are never clamped.

use crate::chain::feerates::FeerateSource;
use crate::events::{Event, EventQueue};
use crate::ln::channel::ChannelFeeContext;
use crate::ln::types::ChannelId;
use crate::sync::Mutex;
use crate::util::hash_tables::{new_hash_set, HashSet};
use crate::util::logger::Logger;

use core::ops::Deref;

/// Which bound a proposal broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationReason {
	/// The proposal was above the table's `max_acceptable`.
	AboveMaximum {
		/// The bound at the time of the proposal.
		max_acceptable: u32,
	},
	/// The proposal was below the table's `min_acceptable` on a channel without anchors.
	BelowMinimum {
		/// The bound at the time of the proposal.
		min_acceptable: u32,
	},
}

/// The outcome of [`BoundEnforcer::validate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
	/// The proposal is within bounds.
	Accept,
	/// The proposal is out of bounds and the channel must go.
	Violation(ViolationReason),
}

/// What must happen to a channel after a feerate violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelAction {
	/// Commitments were not yet secured, so nothing is at stake: forget the channel.
	AbandonFunding,
	/// Broadcast our latest commitment transaction.
	UnilateralClose,
}

/// Validates peer feerate proposals against the current [`FeerateSnapshot`].
///
/// [`FeerateSnapshot`]: crate::chain::feerates::FeerateSnapshot
pub struct BoundEnforcer<S: Deref, L: Deref>
where
	S::Target: FeerateSource,
	L::Target: Logger,
{
	feerates: S,
	logger: L,
	// Channels we already told the client to abandon or close.
	doomed_channels: Mutex<HashSet<ChannelId>>,
	pending_events: EventQueue,
}

impl<S: Deref, L: Deref> BoundEnforcer<S, L>
where
	S::Target: FeerateSource,
	L::Target: Logger,
{
	/// Constructs a new `BoundEnforcer` reading bounds from `feerates`.
	pub fn new(feerates: S, logger: L) -> Self {
		Self { feerates, logger, doomed_channels: Mutex::new(new_hash_set()), pending_events: EventQueue::new() }
	}

	/// Checks `proposed_feerate` (in the channel's feerate unit) against the current bounds.
	///
	/// Before any feerate table is published every proposal is accepted. Does not block and has no
	/// side effects.
	pub fn validate(&self, channel: &ChannelFeeContext, proposed_feerate: u32) -> Verdict {
		let snapshot = self.feerates.current_feerates();
		let table = match snapshot.table(channel.feerate_style) {
			Some(table) => table,
			None => return Verdict::Accept,
		};
		if proposed_feerate > table.max_acceptable {
			return Verdict::Violation(ViolationReason::AboveMaximum { max_acceptable: table.max_acceptable });
		}
		// Anchor channels can be bumped at broadcast time, so a low commitment feerate is harmless.
		if !channel.anchors && proposed_feerate < table.min_acceptable {
			return Verdict::Violation(ViolationReason::BelowMinimum { min_acceptable: table.min_acceptable });
		}
		Verdict::Accept
	}

	/// Validates a proposal and applies the verdict.
	///
	/// On acceptance the proposal is recorded as the channel's last validated feerate. On
	/// violation an [`Event::FeerateViolation`] is queued, unless one was already queued for this
	/// channel.
	pub fn handle_proposal(&self, channel: &mut ChannelFeeContext, proposed_feerate: u32) -> Verdict {
		let verdict = self.validate(channel, proposed_feerate);
		match verdict {
			Verdict::Accept => {
				log_trace!(self.logger, "Accepted feerate {} for channel {}", proposed_feerate, channel.channel_id);
				channel.last_validated_feerate = Some(proposed_feerate);
			},
			Verdict::Violation(reason) => {
				if !self.doomed_channels.lock().unwrap().insert(channel.channel_id) {
					log_debug!(
						self.logger,
						"Ignoring feerate {} for channel {} which is already being closed",
						proposed_feerate,
						channel.channel_id
					);
					return verdict;
				}
				let action = if channel.commitments_secured {
					ChannelAction::UnilateralClose
				} else {
					ChannelAction::AbandonFunding
				};
				log_error!(
					self.logger,
					"Peer proposed feerate {} {} for channel {} ({:?}), {:?}",
					proposed_feerate,
					channel.feerate_style,
					channel.channel_id,
					reason,
					action
				);
				let event = Event::FeerateViolation {
					channel_id: channel.channel_id,
					proposed_feerate,
					reason,
					action,
					requires_confirmed_inputs: channel.requires_confirmed_inputs,
				};
				self.pending_events.enqueue(event);
			},
		}
		verdict
	}

	/// Forgets a channel once it is closed or abandoned.
	///
	/// Until then every further violation on the channel is ignored, so the close is requested
	/// only once.
	pub fn channel_closed(&self, channel_id: &ChannelId) {
		self.doomed_channels.lock().unwrap().remove(channel_id);
	}

	/// Returns and clears all queued events.
	pub fn get_and_clear_pending_events(&self) -> Vec<Event> {
		self.pending_events.get_and_clear_pending_events()
	}

	/// Returns the next queued event, if any.
	pub fn next_event(&self) -> Option<Event> {
		self.pending_events.next_event()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::chain::chaininterface::{FeerateEstimate, FeerateEstimates, FeerateStyle};
	use crate::chain::feerates::FeeratePolicy;
	use crate::util::config::FeePolicyConfig;
	use crate::util::test_utils::{TestFeerateOracle, TestLogger};

	fn oracle() -> TestFeerateOracle {
		TestFeerateOracle::new(Ok(FeerateEstimates {
			estimates: vec![
				FeerateEstimate { blockcount: 6, feerate_perkb: 20000 },
				FeerateEstimate { blockcount: 100, feerate_perkb: 4000 },
			],
			min_relay_feerate_perkb: 1000,
			mempool_min_feerate_perkb: 1000,
		}))
	}

	fn channel(anchors: bool, commitments_secured: bool) -> ChannelFeeContext {
		ChannelFeeContext {
			channel_id: ChannelId([1; 32]),
			feerate_style: FeerateStyle::PerKw,
			anchors,
			last_validated_feerate: None,
			commitments_secured,
			requires_confirmed_inputs: true,
		}
	}

	#[test]
	fn accepts_everything_without_tables() {
		let oracle = oracle();
		let logger = TestLogger::new();
		let policy = FeeratePolicy::new(FeePolicyConfig::default(), &oracle, &logger).unwrap();
		let enforcer = BoundEnforcer::new(&policy, &logger);
		assert_eq!(enforcer.validate(&channel(false, true), u32::max_value()), Verdict::Accept);
		assert_eq!(enforcer.validate(&channel(false, true), 0), Verdict::Accept);
	}

	#[test]
	fn bounds() {
		let oracle = oracle();
		let logger = TestLogger::new();
		let policy = FeeratePolicy::new(FeePolicyConfig::default(), &oracle, &logger).unwrap();
		policy.refresh();
		let enforcer = BoundEnforcer::new(&policy, &logger);

		// perkw: highest estimate 5000, 100-block estimate 1000.
		let non_anchor = channel(false, true);
		assert_eq!(enforcer.validate(&non_anchor, 50_000), Verdict::Accept);
		assert_eq!(
			enforcer.validate(&non_anchor, 50_001),
			Verdict::Violation(ViolationReason::AboveMaximum { max_acceptable: 50_000 })
		);
		assert_eq!(enforcer.validate(&non_anchor, 500), Verdict::Accept);
		assert_eq!(
			enforcer.validate(&non_anchor, 499),
			Verdict::Violation(ViolationReason::BelowMinimum { min_acceptable: 500 })
		);

		let anchor = channel(true, true);
		assert_eq!(enforcer.validate(&anchor, 253), Verdict::Accept);
		assert_eq!(
			enforcer.validate(&anchor, 50_001),
			Verdict::Violation(ViolationReason::AboveMaximum { max_acceptable: 50_000 })
		);

		let perkb = ChannelFeeContext { feerate_style: FeerateStyle::PerKb, ..non_anchor };
		assert_eq!(enforcer.validate(&perkb, 200_000), Verdict::Accept);
		assert_eq!(enforcer.validate(&perkb, 1999), Verdict::Violation(ViolationReason::BelowMinimum { min_acceptable: 2000 }));

		assert!(enforcer.get_and_clear_pending_events().is_empty());
	}

	#[test]
	fn violation_before_commitments_abandons_funding() {
		let oracle = oracle();
		let logger = TestLogger::new();
		let policy = FeeratePolicy::new(FeePolicyConfig::default(), &oracle, &logger).unwrap();
		policy.refresh();
		let enforcer = BoundEnforcer::new(&policy, &logger);

		let mut funding = channel(false, false);
		assert_eq!(enforcer.handle_proposal(&mut funding, 1000), Verdict::Accept);
		assert_eq!(funding.last_validated_feerate, Some(1000));

		let verdict = enforcer.handle_proposal(&mut funding, 60_000);
		assert_eq!(verdict, Verdict::Violation(ViolationReason::AboveMaximum { max_acceptable: 50_000 }));
		assert_eq!(funding.last_validated_feerate, Some(1000));
		assert_eq!(
			enforcer.get_and_clear_pending_events(),
			vec![Event::FeerateViolation {
				channel_id: ChannelId([1; 32]),
				proposed_feerate: 60_000,
				reason: ViolationReason::AboveMaximum { max_acceptable: 50_000 },
				action: ChannelAction::AbandonFunding,
				requires_confirmed_inputs: true,
			}]
		);

		// Channel-fatal exactly once.
		assert_eq!(enforcer.handle_proposal(&mut funding, 70_000), verdict);
		assert!(enforcer.get_and_clear_pending_events().is_empty());
		logger.assert_log_contains("lightning_forwarder::ln::bound_enforcer", "already being closed", 1);
	}

	#[test]
	fn violation_on_open_channel_closes_it() {
		let oracle = oracle();
		let logger = TestLogger::new();
		let policy = FeeratePolicy::new(FeePolicyConfig::default(), &oracle, &logger).unwrap();
		policy.refresh();
		let enforcer = BoundEnforcer::new(&policy, &logger);

		let mut open = ChannelFeeContext { requires_confirmed_inputs: false, ..channel(false, true) };
		enforcer.handle_proposal(&mut open, 300);
		match enforcer.next_event() {
			Some(Event::FeerateViolation { action, reason, requires_confirmed_inputs, .. }) => {
				assert_eq!(action, ChannelAction::UnilateralClose);
				assert_eq!(reason, ViolationReason::BelowMinimum { min_acceptable: 500 });
				assert!(!requires_confirmed_inputs);
			},
			_ => panic!("expected a feerate violation"),
		}
		assert_eq!(enforcer.next_event(), None);
	}

	#[test]
	fn every_doomed_channel_is_reported() {
		let oracle = oracle();
		let logger = TestLogger::new();
		let policy = FeeratePolicy::new(FeePolicyConfig::default(), &oracle, &logger).unwrap();
		policy.refresh();
		let enforcer = BoundEnforcer::new(&policy, &logger);

		// Nobody drains the queue while many channels go bad at once.
		let channel_id = |i: u32| {
			let mut bytes = [0; 32];
			bytes[..4].copy_from_slice(&i.to_be_bytes());
			ChannelId(bytes)
		};
		for i in 0..2000 {
			let mut doomed = ChannelFeeContext { channel_id: channel_id(i), ..channel(false, true) };
			enforcer.handle_proposal(&mut doomed, 60_000);
		}
		let events = enforcer.get_and_clear_pending_events();
		assert_eq!(events.len(), 2000);
		match events.last() {
			Some(Event::FeerateViolation { channel_id: last, .. }) => assert_eq!(*last, channel_id(1999)),
			_ => panic!("expected a feerate violation"),
		}
	}

	#[test]
	fn closed_channels_are_forgotten() {
		let oracle = oracle();
		let logger = TestLogger::new();
		let policy = FeeratePolicy::new(FeePolicyConfig::default(), &oracle, &logger).unwrap();
		policy.refresh();
		let enforcer = BoundEnforcer::new(&policy, &logger);

		let mut open = channel(false, true);
		enforcer.handle_proposal(&mut open, 60_000);
		enforcer.handle_proposal(&mut open, 60_000);
		assert_eq!(enforcer.get_and_clear_pending_events().len(), 1);

		enforcer.channel_closed(&open.channel_id);
		assert!(enforcer.doomed_channels.lock().unwrap().is_empty());

		// A later channel reusing the id gets its own verdict.
		let mut reopened = channel(false, false);
		enforcer.handle_proposal(&mut reopened, 60_000);
		match enforcer.next_event() {
			Some(Event::FeerateViolation { action, .. }) => assert_eq!(action, ChannelAction::AbandonFunding),
			_ => panic!("expected a feerate violation"),
		}
	}
}
