// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The top-level forwarding object lives here.
//!
//! The [`Forwarder`] decides, for each incoming HTLC, whether it is forwarded and over which of
//! our channels. Every attempt is recorded in the [`ForwardLedger`] before the outgoing HTLC is
//! committed, and every resolution of an outgoing HTLC is recorded before it is passed upstream
//! as an [`Event::ForwardResolved`].
//!
//! A forward moves through the states
//! ```text
//! received -> local_failed
//! received -> offered -> settled | failed | local_failed
//! ```
//! with the terminal states never left again.

use crate::events::{Event, EventQueue};
use crate::ln::channel::{ChannelLedger, OutboundChannel, OutgoingHtlc};
use crate::ln::forward_ledger::{ForwardFilter, ForwardLedger, ForwardOutcome, ForwardRecord, ForwardStatus};
use crate::ln::onion::{IncomingHtlc, OnionProcessor, OnionStyle};
use crate::ln::types::{ForwardId, PaymentHash, PaymentPreimage};
use crate::sync::{KeyedMutex, Mutex};
use crate::util::config::ForwarderConfig;
use crate::util::errors::{failcode_to_failreason, failure_codes, APIError, HTLCFailure, HTLCFailureKind, LedgerError};
use crate::util::logger::{Logger, WithContext};
use crate::util::persist::KVStore;
use crate::util::time::TimeProvider;

use core::ops::Deref;
use core::time::Duration;
use std::collections::VecDeque;

/// The failure reason recorded for forwards which were found resolved on neither side after a
/// restart.
pub const LOST_IN_RECOVERY_FAILREASON: &str = "lost in recovery";

/// The resolution of an outgoing HTLC, as reported by the channel state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HtlcResolution {
	/// The next hop fulfilled the HTLC.
	Settled {
		/// The preimage the HTLC was fulfilled with.
		payment_preimage: PaymentPreimage,
	},
	/// The next hop (or a node beyond it) failed the HTLC.
	Failed {
		/// The BOLT 4 failure code, if it could be determined.
		failcode: u16,
		/// The failure reason.
		failreason: String,
	},
}

/// Forwards HTLCs and keeps the [`ForwardLedger`] up to date.
///
/// Incoming HTLCs are handed to [`Self::handle_incoming_htlc`], which may be called from many
/// threads at once: decisions for different HTLCs are independent, and staging and committing
/// HTLCs on the same outgoing channel is serialized internally.
///
/// Resolutions of outgoing HTLCs are queued with [`Self::push_resolution`] and applied by
/// [`Self::process_pending_resolutions`], each producing exactly one terminal ledger write and
/// one [`Event::ForwardResolved`].
///
/// After a restart, call [`Self::reconcile_on_startup`] once before handling new HTLCs.
pub struct Forwarder<O: Deref, C: Deref, K: Deref, T: Deref, L: Deref>
where
	O::Target: OnionProcessor,
	C::Target: ChannelLedger,
	K::Target: KVStore,
	T::Target: TimeProvider,
	L::Target: Logger,
{
	config: ForwarderConfig,
	onion_processor: O,
	channel_ledger: C,
	forward_ledger: ForwardLedger<K, L>,
	time_provider: T,
	logger: L,

	// Serializes staging and committing per outgoing short channel id.
	channel_locks: KeyedMutex<u64>,
	pending_resolutions: Mutex<VecDeque<(ForwardId, HtlcResolution)>>,
	pending_events: EventQueue,
}

// Where the onion told us to go, for recording on local failures.
struct RequestedForward {
	short_channel_id: u64,
	amount_msat: u64,
}

impl<O: Deref, C: Deref, K: Deref, T: Deref, L: Deref> Forwarder<O, C, K, T, L>
where
	O::Target: OnionProcessor,
	C::Target: ChannelLedger,
	K::Target: KVStore,
	T::Target: TimeProvider,
	L::Target: Logger,
{
	/// Constructs a new `Forwarder` around an existing (possibly freshly read) [`ForwardLedger`].
	pub fn new(
		config: ForwarderConfig, onion_processor: O, channel_ledger: C, forward_ledger: ForwardLedger<K, L>,
		time_provider: T, logger: L,
	) -> Self {
		Forwarder {
			config,
			onion_processor,
			channel_ledger,
			forward_ledger,
			time_provider,
			logger,
			channel_locks: KeyedMutex::new(),
			pending_resolutions: Mutex::new(VecDeque::new()),
			pending_events: EventQueue::new(),
		}
	}

	/// The ledger of all forwards, for queries and reports.
	pub fn forward_ledger(&self) -> &ForwardLedger<K, L> {
		&self.forward_ledger
	}

	/// Decides what to do with an incoming HTLC and, if it is to be forwarded, records and commits
	/// the outgoing HTLC.
	///
	/// Returns the committed outgoing HTLC, or the failure with which the incoming HTLC must be
	/// failed back upstream. Every decision except [`HTLCFailureKind::LedgerWriteFailure`] leaves
	/// a record in the ledger.
	///
	/// Each incoming HTLC must be handed to us only once.
	pub fn handle_incoming_htlc(&self, htlc: &IncomingHtlc) -> Result<OutgoingHtlc, HTLCFailure> {
		let logger = WithContext::from(&self.logger, Some(htlc.short_channel_id), Some(htlc.htlc_id));
		let received_time = self.time_provider.duration_since_epoch();

		let onion = match self.onion_processor.decode_onion(htlc) {
			Ok(onion) => onion,
			Err(e) => {
				log_debug!(logger, "Failing HTLC with undecodable onion: {:?}", e);
				let failure = HTLCFailure {
					failcode: e.failcode,
					failreason: failcode_to_failreason(e.failcode),
					kind: HTLCFailureKind::InvalidOnion,
				};
				return Err(self.fail_locally(htlc, e.style, received_time, None, failure));
			},
		};
		let style = onion.style();
		let instruction = *onion.instruction();
		let out_msat = instruction.amt_to_forward_msat;
		let requested = RequestedForward {
			short_channel_id: instruction.next_short_channel_id,
			amount_msat: out_msat,
		};

		let channel = match self.select_channel(instruction.next_short_channel_id, out_msat) {
			Ok(channel) => channel,
			Err(failure) => {
				log_debug!(
					logger,
					"No channel to forward {} msat over towards {}: {}",
					out_msat,
					log_scid!(instruction.next_short_channel_id),
					failure.failreason
				);
				return Err(self.fail_locally(htlc, style, received_time, Some(requested), failure));
			},
		};

		let fee_msat = htlc.amount_msat.checked_sub(out_msat);
		let required_fee_msat = channel.config.required_fee_msat(out_msat);
		let fee_sufficient = match (fee_msat, required_fee_msat) {
			(Some(fee), Some(required)) => fee >= required,
			_ => false,
		};
		if !fee_sufficient {
			log_debug!(
				logger,
				"Fee insufficient to forward {} msat of {} msat over {}: required {:?}",
				out_msat,
				htlc.amount_msat,
				log_scid!(channel.short_channel_id),
				required_fee_msat
			);
			let failure = HTLCFailure::new(HTLCFailureKind::InsufficientFee, failure_codes::FEE_INSUFFICIENT);
			let requested = RequestedForward { short_channel_id: channel.short_channel_id, amount_msat: out_msat };
			return Err(self.fail_locally(htlc, style, received_time, Some(requested), failure));
		}

		self.forward_over(htlc, style, received_time, &channel, instruction.outgoing_cltv_value, out_msat, &logger)
	}

	// Returns the best candidate channel for forwarding `out_msat` towards the peer of
	// `short_channel_id`: the requested channel if it can carry the HTLC, otherwise the one with
	// the most outbound capacity.
	fn select_channel(&self, short_channel_id: u64, out_msat: u64) -> Result<OutboundChannel, HTLCFailure> {
		let candidates = match self.channel_ledger.candidate_channels(short_channel_id) {
			Some(candidates) => candidates,
			None => return Err(HTLCFailure::new(HTLCFailureKind::NoRoute, failure_codes::UNKNOWN_NEXT_PEER)),
		};

		let best = candidates
			.iter()
			.filter(|channel| channel.can_carry(out_msat))
			.max_by_key(|channel| {
				(channel.short_channel_id == short_channel_id, channel.outbound_capacity_msat, core::cmp::Reverse(channel.short_channel_id))
			});
		if let Some(channel) = best {
			return Ok(channel.clone());
		}

		let usable = candidates.iter().filter(|channel| channel.is_usable);
		let below_minimum = usable.clone().count() > 0 && usable.clone().all(|channel| out_msat < channel.htlc_minimum_msat);
		if below_minimum {
			Err(HTLCFailure::new(HTLCFailureKind::CapacityExceeded, failure_codes::AMOUNT_BELOW_MINIMUM))
		} else {
			Err(HTLCFailure::new(HTLCFailureKind::CapacityExceeded, failure_codes::TEMPORARY_CHANNEL_FAILURE))
		}
	}

	// Stages, records and commits the outgoing HTLC.
	fn forward_over<LC: Logger>(
		&self, htlc: &IncomingHtlc, style: OnionStyle, received_time: Duration, channel: &OutboundChannel,
		outgoing_cltv_value: u32, out_msat: u64, logger: &LC,
	) -> Result<OutgoingHtlc, HTLCFailure> {
		let scid = channel.short_channel_id;
		let channel_lock = self.channel_locks.get(&scid);

		let staged = {
			let _guard = channel_lock.lock().unwrap();
			self.channel_ledger.stage_htlc(scid, out_msat, outgoing_cltv_value, htlc.payment_hash)
		};
		let outgoing = match staged {
			Ok(outgoing) => outgoing,
			Err(e) => {
				log_debug!(logger, "Channel {} refused to stage HTLC: {:?}", log_scid!(scid), e);
				let failure =
					HTLCFailure::new(HTLCFailureKind::CapacityExceeded, failure_codes::TEMPORARY_CHANNEL_FAILURE);
				let requested = RequestedForward { short_channel_id: scid, amount_msat: out_msat };
				return Err(self.fail_locally(htlc, style, received_time, Some(requested), failure));
			},
		};

		let record = ForwardRecord {
			in_channel: htlc.short_channel_id,
			in_htlc_id: htlc.htlc_id,
			in_msat: htlc.amount_msat,
			status: ForwardStatus::Offered,
			received_time,
			style,
			payment_hash: htlc.payment_hash,
			out_channel: Some(scid),
			out_htlc_id: Some(outgoing.htlc_id),
			out_msat: Some(out_msat),
			fee_msat: htlc.amount_msat.checked_sub(out_msat),
			resolved_time: None,
			failcode: None,
			failreason: None,
		};
		// The record must be durable before the HTLC is, so that a crash never leaves an outgoing
		// HTLC we have no record of.
		if let Err(e) = self.forward_ledger.append(record) {
			log_error!(logger, "Failed to record forward over {}, failing it back: {}", log_scid!(scid), e);
			let _guard = channel_lock.lock().unwrap();
			self.channel_ledger.cancel_htlc(&outgoing);
			return Err(HTLCFailure::new(HTLCFailureKind::LedgerWriteFailure, failure_codes::TEMPORARY_NODE_FAILURE));
		}

		let committed = {
			let _guard = channel_lock.lock().unwrap();
			self.channel_ledger.commit_htlc(&outgoing)
		};
		match committed {
			Ok(()) => {
				log_debug!(
					logger,
					"Forwarded {} msat over {} as HTLC {} (fee {} msat)",
					out_msat,
					log_scid!(scid),
					outgoing.htlc_id,
					htlc.amount_msat - out_msat
				);
				Ok(outgoing)
			},
			Err(e) => {
				log_info!(logger, "Channel {} rejected commit of HTLC {}: {:?}", log_scid!(scid), outgoing.htlc_id, e);
				let failure = HTLCFailure::new(HTLCFailureKind::CommitRejected, failure_codes::TEMPORARY_CHANNEL_FAILURE);
				let outcome =
					ForwardOutcome::LocalFailed { failcode: failure.failcode, failreason: failure.failreason.clone() };
				if let Err(e) = self.forward_ledger.finalize(&htlc.forward_id(), outcome) {
					// Left offered, recovery will fail it as lost on the next restart.
					log_error!(logger, "Failed to record rejected forward: {}", e);
				}
				Err(failure)
			},
		}
	}

	// Records a forward we are failing before any outgoing HTLC was committed and hands back the
	// failure.
	fn fail_locally(
		&self, htlc: &IncomingHtlc, style: OnionStyle, received_time: Duration, requested: Option<RequestedForward>,
		failure: HTLCFailure,
	) -> HTLCFailure {
		// An onion asking for more than it brought has no valid fee, so only the channel is kept.
		let (out_channel, out_msat) = match requested {
			Some(requested) if requested.amount_msat <= htlc.amount_msat => {
				(Some(requested.short_channel_id), Some(requested.amount_msat))
			},
			Some(requested) => (Some(requested.short_channel_id), None),
			None => (None, None),
		};
		let record = ForwardRecord {
			in_channel: htlc.short_channel_id,
			in_htlc_id: htlc.htlc_id,
			in_msat: htlc.amount_msat,
			status: ForwardStatus::LocalFailed,
			received_time,
			style,
			payment_hash: htlc.payment_hash,
			out_channel,
			out_htlc_id: None,
			out_msat,
			fee_msat: out_msat.and_then(|out_msat| htlc.amount_msat.checked_sub(out_msat)),
			resolved_time: None,
			failcode: Some(failure.failcode),
			failreason: Some(failure.failreason.clone()),
		};
		if let Err(e) = self.forward_ledger.append(record) {
			let logger = WithContext::from(&self.logger, Some(htlc.short_channel_id), Some(htlc.htlc_id));
			log_error!(logger, "Failed to record local failure {:?}: {}", failure, e);
		}
		failure
	}

	/// Queues the resolution of the outgoing HTLC of the given forward. It is applied on the next
	/// call to [`Self::process_pending_resolutions`].
	///
	/// Fails with [`APIError::QueueFull`] if [`ForwarderConfig::max_pending_resolutions`]
	/// resolutions are already queued.
	pub fn push_resolution(&self, forward_id: ForwardId, resolution: HtlcResolution) -> Result<(), APIError> {
		let mut pending = self.pending_resolutions.lock().unwrap();
		if pending.len() >= self.config.max_pending_resolutions {
			return Err(APIError::QueueFull { max_size: self.config.max_pending_resolutions });
		}
		pending.push_back((forward_id, resolution));
		Ok(())
	}

	/// Applies all queued resolutions, in the order they were pushed.
	///
	/// Resolutions for unknown or already resolved forwards, and settlements whose preimage does
	/// not match the payment hash, are dropped. Resolutions which could not be durably written are
	/// kept queued for the next call.
	pub fn process_pending_resolutions(&self) {
		let resolutions: Vec<(ForwardId, HtlcResolution)> =
			self.pending_resolutions.lock().unwrap().drain(..).collect();
		let mut retry = Vec::new();

		for (forward_id, resolution) in resolutions {
			let logger = WithContext::from(&self.logger, Some(forward_id.short_channel_id), Some(forward_id.htlc_id));
			let record = match self.forward_ledger.get(&forward_id) {
				Some(record) => record,
				None => {
					log_warn!(logger, "Ignoring resolution for unknown forward");
					continue;
				},
			};
			if record.status.is_terminal() {
				log_debug!(logger, "Ignoring resolution for forward which is already {:?}", record.status);
				continue;
			}

			// Never resolve before we received, even if the clock went backwards.
			let resolved_time = self.time_provider.duration_since_epoch().max(record.received_time);
			let (outcome, payment_preimage) = match resolution {
				HtlcResolution::Settled { payment_preimage } => {
					if PaymentHash::from(payment_preimage) != record.payment_hash {
						log_error!(
							logger,
							"Ignoring settlement with preimage {} not matching payment hash {}",
							payment_preimage,
							record.payment_hash
						);
						continue;
					}
					(ForwardOutcome::Settled { resolved_time }, Some(payment_preimage))
				},
				HtlcResolution::Failed { failcode, ref failreason } => (
					ForwardOutcome::Failed { resolved_time, failcode, failreason: failreason.clone() },
					None,
				),
			};

			match self.forward_ledger.finalize(&forward_id, outcome) {
				Ok(record) => {
					log_debug!(logger, "Forward {:?}", record.status);
					self.queue_resolved_event(&record, payment_preimage);
				},
				Err(e @ LedgerError::Io(_)) | Err(e @ LedgerError::WriteInProgress(_)) => {
					log_warn!(logger, "Failed to record resolution, will retry: {}", e);
					retry.push((forward_id, resolution));
				},
				Err(e) => {
					log_error!(logger, "Dropping resolution: {}", e);
				},
			}
		}

		if !retry.is_empty() {
			let mut pending = self.pending_resolutions.lock().unwrap();
			for entry in retry.into_iter().rev() {
				pending.push_front(entry);
			}
		}
	}

	/// Reconciles forwards left offered by a previous run against the channels' commitments.
	///
	/// Resolutions the channels learned while we were down must be pushed with
	/// [`Self::push_resolution`] beforehand; they are applied first.
	///
	/// A forward whose outgoing HTLC is not in the outgoing commitment can no longer be resolved
	/// downstream: either it already was and we have been told, or we went down between recording
	/// and committing it. It is failed with [`failure_codes::TEMPORARY_NODE_FAILURE`] and
	/// [`LOST_IN_RECOVERY_FAILREASON`], and an [`Event::ForwardResolved`] tells the client to fail
	/// the incoming HTLC if it is still committed. Forwards with a committed outgoing HTLC are left
	/// for their resolution to arrive.
	///
	/// Returns the number of forwards failed.
	pub fn reconcile_on_startup(&self) -> usize {
		self.process_pending_resolutions();

		let offered = self.forward_ledger.query(&ForwardFilter { status: Some(ForwardStatus::Offered), ..Default::default() });
		log_info!(self.logger, "Reconciling {} offered forwards", offered.len());

		let mut lost = 0;
		for record in offered {
			let forward_id = record.id();
			let logger = WithContext::from(&self.logger, Some(forward_id.short_channel_id), Some(forward_id.htlc_id));
			let outgoing = match (record.out_channel, record.out_htlc_id, record.out_msat) {
				(Some(short_channel_id), Some(htlc_id), Some(amount_msat)) => {
					OutgoingHtlc { short_channel_id, htlc_id, amount_msat }
				},
				_ => {
					log_error!(logger, "Offered forward has no outgoing HTLC, skipping");
					continue;
				},
			};

			if self.channel_ledger.is_outgoing_htlc_committed(&outgoing) {
				log_trace!(logger, "Forward still pending over {}", log_scid!(outgoing.short_channel_id));
				continue;
			}

			let incoming_committed = self.channel_ledger.is_incoming_htlc_committed(&forward_id);
			log_warn!(
				logger,
				"Forward over {} lost in recovery, failing it (incoming committed: {})",
				log_scid!(outgoing.short_channel_id),
				incoming_committed
			);
			let resolved_time = self.time_provider.duration_since_epoch().max(record.received_time);
			let outcome = ForwardOutcome::Failed {
				resolved_time,
				failcode: failure_codes::TEMPORARY_NODE_FAILURE,
				failreason: LOST_IN_RECOVERY_FAILREASON.to_owned(),
			};
			match self.forward_ledger.finalize(&forward_id, outcome) {
				Ok(record) => {
					lost += 1;
					self.queue_resolved_event(&record, None);
				},
				Err(e) => {
					log_error!(logger, "Failed to record lost forward: {}", e);
				},
			}
		}
		lost
	}

	fn queue_resolved_event(&self, record: &ForwardRecord, payment_preimage: Option<PaymentPreimage>) {
		let event = Event::ForwardResolved {
			forward_id: record.id(),
			status: record.status,
			failcode: record.failcode,
			failreason: record.failreason.clone(),
			payment_preimage,
		};
		log_trace!(self.logger, "Queueing resolution event for {}", log_forward_id!(record.id()));
		self.pending_events.enqueue(event);
	}

	/// Returns and clears all queued events.
	pub fn get_and_clear_pending_events(&self) -> Vec<Event> {
		self.pending_events.get_and_clear_pending_events()
	}

	/// Returns the next queued event, if any.
	pub fn next_event(&self) -> Option<Event> {
		self.pending_events.next_event()
	}

	/// Blocks until an event is queued and returns it.
	pub fn wait_next_event(&self) -> Event {
		self.pending_events.wait_next_event()
	}
}
