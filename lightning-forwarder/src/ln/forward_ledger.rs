// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The forward ledger: a durable record of every forward attempt and its outcome.
//!
//! Each [`ForwardRecord`] is stored under its own key in a [`KVStore`], keyed by the incoming
//! channel and HTLC id. An in-memory index serves queries. Writes to the store happen with no lock
//! held; a forward with a write in progress is marked in-flight so that concurrent writes for the
//! same forward are refused rather than interleaved.

use crate::ln::onion::OnionStyle;
use crate::ln::types::{ForwardId, PaymentHash};
use crate::sync::Mutex;
use crate::util::errors::LedgerError;
use crate::util::hash_tables::{new_hash_map, new_hash_set, HashMap, HashSet};
use crate::util::logger::Logger;
use crate::util::persist::{KVStore, FORWARD_LEDGER_PRIMARY_NAMESPACE, FORWARD_LEDGER_SECONDARY_NAMESPACE};
use crate::util::scid_utils::scid_to_string;
use crate::util::ser::{Readable, Writeable};

use serde::Serialize;

use core::ops::Deref;
use core::time::Duration;
use std::io::Cursor;

/// The state of a forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardStatus {
	/// The outgoing HTLC was offered and has not resolved yet.
	Offered,
	/// The outgoing HTLC was fulfilled.
	Settled,
	/// We failed the incoming HTLC ourselves.
	LocalFailed,
	/// The outgoing HTLC was failed by a downstream node.
	Failed,
}

impl_writeable_tlv_based_enum!(ForwardStatus,
	(0, Offered) => {},
	(2, Settled) => {},
	(4, LocalFailed) => {},
	(6, Failed) => {},
);

impl ForwardStatus {
	/// Whether no further transitions are possible from this status.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, ForwardStatus::Offered)
	}
}

/// One forward attempt, identified by its incoming HTLC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardRecord {
	/// The short channel id the HTLC arrived on.
	pub in_channel: u64,
	/// The HTLC id on [`Self::in_channel`].
	pub in_htlc_id: u64,
	/// The value of the incoming HTLC.
	pub in_msat: u64,
	/// The current state of the forward.
	pub status: ForwardStatus,
	/// When the incoming HTLC was received, since the unix epoch.
	pub received_time: Duration,
	/// The encoding of the hop payload.
	pub style: OnionStyle,
	/// The payment hash of the HTLC. Not reported, but needed to verify settlements.
	pub payment_hash: PaymentHash,
	/// The channel we forwarded (or were asked to forward) over.
	pub out_channel: Option<u64>,
	/// The HTLC id on [`Self::out_channel`], once an outgoing HTLC exists.
	pub out_htlc_id: Option<u64>,
	/// The value of the outgoing HTLC.
	pub out_msat: Option<u64>,
	/// `in_msat - out_msat`.
	pub fee_msat: Option<u64>,
	/// When the forward settled or failed downstream.
	pub resolved_time: Option<Duration>,
	/// The BOLT 4 failure code, for failed forwards.
	pub failcode: Option<u16>,
	/// The failure reason, for failed forwards.
	pub failreason: Option<String>,
}

impl_writeable_tlv_based!(ForwardRecord, {
	(0, in_channel, required),
	(1, out_channel, option),
	(2, in_htlc_id, required),
	(3, out_htlc_id, option),
	(4, in_msat, required),
	(5, out_msat, option),
	(6, status, required),
	(7, fee_msat, option),
	(8, received_time, required),
	(9, resolved_time, option),
	(10, style, required),
	(11, failcode, option),
	(12, payment_hash, required),
	(13, failreason, option),
});

impl ForwardRecord {
	/// The key this record is tracked under.
	pub fn id(&self) -> ForwardId {
		ForwardId { short_channel_id: self.in_channel, htlc_id: self.in_htlc_id }
	}

	/// Checks the field rules for the record's status, returning a description of the first one
	/// broken.
	pub fn check(&self) -> Result<(), String> {
		match (self.out_msat, self.fee_msat) {
			(Some(out_msat), Some(fee_msat)) => {
				if self.in_msat.checked_sub(out_msat) != Some(fee_msat) {
					return Err(format!(
						"fee_msat {} does not match in_msat {} - out_msat {}",
						fee_msat, self.in_msat, out_msat
					));
				}
			},
			(None, None) => {},
			_ => return Err("fee_msat must be present exactly when out_msat is".to_owned()),
		}

		let resolved = matches!(self.status, ForwardStatus::Settled | ForwardStatus::Failed);
		match self.resolved_time {
			Some(resolved_time) if resolved => {
				if resolved_time < self.received_time {
					return Err("resolved_time precedes received_time".to_owned());
				}
			},
			None if !resolved => {},
			_ => return Err(format!("resolved_time presence does not match status {:?}", self.status)),
		}

		let failed = matches!(self.status, ForwardStatus::LocalFailed | ForwardStatus::Failed);
		if self.failcode.is_some() != failed || self.failreason.is_some() != failed {
			return Err(format!("failcode/failreason presence does not match status {:?}", self.status));
		}

		// Anything that was offered downstream knows where it went.
		let offered = matches!(self.status, ForwardStatus::Offered | ForwardStatus::Settled | ForwardStatus::Failed);
		if offered && (self.out_channel.is_none() || self.out_htlc_id.is_none() || self.out_msat.is_none()) {
			return Err(format!("{:?} forward is missing its outgoing HTLC", self.status));
		}
		Ok(())
	}
}

/// The terminal outcome of an offered forward, passed to [`ForwardLedger::finalize`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
	/// The outgoing HTLC was fulfilled.
	Settled {
		/// When the fulfill arrived.
		resolved_time: Duration,
	},
	/// The outgoing HTLC was failed downstream.
	Failed {
		/// When the failure arrived.
		resolved_time: Duration,
		/// The failure code.
		failcode: u16,
		/// The failure reason.
		failreason: String,
	},
	/// We aborted the forward ourselves before the outgoing HTLC was committed.
	LocalFailed {
		/// The failure code returned upstream.
		failcode: u16,
		/// The failure reason.
		failreason: String,
	},
}

impl ForwardOutcome {
	/// The status a record has after this outcome.
	pub fn status(&self) -> ForwardStatus {
		match self {
			ForwardOutcome::Settled { .. } => ForwardStatus::Settled,
			ForwardOutcome::Failed { .. } => ForwardStatus::Failed,
			ForwardOutcome::LocalFailed { .. } => ForwardStatus::LocalFailed,
		}
	}

	fn apply(self, record: &ForwardRecord) -> ForwardRecord {
		let mut record = record.clone();
		record.status = self.status();
		match self {
			ForwardOutcome::Settled { resolved_time } => {
				record.resolved_time = Some(resolved_time);
			},
			ForwardOutcome::Failed { resolved_time, failcode, failreason } => {
				record.resolved_time = Some(resolved_time);
				record.failcode = Some(failcode);
				record.failreason = Some(failreason);
			},
			ForwardOutcome::LocalFailed { failcode, failreason } => {
				record.failcode = Some(failcode);
				record.failreason = Some(failreason);
			},
		}
		record
	}
}

/// Selects records in [`ForwardLedger::query`]. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardFilter {
	/// Only records in this status.
	pub status: Option<ForwardStatus>,
	/// Only records which arrived on this channel.
	pub in_channel: Option<u64>,
	/// Only records which went (or were to go) out over this channel.
	pub out_channel: Option<u64>,
	/// Only records with this channel on either side.
	pub channel: Option<u64>,
	/// Only records received at or after this time.
	pub received_start: Option<Duration>,
	/// Only records received before this time.
	pub received_end: Option<Duration>,
	/// At most this many records, earliest first.
	pub limit: Option<usize>,
}

impl ForwardFilter {
	fn matches(&self, record: &ForwardRecord) -> bool {
		if self.status.map_or(false, |status| status != record.status) {
			return false;
		}
		if self.in_channel.map_or(false, |scid| scid != record.in_channel) {
			return false;
		}
		if self.out_channel.map_or(false, |scid| Some(scid) != record.out_channel) {
			return false;
		}
		if self.channel.map_or(false, |scid| scid != record.in_channel && Some(scid) != record.out_channel) {
			return false;
		}
		if self.received_start.map_or(false, |start| record.received_time < start) {
			return false;
		}
		if self.received_end.map_or(false, |end| record.received_time >= end) {
			return false;
		}
		true
	}
}

/// A [`ForwardRecord`] as reported to users. Absent fields are omitted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForwardReport {
	/// `BLOCKxTXxVOUT`
	pub in_channel: String,
	#[allow(missing_docs)]
	pub in_htlc_id: u64,
	#[allow(missing_docs)]
	pub in_msat: u64,
	#[allow(missing_docs)]
	pub status: ForwardStatus,
	/// Seconds since the unix epoch.
	pub received_time: f64,
	/// `BLOCKxTXxVOUT`
	#[serde(skip_serializing_if = "Option::is_none")]
	pub out_channel: Option<String>,
	#[allow(missing_docs)]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub out_htlc_id: Option<u64>,
	#[allow(missing_docs)]
	pub style: OnionStyle,
	#[allow(missing_docs)]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fee_msat: Option<u64>,
	#[allow(missing_docs)]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub out_msat: Option<u64>,
	/// Seconds since the unix epoch.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resolved_time: Option<f64>,
	#[allow(missing_docs)]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failcode: Option<u16>,
	#[allow(missing_docs)]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failreason: Option<String>,
}

impl From<&ForwardRecord> for ForwardReport {
	fn from(record: &ForwardRecord) -> Self {
		ForwardReport {
			in_channel: scid_to_string(record.in_channel),
			in_htlc_id: record.in_htlc_id,
			in_msat: record.in_msat,
			status: record.status,
			received_time: record.received_time.as_secs_f64(),
			out_channel: record.out_channel.map(scid_to_string),
			out_htlc_id: record.out_htlc_id,
			style: record.style,
			fee_msat: record.fee_msat,
			out_msat: record.out_msat,
			resolved_time: record.resolved_time.map(|t| t.as_secs_f64()),
			failcode: record.failcode,
			failreason: record.failreason.clone(),
		}
	}
}

/// Totals over all records, see [`ForwardLedger::fee_summary`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FeeSummary {
	/// The sum of `fee_msat` over settled forwards.
	pub fees_collected_msat: u64,
	/// Number of forwards still offered.
	pub offered: u64,
	/// Number of settled forwards.
	pub settled: u64,
	/// Number of forwards we failed locally.
	pub local_failed: u64,
	/// Number of forwards failed downstream.
	pub failed: u64,
}

struct LedgerState {
	records: HashMap<ForwardId, ForwardRecord>,
	// Forwards with a store write in progress.
	in_flight: HashSet<ForwardId>,
}

/// The durable record of forwards. See the module docs.
pub struct ForwardLedger<K: Deref, L: Deref>
where
	K::Target: KVStore,
	L::Target: Logger,
{
	kv_store: K,
	logger: L,
	state: Mutex<LedgerState>,
}

impl<K: Deref, L: Deref> ForwardLedger<K, L>
where
	K::Target: KVStore,
	L::Target: Logger,
{
	/// Constructs an empty ledger. Use [`Self::read`] to load an existing one.
	pub fn new(kv_store: K, logger: L) -> Self {
		ForwardLedger {
			kv_store,
			logger,
			state: Mutex::new(LedgerState { records: new_hash_map(), in_flight: new_hash_set() }),
		}
	}

	/// Loads every forward record from `kv_store`.
	pub fn read(kv_store: K, logger: L) -> Result<Self, LedgerError> {
		let mut records = new_hash_map();
		for key in kv_store.list(FORWARD_LEDGER_PRIMARY_NAMESPACE, FORWARD_LEDGER_SECONDARY_NAMESPACE)? {
			let id = match ForwardId::from_key(&key) {
				Some(id) => id,
				None => {
					log_warn!(logger, "Ignoring unexpected key {} in forward ledger", key);
					continue;
				},
			};
			let buf = kv_store.read(FORWARD_LEDGER_PRIMARY_NAMESPACE, FORWARD_LEDGER_SECONDARY_NAMESPACE, &key)?;
			let record: ForwardRecord =
				Readable::read(&mut Cursor::new(buf)).map_err(|err| LedgerError::Decode { key: key.clone(), err })?;
			if record.id() != id {
				return Err(LedgerError::InvalidRecord { err: format!("record for {} stored under key {}", record.id(), key) });
			}
			records.insert(id, record);
		}
		log_info!(logger, "Loaded {} forward records", records.len());
		Ok(ForwardLedger { kv_store, logger, state: Mutex::new(LedgerState { records, in_flight: new_hash_set() }) })
	}

	fn persist(&self, record: &ForwardRecord) -> Result<(), LedgerError> {
		self.kv_store
			.write(
				FORWARD_LEDGER_PRIMARY_NAMESPACE,
				FORWARD_LEDGER_SECONDARY_NAMESPACE,
				&record.id().to_key(),
				record.encode(),
			)
			.map_err(LedgerError::Io)
	}

	/// Durably records a new forward, in status offered or local_failed.
	///
	/// Returns once the record is written. Fails if a record for the same forward exists.
	pub fn append(&self, record: ForwardRecord) -> Result<(), LedgerError> {
		if record.status != ForwardStatus::Offered && record.status != ForwardStatus::LocalFailed {
			return Err(LedgerError::InvalidRecord { err: format!("cannot append a {:?} record", record.status) });
		}
		record.check().map_err(|err| LedgerError::InvalidRecord { err })?;

		let id = record.id();
		{
			let mut state = self.state.lock().unwrap();
			if state.records.contains_key(&id) || state.in_flight.contains(&id) {
				return Err(LedgerError::DuplicateForward(id));
			}
			state.in_flight.insert(id);
		}

		let res = self.persist(&record);

		let mut state = self.state.lock().unwrap();
		state.in_flight.remove(&id);
		match res {
			Ok(()) => {
				log_trace!(self.logger, "Recorded {:?} forward {}", record.status, id);
				state.records.insert(id, record);
				Ok(())
			},
			Err(e) => {
				log_error!(self.logger, "Failed to record forward {}: {}", id, e);
				Err(e)
			},
		}
	}

	/// Moves an offered forward to its terminal status and returns the updated record.
	///
	/// If the forward is already terminal this does nothing and returns the record unchanged. If
	/// the write fails the forward stays offered.
	pub fn finalize(&self, id: &ForwardId, outcome: ForwardOutcome) -> Result<ForwardRecord, LedgerError> {
		let updated = {
			let mut state = self.state.lock().unwrap();
			if state.in_flight.contains(id) {
				return Err(LedgerError::WriteInProgress(*id));
			}
			let record = state.records.get(id).ok_or(LedgerError::UnknownForward(*id))?;
			if record.status.is_terminal() {
				log_debug!(self.logger, "Forward {} already {:?}, ignoring {:?}", id, record.status, outcome.status());
				return Ok(record.clone());
			}
			let updated = outcome.apply(record);
			updated.check().map_err(|err| LedgerError::InvalidRecord { err })?;
			state.in_flight.insert(*id);
			updated
		};

		let res = self.persist(&updated);

		let mut state = self.state.lock().unwrap();
		state.in_flight.remove(id);
		match res {
			Ok(()) => {
				log_trace!(self.logger, "Forward {} is now {:?}", id, updated.status);
				state.records.insert(*id, updated.clone());
				Ok(updated)
			},
			Err(e) => {
				log_error!(self.logger, "Failed to finalize forward {}: {}", id, e);
				Err(e)
			},
		}
	}

	/// The record for a forward, if any.
	pub fn get(&self, id: &ForwardId) -> Option<ForwardRecord> {
		self.state.lock().unwrap().records.get(id).cloned()
	}

	/// Records matching `filter`, ordered by received time.
	pub fn query(&self, filter: &ForwardFilter) -> Vec<ForwardRecord> {
		let mut records: Vec<ForwardRecord> = {
			let state = self.state.lock().unwrap();
			state.records.values().filter(|r| filter.matches(r)).cloned().collect()
		};
		records.sort_by_key(|r| (r.received_time, r.in_channel, r.in_htlc_id));
		if let Some(limit) = filter.limit {
			records.truncate(limit);
		}
		records
	}

	/// Records matching `filter` in their reported form.
	pub fn report(&self, filter: &ForwardFilter) -> Vec<ForwardReport> {
		self.query(filter).iter().map(ForwardReport::from).collect()
	}

	/// Records matching `filter` as a JSON object with a single `forwards` array.
	pub fn list_forwards(&self, filter: &ForwardFilter) -> Result<serde_json::Value, serde_json::Error> {
		let mut result = serde_json::Map::new();
		result.insert("forwards".to_owned(), serde_json::to_value(self.report(filter))?);
		Ok(serde_json::Value::Object(result))
	}

	/// Collected fees and per-status counts over all records.
	pub fn fee_summary(&self) -> FeeSummary {
		let state = self.state.lock().unwrap();
		let mut summary = FeeSummary::default();
		for record in state.records.values() {
			match record.status {
				ForwardStatus::Offered => summary.offered += 1,
				ForwardStatus::Settled => {
					summary.settled += 1;
					summary.fees_collected_msat =
						summary.fees_collected_msat.saturating_add(record.fee_msat.unwrap_or(0));
				},
				ForwardStatus::LocalFailed => summary.local_failed += 1,
				ForwardStatus::Failed => summary.failed += 1,
			}
		}
		summary
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::util::test_utils::{TestLogger, TestStore};

	fn offered(in_htlc_id: u64, received_secs: u64) -> ForwardRecord {
		ForwardRecord {
			in_channel: 42,
			in_htlc_id,
			in_msat: 10_100,
			status: ForwardStatus::Offered,
			received_time: Duration::from_secs(received_secs),
			style: OnionStyle::Tlv,
			payment_hash: PaymentHash([7; 32]),
			out_channel: Some(43),
			out_htlc_id: Some(in_htlc_id + 100),
			out_msat: Some(10_000),
			fee_msat: Some(100),
			resolved_time: None,
			failcode: None,
			failreason: None,
		}
	}

	#[test]
	fn record_rules() {
		let record = offered(0, 10);
		assert!(record.check().is_ok());
		assert!(ForwardRecord { fee_msat: Some(99), ..record.clone() }.check().is_err());
		assert!(ForwardRecord { fee_msat: None, ..record.clone() }.check().is_err());
		assert!(ForwardRecord { out_msat: Some(10_101), fee_msat: Some(0), ..record.clone() }.check().is_err());
		assert!(ForwardRecord { resolved_time: Some(Duration::from_secs(11)), ..record.clone() }.check().is_err());
		assert!(ForwardRecord { out_htlc_id: None, ..record.clone() }.check().is_err());

		let settled = ForwardRecord {
			status: ForwardStatus::Settled,
			resolved_time: Some(Duration::from_secs(9)),
			..record.clone()
		};
		assert!(settled.check().is_err());
		assert!(ForwardRecord { resolved_time: Some(Duration::from_secs(10)), ..settled }.check().is_ok());

		let local_failed = ForwardRecord {
			status: ForwardStatus::LocalFailed,
			out_channel: None,
			out_htlc_id: None,
			out_msat: None,
			fee_msat: None,
			failcode: Some(0x4016),
			failreason: Some("WIRE_INVALID_ONION_PAYLOAD".to_owned()),
			..record
		};
		assert!(local_failed.check().is_ok());
		assert!(ForwardRecord { failreason: None, ..local_failed.clone() }.check().is_err());
		assert!(ForwardRecord { resolved_time: Some(Duration::from_secs(10)), ..local_failed }.check().is_err());
	}

	#[test]
	fn append_finalize_and_reload() {
		let store = TestStore::new(false);
		let logger = TestLogger::new();
		let ledger = ForwardLedger::new(&store, &logger);

		let record = offered(1, 100);
		ledger.append(record.clone()).unwrap();
		assert_eq!(store.write_count(), 1);
		match ledger.append(record.clone()) {
			Err(LedgerError::DuplicateForward(id)) => assert_eq!(id, record.id()),
			_ => panic!("duplicate append must be refused"),
		}

		let settled =
			ledger.finalize(&record.id(), ForwardOutcome::Settled { resolved_time: Duration::from_secs(105) }).unwrap();
		assert_eq!(settled.status, ForwardStatus::Settled);
		assert_eq!(settled.resolved_time, Some(Duration::from_secs(105)));
		assert_eq!(store.write_count(), 2);

		// Terminal records are immutable.
		let again = ledger
			.finalize(
				&record.id(),
				ForwardOutcome::Failed {
					resolved_time: Duration::from_secs(106),
					failcode: 0x1007,
					failreason: "WIRE_TEMPORARY_CHANNEL_FAILURE".to_owned(),
				},
			)
			.unwrap();
		assert_eq!(again, settled);
		assert_eq!(store.write_count(), 2);

		let reloaded = ForwardLedger::read(&store, &logger).unwrap();
		assert_eq!(reloaded.get(&record.id()), Some(settled));
		logger.assert_log_contains("lightning_forwarder::ln::forward_ledger", "Loaded 1 forward records", 1);
	}

	#[test]
	fn failed_write_leaves_no_trace() {
		let store = TestStore::new(false);
		let logger = TestLogger::new();
		let ledger = ForwardLedger::new(&store, &logger);

		store.set_fail_writes(true);
		match ledger.append(offered(1, 100)) {
			Err(LedgerError::Io(_)) => {},
			_ => panic!("append must surface the store failure"),
		}
		assert!(ledger.get(&offered(1, 100).id()).is_none());

		store.set_fail_writes(false);
		ledger.append(offered(1, 100)).unwrap();

		store.set_fail_writes(true);
		assert!(ledger
			.finalize(&offered(1, 100).id(), ForwardOutcome::Settled { resolved_time: Duration::from_secs(101) })
			.is_err());
		assert_eq!(ledger.get(&offered(1, 100).id()).unwrap().status, ForwardStatus::Offered);
	}

	#[test]
	fn finalize_unknown_and_invalid() {
		let store = TestStore::new(false);
		let logger = TestLogger::new();
		let ledger = ForwardLedger::new(&store, &logger);
		let id = ForwardId { short_channel_id: 1, htlc_id: 2 };
		match ledger.finalize(&id, ForwardOutcome::Settled { resolved_time: Duration::from_secs(1) }) {
			Err(LedgerError::UnknownForward(unknown)) => assert_eq!(unknown, id),
			_ => panic!(),
		}

		ledger.append(offered(3, 100)).unwrap();
		// Resolving before it was received breaks the record rules.
		assert!(matches!(
			ledger.finalize(&offered(3, 100).id(), ForwardOutcome::Settled { resolved_time: Duration::from_secs(99) }),
			Err(LedgerError::InvalidRecord { .. })
		));

		let settled = ForwardRecord { status: ForwardStatus::Settled, resolved_time: Some(Duration::from_secs(1)), ..offered(4, 0) };
		assert!(matches!(ledger.append(settled), Err(LedgerError::InvalidRecord { .. })));
	}

	#[test]
	fn query_filters_and_orders() {
		let store = TestStore::new(false);
		let logger = TestLogger::new();
		let ledger = ForwardLedger::new(&store, &logger);

		ledger.append(offered(3, 300)).unwrap();
		ledger.append(offered(1, 100)).unwrap();
		ledger.append(offered(2, 200)).unwrap();
		let other_channel = ForwardRecord { in_channel: 44, out_channel: Some(42), ..offered(1, 150) };
		ledger.append(other_channel).unwrap();
		ledger.finalize(&offered(2, 200).id(), ForwardOutcome::Settled { resolved_time: Duration::from_secs(250) }).unwrap();

		let ids = |records: Vec<ForwardRecord>| records.iter().map(|r| (r.in_channel, r.in_htlc_id)).collect::<Vec<_>>();
		assert_eq!(ids(ledger.query(&ForwardFilter::default())), vec![(42, 1), (44, 1), (42, 2), (42, 3)]);
		assert_eq!(
			ids(ledger.query(&ForwardFilter { status: Some(ForwardStatus::Offered), ..Default::default() })),
			vec![(42, 1), (44, 1), (42, 3)]
		);
		assert_eq!(ids(ledger.query(&ForwardFilter { in_channel: Some(44), ..Default::default() })), vec![(44, 1)]);
		assert_eq!(ids(ledger.query(&ForwardFilter { out_channel: Some(42), ..Default::default() })), vec![(44, 1)]);
		assert_eq!(ledger.query(&ForwardFilter { channel: Some(42), ..Default::default() }).len(), 4);
		assert_eq!(ledger.query(&ForwardFilter { channel: Some(43), ..Default::default() }).len(), 3);
		assert_eq!(
			ids(ledger.query(&ForwardFilter {
				received_start: Some(Duration::from_secs(150)),
				received_end: Some(Duration::from_secs(300)),
				..Default::default()
			})),
			vec![(44, 1), (42, 2)]
		);
		assert_eq!(ids(ledger.query(&ForwardFilter { limit: Some(2), ..Default::default() })), vec![(42, 1), (44, 1)]);

		let summary = ledger.fee_summary();
		assert_eq!(summary, FeeSummary { fees_collected_msat: 100, offered: 3, settled: 1, local_failed: 0, failed: 0 });
	}

	#[test]
	fn report_fields() {
		let record = ForwardRecord {
			in_channel: (103 << 40) | (1 << 16),
			status: ForwardStatus::Failed,
			received_time: Duration::from_millis(1_500),
			resolved_time: Some(Duration::from_millis(2_250)),
			failcode: Some(0x1007),
			failreason: Some("WIRE_TEMPORARY_CHANNEL_FAILURE".to_owned()),
			out_channel: Some((104 << 40) | 2),
			..offered(5, 0)
		};
		let json = serde_json::to_string(&ForwardReport::from(&record)).unwrap();
		assert_eq!(
			json,
			"{\"in_channel\":\"103x1x0\",\"in_htlc_id\":5,\"in_msat\":10100,\"status\":\"failed\",\
			\"received_time\":1.5,\"out_channel\":\"104x0x2\",\"out_htlc_id\":105,\"style\":\"tlv\",\
			\"fee_msat\":100,\"out_msat\":10000,\"resolved_time\":2.25,\"failcode\":4103,\
			\"failreason\":\"WIRE_TEMPORARY_CHANNEL_FAILURE\"}"
		);

		let local_failed = ForwardRecord {
			status: ForwardStatus::LocalFailed,
			out_channel: None,
			out_htlc_id: None,
			out_msat: None,
			fee_msat: None,
			failcode: Some(0x4016),
			failreason: Some("WIRE_INVALID_ONION_PAYLOAD".to_owned()),
			style: OnionStyle::Legacy,
			..offered(6, 3)
		};
		let json = serde_json::to_value(ForwardReport::from(&local_failed)).unwrap();
		assert_eq!(json["status"], "local_failed");
		assert_eq!(json["style"], "legacy");
		assert!(json.get("out_channel").is_none());
		assert!(json.get("fee_msat").is_none());
		assert!(json.get("resolved_time").is_none());
	}
}
