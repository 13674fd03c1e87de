// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

#![allow(missing_docs)]

use crate::chain::chaininterface::{FeerateEstimates, FeerateOracle, OracleUnavailable};
use crate::ln::channel::{ChannelLedger, CommitError, OutboundChannel, OutgoingHtlc};
use crate::ln::onion::{DecodedOnion, IncomingHtlc, OnionDecodeFailure, OnionProcessor};
use crate::ln::types::{ForwardId, PaymentHash};
use crate::sync::Mutex;
use crate::util::hash_tables::{new_hash_map, new_hash_set, HashMap, HashSet};
use crate::util::logger::{Level, Logger, Record};
use crate::util::persist::KVStore;
use crate::util::time::TimeProvider;

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use core::time::Duration;
use std::io;

pub struct TestLogger {
	level: Level,
	pub(crate) id: String,
	pub lines: Mutex<HashMap<(String, String), usize>>,
	pub context: Mutex<HashMap<(String, Option<u64>, Option<u64>), usize>>,
}

impl TestLogger {
	pub fn new() -> TestLogger {
		Self::with_id("".to_owned())
	}
	pub fn with_id(id: String) -> TestLogger {
		TestLogger { level: Level::Trace, id, lines: Mutex::new(new_hash_map()), context: Mutex::new(new_hash_map()) }
	}
	pub fn enable(&mut self, level: Level) {
		self.level = level;
	}
	pub fn assert_log(&self, module: String, line: String, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		assert_eq!(log_entries.get(&(module, line)), Some(&count));
	}

	/// Search for the number of occurrence of the logged lines which
	/// 1. belongs to the specified module and
	/// 2. contains `line` in it.
	/// And asserts if the number of occurrences is the same with the given `count`
	pub fn assert_log_contains(&self, module: &str, line: &str, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		let l: usize = log_entries
			.iter()
			.filter(|&(&(ref m, ref l), _c)| *m == module && l.contains(line))
			.map(|(_, c)| c)
			.sum();
		assert_eq!(l, count)
	}

	/// Search for the number of occurrences of logged lines which
	/// 1. belong to the specified module and
	/// 2. match the given regex pattern.
	/// Assert that the number of occurrences equals the given `count`
	pub fn assert_log_regex(&self, module: &str, pattern: regex::Regex, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		let l: usize = log_entries
			.iter()
			.filter(|&(&(ref m, ref l), _c)| *m == module && pattern.is_match(&l))
			.map(|(_, c)| c)
			.sum();
		assert_eq!(l, count)
	}

	pub fn assert_log_context_contains(
		&self, module: &str, short_channel_id: Option<u64>, htlc_id: Option<u64>, count: usize,
	) {
		let context_entries = self.context.lock().unwrap();
		let l = context_entries.get(&(module.to_string(), short_channel_id, htlc_id)).unwrap();
		assert_eq!(*l, count)
	}
}

impl Logger for TestLogger {
	fn log(&self, record: Record) {
		let context = format!("{}", record);
		*self.lines.lock().unwrap().entry((record.module_path.to_string(), format!("{}", record.args))).or_insert(0) += 1;
		*self
			.context
			.lock()
			.unwrap()
			.entry((record.module_path.to_string(), record.short_channel_id, record.htlc_id))
			.or_insert(0) += 1;
		if record.level >= self.level {
			println!("{} {}", self.id, context);
		}
	}
}

/// A [`FeerateOracle`] returning whatever it was last given.
pub struct TestFeerateOracle {
	response: Mutex<Result<FeerateEstimates, OracleUnavailable>>,
	pub calls: AtomicUsize,
}

impl TestFeerateOracle {
	pub fn new(response: Result<FeerateEstimates, OracleUnavailable>) -> Self {
		Self { response: Mutex::new(response), calls: AtomicUsize::new(0) }
	}
	pub fn set(&self, response: Result<FeerateEstimates, OracleUnavailable>) {
		*self.response.lock().unwrap() = response;
	}
}

impl FeerateOracle for TestFeerateOracle {
	fn get_feerate_estimates(&self) -> Result<FeerateEstimates, OracleUnavailable> {
		self.calls.fetch_add(1, Ordering::Relaxed);
		self.response.lock().unwrap().clone()
	}
}

/// An [`OnionProcessor`] with canned results per incoming HTLC. Unknown HTLCs fail to decode.
pub struct TestOnionProcessor {
	onions: Mutex<HashMap<ForwardId, Result<DecodedOnion, OnionDecodeFailure>>>,
}

impl TestOnionProcessor {
	pub fn new() -> Self {
		Self { onions: Mutex::new(new_hash_map()) }
	}
	pub fn set(&self, forward_id: ForwardId, onion: Result<DecodedOnion, OnionDecodeFailure>) {
		self.onions.lock().unwrap().insert(forward_id, onion);
	}
}

impl OnionProcessor for TestOnionProcessor {
	fn decode_onion(&self, htlc: &IncomingHtlc) -> Result<DecodedOnion, OnionDecodeFailure> {
		match self.onions.lock().unwrap().get(&htlc.forward_id()) {
			Some(onion) => onion.clone(),
			None => Err(OnionDecodeFailure::invalid_payload("no onion registered".to_owned())),
		}
	}
}

struct TestChannelState {
	// Channels and the peer they belong to.
	channels: Vec<(u8, OutboundChannel)>,
	next_htlc_ids: HashMap<u64, u64>,
	staged: HashSet<OutgoingHtlc>,
	committed: HashSet<OutgoingHtlc>,
	incoming: HashSet<ForwardId>,
}

/// An in-memory [`ChannelLedger`]. Staging reserves outbound capacity, cancelling releases it.
pub struct TestChannelLedger {
	state: Mutex<TestChannelState>,
	reject_commits: AtomicBool,
	pub stage_calls: AtomicUsize,
	active_calls: AtomicUsize,
	max_active_calls: AtomicUsize,
}

/// Counts a stage, commit or cancel call as in flight until dropped.
struct ActiveCall<'a>(&'a TestChannelLedger);

impl<'a> ActiveCall<'a> {
	fn new(ledger: &'a TestChannelLedger) -> Self {
		let active = ledger.active_calls.fetch_add(1, Ordering::AcqRel) + 1;
		ledger.max_active_calls.fetch_max(active, Ordering::AcqRel);
		// Give any racing caller a chance to overlap with us.
		std::thread::yield_now();
		ActiveCall(ledger)
	}
}

impl Drop for ActiveCall<'_> {
	fn drop(&mut self) {
		self.0.active_calls.fetch_sub(1, Ordering::AcqRel);
	}
}

impl TestChannelLedger {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(TestChannelState {
				channels: Vec::new(),
				next_htlc_ids: new_hash_map(),
				staged: new_hash_set(),
				committed: new_hash_set(),
				incoming: new_hash_set(),
			}),
			reject_commits: AtomicBool::new(false),
			stage_calls: AtomicUsize::new(0),
			active_calls: AtomicUsize::new(0),
			max_active_calls: AtomicUsize::new(0),
		}
	}

	pub fn add_channel(&self, peer: u8, channel: OutboundChannel) {
		self.state.lock().unwrap().channels.push((peer, channel));
	}

	pub fn channel(&self, short_channel_id: u64) -> Option<OutboundChannel> {
		let state = self.state.lock().unwrap();
		state.channels.iter().find(|(_, c)| c.short_channel_id == short_channel_id).map(|(_, c)| c.clone())
	}

	pub fn set_reject_commits(&self, reject: bool) {
		self.reject_commits.store(reject, Ordering::Release);
	}

	pub fn add_incoming(&self, forward_id: ForwardId) {
		self.state.lock().unwrap().incoming.insert(forward_id);
	}

	pub fn remove_incoming(&self, forward_id: &ForwardId) {
		self.state.lock().unwrap().incoming.remove(forward_id);
	}

	/// Drops an outgoing HTLC from the commitment, as if it resolved while we were down.
	pub fn remove_outgoing(&self, htlc: &OutgoingHtlc) {
		self.state.lock().unwrap().committed.remove(htlc);
	}

	pub fn staged(&self) -> Vec<OutgoingHtlc> {
		self.state.lock().unwrap().staged.iter().cloned().collect()
	}

	pub fn committed(&self) -> Vec<OutgoingHtlc> {
		self.state.lock().unwrap().committed.iter().cloned().collect()
	}

	/// The most stage, commit or cancel calls ever seen in flight at once.
	pub fn max_concurrent_calls(&self) -> usize {
		self.max_active_calls.load(Ordering::Acquire)
	}
}

impl ChannelLedger for TestChannelLedger {
	fn candidate_channels(&self, short_channel_id: u64) -> Option<Vec<OutboundChannel>> {
		let state = self.state.lock().unwrap();
		let peer = state.channels.iter().find(|(_, c)| c.short_channel_id == short_channel_id)?.0;
		Some(state.channels.iter().filter(|(p, _)| *p == peer).map(|(_, c)| c.clone()).collect())
	}

	fn stage_htlc(
		&self, short_channel_id: u64, amount_msat: u64, _cltv_expiry: u32, _payment_hash: PaymentHash,
	) -> Result<OutgoingHtlc, CommitError> {
		self.stage_calls.fetch_add(1, Ordering::Relaxed);
		let _call = ActiveCall::new(self);
		let mut state_lock = self.state.lock().unwrap();
		let state = &mut *state_lock;
		let channel = match state.channels.iter_mut().find(|(_, c)| c.short_channel_id == short_channel_id) {
			Some((_, channel)) => channel,
			None => return Err(CommitError { err: "unknown channel".to_owned() }),
		};
		if !channel.can_carry(amount_msat) {
			return Err(CommitError { err: "channel cannot carry HTLC".to_owned() });
		}
		channel.outbound_capacity_msat -= amount_msat;
		let next_id = state.next_htlc_ids.entry(short_channel_id).or_insert(0);
		let htlc = OutgoingHtlc { short_channel_id, htlc_id: *next_id, amount_msat };
		*next_id += 1;
		state.staged.insert(htlc);
		Ok(htlc)
	}

	fn commit_htlc(&self, htlc: &OutgoingHtlc) -> Result<(), CommitError> {
		let _call = ActiveCall::new(self);
		let mut state = self.state.lock().unwrap();
		assert!(state.staged.remove(htlc), "committing an HTLC which was never staged");
		if self.reject_commits.load(Ordering::Acquire) {
			if let Some((_, channel)) =
				state.channels.iter_mut().find(|(_, c)| c.short_channel_id == htlc.short_channel_id)
			{
				channel.outbound_capacity_msat += htlc.amount_msat;
			}
			return Err(CommitError { err: "peer disconnected".to_owned() });
		}
		state.committed.insert(*htlc);
		Ok(())
	}

	fn cancel_htlc(&self, htlc: &OutgoingHtlc) {
		let _call = ActiveCall::new(self);
		let mut state = self.state.lock().unwrap();
		assert!(state.staged.remove(htlc), "cancelling an HTLC which was never staged");
		if let Some((_, channel)) = state.channels.iter_mut().find(|(_, c)| c.short_channel_id == htlc.short_channel_id)
		{
			channel.outbound_capacity_msat += htlc.amount_msat;
		}
	}

	fn is_incoming_htlc_committed(&self, forward_id: &ForwardId) -> bool {
		self.state.lock().unwrap().incoming.contains(forward_id)
	}

	fn is_outgoing_htlc_committed(&self, htlc: &OutgoingHtlc) -> bool {
		self.state.lock().unwrap().committed.contains(htlc)
	}
}

/// An in-memory [`KVStore`] with write failure injection.
pub struct TestStore {
	persisted_bytes: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
	read_only: bool,
	fail_writes: AtomicBool,
	writes: AtomicUsize,
}

impl TestStore {
	pub fn new(read_only: bool) -> Self {
		Self {
			persisted_bytes: Mutex::new(new_hash_map()),
			read_only,
			fail_writes: AtomicBool::new(false),
			writes: AtomicUsize::new(0),
		}
	}

	pub fn set_fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, Ordering::Release);
	}

	/// The number of successful writes.
	pub fn write_count(&self) -> usize {
		self.writes.load(Ordering::Acquire)
	}

	fn prefixed(primary_namespace: &str, secondary_namespace: &str) -> String {
		if secondary_namespace.is_empty() {
			primary_namespace.to_string()
		} else {
			format!("{}/{}", primary_namespace, secondary_namespace)
		}
	}
}

impl KVStore for TestStore {
	fn read(&self, primary_namespace: &str, secondary_namespace: &str, key: &str) -> io::Result<Vec<u8>> {
		let persisted_lock = self.persisted_bytes.lock().unwrap();
		let prefixed = Self::prefixed(primary_namespace, secondary_namespace);
		match persisted_lock.get(&prefixed).and_then(|namespace| namespace.get(key)) {
			Some(bytes) => Ok(bytes.clone()),
			None => Err(io::Error::new(io::ErrorKind::NotFound, "Key not found")),
		}
	}

	fn write(&self, primary_namespace: &str, secondary_namespace: &str, key: &str, buf: Vec<u8>) -> io::Result<()> {
		if self.read_only {
			return Err(io::Error::new(io::ErrorKind::PermissionDenied, "Cannot modify read-only store"));
		}
		if self.fail_writes.load(Ordering::Acquire) {
			return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
		}
		let mut persisted_lock = self.persisted_bytes.lock().unwrap();
		let prefixed = Self::prefixed(primary_namespace, secondary_namespace);
		persisted_lock.entry(prefixed).or_insert_with(new_hash_map).insert(key.to_string(), buf);
		self.writes.fetch_add(1, Ordering::AcqRel);
		Ok(())
	}

	fn remove(&self, primary_namespace: &str, secondary_namespace: &str, key: &str, _lazy: bool) -> io::Result<()> {
		if self.read_only {
			return Err(io::Error::new(io::ErrorKind::PermissionDenied, "Cannot modify read-only store"));
		}
		let mut persisted_lock = self.persisted_bytes.lock().unwrap();
		let prefixed = Self::prefixed(primary_namespace, secondary_namespace);
		if let Some(namespace) = persisted_lock.get_mut(&prefixed) {
			namespace.remove(key);
		}
		Ok(())
	}

	fn list(&self, primary_namespace: &str, secondary_namespace: &str) -> io::Result<Vec<String>> {
		let persisted_lock = self.persisted_bytes.lock().unwrap();
		let prefixed = Self::prefixed(primary_namespace, secondary_namespace);
		match persisted_lock.get(&prefixed) {
			Some(namespace) => Ok(namespace.keys().cloned().collect()),
			None => Ok(Vec::new()),
		}
	}
}

/// A [`TimeProvider`] that only moves when told to.
pub struct TestTimeProvider {
	now: Mutex<Duration>,
}

impl TestTimeProvider {
	pub fn new(now: Duration) -> Self {
		Self { now: Mutex::new(now) }
	}
	pub fn advance(&self, by: Duration) {
		*self.now.lock().unwrap() += by;
	}
	pub fn set(&self, now: Duration) {
		*self.now.lock().unwrap() = now;
	}
}

impl TimeProvider for TestTimeProvider {
	fn duration_since_epoch(&self) -> Duration {
		*self.now.lock().unwrap()
	}
}
