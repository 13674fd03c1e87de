use lightning_forwarder::ln::forward_ledger::{ForwardFilter, ForwardLedger, ForwardOutcome, ForwardRecord, ForwardStatus};
use lightning_forwarder::ln::onion::OnionStyle;
use lightning_forwarder::ln::types::{ForwardId, PaymentHash};
use lightning_forwarder::util::persist::{
	KVStore, FORWARD_LEDGER_PRIMARY_NAMESPACE, FORWARD_LEDGER_SECONDARY_NAMESPACE, KVSTORE_NAMESPACE_KEY_MAX_LEN,
};
use lightning_forwarder::util::test_utils::TestLogger;

use std::time::Duration;

pub(crate) fn do_read_write_remove_list_persist<K: KVStore>(kv_store: &K) {
	let data = vec![42u8; 32];

	let primary_namespace = "testspace";
	let secondary_namespace = "testsubspace";
	let key = "testkey";

	// Test the basic KVStore operations.
	kv_store.write(primary_namespace, secondary_namespace, key, data.clone()).unwrap();

	// Test empty primary/secondary namespaces are allowed, but not empty primary namespace and
	// non-empty secondary primary_namespace, and not empty key.
	kv_store.write("", "", key, data.clone()).unwrap();
	assert!(kv_store.write("", secondary_namespace, key, data.clone()).is_err());
	assert!(kv_store.write(primary_namespace, secondary_namespace, "", data.clone()).is_err());
	assert!(kv_store.write(primary_namespace, secondary_namespace, "../escape", data.clone()).is_err());

	let listed_keys = kv_store.list(primary_namespace, secondary_namespace).unwrap();
	assert_eq!(listed_keys.len(), 1);
	assert_eq!(listed_keys[0], key);

	// The primary namespace directory shows up next to the key but is not one.
	let listed_keys = kv_store.list("", "").unwrap();
	assert_eq!(listed_keys, vec![key.to_string()]);

	let read_data = kv_store.read(primary_namespace, secondary_namespace, key).unwrap();
	assert_eq!(data, read_data);

	kv_store.remove(primary_namespace, secondary_namespace, key, false).unwrap();
	kv_store.remove("", "", key, true).unwrap();

	let listed_keys = kv_store.list(primary_namespace, secondary_namespace).unwrap();
	assert_eq!(listed_keys.len(), 0);

	// Ensure we have no issue operating with primary_namespace/secondary_namespace/key being
	// KVSTORE_NAMESPACE_KEY_MAX_LEN
	let max_chars: String = std::iter::repeat('A').take(KVSTORE_NAMESPACE_KEY_MAX_LEN).collect();
	kv_store.write(&max_chars, &max_chars, &max_chars, data.clone()).unwrap();

	let listed_keys = kv_store.list(&max_chars, &max_chars).unwrap();
	assert_eq!(listed_keys.len(), 1);
	assert_eq!(listed_keys[0], max_chars);

	let read_data = kv_store.read(&max_chars, &max_chars, &max_chars).unwrap();
	assert_eq!(data, read_data);

	kv_store.remove(&max_chars, &max_chars, &max_chars, false).unwrap();

	let listed_keys = kv_store.list(&max_chars, &max_chars).unwrap();
	assert_eq!(listed_keys.len(), 0);

	let too_long: String = std::iter::repeat('A').take(KVSTORE_NAMESPACE_KEY_MAX_LEN + 1).collect();
	assert!(kv_store.write(&too_long, "", key, data).is_err());
}

fn offered(in_htlc_id: u64) -> ForwardRecord {
	ForwardRecord {
		in_channel: 1 << 40,
		in_htlc_id,
		in_msat: 1_001_000,
		status: ForwardStatus::Offered,
		received_time: Duration::from_secs(1_700_000_000 + in_htlc_id),
		style: OnionStyle::Tlv,
		payment_hash: PaymentHash([in_htlc_id as u8; 32]),
		out_channel: Some(2 << 40),
		out_htlc_id: Some(in_htlc_id),
		out_msat: Some(1_000_000),
		fee_msat: Some(1_000),
		resolved_time: None,
		failcode: None,
		failreason: None,
	}
}

// Writes a handful of forwards through a ledger, then reloads them from the same store.
pub(crate) fn do_test_forward_ledger_persistence<K: KVStore>(kv_store: &K) {
	let logger = TestLogger::new();
	let ledger = ForwardLedger::new(kv_store, &logger);

	for in_htlc_id in 0..3 {
		ledger.append(offered(in_htlc_id)).unwrap();
	}
	let local_failed = ForwardRecord {
		status: ForwardStatus::LocalFailed,
		out_channel: None,
		out_htlc_id: None,
		out_msat: None,
		fee_msat: None,
		failcode: Some(0x4016),
		failreason: Some("WIRE_INVALID_ONION_PAYLOAD".to_owned()),
		..offered(3)
	};
	ledger.append(local_failed.clone()).unwrap();

	let id = |htlc_id| ForwardId { short_channel_id: 1 << 40, htlc_id };
	let settled_at = Duration::from_secs(1_700_000_100);
	ledger.finalize(&id(0), ForwardOutcome::Settled { resolved_time: settled_at }).unwrap();
	ledger
		.finalize(
			&id(1),
			ForwardOutcome::Failed {
				resolved_time: settled_at,
				failcode: 0x1007,
				failreason: "WIRE_TEMPORARY_CHANNEL_FAILURE".to_owned(),
			},
		)
		.unwrap();

	let mut keys = kv_store.list(FORWARD_LEDGER_PRIMARY_NAMESPACE, FORWARD_LEDGER_SECONDARY_NAMESPACE).unwrap();
	keys.sort();
	let mut expected_keys: Vec<String> = (0..4).map(|htlc_id| id(htlc_id).to_key()).collect();
	expected_keys.sort();
	assert_eq!(keys, expected_keys);

	let before = ledger.query(&ForwardFilter::default());
	drop(ledger);

	let reloaded = ForwardLedger::read(kv_store, &logger).unwrap();
	assert_eq!(reloaded.query(&ForwardFilter::default()), before);
	assert_eq!(reloaded.get(&id(3)), Some(local_failed));
	assert_eq!(reloaded.get(&id(0)).unwrap().status, ForwardStatus::Settled);
	assert_eq!(reloaded.get(&id(2)).unwrap().status, ForwardStatus::Offered);

	let summary = reloaded.fee_summary();
	assert_eq!(summary.fees_collected_msat, 1_000);
	assert_eq!((summary.offered, summary.settled, summary.local_failed, summary.failed), (1, 1, 1, 1));
	logger.assert_log_contains("lightning_forwarder::ln::forward_ledger", "Loaded 4 forward records", 1);
}
