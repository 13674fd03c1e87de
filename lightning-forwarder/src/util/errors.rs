// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Error types live here.

use crate::ln::types::ForwardId;
use crate::util::scid_utils::DisplayScid;

use core::fmt;
use std::io;

/// Indicates an error on the client's part (usually some variant of attempting to use too-low or
/// too-high values)
#[derive(Clone, PartialEq, Eq)]
pub enum APIError {
	/// Indicates the API was wholly misused (see err for more). Cases where these can be returned
	/// are documented, but generally indicates some precondition of a function was violated.
	APIMisuseError {
		/// A human-readable error message
		err: String,
	},
	/// The resolution queue of a [`Forwarder`] is full. The caller should process pending
	/// resolutions and retry.
	///
	/// [`Forwarder`]: crate::ln::forwarder::Forwarder
	QueueFull {
		/// The maximum number of queued resolutions.
		max_size: usize,
	},
}

impl fmt::Debug for APIError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			APIError::APIMisuseError { ref err } => write!(f, "Misuse error: {}", err),
			APIError::QueueFull { max_size } => write!(f, "Resolution queue is full ({} entries)", max_size),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// The broad reason an incoming HTLC was failed back by this node without being forwarded (or
/// after a forward attempt was aborted locally).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HTLCFailureKind {
	/// The onion could not be decoded or its payload was unusable.
	InvalidOnion,
	/// The fee left by the onion is below our forwarding policy for the outgoing channel.
	InsufficientFee,
	/// No channel to the requested next hop exists.
	NoRoute,
	/// Channels to the next hop exist but none can carry the HTLC right now.
	CapacityExceeded,
	/// The forward record could not be durably written. No record exists for the HTLC.
	LedgerWriteFailure,
	/// The channel collaborator refused to commit a staged outgoing HTLC.
	CommitRejected,
}

/// A typed failure for an incoming HTLC, returned to the caller so it can fail the HTLC back
/// upstream with the given BOLT 4 failure code.
#[derive(Clone, PartialEq, Eq)]
pub struct HTLCFailure {
	/// The BOLT 4 failure code to return upstream.
	pub failcode: u16,
	/// The symbolic name of [`Self::failcode`], eg `WIRE_FEE_INSUFFICIENT`.
	pub failreason: String,
	/// Why we failed it.
	pub kind: HTLCFailureKind,
}

impl HTLCFailure {
	/// Builds a failure for `failcode`, naming it after the BOLT 4 code.
	pub fn new(kind: HTLCFailureKind, failcode: u16) -> Self {
		Self { failcode, failreason: failcode_to_failreason(failcode), kind }
	}
}

impl fmt::Debug for HTLCFailure {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:?}: {} (0x{:04x})", self.kind, self.failreason, self.failcode)
	}
}

impl fmt::Display for HTLCFailure {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let (description, _) = get_onion_error_description(self.failcode);
		write!(f, "{}: {}", self.failreason, description)
	}
}

/// An error returned by the [`ForwardLedger`].
///
/// [`ForwardLedger`]: crate::ln::forward_ledger::ForwardLedger
pub enum LedgerError {
	/// The underlying [`KVStore`] failed to read or write.
	///
	/// [`KVStore`]: crate::util::persist::KVStore
	Io(io::Error),
	/// A stored record could not be deserialized.
	Decode {
		/// The store key of the record.
		key: String,
		/// The decode failure.
		err: crate::util::ser::DecodeError,
	},
	/// A record for this forward already exists.
	DuplicateForward(ForwardId),
	/// No record exists for this forward.
	UnknownForward(ForwardId),
	/// Another write for this forward is in progress.
	WriteInProgress(ForwardId),
	/// The record or update is not valid (see err for more).
	InvalidRecord {
		/// A human-readable error message
		err: String,
	},
}

impl fmt::Debug for LedgerError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			LedgerError::Io(ref e) => write!(f, "Store failure: {}", e),
			LedgerError::Decode { ref key, ref err } => write!(f, "Failed to read record {}: {}", key, err),
			LedgerError::DuplicateForward(ref id) => {
				write!(f, "Forward {}/{} already recorded", DisplayScid(id.short_channel_id), id.htlc_id)
			},
			LedgerError::UnknownForward(ref id) => {
				write!(f, "No forward recorded for {}/{}", DisplayScid(id.short_channel_id), id.htlc_id)
			},
			LedgerError::WriteInProgress(ref id) => {
				write!(f, "A write for {}/{} is already in progress", DisplayScid(id.short_channel_id), id.htlc_id)
			},
			LedgerError::InvalidRecord { ref err } => write!(f, "Invalid record: {}", err),
		}
	}
}

impl fmt::Display for LedgerError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl From<io::Error> for LedgerError {
	fn from(e: io::Error) -> Self {
		LedgerError::Io(e)
	}
}

/// Failure code flags and codes from BOLT 4.
pub mod failure_codes {
	/// Set when the failure relates to onion parsing.
	pub const BADONION: u16 = 0x8000;
	/// Set for permanent failures.
	pub const PERM: u16 = 0x4000;
	/// Set for node (rather than channel) failures.
	pub const NODE: u16 = 0x2000;
	/// Set when a channel update is enclosed.
	pub const UPDATE: u16 = 0x1000;

	/// `temporary_node_failure`. Also used for forwards lost in recovery.
	pub const TEMPORARY_NODE_FAILURE: u16 = NODE | 2;
	/// `temporary_channel_failure`
	pub const TEMPORARY_CHANNEL_FAILURE: u16 = UPDATE | 7;
	/// `unknown_next_peer`
	pub const UNKNOWN_NEXT_PEER: u16 = PERM | 10;
	/// `amount_below_minimum`
	pub const AMOUNT_BELOW_MINIMUM: u16 = UPDATE | 11;
	/// `fee_insufficient`
	pub const FEE_INSUFFICIENT: u16 = UPDATE | 12;
	/// `invalid_onion_payload`
	pub const INVALID_ONION_PAYLOAD: u16 = PERM | 22;
}

/// Returns the `WIRE_`-prefixed upper case name of a BOLT 4 failure code, as stored in
/// `failreason` for locally generated failures.
pub fn failcode_to_failreason(failcode: u16) -> String {
	let (_, name) = get_onion_error_description(failcode);
	if name.is_empty() {
		format!("WIRE_UNKNOWN_0x{:04x}", failcode)
	} else {
		format!("WIRE_{}", name.to_uppercase())
	}
}

#[inline]
pub(crate) fn get_onion_error_description(error_code: u16) -> (&'static str, &'static str) {
	use self::failure_codes::{BADONION, NODE, PERM, UPDATE};
	match error_code {
		_c if _c == PERM|1 => ("The realm byte was not understood by the processing node", "invalid_realm"),
		_c if _c == NODE|2 => ("Node indicated temporary node failure", "temporary_node_failure"),
		_c if _c == PERM|NODE|2 => ("Node indicated permanent node failure", "permanent_node_failure"),
		_c if _c == PERM|NODE|3 => ("Node indicated the required node feature is missing in the onion", "required_node_feature_missing"),
		_c if _c == BADONION|PERM|4 => ("Node indicated the version by is not understood", "invalid_onion_version"),
		_c if _c == BADONION|PERM|5  => ("Node indicated the HMAC of the onion is incorrect", "invalid_onion_hmac"),
		_c if _c == BADONION|PERM|6 => ("Node indicated the ephemeral public keys is not parseable", "invalid_onion_key"),
		_c if _c == UPDATE|7 => ("Node indicated the outgoing channel is unable to handle the HTLC temporarily", "temporary_channel_failure"),
		_c if _c == PERM|8 => ("Node indicated the outgoing channel is unable to handle the HTLC permanently", "permanent_channel_failure"),
		_c if _c == PERM|9 => ("Node indicated the required feature for the outgoing channel is not satisfied", "required_channel_feature_missing"),
		_c if _c == PERM|10 => ("Node indicated the outbound channel is not found for the specified short_channel_id in the onion packet", "unknown_next_peer"),
		_c if _c == UPDATE|11 => ("Node indicated the HTLC amount was below the required minimum for the outbound channel", "amount_below_minimum"),
		_c if _c == UPDATE|12 => ("Node indicated the fee amount does not meet the required level", "fee_insufficient"),
		_c if _c == UPDATE|13 => ("Node indicated the cltv_expiry does not comply with the cltv_expiry_delta required by the outgoing channel", "incorrect_cltv_expiry"),
		_c if _c == UPDATE|14 => ("Node indicated the CLTV expiry too close to the current block height for safe handling", "expiry_too_soon"),
		_c if _c == PERM|15 => ("The final node indicated the payment hash is unknown or amount is incorrect", "incorrect_or_unknown_payment_details"),
		_c if _c == UPDATE|20 => ("Node indicated the outbound channel has been disabled", "channel_disabled"),
		_c if _c == 21 => ("Node indicated the CLTV expiry in the HTLC is too far in the future", "expiry_too_far"),
		_c if _c == PERM|22 => ("Node indicated that the decrypted onion per-hop payload was not understood by it or is incomplete", "invalid_onion_payload"),
		_c if _c == 23 => ("The final node indicated the complete amount of the multi-part payment was not received within a reasonable time", "mpp_timeout"),
		_ => ("Unknown", ""),
	}
}
