// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The interface to the onion processor, which peels our layer of an incoming HTLC's onion and
//! tells us where the sender wants it to go next.

use crate::ln::types::{ForwardId, PaymentHash};
use crate::util::errors::failure_codes;

use serde::Serialize;

use core::fmt;

/// The encoding of the hop payload we found in an onion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnionStyle {
	/// The original fixed-size 65-byte hop payload.
	Legacy,
	/// A variable-length TLV hop payload.
	Tlv,
}

impl_writeable_tlv_based_enum!(OnionStyle,
	(0, Legacy) => {},
	(2, Tlv) => {},
);

impl fmt::Display for OnionStyle {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			OnionStyle::Legacy => f.write_str("legacy"),
			OnionStyle::Tlv => f.write_str("tlv"),
		}
	}
}

/// An HTLC offered to us by a peer, irrevocably committed on the incoming channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingHtlc {
	/// The short channel id of the channel the HTLC arrived on.
	pub short_channel_id: u64,
	/// The id our peer assigned the HTLC on that channel.
	pub htlc_id: u64,
	/// The value of the HTLC.
	pub amount_msat: u64,
	/// The hash the HTLC is locked to.
	pub payment_hash: PaymentHash,
	/// The absolute block height at which the HTLC times out.
	pub cltv_expiry: u32,
	/// The onion, opaque to us.
	pub onion_routing_packet: Vec<u8>,
}

impl IncomingHtlc {
	/// The key this HTLC's forward is tracked under.
	pub fn forward_id(&self) -> ForwardId {
		ForwardId { short_channel_id: self.short_channel_id, htlc_id: self.htlc_id }
	}
}

/// Where and how much to forward, as instructed by the onion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForwardInstruction {
	/// The short channel id the sender asked us to forward over. Any channel to the same peer may
	/// be used instead.
	pub next_short_channel_id: u64,
	/// The amount to forward.
	pub amt_to_forward_msat: u64,
	/// The CLTV expiry the outgoing HTLC must carry.
	pub outgoing_cltv_value: u32,
}

/// A successfully decoded onion for a forward, tagged with the payload encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedOnion {
	/// A legacy hop payload.
	Legacy(ForwardInstruction),
	/// A TLV hop payload.
	Tlv(ForwardInstruction),
}

impl DecodedOnion {
	/// The payload encoding.
	pub fn style(&self) -> OnionStyle {
		match self {
			DecodedOnion::Legacy(_) => OnionStyle::Legacy,
			DecodedOnion::Tlv(_) => OnionStyle::Tlv,
		}
	}

	/// The forwarding instructions.
	pub fn instruction(&self) -> &ForwardInstruction {
		match self {
			DecodedOnion::Legacy(instruction) => instruction,
			DecodedOnion::Tlv(instruction) => instruction,
		}
	}
}

/// The onion could not be decoded, or does not ask us to forward.
#[derive(Clone, PartialEq, Eq)]
pub struct OnionDecodeFailure {
	/// The BOLT 4 failure code to return upstream. Usually
	/// [`failure_codes::INVALID_ONION_PAYLOAD`] or one of the `BADONION` codes.
	pub failcode: u16,
	/// The payload encoding, as far as it could be determined.
	pub style: OnionStyle,
	/// A human-readable error message
	pub err: String,
}

impl OnionDecodeFailure {
	/// A failure of a TLV payload with [`failure_codes::INVALID_ONION_PAYLOAD`].
	pub fn invalid_payload(err: String) -> Self {
		OnionDecodeFailure { failcode: failure_codes::INVALID_ONION_PAYLOAD, style: OnionStyle::Tlv, err }
	}
}

impl fmt::Debug for OnionDecodeFailure {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Failed to decode {} onion (0x{:04x}): {}", self.style, self.failcode, self.err)
	}
}

/// Decodes the onions of incoming HTLCs.
///
/// Implementations do the cryptography: they strip our layer and parse the hop payload.
pub trait OnionProcessor {
	/// Decodes the forwarding instructions for `htlc`.
	fn decode_onion(&self, htlc: &IncomingHtlc) -> Result<DecodedOnion, OnionDecodeFailure>;
}
