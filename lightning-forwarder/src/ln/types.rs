// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Various wrapper types (most around 32-byte arrays) for use in lightning.

use crate::util::scid_utils::DisplayScid;
use crate::util::ser::{DecodeError, Readable, Writeable, Writer};

use bitcoin::hashes::{sha256::Hash as Sha256, Hash as _};
use core::fmt;
use std::io;

/// Identifies a forward by its incoming HTLC: the short channel id of the channel it arrived on
/// and the HTLC id our peer assigned on that channel.
///
/// Resolution events and forward records are correlated by this key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForwardId {
	/// The short channel id of the incoming channel.
	pub short_channel_id: u64,
	/// The id of the HTLC on the incoming channel.
	pub htlc_id: u64,
}

impl ForwardId {
	/// Returns the [`KVStore`] key a forward is stored under, `<in_scid>_<in_htlc_id>`.
	///
	/// [`KVStore`]: crate::util::persist::KVStore
	pub fn to_key(&self) -> String {
		format!("{}_{}", self.short_channel_id, self.htlc_id)
	}

	/// Parses a key as produced by [`ForwardId::to_key`].
	pub fn from_key(key: &str) -> Option<Self> {
		let (scid, htlc_id) = key.split_once('_')?;
		Some(ForwardId { short_channel_id: scid.parse().ok()?, htlc_id: htlc_id.parse().ok()? })
	}
}

impl fmt::Display for ForwardId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}/{}", DisplayScid(self.short_channel_id), self.htlc_id)
	}
}

/// A unique 32-byte identifier for a channel, stable from before funding onwards (unlike its
/// short channel id).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChannelId(pub [u8; 32]);

impl ChannelId {
	/// Generic constructor; create a new channel ID from the provided data.
	pub fn from_bytes(data: [u8; 32]) -> Self {
		Self(data)
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&crate::util::logger::DebugBytes(&self.0), f)
	}
}

/// The payment hash is the hash of the [`PaymentPreimage`] which is the value used to lock funds
/// in HTLCs while they transit the lightning network.
#[derive(Hash, Copy, Clone, PartialEq, Eq, Debug, Ord, PartialOrd)]
pub struct PaymentHash(pub [u8; 32]);

impl fmt::Display for PaymentHash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&crate::util::logger::DebugBytes(&self.0), f)
	}
}

impl Writeable for PaymentHash {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.0.write(w)
	}
}

impl Readable for PaymentHash {
	fn read<R: io::Read>(r: &mut R) -> Result<Self, DecodeError> {
		let buf: [u8; 32] = Readable::read(r)?;
		Ok(PaymentHash(buf))
	}
}

/// The payment preimage is the "secret key" which is used to claim the funds of an HTLC on-chain
/// or in a lightning channel.
#[derive(Hash, Copy, Clone, PartialEq, Eq, Debug, Ord, PartialOrd)]
pub struct PaymentPreimage(pub [u8; 32]);

impl fmt::Display for PaymentPreimage {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&crate::util::logger::DebugBytes(&self.0), f)
	}
}

/// Converts a `PaymentPreimage` into a `PaymentHash` by hashing the preimage with SHA256.
impl From<PaymentPreimage> for PaymentHash {
	fn from(value: PaymentPreimage) -> Self {
		PaymentHash(Sha256::hash(&value.0).to_byte_array())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn preimage_hashes_to_payment_hash() {
		// sha256 of 32 zero bytes
		let hash = PaymentHash::from(PaymentPreimage([0; 32]));
		assert_eq!(hash.to_string(), "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925");
	}

	#[test]
	fn forward_id_keys() {
		let id = ForwardId { short_channel_id: (103 << 40) | (1 << 16), htlc_id: 4 };
		assert_eq!(id.to_key(), "113249697726464_4");
		assert_eq!(ForwardId::from_key(&id.to_key()), Some(id));
		assert_eq!(id.to_string(), "103x1x0/4");
		assert_eq!(ForwardId::from_key("103x1x0_4"), None);
		assert_eq!(ForwardId::from_key("5"), None);
		assert_eq!(ForwardId::from_key("5_"), None);
	}
}
