// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The interface to the channel state machine, which owns commitment transactions and HTLC
//! state. We only ask it which channels can carry an HTLC, and to add HTLCs to them.

use crate::chain::chaininterface::FeerateStyle;
use crate::ln::types::{ChannelId, ForwardId, PaymentHash};
use crate::util::config::ChannelConfig;

use core::fmt;

/// What we need to know about one of our channels to decide whether to forward over it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundChannel {
	/// The channel's short channel id.
	pub short_channel_id: u64,
	/// Whether the channel is open, its peer connected and it is able to add HTLCs.
	pub is_usable: bool,
	/// The amount we can currently send over the channel, accounting for reserves and HTLCs
	/// already in flight.
	pub outbound_capacity_msat: u64,
	/// The smallest HTLC our peer accepts on this channel.
	pub htlc_minimum_msat: u64,
	/// The largest HTLC our peer accepts on this channel.
	pub htlc_maximum_msat: u64,
	/// Our forwarding fee policy on this channel.
	pub config: ChannelConfig,
}

impl OutboundChannel {
	/// Whether this channel can carry an HTLC of `amount_msat` right now.
	pub fn can_carry(&self, amount_msat: u64) -> bool {
		self.is_usable
			&& amount_msat >= self.htlc_minimum_msat
			&& amount_msat <= self.htlc_maximum_msat
			&& amount_msat <= self.outbound_capacity_msat
	}
}

/// An HTLC we added (or are about to add) to one of our channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutgoingHtlc {
	/// The channel the HTLC is on.
	pub short_channel_id: u64,
	/// The id we assigned the HTLC on that channel.
	pub htlc_id: u64,
	/// The value of the HTLC.
	pub amount_msat: u64,
}

/// The channel refused to stage or commit an HTLC.
#[derive(Clone, PartialEq, Eq)]
pub struct CommitError {
	/// A human-readable error message
	pub err: String,
}

impl fmt::Debug for CommitError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Channel refused HTLC: {}", self.err)
	}
}

/// Feerate negotiation state of one channel, as consulted by the [`BoundEnforcer`].
///
/// [`BoundEnforcer`]: crate::ln::bound_enforcer::BoundEnforcer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelFeeContext {
	/// The channel.
	pub channel_id: ChannelId,
	/// The unit feerates are negotiated in on this channel.
	pub feerate_style: FeerateStyle,
	/// Whether the channel uses anchor outputs, and so can be fee-bumped later.
	pub anchors: bool,
	/// The last peer-proposed feerate we validated and accepted.
	pub last_validated_feerate: Option<u32>,
	/// Whether both commitment transactions have been signed, ie whether funds are at stake.
	pub commitments_secured: bool,
	/// Whether the funding negotiation requires confirmed inputs. Reported alongside violations
	/// so the daemon can tell its peer.
	pub requires_confirmed_inputs: bool,
}

/// The channel state machine, as seen by the [`Forwarder`].
///
/// Adding an outgoing HTLC is split in two so that the forward record can be durably written
/// between reserving the HTLC and irrevocably committing it:
///  1. [`Self::stage_htlc`] reserves capacity and assigns the outgoing HTLC id,
///  2. the [`Forwarder`] appends the forward record,
///  3. [`Self::commit_htlc`] adds the HTLC to the commitment, or [`Self::cancel_htlc`] releases the
///     reservation if the write failed.
///
/// Calls for the same outgoing channel are never made concurrently by the [`Forwarder`].
///
/// [`Forwarder`]: crate::ln::forwarder::Forwarder
pub trait ChannelLedger {
	/// Returns every channel to the same peer as `short_channel_id`, including that channel, or
	/// `None` if we have no channel with that short channel id.
	fn candidate_channels(&self, short_channel_id: u64) -> Option<Vec<OutboundChannel>>;

	/// Reserves capacity for an outgoing HTLC on the given channel and assigns its id.
	fn stage_htlc(
		&self, short_channel_id: u64, amount_msat: u64, cltv_expiry: u32, payment_hash: PaymentHash,
	) -> Result<OutgoingHtlc, CommitError>;

	/// Irrevocably adds a staged HTLC to the channel.
	fn commit_htlc(&self, htlc: &OutgoingHtlc) -> Result<(), CommitError>;

	/// Releases a staged HTLC that will not be committed.
	fn cancel_htlc(&self, htlc: &OutgoingHtlc);

	/// Whether the incoming HTLC is still part of the incoming channel's commitment.
	fn is_incoming_htlc_committed(&self, forward_id: &ForwardId) -> bool;

	/// Whether the outgoing HTLC is part of the outgoing channel's commitment.
	fn is_outgoing_htlc_committed(&self, htlc: &OutgoingHtlc) -> bool;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn can_carry_checks_limits() {
		let channel = OutboundChannel {
			short_channel_id: 1,
			is_usable: true,
			outbound_capacity_msat: 50_000,
			htlc_minimum_msat: 1_000,
			htlc_maximum_msat: 40_000,
			config: ChannelConfig::default(),
		};
		assert!(channel.can_carry(1_000));
		assert!(channel.can_carry(40_000));
		assert!(!channel.can_carry(999));
		assert!(!channel.can_carry(40_001));
		assert!(!OutboundChannel { outbound_capacity_msat: 20_000, ..channel.clone() }.can_carry(30_000));
		assert!(!OutboundChannel { is_usable: false, ..channel }.can_carry(1_000));
	}
}
