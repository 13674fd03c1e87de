// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

#![crate_name = "lightning_forwarder"]

//! The forwarding and fee-policy core of a Lightning routing node.
//!
//! This crate decides, for every incoming HTLC, whether and over which channel it is forwarded,
//! keeps a durable record of every forward attempt through to settlement or failure, and
//! maintains the feerate tables used to bound what our peers may propose for our channels.
//!
//! It does not decode onions, speak the peer protocol, sign transactions or hold channel state
//! itself. Those are provided by the surrounding daemon through the traits in [`chain`] and
//! [`ln`]:
//!  * [`chain::chaininterface::FeerateOracle`] feeds the [`chain::feerates::FeeratePolicy`],
//!  * [`ln::onion::OnionProcessor`] decodes incoming onions,
//!  * [`ln::channel::ChannelLedger`] stages and commits outgoing HTLCs,
//!  * [`util::persist::KVStore`] backs the [`ln::forward_ledger::ForwardLedger`].

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate bitcoin;
#[cfg(feature = "hashbrown")]
extern crate hashbrown;

#[macro_use]
pub mod util;
pub mod chain;
pub mod events;
pub mod ln;

pub(crate) mod sync;
