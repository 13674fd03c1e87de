// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Implementations of HTLC forwarding and the bookkeeping and feerate checks around it.
//!
//! The [`forwarder::Forwarder`] is the main entry point, backed by the
//! [`forward_ledger::ForwardLedger`]. The [`bound_enforcer::BoundEnforcer`] checks the feerates
//! our peers propose for our channels.

pub mod bound_enforcer;
pub mod chan_utils;
pub mod channel;
pub mod forward_ledger;
pub mod forwarder;
pub mod onion;
pub mod types;
