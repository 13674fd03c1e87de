// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Events are returned from the [`Forwarder`] to indicate some action must be taken by the client,
//! such as resolving an incoming HTLC upstream or closing a channel.
//!
//! [`Forwarder`]: crate::ln::forwarder::Forwarder

use crate::ln::bound_enforcer::{ChannelAction, ViolationReason};
use crate::ln::forward_ledger::ForwardStatus;
use crate::ln::types::{ChannelId, ForwardId, PaymentPreimage};
use crate::sync::{Arc, Condvar, Mutex};

use std::collections::VecDeque;

/// An Event which you should probably take some action in response to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
	/// A forward reached a terminal state and its record was durably written.
	///
	/// The incoming HTLC should now be resolved upstream: fulfilled with `payment_preimage` if the
	/// forward settled, or failed back with `failcode` otherwise.
	ForwardResolved {
		/// The forward, identified by its incoming HTLC.
		forward_id: ForwardId,
		/// The terminal status the forward reached.
		status: ForwardStatus,
		/// The BOLT 4 failure code, if the forward failed.
		failcode: Option<u16>,
		/// The failure reason, if the forward failed.
		failreason: Option<String>,
		/// The preimage to fulfill the incoming HTLC with, if the forward settled.
		payment_preimage: Option<PaymentPreimage>,
	},
	/// A peer proposed a feerate outside of our acceptable bounds for a channel. The channel must
	/// be abandoned or closed as indicated by `action`.
	///
	/// Generated at most once per channel.
	FeerateViolation {
		/// The channel the proposal was made for.
		channel_id: ChannelId,
		/// The feerate our peer proposed, in the channel's feerate unit.
		proposed_feerate: u32,
		/// Which bound was broken.
		reason: ViolationReason,
		/// What must happen to the channel.
		action: ChannelAction,
		/// Whether the channel's funding negotiation requires confirmed inputs, to be reported to
		/// the peer alongside the error.
		requires_confirmed_inputs: bool,
	},
}

/// A FIFO of [`Event`]s, drained by the client.
///
/// Events are never dropped: each one stands for a terminal ledger write or a channel-fatal
/// verdict which is not repeated.
pub(crate) struct EventQueue {
	queue: Arc<Mutex<VecDeque<Event>>>,
	condvar: Arc<Condvar>,
}

impl EventQueue {
	pub fn new() -> Self {
		Self { queue: Arc::new(Mutex::new(VecDeque::new())), condvar: Arc::new(Condvar::new()) }
	}

	pub fn enqueue(&self, event: Event) {
		self.queue.lock().unwrap().push_back(event);
		self.condvar.notify_one();
	}

	pub fn next_event(&self) -> Option<Event> {
		self.queue.lock().unwrap().pop_front()
	}

	pub fn wait_next_event(&self) -> Event {
		let mut queue =
			self.condvar.wait_while(self.queue.lock().unwrap(), |queue: &mut VecDeque<Event>| queue.is_empty()).unwrap();

		let event = queue.pop_front().expect("non-empty queue");
		let should_notify = !queue.is_empty();

		drop(queue);

		if should_notify {
			self.condvar.notify_one();
		}

		event
	}

	pub fn get_and_clear_pending_events(&self) -> Vec<Event> {
		self.queue.lock().unwrap().split_off(0).into()
	}
}
