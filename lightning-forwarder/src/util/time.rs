// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Wall-clock access for forward timestamps.

use core::time::Duration;

/// Provides the current time, used to stamp `received_time` and `resolved_time` on forwards.
pub trait TimeProvider {
	/// Get the current time as a duration since the Unix epoch.
	fn duration_since_epoch(&self) -> Duration;
}

/// Default time provider using the system clock.
#[derive(Clone, Debug)]
pub struct DefaultTimeProvider;

impl TimeProvider for DefaultTimeProvider {
	fn duration_since_epoch(&self) -> Duration {
		use std::time::{SystemTime, UNIX_EPOCH};
		// A clock set before 1970 is treated as the epoch itself.
		SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO)
	}
}

impl core::ops::Deref for DefaultTimeProvider {
	type Target = Self;
	fn deref(&self) -> &Self {
		self
	}
}
