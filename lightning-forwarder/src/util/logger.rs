// Pruned copy of crate rust log, without global logger
// https://github.com/rust-lang-nursery/log #7a60286
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Log traits live here, which are called throughout the library to provide useful information for
//! debugging purposes.
//!
//! Log messages should be filtered client-side by implementing check against a given [`Record`]'s
//! [`Level`] field. Each module may have its own Logger or share one.

use core::cmp;
use core::fmt;
use core::fmt::Display;
use core::ops::Deref;

use crate::util::scid_utils::DisplayScid;

static LOG_LEVEL_NAMES: [&'static str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// An enum representing the available verbosity levels of the logger.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Level {
	/// Designates very low priority, often extremely verbose, information
	Trace,
	/// Designates lower priority information
	Debug,
	/// Designates useful information
	Info,
	/// Designates hazardous situations
	Warn,
	/// Designates very serious errors
	Error,
}

impl PartialOrd for Level {
	#[inline]
	fn partial_cmp(&self, other: &Level) -> Option<cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Level {
	#[inline]
	fn cmp(&self, other: &Level) -> cmp::Ordering {
		(*self as usize).cmp(&(*other as usize))
	}
}

impl fmt::Display for Level {
	fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
		fmt.pad(LOG_LEVEL_NAMES[*self as usize])
	}
}

impl Level {
	/// Returns the most verbose logging level.
	#[inline]
	pub fn max() -> Level {
		Level::Trace
	}
}

/// A Record, unit of logging output with Metadata to enable filtering
/// Module_path, file, line to inform on log's source
#[derive(Clone, Debug)]
pub struct Record<'a> {
	/// The verbosity level of the message.
	pub level: Level,
	/// The short channel id of the channel pertaining to the logged record. For forwards this is
	/// the incoming channel. Since it is not repeated in the message body, include it in the log
	/// output so entries remain clear.
	pub short_channel_id: Option<u64>,
	/// The HTLC id on [`Self::short_channel_id`] the logged record relates to, if any.
	pub htlc_id: Option<u64>,
	/// The message body.
	pub args: fmt::Arguments<'a>,
	/// The module path of the message.
	pub module_path: &'static str,
	/// The source file containing the message.
	pub file: &'static str,
	/// The line containing the message.
	pub line: u32,
}

impl<'a> Record<'a> {
	/// Returns a new Record.
	#[inline]
	pub fn new(
		level: Level, short_channel_id: Option<u64>, htlc_id: Option<u64>, args: fmt::Arguments<'a>,
		module_path: &'static str, file: &'static str, line: u32,
	) -> Record<'a> {
		Record { level, short_channel_id, htlc_id, args, module_path, file, line }
	}
}

impl<'a> Display for Record<'a> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:<5} [{}:{}]", self.level, self.module_path, self.line)?;
		if let Some(scid) = self.short_channel_id {
			write!(f, " ch:{}", DisplayScid(scid))?;
			if let Some(htlc_id) = self.htlc_id {
				write!(f, "/{}", htlc_id)?;
			}
		}
		write!(f, " {}", self.args)
	}
}

/// A trait encapsulating the operations required of a logger. Keep in mind that log messages might not be entirely
/// self-explanatory and may need accompanying context fields to be fully understood.
pub trait Logger {
	/// Logs the [`Record`]. Since [`Record::short_channel_id`] and [`Record::htlc_id`] are not
	/// embedded in the message body, log implementations should print those alongside the message
	/// to keep entries clear.
	fn log(&self, record: Record);
}

impl<L: Logger + ?Sized> Logger for &L {
	fn log(&self, record: Record) {
		(**self).log(record)
	}
}

impl<L: Logger + ?Sized> Logger for std::sync::Arc<L> {
	fn log(&self, record: Record) {
		(**self).log(record)
	}
}

/// Adds relevant context to a [`Record`] before passing it to the wrapped [`Logger`].
pub struct WithContext<'a, L: Deref>
where
	L::Target: Logger,
{
	/// The logger to delegate to after adding context to the record.
	logger: &'a L,
	/// The short channel id pertaining to the logged record.
	short_channel_id: Option<u64>,
	/// The HTLC id pertaining to the logged record.
	htlc_id: Option<u64>,
}

impl<'a, L: Deref> Logger for WithContext<'a, L>
where
	L::Target: Logger,
{
	fn log(&self, mut record: Record) {
		if self.short_channel_id.is_some() {
			record.short_channel_id = self.short_channel_id;
		}
		if self.htlc_id.is_some() {
			record.htlc_id = self.htlc_id;
		}
		self.logger.log(record)
	}
}

impl<'a, L: Deref> WithContext<'a, L>
where
	L::Target: Logger,
{
	/// Wraps the given logger, providing additional context to any logged records.
	pub fn from(logger: &'a L, short_channel_id: Option<u64>, htlc_id: Option<u64>) -> Self {
		WithContext { logger, short_channel_id, htlc_id }
	}
}

/// Wrapper for logging byte slices in hex format.
#[doc(hidden)]
pub struct DebugBytes<'a>(pub &'a [u8]);
impl<'a> core::fmt::Display for DebugBytes<'a> {
	fn fmt(&self, f: &mut core::fmt::Formatter) -> Result<(), core::fmt::Error> {
		for i in self.0 {
			write!(f, "{:02x}", i)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::sync::Arc;
	use crate::util::logger::{Level, Logger, WithContext};
	use crate::util::test_utils::TestLogger;

	#[test]
	fn test_level_show() {
		assert_eq!("INFO", Level::Info.to_string());
		assert_eq!("ERROR", Level::Error.to_string());
		assert_ne!("WARN", Level::Error.to_string());
	}

	struct WrapperLog {
		logger: Arc<dyn Logger>,
	}

	impl WrapperLog {
		fn new(logger: Arc<dyn Logger>) -> WrapperLog {
			WrapperLog { logger }
		}

		fn call_macros(&self) {
			log_error!(self.logger, "This is an error");
			log_warn!(self.logger, "This is a warning");
			log_info!(self.logger, "This is an info");
			log_debug!(self.logger, "This is a debug");
			log_trace!(self.logger, "This is a trace");
		}
	}

	#[test]
	fn test_logging_macros() {
		let logger = Arc::new(TestLogger::new());
		let wrapper = WrapperLog::new(Arc::clone(&logger) as Arc<dyn Logger>);
		wrapper.call_macros();
		logger.assert_log("lightning_forwarder::util::logger::tests".to_owned(), "This is an error".to_owned(), 1);
		logger.assert_log("lightning_forwarder::util::logger::tests".to_owned(), "This is a trace".to_owned(), 1);
	}

	#[test]
	fn test_logging_with_context() {
		let logger = &TestLogger::new();
		let context_logger = WithContext::from(&logger, Some(42), Some(7));
		log_error!(context_logger, "This is an error");
		log_warn!(context_logger, "This is an error");
		log_info!(context_logger, "This is an error");
		logger.assert_log_context_contains("lightning_forwarder::util::logger::tests", Some(42), Some(7), 3);
	}

	#[test]
	fn test_logging_with_multiple_wrapped_context() {
		let logger = &TestLogger::new();
		let context_logger = &WithContext::from(&logger, Some(42), None);
		let full_context_logger = WithContext::from(&context_logger, None, Some(9));
		log_debug!(full_context_logger, "This is a debug");
		log_trace!(full_context_logger, "This is a trace");
		logger.assert_log_context_contains("lightning_forwarder::util::logger::tests", Some(42), Some(9), 2);
	}

	#[test]
	fn test_log_ordering() {
		assert!(Level::Error > Level::Warn);
		assert!(Level::Warn > Level::Info);
		assert!(Level::Info > Level::Debug);
		assert!(Level::Debug > Level::Trace);
		assert!(Level::Trace >= Level::Trace);
		assert!(Level::Trace < Level::Debug);
		assert_eq!(Level::max(), Level::Trace);
	}
}
