// Copyright 2018 The Grin Developers
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging wrapper used throughout the Krypton workspace. Builds a
//! `log4rs` pipeline from a [`LoggingConfig`] and installs a panic hook
//! that routes panics through the same pipeline.

use crate::Mutex;
use std::ops::Deref;
use std::{panic, thread};

use backtrace::Backtrace;

use crate::types::{LogLevel, LoggingConfig};

use log::{LevelFilter, Record};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::append::rolling_file::{
	policy::compound::roll::fixed_window::FixedWindowRoller,
	policy::compound::trigger::size::SizeTrigger, policy::compound::CompoundPolicy,
	RollingFileAppender,
};
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::{threshold::ThresholdFilter, Filter, Response};

fn convert_log_level(in_level: &LogLevel) -> LevelFilter {
	match *in_level {
		LogLevel::Info => LevelFilter::Info,
		LogLevel::Warning => LevelFilter::Warn,
		LogLevel::Debug => LevelFilter::Debug,
		LogLevel::Trace => LevelFilter::Trace,
		LogLevel::Error => LevelFilter::Error,
	}
}

lazy_static! {
	/// Whether logging was explicitly initialized (nothing is emitted before that).
	static ref WAS_INIT: Mutex<bool> = Mutex::new(false);
	/// Saved logging configuration, used by the panic hook.
	static ref LOGGING_CONFIG: Mutex<LoggingConfig> = Mutex::new(LoggingConfig::default());
}

const LOGGING_PATTERN: &str = "{d(%Y%m%d %H:%M:%S%.3f)} {h({l})} {M} - {m}{n}";

/// Rejects records whose module path doesn't belong to this workspace, so
/// log output isn't drowned out by noisy dependencies.
#[derive(Debug)]
struct KryptonFilter;

impl Filter for KryptonFilter {
	fn filter(&self, record: &Record<'_>) -> Response {
		match record.module_path() {
			Some(module_path) if module_path.starts_with("krypton") => Response::Neutral,
			Some(_) => Response::Reject,
			None => Response::Neutral,
		}
	}
}

/// Initializes the global logger with the given configuration. A `None`
/// leaves logging off, matching the node's "no config, no log output"
/// startup contract.
pub fn init_logger(config: Option<LoggingConfig>) {
	if let Some(c) = config {
		let mut config_ref = LOGGING_CONFIG.lock();
		*config_ref = c.clone();

		let level_stdout = convert_log_level(&c.stdout_log_level);
		let level_file = convert_log_level(&c.file_log_level);
		let level_minimum = level_stdout.max(level_file);

		let stdout = ConsoleAppender::builder()
			.encoder(Box::new(PatternEncoder::new(LOGGING_PATTERN)))
			.build();

		let mut root = Root::builder();
		let mut appenders = vec![];

		if c.log_to_stdout {
			appenders.push(
				Appender::builder()
					.filter(Box::new(ThresholdFilter::new(level_stdout)))
					.filter(Box::new(KryptonFilter))
					.build("stdout", Box::new(stdout)),
			);
			root = root.appender("stdout");
		}

		if c.log_to_file {
			let file: Box<dyn Append> = if let Some(size) = c.log_max_size {
				let roller = FixedWindowRoller::builder()
					.build(&format!("{}.{{}}.gz", c.log_file_path), 32)
					.expect("invalid log rotation pattern");
				let trigger = SizeTrigger::new(size);
				let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));
				Box::new(
					RollingFileAppender::builder()
						.append(c.log_file_append)
						.encoder(Box::new(PatternEncoder::new(LOGGING_PATTERN)))
						.build(&c.log_file_path, Box::new(policy))
						.expect("could not open rolling log file"),
				)
			} else {
				Box::new(
					FileAppender::builder()
						.append(c.log_file_append)
						.encoder(Box::new(PatternEncoder::new(LOGGING_PATTERN)))
						.build(&c.log_file_path)
						.expect("could not open log file"),
				)
			};

			appenders.push(
				Appender::builder()
					.filter(Box::new(ThresholdFilter::new(level_file)))
					.filter(Box::new(KryptonFilter))
					.build("file", file),
			);
			root = root.appender("file");
		}

		let config = Config::builder()
			.appenders(appenders)
			.build(root.build(level_minimum))
			.expect("invalid logging configuration");

		let _ = log4rs::init_config(config);

		info!(
			"logging initialized, file level: {:?}, stdout level: {:?}",
			level_file, level_stdout
		);

		*WAS_INIT.lock() = true;
	}

	send_panic_to_log();
}

/// Initializes a minimal stdout-only logger for tests. Idempotent.
pub fn init_test_logger() {
	let mut was_init_ref = WAS_INIT.lock();
	if *was_init_ref.deref() {
		return;
	}

	let mut logger = LoggingConfig::default();
	logger.log_to_file = false;
	logger.stdout_log_level = LogLevel::Debug;
	*LOGGING_CONFIG.lock() = logger.clone();

	let level_stdout = convert_log_level(&logger.stdout_log_level);
	let stdout = ConsoleAppender::builder()
		.encoder(Box::new(PatternEncoder::default()))
		.build();

	let appender = Appender::builder()
		.filter(Box::new(ThresholdFilter::new(level_stdout)))
		.filter(Box::new(KryptonFilter))
		.build("stdout", Box::new(stdout));

	let config = Config::builder()
		.appender(appender)
		.build(Root::builder().appender("stdout").build(level_stdout))
		.expect("invalid test logging configuration");

	let _ = log4rs::init_config(config);
	*was_init_ref = true;
}

/// Routes panics through the logging pipeline in addition to stderr, so a
/// panic in a background sync thread is not silently swallowed.
fn send_panic_to_log() {
	panic::set_hook(Box::new(|info| {
		let backtrace = Backtrace::new();
		let thread = thread::current();
		let thread = thread.name().unwrap_or("unnamed");

		let msg = match info.payload().downcast_ref::<&'static str>() {
			Some(s) => (*s).to_string(),
			None => match info.payload().downcast_ref::<String>() {
				Some(s) => s.clone(),
				None => "Box<dyn Any>".to_string(),
			},
		};

		match info.location() {
			Some(location) => error!(
				"thread '{}' panicked at '{}': {}:{}\n{:?}",
				thread,
				msg,
				location.file(),
				location.line(),
				backtrace
			),
			None => error!("thread '{}' panicked at '{}'\n{:?}", thread, msg, backtrace),
		}

		let config = LOGGING_CONFIG.lock();
		eprintln!(
			"thread '{}' panicked with message:\n\"{}\"\nsee {} for details.",
			thread, msg, config.log_file_path
		);
	}));
}
