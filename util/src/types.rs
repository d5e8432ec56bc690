// Copyright 2018 The Grin Developers
//
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

//! Logging configuration types.

use serde::{Deserialize, Serialize};

/// Log level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogLevel {
	/// Error
	Error,
	/// Warning
	Warning,
	/// Info
	Info,
	/// Debug
	Debug,
	/// Trace
	Trace,
}

/// Logging config, serialized as part of the node's TOML configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
	/// Whether to log to stdout.
	pub log_to_stdout: bool,
	/// Logging level for stdout.
	pub stdout_log_level: LogLevel,
	/// Whether to log to file.
	pub log_to_file: bool,
	/// Log file level.
	pub file_log_level: LogLevel,
	/// Log file path.
	pub log_file_path: String,
	/// Whether to append to the log file or replace it on startup.
	pub log_file_append: bool,
	/// Size in bytes at which the log file is rotated (optional).
	pub log_max_size: Option<u64>,
}

impl Default for LoggingConfig {
	fn default() -> LoggingConfig {
		LoggingConfig {
			log_to_stdout: true,
			stdout_log_level: LogLevel::Warning,
			log_to_file: true,
			file_log_level: LogLevel::Info,
			log_file_path: String::from("krypton.log"),
			log_file_append: true,
			log_max_size: Some(1024 * 1024 * 16),
		}
	}
}
