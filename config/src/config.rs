// Copyright 2016 The Grin Developers
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

//! Configuration file loading and writing.
//!
//! Looked up, in order, in the working directory and `[user home]/.krypton`.
//! Once loaded a `GlobalConfig` is immutable for the life of the process —
//! there is no file watcher and no reload; changing a setting means editing
//! the file and restarting the node.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::comments::insert_comments;
use crate::types::{ConfigError, ConfigMembers, GlobalConfig, ServerConfig};

/// Name of the config file Krypton looks for.
pub const CONFIG_FILE_NAME: &str = "krypton-server.toml";
const KRYPTON_HOME: &str = ".krypton";

impl Default for GlobalConfig {
	fn default() -> GlobalConfig {
		GlobalConfig {
			config_file_path: None,
			using_config_file: false,
			members: Some(ConfigMembers {
				server: ServerConfig::default(),
				logging: None,
			}),
		}
	}
}

impl GlobalConfig {
	/// Searches the working directory then the user's home directory for
	/// `krypton-server.toml`, parsing it if found; falls back to
	/// `GlobalConfig::default()` otherwise.
	pub fn new(config_file_path: Option<&str>) -> Result<GlobalConfig, ConfigError> {
		if let Some(path) = config_file_path {
			return GlobalConfig::read_from_file(PathBuf::from(path));
		}

		if let Some(path) = check_config_current_dir(CONFIG_FILE_NAME) {
			return GlobalConfig::read_from_file(path);
		}
		if let Some(mut path) = dirs::home_dir() {
			path.push(KRYPTON_HOME);
			path.push(CONFIG_FILE_NAME);
			if path.exists() {
				return GlobalConfig::read_from_file(path);
			}
		}

		Ok(GlobalConfig::default())
	}

	fn read_from_file(path: PathBuf) -> Result<GlobalConfig, ConfigError> {
		let mut file = File::open(&path)?;
		let mut contents = String::new();
		file.read_to_string(&mut contents)?;

		let members: ConfigMembers = toml::from_str(&contents)
			.map_err(|e| ConfigError::ParseError(path.to_string_lossy().into_owned(), e.to_string()))?;

		Ok(GlobalConfig {
			config_file_path: Some(path),
			using_config_file: true,
			members: Some(members),
		})
	}

	/// The server section, assuming `members` has been populated (true for
	/// every `GlobalConfig` returned by `new` or `default`).
	pub fn server_config(&self) -> &ServerConfig {
		&self.members.as_ref().expect("members always populated").server
	}

	/// Serializes this configuration and writes it, with explanatory
	/// comments interleaved ahead of each section and key (the teacher's
	/// `comments.rs` pattern), to `path`.
	pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
		let members = self
			.members
			.as_ref()
			.ok_or_else(|| ConfigError::SerializationError("no config members set".to_owned()))?;

		let raw = toml::to_string(members).map_err(|e| ConfigError::SerializationError(e.to_string()))?;
		let commented = insert_comments(raw);

		let mut file = File::create(path)?;
		file.write_all(commented.as_bytes())?;
		Ok(())
	}
}

fn check_config_current_dir(name: &str) -> Option<PathBuf> {
	let p = PathBuf::from(name);
	if p.exists() {
		Some(p)
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use krypton_core::global::ChainType;

	#[test]
	fn default_config_has_mainnet_chain_type() {
		let config = GlobalConfig::default();
		assert_eq!(config.server_config().chain_type, ChainType::Mainnet);
		assert!(!config.using_config_file);
	}

	#[test]
	fn round_trips_through_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(CONFIG_FILE_NAME);

		let mut original = GlobalConfig::default();
		original.members.as_mut().unwrap().server.db_root = "custom_data".to_owned();
		original.write_to_file(&path).unwrap();

		let reloaded = GlobalConfig::read_from_file(path).unwrap();
		assert_eq!(reloaded.server_config().db_root, "custom_data");
		assert!(reloaded.using_config_file);
	}
}
