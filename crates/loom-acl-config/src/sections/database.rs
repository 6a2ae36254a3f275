// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rule database configuration.

use serde::Deserialize;

/// Rule database configuration (runtime, fully resolved).
///
/// Without a URL the engine runs against an in-memory rule store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
	pub url: Option<String>,
}

/// Rule database configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		DatabaseConfig {
			url: self.url.filter(|u| !u.trim().is_empty()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_is_in_memory() {
		assert_eq!(DatabaseConfigLayer::default().finalize().url, None);
	}

	#[test]
	fn test_custom_url() {
		let layer = DatabaseConfigLayer {
			url: Some("sqlite:/var/lib/loom/acl.db".to_string()),
		};
		assert_eq!(
			layer.finalize().url.as_deref(),
			Some("sqlite:/var/lib/loom/acl.db")
		);
	}
}
