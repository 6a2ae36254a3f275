// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Decision cache configuration.

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Decision cache configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
	pub enabled: bool,
	/// Entries older than this are recomputed. `None` keeps entries until invalidated.
	pub ttl: Option<Duration>,
	pub max_entries: usize,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			ttl: None,
			max_entries: DEFAULT_MAX_ENTRIES,
		}
	}
}

/// Decision cache configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub ttl_secs: Option<u64>,
	#[serde(default)]
	pub max_entries: Option<usize>,
}

impl CacheConfigLayer {
	pub fn merge(&mut self, other: CacheConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.ttl_secs.is_some() {
			self.ttl_secs = other.ttl_secs;
		}
		if other.max_entries.is_some() {
			self.max_entries = other.max_entries;
		}
	}

	pub fn finalize(self) -> CacheConfig {
		CacheConfig {
			enabled: self.enabled.unwrap_or(true),
			ttl: self.ttl_secs.filter(|s| *s > 0).map(Duration::from_secs),
			max_entries: self.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES),
		}
	}
}
