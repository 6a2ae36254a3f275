// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The mergeable configuration layer produced by each source.

use serde::Deserialize;

use crate::sections::{CacheConfigLayer, DatabaseConfigLayer, EngineConfigLayer, LoggingConfigLayer};

/// One source's view of the configuration. Unset sections and fields are `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AclConfigLayer {
	#[serde(default)]
	pub cache: Option<CacheConfigLayer>,
	#[serde(default)]
	pub engine: Option<EngineConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
}

impl AclConfigLayer {
	/// Overlays `other` on top of `self`; fields set in `other` win.
	pub fn merge(&mut self, other: AclConfigLayer) {
		merge_section(&mut self.cache, other.cache, CacheConfigLayer::merge);
		merge_section(&mut self.engine, other.engine, EngineConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
	}
}

fn merge_section<T: Default>(target: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	if let Some(other) = other {
		merge(target.get_or_insert_with(T::default), other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_keeps_unset_sections() {
		let mut base: AclConfigLayer = toml::from_str(
			r#"
[cache]
max_entries = 50

[engine]
super_admin_user_id = 7
"#,
		)
		.unwrap();

		let overlay: AclConfigLayer = toml::from_str(
			r#"
[engine]
ranking = "priority"
"#,
		)
		.unwrap();

		base.merge(overlay);

		assert_eq!(base.cache.unwrap().max_entries, Some(50));
		let engine = base.engine.unwrap();
		assert_eq!(engine.super_admin_user_id, Some(7));
		assert!(engine.ranking.is_some());
		assert!(base.logging.is_none());
	}
}
