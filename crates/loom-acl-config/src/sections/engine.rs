// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rule resolution configuration.

use loom_acl_core::{GroupId, LikeCase, RankingPolicy, UserId};
use serde::Deserialize;

pub const DEFAULT_SUPER_ADMIN_USER: i64 = 1;
pub const DEFAULT_SUPER_ADMIN_GROUP: i64 = 1;
pub const DEFAULT_MAX_ANCESTOR_DEPTH: usize = 64;

/// Rule resolution configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
	pub super_admin_user: UserId,
	pub super_admin_group: GroupId,
	pub like_case: LikeCase,
	pub ranking: RankingPolicy,
	pub max_ancestor_depth: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		EngineConfigLayer::default().finalize()
	}
}

/// Rule resolution configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfigLayer {
	#[serde(default)]
	pub super_admin_user_id: Option<i64>,
	#[serde(default)]
	pub super_admin_group_id: Option<i64>,
	#[serde(default)]
	pub like_case_insensitive: Option<bool>,
	#[serde(default)]
	pub ranking: Option<RankingPolicy>,
	#[serde(default)]
	pub max_ancestor_depth: Option<usize>,
}

impl EngineConfigLayer {
	pub fn merge(&mut self, other: EngineConfigLayer) {
		if other.super_admin_user_id.is_some() {
			self.super_admin_user_id = other.super_admin_user_id;
		}
		if other.super_admin_group_id.is_some() {
			self.super_admin_group_id = other.super_admin_group_id;
		}
		if other.like_case_insensitive.is_some() {
			self.like_case_insensitive = other.like_case_insensitive;
		}
		if other.ranking.is_some() {
			self.ranking = other.ranking;
		}
		if other.max_ancestor_depth.is_some() {
			self.max_ancestor_depth = other.max_ancestor_depth;
		}
	}

	pub fn finalize(self) -> EngineConfig {
		let like_case = if self.like_case_insensitive.unwrap_or(false) {
			LikeCase::Insensitive
		} else {
			LikeCase::Sensitive
		};

		EngineConfig {
			super_admin_user: UserId(self.super_admin_user_id.unwrap_or(DEFAULT_SUPER_ADMIN_USER)),
			super_admin_group: GroupId(
				self.super_admin_group_id
					.unwrap_or(DEFAULT_SUPER_ADMIN_GROUP),
			),
			like_case,
			ranking: self.ranking.unwrap_or_default(),
			max_ancestor_depth: self
				.max_ancestor_depth
				.unwrap_or(DEFAULT_MAX_ANCESTOR_DEPTH),
		}
	}
}
