// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rule storage.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::instrument;

use loom_acl_core::{Rule, RuleId, Target};

use crate::error::Result;

/// Repository trait for ACL rules.
///
/// Listing methods return rules ordered by prio desc, then revision desc.
/// `save_rule` is an upsert keyed by rule id and assigns a revision higher
/// than any previously assigned.
#[async_trait]
pub trait RuleStore: Send + Sync {
	async fn rules_for(&self, object: &str) -> Result<Vec<Rule>>;

	async fn rules_for_target(&self, object: &str, target: Target) -> Result<Vec<Rule>> {
		self.rules_for_targets(object, &[target]).await
	}

	async fn rules_for_targets(&self, object: &str, targets: &[Target]) -> Result<Vec<Rule>> {
		let mut rules = self.rules_for(object).await?;
		rules.retain(|r| targets.contains(&r.target));
		Ok(rules)
	}

	async fn get_rule(&self, id: RuleId) -> Result<Option<Rule>>;

	/// Rules failing [`Rule::validate`] are rejected before anything is written.
	async fn save_rule(&self, rule: Rule) -> Result<Rule>;

	/// Returns false if no rule had this id.
	async fn delete_rule(&self, id: RuleId) -> Result<bool>;

	/// Deletes every rule of an object type and returns how many were removed.
	async fn remove_object_rules(&self, object: &str) -> Result<u64>;

	async fn max_prio(&self, object: &str) -> Result<Option<i32>> {
		Ok(self.rules_for(object).await?.iter().map(|r| r.prio).max())
	}
}

/// Orders rules by prio desc, then revision desc.
pub fn sort_rules(rules: &mut [Rule]) {
	rules.sort_by_key(|r| (Reverse(r.prio), Reverse(r.revision)));
}

#[derive(Debug, Default)]
struct MemoryState {
	rules: HashMap<RuleId, Rule>,
	revision: u64,
}

/// In-memory [`RuleStore`].
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
	state: RwLock<MemoryState>,
}

impl MemoryRuleStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.state.read().rules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
	async fn rules_for(&self, object: &str) -> Result<Vec<Rule>> {
		let mut rules: Vec<Rule> = self
			.state
			.read()
			.rules
			.values()
			.filter(|r| r.object == object)
			.cloned()
			.collect();
		sort_rules(&mut rules);
		Ok(rules)
	}

	async fn get_rule(&self, id: RuleId) -> Result<Option<Rule>> {
		Ok(self.state.read().rules.get(&id).cloned())
	}

	#[instrument(skip(self, rule), fields(rule_id = %rule.id, object = %rule.object))]
	async fn save_rule(&self, mut rule: Rule) -> Result<Rule> {
		rule.validate()?;
		let mut state = self.state.write();
		state.revision += 1;
		rule.revision = state.revision;
		state.rules.insert(rule.id, rule.clone());
		Ok(rule)
	}

	#[instrument(skip(self), fields(rule_id = %id))]
	async fn delete_rule(&self, id: RuleId) -> Result<bool> {
		Ok(self.state.write().rules.remove(&id).is_some())
	}

	#[instrument(skip(self))]
	async fn remove_object_rules(&self, object: &str) -> Result<u64> {
		let mut state = self.state.write();
		let before = state.rules.len();
		state.rules.retain(|_, r| r.object != object);
		Ok((before - state.rules.len()) as u64)
	}
}
