// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Inheritance of `sub` rules down object trees.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{instrument, trace};

use loom_acl_core::{LikeCase, ObjectId, RankingPolicy, Rule};

use crate::error::{AclError, Result};
use crate::provider::ObjectStore;
use crate::resolver::{ancestor_match, best, Candidate};

/// Walks the ancestors of an instance looking for `sub` rules.
pub struct HierarchyResolver {
	objects: Arc<dyn ObjectStore>,
	max_depth: usize,
}

impl HierarchyResolver {
	pub fn new(objects: Arc<dyn ObjectStore>, max_depth: usize) -> Self {
		Self { objects, max_depth }
	}

	/// Best `sub` rule of the nearest ancestor that has one.
	///
	/// `rules` must already be filtered to the request's targets and mode.
	#[instrument(skip(self, rules), fields(object_type = %object_type, object_id = %object_id))]
	pub async fn resolve_via_ancestors(
		&self,
		object_type: &str,
		object_id: &ObjectId,
		rules: &[Rule],
		case: LikeCase,
	) -> Result<Option<Candidate>> {
		let mut found = self.walk(object_type, object_id, rules, case, true).await?;
		Ok(found.pop())
	}

	/// Every matching `sub` rule on every ancestor, for priority-only ranking.
	#[instrument(skip(self, rules), fields(object_type = %object_type, object_id = %object_id))]
	pub async fn inherited_candidates(
		&self,
		object_type: &str,
		object_id: &ObjectId,
		rules: &[Rule],
		case: LikeCase,
	) -> Result<Vec<Candidate>> {
		self.walk(object_type, object_id, rules, case, false).await
	}

	async fn walk(
		&self,
		object_type: &str,
		object_id: &ObjectId,
		rules: &[Rule],
		case: LikeCase,
		nearest_only: bool,
	) -> Result<Vec<Candidate>> {
		if !rules.iter().any(|r| r.sub) || !self.objects.is_hierarchical(object_type).await? {
			return Ok(Vec::new());
		}

		let mut visited = HashSet::from([object_id.clone()]);
		let mut current = object_id.clone();
		let mut found = Vec::new();

		for depth in 1.. {
			let Some(parent) = self.objects.get_parent(object_type, &current).await? else {
				break;
			};
			if !visited.insert(parent.clone()) {
				return Err(AclError::Resolution(format!(
					"cycle in {object_type} ancestry at {parent}"
				)));
			}
			if depth > self.max_depth {
				return Err(AclError::Resolution(format!(
					"{object_type} {object_id} is nested deeper than {} levels",
					self.max_depth
				)));
			}

			let fields = self.objects.load_field_values(object_type, &parent).await?;
			let matched: Vec<Candidate> = rules
				.iter()
				.filter(|r| ancestor_match(r, &parent, fields.as_ref(), case))
				.map(|r| Candidate::inherited(r.clone(), parent.clone()))
				.collect();

			trace!(depth, ancestor = %parent, matched = matched.len(), "checked ancestor");

			if nearest_only {
				if let Some(winner) = best(matched, RankingPolicy::Priority) {
					return Ok(vec![winner]);
				}
			} else {
				found.extend(matched);
			}

			current = parent;
		}

		Ok(found)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::provider::MemoryObjectStore;
	use loom_acl_core::{Condition, FieldMap, Operator, Target, UserId};
	use serde_json::json;

	fn tree() -> Arc<MemoryObjectStore> {
		let store = Arc::new(MemoryObjectStore::new());
		store.mark_hierarchical("node");
		let mut root = FieldMap::new();
		root.insert("title".into(), json!("TestNode tree"));
		store.insert("node", 1, root);
		store.insert_child("node", 2, 1, FieldMap::new());
		store.insert_child("node", 3, 2, FieldMap::new());
		store
	}

	fn sub_rule(access: bool) -> Rule {
		Rule::new("node", Target::User(UserId(2)), access).with_sub(true)
	}

	#[tokio::test]
	async fn nearest_ancestor_decides() {
		let resolver = HierarchyResolver::new(tree(), 64);
		let root_deny = sub_rule(false).exact(1);
		let mid_allow = sub_rule(true).exact(2);

		let winner = resolver
			.resolve_via_ancestors(
				"node",
				&ObjectId::from(3),
				&[root_deny.clone(), mid_allow.clone()],
				LikeCase::Sensitive,
			)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(winner.rule.id, mid_allow.id);
		assert_eq!(winner.inherited_from, Some(ObjectId::from(2)));

		let all = resolver
			.inherited_candidates(
				"node",
				&ObjectId::from(3),
				&[root_deny, mid_allow],
				LikeCase::Sensitive,
			)
			.await
			.unwrap();
		assert_eq!(all.len(), 2);
	}

	#[tokio::test]
	async fn condition_sub_rules_match_ancestor_fields() {
		let resolver = HierarchyResolver::new(tree(), 64);
		let rule = sub_rule(false).condition(Condition::leaf("title", Operator::Eq, "TestNode tree"));

		let winner = resolver
			.resolve_via_ancestors("node", &ObjectId::from(3), &[rule], LikeCase::Sensitive)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(winner.inherited_from, Some(ObjectId::from(1)));
		assert!(!winner.rule.access);
	}

	#[tokio::test]
	async fn non_sub_rules_and_flat_types_are_ignored() {
		let store = tree();
		let resolver = HierarchyResolver::new(store.clone(), 64);
		let not_sub = sub_rule(false).exact(1).with_sub(false);
		assert!(resolver
			.resolve_via_ancestors("node", &ObjectId::from(3), &[not_sub], LikeCase::Sensitive)
			.await
			.unwrap()
			.is_none());

		store.insert_child("item", 2, 1, FieldMap::new());
		assert!(resolver
			.resolve_via_ancestors(
				"item",
				&ObjectId::from(2),
				&[sub_rule(false).exact(1)],
				LikeCase::Sensitive
			)
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn cycles_and_depth_are_errors() {
		let store = tree();
		store.insert_child("node", 1, 3, FieldMap::new());
		let resolver = HierarchyResolver::new(store.clone(), 64);
		let err = resolver
			.resolve_via_ancestors(
				"node",
				&ObjectId::from(3),
				&[sub_rule(false).exact(99)],
				LikeCase::Sensitive,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, AclError::Resolution(_)));

		let shallow = HierarchyResolver::new(tree(), 1);
		let err = shallow
			.resolve_via_ancestors(
				"node",
				&ObjectId::from(3),
				&[sub_rule(false).exact(99)],
				LikeCase::Sensitive,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, AclError::Resolution(_)));
	}
}
