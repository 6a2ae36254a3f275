// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The `Acl` service: cached checks plus the rule mutation surface.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, instrument, warn};

use loom_acl_config::{AclConfig, CacheConfig, EngineConfig};
use loom_acl_core::{
	AclRequest, Condition, Constraint, Decision, FieldMap, FieldRules, Mode, ObjectId,
	RankingPolicy, Rule, RuleId, Target, Verdict, VerdictSource,
};

use crate::cache::{DecisionCache, Fingerprint, InvalidationScope};
use crate::error::{AclError, Result};
use crate::hierarchy::HierarchyResolver;
use crate::provider::{GroupDirectory, MemoryDirectory, MemoryObjectStore, ObjectStore};
use crate::resolver::{best, direct_match, field_verdict, Candidate, Specificity};
use crate::store::{MemoryRuleStore, RuleStore};

/// Builder for [`Acl`]. Collaborators left unset default to in-memory ones.
#[derive(Default)]
pub struct AclBuilder {
	rules: Option<Arc<dyn RuleStore>>,
	objects: Option<Arc<dyn ObjectStore>>,
	directory: Option<Arc<dyn GroupDirectory>>,
	engine: EngineConfig,
	cache: CacheConfig,
}

impl AclBuilder {
	pub fn rule_store(mut self, rules: Arc<dyn RuleStore>) -> Self {
		self.rules = Some(rules);
		self
	}

	pub fn object_store(mut self, objects: Arc<dyn ObjectStore>) -> Self {
		self.objects = Some(objects);
		self
	}

	pub fn directory(mut self, directory: Arc<dyn GroupDirectory>) -> Self {
		self.directory = Some(directory);
		self
	}

	pub fn engine_config(mut self, engine: EngineConfig) -> Self {
		self.engine = engine;
		self
	}

	pub fn cache_config(mut self, cache: CacheConfig) -> Self {
		self.cache = cache;
		self
	}

	pub fn config(self, config: &AclConfig) -> Self {
		self.engine_config(config.engine.clone())
			.cache_config(config.cache.clone())
	}

	pub fn build(self) -> Acl {
		let objects = self
			.objects
			.unwrap_or_else(|| Arc::new(MemoryObjectStore::new()));
		let hierarchy = HierarchyResolver::new(objects.clone(), self.engine.max_ancestor_depth);

		Acl {
			inner: Arc::new(AclInner {
				rules: self.rules.unwrap_or_else(|| Arc::new(MemoryRuleStore::new())),
				objects,
				directory: self
					.directory
					.unwrap_or_else(|| Arc::new(MemoryDirectory::new())),
				hierarchy,
				cache: DecisionCache::new(&self.cache),
				engine: self.engine,
				write_locks: Mutex::new(HashMap::new()),
			}),
		}
	}
}

struct AclInner {
	rules: Arc<dyn RuleStore>,
	objects: Arc<dyn ObjectStore>,
	directory: Arc<dyn GroupDirectory>,
	hierarchy: HierarchyResolver,
	cache: DecisionCache,
	engine: EngineConfig,
	write_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Access control entry point. Cheap to clone; clones share stores and cache.
#[derive(Clone)]
pub struct Acl {
	inner: Arc<AclInner>,
}

impl Acl {
	pub fn builder() -> AclBuilder {
		AclBuilder::default()
	}

	// Query side

	/// Returns whether the request is allowed. Errors deny and are logged.
	pub async fn check(&self, request: &AclRequest) -> bool {
		match self.try_check(request).await {
			Ok(allowed) => allowed,
			Err(e) => {
				warn!(
					error = %e,
					object = %request.object(),
					mode = %request.mode(),
					"ACL check failed, denying"
				);
				false
			}
		}
	}

	/// Like [`Acl::check`] but surfaces resolution errors.
	#[instrument(skip(self, request), fields(object = %request.object(), mode = %request.mode()))]
	pub async fn try_check(&self, request: &AclRequest) -> Result<bool> {
		let cache = &self.inner.cache;
		let token = cache.token(request.object());
		let targets = self.resolve_targets(request).await?;
		let fingerprint = Fingerprint::of(request, &targets);

		if let Some(allowed) = cache.get(request.object(), &fingerprint) {
			debug!(allowed, "decision cache hit");
			return Ok(allowed);
		}

		let verdict = self.resolve(request, &targets).await?;
		let allowed = verdict.is_allowed();
		cache.put(request.object(), fingerprint, allowed, token);
		Ok(allowed)
	}

	/// Resolves without the cache and reports which rule decided.
	#[instrument(skip(self, request), fields(object = %request.object(), mode = %request.mode()))]
	pub async fn explain(&self, request: &AclRequest) -> Result<Verdict> {
		let targets = self.resolve_targets(request).await?;
		self.resolve(request, &targets).await
	}

	/// All rules of an object type, best first.
	pub async fn rules_for(&self, object: &str) -> Result<Vec<Rule>> {
		self.inner.rules.rules_for(object).await
	}

	/// The requested user plus every group they belong to, or the requested group.
	async fn resolve_targets(&self, request: &AclRequest) -> Result<Vec<Target>> {
		match request.target() {
			None => Ok(Vec::new()),
			Some(Target::Group(group)) => Ok(vec![Target::Group(group)]),
			Some(Target::User(user)) => {
				let mut targets = vec![Target::User(user)];
				let groups = self.inner.directory.groups_of(user).await?;
				targets.extend(groups.into_iter().map(Target::Group));
				Ok(targets)
			}
		}
	}

	fn is_super_admin(&self, targets: &[Target]) -> bool {
		let engine = &self.inner.engine;
		targets.iter().any(|t| match t {
			Target::User(id) => *id == engine.super_admin_user,
			Target::Group(id) => *id == engine.super_admin_group,
		})
	}

	/// Values condition rules are evaluated against: the stored object if the
	/// request names one that exists, otherwise the submitted values.
	async fn condition_context(&self, request: &AclRequest) -> Result<Option<FieldMap>> {
		if let Some(id) = request.object_id() {
			if let Some(fields) = self
				.inner
				.objects
				.load_field_values(request.object(), id)
				.await?
			{
				return Ok(Some(fields));
			}
		}
		Ok((!request.fields().is_empty()).then(|| request.fields().clone()))
	}

	async fn resolve(&self, request: &AclRequest, targets: &[Target]) -> Result<Verdict> {
		let engine = &self.inner.engine;
		let case = engine.like_case;

		let rules: Vec<Rule> = if targets.is_empty() {
			Vec::new()
		} else {
			self.inner
				.rules
				.rules_for_targets(request.object(), targets)
				.await?
				.into_iter()
				.filter(|r| r.covers(request.mode()))
				.collect()
		};

		let needs_fields = rules
			.iter()
			.any(|r| matches!(r.constraint, Constraint::Condition(_)));
		let context = if needs_fields {
			self.condition_context(request).await?
		} else {
			None
		};

		let direct: Vec<Candidate> = rules
			.iter()
			.filter_map(|r| {
				direct_match(r, request.object_id(), context.as_ref(), case)
					.map(|s| Candidate::direct(r.clone(), s))
			})
			.collect();

		let winner = match engine.ranking {
			RankingPolicy::Specificity => {
				let (specific, unconstrained): (Vec<_>, Vec<_>) = direct
					.into_iter()
					.partition(|c| c.specificity > Specificity::Inherited);

				match best(specific, RankingPolicy::Specificity) {
					Some(winner) => Some(winner),
					None => match self.inherited(request, &rules).await? {
						Some(winner) => Some(winner),
						None => best(unconstrained, RankingPolicy::Specificity),
					},
				}
			}
			RankingPolicy::Priority => {
				let mut candidates = direct;
				if let Some(id) = request.object_id() {
					candidates.extend(
						self.inner
							.hierarchy
							.inherited_candidates(request.object(), id, &rules, case)
							.await?,
					);
				}
				best(candidates, RankingPolicy::Priority)
			}
		};

		let verdict = match winner {
			Some(winner) => self.rule_verdict(request, winner).await?,
			None if self.is_super_admin(targets) => Verdict::super_admin(),
			None => Verdict::default_deny(),
		};

		debug!(
			object = %request.object(),
			object_id = ?request.object_id(),
			mode = %request.mode(),
			decision = ?verdict.decision,
			source = ?verdict.source,
			"ACL decision"
		);
		Ok(verdict)
	}

	async fn inherited(&self, request: &AclRequest, rules: &[Rule]) -> Result<Option<Candidate>> {
		let Some(id) = request.object_id() else {
			return Ok(None);
		};
		self.inner
			.hierarchy
			.resolve_via_ancestors(request.object(), id, rules, self.inner.engine.like_case)
			.await
	}

	async fn rule_verdict(&self, request: &AclRequest, winner: Candidate) -> Result<Verdict> {
		let Candidate {
			rule,
			inherited_from,
			..
		} = winner;

		if rule.access
			&& request.mode() == Mode::Update
			&& !request.is_listing()
			&& !request.fields().is_empty()
		{
			if let Some(denied) = self.apply_field_rules(request, &rule).await? {
				return Ok(Verdict::new(
					Decision::Deny,
					VerdictSource::FieldRule {
						rule_id: rule.id,
						field: denied,
					},
				));
			}
		}

		Ok(Verdict::new(
			Decision::from_access(rule.access),
			VerdictSource::Rule {
				rule_id: rule.id,
				inherited_from,
			},
		))
	}

	/// Returns the first submitted field the winning rule's field rules revoke.
	async fn apply_field_rules(&self, request: &AclRequest, rule: &Rule) -> Result<Option<String>> {
		for (field, value) in request.fields() {
			let Some(field_rules) = rule.fields.get(field).filter(|r| !r.is_empty()) else {
				continue;
			};
			let context = self.field_context(request.object(), field, value).await?;
			if field_verdict(field_rules, &context, self.inner.engine.like_case) == Some(false) {
				return Ok(Some(field.clone()));
			}
		}
		Ok(None)
	}

	/// Relation fields are judged by the related object's fields, other
	/// fields by the submitted value alone.
	async fn field_context(
		&self,
		object: &str,
		field: &str,
		value: &serde_json::Value,
	) -> Result<FieldMap> {
		let objects = &self.inner.objects;
		if let Some(target_type) = objects.relation_target(object, field).await? {
			let related = match ObjectId::from_value(value) {
				Some(id) => objects.load_field_values(&target_type, &id).await?,
				None => None,
			};
			return Ok(related.unwrap_or_default());
		}

		let mut context = FieldMap::new();
		context.insert(field.to_string(), value.clone());
		Ok(context)
	}

	// Mutation side

	async fn lock_object(&self, object: &str) -> OwnedMutexGuard<()> {
		let lock = self
			.inner
			.write_locks
			.lock()
			.entry(object.to_string())
			.or_default()
			.clone();
		lock.lock_owned().await
	}

	async fn next_prio(&self, object: &str) -> Result<i32> {
		Ok(self
			.inner
			.rules
			.max_prio(object)
			.await?
			.map_or(1, |p| p.saturating_add(1)))
	}

	/// Saves the rule matching `same` or a new one built by `create`, then invalidates.
	async fn upsert(
		&self,
		object: &str,
		target: Target,
		same: impl Fn(&Rule) -> bool + Send,
		update: impl FnOnce(Rule) -> Rule + Send,
		create: impl FnOnce(i32) -> Rule + Send,
	) -> Result<Rule> {
		let _guard = self.lock_object(object).await;
		let existing = self
			.inner
			.rules
			.rules_for_target(object, target)
			.await?
			.into_iter()
			.find(|r| same(r));

		let rule = match existing {
			Some(rule) => {
				let mut rule = update(rule);
				// Under priority ranking an updated rule moves to the top, like a new one.
				if self.inner.engine.ranking == RankingPolicy::Priority {
					rule.prio = self.next_prio(object).await?;
				}
				rule
			}
			None => create(self.next_prio(object).await?),
		};

		let saved = self.inner.rules.save_rule(rule).await?;
		self.inner
			.cache
			.invalidate(&InvalidationScope::Object(object.to_string()));
		Ok(saved)
	}

	/// Grants or revokes every mode on every instance of `object`.
	#[instrument(skip(self), fields(target = %target))]
	pub async fn set_object_list(&self, object: &str, target: Target, access: bool) -> Result<Rule> {
		self.upsert(
			object,
			target,
			|r| r.mode == Mode::All && r.constraint == Constraint::All && !r.sub,
			|r| Rule { access, ..r },
			|prio| Rule::new(object, target, access).with_prio(prio),
		)
		.await
	}

	/// Grants or revokes listing one instance.
	#[instrument(skip(self, object_id), fields(target = %target, object_id = %object_id))]
	pub async fn set_object_list_exact(
		&self,
		object: &str,
		object_id: ObjectId,
		target: Target,
		access: bool,
	) -> Result<Rule> {
		let constraint = Constraint::Exact(object_id);
		let matching = constraint.clone();
		self.upsert(
			object,
			target,
			move |r| r.mode == Mode::List && r.constraint == matching,
			|r| Rule { access, ..r },
			|prio| {
				Rule::new(object, target, access)
					.with_mode(Mode::List)
					.with_constraint(constraint)
					.with_prio(prio)
			},
		)
		.await
	}

	/// Adds a listing rule for the instances matching `condition`.
	#[instrument(skip(self, condition), fields(target = %target, condition = %condition))]
	pub async fn set_object_list_condition(
		&self,
		object: &str,
		condition: Condition,
		target: Target,
		access: bool,
	) -> Result<Rule> {
		self.upsert(
			object,
			target,
			|_| false,
			|r| r,
			|prio| {
				Rule::new(object, target, access)
					.with_mode(Mode::List)
					.condition(condition)
					.with_prio(prio)
			},
		)
		.await
	}

	/// Grants or revokes updates, with per-field rules.
	#[instrument(skip(self, fields), fields(target = %target))]
	pub async fn set_object_update(
		&self,
		object: &str,
		target: Target,
		access: bool,
		fields: FieldRules,
	) -> Result<Rule> {
		let update_fields = fields.clone();
		self.upsert(
			object,
			target,
			|r| r.mode == Mode::Update && r.constraint == Constraint::All && !r.sub,
			|r| Rule {
				access,
				fields: update_fields,
				..r
			},
			|prio| {
				Rule::new(object, target, access)
					.with_mode(Mode::Update)
					.with_fields(fields)
					.with_prio(prio)
			},
		)
		.await
	}

	/// Deletes every rule of `object`.
	#[instrument(skip(self))]
	pub async fn remove_object_rules(&self, object: &str) -> Result<u64> {
		let _guard = self.lock_object(object).await;
		let removed = self.inner.rules.remove_object_rules(object).await?;
		self.inner
			.cache
			.invalidate(&InvalidationScope::Object(object.to_string()));
		Ok(removed)
	}

	/// Creates or replaces a rule by id.
	#[instrument(skip(self, rule), fields(rule_id = %rule.id, object = %rule.object))]
	pub async fn save_rule(&self, rule: Rule) -> Result<Rule> {
		let object = rule.object.clone();
		let _guard = self.lock_object(&object).await;
		let previous = self.inner.rules.get_rule(rule.id).await?;
		let saved = self.inner.rules.save_rule(rule).await?;

		self.inner
			.cache
			.invalidate(&InvalidationScope::Object(object.clone()));
		if let Some(previous) = previous.filter(|p| p.object != object) {
			self.inner
				.cache
				.invalidate(&InvalidationScope::Object(previous.object));
		}
		Ok(saved)
	}

	#[instrument(skip(self), fields(rule_id = %id))]
	pub async fn delete_rule(&self, id: RuleId) -> Result<()> {
		let rule = self
			.inner
			.rules
			.get_rule(id)
			.await?
			.ok_or(AclError::RuleNotFound(id))?;

		let _guard = self.lock_object(&rule.object).await;
		if !self.inner.rules.delete_rule(id).await? {
			return Err(AclError::RuleNotFound(id));
		}
		self.inner
			.cache
			.invalidate(&InvalidationScope::Object(rule.object));
		Ok(())
	}

	// Cache control

	pub fn set_caching(&self, enabled: bool) {
		self.inner.cache.set_enabled(enabled);
	}

	pub fn is_caching(&self) -> bool {
		self.inner.cache.is_enabled()
	}

	pub fn invalidate_cache(&self, scope: InvalidationScope) {
		self.inner.cache.invalidate(&scope);
	}

	pub fn cached_decisions(&self) -> usize {
		self.inner.cache.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use loom_acl_core::{FieldRule, GroupId, Operator, UserId};
	use serde_json::json;

	fn user(id: i64) -> Target {
		Target::User(UserId(id))
	}

	struct FailingDirectory;

	#[async_trait]
	impl GroupDirectory for FailingDirectory {
		async fn groups_of(&self, _user: UserId) -> Result<Vec<loom_acl_core::GroupId>> {
			Err(AclError::Resolution("directory offline".into()))
		}
	}

	#[tokio::test]
	async fn errors_fail_closed() {
		let acl = Acl::builder()
			.directory(Arc::new(FailingDirectory))
			.build();
		acl.set_object_list("item", user(5), true).await.unwrap();

		let request = AclRequest::create("item").target_user(5);
		assert!(!acl.check(&request).await);
		assert!(matches!(
			acl.try_check(&request).await,
			Err(AclError::Resolution(_))
		));
	}

	#[tokio::test]
	async fn helpers_upsert_and_assign_prio() {
		let acl = Acl::builder().build();
		let first = acl.set_object_list("item", user(5), true).await.unwrap();
		assert_eq!(first.prio, 1);

		let again = acl.set_object_list("item", user(5), false).await.unwrap();
		assert_eq!(again.id, first.id);
		assert_eq!(again.prio, 1);
		assert!(!again.access);

		let exact = acl
			.set_object_list_exact("item", ObjectId::from(3), user(5), true)
			.await
			.unwrap();
		assert_eq!(exact.prio, 2);
		let exact_again = acl
			.set_object_list_exact("item", ObjectId::from(3), user(5), false)
			.await
			.unwrap();
		assert_eq!(exact_again.id, exact.id);

		let c1 = acl
			.set_object_list_condition(
				"item",
				Condition::leaf("id", Operator::Gt, 1),
				user(5),
				true,
			)
			.await
			.unwrap();
		let c2 = acl
			.set_object_list_condition(
				"item",
				Condition::leaf("id", Operator::Gt, 1),
				user(5),
				true,
			)
			.await
			.unwrap();
		assert_ne!(c1.id, c2.id);
		assert_eq!(acl.rules_for("item").await.unwrap().len(), 4);
	}

	#[tokio::test]
	async fn priority_ranking_raises_updated_rules() {
		let acl = Acl::builder()
			.engine_config(EngineConfig {
				ranking: RankingPolicy::Priority,
				..EngineConfig::default()
			})
			.build();
		let first = acl.set_object_list("item", user(5), true).await.unwrap();
		assert_eq!(first.prio, 1);
		acl.set_object_list_exact("item", ObjectId::from(3), user(5), false)
			.await
			.unwrap();

		let again = acl.set_object_list("item", user(5), true).await.unwrap();
		assert_eq!(again.id, first.id);
		assert_eq!(again.prio, 3);
		assert!(
			acl.check(
				&AclRequest::for_object("item", 3)
					.only_listing_mode()
					.target_user(5)
			)
			.await
		);
	}

	#[tokio::test]
	async fn group_membership_grants_access() {
		let directory = Arc::new(MemoryDirectory::new());
		directory.add_member(GroupId(4), UserId(9));
		let acl = Acl::builder().directory(directory).build();
		acl.set_object_list("item", Target::Group(GroupId(4)), true)
			.await
			.unwrap();

		assert!(acl.check(&AclRequest::create("item").target_user(9)).await);
		assert!(!acl.check(&AclRequest::create("item").target_user(10)).await);
		assert!(acl.check(&AclRequest::create("item").target_group(4)).await);
	}

	#[tokio::test]
	async fn missing_target_is_denied_even_with_rules() {
		let acl = Acl::builder().build();
		acl.set_object_list("item", user(5), true).await.unwrap();
		assert!(!acl.check(&AclRequest::create("item")).await);
	}

	#[tokio::test]
	async fn explain_names_the_deciding_rule() {
		let acl = Acl::builder().build();
		let rule = acl.set_object_list("item", user(5), true).await.unwrap();

		let verdict = acl
			.explain(&AclRequest::create("item").target_user(5))
			.await
			.unwrap();
		assert_eq!(
			verdict,
			Verdict::new(
				Decision::Allow,
				VerdictSource::Rule {
					rule_id: rule.id,
					inherited_from: None
				}
			)
		);

		let verdict = acl
			.explain(&AclRequest::create("item").target_user(1))
			.await
			.unwrap();
		assert_eq!(verdict, Verdict::super_admin());
	}

	#[tokio::test]
	async fn relation_field_rules_use_related_object() {
		let objects = Arc::new(MemoryObjectStore::new());
		objects.define_relation("item", "owner", "profile");
		let mut locked = FieldMap::new();
		locked.insert("status".into(), json!("locked"));
		objects.insert("profile", 20, locked);
		objects.insert("profile", 21, FieldMap::new());
		objects.insert("item", 1, FieldMap::new());

		let acl = Acl::builder().object_store(objects).build();
		let mut fields = FieldRules::new();
		fields.insert(
			"owner".into(),
			vec![FieldRule::new(false)
				.with_condition(Condition::leaf("status", Operator::Eq, "locked"))],
		);
		acl.set_object_update("item", user(5), true, fields)
			.await
			.unwrap();

		let base = AclRequest::for_object("item", 1)
			.only_update_mode()
			.target_user(5);
		assert!(!acl.check(&base.clone().with_field("owner", 20)).await);
		assert!(acl.check(&base.clone().with_field("owner", 21)).await);
		assert!(acl.check(&base.with_field("title", "x")).await);
	}

	#[tokio::test]
	async fn delete_unknown_rule_is_not_found() {
		let acl = Acl::builder().build();
		let id = RuleId::generate();
		assert!(matches!(
			acl.delete_rule(id).await,
			Err(AclError::RuleNotFound(missing)) if missing == id
		));
	}

	#[tokio::test]
	async fn writes_invalidate_cached_decisions() {
		let acl = Acl::builder().build();
		let request = AclRequest::create("item").target_user(5);

		let rule = acl.set_object_list("item", user(5), true).await.unwrap();
		assert!(acl.check(&request).await);
		assert_eq!(acl.cached_decisions(), 1);

		acl.save_rule(Rule { access: false, ..rule.clone() })
			.await
			.unwrap();
		assert_eq!(acl.cached_decisions(), 0);
		assert!(!acl.check(&request).await);

		acl.delete_rule(rule.id).await.unwrap();
		assert!(!acl.check(&request).await);
	}
}
