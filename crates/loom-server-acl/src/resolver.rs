// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Matching and ranking of rules.
//!
//! These functions are pure; loading rules and objects is the caller's job.

use std::cmp::{Ordering, Reverse};

use loom_acl_core::{
	Constraint, FieldMap, FieldRule, LikeCase, ObjectId, RankingPolicy, Rule,
};
use tracing::trace;

/// How precisely a rule matched a request. Later variants outrank earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
	/// An unconstrained rule.
	All,
	/// A `sub` rule matched on an ancestor.
	Inherited,
	/// A condition rule whose predicate holds for the object.
	Condition,
	/// A rule naming the object's id.
	Exact,
}

/// A matching rule and how it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
	pub rule: Rule,
	pub specificity: Specificity,
	/// Ancestor the rule matched on, for inherited candidates.
	pub inherited_from: Option<ObjectId>,
}

impl Candidate {
	pub fn direct(rule: Rule, specificity: Specificity) -> Self {
		Self {
			rule,
			specificity,
			inherited_from: None,
		}
	}

	pub fn inherited(rule: Rule, ancestor: ObjectId) -> Self {
		Self {
			rule,
			specificity: Specificity::Inherited,
			inherited_from: Some(ancestor),
		}
	}
}

/// Matches a rule against the requested instance.
///
/// `fields` is the condition context; without one, condition rules never match.
pub fn direct_match(
	rule: &Rule,
	object_id: Option<&ObjectId>,
	fields: Option<&FieldMap>,
	case: LikeCase,
) -> Option<Specificity> {
	match &rule.constraint {
		Constraint::All => Some(Specificity::All),
		Constraint::Exact(id) => (object_id == Some(id)).then_some(Specificity::Exact),
		Constraint::Condition(condition) => fields
			.filter(|f| condition.evaluate_with(f, case))
			.map(|_| Specificity::Condition),
	}
}

/// Returns true if a `sub` rule governs descendants of `ancestor`.
pub fn ancestor_match(
	rule: &Rule,
	ancestor: &ObjectId,
	ancestor_fields: Option<&FieldMap>,
	case: LikeCase,
) -> bool {
	if !rule.sub {
		return false;
	}
	match &rule.constraint {
		Constraint::Exact(id) => id == ancestor,
		Constraint::Condition(condition) => {
			ancestor_fields.is_some_and(|f| condition.evaluate_with(f, case))
		}
		// Unconstrained rules already apply to every instance directly.
		Constraint::All => false,
	}
}

fn by_priority(a: &Candidate, b: &Candidate) -> Ordering {
	(Reverse(a.rule.prio), Reverse(a.rule.revision))
		.cmp(&(Reverse(b.rule.prio), Reverse(b.rule.revision)))
}

/// Sorts candidates best first.
pub fn rank(candidates: &mut [Candidate], policy: RankingPolicy) {
	match policy {
		RankingPolicy::Specificity => candidates.sort_by(|a, b| {
			b.specificity
				.cmp(&a.specificity)
				.then_with(|| by_priority(a, b))
		}),
		RankingPolicy::Priority => candidates.sort_by(by_priority),
	}

	for (position, c) in candidates.iter().enumerate() {
		trace!(
			position,
			rule_id = %c.rule.id,
			specificity = ?c.specificity,
			prio = c.rule.prio,
			revision = c.rule.revision,
			access = c.rule.access,
			"ranked rule"
		);
	}
}

/// Ranks and returns the best candidate.
pub fn best(mut candidates: Vec<Candidate>, policy: RankingPolicy) -> Option<Candidate> {
	rank(&mut candidates, policy);
	candidates.into_iter().next()
}

/// Reduces the rules of one field to a grant or revoke.
///
/// A rule whose condition holds outranks an unconditional rule, then higher
/// prio wins, then the later entry. Rules whose condition fails are ignored.
/// `None` if no rule applies.
pub fn field_verdict(rules: &[FieldRule], context: &FieldMap, case: LikeCase) -> Option<bool> {
	rules
		.iter()
		.enumerate()
		.filter_map(|(index, rule)| match &rule.condition {
			None => Some((false, rule.prio, index, rule.access)),
			Some(condition) if condition.evaluate_with(context, case) => {
				Some((true, rule.prio, index, rule.access))
			}
			Some(_) => None,
		})
		.max_by_key(|(conditional, prio, index, _)| (*conditional, *prio, *index))
		.map(|(_, _, _, access)| access)
}
