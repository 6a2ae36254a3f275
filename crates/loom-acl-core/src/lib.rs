// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom access control engine.
//!
//! This crate holds the rule data model, condition predicates and the request
//! and verdict types. The resolution engine, stores and decision cache live in
//! `loom-server-acl`.
//!
//! # Overview
//!
//! A rule grants or revokes one mode (or all modes) on an object type to a
//! user or group. It applies to every instance, to one instance by id, or to
//! the instances whose fields satisfy a [`Condition`]. Rules marked `sub`
//! also govern the descendants of hierarchical object types.
//!
//! # Example
//!
//! ```
//! use loom_acl_core::{AclRequest, Condition, Mode, Operator, Rule, Target, UserId};
//!
//! let rule = Rule::new("item", Target::User(UserId(1)), true)
//!     .with_mode(Mode::List)
//!     .condition(Condition::leaf("title", Operator::Like, "%test"));
//!
//! let request = AclRequest::for_object("item", 7)
//!     .only_listing_mode()
//!     .target_user(1);
//!
//! assert!(rule.covers(request.mode()));
//! ```

pub mod condition;
pub mod decision;
pub mod error;
pub mod request;
pub mod rule;
pub mod sql;
pub mod types;

pub use condition::{
	like_matches, Comparison, Condition, Conjunction, FieldMap, Item, LikeCase, Node, Operator,
};
pub use decision::{Decision, Verdict, VerdictSource};
pub use error::{ConfigurationError, Result};
pub use request::AclRequest;
pub use rule::{Constraint, FieldRule, FieldRules, Rule, RuleRecord};
pub use sql::SqlPredicate;
pub use types::{
	ConstraintType, GroupId, Mode, ObjectId, RankingPolicy, RuleId, Target, TargetType, UserId,
};

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use serde_json::json;

	fn arb_mode() -> impl Strategy<Value = Mode> {
		prop_oneof![
			Just(Mode::All),
			Just(Mode::List),
			Just(Mode::View),
			Just(Mode::Create),
			Just(Mode::Update),
			Just(Mode::Delete),
		]
	}

	proptest! {
		#[test]
		fn all_mode_rules_cover_every_request(mode in arb_mode()) {
			let rule = Rule::new("item", Target::User(UserId(1)), true);
			prop_assert!(rule.covers(mode));
		}

		#[test]
		fn specific_mode_rules_cover_only_their_mode(rule_mode in arb_mode(), requested in arb_mode()) {
			prop_assume!(rule_mode != Mode::All);
			let rule = Rule::new("item", Target::User(UserId(1)), true).with_mode(rule_mode);
			prop_assert_eq!(rule.covers(requested), rule_mode == requested);
		}

		#[test]
		fn rule_records_survive_storage(
			prio in -100i32..100,
			target_id in 1i64..1000,
			sub: bool,
			access: bool,
			title in "[a-zA-Z ]{0,12}",
		) {
			let rule = Rule::new("node", Target::Group(GroupId(target_id)), access)
				.with_mode(Mode::List)
				.condition(Condition::leaf("title", Operator::Eq, title))
				.with_sub(sub)
				.with_prio(prio);
			let record = RuleRecord::from(rule.clone());
			prop_assert_eq!(Rule::try_from(record), Ok(rule));
		}

		#[test]
		fn condition_json_text_and_value_agree(n in 0i64..1000) {
			let text = format!("[[\"id\", \">=\", {n}], \"OR\", [\"id\", \"=\", 0]]");
			let from_text: Condition = text.parse().unwrap();
			let from_value = Condition::parse(&json!([["id", ">=", n], "OR", ["id", "=", 0]])).unwrap();
			prop_assert_eq!(from_text, from_value);
		}
	}
}
