// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rule data model.
//!
//! [`Rule`] is the validated form the resolver works with. [`RuleRecord`] is
//! the persisted shape with numeric codes; every rule read from storage or
//! JSON goes through `Rule::try_from(RuleRecord)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::error::{ConfigurationError, Result};
use crate::types::{ConstraintType, Mode, ObjectId, RuleId, Target, TargetType};

/// Grant or revoke for a single submitted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
	pub access: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub condition: Option<Condition>,
	#[serde(default)]
	pub prio: i32,
}

impl FieldRule {
	pub fn new(access: bool) -> Self {
		Self {
			access,
			condition: None,
			prio: 0,
		}
	}

	pub fn with_condition(mut self, condition: Condition) -> Self {
		self.condition = Some(condition);
		self
	}

	pub fn with_prio(mut self, prio: i32) -> Self {
		self.prio = prio;
		self
	}
}

/// Field name to the ordered field rules attached to an UPDATE rule.
pub type FieldRules = BTreeMap<String, Vec<FieldRule>>;

/// Which object instances a rule applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
	/// Every instance of the object type.
	All,
	/// The instance with this id.
	Exact(ObjectId),
	/// Instances whose fields satisfy the condition.
	Condition(Condition),
}

impl Constraint {
	pub fn constraint_type(&self) -> ConstraintType {
		match self {
			Constraint::All => ConstraintType::All,
			Constraint::Exact(_) => ConstraintType::Exact,
			Constraint::Condition(_) => ConstraintType::Condition,
		}
	}

	fn code(&self) -> Option<Value> {
		match self {
			Constraint::All => None,
			Constraint::Exact(id) => Some(Value::String(id.to_string())),
			Constraint::Condition(condition) => Some(condition.to_value()),
		}
	}

	fn from_parts(constraint_type: ConstraintType, code: Option<Value>) -> Result<Self> {
		match constraint_type {
			ConstraintType::All => Ok(Constraint::All),
			ConstraintType::Exact => code
				.as_ref()
				.and_then(ObjectId::from_value)
				.map(Constraint::Exact)
				.ok_or(ConfigurationError::MissingConstraintCode("exact")),
			ConstraintType::Condition => match code {
				Some(Value::String(text)) if !text.trim().is_empty() => {
					Ok(Constraint::Condition(text.parse()?))
				}
				Some(value @ Value::Array(_)) => Ok(Constraint::Condition(Condition::parse(&value)?)),
				_ => Err(ConfigurationError::MissingConstraintCode("condition")),
			},
		}
	}
}

/// A single access rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleRecord", into = "RuleRecord")]
pub struct Rule {
	pub id: RuleId,
	pub object: String,
	pub access: bool,
	pub target: Target,
	pub mode: Mode,
	pub constraint: Constraint,
	pub sub: bool,
	pub prio: i32,
	pub fields: FieldRules,
	/// Assigned by the rule store on save. Higher means more recently written.
	pub revision: u64,
}

impl Rule {
	/// An unconstrained rule for every mode, with a fresh id.
	pub fn new(object: impl Into<String>, target: Target, access: bool) -> Self {
		Self {
			id: RuleId::generate(),
			object: object.into(),
			access,
			target,
			mode: Mode::All,
			constraint: Constraint::All,
			sub: false,
			prio: 0,
			fields: FieldRules::new(),
			revision: 0,
		}
	}

	pub fn with_id(mut self, id: RuleId) -> Self {
		self.id = id;
		self
	}

	pub fn with_mode(mut self, mode: Mode) -> Self {
		self.mode = mode;
		self
	}

	pub fn with_constraint(mut self, constraint: Constraint) -> Self {
		self.constraint = constraint;
		self
	}

	pub fn exact(self, id: impl Into<ObjectId>) -> Self {
		self.with_constraint(Constraint::Exact(id.into()))
	}

	pub fn condition(self, condition: Condition) -> Self {
		self.with_constraint(Constraint::Condition(condition))
	}

	pub fn with_sub(mut self, sub: bool) -> Self {
		self.sub = sub;
		self
	}

	pub fn with_prio(mut self, prio: i32) -> Self {
		self.prio = prio;
		self
	}

	pub fn with_field_rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
		self.fields.entry(field.into()).or_default().push(rule);
		self
	}

	pub fn with_fields(mut self, fields: FieldRules) -> Self {
		self.fields = fields;
		self
	}

	/// Checks that the rule would load back from storage unchanged in meaning.
	///
	/// Stores call this before writing, so a rule the loader rejects never
	/// reaches the table.
	pub fn validate(&self) -> Result<()> {
		Rule::try_from(RuleRecord::from(self.clone()))?;
		for field_rule in self.fields.values().flatten() {
			if let Some(condition) = &field_rule.condition {
				condition.validate()?;
			}
		}
		Ok(())
	}

	/// Returns true if the rule governs `mode` requests.
	pub fn covers(&self, mode: Mode) -> bool {
		self.mode.covers(mode)
	}
}

fn default_rule_id() -> RuleId {
	RuleId::generate()
}

/// Persisted shape of a rule.
///
/// `constraint_code` holds the exact object id for EXACT rules and the
/// condition for CONDITION rules, either as a JSON array or as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
	#[serde(default = "default_rule_id")]
	pub id: RuleId,
	pub object: String,
	pub access: bool,
	pub target_type: i64,
	pub target_id: i64,
	#[serde(default)]
	pub mode: i64,
	#[serde(default)]
	pub constraint_type: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub constraint_code: Option<Value>,
	#[serde(default)]
	pub sub: bool,
	#[serde(default)]
	pub prio: i32,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub fields: FieldRules,
	#[serde(default)]
	pub revision: u64,
}

impl TryFrom<RuleRecord> for Rule {
	type Error = ConfigurationError;

	fn try_from(record: RuleRecord) -> Result<Self> {
		let target_type = TargetType::from_code(record.target_type)?;
		let mode = Mode::from_code(record.mode)?;
		let constraint_type = ConstraintType::from_code(record.constraint_type)?;
		let constraint = Constraint::from_parts(constraint_type, record.constraint_code)?;

		Ok(Self {
			id: record.id,
			object: record.object,
			access: record.access,
			target: Target::from_parts(target_type, record.target_id),
			mode,
			constraint,
			sub: record.sub,
			prio: record.prio,
			fields: record.fields,
			revision: record.revision,
		})
	}
}

impl From<Rule> for RuleRecord {
	fn from(rule: Rule) -> Self {
		Self {
			id: rule.id,
			object: rule.object,
			access: rule.access,
			target_type: rule.target.target_type().code(),
			target_id: rule.target.id(),
			mode: rule.mode.code(),
			constraint_type: rule.constraint.constraint_type().code(),
			constraint_code: rule.constraint.code(),
			sub: rule.sub,
			prio: rule.prio,
			fields: rule.fields,
			revision: rule.revision,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::condition::Operator;
	use crate::types::{GroupId, UserId};
	use serde_json::json;

	#[test]
	fn record_with_condition_text_decodes() {
		let rule: Rule = serde_json::from_value(json!({
			"object": "item",
			"access": true,
			"target_type": 2,
			"target_id": 1,
			"mode": 1,
			"constraint_type": 2,
			"constraint_code": "[[\"title\", \"LIKE\", \"%test\"]]",
			"prio": 4
		}))
		.unwrap();

		assert_eq!(rule.target, Target::User(UserId(1)));
		assert_eq!(rule.mode, Mode::List);
		assert_eq!(
			rule.constraint,
			Constraint::Condition(Condition::leaf("title", Operator::Like, "%test"))
		);
		assert_eq!(rule.prio, 4);
		assert!(!rule.sub);
	}

	#[test]
	fn exact_code_accepts_numbers() {
		let record = RuleRecord {
			id: RuleId::generate(),
			object: "node".into(),
			access: false,
			target_type: 1,
			target_id: 5,
			mode: 0,
			constraint_type: 1,
			constraint_code: Some(json!(42)),
			sub: true,
			prio: 0,
			fields: FieldRules::new(),
			revision: 3,
		};
		let rule = Rule::try_from(record).unwrap();
		assert_eq!(rule.constraint, Constraint::Exact(ObjectId::from(42)));
		assert_eq!(rule.target, Target::Group(GroupId(5)));
		assert_eq!(rule.revision, 3);
	}

	#[test]
	fn missing_or_malformed_codes_fail() {
		let mut record = RuleRecord::from(Rule::new("item", Target::User(UserId(1)), true));
		record.constraint_type = 2;
		assert_eq!(
			Rule::try_from(record.clone()),
			Err(ConfigurationError::MissingConstraintCode("condition"))
		);

		record.constraint_code = Some(json!("[[\"title\", \"~~\", 1]]"));
		assert_eq!(
			Rule::try_from(record.clone()),
			Err(ConfigurationError::UnknownOperator("~~".into()))
		);

		record.constraint_type = 1;
		record.constraint_code = None;
		assert_eq!(
			Rule::try_from(record.clone()),
			Err(ConfigurationError::MissingConstraintCode("exact"))
		);

		record.constraint_type = 0;
		record.mode = 11;
		assert!(matches!(
			Rule::try_from(record),
			Err(ConfigurationError::UnknownMode(_))
		));
	}

	#[test]
	fn validate_rejects_conditions_the_loader_rejects() {
		let base = Rule::new("item", Target::User(UserId(1)), true);
		assert_eq!(base.validate(), Ok(()));
		assert_eq!(
			base.clone()
				.condition(Condition::leaf("title", Operator::Like, "%a"))
				.validate(),
			Ok(())
		);

		assert_eq!(
			base.clone().condition(Condition::new()).validate(),
			Err(ConfigurationError::EmptyCondition)
		);
		assert_eq!(
			base.clone()
				.condition(Condition::leaf("title; x", Operator::Eq, "a"))
				.validate(),
			Err(ConfigurationError::InvalidField("title; x".into()))
		);
		assert!(matches!(
			base.clone()
				.condition(Condition::leaf("title", Operator::Eq, json!(["a"])))
				.validate(),
			Err(ConfigurationError::InvalidValue { .. })
		));
		assert_eq!(
			base.clone().exact("").validate(),
			Err(ConfigurationError::MissingConstraintCode("exact"))
		);
		assert_eq!(
			base.with_field_rule("title", FieldRule::new(false).with_condition(Condition::new()))
				.validate(),
			Err(ConfigurationError::EmptyCondition)
		);
	}

	#[test]
	fn rule_serializes_as_record() {
		let rule = Rule::new("item", Target::Group(GroupId(2)), false)
			.with_mode(Mode::Update)
			.condition(Condition::leaf("id", Operator::Gt, 3))
			.with_field_rule("title", FieldRule::new(false).with_prio(2));

		let value = serde_json::to_value(&rule).unwrap();
		assert_eq!(value["target_type"], json!(1));
		assert_eq!(value["mode"], json!(4));
		assert_eq!(value["constraint_type"], json!(2));
		assert_eq!(value["constraint_code"], json!([["id", ">", 3]]));
		assert_eq!(value["fields"]["title"][0]["prio"], json!(2));

		let back: Rule = serde_json::from_value(value).unwrap();
		assert_eq!(back, rule);
	}
}
