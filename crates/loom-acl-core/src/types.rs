// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identifiers and enumerations shared by rules and requests.
//!
//! Numeric codes match the values persisted in the `acl_rules` table, so a
//! record written by an older admin surface decodes to the same rule.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ConfigurationError, Result};

/// Identifier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
	pub const fn new(id: i64) -> Self {
		Self(id)
	}
}

impl From<i64> for UserId {
	fn from(id: i64) -> Self {
		Self(id)
	}
}

impl From<i32> for UserId {
	fn from(id: i32) -> Self {
		Self(i64::from(id))
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Identifier of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl GroupId {
	pub const fn new(id: i64) -> Self {
		Self(id)
	}
}

impl From<i64> for GroupId {
	fn from(id: i64) -> Self {
		Self(id)
	}
}

impl From<i32> for GroupId {
	fn from(id: i32) -> Self {
		Self(i64::from(id))
	}
}

impl fmt::Display for GroupId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Identifier of an object instance, in the string form used by exact-id rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Reads an id out of a submitted field value (relation fields carry ids).
	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
			Value::Number(n) => Some(Self(n.to_string())),
			_ => None,
		}
	}

	/// JSON form used when the id is exposed as the `id` field of an object.
	pub fn to_value(&self) -> Value {
		match self.0.parse::<i64>() {
			Ok(n) => Value::from(n),
			Err(_) => Value::String(self.0.clone()),
		}
	}
}

impl From<&str> for ObjectId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

impl From<String> for ObjectId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl From<i64> for ObjectId {
	fn from(id: i64) -> Self {
		Self(id.to_string())
	}
}

impl From<i32> for ObjectId {
	fn from(id: i32) -> Self {
		Self(id.to_string())
	}
}

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Identifier of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub Uuid);

impl RuleId {
	pub fn new(id: Uuid) -> Self {
		Self(id)
	}

	pub fn generate() -> Self {
		Self(Uuid::new_v4())
	}
}

impl fmt::Display for RuleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for RuleId {
	type Err = ConfigurationError;

	fn from_str(s: &str) -> Result<Self> {
		Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| ConfigurationError::InvalidRuleId(s.to_string()))
	}
}

/// Kind of subject a rule is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
	Group,
	User,
}

impl TargetType {
	pub fn code(self) -> i64 {
		match self {
			TargetType::Group => 1,
			TargetType::User => 2,
		}
	}

	pub fn from_code(code: i64) -> Result<Self> {
		match code {
			1 => Ok(TargetType::Group),
			2 => Ok(TargetType::User),
			other => Err(ConfigurationError::UnknownTargetType(other)),
		}
	}
}

/// The subject a rule applies to, or a request is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Target {
	User(UserId),
	Group(GroupId),
}

impl Target {
	pub fn from_parts(target_type: TargetType, id: i64) -> Self {
		match target_type {
			TargetType::User => Target::User(UserId(id)),
			TargetType::Group => Target::Group(GroupId(id)),
		}
	}

	pub fn target_type(&self) -> TargetType {
		match self {
			Target::User(_) => TargetType::User,
			Target::Group(_) => TargetType::Group,
		}
	}

	pub fn id(&self) -> i64 {
		match self {
			Target::User(id) => id.0,
			Target::Group(id) => id.0,
		}
	}
}

impl fmt::Display for Target {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Target::User(id) => write!(f, "user:{id}"),
			Target::Group(id) => write!(f, "group:{id}"),
		}
	}
}

/// Operation governed by a rule or requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
	All,
	List,
	View,
	Create,
	Update,
	Delete,
}

impl Mode {
	pub fn code(self) -> i64 {
		match self {
			Mode::All => 0,
			Mode::List => 1,
			Mode::View => 2,
			Mode::Create => 3,
			Mode::Update => 4,
			Mode::Delete => 5,
		}
	}

	pub fn from_code(code: i64) -> Result<Self> {
		match code {
			0 => Ok(Mode::All),
			1 => Ok(Mode::List),
			2 => Ok(Mode::View),
			3 => Ok(Mode::Create),
			4 => Ok(Mode::Update),
			5 => Ok(Mode::Delete),
			other => Err(ConfigurationError::UnknownMode(other.to_string())),
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Mode::All => "all",
			Mode::List => "list",
			Mode::View => "view",
			Mode::Create => "create",
			Mode::Update => "update",
			Mode::Delete => "delete",
		}
	}

	/// Returns true if a rule with this mode governs `requested`.
	pub fn covers(self, requested: Mode) -> bool {
		self == Mode::All || self == requested
	}
}

impl FromStr for Mode {
	type Err = ConfigurationError;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"all" => Ok(Mode::All),
			"list" => Ok(Mode::List),
			"view" => Ok(Mode::View),
			"create" | "add" => Ok(Mode::Create),
			"update" | "edit" => Ok(Mode::Update),
			"delete" => Ok(Mode::Delete),
			_ => Err(ConfigurationError::UnknownMode(s.to_string())),
		}
	}
}

impl fmt::Display for Mode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Persisted discriminant of [`crate::Constraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintType {
	All,
	Exact,
	Condition,
}

impl ConstraintType {
	pub fn code(self) -> i64 {
		match self {
			ConstraintType::All => 0,
			ConstraintType::Exact => 1,
			ConstraintType::Condition => 2,
		}
	}

	pub fn from_code(code: i64) -> Result<Self> {
		match code {
			0 => Ok(ConstraintType::All),
			1 => Ok(ConstraintType::Exact),
			2 => Ok(ConstraintType::Condition),
			other => Err(ConfigurationError::UnknownConstraintType(other)),
		}
	}
}

/// How competing rules are ordered.
///
/// `Specificity` ranks exact-id matches above condition matches above
/// inherited `sub` rules above unconstrained rules, and only then looks at
/// priority. `Priority` ignores specificity and orders every matching rule by
/// priority alone, as older deployments did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
	#[default]
	Specificity,
	Priority,
}

impl FromStr for RankingPolicy {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"specificity" => Ok(RankingPolicy::Specificity),
			"priority" => Ok(RankingPolicy::Priority),
			other => Err(format!("unknown ranking policy '{other}'")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mode_codes_round_trip() {
		for mode in [
			Mode::All,
			Mode::List,
			Mode::View,
			Mode::Create,
			Mode::Update,
			Mode::Delete,
		] {
			assert_eq!(Mode::from_code(mode.code()).unwrap(), mode);
		}
		assert!(Mode::from_code(9).is_err());
	}

	#[test]
	fn all_mode_covers_every_mode() {
		assert!(Mode::All.covers(Mode::List));
		assert!(Mode::All.covers(Mode::Delete));
		assert!(Mode::List.covers(Mode::List));
		assert!(!Mode::List.covers(Mode::Update));
	}

	#[test]
	fn mode_parses_legacy_names() {
		assert_eq!("edit".parse::<Mode>().unwrap(), Mode::Update);
		assert_eq!("ADD".parse::<Mode>().unwrap(), Mode::Create);
		assert!("publish".parse::<Mode>().is_err());
	}

	#[test]
	fn unknown_codes_are_configuration_errors() {
		assert_eq!(
			TargetType::from_code(7),
			Err(ConfigurationError::UnknownTargetType(7))
		);
		assert_eq!(
			ConstraintType::from_code(3),
			Err(ConfigurationError::UnknownConstraintType(3))
		);
	}

	#[test]
	fn object_id_from_value() {
		assert_eq!(
			ObjectId::from_value(&serde_json::json!(12)),
			Some(ObjectId::from(12))
		);
		assert_eq!(
			ObjectId::from_value(&serde_json::json!("abc")),
			Some(ObjectId::from("abc"))
		);
		assert_eq!(ObjectId::from_value(&serde_json::json!(null)), None);
		assert_eq!(ObjectId::from(7).to_value(), serde_json::json!(7));
	}

	#[test]
	fn target_display() {
		assert_eq!(Target::User(UserId(3)).to_string(), "user:3");
		assert_eq!(Target::Group(GroupId(9)).to_string(), "group:9");
	}
}
