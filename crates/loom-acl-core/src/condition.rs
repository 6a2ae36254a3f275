// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Boolean predicate trees evaluated against an object's field values.
//!
//! A condition is an ordered list of nodes joined by `AND`/`OR`. Nodes are
//! either a comparison (`[field, operator, value]`) or a nested condition.
//! Evaluation folds strictly left to right: `a OR b AND c` is
//! `(a OR b) AND c`, there is no operator precedence.
//!
//! The JSON form is the one stored in rule constraint codes:
//!
//! ```
//! use loom_acl_core::{Condition, FieldMap};
//! use serde_json::json;
//!
//! let condition: Condition = r#"[["title", "LIKE", "%test"], "OR", ["id", ">", 10]]"#
//!     .parse()
//!     .unwrap();
//!
//! let mut fields = FieldMap::new();
//! fields.insert("title".into(), json!("Item test"));
//! assert!(condition.evaluate(&fields));
//! ```

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ConfigurationError, Result};

/// Field name to value map of an object (or of submitted values).
pub type FieldMap = BTreeMap<String, Value>;

/// Case handling for `LIKE` comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeCase {
	#[default]
	Sensitive,
	Insensitive,
}

/// Comparison operator of a condition leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
	Eq,
	NotEq,
	Gt,
	Lt,
	Gte,
	Lte,
	Like,
}

impl Operator {
	pub fn as_str(self) -> &'static str {
		match self {
			Operator::Eq => "=",
			Operator::NotEq => "!=",
			Operator::Gt => ">",
			Operator::Lt => "<",
			Operator::Gte => ">=",
			Operator::Lte => "<=",
			Operator::Like => "LIKE",
		}
	}

	pub fn parse(s: &str) -> Result<Self> {
		match s.trim() {
			"=" => Ok(Operator::Eq),
			"!=" | "<>" => Ok(Operator::NotEq),
			">" => Ok(Operator::Gt),
			"<" => Ok(Operator::Lt),
			">=" => Ok(Operator::Gte),
			"<=" => Ok(Operator::Lte),
			op if op.eq_ignore_ascii_case("like") => Ok(Operator::Like),
			other => Err(ConfigurationError::UnknownOperator(other.to_string())),
		}
	}
}

/// Joins a node to the result accumulated so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conjunction {
	And,
	Or,
}

impl Conjunction {
	pub fn as_str(self) -> &'static str {
		match self {
			Conjunction::And => "AND",
			Conjunction::Or => "OR",
		}
	}

	fn from_keyword(s: &str) -> Option<Self> {
		if s.eq_ignore_ascii_case("and") {
			Some(Conjunction::And)
		} else if s.eq_ignore_ascii_case("or") {
			Some(Conjunction::Or)
		} else {
			None
		}
	}
}

/// A `[field, operator, value]` leaf.
///
/// A field written as a numeric literal (`"1"`) is compared as that number,
/// which makes `["1", "=", "1"]` a tautology.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
	pub field: String,
	pub operator: Operator,
	pub value: Value,
}

impl Comparison {
	pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
		Self {
			field: field.into(),
			operator,
			value: value.into(),
		}
	}

	fn parse(items: &[Value]) -> Result<Self> {
		if items.len() != 3 {
			return Err(ConfigurationError::InvalidArity(items.len()));
		}

		let field = match &items[0] {
			Value::String(s) => s.clone(),
			Value::Number(n) => n.to_string(),
			other => return Err(ConfigurationError::InvalidField(other.to_string())),
		};
		validate_field(&field)?;

		let operator = match &items[1] {
			Value::String(op) => Operator::parse(op)?,
			other => return Err(ConfigurationError::UnknownOperator(other.to_string())),
		};

		let value = items[2].clone();
		if value.is_array() || value.is_object() {
			return Err(ConfigurationError::InvalidValue { field });
		}

		Ok(Self {
			field,
			operator,
			value,
		})
	}

	/// Returns true if the field side is a numeric literal rather than a field name.
	pub fn is_literal(&self) -> bool {
		is_numeric_literal(&self.field)
	}

	fn operand<'a>(&self, fields: &'a FieldMap) -> Option<Cow<'a, Value>> {
		if self.is_literal() {
			if let Ok(n) = self.field.parse::<i64>() {
				return Some(Cow::Owned(Value::from(n)));
			}
			return self
				.field
				.parse::<f64>()
				.ok()
				.and_then(serde_json::Number::from_f64)
				.map(|n| Cow::Owned(Value::Number(n)));
		}
		fields.get(&self.field).map(Cow::Borrowed)
	}

	/// Evaluates the leaf. A field missing from `fields` never matches.
	pub fn evaluate(&self, fields: &FieldMap, case: LikeCase) -> bool {
		match self.operand(fields) {
			Some(actual) => compare(&actual, self.operator, &self.value, case),
			None => false,
		}
	}

	fn to_value(&self) -> Value {
		Value::Array(vec![
			Value::String(self.field.clone()),
			Value::String(self.operator.as_str().to_string()),
			self.value.clone(),
		])
	}
}

impl fmt::Display for Comparison {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.value {
			Value::String(s) => write!(f, "{} {} '{}'", self.field, self.operator.as_str(), s),
			other => write!(f, "{} {} {}", self.field, self.operator.as_str(), other),
		}
	}
}

/// A condition child: a leaf or a nested group.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
	Comparison(Comparison),
	Group(Condition),
}

impl Node {
	fn evaluate(&self, fields: &FieldMap, case: LikeCase) -> bool {
		match self {
			Node::Comparison(cmp) => cmp.evaluate(fields, case),
			Node::Group(group) => group.evaluate_with(fields, case),
		}
	}

	fn to_value(&self) -> Value {
		match self {
			Node::Comparison(cmp) => cmp.to_value(),
			Node::Group(group) => group.to_value(),
		}
	}
}

impl From<Comparison> for Node {
	fn from(cmp: Comparison) -> Self {
		Node::Comparison(cmp)
	}
}

impl From<Condition> for Node {
	fn from(condition: Condition) -> Self {
		Node::Group(condition)
	}
}

/// One child of a condition with the conjunction joining it to its predecessor.
///
/// The conjunction of the first item is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
	pub conjunction: Conjunction,
	pub node: Node,
}

/// An ordered, left-associative predicate tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
	items: Vec<Item>,
}

impl Condition {
	pub fn new() -> Self {
		Self::default()
	}

	/// A condition holding a single comparison.
	pub fn leaf(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
		Self::new().and(Comparison::new(field, operator, value))
	}

	pub fn and(mut self, node: impl Into<Node>) -> Self {
		self.push(Conjunction::And, node.into());
		self
	}

	pub fn or(mut self, node: impl Into<Node>) -> Self {
		self.push(Conjunction::Or, node.into());
		self
	}

	pub fn push(&mut self, conjunction: Conjunction, node: Node) {
		self.items.push(Item { conjunction, node });
	}

	pub fn items(&self) -> &[Item] {
		&self.items
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Evaluates with case-sensitive `LIKE`. An empty condition is satisfied.
	pub fn evaluate(&self, fields: &FieldMap) -> bool {
		self.evaluate_with(fields, LikeCase::Sensitive)
	}

	pub fn evaluate_with(&self, fields: &FieldMap, case: LikeCase) -> bool {
		let mut items = self.items.iter();
		let Some(first) = items.next() else {
			return true;
		};

		let mut result = first.node.evaluate(fields, case);
		for item in items {
			result = match item.conjunction {
				Conjunction::And => result && item.node.evaluate(fields, case),
				Conjunction::Or => result || item.node.evaluate(fields, case),
			};
		}
		result
	}

	/// Parses the stored JSON form.
	///
	/// A bare leaf (`["title", "=", "x"]`) and a list of nodes are both
	/// accepted. Nodes not separated by a conjunction are joined with `AND`.
	pub fn parse(value: &Value) -> Result<Self> {
		let items = value.as_array().ok_or_else(|| {
			ConfigurationError::MalformedCondition(format!("expected an array, got {value}"))
		})?;

		if items.is_empty() {
			return Err(ConfigurationError::EmptyCondition);
		}

		if is_leaf(items) {
			return Ok(Self::new().and(Comparison::parse(items)?));
		}

		let mut condition = Self::new();
		let mut pending: Option<Conjunction> = None;

		for item in items {
			match item {
				Value::String(keyword) => {
					let conjunction = Conjunction::from_keyword(keyword)
						.ok_or_else(|| ConfigurationError::UnknownConjunction(keyword.clone()))?;
					if condition.is_empty() || pending.is_some() {
						return Err(ConfigurationError::MalformedCondition(format!(
							"unexpected conjunction '{keyword}'"
						)));
					}
					pending = Some(conjunction);
				}
				Value::Array(inner) => {
					let node = if is_leaf(inner) {
						Node::Comparison(Comparison::parse(inner)?)
					} else {
						Node::Group(Self::parse(item)?)
					};
					condition.push(pending.take().unwrap_or(Conjunction::And), node);
				}
				other => {
					return Err(ConfigurationError::MalformedCondition(format!(
						"unexpected element {other}"
					)))
				}
			}
		}

		if pending.is_some() {
			return Err(ConfigurationError::MalformedCondition(
				"condition ends with a conjunction".to_string(),
			));
		}

		Ok(condition)
	}

	/// Fails if [`Condition::parse`] would reject the stored form, e.g. for an
	/// empty condition, an invalid field name or an array value.
	pub fn validate(&self) -> Result<()> {
		Self::parse(&self.to_value()).map(|_| ())
	}

	/// Stored JSON form: nodes interleaved with conjunction keywords.
	pub fn to_value(&self) -> Value {
		let mut out = Vec::with_capacity(self.items.len() * 2);
		for (index, item) in self.items.iter().enumerate() {
			if index > 0 {
				out.push(Value::String(item.conjunction.as_str().to_string()));
			}
			out.push(item.node.to_value());
		}
		Value::Array(out)
	}
}

impl From<Comparison> for Condition {
	fn from(cmp: Comparison) -> Self {
		Self::new().and(cmp)
	}
}

impl FromStr for Condition {
	type Err = ConfigurationError;

	fn from_str(s: &str) -> Result<Self> {
		let value: Value = serde_json::from_str(s).map_err(|e| ConfigurationError::InvalidJson {
			context: "condition",
			message: e.to_string(),
		})?;
		Self::parse(&value)
	}
}

impl fmt::Display for Condition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (index, item) in self.items.iter().enumerate() {
			if index > 0 {
				write!(f, " {} ", item.conjunction.as_str())?;
			}
			match &item.node {
				Node::Comparison(cmp) => write!(f, "{cmp}")?,
				Node::Group(group) => write!(f, "({group})")?,
			}
		}
		Ok(())
	}
}

impl Serialize for Condition {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		self.to_value().serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for Condition {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let value = Value::deserialize(deserializer)?;
		Self::parse(&value).map_err(serde::de::Error::custom)
	}
}

fn is_leaf(items: &[Value]) -> bool {
	match items.first() {
		Some(Value::String(s)) => Conjunction::from_keyword(s).is_none(),
		Some(Value::Number(_)) => true,
		_ => false,
	}
}

fn is_numeric_literal(field: &str) -> bool {
	!field.is_empty() && field.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

fn is_identifier(field: &str) -> bool {
	let mut chars = field.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Field names are restricted so they can be rendered into SQL verbatim.
pub(crate) fn validate_field(field: &str) -> Result<()> {
	if is_identifier(field) || is_numeric_literal(field) {
		Ok(())
	} else {
		Err(ConfigurationError::InvalidField(field.to_string()))
	}
}

/// Exact integer view, so ids beyond 2^53 keep their order.
fn as_integer(value: &Value) -> Option<i128> {
	match value {
		Value::Number(n) => n
			.as_i64()
			.map(i128::from)
			.or_else(|| n.as_u64().map(i128::from)),
		Value::String(s) => s.trim().parse::<i128>().ok(),
		_ => None,
	}
}

fn as_number(value: &Value) -> Option<f64> {
	match value {
		Value::Number(n) => n.as_f64(),
		Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
		_ => None,
	}
}

fn as_text(value: &Value) -> Option<Cow<'_, str>> {
	match value {
		Value::String(s) => Some(Cow::Borrowed(s.as_str())),
		Value::Number(n) => Some(Cow::Owned(n.to_string())),
		Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
		_ => None,
	}
}

fn compare(actual: &Value, operator: Operator, expected: &Value, case: LikeCase) -> bool {
	if operator == Operator::Like {
		return match (as_text(actual), as_text(expected)) {
			(Some(text), Some(pattern)) => like_matches(&text, &pattern, case),
			_ => false,
		};
	}

	if actual.is_null() || expected.is_null() {
		return match operator {
			Operator::Eq => actual.is_null() && expected.is_null(),
			Operator::NotEq => actual.is_null() != expected.is_null(),
			_ => false,
		};
	}

	let ordering = match (as_integer(actual), as_integer(expected)) {
		(Some(a), Some(b)) => Some(a.cmp(&b)),
		_ => match (as_number(actual), as_number(expected)) {
			(Some(a), Some(b)) => a.partial_cmp(&b),
			_ => match (as_text(actual), as_text(expected)) {
				(Some(a), Some(b)) => Some(a.cmp(&b)),
				_ => None,
			},
		},
	};

	let Some(ordering) = ordering else {
		return false;
	};

	match operator {
		Operator::Eq => ordering == Ordering::Equal,
		Operator::NotEq => ordering != Ordering::Equal,
		Operator::Gt => ordering == Ordering::Greater,
		Operator::Lt => ordering == Ordering::Less,
		Operator::Gte => ordering != Ordering::Less,
		Operator::Lte => ordering != Ordering::Greater,
		Operator::Like => false,
	}
}

/// SQL `LIKE` matching: `%` matches any run of characters, `_` exactly one.
pub fn like_matches(text: &str, pattern: &str, case: LikeCase) -> bool {
	let (text, pattern): (Vec<char>, Vec<char>) = match case {
		LikeCase::Sensitive => (text.chars().collect(), pattern.chars().collect()),
		LikeCase::Insensitive => (
			text.to_lowercase().chars().collect(),
			pattern.to_lowercase().chars().collect(),
		),
	};

	let (mut t, mut p) = (0, 0);
	let mut backtrack: Option<(usize, usize)> = None;

	while t < text.len() {
		if p < pattern.len() && pattern[p] == '%' {
			backtrack = Some((p, t));
			p += 1;
		} else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
			t += 1;
			p += 1;
		} else if let Some((star, mark)) = backtrack {
			p = star + 1;
			t = mark + 1;
			backtrack = Some((star, mark + 1));
		} else {
			return false;
		}
	}

	pattern[p..].iter().all(|c| *c == '%')
}
