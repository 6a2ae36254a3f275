// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rendering conditions as parameterized SQL `WHERE` fragments.
//!
//! Used by listing queries to filter rows with the same predicate a
//! condition rule evaluates in memory. Values are always bound as named
//! parameters; field names are validated identifiers and are rendered
//! qualified with the table name.

use serde_json::Value;

use crate::condition::{validate_field, Comparison, Condition, Node, Operator};
use crate::error::Result;

/// A `WHERE` fragment plus the values bound to its `:pN` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
	pub sql: String,
	pub params: Vec<(String, Value)>,
}

impl Condition {
	/// Renders the condition with columns qualified by `table`.
	///
	/// ```
	/// use loom_acl_core::Condition;
	///
	/// let condition: Condition = r#"[[["title", "=", "TestNode tree"]], "OR", ["1", "=", "1"]]"#
	///     .parse()
	///     .unwrap();
	/// let predicate = condition.to_sql("system_node").unwrap();
	/// assert_eq!(predicate.sql, "(system_node.title = :p1) OR 1 = 1");
	/// ```
	pub fn to_sql(&self, table: &str) -> Result<SqlPredicate> {
		validate_field(table)?;
		let mut writer = SqlWriter {
			table,
			params: Vec::new(),
		};
		let sql = writer.condition(self)?;
		Ok(SqlPredicate {
			sql,
			params: writer.params,
		})
	}
}

struct SqlWriter<'a> {
	table: &'a str,
	params: Vec<(String, Value)>,
}

impl SqlWriter<'_> {
	fn condition(&mut self, condition: &Condition) -> Result<String> {
		if condition.is_empty() {
			return Ok("1 = 1".to_string());
		}

		let mut sql = String::new();
		for (index, item) in condition.items().iter().enumerate() {
			if index > 0 {
				sql.push(' ');
				sql.push_str(item.conjunction.as_str());
				sql.push(' ');
			}
			match &item.node {
				Node::Comparison(cmp) => sql.push_str(&self.comparison(cmp)?),
				Node::Group(group) => {
					sql.push('(');
					sql.push_str(&self.condition(group)?);
					sql.push(')');
				}
			}
		}
		Ok(sql)
	}

	fn comparison(&mut self, cmp: &Comparison) -> Result<String> {
		validate_field(&cmp.field)?;
		let column = if cmp.is_literal() {
			cmp.field.clone()
		} else {
			format!("{}.{}", self.table, cmp.field)
		};

		if cmp.value.is_null() {
			return Ok(match cmp.operator {
				Operator::Eq => format!("{column} IS NULL"),
				Operator::NotEq => format!("{column} IS NOT NULL"),
				// Ordering against NULL never holds.
				_ => "1 = 0".to_string(),
			});
		}

		let rhs = match (&cmp.value, cmp.is_literal()) {
			(Value::String(s), true) if s.trim().parse::<f64>().is_ok() => s.trim().to_string(),
			(Value::Number(n), true) => n.to_string(),
			_ => self.bind(cmp.value.clone()),
		};

		Ok(format!("{column} {} {rhs}", cmp.operator.as_str()))
	}

	fn bind(&mut self, value: Value) -> String {
		let name = format!("p{}", self.params.len() + 1);
		let placeholder = format!(":{name}");
		self.params.push((name, value));
		placeholder
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ConfigurationError;
	use serde_json::json;

	#[test]
	fn nested_group_or_tautology() {
		let condition: Condition = r#"[[["title", "=", "TestNode tree"]], "OR", ["1", "=", "1"]]"#
			.parse()
			.unwrap();
		let predicate = condition.to_sql("system_node").unwrap();
		assert_eq!(predicate.sql, "(system_node.title = :p1) OR 1 = 1");
		assert_eq!(
			predicate.params,
			vec![("p1".to_string(), json!("TestNode tree"))]
		);
	}

	#[test]
	fn binds_each_value_in_order() {
		let condition: Condition =
			r#"[["title", "LIKE", "%test"], "AND", ["id", ">=", 3], "OR", ["owner", "!=", null]]"#
				.parse()
				.unwrap();
		let predicate = condition.to_sql("item").unwrap();
		assert_eq!(
			predicate.sql,
			"item.title LIKE :p1 AND item.id >= :p2 OR item.owner IS NOT NULL"
		);
		assert_eq!(predicate.params.len(), 2);
		assert_eq!(predicate.params[1], ("p2".to_string(), json!(3)));
	}

	#[test]
	fn empty_condition_is_true() {
		let predicate = Condition::new().to_sql("item").unwrap();
		assert_eq!(predicate.sql, "1 = 1");
		assert!(predicate.params.is_empty());
	}

	#[test]
	fn rejects_unsafe_table_names() {
		let condition = Condition::leaf("id", Operator::Eq, 1);
		assert!(matches!(
			condition.to_sql("item; drop table x"),
			Err(ConfigurationError::InvalidField(_))
		));
	}
}
