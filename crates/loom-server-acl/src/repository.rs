// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed rule store.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use tracing::instrument;

use loom_acl_core::{Rule, RuleId, RuleRecord, Target};

use crate::error::{AclError, Result};
use crate::store::RuleStore;

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./acl.db")
#[instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

pub struct SqliteRuleStore {
	pool: SqlitePool,
}

impl SqliteRuleStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Creates the `acl_rules` table and its lookup index if missing.
	#[instrument(skip(self))]
	pub async fn migrate(&self) -> Result<()> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS acl_rules (
				id TEXT PRIMARY KEY,
				object TEXT NOT NULL,
				access INTEGER NOT NULL,
				target_type INTEGER NOT NULL,
				target_id INTEGER NOT NULL,
				mode INTEGER NOT NULL,
				constraint_type INTEGER NOT NULL,
				constraint_code TEXT,
				sub INTEGER NOT NULL DEFAULT 0,
				prio INTEGER NOT NULL DEFAULT 0,
				fields TEXT NOT NULL DEFAULT '{}',
				revision INTEGER NOT NULL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;

		sqlx::query(
			r#"
			CREATE INDEX IF NOT EXISTS idx_acl_rules_target
			ON acl_rules (object, target_type, target_id)
			"#,
		)
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

#[async_trait]
impl RuleStore for SqliteRuleStore {
	#[instrument(skip(self))]
	async fn rules_for(&self, object: &str) -> Result<Vec<Rule>> {
		let rows = sqlx::query_as::<_, RuleRow>(
			r#"
			SELECT id, object, access, target_type, target_id, mode, constraint_type,
			       constraint_code, sub, prio, fields, revision
			FROM acl_rules
			WHERE object = ?
			ORDER BY prio DESC, revision DESC
			"#,
		)
		.bind(object)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[instrument(skip(self), fields(target = %target))]
	async fn rules_for_target(&self, object: &str, target: Target) -> Result<Vec<Rule>> {
		let rows = sqlx::query_as::<_, RuleRow>(
			r#"
			SELECT id, object, access, target_type, target_id, mode, constraint_type,
			       constraint_code, sub, prio, fields, revision
			FROM acl_rules
			WHERE object = ? AND target_type = ? AND target_id = ?
			ORDER BY prio DESC, revision DESC
			"#,
		)
		.bind(object)
		.bind(target.target_type().code())
		.bind(target.id())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[instrument(skip(self), fields(rule_id = %id))]
	async fn get_rule(&self, id: RuleId) -> Result<Option<Rule>> {
		let row = sqlx::query_as::<_, RuleRow>(
			r#"
			SELECT id, object, access, target_type, target_id, mode, constraint_type,
			       constraint_code, sub, prio, fields, revision
			FROM acl_rules
			WHERE id = ?
			"#,
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self, rule), fields(rule_id = %rule.id, object = %rule.object))]
	async fn save_rule(&self, rule: Rule) -> Result<Rule> {
		rule.validate()?;
		let record = RuleRecord::from(rule);
		let mut saved = Rule::try_from(record.clone())?;
		let constraint_code = record.constraint_code.as_ref().map(|code| match code {
			Value::String(s) => s.clone(),
			other => other.to_string(),
		});
		let fields = serde_json::to_string(&record.fields)?;

		let mut tx = self.pool.begin().await?;

		let revision: i64 =
			sqlx::query_scalar("SELECT COALESCE(MAX(revision), 0) + 1 FROM acl_rules")
				.fetch_one(&mut *tx)
				.await?;

		sqlx::query(
			r#"
			INSERT INTO acl_rules (
				id, object, access, target_type, target_id, mode, constraint_type,
				constraint_code, sub, prio, fields, revision
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET
				object = excluded.object,
				access = excluded.access,
				target_type = excluded.target_type,
				target_id = excluded.target_id,
				mode = excluded.mode,
				constraint_type = excluded.constraint_type,
				constraint_code = excluded.constraint_code,
				sub = excluded.sub,
				prio = excluded.prio,
				fields = excluded.fields,
				revision = excluded.revision
			"#,
		)
		.bind(record.id.to_string())
		.bind(&record.object)
		.bind(record.access)
		.bind(record.target_type)
		.bind(record.target_id)
		.bind(record.mode)
		.bind(record.constraint_type)
		.bind(constraint_code)
		.bind(record.sub)
		.bind(record.prio)
		.bind(fields)
		.bind(revision)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		saved.revision = u64::try_from(revision).unwrap_or_default();
		Ok(saved)
	}

	#[instrument(skip(self), fields(rule_id = %id))]
	async fn delete_rule(&self, id: RuleId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM acl_rules WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self))]
	async fn remove_object_rules(&self, object: &str) -> Result<u64> {
		let result = sqlx::query("DELETE FROM acl_rules WHERE object = ?")
			.bind(object)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	#[instrument(skip(self))]
	async fn max_prio(&self, object: &str) -> Result<Option<i32>> {
		let prio: Option<i32> = sqlx::query_scalar("SELECT MAX(prio) FROM acl_rules WHERE object = ?")
			.bind(object)
			.fetch_one(&self.pool)
			.await?;

		Ok(prio)
	}
}

#[derive(sqlx::FromRow)]
struct RuleRow {
	id: String,
	object: String,
	access: bool,
	target_type: i64,
	target_id: i64,
	mode: i64,
	constraint_type: i64,
	constraint_code: Option<String>,
	sub: bool,
	prio: i32,
	fields: String,
	revision: i64,
}

impl TryFrom<RuleRow> for Rule {
	type Error = AclError;

	fn try_from(row: RuleRow) -> Result<Self> {
		let record = RuleRecord {
			id: row.id.parse()?,
			object: row.object,
			access: row.access,
			target_type: row.target_type,
			target_id: row.target_id,
			mode: row.mode,
			constraint_type: row.constraint_type,
			constraint_code: row.constraint_code.map(Value::String),
			sub: row.sub,
			prio: row.prio,
			fields: serde_json::from_str(&row.fields)?,
			revision: u64::try_from(row.revision).unwrap_or_default(),
		};

		Ok(Rule::try_from(record)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_acl_core::{
		Condition, ConfigurationError, Constraint, FieldRule, GroupId, Mode, Operator, UserId,
	};
	use serde_json::json;
	use sqlx::sqlite::SqlitePoolOptions;

	async fn make_store() -> SqliteRuleStore {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect("sqlite::memory:")
			.await
			.unwrap();
		let store = SqliteRuleStore::new(pool);
		store.migrate().await.unwrap();
		store
	}

	#[tokio::test]
	async fn save_and_load_condition_rule() {
		let store = make_store().await;
		let rule = Rule::new("item", Target::User(UserId(1)), true)
			.with_mode(Mode::Update)
			.condition(Condition::leaf("title", Operator::Like, "%test"))
			.with_prio(2)
			.with_field_rule(
				"title",
				FieldRule::new(false).with_condition(Condition::leaf("title", Operator::Eq, "x")),
			);

		let saved = store.save_rule(rule.clone()).await.unwrap();
		assert_eq!(saved.revision, 1);

		let loaded = store.get_rule(rule.id).await.unwrap().unwrap();
		assert_eq!(loaded, saved);
		assert_eq!(loaded.fields["title"].len(), 1);
	}

	#[tokio::test]
	async fn upsert_bumps_revision_and_keeps_one_row() {
		let store = make_store().await;
		let rule = store
			.save_rule(Rule::new("node", Target::Group(GroupId(3)), false).exact(12))
			.await
			.unwrap();
		let updated = store.save_rule(rule.clone().with_sub(true)).await.unwrap();

		assert!(updated.revision > rule.revision);
		let all = store.rules_for("node").await.unwrap();
		assert_eq!(all.len(), 1);
		assert!(all[0].sub);
		assert_eq!(all[0].constraint, Constraint::Exact(12.into()));
	}

	#[tokio::test]
	async fn ordering_and_target_lookup() {
		let store = make_store().await;
		let a = store
			.save_rule(Rule::new("item", Target::User(UserId(1)), true).with_prio(1))
			.await
			.unwrap();
		let b = store
			.save_rule(Rule::new("item", Target::User(UserId(1)), false).with_prio(1))
			.await
			.unwrap();
		store
			.save_rule(Rule::new("item", Target::Group(GroupId(1)), true).with_prio(7))
			.await
			.unwrap();

		let for_user = store
			.rules_for_target("item", Target::User(UserId(1)))
			.await
			.unwrap();
		assert_eq!(
			for_user.iter().map(|r| r.id).collect::<Vec<_>>(),
			vec![b.id, a.id]
		);
		assert_eq!(store.rules_for("item").await.unwrap()[0].prio, 7);
		assert_eq!(store.max_prio("item").await.unwrap(), Some(7));
		assert_eq!(store.max_prio("none").await.unwrap(), None);
	}

	#[tokio::test]
	async fn deletes() {
		let store = make_store().await;
		let rule = store
			.save_rule(Rule::new("item", Target::User(UserId(1)), true))
			.await
			.unwrap();
		store
			.save_rule(Rule::new("item", Target::User(UserId(2)), true))
			.await
			.unwrap();

		assert!(store.delete_rule(rule.id).await.unwrap());
		assert!(!store.delete_rule(rule.id).await.unwrap());
		assert_eq!(store.remove_object_rules("item").await.unwrap(), 1);
		assert!(store.rules_for("item").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn malformed_rows_fail_with_configuration_error() {
		let store = make_store().await;
		sqlx::query(
			r#"
			INSERT INTO acl_rules (id, object, access, target_type, target_id, mode,
				constraint_type, constraint_code, sub, prio, fields, revision)
			VALUES (?, 'item', 1, 2, 1, 0, 2, '[["title", "~", 1]]', 0, 0, '{}', 1)
			"#,
		)
		.bind(RuleId::generate().to_string())
		.execute(&store.pool)
		.await
		.unwrap();

		let err = store.rules_for("item").await.unwrap_err();
		assert!(matches!(
			err,
			AclError::Configuration(ConfigurationError::UnknownOperator(_))
		));
	}

	#[tokio::test]
	async fn invalid_rules_are_rejected_without_a_write() {
		let store = make_store().await;
		let kept = store
			.save_rule(Rule::new("item", Target::User(UserId(2)), true))
			.await
			.unwrap();

		let bad_field = Rule::new("item", Target::User(UserId(2)), false)
			.condition(Condition::leaf("title; x", Operator::Eq, "a"));
		assert!(matches!(
			store.save_rule(bad_field.clone()).await,
			Err(AclError::Configuration(ConfigurationError::InvalidField(_)))
		));
		let empty = Rule::new("other", Target::User(UserId(2)), true).condition(Condition::new());
		assert!(matches!(
			store.save_rule(empty).await,
			Err(AclError::Configuration(ConfigurationError::EmptyCondition))
		));
		let bad_field_rule = kept.clone().with_field_rule(
			"title",
			FieldRule::new(false).with_condition(Condition::leaf("title", Operator::Eq, json!({}))),
		);
		assert!(store.save_rule(bad_field_rule).await.is_err());

		// The table still loads and holds only the valid rule, unchanged.
		let rules = store.rules_for("item").await.unwrap();
		assert_eq!(rules, vec![kept]);
		assert!(store.rules_for("other").await.unwrap().is_empty());
		assert!(store.get_rule(bad_field.id).await.unwrap().is_none());
	}
}
