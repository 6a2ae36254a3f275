// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `loom-acl`: evaluate and inspect ACL rules from the command line.

mod fixture;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use loom_acl_config::{load_config, load_config_with_file, AclConfig, LogFormat};
use loom_server_acl::{
	create_pool, Acl, AclRequest, Condition, GroupId, Mode, SqliteRuleStore, UserId,
};

use crate::fixture::Fixture;

#[derive(Parser, Debug)]
#[command(name = "loom-acl", about = "Evaluate and inspect Loom ACL rules", version)]
struct Args {
	/// Config file (defaults to /etc/loom/acl.toml)
	#[arg(long, global = true, env = "LOOM_ACL_CONFIG")]
	config: Option<PathBuf>,

	/// Log filter, overrides the configured level
	#[arg(long, global = true)]
	log_level: Option<String>,

	/// Emit logs as JSON
	#[arg(long, global = true)]
	json_logs: bool,

	/// JSON fixture with rules, objects and memberships
	#[arg(long, global = true, conflicts_with = "database")]
	fixture: Option<PathBuf>,

	/// SQLite URL of a rule database
	#[arg(long, global = true)]
	database: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print `allow` or `deny`; exits 1 on deny
	Check(RequestArgs),
	/// Print the verdict and the rule that decided it
	Explain(RequestArgs),
	/// Print the rules stored for an object type
	Rules {
		#[arg(long)]
		object: String,
	},
	/// Render a condition as a SQL predicate
	Sql {
		/// Condition in its JSON form, e.g. '["title", "LIKE", "%a"]'
		#[arg(long)]
		condition: String,
		#[arg(long)]
		table: String,
	},
}

#[derive(Debug, Clone, clap::Args)]
struct RequestArgs {
	#[arg(long)]
	object: String,

	#[arg(long)]
	id: Option<String>,

	#[arg(long, conflicts_with = "group", required_unless_present = "group")]
	user: Option<i64>,

	#[arg(long)]
	group: Option<i64>,

	/// list, view, create, update or delete
	#[arg(long, default_value = "view")]
	mode: Mode,

	/// Submitted field value as key=value; values are read as JSON when they parse
	#[arg(long = "field", value_parser = parse_field)]
	fields: Vec<(String, Value)>,
}

fn parse_field(raw: &str) -> Result<(String, Value), String> {
	let (key, value) = raw
		.split_once('=')
		.ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
	if key.is_empty() {
		return Err(format!("missing field name in {raw:?}"));
	}
	let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
	Ok((key.to_string(), value))
}

impl RequestArgs {
	fn to_request(&self) -> AclRequest {
		let mut request = AclRequest::create(&self.object).with_mode(self.mode);
		if let Some(id) = &self.id {
			request = request.with_object_id(id.as_str());
		}
		request = match (self.user, self.group) {
			(Some(user), _) => request.target_user(UserId(user)),
			(None, Some(group)) => request.target_group(GroupId(group)),
			(None, None) => request,
		};
		for (key, value) in &self.fields {
			request = request.with_field(key.clone(), value.clone());
		}
		request
	}
}

fn init_tracing(args: &Args, config: &AclConfig) {
	let level = args
		.log_level
		.clone()
		.unwrap_or_else(|| config.logging.level.clone());
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
	let json = args.json_logs || config.logging.format == LogFormat::Json;

	tracing_subscriber::registry()
		.with(filter)
		.with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
		.with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
		.init();
}

async fn build_acl(args: &Args, config: &AclConfig) -> Result<Acl> {
	let builder = Acl::builder().config(config);

	if let Some(path) = &args.fixture {
		let backend = Fixture::load(path)?.into_backend().await?;
		return Ok(builder
			.rule_store(backend.rules)
			.object_store(backend.objects)
			.directory(backend.directory)
			.build());
	}

	let Some(url) = args.database.as_ref().or(config.database.url.as_ref()) else {
		bail!("no rule source: pass --fixture or --database, or set database.url");
	};
	let pool = create_pool(url)
		.await
		.with_context(|| format!("failed to open {url}"))?;
	let store = SqliteRuleStore::new(pool);
	store.migrate().await.context("failed to migrate rule table")?;
	tracing::info!(database = %url, "using sqlite rule store");

	Ok(builder.rule_store(Arc::new(store)).build())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
	let args = Args::parse();

	let config = match &args.config {
		Some(path) => load_config_with_file(path),
		None => load_config(),
	}
	.context("failed to load configuration")?;

	init_tracing(&args, &config);

	if let Command::Sql { condition, table } = &args.command {
		let condition: Condition = condition.parse().context("invalid condition")?;
		let predicate = condition.to_sql(table).context("invalid table name")?;
		println!("{}", predicate.sql);
		let params: serde_json::Map<String, Value> = predicate.params.into_iter().collect();
		print_json(&json!(params))?;
		return Ok(ExitCode::SUCCESS);
	}

	let acl = build_acl(&args, &config).await?;

	match &args.command {
		Command::Check(request_args) => {
			let request = request_args.to_request();
			let allowed = acl
				.try_check(&request)
				.await
				.context("failed to evaluate request")?;
			println!("{}", if allowed { "allow" } else { "deny" });
			Ok(if allowed {
				ExitCode::SUCCESS
			} else {
				ExitCode::from(1)
			})
		}
		Command::Explain(request_args) => {
			let verdict = acl
				.explain(&request_args.to_request())
				.await
				.context("failed to evaluate request")?;
			print_json(&verdict)?;
			Ok(ExitCode::SUCCESS)
		}
		Command::Rules { object } => {
			let rules = acl
				.rules_for(object)
				.await
				.with_context(|| format!("failed to load rules for {object}"))?;
			print_json(&rules)?;
			Ok(ExitCode::SUCCESS)
		}
		Command::Sql { .. } => Ok(ExitCode::SUCCESS),
	}
}
