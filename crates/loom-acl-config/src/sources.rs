// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files and environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::AclConfigLayer;
use crate::sections::{
	CacheConfigLayer, DatabaseConfigLayer, EngineConfigLayer, LogFormat, LoggingConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<AclConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<AclConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(AclConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/loom/acl.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<AclConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(AclConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: AclConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable source.
///
/// Convention: LOOM_ACL_<SECTION>_<FIELD>
pub struct EnvSource {
	lookup: Lookup,
}

impl EnvSource {
	/// Reads the process environment.
	pub fn system() -> Self {
		Self::with_lookup(|name| std::env::var(name).ok())
	}

	/// Reads variables through `lookup` instead of the process environment.
	pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
		Self {
			lookup: Box::new(lookup),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parsed<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr,
		T::Err: std::fmt::Display,
	{
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|e| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid value '{v}': {e}"),
			}),
			None => Ok(None),
		}
	}

	fn cache(&self) -> Result<CacheConfigLayer, ConfigError> {
		Ok(CacheConfigLayer {
			enabled: self.bool("LOOM_ACL_CACHE_ENABLED"),
			ttl_secs: self.parsed("LOOM_ACL_CACHE_TTL_SECS")?,
			max_entries: self.parsed("LOOM_ACL_CACHE_MAX_ENTRIES")?,
		})
	}

	fn engine(&self) -> Result<EngineConfigLayer, ConfigError> {
		Ok(EngineConfigLayer {
			super_admin_user_id: self.parsed("LOOM_ACL_SUPER_ADMIN_USER_ID")?,
			super_admin_group_id: self.parsed("LOOM_ACL_SUPER_ADMIN_GROUP_ID")?,
			like_case_insensitive: self.bool("LOOM_ACL_LIKE_CASE_INSENSITIVE"),
			ranking: self.parsed("LOOM_ACL_RANKING")?,
			max_ancestor_depth: self.parsed("LOOM_ACL_MAX_ANCESTOR_DEPTH")?,
		})
	}

	fn logging(&self) -> Result<LoggingConfigLayer, ConfigError> {
		Ok(LoggingConfigLayer {
			level: self.var("LOOM_ACL_LOG_LEVEL"),
			format: self.parsed::<LogFormat>("LOOM_ACL_LOG_FORMAT")?,
		})
	}

	fn database(&self) -> DatabaseConfigLayer {
		DatabaseConfigLayer {
			url: self.var("LOOM_ACL_DATABASE_URL"),
		}
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<AclConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(AclConfigLayer {
			cache: Some(self.cache()?),
			engine: Some(self.engine()?),
			logging: Some(self.logging()?),
			database: Some(self.database()),
		})
	}
}
