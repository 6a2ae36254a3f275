// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration management for the Loom ACL engine.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`LOOM_ACL_*`)
//!
//! # Usage
//!
//! ```ignore
//! use loom_acl_config::load_config;
//!
//! let config = load_config()?;
//! println!("cache enabled: {}", config.cache.enabled);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::AclConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved ACL configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclConfig {
	pub cache: CacheConfig,
	pub engine: EngineConfig,
	pub logging: LoggingConfig,
	pub database: DatabaseConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`LOOM_ACL_*`)
/// 2. Config file (`/etc/loom/acl.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<AclConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource::system()),
	])
}

/// Load configuration from environment only.
pub fn load_config_from_env() -> Result<AclConfig, ConfigError> {
	load_from_sources(vec![Box::new(DefaultsSource), Box::new(EnvSource::system())])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<AclConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource::system()),
	])
}

/// Merge the given sources in precedence order and finalize.
pub fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<AclConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = AclConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: AclConfigLayer) -> Result<AclConfig, ConfigError> {
	let config = AclConfig {
		cache: layer.cache.unwrap_or_default().finalize(),
		engine: layer.engine.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		cache_enabled = config.cache.enabled,
		cache_max_entries = config.cache.max_entries,
		ranking = ?config.engine.ranking,
		super_admin_user = %config.engine.super_admin_user,
		super_admin_group = %config.engine.super_admin_group,
		database_configured = config.database.url.is_some(),
		"ACL configuration loaded"
	);

	Ok(config)
}

fn validate_config(config: &AclConfig) -> Result<(), ConfigError> {
	if config.cache.max_entries == 0 {
		return Err(ConfigError::InvalidValue {
			key: "cache.max_entries".to_string(),
			message: "must be at least 1; set cache.enabled = false to disable caching".to_string(),
		});
	}

	if config.engine.max_ancestor_depth == 0 {
		return Err(ConfigError::InvalidValue {
			key: "engine.max_ancestor_depth".to_string(),
			message: "must be at least 1".to_string(),
		});
	}

	Ok(())
}
