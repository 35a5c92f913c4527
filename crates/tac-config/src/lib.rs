// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the TAC access-control core.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Validation of the merged result
//! - Consistent environment variable naming (`TAC_*`)
//! - [`init_logging`] to install the `tracing` subscriber described by [`LoggingConfig`]
//!
//! # Usage
//!
//! ```ignore
//! use tac_config::{init_logging, load_config};
//!
//! let config = load_config()?;
//! init_logging(&config.logging);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::TacConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TacConfig {
	pub identity: IdentityConfig,
	pub extensions: ExtensionsConfig,
	pub access: AccessConfig,
	pub audit: AuditConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TAC_*`)
/// 2. Config file (`/etc/tac/tac.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<TacConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only.
pub fn load_config_from_env() -> Result<TacConfig, ConfigError> {
	load_from_sources(vec![Box::new(DefaultsSource), Box::new(EnvSource)])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<TacConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge the given sources in precedence order and finalize the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<TacConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = TacConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize a merged layer into a validated configuration.
pub fn finalize(layer: TacConfigLayer) -> Result<TacConfig, ConfigError> {
	let config = TacConfig {
		identity: layer.identity.unwrap_or_default().finalize(),
		extensions: layer.extensions.unwrap_or_default().finalize(),
		access: layer.access.unwrap_or_default().finalize(),
		audit: layer.audit.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		namespace = %config.extensions.namespace,
		cycle_policy = %config.extensions.cycle_policy,
		builtin_guards = config.access.builtin_guards,
		audit_enabled = config.audit.enabled,
		"configuration loaded"
	);

	Ok(config)
}

fn validate_config(config: &TacConfig) -> Result<(), ConfigError> {
	let identity = &config.identity;
	if !(MIN_TOKEN_BYTES..=MAX_TOKEN_BYTES).contains(&identity.token_bytes) {
		return Err(ConfigError::Validation(format!(
			"identity.token_bytes must be between {MIN_TOKEN_BYTES} and {MAX_TOKEN_BYTES}, got {}",
			identity.token_bytes
		)));
	}
	if !identity.default_max_distance.is_finite() || identity.default_max_distance <= 0.0 {
		return Err(ConfigError::Validation(format!(
			"identity.default_max_distance must be a positive number, got {}",
			identity.default_max_distance
		)));
	}
	if config.extensions.namespace.trim().is_empty() {
		return Err(ConfigError::Validation(
			"extensions.namespace must not be empty".to_string(),
		));
	}
	if !AUDIT_SEVERITY_NAMES.contains(&config.audit.min_severity.as_str()) {
		return Err(ConfigError::Validation(format!(
			"audit.min_severity must be one of {}, got '{}'",
			AUDIT_SEVERITY_NAMES.join(", "),
			config.audit.min_severity
		)));
	}
	Ok(())
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns `false` if a subscriber
/// was already installed, which lets hosts and tests call this repeatedly.
pub fn init_logging(config: &LoggingConfig) -> bool {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
	let registry = tracing_subscriber::registry().with(filter);

	let result = if config.json {
		registry
			.with(tracing_subscriber::fmt::layer().json())
			.try_init()
	} else {
		registry.with(tracing_subscriber::fmt::layer()).try_init()
	};

	result.is_ok()
}
