// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, TOML files and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::TacConfigLayer;
use crate::sections::{
	AccessConfigLayer, AuditConfigLayer, CyclePolicy, ExtensionsConfigLayer, IdentityConfigLayer,
	LoggingConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<TacConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<TacConfigLayer, ConfigError> {
		Ok(TacConfigLayer::default())
	}
}

/// TOML file source. A missing file is not an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/tac/tac.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<TacConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(TacConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: TacConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `TAC_<SECTION>_<FIELD>`, except logging which uses `TAC_LOG_*`.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<TacConfigLayer, ConfigError> {
		Ok(TacConfigLayer {
			identity: Some(IdentityConfigLayer {
				default_max_distance: env_f64("TAC_IDENTITY_DEFAULT_MAX_DISTANCE")?,
				token_bytes: env_usize("TAC_IDENTITY_TOKEN_BYTES")?,
				id_separator: env_var("TAC_IDENTITY_ID_SEPARATOR"),
			}),
			extensions: Some(ExtensionsConfigLayer {
				namespace: env_var("TAC_EXTENSIONS_NAMESPACE"),
				skip_prefixes: env_list("TAC_EXTENSIONS_SKIP_PREFIXES"),
				cycle_policy: env_cycle_policy("TAC_EXTENSIONS_CYCLE_POLICY")?,
				settings: None,
			}),
			access: Some(AccessConfigLayer {
				builtin_guards: env_bool("TAC_ACCESS_BUILTIN_GUARDS"),
			}),
			audit: Some(AuditConfigLayer {
				enabled: env_bool("TAC_AUDIT_ENABLED"),
				min_severity: env_var("TAC_AUDIT_MIN_SEVERITY"),
			}),
			logging: Some(LoggingConfigLayer {
				level: env_var("TAC_LOG_LEVEL"),
				json: env_bool("TAC_LOG_JSON"),
			}),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_f64(name: &str) -> Result<Option<f64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid number '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid unsigned integer '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|v| {
		v.split(',')
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_string)
			.collect()
	})
}

fn env_cycle_policy(name: &str) -> Result<Option<CyclePolicy>, ConfigError> {
	match env_var(name) {
		Some(v) => v
			.parse()
			.map(Some)
			.map_err(|message| ConfigError::InvalidValue {
				key: name.to_string(),
				message,
			}),
		None => Ok(None),
	}
}
