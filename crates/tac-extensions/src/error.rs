// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

use serde::Serialize;
use tac_access::HookError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtensionError>;

#[derive(Debug, Error)]
pub enum ExtensionError {
	#[error("failed to list modules in namespace '{namespace}': {message}")]
	Discovery { namespace: String, message: String },

	#[error("failed to load module '{module}': {message}")]
	Resolve { module: String, message: String },

	#[error("invalid metadata for '{module}': {message}")]
	Metadata { module: String, message: String },

	#[error("'{module}' requires '{dependency}', which is not loaded")]
	MissingDependency { module: String, dependency: String },

	#[error("dependency cycle detected at '{module}'")]
	DependencyCycle { module: String },

	#[error("'{module}' failed to initialise: {message}")]
	Init { module: String, message: String },

	#[error("extension '{0}' is already loaded")]
	AlreadyLoaded(String),

	#[error("command '{0}' is already registered")]
	DuplicateCommand(String),

	#[error("background process '{0}' is already registered")]
	DuplicateBackgroundProcess(String),

	#[error(transparent)]
	Hook(#[from] HookError),
}

impl ExtensionError {
	pub fn init(module: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Init {
			module: module.into(),
			message: message.into(),
		}
	}
}

/// Where in the load pipeline a module failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
	/// The module could not be resolved or its metadata was unusable.
	Load,
	/// A hard dependency was missing or part of a cycle. Init was not attempted.
	Dependencies,
	/// The module's own initialisation failed.
	Init,
}

impl fmt::Display for LoadPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			LoadPhase::Load => "load",
			LoadPhase::Dependencies => "dependencies",
			LoadPhase::Init => "init",
		})
	}
}

#[derive(Debug)]
pub struct FailedExtension {
	pub name: String,
	pub error: ExtensionError,
	pub phase: LoadPhase,
}

impl fmt::Display for FailedExtension {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} failed during {}: {}", self.name, self.phase, self.error)
	}
}

impl std::error::Error for FailedExtension {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(&self.error)
	}
}

/// Error returned by a command handler.
#[derive(Debug, Error)]
pub enum CommandError {
	#[error("unknown command '{0}'")]
	Unknown(String),

	#[error("usage: {0}")]
	Usage(String),

	#[error("{0}")]
	Failed(String),
}

/// Error returned by a background process when it stops abnormally.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProcessError(pub String);
