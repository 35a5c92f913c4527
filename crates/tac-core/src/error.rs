// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tac_config::ConfigError;
use tac_extensions::{CommandError, ExtensionError, FailedExtension};
use tac_identity::IdentityError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TacError>;

#[derive(Debug, Error)]
pub enum TacError {
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Identity(#[from] IdentityError),

	#[error(transparent)]
	Extension(#[from] ExtensionError),

	#[error(transparent)]
	ExtensionLoad(#[from] FailedExtension),

	#[error(transparent)]
	Command(#[from] CommandError),

	#[error("instance has not been started")]
	NotStarted,

	#[error("instance has already been started")]
	AlreadyStarted,

	#[error("invalid audit severity: {0}")]
	AuditSeverity(String),
}
