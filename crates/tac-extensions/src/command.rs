// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::sync::Arc;

use crate::error::CommandError;

/// Operator command contributed by an extension. Argument parsing belongs to
/// the host shell; handlers receive the already split arguments.
pub trait CommandHandler: Send + Sync {
	fn execute(&self, args: &[String]) -> Result<serde_json::Value, CommandError>;
}

impl<F> CommandHandler for F
where
	F: Fn(&[String]) -> Result<serde_json::Value, CommandError> + Send + Sync,
{
	fn execute(&self, args: &[String]) -> Result<serde_json::Value, CommandError> {
		self(args)
	}
}

#[derive(Clone)]
pub struct CommandDescriptor {
	pub description: String,
	pub usage: Option<String>,
	pub handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
	pub fn new(description: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
		Self {
			description: description.into(),
			usage: None,
			handler: Arc::new(handler),
		}
	}

	pub fn usage(mut self, usage: impl Into<String>) -> Self {
		self.usage = Some(usage.into());
		self
	}
}

impl fmt::Debug for CommandDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CommandDescriptor")
			.field("description", &self.description)
			.field("usage", &self.usage)
			.finish_non_exhaustive()
	}
}
