// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Long-running extension tasks such as input listeners.
//!
//! Processes run on the tokio runtime alongside the host. Each receives a
//! child [`CancellationToken`] and is expected to return promptly once it is
//! cancelled.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ProcessError;

#[async_trait]
pub trait BackgroundProcess: Send + Sync {
	async fn run(&self, shutdown: CancellationToken) -> Result<(), ProcessError>;
}

/// Handles for every spawned process plus the token that stops them.
#[derive(Debug)]
pub struct BackgroundTasks {
	shutdown: CancellationToken,
	handles: Vec<(String, JoinHandle<()>)>,
}

impl BackgroundTasks {
	pub(crate) fn new(shutdown: CancellationToken) -> Self {
		Self {
			shutdown,
			handles: Vec::new(),
		}
	}

	pub(crate) fn push(&mut self, name: String, handle: JoinHandle<()>) {
		self.handles.push((name, handle));
	}

	pub fn len(&self) -> usize {
		self.handles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.handles.is_empty()
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.handles.iter().map(|(name, _)| name.as_str())
	}

	/// Cancel every process and wait for all of them to finish.
	pub async fn shutdown(self) {
		self.shutdown.cancel();
		for (name, handle) in self.handles {
			if let Err(e) = handle.await {
				warn!(process = %name, error = %e, "background process did not exit cleanly");
			}
		}
		info!("background processes stopped");
	}
}

pub(crate) fn spawn_process(
	name: String,
	owner: String,
	process: std::sync::Arc<dyn BackgroundProcess>,
	shutdown: CancellationToken,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		info!(process = %name, owner = %owner, "background process started");
		match process.run(shutdown).await {
			Ok(()) => info!(process = %name, "background process exited"),
			Err(e) => warn!(process = %name, owner = %owner, error = %e, "background process failed"),
		}
	})
}
