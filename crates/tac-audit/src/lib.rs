// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit logging for identity lifecycle, access decisions and extension loading.

pub mod error;
pub mod event;
pub mod logger;
pub mod sink;

pub use error::AuditSinkError;
pub use event::{AuditEventType, AuditLogBuilder, AuditLogEntry, AuditSeverity};
pub use logger::AuditLogger;
pub use sink::{AuditSink, MemoryAuditSink, TracingAuditSink};
