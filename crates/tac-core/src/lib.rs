// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! TAC access-control core.
//!
//! Wires identities, access evaluation and extensions into one [`Tac`]
//! instance. Build it, call [`Tac::start`] once to load extensions, then
//! answer scans with [`Tac::scan`].

pub mod error;
pub mod instance;

pub use error::{Result, TacError};
pub use instance::{Tac, TacBuilder};

pub use tac_access as access;
pub use tac_audit as audit;
pub use tac_config as config;
pub use tac_extensions as extensions;
pub use tac_identity as identity;
