//! # Error Handling
//!
//! Error types for certkeeper, built with `thiserror`.
//!
//! Write races against the shared store are *not* errors: they are ordinary
//! result variants (see [`crate::storage::InsertOutcome`]) recovered inside the
//! key manager. Everything in this module is something a caller has to see.

pub mod provisioning;
pub mod types;

pub use provisioning::ProvisioningError;
pub use types::{CertKeeperError, RaceFailure, Result};

/// Crate-wide error alias
pub type Error = CertKeeperError;
