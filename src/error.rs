//! Error types for the permission engine.
//!
//! Only failures that make every permission decision untrustworthy are
//! surfaced. Stale snapshots, unknown options and dangling role references
//! are handled inside the engine and resolve to "no permission".

use thiserror::Error;

/// Errors returned by the ACL engine.
#[derive(Debug, Error)]
pub enum AclError {
    /// The backing row store failed; no decision can be made without it.
    #[error("backing store unavailable: {0}")]
    Store(#[from] anyhow::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, AclError>;
