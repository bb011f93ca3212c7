//! Error taxonomy for transtunnel.
//!
//! Each class maps to its own process exit status so callers can tell a
//! rejected configuration from a failed backend call. Clap owns status 2
//! for usage errors, so the taxonomy starts at 3.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransTunnelError {
    /// Malformed or contradictory configuration. Fatal before any mutation.
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// Missing tool or kernel capability. Fatal before any mutation.
    #[error("Environment check failed: {0}")]
    Environment(String),

    /// Unreadable IP-list file. Recoverable: the list is skipped with a
    /// warning and the run continues.
    #[error("Unreadable list input: {0}")]
    Input(String),

    /// An external collaborator call failed. Fatal during install (the next
    /// run's leading flush cleans up), tolerated during flush.
    #[error("Backend command failed: {0}")]
    Backend(String),
}

impl TransTunnelError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 3,
            Self::Environment(_) => 4,
            Self::Input(_) => 1,
            Self::Backend(_) => 5,
        }
    }
}
