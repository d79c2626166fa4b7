//! Error taxonomy of the control plane.

use crate::types::WorkerId;
use thiserror::Error;

/// Categorical errors surfaced by the Pilot.
///
/// The control API maps client-caused kinds to 400 and everything else to
/// 500; the reconciler never propagates these, it folds them into the
/// per-worker `try` counter instead.
#[derive(Debug, Error)]
pub enum PilotError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("config mismatch: {0}")]
    ConfigMismatch(String),

    #[error("not enough workers: miner {miner} has {have} eligible, need {need}")]
    Insufficient {
        miner: String,
        have: usize,
        need: usize,
    },

    #[error("worker {0} is not eligible for switching")]
    Ineligible(WorkerId),

    #[error("worker {0} is already switching")]
    AlreadySwitching(WorkerId),

    #[error("transient: {0}")]
    Transient(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl PilotError {
    /// True for errors the caller caused (mapped to HTTP 400).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PilotError::NotFound(_)
                | PilotError::AlreadyExists(_)
                | PilotError::ConfigMismatch(_)
                | PilotError::Insufficient { .. }
                | PilotError::Ineligible(_)
                | PilotError::AlreadySwitching(_)
                | PilotError::BadRequest(_)
        )
    }
}

impl From<crate::types::AddressError> for PilotError {
    fn from(err: crate::types::AddressError) -> Self {
        PilotError::BadRequest(err.to_string())
    }
}

impl From<uuid::Error> for PilotError {
    fn from(err: uuid::Error) -> Self {
        PilotError::BadRequest(format!("invalid uuid: {err}"))
    }
}
