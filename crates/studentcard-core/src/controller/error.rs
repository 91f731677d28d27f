use thiserror::Error;

use super::ControllerState;
use crate::cache::StorageError;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Invalid origin URL {0}: {1}")]
    InvalidOrigin(String, String),

    #[error("Failed to precache {asset}: {reason}")]
    Install { asset: String, reason: String },

    #[error("Cache storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid controller state: expected {expected}, got {actual}")]
    InvalidState {
        expected: ControllerState,
        actual: ControllerState,
    },
}
