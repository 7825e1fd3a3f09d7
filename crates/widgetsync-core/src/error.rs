use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

/// Errors surfaced by the core components.
///
/// Skipped work (a lock marker is present, a notification was already seen,
/// a non-admin viewer meets an admin-only item) is never an error; those
/// branches return normally.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The request was rejected or never completed. Not retried here.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The widget is mandatory for this host but its activation is off.
    /// Initialization must stop when this is returned.
    #[error("widget {widget_id} is not active")]
    Inactive { widget_id: String },

    #[error("invalid payload for {route}: {source}")]
    InvalidPayload {
        route: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to fingerprint account state: {0}")]
    Fingerprint(#[source] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn is_fatal_activation(&self) -> bool {
        matches!(self, CoreError::Inactive { .. })
    }

    /// Human-readable message the backend attached to a rejection, if any.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            CoreError::Api(e) => e.message(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
