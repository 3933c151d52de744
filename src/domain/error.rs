use thiserror::Error;

use super::model::LifecycleState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Invalid URL: {0}")]
    Validation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("{0}")]
    Tracker(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Cannot {action} while {state}")]
    InvalidAction {
        action: &'static str,
        state: LifecycleState,
    },
}

impl From<crate::api::ApiError> for AppError {
    fn from(err: crate::api::ApiError) -> Self {
        AppError::Api(err.message)
    }
}

impl AppError {
    /// Message suitable for showing next to a failed session.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Api(message) | AppError::Tracker(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
