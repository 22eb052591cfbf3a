use crate::{database::DatabaseError, messenger::DeliveryError};

pub(crate) const STALE_TAP: &str =
    "This button is no longer active. Please restart with /start.";
const PERSISTENCE_FAILED: &str = "Something went wrong while saving. Please try again.";
const ACCESS_DENIED: &str = "⛔ You don't have access to this function.";

/// Why a flow step stopped.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Input of the wrong shape. Carries the re-prompt.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Something the step relies on is gone.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Persistence(#[from] DatabaseError),

    #[error("access denied")]
    Access,

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

pub type FlowResult<T = ()> = Result<T, FlowError>;

impl FlowError {
    pub(crate) fn stale() -> Self {
        FlowError::NotFound(STALE_TAP.into())
    }

    /// What the user is told. Transport failures are only logged.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            FlowError::Validation(prompt) => Some(prompt),
            FlowError::NotFound(hint) => Some(hint),
            FlowError::Persistence(_) => Some(PERSISTENCE_FAILED),
            FlowError::Access => Some(ACCESS_DENIED),
            FlowError::Delivery(_) => None,
        }
    }
}
