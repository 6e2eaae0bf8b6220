pub mod clock;
pub mod notify;
pub mod retry;
pub mod store;

/// Failure taxonomy shared by every engine operation.
///
/// ContactGuard rejections are deliberately absent: a blocked message is a
/// policy outcome returned to the caller, not an error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Concurrent writes exhausted {attempts} attempts, try again")]
    Conflict { attempts: u32 },

    #[error("Actor {0} is not a party to this booking")]
    Unauthorized(String),

    #[error(transparent)]
    Store(#[from] store::StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Conflicts and store timeouts are worth a refresh-and-retry in the UI;
    /// everything else is a definitive rejection.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Conflict { .. } => true,
            EngineError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}
