use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// The storage engine did not respond within the operation's budget.
    Timeout,
    /// Engine-level failure (quota exceeded, corruption, I/O error).
    Engine,
}

impl StoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorCode::Timeout => "store/timeout",
            StoreErrorCode::Engine => "store/engine",
        }
    }
}

/// Storage failures are non-fatal by contract: callers fall back to stale
/// data rather than propagating these to the UI.
#[derive(Clone, Debug)]
pub struct StoreError {
    pub code: StoreErrorCode,
    message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn is_timeout(&self) -> bool {
        self.code == StoreErrorCode::Timeout
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

pub fn timeout_error(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Timeout, message)
}

pub fn engine_error(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Engine, message)
}
