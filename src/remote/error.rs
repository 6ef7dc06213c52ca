use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteErrorCode {
    /// Connection-level failure; retry later.
    Transport,
    /// The request exceeded its deadline; retry later.
    Timeout,
    /// The backend refused the session; a refresh may fix it.
    Unauthorized,
    /// The target row does not exist.
    NotFound,
    /// The backend refused the request itself.
    Rejected,
}

impl RemoteErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorCode::Transport => "remote/transport",
            RemoteErrorCode::Timeout => "remote/timeout",
            RemoteErrorCode::Unauthorized => "remote/unauthorized",
            RemoteErrorCode::NotFound => "remote/not-found",
            RemoteErrorCode::Rejected => "remote/rejected",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RemoteError {
    pub code: RemoteErrorCode,
    pub status: Option<u16>,
    message: String,
}

impl RemoteError {
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(code: RemoteErrorCode, status: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// A terminal rejection can never succeed on retry — a validation
    /// error stays a validation error no matter how often it is
    /// replayed. Everything else is treated as transient and the entry
    /// is retained for the next pass (age-based pruning still bounds
    /// it). 401, 408 and 429 are explicitly transient: a refreshed
    /// session or a calmer backend can change the outcome.
    pub fn is_terminal(&self) -> bool {
        if self.code != RemoteErrorCode::Rejected {
            return false;
        }
        match self.status {
            Some(status) => (400..500).contains(&status) && !matches!(status, 401 | 408 | 429),
            None => false,
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} [{status}] ({})", self.message, self.code_str()),
            None => write!(f, "{} ({})", self.message, self.code_str()),
        }
    }
}

impl std::error::Error for RemoteError {}

pub type RemoteResult<T> = Result<T, RemoteError>;

pub fn transport_error(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Transport, message)
}

pub fn timeout_error(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Timeout, message)
}

pub fn unauthorized(message: impl Into<String>) -> RemoteError {
    RemoteError::with_status(RemoteErrorCode::Unauthorized, 401, message)
}

pub fn not_found(message: impl Into<String>) -> RemoteError {
    RemoteError::with_status(RemoteErrorCode::NotFound, 404, message)
}

pub fn rejected(status: u16, message: impl Into<String>) -> RemoteError {
    RemoteError::with_status(RemoteErrorCode::Rejected, status, message)
}
