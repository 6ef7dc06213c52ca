use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherErrorCode {
    /// The cryptographic primitive is missing or disabled.
    Unavailable,
    /// Key generation, import or persistence failed.
    Key,
    /// Sealing a payload failed.
    Encrypt,
    /// Opening a sealed payload failed. Per-entry and non-fatal: the
    /// caller skips the entry and keeps going.
    Decrypt,
}

impl CipherErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherErrorCode::Unavailable => "cipher/unavailable",
            CipherErrorCode::Key => "cipher/key",
            CipherErrorCode::Encrypt => "cipher/encrypt",
            CipherErrorCode::Decrypt => "cipher/decrypt",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CipherError {
    pub code: CipherErrorCode,
    message: String,
}

impl CipherError {
    pub fn new(code: CipherErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl Display for CipherError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for CipherError {}

pub type CipherResult<T> = Result<T, CipherError>;

pub fn unavailable(message: impl Into<String>) -> CipherError {
    CipherError::new(CipherErrorCode::Unavailable, message)
}

pub fn key_error(message: impl Into<String>) -> CipherError {
    CipherError::new(CipherErrorCode::Key, message)
}

pub fn encrypt_error(message: impl Into<String>) -> CipherError {
    CipherError::new(CipherErrorCode::Encrypt, message)
}

pub fn decrypt_error(message: impl Into<String>) -> CipherError {
    CipherError::new(CipherErrorCode::Decrypt, message)
}
