use std::fmt::Display;

use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    data: ErrorData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// The native side reported a failure. The bridge gives no taxonomy, so transport failures,
    /// stale handles and rejected operations all land here.
    Native,
    InvalidResponse,
    InvalidArgument,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
enum ErrorData {
    Native(Value),
    Message(ErrorKind, String),
    Simple(ErrorKind),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            ErrorData::Native(Value::String(message)) => f.write_str(message),
            ErrorData::Native(value) => value.fmt(f),
            ErrorData::Message(kind, message) => write!(f, "{kind}: {message}"),
            ErrorData::Simple(kind) => kind.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            data: ErrorData::Simple(kind),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::with_message(ErrorKind::InvalidResponse, error.to_string())
    }
}

impl Error {
    /// Wraps an error value delivered to a failure continuation.
    pub fn from_native(value: Value) -> Self {
        Self {
            data: ErrorData::Native(value),
        }
    }

    pub(crate) fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            data: ErrorData::Message(kind, message.into()),
        }
    }

    /// Returns the raw value reported by the bridge, if this is a native error.
    pub fn get_ref(&self) -> Option<&Value> {
        match &self.data {
            ErrorData::Native(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_inner(self) -> Option<Value> {
        match self.data {
            ErrorData::Native(value) => Some(value),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.data {
            ErrorData::Native(_) => ErrorKind::Native,
            ErrorData::Message(kind, _) => *kind,
            ErrorData::Simple(kind) => *kind,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Native => f.write_str("native bridge failure"),
            ErrorKind::InvalidResponse => f.write_str("invalid response"),
            ErrorKind::InvalidArgument => f.write_str("invalid argument"),
            ErrorKind::Other => f.write_str("other error"),
        }
    }
}
