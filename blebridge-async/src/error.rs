//! Error types for this crate.

use std::fmt::Display;

use futures_channel::oneshot;

/// A convenience type alias for a `Result` with an `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    data: ErrorData,
}

/// The kind of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// The native side reported a failure.
    Native,
    /// A reply could not be decoded.
    InvalidResponse,
    /// An argument was rejected before reaching the bridge.
    InvalidArgument,
    /// The device disconnected before the connection completed.
    NotConnected,
    /// The operation was canceled.
    Canceled,
    /// A broadcast channel lagged.
    Lagged,
    /// An unknown or other error.
    Other,
}

#[derive(Debug, Clone, PartialEq)]
enum ErrorData {
    Bridge(blebridge::Error),
    Simple(ErrorKind),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            ErrorData::Bridge(error) => error.fmt(f),
            ErrorData::Simple(kind) => kind.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<blebridge::Error> for Error {
    fn from(error: blebridge::Error) -> Self {
        Error {
            data: ErrorData::Bridge(error),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            data: ErrorData::Simple(kind),
        }
    }
}

impl From<blebridge::ErrorKind> for Error {
    fn from(kind: blebridge::ErrorKind) -> Self {
        Error {
            data: ErrorData::Simple(kind.into()),
        }
    }
}

impl From<oneshot::Canceled> for Error {
    fn from(_value: oneshot::Canceled) -> Self {
        ErrorKind::Canceled.into()
    }
}

impl From<async_broadcast::RecvError> for Error {
    fn from(_value: async_broadcast::RecvError) -> Self {
        ErrorKind::Lagged.into()
    }
}

impl Error {
    /// If this error came from the callback layer, returns a reference to it.
    pub fn get_ref(&self) -> Option<&blebridge::Error> {
        match &self.data {
            ErrorData::Bridge(error) => Some(error),
            ErrorData::Simple(_) => None,
        }
    }

    /// If this error came from the callback layer, returns it.
    pub fn into_inner(self) -> Option<blebridge::Error> {
        match self.data {
            ErrorData::Bridge(error) => Some(error),
            ErrorData::Simple(_) => None,
        }
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> ErrorKind {
        match &self.data {
            ErrorData::Bridge(error) => error.kind().into(),
            ErrorData::Simple(kind) => *kind,
        }
    }
}

impl From<blebridge::ErrorKind> for ErrorKind {
    fn from(kind: blebridge::ErrorKind) -> Self {
        match kind {
            blebridge::ErrorKind::Native => ErrorKind::Native,
            blebridge::ErrorKind::InvalidResponse => ErrorKind::InvalidResponse,
            blebridge::ErrorKind::InvalidArgument => ErrorKind::InvalidArgument,
            blebridge::ErrorKind::Other => ErrorKind::Other,
        }
    }
}

impl TryFrom<ErrorKind> for blebridge::ErrorKind {
    type Error = ErrorKind;

    fn try_from(kind: ErrorKind) -> std::result::Result<Self, Self::Error> {
        match kind {
            ErrorKind::Native => Ok(blebridge::ErrorKind::Native),
            ErrorKind::InvalidResponse => Ok(blebridge::ErrorKind::InvalidResponse),
            ErrorKind::InvalidArgument => Ok(blebridge::ErrorKind::InvalidArgument),
            ErrorKind::Other => Ok(blebridge::ErrorKind::Other),
            ErrorKind::NotConnected | ErrorKind::Canceled | ErrorKind::Lagged => Err(kind),
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Native => blebridge::ErrorKind::Native.fmt(f),
            ErrorKind::InvalidResponse => blebridge::ErrorKind::InvalidResponse.fmt(f),
            ErrorKind::InvalidArgument => blebridge::ErrorKind::InvalidArgument.fmt(f),
            ErrorKind::Other => blebridge::ErrorKind::Other.fmt(f),
            ErrorKind::NotConnected => f.write_str("not connected"),
            ErrorKind::Canceled => f.write_str("canceled"),
            ErrorKind::Lagged => f.write_str("lagged"),
        }
    }
}
