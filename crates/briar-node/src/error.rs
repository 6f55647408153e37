//! Node error types.

use std::fmt;

use briar_transport::{DispatchError, KeyManagerError, StorageError, StreamError};

/// Errors that can occur in the node.
#[derive(Debug)]
pub enum NodeError {
    /// Configuration error (bad address, malformed master secret, etc.).
    ///
    /// Fatal at startup. Fix the arguments and restart.
    Config(String),

    /// Socket or filesystem error.
    Io(String),

    /// The key database could not be opened or read.
    Storage(StorageError),

    /// Key management failed (unknown transport, duplicate contact, failed
    /// write).
    Keys(KeyManagerError),

    /// A connection could not be dispatched.
    ///
    /// Fatal for that connection only; the listener keeps serving others.
    Dispatch(DispatchError),

    /// An established stream failed, e.g. a frame did not authenticate.
    Stream(StreamError),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Keys(err) => write!(f, "key manager error: {err}"),
            Self::Dispatch(err) => write!(f, "dispatch error: {err}"),
            Self::Stream(err) => write!(f, "stream error: {err}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Keys(err) => Some(err),
            Self::Dispatch(err) => Some(err),
            Self::Stream(err) => Some(err),
            Self::Config(_) | Self::Io(_) => None,
        }
    }
}

impl From<StorageError> for NodeError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<KeyManagerError> for NodeError {
    fn from(err: KeyManagerError) -> Self {
        Self::Keys(err)
    }
}

impl From<DispatchError> for NodeError {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err)
    }
}

impl From<StreamError> for NodeError {
    fn from(err: StreamError) -> Self {
        Self::Stream(err)
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
