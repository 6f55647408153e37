//! Stream framing errors.

use std::io;

use briar_crypto::CryptoError;
use briar_proto::ProtocolError;
use thiserror::Error;

use super::StreamState;

/// Errors from reading or writing an encrypted stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A frame failed authentication
    ///
    /// The stream was modified, truncated mid-frame or reordered in transit.
    #[error("frame authentication failed")]
    Authentication,

    /// The stream ended before its final frame
    #[error("stream truncated before frame {frame_number}")]
    Truncated {
        /// Frame that was expected next
        frame_number: u64,
    },

    /// An authenticated frame is malformed
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] ProtocolError),

    /// The stream did not open with the expected tag
    #[error("stream tag does not match")]
    TagMismatch,

    /// Operation is not allowed in the stream's current state
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        /// State the stream was in
        state: StreamState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// The stream has used every frame number
    #[error("frame counter exhausted")]
    FrameCounterExhausted,

    /// Key or cipher setup failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Underlying transport I/O failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl StreamError {
    /// Returns true if the error closed the stream.
    ///
    /// Only a misuse of the API leaves the stream usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidState { .. })
    }

    /// Returns true if the error points at tampering or a non-conforming
    /// sender rather than a local or network fault.
    pub fn is_tampering(&self) -> bool {
        matches!(self, Self::Authentication | Self::InvalidFrame(_) | Self::TagMismatch)
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match &err {
            StreamError::Truncated { .. } => io::ErrorKind::UnexpectedEof,
            StreamError::Authentication
            | StreamError::InvalidFrame(_)
            | StreamError::TagMismatch
            | StreamError::Crypto(_) => io::ErrorKind::InvalidData,
            StreamError::InvalidState { .. } | StreamError::FrameCounterExhausted => {
                io::ErrorKind::Other
            },
            StreamError::Io(_) => io::ErrorKind::BrokenPipe,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tampering_classification() {
        assert!(StreamError::Authentication.is_tampering());
        assert!(StreamError::TagMismatch.is_tampering());
        assert!(!StreamError::Truncated { frame_number: 3 }.is_tampering());
        assert!(!StreamError::Io("reset".to_string()).is_tampering());
    }

    #[test]
    fn only_misuse_is_recoverable() {
        let misuse = StreamError::InvalidState { state: StreamState::Closed, operation: "write" };
        assert!(!misuse.is_fatal());
        assert!(StreamError::Authentication.is_fatal());
    }

    #[test]
    fn converts_to_io_error() {
        let err: io::Error = StreamError::Truncated { frame_number: 0 }.into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err: io::Error = StreamError::Authentication.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(err.to_string(), "frame authentication failed");
    }
}
