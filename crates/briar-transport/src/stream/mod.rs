//! Encrypted stream framing over an async byte stream.
//!
//! ```text
//! ┌──────────┬─────────────────┬─────────────────┬─────┬──────────────────┐
//! │ tag (16) │ frame 0 (32768) │ frame 1 (32768) │ ... │ final (<= 32768) │
//! └──────────┴─────────────────┴─────────────────┴─────┴──────────────────┘
//!              ciphertext of header || payload || zero padding, plus MAC
//! ```
//!
//! Every non-final frame has the same length on the wire, so an observer
//! learns nothing about packet boundaries. The frame number is bound into
//! both the nonce and the associated data; dropping, reordering or replaying
//! a frame fails authentication.
//!
//! State only moves forward:
//!
//! ```text
//! writer: Init ──send_tag──► TagSent ──frame──► Established ──final──► Closed
//! reader: AwaitTag ──tag ok──► Established ──final frame──► Closed
//! ```
//!
//! Any error on the wire also moves the stream to `Closed`.

mod error;
mod reader;
mod writer;

pub use error::StreamError;
pub use reader::StreamReader;
pub use writer::StreamWriter;

/// Lifecycle state of a stream reader or writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Writer created, tag not yet sent
    Init,
    /// Writer has sent the tag but no frame
    TagSent,
    /// Reader waiting for the tag
    AwaitTag,
    /// Frames are flowing
    Established,
    /// Final frame sent or received, or the stream failed
    Closed,
}
