//! Incoming encrypted stream.

use briar_crypto::{FrameCipher, SecretKey, tag_matches};
use briar_proto::{
    Frame, MAC_LENGTH, MAX_FRAME_LENGTH, PROTOCOL_VERSION, TAG_LENGTH, frame_aad, frame_iv,
};
use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{StreamError, StreamState};
use crate::keys::StreamContext;

/// Reads and authenticates the frames of one incoming stream.
pub struct StreamReader<R> {
    inner: R,
    cipher: FrameCipher,
    tag_key: SecretKey,
    stream_number: u64,
    /// Number of frames read so far
    frame_number: u64,
    /// Unread payload of the current frame
    current: Bytes,
    state: StreamState,
}

impl<R: AsyncRead + Unpin> StreamReader<R> {
    /// Prepare a reader that still has to read and check the tag.
    pub fn new(inner: R, context: &StreamContext) -> Self {
        Self::with_state(inner, context, StreamState::AwaitTag)
    }

    /// Prepare a reader whose tag was already consumed and recognised.
    ///
    /// This is how incoming connections arrive from the dispatcher.
    pub fn after_tag(inner: R, context: &StreamContext) -> Self {
        Self::with_state(inner, context, StreamState::Established)
    }

    /// Create a reader and check the tag.
    ///
    /// # Errors
    ///
    /// - `StreamError::TagMismatch` if the stream opens with another tag
    /// - `StreamError::Truncated` if the stream ends inside the tag
    /// - `StreamError::Io` if reading fails
    pub async fn open(inner: R, context: &StreamContext) -> Result<Self, StreamError> {
        let mut reader = Self::new(inner, context);
        reader.read_tag().await?;
        Ok(reader)
    }

    fn with_state(inner: R, context: &StreamContext, state: StreamState) -> Self {
        Self {
            inner,
            cipher: FrameCipher::new(&context.header_key),
            tag_key: context.tag_key.clone(),
            stream_number: context.stream_number,
            frame_number: 0,
            current: Bytes::new(),
            state,
        }
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frame_number
    }

    /// Give back the underlying transport reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read the tag and check it in constant time.
    ///
    /// # Errors
    ///
    /// - `StreamError::InvalidState` unless the reader is in `AwaitTag`
    /// - `StreamError::TagMismatch` if the tag is wrong; the stream is closed
    /// - `StreamError::Truncated` if the stream ends inside the tag
    pub async fn read_tag(&mut self) -> Result<(), StreamError> {
        if self.state != StreamState::AwaitTag {
            return Err(StreamError::InvalidState { state: self.state, operation: "read tag" });
        }

        // Whatever happens next, the tag cannot be read twice
        self.state = StreamState::Closed;

        let mut tag = [0u8; TAG_LENGTH];
        if read_full(&mut self.inner, &mut tag).await? < TAG_LENGTH {
            return Err(StreamError::Truncated { frame_number: 0 });
        }
        if !tag_matches(&self.tag_key, PROTOCOL_VERSION, self.stream_number, &tag) {
            return Err(StreamError::TagMismatch);
        }

        self.state = StreamState::Established;
        Ok(())
    }

    /// Read, authenticate and decode the next frame.
    ///
    /// Returns the frame's payload, or `None` once the final frame has been
    /// read. Bytes after the final frame are never read.
    ///
    /// # Errors
    ///
    /// - `StreamError::Authentication` if the frame does not authenticate
    /// - `StreamError::Truncated` if the stream ends before the final frame
    /// - `StreamError::InvalidFrame` if an authenticated frame is malformed
    /// - `StreamError::FrameCounterExhausted` past `u32::MAX` frames
    ///
    /// All of these close the stream.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>, StreamError> {
        match self.state {
            StreamState::Closed => return Ok(None),
            StreamState::AwaitTag => self.read_tag().await?,
            StreamState::Established => {},
            state @ (StreamState::Init | StreamState::TagSent) => {
                return Err(StreamError::InvalidState { state, operation: "read frame" });
            },
        }

        let result = self.read_frame_inner().await;
        match &result {
            Ok(Some(_)) => {},
            Ok(None) | Err(_) => self.state = StreamState::Closed,
        }
        result
    }

    async fn read_frame_inner(&mut self) -> Result<Option<Bytes>, StreamError> {
        let frame_number =
            u32::try_from(self.frame_number).map_err(|_| StreamError::FrameCounterExhausted)?;

        let mut ciphertext = vec![0u8; MAX_FRAME_LENGTH];
        let len = read_full(&mut self.inner, &mut ciphertext).await?;
        if len == 0 {
            return Err(StreamError::Truncated { frame_number: self.frame_number });
        }
        if len < MAC_LENGTH {
            return Err(StreamError::Authentication);
        }
        ciphertext.truncate(len);

        let iv = frame_iv(self.stream_number, frame_number);
        let aad = frame_aad(frame_number, len - MAC_LENGTH);
        let plaintext = self
            .cipher
            .open(&iv, &aad, &ciphertext)
            .map_err(|_| StreamError::Authentication)?;
        let frame = Frame::decode(&plaintext)?;

        self.frame_number += 1;
        if frame.is_final() {
            self.state = StreamState::Closed;
        }

        tracing::trace!(
            "Read frame {} of stream {} ({} payload bytes, final: {})",
            frame_number,
            self.stream_number,
            frame.payload.len(),
            frame.is_final()
        );
        Ok(Some(frame.payload))
    }

    /// Read payload bytes into `buf`, crossing frame boundaries as needed.
    ///
    /// Returns 0 at the end of the stream (or if `buf` is empty).
    ///
    /// # Errors
    ///
    /// Same as [`read_frame`](Self::read_frame).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.current.is_empty() {
            match self.read_frame().await? {
                Some(payload) => self.current = payload,
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }

    /// Read every remaining payload byte up to the final frame.
    ///
    /// # Errors
    ///
    /// Same as [`read_frame`](Self::read_frame).
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, StreamError> {
        let mut out = std::mem::take(&mut self.current).to_vec();
        while let Some(payload) = self.read_frame().await? {
            out.extend_from_slice(&payload);
        }
        Ok(out)
    }

    /// Skip the rest of the current packet.
    ///
    /// Discards unread bytes of the current frame without reading another
    /// one, so calling it twice in a row is the same as calling it once.
    pub fn next_packet(&mut self) {
        self.current.clear();
    }
}

/// Read until `buf` is full or the reader hits EOF. Returns bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
