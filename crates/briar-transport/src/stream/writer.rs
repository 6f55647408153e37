//! Outgoing encrypted stream.

use std::mem;

use briar_crypto::FrameCipher;
use briar_proto::{Frame, FrameHeader, MAX_PAYLOAD_LENGTH, Tag, frame_aad, frame_iv};
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{StreamError, StreamState};
use crate::keys::StreamContext;

/// Writes the tag and encrypted frames of one outgoing stream.
///
/// Payload written with [`write`](Self::write) is buffered until a frame
/// fills, [`finish_packet`](Self::finish_packet) is called, or the stream is
/// closed. The tag goes out before the first frame if
/// [`send_tag`](Self::send_tag) was not called explicitly.
pub struct StreamWriter<W> {
    inner: W,
    cipher: FrameCipher,
    tag: Tag,
    stream_number: u64,
    /// Number of frames written so far
    frame_number: u64,
    buffer: Vec<u8>,
    state: StreamState,
}

impl<W: AsyncWrite + Unpin> StreamWriter<W> {
    /// Prepare a writer without touching the transport.
    ///
    /// # Errors
    ///
    /// - `StreamError::Crypto` if the context's stream number does not fit in
    ///   a tag
    pub fn new(inner: W, context: &StreamContext) -> Result<Self, StreamError> {
        Ok(Self {
            inner,
            cipher: FrameCipher::new(&context.header_key),
            tag: context.tag()?,
            stream_number: context.stream_number,
            frame_number: 0,
            buffer: Vec::with_capacity(MAX_PAYLOAD_LENGTH),
            state: StreamState::Init,
        })
    }

    /// Create a writer and send the tag.
    ///
    /// # Errors
    ///
    /// - `StreamError::Crypto` if the tag cannot be computed
    /// - `StreamError::Io` if the tag cannot be written
    pub async fn open(inner: W, context: &StreamContext) -> Result<Self, StreamError> {
        let mut writer = Self::new(inner, context)?;
        writer.send_tag().await?;
        Ok(writer)
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frame_number
    }

    /// The underlying transport writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Give back the underlying transport writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Write the stream's tag.
    ///
    /// # Errors
    ///
    /// - `StreamError::InvalidState` unless the writer is in `Init`
    /// - `StreamError::Io` if the write fails; the stream is closed
    pub async fn send_tag(&mut self) -> Result<(), StreamError> {
        if self.state != StreamState::Init {
            return Err(StreamError::InvalidState { state: self.state, operation: "send tag" });
        }

        if let Err(e) = self.inner.write_all(&self.tag).await {
            self.state = StreamState::Closed;
            return Err(e.into());
        }
        self.state = StreamState::TagSent;
        Ok(())
    }

    /// Buffer payload bytes, emitting a frame each time one fills.
    ///
    /// # Errors
    ///
    /// - `StreamError::InvalidState` if the stream is closed
    /// - `StreamError::Io` or `StreamError::FrameCounterExhausted` if a frame
    ///   cannot be emitted; the stream is closed
    pub async fn write(&mut self, mut data: &[u8]) -> Result<(), StreamError> {
        self.ensure_open("write")?;

        while !data.is_empty() {
            let room = MAX_PAYLOAD_LENGTH - self.buffer.len();
            let (chunk, rest) = data.split_at(room.min(data.len()));
            self.buffer.extend_from_slice(chunk);
            data = rest;

            if self.buffer.len() == MAX_PAYLOAD_LENGTH {
                let payload = self.take_buffer();
                self.emit(payload, false).await?;
            }
        }

        Ok(())
    }

    /// Write one frame directly.
    ///
    /// Any buffered bytes go out first as their own frame. A final frame
    /// closes the stream.
    ///
    /// # Errors
    ///
    /// - `StreamError::InvalidState` if the stream is closed
    /// - `StreamError::InvalidFrame` if `payload` exceeds one frame
    /// - `StreamError::Io` or `StreamError::FrameCounterExhausted` if the
    ///   frame cannot be emitted; the stream is closed
    pub async fn write_frame(&mut self, payload: &[u8], is_final: bool) -> Result<(), StreamError> {
        self.ensure_open("write frame")?;
        // Rejected up front so nothing is emitted
        FrameHeader::new(payload.len(), is_final)?;

        if !self.buffer.is_empty() {
            let buffered = self.take_buffer();
            self.emit(buffered, false).await?;
        }
        self.emit(Bytes::copy_from_slice(payload), is_final).await?;

        if is_final {
            self.shutdown().await?;
        }
        Ok(())
    }

    /// End the current packet: emit buffered bytes as a padded frame and
    /// flush.
    ///
    /// With nothing buffered no frame is emitted, so calling this twice in a
    /// row writes the same bytes as calling it once.
    ///
    /// # Errors
    ///
    /// - `StreamError::InvalidState` if the stream is closed
    /// - `StreamError::Io` if the frame or flush fails; the stream is closed
    pub async fn finish_packet(&mut self) -> Result<(), StreamError> {
        self.ensure_open("finish packet")?;

        if !self.buffer.is_empty() {
            let payload = self.take_buffer();
            self.emit(payload, false).await?;
        }

        if let Err(e) = self.inner.flush().await {
            self.state = StreamState::Closed;
            return Err(e.into());
        }
        Ok(())
    }

    /// Emit the final frame with whatever is buffered and shut the
    /// transport's write side.
    ///
    /// Closing an already closed stream is a no-op.
    ///
    /// # Errors
    ///
    /// - `StreamError::Io` or `StreamError::FrameCounterExhausted` if the
    ///   final frame cannot be emitted; the stream is closed regardless
    pub async fn close(&mut self) -> Result<(), StreamError> {
        if self.state == StreamState::Closed {
            return Ok(());
        }

        let payload = self.take_buffer();
        self.emit(payload, true).await?;
        self.shutdown().await
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), StreamError> {
        if self.state == StreamState::Closed {
            return Err(StreamError::InvalidState { state: self.state, operation });
        }
        Ok(())
    }

    fn take_buffer(&mut self) -> Bytes {
        Bytes::from(mem::replace(&mut self.buffer, Vec::with_capacity(MAX_PAYLOAD_LENGTH)))
    }

    /// Encrypt and write one frame, closing the stream on failure.
    async fn emit(&mut self, payload: Bytes, is_final: bool) -> Result<(), StreamError> {
        let result = self.emit_inner(payload, is_final).await;
        if result.is_err() || is_final {
            self.state = StreamState::Closed;
        }
        result
    }

    async fn emit_inner(&mut self, payload: Bytes, is_final: bool) -> Result<(), StreamError> {
        if self.state == StreamState::Init {
            self.inner.write_all(&self.tag).await?;
            self.state = StreamState::TagSent;
        }

        let frame_number =
            u32::try_from(self.frame_number).map_err(|_| StreamError::FrameCounterExhausted)?;
        let plaintext = Frame::new(payload, is_final)?.to_plaintext();

        let iv = frame_iv(self.stream_number, frame_number);
        let aad = frame_aad(frame_number, plaintext.len());
        let ciphertext = self.cipher.seal(&iv, &aad, &plaintext);

        self.inner.write_all(&ciphertext).await?;
        self.frame_number += 1;
        self.state = StreamState::Established;

        tracing::trace!(
            "Wrote frame {} of stream {} ({} bytes, final: {})",
            frame_number,
            self.stream_number,
            ciphertext.len(),
            is_final
        );
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), StreamError> {
        self.state = StreamState::Closed;
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }
}
