//! Connection dispatch between transports and the framing layer.
//!
//! Transports hand over raw byte streams; dispatch reads or writes the tag,
//! asks the [`KeyManager`] for keys and returns ready stream readers and
//! writers. An incoming connection whose tag is not recognised is dropped
//! without writing a single byte back, so a scanner cannot tell a Briar
//! endpoint from any other silent listener.
//!
//! ```text
//! incoming:  read 16 bytes ─► recognise_tag ─► None ─► dispose, drop
//!                                          └─► Some ─► StreamReader (Established)
//! outgoing:  get_stream_context ─► StreamWriter ─► send tag
//! ```

use std::fmt;

use briar_proto::{MIN_STREAM_LENGTH, TAG_LENGTH};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::{
    endpoint::{ContactId, TransportId},
    env::Environment,
    manager::{KeyManager, KeyManagerError},
    storage::Storage,
    stream::{StreamError, StreamReader, StreamWriter},
};

/// Reading side of a transport connection.
pub trait TransportConnectionReader: AsyncRead + Unpin + Send {
    /// Release the connection.
    ///
    /// `exception` is true if reading failed; `recognised` is true if the
    /// stream's tag was recognised.
    fn dispose(&mut self, exception: bool, recognised: bool) {
        let _ = (exception, recognised);
    }
}

/// Writing side of a transport connection.
pub trait TransportConnectionWriter: AsyncWrite + Unpin + Send {
    /// Bytes this connection can carry.
    ///
    /// Transports promise at least [`MIN_STREAM_LENGTH`].
    fn capacity(&self) -> u64;

    /// Release the connection. `exception` is true if writing failed.
    fn dispose(&mut self, exception: bool) {
        let _ = exception;
    }
}

/// What a transport connection can do.
pub enum TransportConnection<R, W> {
    /// Both directions over one connection
    Duplex {
        /// Incoming half
        reader: R,
        /// Outgoing half
        writer: W,
    },
    /// Receive-only, e.g. reading from removable media
    SimplexIncoming(R),
    /// Send-only, e.g. writing to removable media
    SimplexOutgoing(W),
}

impl<R: TransportConnectionReader, W: TransportConnectionWriter> TransportConnection<R, W> {
    /// Whether the connection carries data in both directions.
    pub fn is_duplex(&self) -> bool {
        matches!(self, Self::Duplex { .. })
    }

    /// Split into whichever halves the connection has.
    pub fn into_parts(self) -> (Option<R>, Option<W>) {
        match self {
            Self::Duplex { reader, writer } => (Some(reader), Some(writer)),
            Self::SimplexIncoming(reader) => (Some(reader), None),
            Self::SimplexOutgoing(writer) => (None, Some(writer)),
        }
    }

    /// Release every half of the connection.
    pub fn dispose(self, exception: bool) {
        let (reader, writer) = self.into_parts();
        if let Some(mut reader) = reader {
            reader.dispose(exception, false);
        }
        if let Some(mut writer) = writer {
            writer.dispose(exception);
        }
    }
}

impl<R, W> fmt::Debug for TransportConnection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplex { .. } => f.write_str("TransportConnection::Duplex"),
            Self::SimplexIncoming(_) => f.write_str("TransportConnection::SimplexIncoming"),
            Self::SimplexOutgoing(_) => f.write_str("TransportConnection::SimplexOutgoing"),
        }
    }
}

/// Errors from dispatching a connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Key management failed; the connection was dropped
    #[error("key manager error: {0}")]
    KeyManager(#[from] KeyManagerError),

    /// Opening the stream failed
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// Reading the tag failed
    #[error("I/O error: {0}")]
    Io(String),

    /// A duplex reply came from a different contact than the one dialled
    #[error("expected a stream from {expected}, got one from {actual}")]
    ContactMismatch {
        /// Contact the outgoing stream went to
        expected: ContactId,
        /// Contact the incoming tag belongs to
        actual: ContactId,
    },

    /// No outgoing stream can be opened to the contact
    #[error("no outgoing stream context for {contact_id} on {transport_id}")]
    NoStreamContext {
        /// Contact the stream was for
        contact_id: ContactId,
        /// Transport the stream was for
        transport_id: TransportId,
    },
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// A recognised incoming stream.
pub struct IncomingStream<R> {
    /// Contact the stream came from
    pub contact_id: ContactId,
    /// Reader positioned after the tag
    pub reader: StreamReader<R>,
}

/// Both halves of an established duplex connection.
pub struct DuplexStreams<R, W> {
    /// Contact at the other end
    pub contact_id: ContactId,
    /// Incoming stream
    pub reader: StreamReader<R>,
    /// Outgoing stream, tag already sent
    pub writer: StreamWriter<W>,
}

/// Read an incoming tag and recognise it.
///
/// Returns `Ok(None)` for an unknown or replayed tag, after disposing the
/// reader. Nothing is ever written back.
///
/// # Errors
///
/// - `DispatchError::Io` if the tag cannot be read
/// - `DispatchError::KeyManager` if recognition fails; the stream is not
///   accepted
pub async fn accept_incoming<R, E, S>(
    mut reader: R,
    keys: &KeyManager<E, S>,
    transport_id: &TransportId,
) -> Result<Option<IncomingStream<R>>, DispatchError>
where
    R: TransportConnectionReader,
    E: Environment,
    S: Storage,
{
    let mut tag = [0u8; TAG_LENGTH];
    if let Err(e) = reader.read_exact(&mut tag).await {
        reader.dispose(true, false);
        return Err(e.into());
    }

    let context = match keys.recognise_tag(transport_id, &tag) {
        Ok(Some(context)) => context,
        Ok(None) => {
            tracing::debug!("Unrecognised stream on {}", transport_id);
            reader.dispose(false, false);
            return Ok(None);
        },
        Err(e) => {
            reader.dispose(true, false);
            return Err(e.into());
        },
    };

    tracing::info!("Incoming stream from {} on {}", context.contact_id, transport_id);
    Ok(Some(IncomingStream {
        contact_id: context.contact_id,
        reader: StreamReader::after_tag(reader, &context),
    }))
}

/// Open an outgoing stream to a contact and send its tag.
///
/// Returns `Ok(None)` if there are no keys for the contact on this
/// transport, after disposing the writer.
///
/// # Errors
///
/// - `DispatchError::KeyManager` if the stream number cannot be persisted
/// - `DispatchError::Stream` if the tag cannot be sent
pub async fn open_outgoing<W, E, S>(
    mut writer: W,
    keys: &KeyManager<E, S>,
    contact_id: ContactId,
    transport_id: &TransportId,
) -> Result<Option<StreamWriter<W>>, DispatchError>
where
    W: TransportConnectionWriter,
    E: Environment,
    S: Storage,
{
    if writer.capacity() < MIN_STREAM_LENGTH as u64 {
        tracing::warn!(
            "Transport {} offers {} bytes, below the {} byte minimum",
            transport_id,
            writer.capacity(),
            MIN_STREAM_LENGTH
        );
    }

    let context = match keys.get_stream_context(contact_id, transport_id) {
        Ok(Some(context)) => context,
        Ok(None) => {
            writer.dispose(false);
            return Ok(None);
        },
        Err(e) => {
            writer.dispose(true);
            return Err(e.into());
        },
    };

    let mut stream = StreamWriter::new(writer, &context)?;
    if let Err(e) = stream.send_tag().await {
        stream.into_inner().dispose(true);
        return Err(e.into());
    }

    tracing::info!(
        "Outgoing stream {} to {} on {}",
        context.stream_number,
        contact_id,
        transport_id
    );
    Ok(Some(stream))
}

/// Answer an incoming duplex connection.
///
/// Recognises the incoming tag, then opens a stream back to the same contact
/// over the writer. Returns `Ok(None)` for an unrecognised tag; both halves
/// are disposed.
///
/// # Errors
///
/// - `DispatchError::NoStreamContext` if no reply stream can be opened
/// - any error from [`accept_incoming`] or [`open_outgoing`]
pub async fn accept_duplex<R, W, E, S>(
    reader: R,
    mut writer: W,
    keys: &KeyManager<E, S>,
    transport_id: &TransportId,
) -> Result<Option<DuplexStreams<R, W>>, DispatchError>
where
    R: TransportConnectionReader,
    W: TransportConnectionWriter,
    E: Environment,
    S: Storage,
{
    let incoming = match accept_incoming(reader, keys, transport_id).await {
        Ok(Some(incoming)) => incoming,
        Ok(None) => {
            writer.dispose(false);
            return Ok(None);
        },
        Err(e) => {
            writer.dispose(true);
            return Err(e);
        },
    };

    let contact_id = incoming.contact_id;
    let Some(writer) = open_outgoing(writer, keys, contact_id, transport_id).await? else {
        incoming.reader.into_inner().dispose(true, true);
        return Err(DispatchError::NoStreamContext {
            contact_id,
            transport_id: transport_id.clone(),
        });
    };

    Ok(Some(DuplexStreams { contact_id, reader: incoming.reader, writer }))
}

/// Dial a contact over a duplex connection.
///
/// Sends our tag, then waits for the contact's reply tag and checks that it
/// belongs to the same contact. On any error both halves are disposed.
///
/// # Errors
///
/// - `DispatchError::NoStreamContext` if there are no keys for the contact
/// - `DispatchError::ContactMismatch` if the reply is from another contact
/// - any error from [`accept_incoming`] or [`open_outgoing`]
pub async fn open_duplex<R, W, E, S>(
    mut reader: R,
    writer: W,
    keys: &KeyManager<E, S>,
    contact_id: ContactId,
    transport_id: &TransportId,
) -> Result<DuplexStreams<R, W>, DispatchError>
where
    R: TransportConnectionReader,
    W: TransportConnectionWriter,
    E: Environment,
    S: Storage,
{
    let writer = match open_outgoing(writer, keys, contact_id, transport_id).await {
        Ok(Some(writer)) => writer,
        Ok(None) => {
            reader.dispose(false, false);
            return Err(DispatchError::NoStreamContext {
                contact_id,
                transport_id: transport_id.clone(),
            });
        },
        Err(e) => {
            reader.dispose(true, false);
            return Err(e);
        },
    };

    let incoming = match accept_incoming(reader, keys, transport_id).await {
        Ok(Some(incoming)) => incoming,
        Ok(None) => {
            writer.into_inner().dispose(true);
            return Err(DispatchError::Stream(StreamError::TagMismatch));
        },
        Err(e) => {
            writer.into_inner().dispose(true);
            return Err(e);
        },
    };
    if incoming.contact_id != contact_id {
        incoming.reader.into_inner().dispose(true, true);
        writer.into_inner().dispose(true);
        return Err(DispatchError::ContactMismatch {
            expected: contact_id,
            actual: incoming.contact_id,
        });
    }

    Ok(DuplexStreams { contact_id, reader: incoming.reader, writer })
}
