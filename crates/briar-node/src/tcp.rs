//! TCP transport connections.
//!
//! A TCP socket is a duplex connection: the read half carries the peer's
//! stream and the write half carries ours. Disposal only logs; the socket
//! closes when both halves are dropped.

use std::{
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use briar_transport::{TransportConnection, TransportConnectionReader, TransportConnectionWriter};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

/// Incoming half of a TCP connection.
pub struct TcpReader {
    inner: OwnedReadHalf,
    peer: SocketAddr,
}

impl AsyncRead for TcpReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl TransportConnectionReader for TcpReader {
    fn dispose(&mut self, exception: bool, recognised: bool) {
        tracing::debug!(
            "Disposing reader from {} (exception: {}, recognised: {})",
            self.peer,
            exception,
            recognised
        );
    }
}

/// Outgoing half of a TCP connection.
pub struct TcpWriter {
    inner: OwnedWriteHalf,
    peer: SocketAddr,
}

impl AsyncWrite for TcpWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl TransportConnectionWriter for TcpWriter {
    /// TCP streams are unbounded.
    fn capacity(&self) -> u64 {
        u64::MAX
    }

    fn dispose(&mut self, exception: bool) {
        tracing::debug!("Disposing writer to {} (exception: {})", self.peer, exception);
    }
}

/// Wrap a connected socket as a duplex transport connection.
///
/// # Errors
///
/// Fails if the socket has no peer address, i.e. it is not connected.
pub fn connection(
    stream: TcpStream,
) -> std::io::Result<TransportConnection<TcpReader, TcpWriter>> {
    let peer = stream.peer_addr()?;
    let (reader, writer) = stream.into_split();
    Ok(TransportConnection::Duplex {
        reader: TcpReader { inner: reader, peer },
        writer: TcpWriter { inner: writer, peer },
    })
}
