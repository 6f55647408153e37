//! Briar transport node.
//!
//! Wires the transport security layer to real I/O: a redb key database,
//! system time and TCP sockets. One node can listen for incoming streams
//! and dial contacts to send them one.
//!
//! # Architecture
//!
//! ```text
//! TcpListener ─► tcp::connection ─► accept_incoming ─► StreamReader ─► Received
//! TcpStream::connect ─► tcp::connection ─► open_outgoing ─► StreamWriter
//!                                   │
//!                             KeyManager<SystemEnv, RedbStorage>
//!                                   │
//!                             rotation task (Listener::run)
//! ```
//!
//! # Components
//!
//! - [`Node`]: key database plus the TCP transport registration
//! - [`Listener`]: accepts TCP connections and reads recognised streams
//! - [`SystemEnv`]: production environment (wall clock, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod system_env;
pub mod tcp;

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use briar_crypto::SecretKey;
use briar_transport::{
    ContactId, DispatchError, Endpoint, KeyManager, KeyManagerConfig, RedbStorage, TransportId,
    accept_incoming, open_outgoing,
};
pub use error::NodeError;
pub use system_env::SystemEnv;
use tokio::net::{TcpListener, TcpStream};

/// Transport identifier of the TCP plugin.
pub const TCP_TRANSPORT_ID: &str = "org.briarproject.bramble.tcp";

/// Maximum latency assumed for TCP.
pub const DEFAULT_MAX_LATENCY: Duration = Duration::from_secs(30);

/// Key manager backed by the system clock and a redb database.
pub type NodeKeyManager = KeyManager<SystemEnv, RedbStorage>;

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Path to the key database
    pub db_path: PathBuf,
    /// Transport streams are sent over
    pub transport_id: TransportId,
    /// Maximum latency of the transport; sets the rotation period
    pub max_latency: Duration,
}

impl NodeConfig {
    /// TCP configuration with the database at `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            transport_id: TransportId::new(TCP_TRANSPORT_ID),
            max_latency: DEFAULT_MAX_LATENCY,
        }
    }
}

/// A stream received from a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Contact the stream came from
    pub contact_id: ContactId,
    /// Decrypted stream contents
    pub data: Vec<u8>,
}

/// A Briar node with its key database loaded.
pub struct Node {
    keys: Arc<NodeKeyManager>,
    transport_id: TransportId,
}

impl Node {
    /// Open the key database and load every stored key set.
    ///
    /// Key sets are rotated to the current period before this returns.
    ///
    /// # Errors
    ///
    /// - `NodeError::Storage` if the database cannot be opened
    /// - `NodeError::Keys` if stored keys cannot be loaded or rotated
    pub fn open(config: &NodeConfig) -> Result<Self, NodeError> {
        let storage = RedbStorage::open(&config.db_path)?;
        let keys = KeyManager::new(SystemEnv::new(), storage, KeyManagerConfig::default());
        keys.add_transport(config.transport_id.clone(), config.max_latency);

        let loaded = keys.start()?;
        tracing::info!("Loaded {} key sets from {}", loaded, config.db_path.display());

        Ok(Self { keys: Arc::new(keys), transport_id: config.transport_id.clone() })
    }

    /// The node's key manager.
    pub fn keys(&self) -> &NodeKeyManager {
        &self.keys
    }

    /// Derive and store keys for a new contact.
    ///
    /// Both sides must use the same `master` and `epoch_ms`, and exactly one
    /// of them must be the initiator. Inactive keys send nothing until
    /// [`activate_contact`](Self::activate_contact) runs or the contact's
    /// first stream arrives.
    ///
    /// # Errors
    ///
    /// - `NodeError::Keys` if the contact already has keys or the write fails
    pub fn add_contact(
        &self,
        contact_id: ContactId,
        master: &SecretKey,
        epoch_ms: u64,
        is_initiator: bool,
        active: bool,
    ) -> Result<(), NodeError> {
        let endpoint = Endpoint::new(contact_id, self.transport_id.clone(), epoch_ms, is_initiator);
        self.keys.contact_added(endpoint, master, active)?;
        Ok(())
    }

    /// Allow outgoing streams to a contact whose keys were added inactive.
    ///
    /// Returns `false` if the contact has no keys or they are already active.
    ///
    /// # Errors
    ///
    /// - `NodeError::Keys` if the activation cannot be persisted
    pub fn activate_contact(&self, contact_id: ContactId) -> Result<bool, NodeError> {
        Ok(self.keys.activate_keys(contact_id, &self.transport_id)?)
    }

    /// Delete every key set for a contact.
    ///
    /// # Errors
    ///
    /// - `NodeError::Keys` if the delete cannot be persisted
    pub fn remove_contact(&self, contact_id: ContactId) -> Result<(), NodeError> {
        self.keys.contact_removed(contact_id)?;
        Ok(())
    }

    /// Bind a TCP listener.
    ///
    /// # Errors
    ///
    /// - `NodeError::Config` if `address` is not a socket address
    /// - `NodeError::Io` if the address cannot be bound
    pub async fn bind(&self, address: &str) -> Result<Listener, NodeError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| NodeError::Config(format!("invalid bind address '{address}': {e}")))?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Listener {
            listener,
            keys: Arc::clone(&self.keys),
            transport_id: self.transport_id.clone(),
        })
    }

    /// Dial `address` and send `message` to a contact as one stream.
    ///
    /// # Errors
    ///
    /// - `NodeError::Io` if the connection cannot be made
    /// - `NodeError::Dispatch` if there are no keys for the contact or the
    ///   stream number cannot be persisted
    /// - `NodeError::Stream` if writing the stream fails
    pub async fn send(
        &self,
        address: &str,
        contact_id: ContactId,
        message: &[u8],
    ) -> Result<(), NodeError> {
        let stream = TcpStream::connect(address).await?;
        let (_reader, writer) = tcp::connection(stream)?.into_parts();
        let Some(writer) = writer else {
            return Err(NodeError::Config(format!("{address} has no outgoing half")));
        };

        let outgoing = open_outgoing(writer, &self.keys, contact_id, &self.transport_id).await?;
        let Some(mut stream) = outgoing else {
            return Err(DispatchError::NoStreamContext {
                contact_id,
                transport_id: self.transport_id.clone(),
            }
            .into());
        };

        stream.write(message).await?;
        stream.close().await?;

        tracing::info!("Sent {} bytes to {} at {}", message.len(), contact_id, address);
        Ok(())
    }
}

/// Accepts incoming TCP streams.
pub struct Listener {
    listener: TcpListener,
    keys: Arc<NodeKeyManager>,
    transport_id: TransportId,
}

impl Listener {
    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// - `NodeError::Io` if the socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one connection and read its stream to the end.
    ///
    /// Returns `Ok(None)` if the stream's tag was not recognised.
    ///
    /// # Errors
    ///
    /// - `NodeError::Io` if accepting fails
    /// - `NodeError::Dispatch` or `NodeError::Stream` if the stream fails
    pub async fn accept(&self) -> Result<Option<Received>, NodeError> {
        let (stream, _) = self.listener.accept().await?;
        receive(stream, &self.keys, &self.transport_id).await
    }

    /// Serve connections and rotate keys until the task is cancelled.
    ///
    /// Each connection is handled on its own task. Failures are logged and
    /// never answered on the wire.
    ///
    /// # Errors
    ///
    /// Never returns an error today; accept failures are logged and retried.
    pub async fn run(self) -> Result<(), NodeError> {
        let keys = Arc::clone(&self.keys);
        let rotation = tokio::spawn(async move { keys.run_rotation().await });

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let keys = Arc::clone(&self.keys);
                    let transport_id = self.transport_id.clone();

                    tokio::spawn(async move {
                        match receive(stream, &keys, &transport_id).await {
                            Ok(Some(received)) => tracing::info!(
                                "Message from {}: {}",
                                received.contact_id,
                                String::from_utf8_lossy(&received.data)
                            ),
                            Ok(None) => {
                                tracing::debug!("Dropped unrecognised connection from {}", addr);
                            },
                            Err(e) => tracing::warn!("Connection from {} failed: {}", addr, e),
                        }
                    });
                },
                Err(e) => {
                    if rotation.is_finished() {
                        tracing::error!("Key rotation task stopped");
                    }
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

async fn receive(
    stream: TcpStream,
    keys: &NodeKeyManager,
    transport_id: &TransportId,
) -> Result<Option<Received>, NodeError> {
    let (reader, _writer) = tcp::connection(stream)?.into_parts();
    let Some(reader) = reader else {
        return Ok(None);
    };

    let Some(mut incoming) = accept_incoming(reader, keys, transport_id).await? else {
        return Ok(None);
    };

    let data = incoming.reader.read_to_end().await?;
    Ok(Some(Received { contact_id: incoming.contact_id, data }))
}

/// Parse a hex-encoded 32-byte master secret.
///
/// # Errors
///
/// - `NodeError::Config` if the string is not 64 hex digits
pub fn parse_secret(hex_secret: &str) -> Result<SecretKey, NodeError> {
    let bytes = hex::decode(hex_secret.trim())
        .map_err(|e| NodeError::Config(format!("master secret is not hex: {e}")))?;
    SecretKey::from_slice(&bytes)
        .map_err(|e| NodeError::Config(format!("invalid master secret: {e}")))
}

/// Generate a fresh master secret, hex encoded.
pub fn generate_secret(env: &SystemEnv) -> String {
    use briar_transport::Environment;

    let mut bytes = [0u8; SecretKey::LENGTH];
    env.random_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_secret_roundtrip() {
        let env = SystemEnv::new();
        let hex_secret = generate_secret(&env);

        assert_eq!(hex_secret.len(), 64);
        let secret = parse_secret(&hex_secret).unwrap();
        assert_eq!(hex::encode(secret.as_bytes()), hex_secret);
    }

    #[test]
    fn parse_secret_rejects_bad_input() {
        assert!(matches!(parse_secret("zz"), Err(NodeError::Config(_))));
        assert!(matches!(parse_secret("abcd"), Err(NodeError::Config(_))));
    }

    #[test]
    fn config_defaults_to_tcp() {
        let config = NodeConfig::new("keys.redb");

        assert_eq!(config.transport_id, TransportId::new(TCP_TRANSPORT_ID));
        assert_eq!(config.max_latency, DEFAULT_MAX_LATENCY);
    }
}
