//! Stream context handed from key management to the framing layer.

use briar_crypto::{CryptoError, SecretKey, encode_tag};
use briar_proto::{PROTOCOL_VERSION, Tag};

use crate::endpoint::{ContactId, TransportId};

/// Keys and stream number for one stream.
///
/// Ephemeral: built per connection attempt and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamContext {
    /// Contact the stream belongs to
    pub contact_id: ContactId,
    /// Transport the stream runs over
    pub transport_id: TransportId,
    /// Key for the stream's tag
    pub tag_key: SecretKey,
    /// Key for the stream's frames
    pub header_key: SecretKey,
    /// Stream number, unique per tag key
    pub stream_number: u64,
}

impl StreamContext {
    /// The tag that opens this stream on the wire.
    ///
    /// # Errors
    ///
    /// - `CryptoError::StreamNumberOutOfRange` if the stream number does not
    ///   fit in a tag
    pub fn tag(&self) -> Result<Tag, CryptoError> {
        encode_tag(&self.tag_key, PROTOCOL_VERSION, self.stream_number)
    }
}
