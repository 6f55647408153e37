//! Identifiers for contacts, transports and endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque contact identifier assigned by contact management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(pub u32);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contact#{}", self.0)
    }
}

/// Stable transport name, e.g. `org.briarproject.bramble.tcp`.
///
/// Bound into key derivation, so two transports never share keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransportId(String);

impl TransportId {
    /// Create a transport id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The transport name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One side's view of a (contact, transport) relationship.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Contact at the other end
    pub contact_id: ContactId,
    /// Transport the keys are for
    pub transport_id: TransportId,
    /// When the shared master secret was established (ms since Unix epoch)
    ///
    /// Rotation periods are counted from here.
    pub epoch_ms: u64,
    /// Which role we play; the two contacts must pick opposite values
    pub is_initiator: bool,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(
        contact_id: ContactId,
        transport_id: TransportId,
        epoch_ms: u64,
        is_initiator: bool,
    ) -> Self {
        Self { contact_id, transport_id, epoch_ms, is_initiator }
    }

    /// Rotation period containing `now_ms` for a given period length.
    ///
    /// Clocks behind the epoch map to period 0.
    pub fn period_at(&self, now_ms: u64, rotation_period_ms: u64) -> u64 {
        debug_assert!(rotation_period_ms > 0);
        now_ms.saturating_sub(self.epoch_ms) / rotation_period_ms
    }

    /// Milliseconds from `now_ms` until the next period boundary.
    pub fn ms_until_next_period(&self, now_ms: u64, rotation_period_ms: u64) -> u64 {
        debug_assert!(rotation_period_ms > 0);
        if now_ms < self.epoch_ms {
            return self.epoch_ms - now_ms + rotation_period_ms;
        }
        rotation_period_ms - (now_ms - self.epoch_ms) % rotation_period_ms
    }
}
