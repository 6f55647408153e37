//! Transport key sets
//!
//! Key material for one (contact, transport) pair across three rotation
//! periods, plus the stream contexts handed to the framing layer.

mod context;
mod error;
mod key_set;

pub use context::StreamContext;
pub use error::KeyError;
pub use key_set::{KeyPair, PeriodKeys, TransportKeySet};
