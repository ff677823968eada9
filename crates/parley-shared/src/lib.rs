//! # parley-shared
//!
//! Types shared by the Parley store and relay server: identifiers, the
//! delivery-status lattice, the canonical conversation key and the JSON
//! envelope exchanged with WebSocket clients.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use types::{ConversationKey, MessageId, MessageStatus, UserId};
