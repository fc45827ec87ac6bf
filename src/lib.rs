//! Client-side session layer for the FunXMPP binary messaging protocol.
//!
//! The crate models the protocol's XML-shaped binary trees, runs the
//! WAUTH-2 login handshake, dispatches inbound stanzas into typed events and
//! builds every outgoing stanza of the chat surface: messages, receipts,
//! presence, contact sync, profile pictures, groups and privacy lists.
//!
//! Transport framing and cryptography stay outside: a [`codec::WireCodec`]
//! owns the socket and the tree codec, and a [`crypto::CipherSuite`] supplies
//! key derivation and the per-direction keystream ciphers. The session drives
//! both through their traits and never touches raw bytes or key schedules
//! itself.

pub mod binary;
pub mod codec;
pub mod counters;
pub mod crypto;
pub mod error;
pub mod session;
pub mod store;
pub mod types;

pub use binary::{Node, NodeBuilder};
pub use codec::{CodecError, WireCodec};
pub use counters::{CounterKind, TrafficCounters};
pub use crypto::{CipherSuite, KeystreamCipher, SessionKeys};
pub use error::{Result, SessionError};
pub use session::{Session, SessionConfig, SessionState};
pub use store::PendingStore;
pub use types::events::EventBus;
pub use types::message::{Key, MediaKind, Message, MessageKind, MessageStatus};
