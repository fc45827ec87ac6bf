//! The protocol tree model: nodes, attribute access and stanza building.
//!
//! The wire format is a dictionary-compressed binary rendering of small XML
//! trees. This module only covers the in-memory shape; encoding and decoding
//! belong to the wire codec behind [`crate::codec::WireCodec`].

pub mod attrs;
pub mod builder;
pub mod error;
pub mod node;

pub use attrs::AttrParser;
pub use builder::NodeBuilder;
pub use error::BinaryError;
pub use node::{Attrs, Node};
