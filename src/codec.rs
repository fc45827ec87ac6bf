use crate::binary::Node;
use crate::crypto::KeystreamCipher;
use thiserror::Error;

/// Errors surfaced by a wire codec. Framing and I/O failures are both fatal
/// to the session; the distinction only matters for diagnostics.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed tree framing: {0}")]
    Framing(String),
    #[error("transport broken")]
    TransportBroken,
}

/// The binary tree codec over the transport.
///
/// Implementations own the socket and the per-direction stream ciphers. The
/// session never touches raw bytes: it hands over [`Node`]s and receives
/// decoded ones back, with serialized sizes stamped on each node for traffic
/// accounting. Whether reads block is the codec's business; the session only
/// reacts to readiness (see [`crate::session::Session::on_readable`]).
pub trait WireCodec {
    /// Write the stream-open header. Returns bytes written.
    fn write_stream_start(&mut self, domain: &str, resource: &str) -> Result<usize, CodecError>;

    /// Encode and write one tree. Strings present in the shared static
    /// dictionary are emitted as short token indices instead of literals;
    /// reserved table slots must never be produced. Applies the output
    /// cipher when installed and enabled. Returns bytes written.
    ///
    /// `counts_as_traffic` is a hint mirrored back through the returned byte
    /// count policy; handshake writes pass `false`.
    fn write(&mut self, node: &Node, counts_as_traffic: bool) -> Result<usize, CodecError>;

    /// Read the peer's stream-open echo. Returns bytes read.
    fn read_stream_start(&mut self) -> Result<usize, CodecError>;

    /// Decode exactly one tree. `Ok(None)` means the peer closed the stream
    /// cleanly; malformed framing and I/O failure are errors.
    fn next_tree(&mut self) -> Result<Option<Node>, CodecError>;

    /// Whether buffered input is available (at least the start of a frame).
    /// Drives the dispatch pump; a partially buffered frame may still make
    /// [`WireCodec::next_tree`] block until the remainder arrives.
    fn has_data(&self) -> bool;

    /// Install the inbound stream cipher. Inbound decryption is detected per
    /// frame from the stanza flags, so there is no separate input toggle.
    fn set_input_cipher(&mut self, cipher: Box<dyn KeystreamCipher>);

    /// Install the outbound stream cipher.
    fn set_output_cipher(&mut self, cipher: Box<dyn KeystreamCipher>);

    /// Enable or disable outbound encryption. The handshake starts in the
    /// clear and switches this on once keys are derived.
    fn set_crypto(&mut self, enabled: bool);

    /// Close the underlying transport. Idempotent.
    fn close(&mut self);
}
