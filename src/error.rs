use crate::codec::CodecError;
use thiserror::Error;

/// Session-fatal failures. Application-level errors inside well-formed
/// stanzas (`iq type=error`, per-field codes) are not errors at this level;
/// they turn into domain sentinel values and dispatch continues.
///
/// Every variant here funnels through the single teardown path: the caller
/// observes one terminal `disconnected` event, preceded by a cause-specific
/// event when one applies.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport failure: {0}")]
    Transport(#[from] CodecError),
    #[error("authentication failed: unexpected node <{0}> during handshake")]
    AuthFailed(String),
    #[error("account expired")]
    AccountExpired,
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("session is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, SessionError>;
