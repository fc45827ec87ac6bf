use crate::error::SessionError;
use std::fmt::Write as _;

/// The four session keys derived from (password, nonce): outbound key and
/// MAC key, then inbound key and MAC key, in that order.
#[derive(Clone)]
pub struct SessionKeys {
    pub keys: [Vec<u8>; 4],
}

impl SessionKeys {
    pub fn output(&self) -> (&[u8], &[u8]) {
        (&self.keys[0], &self.keys[1])
    }

    pub fn input(&self) -> (&[u8], &[u8]) {
        (&self.keys[2], &self.keys[3])
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        write!(f, "SessionKeys([redacted; 4])")
    }
}

/// One direction of the session keystream. Stateful: every call advances the
/// stream, so encode order is part of the wire contract.
pub trait KeystreamCipher: Send {
    /// In-place stream transform over `buf[offset..offset + header_len + body_len]`,
    /// stamping an encrypted `header_len`-byte header in front of the body.
    fn encode(&mut self, buf: &mut [u8], offset: usize, header_len: usize, body_len: usize);
}

/// Key derivation plus cipher construction for one protocol generation.
/// Production suites live outside this crate; tests plug in deterministic
/// doubles.
pub trait CipherSuite: Send {
    /// Derive the four session keys from the account password and the
    /// server-issued nonce.
    fn derive_keys(&self, password: &[u8], nonce: &[u8]) -> Result<SessionKeys, SessionError>;

    /// Build one directional cipher from a key and its MAC key.
    fn cipher(&self, key: &[u8], mac_key: &[u8]) -> Box<dyn KeystreamCipher>;
}

/// Builds the client signature string appended to the auth blob. Both
/// carrier codes must be present for the MccMnc suffix to be emitted.
pub fn client_signature(version: &str, mcc: &str, mnc: &str) -> String {
    let mut signature = format!("WhatsApp/{version} Android/4.2.1 Device/GalaxyS3");
    if !mcc.is_empty() && !mnc.is_empty() {
        let _ = write!(signature, " MccMnc/{mcc}{mnc}");
    }
    signature
}

/// Assembles the authentication response blob: 4 reserved header bytes, the
/// UTF-8 user id, the challenge nonce, the decimal unix-seconds timestamp
/// and the client signature, then stamps the header in place through the
/// outbound cipher. The cipher state advances here and must be the same
/// instance later installed on the codec.
pub fn auth_blob(
    cipher: &mut dyn KeystreamCipher,
    user: &str,
    nonce: &[u8],
    unix_secs: i64,
    signature: &str,
) -> Vec<u8> {
    let mut blob = vec![0u8; 4];
    blob.extend_from_slice(user.as_bytes());
    blob.extend_from_slice(nonce);
    blob.extend_from_slice(unix_secs.to_string().as_bytes());
    blob.extend_from_slice(signature.as_bytes());

    let body_len = blob.len() - 4;
    cipher.encode(&mut blob, 0, 4, body_len);
    blob
}
