//! WAUTH-2 login handshake.
//!
//! The client opens the stream, announces its features, sends `auth` (with a
//! pre-encrypted blob when it holds a challenge seed from the previous
//! session) and then reads until the server answers with either a fresh
//! `challenge` or an immediate `success`. Every fatal path emits its cause
//! event and then converges on the session teardown funnel.

use super::{Session, SessionState};
use crate::binary::{Node, NodeBuilder};
use crate::codec::WireCodec;
use crate::counters::CounterKind;
use crate::crypto::{auth_blob, client_signature};
use crate::error::{Result, SessionError};
use crate::types::events::{AccountExpired, AuthSuccess};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;

enum HandshakeOutcome {
    Challenge(Vec<u8>),
    Authenticated,
}

impl<C: WireCodec> Session<C> {
    /// Run the full handshake. `next_challenge` is the seed saved from the
    /// previous session's `success`, empty on a first login.
    pub(crate) fn login(&mut self, next_challenge: &[u8]) -> Result<()> {
        match self.login_inner(next_challenge) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Cause events were emitted at the failure site; this is the
                // one place that closes out.
                self.teardown();
                Err(e)
            }
        }
    }

    fn login_inner(&mut self, next_challenge: &[u8]) -> Result<()> {
        self.next_challenge = next_challenge.to_vec();
        self.state = SessionState::StreamOpened;

        let domain = self.config.domain.clone();
        let resource = self.config.resource.clone();
        let mut tx = self.codec.write_stream_start(&domain, &resource)?;
        tx += self.send_features()?;
        tx += self.send_auth()?;

        self.state = SessionState::AwaitingFeatures;
        let mut rx = self.codec.read_stream_start()?;

        self.state = SessionState::AwaitingChallengeOrSuccess;
        match self.read_features_until_challenge_or_success(&mut rx)? {
            HandshakeOutcome::Challenge(nonce) => {
                tx += self.send_response(&nonce)?;
                rx += self.read_success()?;
            }
            HandshakeOutcome::Authenticated => {}
        }

        // The whole exchange is billed once as protocol overhead.
        self.counters
            .add(CounterKind::ProtocolBytes, rx as u64, tx as u64);
        Ok(())
    }

    fn send_features(&mut self) -> Result<usize> {
        let node = Node::new("stream:features");
        Ok(self.codec.write(&node, false)?)
    }

    /// Announce the account. With a challenge seed in hand the auth node
    /// already carries the response blob and outbound encryption switches on
    /// right after it leaves in the clear.
    fn send_auth(&mut self) -> Result<usize> {
        let mut builder = NodeBuilder::new("auth")
            .attr("passive", "false")
            .attr("mechanism", "WAUTH-2")
            .attr("user", &self.config.user);
        let seeded = !self.next_challenge.is_empty();
        if seeded {
            let nonce = self.next_challenge.clone();
            let blob = self.derive_ciphers_and_blob(&nonce)?;
            builder = builder.payload(blob);
        }
        let node = builder.build();
        let bytes = self.codec.write(&node, false)?;
        if seeded {
            self.codec.set_crypto(true);
        }
        Ok(bytes)
    }

    /// Discard `stream:features`; the first substantive node decides the
    /// branch. Anything but `challenge` or `success` fails authentication.
    fn read_features_until_challenge_or_success(
        &mut self,
        rx: &mut usize,
    ) -> Result<HandshakeOutcome> {
        loop {
            let node = match self.codec.next_tree()? {
                Some(node) if !node.is_empty_tag() => node,
                _ => return Err(self.fail_auth("stream ended during handshake")),
            };
            *rx += node.size();
            match node.tag.as_str() {
                "stream:features" => continue,
                "challenge" => {
                    debug!(
                        target: "Session/Handshake",
                        "Received challenge ({} bytes)",
                        node.payload_bytes().len()
                    );
                    return Ok(HandshakeOutcome::Challenge(node.payload_bytes().to_vec()));
                }
                "success" => {
                    self.parse_success(&node)?;
                    return Ok(HandshakeOutcome::Authenticated);
                }
                other => {
                    let tag = other.to_string();
                    return Err(self.fail_auth(&tag));
                }
            }
        }
    }

    /// Answer a fresh challenge: derive keys from it, install the ciphers
    /// and send the response blob, then turn on outbound encryption.
    fn send_response(&mut self, nonce: &[u8]) -> Result<usize> {
        let blob = self.derive_ciphers_and_blob(nonce)?;
        let node = NodeBuilder::new("response")
            .attr("xmlns", "urn:ietf:params:xml:ns:xmpp-sasl")
            .payload(blob)
            .build();
        let bytes = self.codec.write(&node, false)?;
        self.codec.set_crypto(true);
        Ok(bytes)
    }

    fn read_success(&mut self) -> Result<usize> {
        let node = match self.codec.next_tree()? {
            Some(node) if !node.is_empty_tag() => node,
            _ => return Err(self.fail_auth("stream ended awaiting success")),
        };
        let size = node.size();
        self.parse_success(&node)?;
        Ok(size)
    }

    /// Derive the four session keys from (password, nonce), build both
    /// directional ciphers and the auth blob. Encoding the blob advances the
    /// outbound keystream, so the same instances go onto the codec after.
    fn derive_ciphers_and_blob(&mut self, nonce: &[u8]) -> Result<Vec<u8>> {
        let keys = match self.ciphers.derive_keys(&self.config.password, nonce) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(target: "Session/Handshake", "Key derivation failed: {e}");
                let _ = self.events.auth_failed.send(());
                return Err(e);
            }
        };
        let (out_key, out_mac) = keys.output();
        let mut outbound = self.ciphers.cipher(out_key, out_mac);
        let (in_key, in_mac) = keys.input();
        let inbound = self.ciphers.cipher(in_key, in_mac);

        let signature = client_signature(&self.config.version, &self.config.mcc, &self.config.mnc);
        let blob = auth_blob(
            outbound.as_mut(),
            &self.config.user,
            nonce,
            Utc::now().timestamp(),
            &signature,
        );

        self.codec.set_output_cipher(outbound);
        self.codec.set_input_cipher(inbound);
        Ok(blob)
    }

    /// Handle the node that must be `success`. Expired accounts are terminal
    /// before any session state is touched; otherwise the payload becomes
    /// the next session's challenge seed and the session goes live.
    fn parse_success(&mut self, node: &Node) -> Result<()> {
        if node.tag != "success" {
            let tag = node.tag.clone();
            return Err(self.fail_auth(&tag));
        }

        self.account.status = node.attr_or_empty("status").to_string();
        self.account.kind = node.attr_or_empty("kind").to_string();
        self.account.creation = node.attr_or_empty("creation").to_string();
        self.account.expiration = node.attr_or_empty("expiration").to_string();

        if self.account.status == "expired" {
            warn!(target: "Session/Handshake", "Account expired");
            let _ = self.events.account_expired.send(Arc::new(AccountExpired {
                reason: "Login".to_string(),
            }));
            return Err(SessionError::AccountExpired);
        }

        self.next_challenge = node.payload_bytes().to_vec();
        self.state = SessionState::Authenticated;
        self.send_client_config("none")?;

        info!(target: "Session/Handshake", "Authenticated as {}", self.my_jid);
        let _ = self.events.auth_success.send(Arc::new(AuthSuccess {
            creation: self.account.creation.clone(),
            expiration: self.account.expiration.clone(),
            kind: self.account.kind.clone(),
            status: self.account.status.clone(),
            next_challenge: self.next_challenge.clone(),
        }));
        self.touch_activity();
        Ok(())
    }

    fn fail_auth(&mut self, what: &str) -> SessionError {
        warn!(target: "Session/Handshake", "Authentication failed: {what}");
        let _ = self.events.auth_failed.send(());
        SessionError::AuthFailed(what.to_string())
    }
}
