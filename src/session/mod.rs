//! The session state machine: handshake, read dispatch and outgoing stanza
//! builders.
//!
//! A session is single-threaded and event-driven. Two external triggers feed
//! it: an I/O-readiness signal routed to [`Session::on_readable`] and a
//! periodic timer routed to [`Session::check_activity`]. Dispatch runs to
//! completion per trigger and never blocks on the network itself; blocking
//! is the codec's concern.

mod dispatch;
mod handshake;
mod message;
mod send;

use crate::codec::WireCodec;
use crate::counters::TrafficCounters;
use crate::crypto::CipherSuite;
use crate::error::{Result, SessionError};
use crate::store::PendingStore;
use crate::types::events::EventBus;
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;

/// Forced teardown threshold: seconds since the last successful read.
const ACTIVITY_TIMEOUT_SECS: i64 = 905;

/// Static session parameters, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Home server domain, e.g. "s.whatsapp.net".
    pub domain: String,
    /// Client resource identifier sent in the stream open.
    pub resource: String,
    /// Account id (phone number).
    pub user: String,
    /// Display name announced with presence.
    pub push_name: String,
    pub password: Vec<u8>,
    pub language: String,
    pub country: String,
    /// Carrier codes, zero-padded to three digits at construction.
    pub mcc: String,
    pub mnc: String,
    /// Client version string baked into the auth signature.
    pub version: String,
    /// Final challenge seed saved from the previous session, empty on a
    /// first login.
    pub next_challenge: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    StreamOpened,
    AwaitingFeatures,
    AwaitingChallengeOrSuccess,
    Authenticated,
    Closing,
}

/// Account attributes parsed from the handshake `success` node.
#[derive(Debug, Clone, Default)]
pub struct AccountInfo {
    pub status: String,
    pub kind: String,
    pub creation: String,
    pub expiration: String,
}

pub struct Session<C: WireCodec> {
    pub(crate) config: SessionConfig,
    pub(crate) codec: C,
    pub(crate) ciphers: Box<dyn CipherSuite>,
    pub(crate) store: Arc<PendingStore>,
    pub(crate) counters: Arc<TrafficCounters>,
    pub(crate) events: Arc<EventBus>,

    pub(crate) state: SessionState,
    pub(crate) account: AccountInfo,
    /// Seed for the next session's login, refreshed by every `success`.
    pub(crate) next_challenge: Vec<u8>,
    pub(crate) my_jid: String,

    iq_counter: u64,
    /// Unix seconds of the last read attempt; drives the liveness check.
    last_activity: i64,
    /// Unix milliseconds of the last successfully decoded tree.
    last_tree_read: i64,
}

impl<C: WireCodec> Session<C> {
    pub fn new(
        mut config: SessionConfig,
        codec: C,
        ciphers: Box<dyn CipherSuite>,
        store: Arc<PendingStore>,
        counters: Arc<TrafficCounters>,
    ) -> Self {
        while !config.mcc.is_empty() && config.mcc.len() < 3 {
            config.mcc.insert(0, '0');
        }
        while !config.mnc.is_empty() && config.mnc.len() < 3 {
            config.mnc.insert(0, '0');
        }
        let my_jid = format!("{}@{}", config.user, config.domain);
        Self {
            config,
            codec,
            ciphers,
            store,
            counters,
            events: Arc::new(EventBus::new()),
            state: SessionState::Disconnected,
            account: AccountInfo::default(),
            next_challenge: Vec::new(),
            my_jid,
            iq_counter: 0,
            last_activity: 0,
            last_tree_read: 0,
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn account(&self) -> &AccountInfo {
        &self.account
    }

    /// The seed to hand to the next session's [`SessionConfig`].
    pub fn next_challenge(&self) -> &[u8] {
        &self.next_challenge
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity
    }

    /// Unix milliseconds of the last successfully decoded tree.
    pub fn last_tree_read(&self) -> i64 {
        self.last_tree_read
    }

    pub(crate) fn touch_activity(&mut self) {
        self.last_activity = Utc::now().timestamp();
    }

    /// Call once the transport is connected. Emits `connected` and runs the
    /// login handshake to completion.
    pub fn start(&mut self) -> Result<()> {
        self.state = SessionState::Connecting;
        let _ = self.events.connected.send(());
        let seed = std::mem::take(&mut self.config.next_challenge);
        self.login(&seed)
    }

    /// Drain and dispatch every inbound tree the codec has buffered. Wired
    /// to the transport's readiness signal; a no-op before authentication
    /// completes (the handshake reads inline).
    pub fn on_readable(&mut self) -> Result<()> {
        // Dispatch can tear the session down mid-drain (stream errors, write
        // failures), so the state is re-checked per tree, not just on entry.
        while self.state == SessionState::Authenticated && self.codec.has_data() {
            self.touch_activity();
            match self.codec.next_tree() {
                Ok(Some(node)) => {
                    self.last_tree_read = Utc::now().timestamp_millis();
                    debug!(target: "Session", "<-- {node}");
                    self.dispatch(node)?;
                }
                Ok(None) => {
                    debug!(target: "Session", "Peer closed the stream");
                    self.teardown();
                    return Ok(());
                }
                Err(e) => {
                    warn!(target: "Session", "Read failed: {e}");
                    self.teardown();
                    return Err(SessionError::Transport(e));
                }
            }
        }
        Ok(())
    }

    /// Liveness check against wall-clock time. Call from a periodic timer.
    pub fn check_activity(&mut self) {
        self.check_activity_at(Utc::now().timestamp());
    }

    /// Liveness check against an explicit "now", in unix seconds.
    pub fn check_activity_at(&mut self, now: i64) {
        if self.state == SessionState::Disconnected {
            return;
        }
        if now - self.last_activity > ACTIVITY_TIMEOUT_SECS {
            warn!(
                target: "Session",
                "No read activity for {}s, forcing disconnect",
                now - self.last_activity
            );
            self.teardown();
        }
    }

    /// Orderly shutdown requested by the caller. Same funnel as every fatal
    /// error path.
    pub fn disconnect(&mut self) {
        self.teardown();
    }

    /// The single teardown funnel: close the transport and emit exactly one
    /// terminal `disconnected`. Idempotent; cause-specific events must have
    /// been emitted before arriving here.
    pub(crate) fn teardown(&mut self) {
        if matches!(self.state, SessionState::Disconnected | SessionState::Closing) {
            return;
        }
        self.state = SessionState::Closing;
        self.codec.close();
        let _ = self.events.disconnected.send(());
        self.state = SessionState::Disconnected;
    }

    /// Builds a correlation id: prefix plus the hex request counter. The
    /// prefix carries the intent back to us in the reply.
    pub(crate) fn make_id(&mut self, prefix: &str) -> String {
        self.iq_counter += 1;
        format!("{prefix}{:x}", self.iq_counter)
    }
}
