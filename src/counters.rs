use std::sync::atomic::{AtomicU64, Ordering};

/// Traffic accounting buckets. Protocol overhead, message payloads and
/// profile pictures are billed separately; `MessageCount` counts stanzas
/// rather than bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    ProtocolBytes,
    MessageBytes,
    MessageCount,
    ProfileBytes,
}

#[derive(Debug, Default)]
struct Pair {
    rx: AtomicU64,
    tx: AtomicU64,
}

/// Process-lifetime traffic counters, shared by every session feeding one
/// account. Atomics so that multiple sessions can bill concurrently.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    protocol: Pair,
    message_bytes: Pair,
    messages: Pair,
    profile: Pair,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn pair(&self, kind: CounterKind) -> &Pair {
        match kind {
            CounterKind::ProtocolBytes => &self.protocol,
            CounterKind::MessageBytes => &self.message_bytes,
            CounterKind::MessageCount => &self.messages,
            CounterKind::ProfileBytes => &self.profile,
        }
    }

    pub fn add(&self, kind: CounterKind, rx: u64, tx: u64) {
        let pair = self.pair(kind);
        if rx > 0 {
            pair.rx.fetch_add(rx, Ordering::Relaxed);
        }
        if tx > 0 {
            pair.tx.fetch_add(tx, Ordering::Relaxed);
        }
    }

    pub fn received(&self, kind: CounterKind) -> u64 {
        self.pair(kind).rx.load(Ordering::Relaxed)
    }

    pub fn sent(&self, kind: CounterKind) -> u64 {
        self.pair(kind).tx.load(Ordering::Relaxed)
    }
}
