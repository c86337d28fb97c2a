/*! Statistics of wire packets and onion outcomes.

The codec counts frames crossing the wire in either direction; the relay
handlers record what became of each inbound onion. All counters are shared
through cheap clones, so a daemon can report totals on shutdown.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Struct for various counters.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    /// Shared counters.
    pub counters: Arc<Counters>,
}

impl Stats {
    /// New Stats object.
    pub fn new() -> Self {
        Default::default()
    }
}

/// Counters of wire packets and per-onion outcomes.
#[derive(Debug, Default)]
pub struct Counters {
    /// Packets decoded from the wire.
    incoming: AtomicU64,
    /// Packets encoded onto the wire.
    outgoing: AtomicU64,
    /// Onions whose payload was consumed locally.
    onions_delivered: AtomicU64,
    /// Onions forwarded to a next hop.
    onions_relayed: AtomicU64,
    /// Onions dropped at any stage.
    onions_dropped: AtomicU64,
}

impl Counters {
    /// Add 1 to the incoming packet counter.
    pub fn increase_incoming(&self) {
        self.incoming.fetch_add(1, Ordering::Relaxed);
    }

    /// Add 1 to the outgoing packet counter.
    pub fn increase_outgoing(&self) {
        self.outgoing.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a locally delivered onion payload.
    pub fn increase_delivered(&self) {
        self.onions_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a forwarded onion.
    pub fn increase_relayed(&self) {
        self.onions_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped onion.
    pub fn increase_dropped(&self) {
        self.onions_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the incoming packet counter.
    pub fn incoming(&self) -> u64 {
        self.incoming.load(Ordering::Relaxed)
    }

    /// Get the outgoing packet counter.
    pub fn outgoing(&self) -> u64 {
        self.outgoing.load(Ordering::Relaxed)
    }

    /// Get the delivered onion counter.
    pub fn onions_delivered(&self) -> u64 {
        self.onions_delivered.load(Ordering::Relaxed)
    }

    /// Get the relayed onion counter.
    pub fn onions_relayed(&self) -> u64 {
        self.onions_relayed.load(Ordering::Relaxed)
    }

    /// Get the dropped onion counter.
    pub fn onions_dropped(&self) -> u64 {
        self.onions_dropped.load(Ordering::Relaxed)
    }
}
