//! Scan tick coordinator and the `Pipeline` all shared state lives behind.
//!
//! `Pipeline` bundles the connection table, process table, and statistics
//! engine the way `chadthrottle`'s `monitor.rs` bundles its
//! `BandwidthTracker` behind one `Arc<Mutex<_>>`: packet-capture threads
//! and the tick task both lock the whole pipeline, so a snapshot never
//! observes half-updated state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;

use crate::connection::ConnectionTable;
use crate::error::Result;
use crate::netstat::Snapshot;
use crate::process::ProcessTable;
use crate::stats::StatisticsEngine;
use crate::tuple::{Direction, Protocol, Tuple};

pub const DEFAULT_SOURCES: &[(Protocol, &str)] = &[
    (Protocol::Tcp, "/proc/net/tcp"),
    (Protocol::Tcp, "/proc/net/tcp6"),
    (Protocol::Udp, "/proc/net/udp"),
    (Protocol::Udp, "/proc/net/udp6"),
];

pub struct Pipeline {
    connections: ConnectionTable,
    processes: ProcessTable,
    stats: StatisticsEngine,
}

impl Pipeline {
    pub fn new(pending_capacity: usize) -> Self {
        Self {
            connections: ConnectionTable::new(),
            processes: ProcessTable::new(),
            stats: StatisticsEngine::new(pending_capacity),
        }
    }

    /// One refresh cycle: connection scan, drain of buffered packet stats,
    /// process scan (which resolves each process's owned connections),
    /// then the statistics roll that produces the snapshot.
    ///
    /// `shutdown` is polled between phases; a signalled shutdown aborts
    /// the tick and returns `Ok(None)` rather than a half-built snapshot.
    pub fn tick(
        &mut self,
        interval_seconds: f64,
        sources: &[(Protocol, &str)],
        shutdown: &AtomicBool,
    ) -> Result<Option<Snapshot>> {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(None);
        }
        self.connections.update(sources)?;
        self.stats.drain_pending(&self.connections);

        if shutdown.load(Ordering::Relaxed) {
            return Ok(None);
        }
        self.processes.update(&self.connections)?;

        if shutdown.load(Ordering::Relaxed) {
            return Ok(None);
        }
        Ok(Some(self.stats.tick(&self.connections, &mut self.processes, interval_seconds)))
    }

    /// Entry point for the packet source: given a frame's raw 4-tuple and
    /// byte length, work out which side is "local" relative to a known
    /// connection and fold the observation into that connection's
    /// counters (or the pre-connection buffer, if the connection hasn't
    /// surfaced in the table yet).
    ///
    /// Matches the outbound key first, then the inbound (reversed) key —
    /// the same two-key probe `chadthrottle`'s `track_connection` does —
    /// and falls back to treating an entirely unknown tuple as outbound,
    /// since a freshly-opened local connection is the common unknown case.
    pub fn observe_packet(
        &mut self,
        src_ip: std::net::IpAddr,
        src_port: u16,
        dst_ip: std::net::IpAddr,
        dst_port: u16,
        protocol: Protocol,
        bytes: u64,
    ) {
        let outbound = Tuple::new(src_ip, src_port, dst_ip, dst_port, protocol);
        let inbound = outbound.reversed();

        let (tuple, direction) = if self.connections.get_by_tuple(&outbound).is_some() {
            (outbound, Direction::Tx)
        } else if self.connections.get_by_tuple(&inbound).is_some() {
            (inbound, Direction::Rx)
        } else {
            (outbound, Direction::Tx)
        };

        self.stats
            .record_packet(&self.connections, tuple, direction, bytes, 1);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }
}

/// Shared handle both the capture threads and the tick task hold.
pub type SharedPipeline = Arc<std::sync::Mutex<Pipeline>>;

pub fn new_shared_pipeline(pending_capacity: usize) -> SharedPipeline {
    Arc::new(std::sync::Mutex::new(Pipeline::new(pending_capacity)))
}

/// Run one tick against a shared pipeline, logging and swallowing
/// transient I/O/parse failures rather than propagating them — the UI
/// keeps showing last-known state, per the core's error policy.
pub fn run_tick(
    pipeline: &SharedPipeline,
    interval_seconds: f64,
    sources: &[(Protocol, &str)],
    shutdown: &AtomicBool,
) -> Option<Snapshot> {
    let mut guard = match pipeline.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match guard.tick(interval_seconds, sources, shutdown) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!("scan tick failed, reusing last known state: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn observe_packet_buffers_unknown_tuple() {
        let mut pipeline = Pipeline::new(16);
        pipeline.observe_packet(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            1234,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            80,
            Protocol::Tcp,
            1500,
        );
        assert_eq!(pipeline.stats.pending_len(), 1);
    }

    #[test]
    fn tick_returns_none_when_shutdown_flagged_upfront() {
        let mut pipeline = Pipeline::new(16);
        let shutdown = AtomicBool::new(true);
        let result = pipeline.tick(1.0, &[], &shutdown).unwrap();
        assert!(result.is_none());
    }
}
