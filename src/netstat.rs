//! Rolling counters for one aggregation unit, and the read-only Snapshot
//! the scan tick publishes to the UI.

use crate::tuple::Tuple;

#[derive(Debug, Clone, Copy, Default)]
pub struct NetStat {
    pub bytes_tx_total: u64,
    pub bytes_rx_total: u64,
    pub packets_tx_total: u64,
    pub packets_rx_total: u64,

    pub bytes_tx_tick: u64,
    pub bytes_rx_tick: u64,
    pub packets_tx_tick: u64,
    pub packets_rx_tick: u64,

    pub bps_tx: f64,
    pub bps_rx: f64,
    pub pps_tx: f64,
    pub pps_rx: f64,
}

impl NetStat {
    pub fn record(&mut self, direction: crate::tuple::Direction, bytes: u64, packets: u64) {
        match direction {
            crate::tuple::Direction::Tx => {
                self.bytes_tx_tick += bytes;
                self.packets_tx_tick += packets;
            }
            crate::tuple::Direction::Rx => {
                self.bytes_rx_tick += bytes;
                self.packets_rx_tick += packets;
            }
        }
    }

    /// Derive this tick's rates, fold tick counters into totals, and
    /// return a copy with the (about to be reset) tick counters and
    /// updated totals intact — what the snapshot should show — before
    /// zeroing this instance's tick counters for the next tick.
    pub fn roll_tick(&mut self, interval_seconds: f64) -> NetStat {
        if interval_seconds > 0.0 {
            self.bps_tx = self.bytes_tx_tick as f64 / interval_seconds;
            self.bps_rx = self.bytes_rx_tick as f64 / interval_seconds;
            self.pps_tx = self.packets_tx_tick as f64 / interval_seconds;
            self.pps_rx = self.packets_rx_tick as f64 / interval_seconds;
        } else {
            self.bps_tx = 0.0;
            self.bps_rx = 0.0;
            self.pps_tx = 0.0;
            self.pps_rx = 0.0;
        }

        self.bytes_tx_total += self.bytes_tx_tick;
        self.bytes_rx_total += self.bytes_rx_tick;
        self.packets_tx_total += self.packets_tx_tick;
        self.packets_rx_total += self.packets_rx_tick;

        let snapshot = *self;

        self.bytes_tx_tick = 0;
        self.bytes_rx_tick = 0;
        self.packets_tx_tick = 0;
        self.packets_rx_tick = 0;

        snapshot
    }

    /// Sum of another connection's counters into this (process-level)
    /// aggregate. Used by the scan tick to derive `process.stat`.
    pub fn add(&mut self, other: &NetStat) {
        self.bytes_tx_total += other.bytes_tx_total;
        self.bytes_rx_total += other.bytes_rx_total;
        self.packets_tx_total += other.packets_tx_total;
        self.packets_rx_total += other.packets_rx_total;
        self.bytes_tx_tick += other.bytes_tx_tick;
        self.bytes_rx_tick += other.bytes_rx_tick;
        self.packets_tx_tick += other.packets_tx_tick;
        self.packets_rx_tick += other.packets_rx_tick;
        self.bps_tx += other.bps_tx;
        self.bps_rx += other.bps_rx;
        self.pps_tx += other.pps_tx;
        self.pps_rx += other.pps_rx;
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub tuple: Tuple,
    pub state: String,
    pub stat: NetStat,
}

#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub pid: i32,
    pub command: String,
    pub stat: NetStat,
    pub connections: Vec<ConnectionSnapshot>,
}

/// Immutable, consistent view of all processes and their connections,
/// produced once per tick. The core leaves ordering unspecified; the UI
/// sorts.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub processes: Vec<ProcessSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::Direction;

    #[test]
    fn roll_tick_folds_into_totals_and_resets() {
        let mut stat = NetStat::default();
        stat.record(Direction::Tx, 1000, 2);
        let rolled = stat.roll_tick(1.0);

        assert_eq!(rolled.bytes_tx_tick, 1000);
        assert_eq!(rolled.bytes_tx_total, 1000);
        assert_eq!(rolled.bps_tx, 1000.0);

        assert_eq!(stat.bytes_tx_tick, 0, "tick counters reset after roll");
        assert_eq!(stat.bytes_tx_total, 1000, "totals persist across ticks");
    }

    #[test]
    fn add_sums_every_field() {
        let mut a = NetStat::default();
        a.record(Direction::Tx, 100, 1);
        let mut b = NetStat::default();
        b.record(Direction::Rx, 50, 1);

        let mut total = NetStat::default();
        total.add(&a);
        total.add(&b);

        assert_eq!(total.bytes_tx_tick, 100);
        assert_eq!(total.bytes_rx_tick, 50);
    }
}
