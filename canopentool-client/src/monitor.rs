//! Heartbeat monitor engine
//!
//! Tracks per-node liveness and bus traffic from received CAN frames, and
//! classifies every node ID into a display state at draw time. The engine is
//! fed one frame at a time by the event loop that owns the transport, and is
//! queried for snapshots of node state, counters, and rates; it knows nothing
//! about terminals or keyboards.

use std::time::SystemTime;

use canopentool_common::messages::{
    classify_frame, CanMessage, FrameClass, Heartbeat, NmtState, MAX_NODE_ID,
};

/// How often the display is redrawn, in milliseconds
pub const REFRESH_TIME_MS: u64 = 500;
/// How long a node may stay silent before its heartbeat counts as failed
const HEARTBEAT_FAILURE_MS: u64 = 2000;
/// How long a fresh bootup message is shown with emphasis
const BOOTUP_BLIP_MS: u64 = 1000;
/// How long a bootup message is shown at all
const BOOTUP_SHOW_MS: u64 = 30_000;
/// Minimum interval between traffic rate samples
const RATE_SAMPLE_MS: u64 = 1000;

/// Length of the node table: one slot per node ID, slot 0 unused
pub const NODE_SLOTS: usize = MAX_NODE_ID as usize + 1;

/// The last heartbeat seen from a node
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatRecord {
    /// Kernel reception time of the heartbeat frame
    pub last_seen: SystemTime,
    /// The reported NMT state, low 7 bits
    pub state: u8,
}

/// Monotonic frame counts since monitor start or the last clear
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrafficCounters {
    /// NMT commands and heartbeats
    pub nmt: u64,
    /// Process data objects
    pub pdo: u64,
    /// SDO requests and responses
    pub sdo: u64,
    /// Every received frame, classified or not
    pub total: u64,
}

impl TrafficCounters {
    fn record(&mut self, class: Option<FrameClass>) {
        self.total += 1;
        match class {
            Some(FrameClass::Nmt) | Some(FrameClass::Heartbeat) => self.nmt += 1,
            Some(FrameClass::Pdo) => self.pdo += 1,
            Some(FrameClass::Sdo) => self.sdo += 1,
            None => {}
        }
    }
}

/// Frame rates in packets per second, from the most recent sample
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrafficRates {
    /// NMT commands and heartbeats
    pub nmt: f64,
    /// Process data objects
    pub pdo: f64,
    /// SDO requests and responses
    pub sdo: f64,
    /// Every received frame
    pub total: f64,
}

/// Computes traffic rates over at-least-one-second windows
///
/// Between samples the previously computed rates are reported unchanged, so
/// the display does not flicker on every refresh.
#[derive(Debug)]
struct RateSampler {
    seen: TrafficCounters,
    last_sample: SystemTime,
    rates: TrafficRates,
}

impl RateSampler {
    fn new(now: SystemTime) -> Self {
        Self {
            seen: TrafficCounters::default(),
            last_sample: now,
            rates: TrafficRates::default(),
        }
    }

    fn sample(&mut self, now: SystemTime, counters: TrafficCounters) {
        let elapsed_ms = now
            .duration_since(self.last_sample)
            .unwrap_or_default()
            .as_millis() as u64;
        if elapsed_ms > RATE_SAMPLE_MS {
            let per_second =
                |current: u64, seen: u64| current.saturating_sub(seen) as f64 * 1000.0 / elapsed_ms as f64;
            self.rates = TrafficRates {
                nmt: per_second(counters.nmt, self.seen.nmt),
                pdo: per_second(counters.pdo, self.seen.pdo),
                sdo: per_second(counters.sdo, self.seen.sdo),
                total: per_second(counters.total, self.seen.total),
            };
            self.seen = counters;
            self.last_sample = now;
        }
    }

    fn reset(&mut self, now: SystemTime) {
        *self = Self::new(now);
    }
}

/// The display state of one node ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeDisplay {
    /// Bootup seen within the last second, shown with inverted emphasis
    BootBlip,
    /// Bootup seen recently
    Boot,
    /// Node reported the Stopped state
    Stopped,
    /// Node reported the Operational state
    Operational,
    /// Node reported the PreOperational state
    PreOperational,
    /// Node reported a state this tool does not know
    Invalid,
    /// No recent heartbeat from a node expected on this bus
    Down,
    /// No recent heartbeat, but the node is not expected to be present
    DownIgnored,
}

impl NodeDisplay {
    /// The four-character label shown in the node grid
    pub fn label(&self) -> &'static str {
        match self {
            NodeDisplay::BootBlip | NodeDisplay::Boot => "BOOT",
            NodeDisplay::Stopped => "STOP",
            NodeDisplay::Operational => "OPER",
            NodeDisplay::PreOperational => "PRE ",
            NodeDisplay::Invalid => "####",
            NodeDisplay::Down | NodeDisplay::DownIgnored => "UNKN",
        }
    }

    /// Whether this state counts towards the failure summary
    pub fn is_failure(&self) -> bool {
        matches!(self, NodeDisplay::Invalid | NodeDisplay::Down)
    }
}

/// Classify a node for display
///
/// Deterministic in its inputs: the elapsed time since the last heartbeat
/// (`None` when the node has never been seen), the raw reported state, and
/// whether the node is expected on this bus.
pub fn classify(elapsed_ms: Option<u64>, state: u8, present: bool) -> NodeDisplay {
    let down = if present {
        NodeDisplay::Down
    } else {
        NodeDisplay::DownIgnored
    };
    let elapsed = match elapsed_ms {
        Some(elapsed) => elapsed,
        None => return down,
    };
    match NmtState::try_from(state) {
        Ok(NmtState::Bootup) if elapsed < BOOTUP_BLIP_MS => NodeDisplay::BootBlip,
        Ok(NmtState::Bootup) if elapsed < BOOTUP_SHOW_MS => NodeDisplay::Boot,
        Ok(NmtState::Stopped) if elapsed < HEARTBEAT_FAILURE_MS => NodeDisplay::Stopped,
        Ok(NmtState::Operational) if elapsed < HEARTBEAT_FAILURE_MS => NodeDisplay::Operational,
        Ok(NmtState::PreOperational) if elapsed < HEARTBEAT_FAILURE_MS => {
            NodeDisplay::PreOperational
        }
        Err(_) if elapsed < HEARTBEAT_FAILURE_MS => NodeDisplay::Invalid,
        _ => down,
    }
}

/// Per-class node counts for the summary line
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Nodes showing a bootup state
    pub boot: usize,
    /// Nodes in Stopped
    pub stopped: usize,
    /// Nodes in Operational
    pub operational: usize,
    /// Nodes in PreOperational
    pub pre_operational: usize,
    /// Nodes with failed heartbeats or invalid states
    pub failure: usize,
}

/// The heartbeat monitor state
///
/// Slot 0 of the node table is never used; heartbeats only come from nodes
/// 1..=127.
#[derive(Debug)]
pub struct Monitor {
    slots: [Option<HeartbeatRecord>; NODE_SLOTS],
    present: [bool; NODE_SLOTS],
    counters: TrafficCounters,
    sampler: RateSampler,
}

impl Monitor {
    /// Create a monitor
    ///
    /// # Arguments
    /// - `present`: per node ID, whether the node is expected on this bus
    /// - `now`: the rate sampling baseline
    pub fn new(present: [bool; NODE_SLOTS], now: SystemTime) -> Self {
        Self {
            slots: [None; NODE_SLOTS],
            present,
            counters: TrafficCounters::default(),
            sampler: RateSampler::new(now),
        }
    }

    /// Account for one received frame
    ///
    /// `timestamp` must be the kernel reception time of the frame, not the
    /// time it was dequeued.
    pub fn handle_frame(&mut self, msg: &CanMessage, timestamp: SystemTime) {
        let class = classify_frame(msg);
        self.counters.record(class);
        if class == Some(FrameClass::Heartbeat) {
            match Heartbeat::try_from(*msg) {
                Ok(heartbeat) => {
                    self.slots[heartbeat.node as usize] = Some(HeartbeatRecord {
                        last_seen: timestamp,
                        state: heartbeat.state,
                    });
                }
                Err(e) => log::debug!("Ignoring malformed heartbeat: {e:?}"),
            }
        }
    }

    /// Forget all heartbeat history and zero the traffic counters
    pub fn clear(&mut self, now: SystemTime) {
        self.slots = [None; NODE_SLOTS];
        self.counters = TrafficCounters::default();
        self.sampler.reset(now);
    }

    /// Update the rate sample if the sampling interval has elapsed
    pub fn sample_rates(&mut self, now: SystemTime) {
        self.sampler.sample(now, self.counters);
    }

    /// The current traffic counters
    pub fn counters(&self) -> TrafficCounters {
        self.counters
    }

    /// The most recently sampled traffic rates
    pub fn rates(&self) -> TrafficRates {
        self.sampler.rates
    }

    /// Classify one node for display
    pub fn node_display(&self, node: u8, now: SystemTime) -> NodeDisplay {
        let slot = self.slots[node as usize];
        let elapsed_ms = slot.map(|record| {
            now.duration_since(record.last_seen)
                .unwrap_or_default()
                .as_millis() as u64
        });
        let state = slot.map(|record| record.state).unwrap_or(0);
        classify(elapsed_ms, state, self.present[node as usize])
    }

    /// Count nodes per display class for the summary line
    pub fn summary(&self, now: SystemTime) -> Summary {
        let mut summary = Summary::default();
        for node in 1..=MAX_NODE_ID {
            let display = self.node_display(node, now);
            match display {
                NodeDisplay::BootBlip | NodeDisplay::Boot => summary.boot += 1,
                NodeDisplay::Stopped => summary.stopped += 1,
                NodeDisplay::Operational => summary.operational += 1,
                NodeDisplay::PreOperational => summary.pre_operational += 1,
                NodeDisplay::Invalid | NodeDisplay::Down => summary.failure += 1,
                NodeDisplay::DownIgnored => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use canopentool_common::messages::CanId;

    use super::*;

    #[test]
    fn test_classification_table() {
        // (elapsed, state, present) -> display
        let cases = [
            (Some(500), 0, true, NodeDisplay::BootBlip),
            (Some(1500), 0, true, NodeDisplay::Boot),
            (Some(1500), 4, true, NodeDisplay::Stopped),
            (Some(1500), 5, true, NodeDisplay::Operational),
            (Some(1500), 127, true, NodeDisplay::PreOperational),
            (Some(1500), 6, true, NodeDisplay::Invalid),
            (Some(3000), 5, true, NodeDisplay::Down),
            (Some(3000), 5, false, NodeDisplay::DownIgnored),
            (None, 0, true, NodeDisplay::Down),
            (None, 0, false, NodeDisplay::DownIgnored),
        ];
        for (elapsed, state, present, expected) in cases {
            assert_eq!(
                expected,
                classify(elapsed, state, present),
                "elapsed={elapsed:?} state={state} present={present}"
            );
        }
    }

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(NodeDisplay::BootBlip, classify(Some(999), 0, true));
        assert_eq!(NodeDisplay::Boot, classify(Some(1000), 0, true));
        assert_eq!(NodeDisplay::Boot, classify(Some(29_999), 0, true));
        assert_eq!(NodeDisplay::Down, classify(Some(30_000), 0, true));
        assert_eq!(NodeDisplay::Operational, classify(Some(1999), 5, true));
        assert_eq!(NodeDisplay::Down, classify(Some(2000), 5, true));
        assert_eq!(NodeDisplay::Invalid, classify(Some(1999), 99, true));
        assert_eq!(NodeDisplay::DownIgnored, classify(Some(2000), 99, false));
    }

    fn heartbeat_frame(node: u8, state: u8) -> CanMessage {
        CanMessage::new(CanId::Std(0x700 + node as u16), &[state])
    }

    #[test]
    fn test_heartbeat_updates_slot() {
        let start = SystemTime::UNIX_EPOCH;
        let mut monitor = Monitor::new([true; NODE_SLOTS], start);

        monitor.handle_frame(&heartbeat_frame(5, 5), start);

        let now = start + Duration::from_millis(100);
        assert_eq!(NodeDisplay::Operational, monitor.node_display(5, now));
        assert_eq!(NodeDisplay::Down, monitor.node_display(6, now));

        // A later heartbeat replaces the state
        monitor.handle_frame(&heartbeat_frame(5, 4), now);
        assert_eq!(NodeDisplay::Stopped, monitor.node_display(5, now));

        let counters = monitor.counters();
        assert_eq!(2, counters.nmt);
        assert_eq!(2, counters.total);
    }

    #[test]
    fn test_frame_accounting() {
        let start = SystemTime::UNIX_EPOCH;
        let mut monitor = Monitor::new([true; NODE_SLOTS], start);

        monitor.handle_frame(&CanMessage::new(CanId::Std(0x000), &[1, 0]), start);
        monitor.handle_frame(&CanMessage::new(CanId::Std(0x200), &[0; 8]), start);
        monitor.handle_frame(&CanMessage::new(CanId::Std(0x602), &[0; 8]), start);
        monitor.handle_frame(&heartbeat_frame(1, 5), start);
        // Unclassified: SYNC
        monitor.handle_frame(&CanMessage::new(CanId::Std(0x080), &[1]), start);

        assert_eq!(
            TrafficCounters {
                nmt: 2,
                pdo: 1,
                sdo: 1,
                total: 5
            },
            monitor.counters()
        );
    }

    #[test]
    fn test_clear_is_complete() {
        let start = SystemTime::UNIX_EPOCH;
        let mut monitor = Monitor::new([true; NODE_SLOTS], start);
        monitor.handle_frame(&heartbeat_frame(1, 5), start);
        monitor.sample_rates(start + Duration::from_millis(1500));

        monitor.clear(start + Duration::from_secs(2));

        assert_eq!(TrafficCounters::default(), monitor.counters());
        assert_eq!(TrafficRates::default(), monitor.rates());
        assert_eq!(
            NodeDisplay::Down,
            monitor.node_display(1, start + Duration::from_secs(2))
        );
    }

    #[test]
    fn test_rate_sampling_holds_between_samples() {
        let start = SystemTime::UNIX_EPOCH;
        let mut monitor = Monitor::new([true; NODE_SLOTS], start);

        for _ in 0..10 {
            monitor.handle_frame(&CanMessage::new(CanId::Std(0x200), &[0; 8]), start);
        }

        // Not enough time elapsed: rates stay at their previous value
        monitor.sample_rates(start + Duration::from_millis(999));
        assert_eq!(0.0, monitor.rates().pdo);

        // 10 frames over 2 seconds
        monitor.sample_rates(start + Duration::from_millis(2000));
        assert_eq!(5.0, monitor.rates().pdo);
        assert_eq!(5.0, monitor.rates().total);

        // No new frames, but no sample either: rate is unchanged
        monitor.sample_rates(start + Duration::from_millis(2500));
        assert_eq!(5.0, monitor.rates().pdo);

        // Next sample window sees zero new frames
        monitor.sample_rates(start + Duration::from_millis(3500));
        assert_eq!(0.0, monitor.rates().pdo);
    }

    #[test]
    fn test_summary_counts() {
        let start = SystemTime::UNIX_EPOCH;
        let mut present = [false; NODE_SLOTS];
        present[1] = true;
        present[2] = true;
        present[3] = true;
        let mut monitor = Monitor::new(present, start);

        monitor.handle_frame(&heartbeat_frame(1, 5), start);
        monitor.handle_frame(&heartbeat_frame(2, 127), start);
        monitor.handle_frame(&heartbeat_frame(4, 9), start);

        let now = start + Duration::from_millis(100);
        let summary = monitor.summary(now);
        assert_eq!(1, summary.operational);
        assert_eq!(1, summary.pre_operational);
        // Node 3 is expected but silent, node 4 reports garbage
        assert_eq!(2, summary.failure);
        assert_eq!(0, summary.stopped);
    }
}
