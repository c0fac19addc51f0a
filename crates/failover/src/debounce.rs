//! Debouncing of snapshot changes.
//!
//! A snapshot that differs from the applied one is only applied after it has
//! been observed on `threshold` consecutive ticks. Anything else seen in
//! between restarts the count.

use crate::types::NodeSnapshot;

/// Default number of identical observations before a change is applied
pub const DEFAULT_THRESHOLD: u32 = 3;

/// What the tracker made of one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Same as the applied snapshot
    Unchanged,
    /// Failed the validity gate
    Rejected,
    /// Seen this many consecutive times, below the threshold
    Pending(u32),
    /// Threshold reached; the caller should apply it
    Confirmed,
}

/// Whether a snapshot may be applied at all.
///
/// Unicast peer lists are only trusted once at least two backends are
/// visible, except on the bootstrap node which starts out alone.
pub fn is_applicable(snapshot: &NodeSnapshot, bootstrap: bool) -> bool {
    !(snapshot.enable_unicast && !bootstrap && snapshot.api_backends.len() < 2)
}

#[derive(Debug, Clone)]
pub struct ChangeTracker {
    threshold: u32,
    bootstrap: bool,
    applied: Option<NodeSnapshot>,
    observed: Option<NodeSnapshot>,
    count: u32,
}

impl ChangeTracker {
    pub fn new(threshold: u32, bootstrap: bool) -> Self {
        Self {
            threshold,
            bootstrap,
            applied: None,
            observed: None,
            count: 0,
        }
    }

    pub fn observe(&mut self, snapshot: &NodeSnapshot) -> Observation {
        if self.applied.as_ref() == Some(snapshot) {
            self.reset();
            return Observation::Unchanged;
        }

        if !self.accepts(snapshot) {
            self.reset();
            return Observation::Rejected;
        }

        if self.observed.as_ref() == Some(snapshot) {
            self.count += 1;
        } else {
            self.observed = Some(snapshot.clone());
            self.count = 1;
        }

        if self.count >= self.threshold {
            Observation::Confirmed
        } else {
            Observation::Pending(self.count)
        }
    }

    /// Whether `snapshot` passes the validity gate for this node.
    pub fn accepts(&self, snapshot: &NodeSnapshot) -> bool {
        is_applicable(snapshot, self.bootstrap)
    }

    /// Record `snapshot` as live and clear any pending change.
    pub fn mark_applied(&mut self, snapshot: NodeSnapshot) {
        self.applied = Some(snapshot);
        self.reset();
    }

    pub fn applied(&self) -> Option<&NodeSnapshot> {
        self.applied.as_ref()
    }

    pub fn pending_count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn reset(&mut self) {
        self.observed = None;
        self.count = 0;
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::snapshot;

    fn variant(ip: &str) -> NodeSnapshot {
        NodeSnapshot {
            non_virtual_ip: ip.to_string(),
            ..snapshot()
        }
    }

    #[test]
    fn test_confirms_after_threshold() {
        let mut tracker = ChangeTracker::default();
        let s = snapshot();
        assert_eq!(tracker.observe(&s), Observation::Pending(1));
        assert_eq!(tracker.observe(&s), Observation::Pending(2));
        assert_eq!(tracker.observe(&s), Observation::Confirmed);

        tracker.mark_applied(s.clone());
        assert_eq!(tracker.observe(&s), Observation::Unchanged);
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_reversion_cancels_pending_change() {
        let mut tracker = ChangeTracker::default();
        let old = snapshot();
        tracker.mark_applied(old.clone());

        let new = variant("192.168.111.30");
        assert_eq!(tracker.observe(&new), Observation::Pending(1));
        assert_eq!(tracker.observe(&new), Observation::Pending(2));
        assert_eq!(tracker.observe(&old), Observation::Unchanged);
        assert_eq!(tracker.observe(&new), Observation::Pending(1));
    }

    #[test]
    fn test_distinct_snapshot_restarts_count() {
        let mut tracker = ChangeTracker::default();
        assert_eq!(tracker.observe(&variant("10.0.0.1")), Observation::Pending(1));
        assert_eq!(tracker.observe(&variant("10.0.0.1")), Observation::Pending(2));
        assert_eq!(tracker.observe(&variant("10.0.0.2")), Observation::Pending(1));
    }

    #[test]
    fn test_gate_rejects_thin_unicast() {
        let mut thin = snapshot();
        thin.api_backends.truncate(1);
        assert!(!is_applicable(&thin, false));
        assert!(is_applicable(&thin, true));

        let mut multicast = thin.clone();
        multicast.enable_unicast = false;
        assert!(is_applicable(&multicast, false));

        let mut tracker = ChangeTracker::default();
        for _ in 0..10 {
            assert_eq!(tracker.observe(&thin), Observation::Rejected);
        }
        assert_eq!(tracker.pending_count(), 0);
    }
}
