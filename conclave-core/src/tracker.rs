//! Resource tracker
//!
//! Per-participant bookkeeping of transport ids allocated on the SFU. The
//! tracker exists purely to drive cleanup: it records ownership when a
//! transport is created and hands the full set back exactly once during the
//! owner's teardown. Ids across participants are disjoint — a transport is
//! owned by exactly one participant.

use crate::models::{ParticipantId, TransportId};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Tracks SFU transport ids per participant.
#[derive(Default)]
pub struct ResourceTracker {
    inner: Mutex<HashMap<ParticipantId, BTreeSet<TransportId>>>,
}

impl ResourceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ownership of a transport id. Idempotent for the same owner;
    /// an id already owned by a different participant is refused, keeping
    /// the tracked sets disjoint.
    pub fn track(&self, participant_id: &ParticipantId, transport_id: TransportId) {
        let mut inner = self.inner.lock();

        let foreign_owner = inner
            .iter()
            .find(|(owner, ids)| *owner != participant_id && ids.contains(&transport_id))
            .map(|(owner, _)| owner.clone());
        if let Some(owner) = foreign_owner {
            warn!(
                transport_id = %transport_id,
                owner = %owner,
                claimant = %participant_id,
                "transport id already owned by another participant, ignoring"
            );
            return;
        }

        inner
            .entry(participant_id.clone())
            .or_default()
            .insert(transport_id);
    }

    /// Return and clear every transport id owned by the participant.
    ///
    /// Idempotent: a second call yields an empty set.
    pub fn forget(&self, participant_id: &ParticipantId) -> BTreeSet<TransportId> {
        let released = self
            .inner
            .lock()
            .remove(participant_id)
            .unwrap_or_default();

        if !released.is_empty() {
            debug!(
                participant_id = %participant_id,
                transports = released.len(),
                "released tracked transports"
            );
        }
        released
    }

    /// Transport ids currently tracked for a participant.
    #[must_use]
    pub fn tracked_for(&self, participant_id: &ParticipantId) -> BTreeSet<TransportId> {
        self.inner
            .lock()
            .get(participant_id)
            .cloned()
            .unwrap_or_default()
    }

    /// True if the participant owns the transport id.
    #[must_use]
    pub fn owns(&self, participant_id: &ParticipantId, transport_id: &TransportId) -> bool {
        self.inner
            .lock()
            .get(participant_id)
            .is_some_and(|ids| ids.contains(transport_id))
    }

    /// Total tracked ids across all participants.
    #[must_use]
    pub fn tracked_total(&self) -> usize {
        self.inner.lock().values().map(BTreeSet::len).sum()
    }

    /// Drop all tracked state. Used for graceful shutdown.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_is_idempotent() {
        let tracker = ResourceTracker::new();
        let participant = ParticipantId::new();

        tracker.track(&participant, TransportId::from("t1"));
        tracker.track(&participant, TransportId::from("t1"));

        assert_eq!(tracker.tracked_total(), 1);
        assert_eq!(tracker.tracked_for(&participant).len(), 1);
        assert!(tracker.owns(&participant, &TransportId::from("t1")));
    }

    #[test]
    fn test_forget_twice_yields_empty() {
        let tracker = ResourceTracker::new();
        let participant = ParticipantId::new();

        tracker.track(&participant, TransportId::from("t1"));
        tracker.track(&participant, TransportId::from("t2"));

        let released = tracker.forget(&participant);
        assert_eq!(released.len(), 2);
        assert!(released.contains(&TransportId::from("t1")));

        let again = tracker.forget(&participant);
        assert!(again.is_empty());
        assert_eq!(tracker.tracked_total(), 0);
    }

    #[test]
    fn test_tracked_ids_stay_disjoint() {
        let tracker = ResourceTracker::new();
        let alice = ParticipantId::new();
        let bob = ParticipantId::new();

        tracker.track(&alice, TransportId::from("t1"));
        // Bob may not claim Alice's transport.
        tracker.track(&bob, TransportId::from("t1"));

        assert!(tracker.owns(&alice, &TransportId::from("t1")));
        assert!(!tracker.owns(&bob, &TransportId::from("t1")));
        assert_eq!(tracker.tracked_total(), 1);
    }

    #[test]
    fn test_create_forget_accounting() {
        let tracker = ResourceTracker::new();
        let alice = ParticipantId::new();
        let bob = ParticipantId::new();

        for i in 0..5 {
            tracker.track(&alice, TransportId::from(format!("a{i}")));
        }
        for i in 0..3 {
            tracker.track(&bob, TransportId::from(format!("b{i}")));
        }
        assert_eq!(tracker.tracked_total(), 8);

        let released = tracker.forget(&alice);
        assert_eq!(released.len(), 5);
        assert_eq!(tracker.tracked_total(), 3);
    }
}
