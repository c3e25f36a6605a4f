/**
 * Deterministic master election: lowest live ID wins. No election
 * messages on the wire, no persisted term - just a pure function over
 * the current registry snapshot plus a cache so the result is only
 * published when it actually changes.
 *
 */
use std::collections::BTreeMap;

use crate::shared::ElevatorStatus;

/// `local_id` is always a candidate even before its own status broadcast
/// has looped back into the snapshot.
pub fn elect(snapshot: &BTreeMap<String, ElevatorStatus>, local_id: &str) -> String {
    let mut lowest = local_id.to_string();
    for id in snapshot.keys() {
        if id < &lowest {
            lowest = id.clone();
        }
    }
    lowest
}

pub struct MasterElection {
    cached: Option<String>,
}

impl MasterElection {
    pub fn new() -> MasterElection {
        MasterElection { cached: None }
    }

    /// Returns `Some(new_master)` only when the elected master differs from
    /// the last one returned, so callers only react to actual transitions.
    pub fn on_snapshot(
        &mut self,
        snapshot: &BTreeMap<String, ElevatorStatus>,
        local_id: &str,
    ) -> Option<String> {
        let elected = elect(snapshot, local_id);
        if self.cached.as_deref() == Some(elected.as_str()) {
            return None;
        }
        self.cached = Some(elected.clone());
        Some(elected)
    }
}

#[cfg(test)]
mod master_election_tests {
    use super::*;
    use crate::registry::now_ms;

    fn snapshot_of(ids: &[&str]) -> BTreeMap<String, ElevatorStatus> {
        ids.iter()
            .map(|id| (id.to_string(), ElevatorStatus::stub(id.to_string(), now_ms())))
            .collect()
    }

    #[test]
    fn lowest_id_wins_including_self() {
        let snapshot = snapshot_of(&["B", "C"]);
        assert_eq!(elect(&snapshot, "A"), "A");
        assert_eq!(elect(&snapshot, "D"), "B");
    }

    #[test]
    fn publishes_only_on_change() {
        let mut election = MasterElection::new();
        let snapshot = snapshot_of(&["B", "C"]);

        assert_eq!(election.on_snapshot(&snapshot, "A"), Some("A".to_string()));
        assert_eq!(election.on_snapshot(&snapshot, "A"), None);

        let snapshot_without_a_relevance = snapshot_of(&["C"]);
        assert_eq!(election.on_snapshot(&snapshot_without_a_relevance, "D"), Some("C".to_string()));
    }
}
