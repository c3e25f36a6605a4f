/**
 * Membership / status registry: `live` tracks every currently-reachable
 * peer's last broadcast status; `backup` retains the status of a peer at
 * the moment it was declared lost, so its cab calls can be restored if it
 * rejoins.
 */
use crossbeam_channel as cbc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread::Builder;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::shared::ElevatorStatus;

pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis()
}

#[derive(Clone)]
pub struct StatusRegistry {
    // BTreeMap keeps ascending-ID iteration order, which is the documented
    // cost-function tie-break (see cost::best_target).
    live: Arc<Mutex<BTreeMap<String, ElevatorStatus>>>,
    backup: Arc<Mutex<BTreeMap<String, ElevatorStatus>>>,
}

impl StatusRegistry {
    pub fn new() -> StatusRegistry {
        StatusRegistry {
            live: Arc::new(Mutex::new(BTreeMap::new())),
            backup: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Applies a peer-monitor update: newly-lost peers are copied into the
    /// backup map and dropped from live; newly-joined peers get a stub
    /// entry so the snapshot always contains every live ID, even before its
    /// first status broadcast arrives.
    pub fn update_membership(&self, new: &[String], lost: &[String]) {
        let mut live = self.live.lock().unwrap();
        let mut backup = self.backup.lock().unwrap();

        for id in lost {
            if let Some(status) = live.remove(id) {
                log::info!("backing up lost elevator {}", id);
                backup.insert(id.clone(), status);
            }
        }
        for id in new {
            if !live.contains_key(id) {
                log::info!("adding new elevator {} to status map", id);
                live.insert(id.clone(), ElevatorStatus::stub(id.clone(), now_ms()));
            }
        }
    }

    /// Overwrites the live entry unconditionally: latest datagram wins.
    pub fn ingest(&self, status: ElevatorStatus) {
        self.live.lock().unwrap().insert(status.id.clone(), status);
    }

    pub fn snapshot(&self) -> BTreeMap<String, ElevatorStatus> {
        self.live.lock().unwrap().clone()
    }

    pub fn backup_snapshot(&self) -> BTreeMap<String, ElevatorStatus> {
        self.backup.lock().unwrap().clone()
    }

    /// Drops a peer's backup entry once its cab calls have been restored.
    pub fn clear_backup(&self, id: &str) {
        self.backup.lock().unwrap().remove(id);
    }

    /// Publishes a deep copy of `live` every `interval_ms` on the returned
    /// channel, for Order Assignment and Master Election to consume.
    pub fn spawn_periodic_snapshot(
        &self,
        interval_ms: u64,
    ) -> cbc::Receiver<BTreeMap<String, ElevatorStatus>> {
        let (tx, rx) = cbc::unbounded();
        let live = self.live.clone();
        let interval = Duration::from_millis(interval_ms);
        Builder::new()
            .name("registry-snapshot".into())
            .spawn(move || loop {
                let copy = live.lock().unwrap().clone();
                if tx.send(copy).is_err() {
                    return;
                }
                std::thread::sleep(interval);
            })
            .expect("failed to spawn registry snapshot thread");
        rx
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    #[test]
    fn lost_peer_is_backed_up_and_removed_from_live() {
        let registry = StatusRegistry::new();
        registry.update_membership(&["A".to_string()], &[]);
        registry.ingest(ElevatorStatus::stub("A".to_string(), now_ms()));

        registry.update_membership(&[], &["A".to_string()]);

        assert!(!registry.snapshot().contains_key("A"));
        assert!(registry.backup_snapshot().contains_key("A"));
    }

    #[test]
    fn rejoining_peer_gets_a_stub_entry() {
        let registry = StatusRegistry::new();
        registry.update_membership(&["B".to_string()], &[]);
        assert!(registry.snapshot().contains_key("B"));
    }

    #[test]
    fn ingest_overwrites_regardless_of_membership() {
        let registry = StatusRegistry::new();
        let mut status = ElevatorStatus::stub("C".to_string(), now_ms());
        status.floor = 2;
        registry.ingest(status);
        assert_eq!(registry.snapshot().get("C").unwrap().floor, 2);
    }
}
