/**
 * `ElevatorStatus` broadcast: the one wire message that never uses the
 * reliable path. Sent redundantly (3x on the periodic tick, 10x on a
 * critical state change) with no ack and no retry - staleness is resolved
 * by `StatusRegistry::ingest` simply overwriting with whatever is latest.
 */
use crossbeam_channel as cbc;

use crate::shared::ElevatorStatus;

use super::wire;

pub struct StatusBroadcaster {
    tx: cbc::Sender<ElevatorStatus>,
}

impl StatusBroadcaster {
    pub fn new(port: u16) -> (StatusBroadcaster, cbc::Receiver<ElevatorStatus>) {
        let (tx, tx_rx) = cbc::unbounded::<ElevatorStatus>();
        wire::spawn_tx("status", port, tx_rx);

        let (rx_tx, rx) = cbc::unbounded::<ElevatorStatus>();
        wire::spawn_rx("status", port, rx_tx);

        (StatusBroadcaster { tx }, rx)
    }

    pub fn publish(&self, status: ElevatorStatus, redundancy: usize) {
        for _ in 0..redundancy {
            let _ = self.tx.send(status.clone());
        }
    }
}
