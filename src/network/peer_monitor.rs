/**
 * Peer membership tracking: a thin wrapper around the beacon
 * transmitter/receiver pair that forwards `{peers, new, lost}` updates
 * whenever the live set changes.
 */
use crossbeam_channel as cbc;
use network_rust::udpnet::peers;
use std::thread::Builder;

pub use peers::PeerUpdate;

pub struct PeerMonitor {
    /// Kept alive so `peers::tx`'s enable channel is never dropped; this
    /// node's beacon always stays enabled.
    _enable_tx: cbc::Sender<bool>,
}

impl PeerMonitor {
    /// Starts beaconing `local_id` on `port` and returns a receiver of
    /// peer-update events decoded from the same port.
    pub fn new(port: u16, local_id: String) -> (PeerMonitor, cbc::Receiver<PeerUpdate>) {
        let (enable_tx, enable_rx) = cbc::unbounded::<bool>();
        let (update_tx, update_rx) = cbc::unbounded::<PeerUpdate>();

        Builder::new()
            .name("peer-tx".into())
            .spawn(move || {
                if peers::tx(port, local_id, enable_rx).is_err() {
                    log::error!("peer beacon on port {} failed to start", port);
                    std::process::exit(1);
                }
            })
            .expect("failed to spawn peer tx thread");

        Builder::new()
            .name("peer-rx".into())
            .spawn(move || {
                if peers::rx(port, update_tx).is_err() {
                    log::error!("peer receiver on port {} failed to start", port);
                    std::process::exit(1);
                }
            })
            .expect("failed to spawn peer rx thread");

        (
            PeerMonitor {
                _enable_tx: enable_tx,
            },
            update_rx,
        )
    }
}
