/**
 * Typed send/receive over UDP broadcast, one port per message kind.
 *
 * Each port gets one transmit thread and one receive thread. Transmit
 * forwards whatever arrives on its channel straight to the broadcast
 * socket; receive decodes and forwards, dropping anything that fails to
 * deserialize. Neither thread blocks the caller.
 */
use crossbeam_channel as cbc;
use network_rust::udpnet::bcast;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::thread::Builder;

/// Spawns the transmitter for `port`. Whatever is sent on `rx` goes out as
/// a broadcast datagram. Exits the process if the socket cannot be set up -
/// every node needs every port to function.
pub fn spawn_tx<T>(name: &str, port: u16, rx: cbc::Receiver<T>)
where
    T: Serialize + Clone + Send + 'static,
{
    let thread_name = format!("wire-tx-{}", name);
    Builder::new()
        .name(thread_name)
        .spawn(move || {
            if bcast::tx(port, rx).is_err() {
                log::error!("wire tx on port {} failed to start", port);
                std::process::exit(1);
            }
        })
        .expect("failed to spawn wire tx thread");
}

/// Spawns the receiver for `port`. Decoded values are forwarded on `tx`;
/// datagrams that fail to decode are silently dropped by `bcast::rx`.
pub fn spawn_rx<T>(name: &str, port: u16, tx: cbc::Sender<T>)
where
    T: DeserializeOwned + Send + 'static,
{
    let thread_name = format!("wire-rx-{}", name);
    Builder::new()
        .name(thread_name)
        .spawn(move || {
            if bcast::rx(port, tx).is_err() {
                log::error!("wire rx on port {} failed to start", port);
                std::process::exit(1);
            }
        })
        .expect("failed to spawn wire rx thread");
}
