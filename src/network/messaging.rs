/**
 * Reliable messaging over the unreliable broadcast `Wire`: per-kind
 * sequence numbers, redundant bursts, bounded exponential-backoff retries,
 * a pending-ack waiter table, and receive-side duplicate suppression.
 *
 * One reusable send/ack path shared by every reliable message kind instead
 * of a copy-pasted retry loop per kind.
 */
use crossbeam_channel as cbc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, Builder};
use std::time::{Duration, Instant};

use crate::config::NetworkConfig;
use crate::shared::Button;

use super::wire;

/***************************************/
/*           Wire message kinds        */
/***************************************/
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Assignment {
    pub target_id: String,
    pub floor: u8,
    pub button: Button,
    pub seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RawHallCall {
    pub target_id: String,
    pub sender_id: String,
    pub floor: u8,
    pub button: Button,
    pub seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum OrderStatusKind {
    Unfinished,
    Finished,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OrderStatus {
    pub sender_id: String,
    pub floor: u8,
    pub button: Button,
    pub status: OrderStatusKind,
    pub seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum LightState {
    On,
    Off,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LightOrder {
    pub target_id: String,
    pub floor: u8,
    pub button: Button,
    pub light: LightState,
    pub seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Ack {
    pub target_id: String,
    pub seq: u64,
}

/// Disambiguates the dedup/ack tables across kinds even though sequence
/// numbers are drawn from disjoint per-kind ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Assignment,
    RawHallCall,
    OrderStatus,
    LightOrder,
}

// Disjoint bases so a log line's sequence number alone identifies its kind.
const SEQ_BASE_ASSIGNMENT: u64 = 0;
const SEQ_BASE_RAW_HALL_CALL: u64 = 1_000_000;
const SEQ_BASE_ORDER_STATUS: u64 = 2_000_000;
const SEQ_BASE_LIGHT_ORDER: u64 = 3_000_000;

type PendingAcks = Arc<Mutex<HashMap<u64, cbc::Sender<()>>>>;
type RecentlyProcessed = Arc<Mutex<HashMap<(MessageKind, u64), Instant>>>;

/***************************************/
/*             Public API              */
/***************************************/
pub struct ReliableMessaging {
    local_id: String,
    config: NetworkConfig,

    assignment_tx: cbc::Sender<Assignment>,
    raw_hall_call_tx: cbc::Sender<RawHallCall>,
    order_status_tx: cbc::Sender<OrderStatus>,
    light_order_tx: cbc::Sender<LightOrder>,
    ack_tx: cbc::Sender<Ack>,

    seq_assignment: Arc<AtomicU64>,
    seq_raw_hall_call: Arc<AtomicU64>,
    seq_order_status: Arc<AtomicU64>,
    seq_light_order: Arc<AtomicU64>,

    pending_acks: PendingAcks,
    recently_processed: RecentlyProcessed,
}

impl ReliableMessaging {
    /// Spawns a transmit and a receive thread for every reliable port, plus
    /// the ack-dispatch and dedup-reaper background tasks, and returns the
    /// handle alongside the decoded receive channels for each inbound kind.
    #[allow(clippy::type_complexity)]
    pub fn new(
        config: &NetworkConfig,
        local_id: String,
    ) -> (
        ReliableMessaging,
        cbc::Receiver<Assignment>,
        cbc::Receiver<RawHallCall>,
        cbc::Receiver<OrderStatus>,
        cbc::Receiver<LightOrder>,
    ) {
        let (assignment_tx, assignment_tx_rx) = cbc::unbounded::<Assignment>();
        let (raw_hall_call_tx, raw_hall_call_tx_rx) = cbc::unbounded::<RawHallCall>();
        let (order_status_tx, order_status_tx_rx) = cbc::unbounded::<OrderStatus>();
        let (light_order_tx, light_order_tx_rx) = cbc::unbounded::<LightOrder>();
        let (ack_tx, ack_tx_rx) = cbc::unbounded::<Ack>();

        wire::spawn_tx("assignment", config.assignment_port, assignment_tx_rx);
        wire::spawn_tx("raw-hall-call", config.raw_hall_call_port, raw_hall_call_tx_rx);
        wire::spawn_tx("order-status", config.order_status_port, order_status_tx_rx);
        wire::spawn_tx("light-order", config.light_port, light_order_tx_rx);
        wire::spawn_tx("ack", config.ack_port, ack_tx_rx);

        let (assignment_rx_tx, assignment_rx) = cbc::unbounded::<Assignment>();
        let (raw_hall_call_rx_tx, raw_hall_call_rx) = cbc::unbounded::<RawHallCall>();
        let (order_status_rx_tx, order_status_rx) = cbc::unbounded::<OrderStatus>();
        let (light_order_rx_tx, light_order_rx) = cbc::unbounded::<LightOrder>();
        let (ack_rx_tx, ack_rx) = cbc::unbounded::<Ack>();

        wire::spawn_rx("assignment", config.assignment_port, assignment_rx_tx);
        wire::spawn_rx("raw-hall-call", config.raw_hall_call_port, raw_hall_call_rx_tx);
        wire::spawn_rx("order-status", config.order_status_port, order_status_rx_tx);
        wire::spawn_rx("light-order", config.light_port, light_order_rx_tx);
        wire::spawn_rx("ack", config.ack_port, ack_rx_tx);

        let pending_acks: PendingAcks = Arc::new(Mutex::new(HashMap::new()));
        let recently_processed: RecentlyProcessed = Arc::new(Mutex::new(HashMap::new()));

        spawn_ack_dispatcher(ack_rx, local_id.clone(), pending_acks.clone());
        spawn_dedup_reaper(recently_processed.clone(), config.dedup_ttl_ms);

        let messaging = ReliableMessaging {
            local_id,
            config: config.clone(),
            assignment_tx,
            raw_hall_call_tx,
            order_status_tx,
            light_order_tx,
            ack_tx,
            seq_assignment: Arc::new(AtomicU64::new(SEQ_BASE_ASSIGNMENT)),
            seq_raw_hall_call: Arc::new(AtomicU64::new(SEQ_BASE_RAW_HALL_CALL)),
            seq_order_status: Arc::new(AtomicU64::new(SEQ_BASE_ORDER_STATUS)),
            seq_light_order: Arc::new(AtomicU64::new(SEQ_BASE_LIGHT_ORDER)),
            pending_acks,
            recently_processed,
        };

        (
            messaging,
            assignment_rx,
            raw_hall_call_rx,
            order_status_rx,
            light_order_rx,
        )
    }

    pub fn send_assignment(&self, target_id: &str, floor: u8, button: Button) {
        let seq = self.seq_assignment.fetch_add(1, Ordering::Relaxed);
        let msg = Assignment {
            target_id: target_id.to_string(),
            floor,
            button,
            seq,
        };
        self.reliable_send(self.assignment_tx.clone(), msg, seq);
    }

    /// No-op when `master_id == self.local_id`: a master never forwards a
    /// call to itself, it assigns it in-process instead.
    pub fn send_raw_hall_call(&self, master_id: &str, floor: u8, button: Button) {
        if master_id == self.local_id {
            return;
        }
        let seq = self.seq_raw_hall_call.fetch_add(1, Ordering::Relaxed);
        let msg = RawHallCall {
            target_id: master_id.to_string(),
            sender_id: self.local_id.clone(),
            floor,
            button,
            seq,
        };
        self.reliable_send(self.raw_hall_call_tx.clone(), msg, seq);
    }

    pub fn send_order_status(&self, floor: u8, button: Button, status: OrderStatusKind) {
        let seq = self.seq_order_status.fetch_add(1, Ordering::Relaxed);
        let msg = OrderStatus {
            sender_id: self.local_id.clone(),
            floor,
            button,
            status,
            seq,
        };
        self.reliable_send(self.order_status_tx.clone(), msg, seq);
    }

    pub fn send_light_order(&self, target_id: &str, floor: u8, button: Button, light: LightState) {
        let seq = self.seq_light_order.fetch_add(1, Ordering::Relaxed);
        let msg = LightOrder {
            target_id: target_id.to_string(),
            floor,
            button,
            light,
            seq,
        };
        self.reliable_send(self.light_order_tx.clone(), msg, seq);
    }

    /// Bursts an ack back at the sender of an accepted message. Acks are
    /// fire-and-forget: never themselves acknowledged or retried.
    pub fn send_ack(&self, target_id: &str, seq: u64) {
        let ack_tx = self.ack_tx.clone();
        let target_id = target_id.to_string();
        let redundancy = self.config.ack_redundancy;
        thread::spawn(move || {
            for _ in 0..redundancy {
                let _ = ack_tx.send(Ack {
                    target_id: target_id.clone(),
                    seq,
                });
                thread::sleep(Duration::from_millis(10));
            }
        });
    }

    /// Returns `true` if `seq` of `kind` was already processed within the
    /// dedup TTL, and records it as seen either way. Callers should drop
    /// the message when this returns `true`.
    pub fn is_duplicate(&self, kind: MessageKind, seq: u64) -> bool {
        let mut table = self.recently_processed.lock().unwrap();
        let now = Instant::now();
        if let Some(seen_at) = table.get(&(kind, seq)) {
            if now.duration_since(*seen_at) < Duration::from_millis(self.config.dedup_ttl_ms) {
                return true;
            }
        }
        table.insert((kind, seq), now);
        false
    }

    fn reliable_send<T>(&self, tx: cbc::Sender<T>, msg: T, seq: u64)
    where
        T: Clone + Send + 'static,
    {
        let (done_tx, done_rx) = cbc::bounded::<()>(1);
        self.pending_acks.lock().unwrap().insert(seq, done_tx);

        let pending_acks = self.pending_acks.clone();
        let max_retries = self.config.max_retries;
        let redundancy = self.config.redundancy;
        let mut interval = Duration::from_millis(self.config.retry_interval_ms);
        let backoff = self.config.retry_backoff;

        thread::spawn(move || {
            for attempt in 0..max_retries {
                for _ in 0..redundancy {
                    let _ = tx.send(msg.clone());
                }
                match done_rx.recv_timeout(interval) {
                    Ok(_) => {
                        pending_acks.lock().unwrap().remove(&seq);
                        return;
                    }
                    Err(_) => {
                        log::debug!(
                            "no ack for seq {} after attempt {}/{}, backing off",
                            seq,
                            attempt + 1,
                            max_retries
                        );
                        interval *= backoff;
                    }
                }
            }
            pending_acks.lock().unwrap().remove(&seq);
            log::warn!("gave up waiting for ack of seq {} after {} attempts", seq, max_retries);
        });
    }
}

fn spawn_ack_dispatcher(ack_rx: cbc::Receiver<Ack>, local_id: String, pending_acks: PendingAcks) {
    Builder::new()
        .name("ack-dispatch".into())
        .spawn(move || loop {
            match ack_rx.recv() {
                Ok(ack) => {
                    if ack.target_id != local_id {
                        continue;
                    }
                    if let Some(waiter) = pending_acks.lock().unwrap().remove(&ack.seq) {
                        let _ = waiter.send(());
                    }
                }
                Err(_) => {
                    log::error!("ack receive channel disconnected");
                    std::process::exit(1);
                }
            }
        })
        .expect("failed to spawn ack dispatch thread");
}

fn spawn_dedup_reaper(recently_processed: RecentlyProcessed, ttl_ms: u64) {
    let ttl = Duration::from_millis(ttl_ms);
    Builder::new()
        .name("dedup-reaper".into())
        .spawn(move || loop {
            thread::sleep(ttl);
            let now = Instant::now();
            recently_processed
                .lock()
                .unwrap()
                .retain(|_, seen_at| now.duration_since(*seen_at) < ttl);
        })
        .expect("failed to spawn dedup reaper thread");
}
