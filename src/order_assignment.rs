/**
 * Order assignment: runs on every node, acts only while `self == master`.
 * Assigns hall calls by simulated-time cost, reassigns a lost peer's hall
 * orders, and restores a returning peer's cab orders from backup.
 *
 */
use crossbeam_channel as cbc;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::config::{ElevatorConfig, NUM_FLOORS};
use crate::cost;
use crate::network::{LightState, MessageKind, OrderStatusKind, ReliableMessaging};
use crate::registry::StatusRegistry;
use crate::shared::{Button, Elevator};

pub struct OrderAssignment {
    local_id: String,
    master_id: Mutex<String>,
    elevator_config: ElevatorConfig,
    registry: StatusRegistry,
    messaging: ReliableMessaging,
    /// Dispatches a call to this node's own FSM when it is both master and
    /// the chosen target - never round-trips through the wire.
    assigned_hall_call_tx: cbc::Sender<(u8, Button)>,
    /// Applies a lamp change to this node's own panel. Fed either from an
    /// inbound `LightOrder` or directly when this node is the master acting
    /// on its own order status.
    local_light_tx: cbc::Sender<(u8, Button, LightState)>,
}

impl OrderAssignment {
    pub fn new(
        local_id: String,
        elevator_config: ElevatorConfig,
        registry: StatusRegistry,
        messaging: ReliableMessaging,
        assigned_hall_call_tx: cbc::Sender<(u8, Button)>,
        local_light_tx: cbc::Sender<(u8, Button, LightState)>,
    ) -> OrderAssignment {
        let master_id = Mutex::new(local_id.clone());
        OrderAssignment {
            local_id,
            master_id,
            elevator_config,
            registry,
            messaging,
            assigned_hall_call_tx,
            local_light_tx,
        }
    }

    pub fn set_master(&self, master_id: String) {
        log::info!("new master: {}", master_id);
        *self.master_id.lock().unwrap() = master_id;
    }

    pub fn master_id(&self) -> String {
        self.master_id.lock().unwrap().clone()
    }

    pub fn is_master(&self) -> bool {
        self.master_id() == self.local_id
    }

    /// Acks a message whose sender is implicitly the master - `Assignment`
    /// and `LightOrder` never carry a `sender_id` field, since only the
    /// master ever sends either.
    pub fn ack_master(&self, seq: u64) {
        self.messaging.send_ack(&self.master_id(), seq);
    }

    /// Lets the coordinator gate its own direct-dispatch receive arms
    /// (`Assignment`, `LightOrder`) on the same dedup table used here for
    /// `RawHallCall`/`OrderStatus` - every reliable send bursts `redundancy`
    /// identical copies, so each kind needs exactly one suppression point.
    pub fn is_duplicate(&self, kind: MessageKind, seq: u64) -> bool {
        self.messaging.is_duplicate(kind, seq)
    }

    /// Reports this node's own order-status transition for `(floor,
    /// button)`. If this node is currently master, it applies the lamp
    /// fan-out in-process without ever putting the message on the wire (see
    /// DESIGN.md open question #2); otherwise it reliably sends
    /// `OrderStatus` to the master.
    pub fn report_order_status(&self, floor: u8, button: Button, status: OrderStatusKind) {
        if self.is_master() {
            self.apply_order_status(floor, button, status);
        } else {
            self.messaging.send_order_status(floor, button, status);
        }
    }

    fn candidates(&self) -> BTreeMap<String, Elevator> {
        self.registry
            .snapshot()
            .iter()
            .map(|(id, status)| (id.clone(), Elevator::from(status)))
            .collect()
    }

    fn dispatch(&self, target: &str, floor: u8, button: Button) {
        if target == self.local_id {
            let _ = self.assigned_hall_call_tx.send((floor, button));
        } else {
            self.messaging.send_assignment(target, floor, button);
        }
    }

    /// A hall button was pressed at the local panel.
    pub fn handle_local_hall_call(&self, floor: u8, button: Button) {
        if self.is_master() {
            let candidates = self.candidates();
            if let Some(target) = cost::best_target(&candidates, floor, button, &self.elevator_config, None) {
                self.dispatch(&target, floor, button);
            } else {
                log::warn!("no live elevator to assign hall call ({}, {:?})", floor, button);
            }
        } else {
            self.messaging.send_raw_hall_call(&self.master_id(), floor, button);
        }
    }

    /// A `RawHallCall` arrived from a slave; only meaningful while master.
    /// Acked on every sight (acks are cheap and fire-and-forget), but the
    /// dedup table still gates the actual assignment so a burst of
    /// `redundancy` identical copies yields exactly one `Assignment`.
    pub fn handle_raw_hall_call(&self, sender_id: &str, seq: u64, floor: u8, button: Button) {
        self.messaging.send_ack(sender_id, seq);
        if self.messaging.is_duplicate(MessageKind::RawHallCall, seq) {
            return;
        }
        if !self.is_master() {
            return;
        }
        self.handle_local_hall_call(floor, button);
    }

    /// An `OrderStatus` arrived over the wire from the node that owns the
    /// order. Only the master acts on it; every other node drops it after
    /// acking (which keeps the sender's retry loop from spinning forever
    /// even during a stale master belief).
    pub fn handle_order_status(&self, sender_id: &str, seq: u64, floor: u8, button: Button, status: OrderStatusKind) {
        self.messaging.send_ack(sender_id, seq);
        if self.messaging.is_duplicate(MessageKind::OrderStatus, seq) {
            return;
        }
        if !self.is_master() {
            return;
        }
        self.apply_order_status(floor, button, status);
    }

    /// Common path for an order-status transition, used both for wire
    /// arrivals (above) and for the master's own orders, which are never
    /// placed on the wire (see DESIGN.md open question #2).
    pub fn apply_order_status(&self, floor: u8, button: Button, status: OrderStatusKind) {
        let light = match status {
            OrderStatusKind::Unfinished => LightState::On,
            OrderStatusKind::Finished => LightState::Off,
        };
        let _ = self.local_light_tx.send((floor, button, light));

        for id in self.registry.snapshot().keys() {
            if id != &self.local_id {
                self.messaging.send_light_order(id, floor, button, light);
            }
        }
    }

    /// A peer was just declared lost. Its hall orders (never its cab
    /// orders) are redistributed among the remaining live elevators.
    pub fn reassign_lost_peer(&self, lost_id: &str) {
        if !self.is_master() {
            return;
        }
        let backup = self.registry.backup_snapshot();
        let Some(status) = backup.get(lost_id) else {
            return;
        };
        let candidates = self.candidates();
        for floor in 0..NUM_FLOORS {
            for button in [Button::HallUp, Button::HallDown] {
                if status.queue[floor as usize][button.index()] {
                    match cost::best_target(&candidates, floor, button, &self.elevator_config, Some(lost_id)) {
                        Some(target) => {
                            log::info!(
                                "reassigning hall call ({}, {:?}) from lost {} to {}",
                                floor,
                                button,
                                lost_id,
                                target
                            );
                            self.dispatch(&target, floor, button);
                        }
                        None => log::warn!(
                            "no live elevator to take over hall call ({}, {:?}) from lost {}",
                            floor,
                            button,
                            lost_id
                        ),
                    }
                }
            }
        }
    }

    /// A peer rejoined. Its previously-owned cab calls are reassigned to
    /// it directly so the panel lights back up and the calls are served.
    pub fn restore_joined_peer(&self, joined_id: &str) {
        if !self.is_master() {
            return;
        }
        let backup = self.registry.backup_snapshot();
        if let Some(status) = backup.get(joined_id) {
            for floor in 0..NUM_FLOORS {
                if status.queue[floor as usize][Button::Cab.index()] {
                    log::info!("restoring cab call (floor {}) to rejoined {}", floor, joined_id);
                    self.messaging.send_assignment(joined_id, floor, Button::Cab);
                }
            }
        }
        self.registry.clear_backup(joined_id);
    }
}

#[cfg(test)]
mod order_assignment_tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::registry::now_ms;
    use crate::shared::ElevatorStatus;
    use crossbeam_channel::unbounded;

    fn elevator_config() -> ElevatorConfig {
        ElevatorConfig {
            door_open_time_ms: 3000,
            not_moving_time_limit_ms: 8000,
            obstruction_time_limit_ms: 4000,
            travel_time_s: 4,
        }
    }

    fn network_config(base_port: u16) -> NetworkConfig {
        NetworkConfig {
            status_port: base_port,
            peer_port: base_port + 1,
            assignment_port: base_port + 2,
            raw_hall_call_port: base_port + 3,
            ack_port: base_port + 4,
            order_status_port: base_port + 5,
            light_port: base_port + 6,
            peer_beacon_interval_ms: 15,
            peer_timeout_ms: 2000,
            registry_snapshot_ms: 500,
            max_retries: 5,
            retry_interval_ms: 200,
            retry_backoff: 2,
            redundancy: 4,
            ack_redundancy: 5,
            dedup_ttl_ms: 10000,
        }
    }

    /// Every test gets its own port block - each `setup()` binds real
    /// sockets, and tests run concurrently within the same process.
    fn setup(local_id: &str, base_port: u16) -> (OrderAssignment, cbc::Receiver<(u8, Button)>, cbc::Receiver<(u8, Button, LightState)>) {
        let registry = StatusRegistry::new();
        let (messaging, _assignment_rx, _raw_hall_call_rx, _order_status_rx, _light_order_rx) =
            ReliableMessaging::new(&network_config(base_port), local_id.to_string());
        let (assigned_hall_call_tx, assigned_hall_call_rx) = unbounded();
        let (local_light_tx, local_light_rx) = unbounded();
        let order_assignment = OrderAssignment::new(
            local_id.to_string(),
            elevator_config(),
            registry,
            messaging,
            assigned_hall_call_tx,
            local_light_tx,
        );
        (order_assignment, assigned_hall_call_rx, local_light_rx)
    }

    #[test]
    fn a_new_node_starts_out_believing_itself_master() {
        let (oa, _, _) = setup("A", 33000);
        assert!(oa.is_master());
        assert_eq!(oa.master_id(), "A");
    }

    #[test]
    fn master_assigns_local_hall_call_to_itself_directly() {
        let (oa, assigned_rx, _) = setup("A", 33100);
        oa.registry.ingest(ElevatorStatus::stub("A".to_string(), now_ms()));

        oa.handle_local_hall_call(2, Button::HallUp);

        assert_eq!(assigned_rx.recv().unwrap(), (2, Button::HallUp));
    }

    #[test]
    fn non_master_own_order_status_is_applied_in_process_when_master() {
        let (oa, _, light_rx) = setup("A", 33200);
        oa.registry.ingest(ElevatorStatus::stub("A".to_string(), now_ms()));

        oa.report_order_status(1, Button::HallDown, OrderStatusKind::Unfinished);

        // apply_order_status fans out to every OTHER live id; none here, but
        // it always updates this node's own lamp via local_light_tx.
        assert_eq!(light_rx.recv().unwrap(), (1, Button::HallDown, LightState::On));
    }

    #[test]
    fn a_repeated_raw_hall_call_sequence_number_yields_one_assignment() {
        let (oa, assigned_rx, _) = setup("A", 33400);
        oa.registry.ingest(ElevatorStatus::stub("A".to_string(), now_ms()));

        oa.handle_raw_hall_call("B", 9, 2, Button::HallUp);
        oa.handle_raw_hall_call("B", 9, 2, Button::HallUp);

        assert_eq!(assigned_rx.recv().unwrap(), (2, Button::HallUp));
        assert!(assigned_rx.try_recv().is_err());
    }

    #[test]
    fn a_repeated_order_status_sequence_number_lights_the_lamp_once() {
        let (oa, _, light_rx) = setup("A", 33500);
        oa.registry.ingest(ElevatorStatus::stub("A".to_string(), now_ms()));

        oa.handle_order_status("B", 4, 1, Button::HallDown, OrderStatusKind::Unfinished);
        oa.handle_order_status("B", 4, 1, Button::HallDown, OrderStatusKind::Unfinished);

        assert_eq!(light_rx.recv().unwrap(), (1, Button::HallDown, LightState::On));
        assert!(light_rx.try_recv().is_err());
    }

    #[test]
    fn reassign_lost_peer_is_a_no_op_for_a_non_master() {
        let (oa, assigned_rx, _) = setup("B", 33300);
        oa.set_master("A".to_string());
        oa.reassign_lost_peer("C");
        assert!(assigned_rx.try_recv().is_err());
    }
}
