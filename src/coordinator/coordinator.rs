/**
 * Top-level per-node event loop: the single owner of the `Fsm` and its
 * `Elevator` record. Every hardware event, every decoded network message,
 * every membership/master-election update and every timer tick passes
 * through this one `cbc::select!`, so exactly one handler runs at a time and
 * no other component ever reaches back in to mutate state directly.
 *
 * Dispatches directly off each typed channel inside the `select!`, with a
 * `#[cfg(test)] pub mod testing` escape hatch for white-box assertions.
 * Membership, reliable delivery, election, and assignment each own their
 * own module; the coordinator only wires them together.
 */
use crossbeam_channel as cbc;
use network_rust::udpnet::peers::PeerUpdate;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::elevator::{Cmd, Fsm};
use crate::master_election::MasterElection;
use crate::network::{
    Assignment, LightOrder, MessageKind, OrderStatus, RawHallCall, StatusBroadcaster,
};
use crate::order_assignment::OrderAssignment;
use crate::registry::{self, StatusRegistry};
use crate::shared::{Button, Direction, ElevatorStatus};

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const PERIODIC_REDUNDANCY: usize = 3;
const CRITICAL_REDUNDANCY: usize = 10;

pub struct Coordinator {
    local_id: String,
    fsm: Fsm,
    registry: StatusRegistry,
    order_assignment: OrderAssignment,
    master_election: MasterElection,
    status_broadcaster: StatusBroadcaster,

    hw_motor_tx: cbc::Sender<Direction>,
    hw_door_lamp_tx: cbc::Sender<bool>,
    hw_button_lamp_tx: cbc::Sender<(u8, Button, bool)>,

    hw_button_rx: cbc::Receiver<(u8, Button)>,
    hw_floor_rx: cbc::Receiver<u8>,
    hw_obstruction_rx: cbc::Receiver<bool>,

    assignment_rx: cbc::Receiver<Assignment>,
    raw_hall_call_rx: cbc::Receiver<RawHallCall>,
    order_status_rx: cbc::Receiver<OrderStatus>,
    light_order_rx: cbc::Receiver<LightOrder>,

    assigned_hall_call_rx: cbc::Receiver<(u8, Button)>,
    local_light_rx: cbc::Receiver<(u8, Button, crate::network::LightState)>,

    peer_update_rx: cbc::Receiver<PeerUpdate>,
    snapshot_rx: cbc::Receiver<BTreeMap<String, ElevatorStatus>>,
    status_rx: cbc::Receiver<ElevatorStatus>,

    coordinator_terminate_rx: cbc::Receiver<()>,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_id: String,
        fsm: Fsm,
        registry: StatusRegistry,
        order_assignment: OrderAssignment,
        master_election: MasterElection,
        status_broadcaster: StatusBroadcaster,
        hw_motor_tx: cbc::Sender<Direction>,
        hw_door_lamp_tx: cbc::Sender<bool>,
        hw_button_lamp_tx: cbc::Sender<(u8, Button, bool)>,
        hw_button_rx: cbc::Receiver<(u8, Button)>,
        hw_floor_rx: cbc::Receiver<u8>,
        hw_obstruction_rx: cbc::Receiver<bool>,
        assignment_rx: cbc::Receiver<Assignment>,
        raw_hall_call_rx: cbc::Receiver<RawHallCall>,
        order_status_rx: cbc::Receiver<OrderStatus>,
        light_order_rx: cbc::Receiver<LightOrder>,
        assigned_hall_call_rx: cbc::Receiver<(u8, Button)>,
        local_light_rx: cbc::Receiver<(u8, Button, crate::network::LightState)>,
        peer_update_rx: cbc::Receiver<PeerUpdate>,
        snapshot_rx: cbc::Receiver<BTreeMap<String, ElevatorStatus>>,
        status_rx: cbc::Receiver<ElevatorStatus>,
        coordinator_terminate_rx: cbc::Receiver<()>,
    ) -> Coordinator {
        Coordinator {
            local_id,
            fsm,
            registry,
            order_assignment,
            master_election,
            status_broadcaster,
            hw_motor_tx,
            hw_door_lamp_tx,
            hw_button_lamp_tx,
            hw_button_rx,
            hw_floor_rx,
            hw_obstruction_rx,
            assignment_rx,
            raw_hall_call_rx,
            order_status_rx,
            light_order_rx,
            assigned_hall_call_rx,
            local_light_rx,
            peer_update_rx,
            snapshot_rx,
            status_rx,
            coordinator_terminate_rx,
        }
    }

    /// Reads the driver's boot-time floor/obstruction state and runs the
    /// FSM's init sequence. Must be called once before `run`.
    pub fn init(&mut self, floor: Option<i32>, obstructed: bool) {
        let cmds = self.fsm.init(floor.unwrap_or(-1), obstructed);
        self.apply(cmds);
    }

    pub fn run(mut self) {
        loop {
            cbc::select! {
                recv(self.hw_floor_rx) -> floor => {
                    match floor {
                        Ok(f) => { let cmds = self.fsm.on_floor_sensor(f); self.apply(cmds); }
                        Err(e) => { log::error!("hw_floor_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.hw_button_rx) -> press => {
                    match press {
                        Ok((floor, Button::Cab)) => { let cmds = self.fsm.on_cab_press(floor); self.apply(cmds); }
                        Ok((floor, button)) => self.order_assignment.handle_local_hall_call(floor, button),
                        Err(e) => { log::error!("hw_button_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.hw_obstruction_rx) -> obstruction => {
                    match obstruction {
                        Ok(o) => { let cmds = self.fsm.on_obstruction(o); self.apply(cmds); }
                        Err(e) => { log::error!("hw_obstruction_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.assignment_rx) -> msg => {
                    match msg {
                        Ok(a) if a.target_id == self.local_id => {
                            self.order_assignment.ack_master(a.seq);
                            if !self.order_assignment.is_duplicate(MessageKind::Assignment, a.seq) {
                                let cmds = self.fsm.on_assignment(a.floor, a.button);
                                self.apply(cmds);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => { log::error!("assignment_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.raw_hall_call_rx) -> msg => {
                    match msg {
                        Ok(r) if r.target_id == self.local_id => {
                            self.order_assignment.handle_raw_hall_call(&r.sender_id, r.seq, r.floor, r.button);
                        }
                        Ok(_) => {}
                        Err(e) => { log::error!("raw_hall_call_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.order_status_rx) -> msg => {
                    match msg {
                        Ok(o) => self.order_assignment.handle_order_status(&o.sender_id, o.seq, o.floor, o.button, o.status),
                        Err(e) => { log::error!("order_status_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.light_order_rx) -> msg => {
                    match msg {
                        Ok(l) if l.target_id == self.local_id => {
                            self.order_assignment.ack_master(l.seq);
                            if !self.order_assignment.is_duplicate(MessageKind::LightOrder, l.seq) {
                                let cmds = self.fsm.on_light_order(l.floor, l.button, l.light);
                                self.apply(cmds);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => { log::error!("light_order_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.assigned_hall_call_rx) -> msg => {
                    match msg {
                        Ok((floor, button)) => { let cmds = self.fsm.on_assignment(floor, button); self.apply(cmds); }
                        Err(e) => { log::error!("assigned_hall_call_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.local_light_rx) -> msg => {
                    match msg {
                        Ok((floor, button, light)) => { let cmds = self.fsm.on_light_order(floor, button, light); self.apply(cmds); }
                        Err(e) => { log::error!("local_light_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.peer_update_rx) -> update => {
                    match update {
                        Ok(u) => {
                            self.registry.update_membership(&u.new, &u.lost);
                            for lost in &u.lost {
                                self.order_assignment.reassign_lost_peer(lost);
                            }
                            for joined in &u.new {
                                self.order_assignment.restore_joined_peer(joined);
                            }
                        }
                        Err(e) => { log::error!("peer_update_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.snapshot_rx) -> snapshot => {
                    match snapshot {
                        Ok(snap) => {
                            if let Some(new_master) = self.master_election.on_snapshot(&snap, &self.local_id) {
                                self.order_assignment.set_master(new_master);
                            }
                        }
                        Err(e) => { log::error!("snapshot_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.status_rx) -> msg => {
                    match msg {
                        Ok(status) if status.id != self.local_id => self.registry.ingest(status),
                        Ok(_) => {}
                        Err(e) => { log::error!("status_rx: {}", e); std::process::exit(1); }
                    }
                }
                recv(self.coordinator_terminate_rx) -> _ => {
                    break;
                }
                default(TICK_INTERVAL) => {
                    let cmds = self.fsm.poll_timers();
                    self.apply(cmds);
                    self.publish_status(false);
                }
            }
        }
    }

    fn apply(&mut self, cmds: Vec<Cmd>) {
        for cmd in cmds {
            match cmd {
                Cmd::Motor(dir) => { let _ = self.hw_motor_tx.send(dir); }
                Cmd::DoorLamp(on) => { let _ = self.hw_door_lamp_tx.send(on); }
                Cmd::ButtonLamp(floor, button, on) => { let _ = self.hw_button_lamp_tx.send((floor, button, on)); }
                Cmd::OrderStatus(floor, button, status) => {
                    self.order_assignment.report_order_status(floor, button, status);
                }
                Cmd::PublishStatus { critical } => self.publish_status(critical),
                Cmd::Fatal(reason) => {
                    log::error!("fatal: {}", reason);
                    std::process::exit(1);
                }
            }
        }
    }

    fn publish_status(&mut self, critical: bool) {
        let status = self.fsm.status(&self.local_id, registry::now_ms());
        self.registry.ingest(status.clone());
        let redundancy = if critical { CRITICAL_REDUNDANCY } else { PERIODIC_REDUNDANCY };
        self.status_broadcaster.publish(status, redundancy);
    }
}

#[cfg(test)]
pub mod testing {
    use super::Coordinator;

    impl Coordinator {
        pub fn test_fsm(&self) -> &crate::elevator::Fsm {
            &self.fsm
        }
    }
}
