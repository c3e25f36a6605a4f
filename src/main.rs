/**
 * Process entry point: loads configuration, stands up every networked
 * subsystem and the hardware driver, takes one boot-time hardware reading,
 * then hands everything to the coordinator's event loop.
 *
 * Wires together the reliable-messaging, status-broadcast, peer-monitor,
 * and master-election stack before handing control to the coordinator.
 */
use crossbeam_channel as cbc;
use std::thread::Builder;

mod config;
mod coordinator;
mod cost;
mod elevator;
mod master_election;
mod network;
mod order_assignment;
mod registry;
mod shared;

use coordinator::Coordinator;
use elevator::{ElevatorDriver, Fsm};
use master_election::MasterElection;
use network::{PeerMonitor, ReliableMessaging, StatusBroadcaster};
use order_assignment::OrderAssignment;
use registry::StatusRegistry;

fn main() {
    env_logger::init();

    let config = config::load_config();
    let local_id = config::local_id();
    log::info!("starting elevator node {}", local_id);

    let (hw_motor_tx, hw_motor_rx) = cbc::unbounded();
    let (hw_door_lamp_tx, hw_door_lamp_rx) = cbc::unbounded();
    let (hw_button_lamp_tx, hw_button_lamp_rx) = cbc::unbounded();
    let (hw_button_tx, hw_button_rx) = cbc::unbounded();
    let (hw_floor_tx, hw_floor_rx) = cbc::unbounded();
    let (hw_obstruction_tx, hw_obstruction_rx) = cbc::unbounded();
    // The process only ever exits via `std::process::exit`, so nothing
    // ever sends on this; it exists to satisfy the driver's shutdown path.
    let (_hw_terminate_tx, hw_terminate_rx) = cbc::unbounded();

    let driver = ElevatorDriver::new(
        &config.hardware,
        hw_motor_rx,
        hw_door_lamp_rx,
        hw_button_lamp_rx,
        hw_button_tx,
        hw_floor_tx,
        hw_obstruction_tx,
        hw_terminate_rx,
    );
    // Taken before the driver moves onto its own thread, so the FSM's init
    // sequence can reveal a boot-time door-open at the real floor instead
    // of always assuming an unknown position.
    let initial_floor = driver.initial_floor();
    let initial_obstruction = driver.initial_obstruction();
    Builder::new()
        .name("hardware".into())
        .spawn(move || driver.run())
        .expect("failed to spawn hardware thread");

    let registry = StatusRegistry::new();
    let snapshot_rx = registry.spawn_periodic_snapshot(config.network.registry_snapshot_ms);

    let (messaging, assignment_rx, raw_hall_call_rx, order_status_rx, light_order_rx) =
        ReliableMessaging::new(&config.network, local_id.clone());
    let (status_broadcaster, status_rx) = StatusBroadcaster::new(config.network.status_port);
    let (_peer_monitor, peer_update_rx) = PeerMonitor::new(config.network.peer_port, local_id.clone());

    let (assigned_hall_call_tx, assigned_hall_call_rx) = cbc::unbounded();
    let (local_light_tx, local_light_rx) = cbc::unbounded();
    let order_assignment = OrderAssignment::new(
        local_id.clone(),
        config.elevator.clone(),
        registry.clone(),
        messaging,
        assigned_hall_call_tx,
        local_light_tx,
    );

    let fsm = Fsm::new(&config.elevator);
    // Likewise: the coordinator only ever stops via a fatal exit, never a
    // graceful one, so no one sends on this in production.
    let (_coordinator_terminate_tx, coordinator_terminate_rx) = cbc::unbounded();

    let mut coordinator = Coordinator::new(
        local_id,
        fsm,
        registry,
        order_assignment,
        MasterElection::new(),
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
    );

    coordinator.init(initial_floor.map(|f| f as i32), initial_obstruction);
    coordinator.run();
}
