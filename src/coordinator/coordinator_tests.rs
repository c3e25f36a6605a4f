/*
 * Unit tests for the coordinator's top-level event loop.
 *
 * Follows the Arrange/Act/Assert pattern with mock channels, wired through
 * a `setup()` harness that returns the unit under test plus its endpoints.
 */
#[cfg(test)]
mod coordinator_tests {
    use crate::config::{ElevatorConfig, NetworkConfig};
    use crate::coordinator::Coordinator;
    use crate::elevator::Fsm;
    use crate::master_election::MasterElection;
    use crate::network::{ReliableMessaging, StatusBroadcaster};
    use crate::order_assignment::OrderAssignment;
    use crate::registry::StatusRegistry;
    use crate::shared::{Button, Direction};
    use crossbeam_channel::{unbounded, Sender};
    use std::thread::Builder;

    fn elevator_config() -> ElevatorConfig {
        ElevatorConfig {
            door_open_time_ms: 50,
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

    /// Every port-bound piece (`ReliableMessaging`, `StatusBroadcaster`,
    /// `PeerMonitor`) is real but unreachable in these tests - loopback only,
    /// no peer ever joins, so we exercise the coordinator purely through its
    /// mock hardware/local channels.
    #[allow(clippy::type_complexity)]
    fn setup(
        local_id: &str,
        port: u16,
    ) -> (
        Coordinator,
        Sender<(u8, Button)>,
        Sender<u8>,
        Sender<bool>,
        crossbeam_channel::Receiver<Direction>,
        crossbeam_channel::Receiver<bool>,
        crossbeam_channel::Receiver<(u8, Button, bool)>,
        Sender<()>,
    ) {
        let local_id = local_id.to_string();
        let registry = StatusRegistry::new();
        let (messaging, assignment_rx, raw_hall_call_rx, order_status_rx, light_order_rx) =
            ReliableMessaging::new(&network_config(port), local_id.clone());
        let (assigned_hall_call_tx, assigned_hall_call_rx) = unbounded();
        let (local_light_tx, local_light_rx) = unbounded();
        let order_assignment = OrderAssignment::new(
            local_id.clone(),
            elevator_config(),
            registry.clone(),
            messaging,
            assigned_hall_call_tx,
            local_light_tx,
        );
        let (status_broadcaster, status_rx) = StatusBroadcaster::new(port);
        let snapshot_rx = registry.spawn_periodic_snapshot(500);
        let (_peer_update_tx, peer_update_rx) = unbounded();

        let (hw_motor_tx, hw_motor_rx) = unbounded();
        let (hw_door_lamp_tx, hw_door_lamp_rx) = unbounded();
        let (hw_button_lamp_tx, hw_button_lamp_rx) = unbounded();
        let (hw_button_tx, hw_button_rx) = unbounded::<(u8, Button)>();
        let (hw_floor_tx, hw_floor_rx) = unbounded::<u8>();
        let (hw_obstruction_tx, hw_obstruction_rx) = unbounded::<bool>();
        let (coordinator_terminate_tx, coordinator_terminate_rx) = unbounded();

        let coordinator = Coordinator::new(
            local_id,
            Fsm::new(&elevator_config()),
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

        (
            coordinator,
            hw_button_tx,
            hw_floor_tx,
            hw_obstruction_tx,
            hw_motor_rx,
            hw_door_lamp_rx,
            hw_button_lamp_rx,
            coordinator_terminate_tx,
        )
    }

    /// `init` always zeroes every lamp and then falls into `on_floor_sensor`,
    /// which reveals a boot-time door open. Every test starts by draining
    /// that fixed sequence so assertions only cover the behavior under test.
    fn drain_boot_sequence(
        hw_button_lamp_rx: &crossbeam_channel::Receiver<(u8, Button, bool)>,
        hw_door_lamp_rx: &crossbeam_channel::Receiver<bool>,
        hw_motor_rx: &crossbeam_channel::Receiver<Direction>,
    ) {
        for _ in 0..(crate::config::NUM_FLOORS as usize * 3) {
            hw_button_lamp_rx.recv().unwrap();
        }
        assert_eq!(hw_door_lamp_rx.recv().unwrap(), false);
        assert_eq!(hw_motor_rx.recv().unwrap(), Direction::Stop);
        assert_eq!(hw_door_lamp_rx.recv().unwrap(), true);
    }

    #[test]
    fn cab_press_at_the_open_floor_lights_the_button_immediately() {
        let (
            mut coordinator,
            hw_button_tx,
            _hw_floor_tx,
            _hw_obstruction_tx,
            hw_motor_rx,
            hw_door_lamp_rx,
            hw_button_lamp_rx,
            terminate_tx,
        ) = setup("single-node-A", 31000);

        coordinator.init(Some(1), false);
        drain_boot_sequence(&hw_button_lamp_rx, &hw_door_lamp_rx, &hw_motor_rx);

        let thread = Builder::new()
            .name("coordinator".into())
            .spawn(move || coordinator.run())
            .unwrap();

        hw_button_tx.send((1, Button::Cab)).unwrap();
        assert_eq!(hw_button_lamp_rx.recv().unwrap(), (1, Button::Cab, true));

        terminate_tx.send(()).unwrap();
        thread.join().unwrap();
    }

    #[test]
    fn floor_arrival_with_pending_cab_order_opens_door_and_clears_it() {
        let (
            mut coordinator,
            hw_button_tx,
            hw_floor_tx,
            _hw_obstruction_tx,
            hw_motor_rx,
            hw_door_lamp_rx,
            hw_button_lamp_rx,
            terminate_tx,
        ) = setup("single-node-B", 31100);

        coordinator.init(Some(0), false);
        drain_boot_sequence(&hw_button_lamp_rx, &hw_door_lamp_rx, &hw_motor_rx);

        let thread = Builder::new()
            .name("coordinator".into())
            .spawn(move || coordinator.run())
            .unwrap();

        hw_button_tx.send((2, Button::Cab)).unwrap();
        assert_eq!(hw_button_lamp_rx.recv().unwrap(), (2, Button::Cab, true));

        // The door is still open; leaving it is purely timer-driven, so the
        // close-and-depart only happens once the door timer expires.
        assert_eq!(hw_door_lamp_rx.recv().unwrap(), false);
        assert_eq!(hw_motor_rx.recv().unwrap(), Direction::Up);

        hw_floor_tx.send(2).unwrap();
        assert_eq!(hw_motor_rx.recv().unwrap(), Direction::Stop);
        assert_eq!(hw_door_lamp_rx.recv().unwrap(), true);
        assert_eq!(hw_button_lamp_rx.recv().unwrap(), (2, Button::Cab, false));

        terminate_tx.send(()).unwrap();
        thread.join().unwrap();
    }

    #[test]
    fn obstruction_toggles_through_to_fsm_without_crashing_the_loop() {
        let (
            mut coordinator,
            _hw_button_tx,
            _hw_floor_tx,
            hw_obstruction_tx,
            hw_motor_rx,
            hw_door_lamp_rx,
            hw_button_lamp_rx,
            terminate_tx,
        ) = setup("single-node-C", 31200);

        coordinator.init(Some(0), false);
        drain_boot_sequence(&hw_button_lamp_rx, &hw_door_lamp_rx, &hw_motor_rx);

        let thread = Builder::new()
            .name("coordinator".into())
            .spawn(move || coordinator.run())
            .unwrap();

        hw_obstruction_tx.send(true).unwrap();
        hw_obstruction_tx.send(false).unwrap();

        terminate_tx.send(()).unwrap();
        thread.join().unwrap();
    }
}
