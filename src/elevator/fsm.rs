/**
 * Per-node finite state machine: Idle/Moving/DoorOpen, four timers
 * (door-open, motor-stall, obstruction-stuck, delayed-second-clear) plus a
 * short settle timer for a cab press at the current floor, and the local
 * per-floor per-button queue.
 *
 * Pure logic, no channels: every handler takes the triggering event and
 * returns the `Cmd`s the coordinator should carry out (hardware commands,
 * order-status reports, status publication, fatal shutdown). This keeps the
 * coordinator the single owner of the `Elevator` record and mutation point
 * while keeping the FSM itself trivially unit-testable, the same shape
 * already used by `cost.rs` and `master_election.rs`.
 *
 * Direction choice is delegated to `crate::cost::choose_direction` so the
 * same tie-break logic backs both live FSM transitions and the simulated
 * walk the cost function runs when scoring a candidate assignment.
 */
use std::time::{Duration, Instant};

use crate::config::{ElevatorConfig, NUM_FLOORS};
use crate::cost;
use crate::network::{LightState, OrderStatusKind};
use crate::shared::{Button, Direction, Elevator, MachineState};

struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    fn new() -> Timer {
        Timer { deadline: None }
    }

    fn reset(&mut self, dur: Duration) {
        self.deadline = Some(Instant::now() + dur);
    }

    fn stop(&mut self) {
        self.deadline = None;
    }

    fn expired(&self) -> bool {
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

/// Effect the coordinator must carry out after a handler runs. The FSM never
/// touches a channel directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    Motor(Direction),
    DoorLamp(bool),
    ButtonLamp(u8, Button, bool),
    /// This node owns the order and must tell the master its status.
    OrderStatus(u8, Button, OrderStatusKind),
    /// Broadcast the current status; `critical` selects the redundancy tier.
    PublishStatus { critical: bool },
    /// One of the two fatal timers fired; the coordinator should log and exit.
    Fatal(&'static str),
}

pub struct Fsm {
    config: ElevatorConfig,
    elevator: Elevator,
    booted: bool,

    door_timer: Timer,
    movement_timer: Timer,
    obstruction_timer: Timer,
    delayed_clear_timer: Timer,
    delayed_clear_button: Option<Button>,
    settle_timer: Timer,
    settle_floor: Option<u8>,
}

impl Fsm {
    pub fn new(config: &ElevatorConfig) -> Fsm {
        Fsm {
            config: config.clone(),
            elevator: Elevator::new(),
            booted: false,
            door_timer: Timer::new(),
            movement_timer: Timer::new(),
            obstruction_timer: Timer::new(),
            delayed_clear_timer: Timer::new(),
            delayed_clear_button: None,
            settle_timer: Timer::new(),
            settle_floor: None,
        }
    }

    pub fn elevator(&self) -> &Elevator {
        &self.elevator
    }

    pub fn status(&self, id: &str, timestamp_ms: u128) -> crate::shared::ElevatorStatus {
        crate::shared::ElevatorStatus::from_elevator(id.to_string(), &self.elevator, timestamp_ms)
    }

    fn door_open_dur(&self) -> Duration {
        Duration::from_millis(self.config.door_open_time_ms)
    }

    /// All lamps off; drive down if position is unknown, else fall straight
    /// into the floor-arrival handler so the very first door-open still
    /// happens (revealing a boot-time obstruction).
    pub fn init(&mut self, floor: i32, obstructed: bool) -> Vec<Cmd> {
        self.elevator.obstructed = obstructed;
        let mut cmds = Vec::new();
        for f in 0..NUM_FLOORS {
            for b in [Button::HallUp, Button::HallDown, Button::Cab] {
                cmds.push(Cmd::ButtonLamp(f, b, false));
            }
        }
        cmds.push(Cmd::DoorLamp(false));

        if floor < 0 {
            self.elevator.direction = Direction::Down;
            cmds.push(Cmd::Motor(Direction::Down));
        } else {
            cmds.extend(self.on_floor_sensor(floor as u8));
        }
        cmds.push(Cmd::PublishStatus { critical: true });
        cmds
    }

    pub fn on_floor_sensor(&mut self, floor: u8) -> Vec<Cmd> {
        let mut cmds = Vec::new();
        self.elevator.floor = floor as i32;
        self.movement_timer.reset(Duration::from_millis(self.config.not_moving_time_limit_ms));

        let boot_reveal = !self.booted;
        self.booted = true;

        if !boot_reveal && !self.elevator.has_orders_at(floor) {
            return cmds;
        }

        self.movement_timer.stop();
        cmds.push(Cmd::Motor(Direction::Stop));
        self.elevator.state = MachineState::DoorOpen;
        cmds.push(Cmd::DoorLamp(true));
        self.door_timer.reset(self.door_open_dur());

        if self.elevator.queue[floor as usize][Button::Cab.index()] {
            self.elevator.queue[floor as usize][Button::Cab.index()] = false;
            cmds.push(Cmd::ButtonLamp(floor, Button::Cab, false));
        }

        cmds.extend(self.clear_hall_calls_at(floor));
        cmds.push(Cmd::PublishStatus { critical: true });
        cmds
    }

    /// Clears whichever hall button(s) at `floor` the clear-decision rules
    /// say should go now. Only touches bits that are currently set, so it is
    /// safe to call again later (the door-timer handler does exactly that).
    fn clear_hall_calls_at(&mut self, floor: u8) -> Vec<Cmd> {
        let has_up = self.elevator.queue[floor as usize][Button::HallUp.index()];
        let has_down = self.elevator.queue[floor as usize][Button::HallDown.index()];
        if !has_up && !has_down {
            return Vec::new();
        }

        let above = self.elevator.has_orders_above(floor as i32);
        let below = self.elevator.has_orders_below(floor as i32);
        let only_one_dir = above ^ below;

        if has_up && has_down && only_one_dir {
            // Clear the call opposite the direction we're about to announce,
            // so the lamp that stays lit matches where we're actually going.
            let (clear_first, hold_back) = if above {
                (Button::HallDown, Button::HallUp)
            } else {
                (Button::HallUp, Button::HallDown)
            };
            let cmds = self.clear_hall(floor, clear_first);
            self.delayed_clear_button = Some(hold_back);
            self.delayed_clear_timer.reset(self.door_open_dur());
            self.door_timer.reset(self.door_open_dur() * 2);
            cmds
        } else if has_up && has_down {
            let dir_button = match self.elevator.direction {
                Direction::Up => Button::HallUp,
                _ => Button::HallDown,
            };
            self.clear_hall(floor, dir_button)
        } else if has_up {
            self.clear_hall(floor, Button::HallUp)
        } else {
            self.clear_hall(floor, Button::HallDown)
        }
    }

    fn clear_hall(&mut self, floor: u8, button: Button) -> Vec<Cmd> {
        self.elevator.queue[floor as usize][button.index()] = false;
        vec![
            Cmd::ButtonLamp(floor, button, false),
            Cmd::OrderStatus(floor, button, OrderStatusKind::Finished),
        ]
    }

    pub fn on_cab_press(&mut self, floor: u8) -> Vec<Cmd> {
        self.elevator.queue[floor as usize][Button::Cab.index()] = true;
        let mut cmds = vec![Cmd::ButtonLamp(floor, Button::Cab, true), Cmd::PublishStatus { critical: false }];

        if self.elevator.floor == floor as i32 && self.elevator.state != MachineState::Moving {
            self.settle_floor = Some(floor);
            self.settle_timer.reset(Duration::from_secs(3));
        } else {
            cmds.extend(self.handle_state_transition());
        }
        cmds
    }

    fn on_settle_timer(&mut self) -> Vec<Cmd> {
        match self.settle_floor.take() {
            Some(floor) => self.on_floor_sensor(floor),
            None => Vec::new(),
        }
    }

    /// An `Assignment` (hall or cab-restore) arrived for this node.
    pub fn on_assignment(&mut self, floor: u8, button: Button) -> Vec<Cmd> {
        if self.elevator.queue[floor as usize][button.index()] {
            return vec![Cmd::ButtonLamp(floor, button, true)];
        }
        self.elevator.queue[floor as usize][button.index()] = true;
        let mut cmds = vec![Cmd::ButtonLamp(floor, button, true)];
        if button != Button::Cab {
            cmds.push(Cmd::OrderStatus(floor, button, OrderStatusKind::Unfinished));
        }
        cmds.push(Cmd::PublishStatus { critical: true });
        cmds.extend(self.handle_state_transition());
        cmds
    }

    /// A `LightOrder` arrived from the master. Lamp-only; the local queue
    /// stays whatever it already was - the master is authoritative for lamps.
    pub fn on_light_order(&mut self, floor: u8, button: Button, light: LightState) -> Vec<Cmd> {
        vec![Cmd::ButtonLamp(floor, button, light == LightState::On)]
    }

    pub fn on_obstruction(&mut self, obstructed: bool) -> Vec<Cmd> {
        if obstructed == self.elevator.obstructed {
            return Vec::new();
        }
        self.elevator.obstructed = obstructed;
        if self.elevator.state != MachineState::DoorOpen {
            return Vec::new();
        }
        if obstructed {
            self.movement_timer.stop();
            self.door_timer.stop();
            self.obstruction_timer.reset(Duration::from_millis(self.config.obstruction_time_limit_ms));
        } else {
            self.obstruction_timer.stop();
            self.door_timer.reset(self.door_open_dur());
        }
        Vec::new()
    }

    fn on_door_timer(&mut self) -> Vec<Cmd> {
        if self.elevator.obstructed {
            self.obstruction_timer.reset(Duration::from_millis(self.config.obstruction_time_limit_ms));
            return Vec::new();
        }
        let mut cmds = vec![Cmd::DoorLamp(false)];
        let floor = self.elevator.floor.max(0) as u8;
        cmds.extend(self.clear_hall_calls_at(floor));
        if self.delayed_clear_button.is_none() {
            self.elevator.state = MachineState::Idle;
            cmds.extend(self.depart_or_idle());
        }
        cmds
    }

    fn on_delayed_clear_timer(&mut self) -> Vec<Cmd> {
        let button = match self.delayed_clear_button.take() {
            Some(b) => b,
            None => return Vec::new(),
        };
        self.door_timer.stop();
        let floor = self.elevator.floor.max(0) as u8;
        let mut cmds = self.clear_hall(floor, button);
        cmds.push(Cmd::DoorLamp(false));
        self.elevator.state = MachineState::Idle;
        cmds.extend(self.depart_or_idle());
        cmds
    }

    fn on_movement_timer(&mut self) -> Vec<Cmd> {
        vec![Cmd::Fatal("power loss")]
    }

    fn on_obstruction_timer(&mut self) -> Vec<Cmd> {
        vec![Cmd::Fatal("obstructed too long")]
    }

    /// `HandleStateTransition`: behaves differently per current state.
    /// `DoorOpen` is a no-op here - leaving it is entirely timer-driven.
    fn handle_state_transition(&mut self) -> Vec<Cmd> {
        match self.elevator.state {
            MachineState::Idle => self.depart_or_idle(),
            MachineState::Moving => vec![Cmd::Motor(self.elevator.direction)],
            MachineState::DoorOpen => Vec::new(),
        }
    }

    /// Chooses a direction and either starts moving or settles into Idle.
    /// Pre-clears a lingering hall call at the current floor in the chosen
    /// direction - it arrived after the door already closed here, so no
    /// further floor-arrival event will ever revisit it.
    fn depart_or_idle(&mut self) -> Vec<Cmd> {
        let dir = cost::choose_direction(&self.elevator);
        if dir == Direction::Stop {
            self.elevator.state = MachineState::Idle;
            self.elevator.direction = Direction::Stop;
            self.movement_timer.stop();
            return vec![Cmd::Motor(Direction::Stop)];
        }

        let mut cmds = Vec::new();
        if self.elevator.floor >= 0 {
            let button = if dir == Direction::Up { Button::HallUp } else { Button::HallDown };
            if self.elevator.queue[self.elevator.floor as usize][button.index()] {
                cmds.extend(self.clear_hall(self.elevator.floor as u8, button));
            }
        }
        self.elevator.state = MachineState::Moving;
        self.elevator.direction = dir;
        self.movement_timer.reset(Duration::from_millis(self.config.not_moving_time_limit_ms));
        cmds.push(Cmd::Motor(dir));
        cmds
    }

    /// Polled by the coordinator on a tick; fires whichever timers expired.
    /// The two fatal timers short-circuit the rest, since the process is
    /// about to exit anyway.
    pub fn poll_timers(&mut self) -> Vec<Cmd> {
        if self.movement_timer.expired() {
            self.movement_timer.stop();
            return self.on_movement_timer();
        }
        if self.obstruction_timer.expired() {
            self.obstruction_timer.stop();
            return self.on_obstruction_timer();
        }
        let mut cmds = Vec::new();
        if self.door_timer.expired() {
            self.door_timer.stop();
            cmds.extend(self.on_door_timer());
        }
        if self.delayed_clear_timer.expired() {
            self.delayed_clear_timer.stop();
            cmds.extend(self.on_delayed_clear_timer());
        }
        if self.settle_timer.expired() {
            self.settle_timer.stop();
            cmds.extend(self.on_settle_timer());
        }
        cmds
    }
}

#[cfg(test)]
mod fsm_tests {
    use super::*;

    fn config() -> ElevatorConfig {
        ElevatorConfig {
            door_open_time_ms: 3000,
            not_moving_time_limit_ms: 8000,
            obstruction_time_limit_ms: 4000,
            travel_time_s: 4,
        }
    }

    #[test]
    fn init_drives_down_when_floor_unknown() {
        let mut fsm = Fsm::new(&config());
        let cmds = fsm.init(-1, false);
        assert!(cmds.contains(&Cmd::Motor(Direction::Down)));
        assert_eq!(fsm.elevator().direction, Direction::Down);
    }

    #[test]
    fn floor_arrival_with_no_orders_passes_through() {
        let mut fsm = Fsm::new(&config());
        fsm.init(-1, false);
        let cmds = fsm.on_floor_sensor(1);
        assert!(!cmds.iter().any(|c| matches!(c, Cmd::DoorLamp(true))));
        assert_eq!(fsm.elevator().state, MachineState::Idle);
    }

    #[test]
    fn boot_reveal_opens_door_even_without_orders() {
        let mut fsm = Fsm::new(&config());
        let cmds = fsm.init(1, false);
        assert!(cmds.contains(&Cmd::DoorLamp(true)));
        assert_eq!(fsm.elevator().state, MachineState::DoorOpen);
    }

    #[test]
    fn cab_call_at_current_floor_opens_door_after_settle() {
        let mut fsm = Fsm::new(&config());
        fsm.init(2, false);
        let cmds = fsm.on_door_timer();
        assert_eq!(fsm.elevator().state, MachineState::Idle);
        assert!(cmds.iter().any(|c| matches!(c, Cmd::DoorLamp(false))));

        let cmds = fsm.on_cab_press(2);
        assert!(!cmds.iter().any(|c| matches!(c, Cmd::DoorLamp(true))));
        assert_eq!(fsm.elevator().state, MachineState::Idle);

        let cmds = fsm.on_settle_timer();
        assert!(cmds.contains(&Cmd::DoorLamp(true)));
        assert_eq!(fsm.elevator().state, MachineState::DoorOpen);
    }

    #[test]
    fn assignment_is_idempotent_when_already_queued() {
        let mut fsm = Fsm::new(&config());
        fsm.init(0, false);
        fsm.on_door_timer();
        let first = fsm.on_assignment(3, Button::HallUp);
        assert!(first.iter().any(|c| matches!(c, Cmd::OrderStatus(3, Button::HallUp, OrderStatusKind::Unfinished))));

        let second = fsm.on_assignment(3, Button::HallUp);
        assert!(!second.iter().any(|c| matches!(c, Cmd::OrderStatus(..))));
        assert!(second.contains(&Cmd::ButtonLamp(3, Button::HallUp, true)));
    }

    #[test]
    fn both_hall_calls_one_direction_clears_opposite_first_and_delays_the_rest() {
        let mut fsm = Fsm::new(&config());
        fsm.init(0, false);
        fsm.on_door_timer();

        fsm.on_assignment(3, Button::Cab);
        fsm.on_assignment(2, Button::HallUp);
        fsm.on_assignment(2, Button::HallDown);

        fsm.elevator.state = MachineState::Idle;
        let cmds = fsm.depart_or_idle();
        assert_eq!(cmds, vec![Cmd::Motor(Direction::Up)]);

        let arrive = fsm.on_floor_sensor(2);
        assert!(arrive.iter().any(|c| matches!(c, Cmd::OrderStatus(2, Button::HallDown, OrderStatusKind::Finished))));
        assert!(!arrive.iter().any(|c| matches!(c, Cmd::OrderStatus(2, Button::HallUp, OrderStatusKind::Finished))));
        assert!(fsm.elevator().queue[2][Button::HallUp.index()]);

        let delayed = fsm.on_delayed_clear_timer();
        assert!(delayed.iter().any(|c| matches!(c, Cmd::OrderStatus(2, Button::HallUp, OrderStatusKind::Finished))));
        assert_eq!(fsm.elevator().state, MachineState::Moving);
        assert_eq!(fsm.elevator().direction, Direction::Up);
    }

    #[test]
    fn obstruction_during_door_open_suspends_door_timer() {
        let mut fsm = Fsm::new(&config());
        fsm.init(1, false);
        assert_eq!(fsm.elevator().state, MachineState::DoorOpen);
        fsm.on_obstruction(true);
        assert!(fsm.door_timer.deadline.is_none());
        assert!(fsm.obstruction_timer.deadline.is_some());
    }

    #[test]
    fn movement_timer_expiry_is_fatal() {
        let mut fsm = Fsm::new(&config());
        let cmds = fsm.on_movement_timer();
        assert_eq!(cmds, vec![Cmd::Fatal("power loss")]);
    }

    #[test]
    fn obstruction_timer_expiry_is_fatal() {
        let mut fsm = Fsm::new(&config());
        let cmds = fsm.on_obstruction_timer();
        assert_eq!(cmds, vec![Cmd::Fatal("obstructed too long")]);
    }
}
