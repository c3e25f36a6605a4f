/**
 * Order-assignment cost function and direction choice: simulates a
 * hypothetical queue walk to estimate how long a candidate elevator would
 * take to serve a call, rather than scoring by raw floor distance.
 */
use std::collections::BTreeMap;

use crate::config::ElevatorConfig;
use crate::shared::{Button, Direction, Elevator, MachineState};

/// Prefers to continue in the current direction while there are orders
/// ahead of it, reverses if orders remain only behind it, else stops.
/// `Stop` is treated the same as `Down` for this check - the documented
/// "prefer Down then Up" tie-break.
pub fn choose_direction(e: &Elevator) -> Direction {
    // `floor` is `-1` during the boot between-floors window and on a stub
    // status for a just-joined peer; there can be no order "here" yet.
    let here = e.floor >= 0 && e.has_orders_at(e.floor as u8);
    match e.direction {
        Direction::Up => {
            if e.has_orders_above(e.floor) {
                Direction::Up
            } else if here {
                Direction::Stop
            } else if e.has_orders_below(e.floor) {
                Direction::Down
            } else {
                Direction::Stop
            }
        }
        Direction::Down | Direction::Stop => {
            if e.has_orders_below(e.floor) {
                Direction::Down
            } else if here {
                Direction::Stop
            } else if e.has_orders_above(e.floor) {
                Direction::Up
            } else {
                Direction::Stop
            }
        }
    }
}

fn should_stop_here(e: &Elevator) -> bool {
    if e.floor < 0 {
        return false;
    }
    if e.has_orders_at(e.floor as u8) {
        return true;
    }
    choose_direction(e) == Direction::Stop
}

fn clear_at_floor(e: &mut Elevator) {
    if e.floor < 0 {
        return;
    }
    for slot in e.queue[e.floor as usize].iter_mut() {
        *slot = false;
    }
}

fn step(floor: i32, dir: Direction) -> i32 {
    match dir {
        Direction::Up => floor + 1,
        Direction::Down => floor - 1,
        Direction::Stop => floor,
    }
}

/// Simulated time (in seconds) for `target` to complete `order` if it were
/// assigned to it, including every order already in its queue. Lower is
/// better; an elevator already idle at the call's floor costs just the
/// door-open time.
pub fn cost(target: &Elevator, floor: u8, button: Button, config: &ElevatorConfig) -> u64 {
    let door_open_s = config.door_open_time_ms / 1000;
    let travel_s = config.travel_time_s;

    let mut sim = target.clone();
    sim.queue[floor as usize][button.index()] = true;

    let mut duration: u64 = match sim.state {
        // Already stopped at the call floor with nowhere else to go: served
        // the moment the door cycles, so return immediately rather than
        // falling into the walk below and double-counting the door time.
        MachineState::Idle if sim.floor == floor as i32 && choose_direction(&sim) == Direction::Stop => {
            return door_open_s;
        }
        MachineState::Idle => 0,
        MachineState::Moving => travel_s / 2,
        MachineState::DoorOpen => door_open_s / 2,
    };

    // Bound the walk: it can never need to visit more floors than exist,
    // twice over (once per direction), before converging on Stop.
    let max_steps = crate::config::NUM_FLOORS as u64 * 4 + 4;
    for _ in 0..max_steps {
        if should_stop_here(&sim) {
            clear_at_floor(&mut sim);
            duration += door_open_s;
        }
        let dir = choose_direction(&sim);
        if dir == Direction::Stop {
            return duration;
        }
        sim.direction = dir;
        sim.floor = step(sim.floor, dir);
        duration += travel_s;
    }
    duration
}

/// Picks the live elevator with the lowest cost for `(floor, button)`,
/// excluding `exclude` if given. Ties are broken by the ascending-ID
/// iteration order of `candidates` (a `BTreeMap`), so results are
/// reproducible across runs.
pub fn best_target(
    candidates: &BTreeMap<String, Elevator>,
    floor: u8,
    button: Button,
    config: &ElevatorConfig,
    exclude: Option<&str>,
) -> Option<String> {
    candidates
        .iter()
        .filter(|(id, _)| Some(id.as_str()) != exclude)
        .map(|(id, e)| (id.clone(), cost(e, floor, button, config)))
        .min_by_key(|(_, c)| *c)
        .map(|(id, _)| id)
}

#[cfg(test)]
mod cost_tests {
    use super::*;
    use crate::shared::Direction;

    fn config() -> ElevatorConfig {
        ElevatorConfig {
            door_open_time_ms: 3000,
            not_moving_time_limit_ms: 8000,
            obstruction_time_limit_ms: 4000,
            travel_time_s: 4,
        }
    }

    #[test]
    fn idle_at_call_floor_costs_just_door_open_time() {
        let mut e = Elevator::new();
        e.floor = 2;
        e.state = MachineState::Idle;
        e.direction = Direction::Stop;
        assert_eq!(cost(&e, 2, Button::HallUp, &config()), 3);
    }

    #[test]
    fn idle_elsewhere_costs_more_than_idle_at_floor() {
        let mut near = Elevator::new();
        near.floor = 2;
        let mut far = Elevator::new();
        far.floor = 0;
        assert!(cost(&far, 2, Button::HallUp, &config()) > cost(&near, 2, Button::HallUp, &config()));
    }

    #[test]
    fn choose_direction_stops_with_no_orders() {
        let e = Elevator::new();
        assert_eq!(choose_direction(&e), Direction::Stop);
    }

    #[test]
    fn choose_direction_continues_while_moving_towards_orders() {
        let mut e = Elevator::new();
        e.floor = 1;
        e.direction = Direction::Up;
        e.queue[3][Button::Cab.index()] = true;
        assert_eq!(choose_direction(&e), Direction::Up);
    }

    #[test]
    fn best_target_excludes_requested_id() {
        let mut candidates = BTreeMap::new();
        let mut close = Elevator::new();
        close.floor = 2;
        let mut far = Elevator::new();
        far.floor = 0;
        candidates.insert("A".to_string(), close);
        candidates.insert("B".to_string(), far);

        let chosen = best_target(&candidates, 2, Button::HallUp, &config(), Some("A"));
        assert_eq!(chosen, Some("B".to_string()));
    }

    #[test]
    fn best_target_ties_break_by_ascending_id() {
        let mut candidates = BTreeMap::new();
        candidates.insert("Z".to_string(), Elevator::new());
        candidates.insert("A".to_string(), Elevator::new());
        let chosen = best_target(&candidates, 2, Button::HallUp, &config(), None);
        assert_eq!(chosen, Some("A".to_string()));
    }
}
