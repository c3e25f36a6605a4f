/***************************************/
/*        3rd party libraries          */
/***************************************/
use driver_rust::elevio::elev::{CAB, DIRN_DOWN, DIRN_STOP, DIRN_UP, HALL_DOWN, HALL_UP};
use serde::Deserialize;
use serde::Serialize;

use crate::config::NUM_FLOORS;

/***************************************/
/*       Public data structures        */
/***************************************/
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum MachineState {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "moving")]
    Moving,
    #[serde(rename = "doorOpen")]
    DoorOpen,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Stop,
}

impl Direction {
    pub fn to_u8(&self) -> u8 {
        match *self {
            Direction::Up => DIRN_UP,
            Direction::Down => DIRN_DOWN,
            Direction::Stop => DIRN_STOP,
        }
    }

    pub fn opposite(&self) -> Direction {
        match *self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Stop => Direction::Stop,
        }
    }
}

impl From<u8> for Direction {
    fn from(item: u8) -> Self {
        match item {
            DIRN_UP => Direction::Up,
            DIRN_DOWN => Direction::Down,
            DIRN_STOP => Direction::Stop,
            _ => panic!("Invalid direction value"),
        }
    }
}

/// A landing or cab button. Wire messages never reference `Cab` (cab calls
/// never leave the node that owns them) but the type is shared with the
/// hardware driver's button-press events.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    HallUp,
    HallDown,
    Cab,
}

impl Button {
    pub fn to_u8(&self) -> u8 {
        match *self {
            Button::HallUp => HALL_UP,
            Button::HallDown => HALL_DOWN,
            Button::Cab => CAB,
        }
    }
}

impl From<u8> for Button {
    fn from(item: u8) -> Self {
        match item {
            HALL_UP => Button::HallUp,
            HALL_DOWN => Button::HallDown,
            CAB => Button::Cab,
            _ => panic!("Invalid button value"),
        }
    }
}

impl Button {
    /// Index into a `Queue` row: `[HallUp, HallDown, Cab]`.
    pub fn index(&self) -> usize {
        match *self {
            Button::HallUp => 0,
            Button::HallDown => 1,
            Button::Cab => 2,
        }
    }
}

/// `Queue[floor][button]`. Fixed-size because the floor count is a
/// compile-time constant; index with `Button::to_u8` cast to `usize`.
pub type Queue = [[bool; 3]; NUM_FLOORS as usize];

pub fn empty_queue() -> Queue {
    [[false; 3]; NUM_FLOORS as usize]
}

/// The node-local elevator record. Floor is signed so the "between floors"
/// sensor reading can be represented as `-1` during the brief window before
/// the first floor arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct Elevator {
    pub floor: i32,
    pub direction: Direction,
    pub state: MachineState,
    pub obstructed: bool,
    pub queue: Queue,
}

impl Elevator {
    pub fn new() -> Elevator {
        Elevator {
            floor: -1,
            direction: Direction::Stop,
            state: MachineState::Idle,
            obstructed: false,
            queue: empty_queue(),
        }
    }

    pub fn has_orders_at(&self, floor: u8) -> bool {
        self.queue[floor as usize].iter().any(|&b| b)
    }

    pub fn has_orders_above(&self, floor: i32) -> bool {
        ((floor + 1)..NUM_FLOORS as i32).any(|f| self.has_orders_at(f as u8))
    }

    pub fn has_orders_below(&self, floor: i32) -> bool {
        (0..floor).any(|f| self.has_orders_at(f as u8))
    }
}

/// Wire view of an `Elevator`, broadcast on the status port. `Timestamp` is
/// milliseconds since `UNIX_EPOCH`; later timestamp wins on ingest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElevatorStatus {
    pub id: String,
    pub floor: i32,
    pub state: MachineState,
    pub direction: Direction,
    pub queue: Queue,
    pub timestamp_ms: u128,
}

/// Reconstructs a working `Elevator` from a peer's broadcast status, for
/// feeding into the cost function. `obstructed` is unknown from the wire
/// view and defaults to `false` - it doesn't factor into cost.
impl From<&ElevatorStatus> for Elevator {
    fn from(status: &ElevatorStatus) -> Elevator {
        Elevator {
            floor: status.floor,
            direction: status.direction,
            state: status.state,
            obstructed: false,
            queue: status.queue,
        }
    }
}

impl ElevatorStatus {
    pub fn stub(id: String, timestamp_ms: u128) -> ElevatorStatus {
        ElevatorStatus {
            id,
            floor: 0,
            state: MachineState::Idle,
            direction: Direction::Stop,
            queue: empty_queue(),
            timestamp_ms,
        }
    }

    pub fn from_elevator(id: String, e: &Elevator, timestamp_ms: u128) -> ElevatorStatus {
        ElevatorStatus {
            id,
            floor: e.floor,
            state: e.state,
            direction: e.direction,
            queue: e.queue,
            timestamp_ms,
        }
    }
}
