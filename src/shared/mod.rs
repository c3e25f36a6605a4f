pub mod macros;
pub mod structs;

pub use structs::{Button, Direction, Elevator, ElevatorStatus, MachineState, Queue};
