pub mod fsm;
pub mod hardware;

pub use fsm::{Cmd, Fsm};
pub use hardware::ElevatorDriver;
