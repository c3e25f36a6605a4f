pub mod messaging;
pub mod peer_monitor;
pub mod status;
pub mod wire;

pub use messaging::{
    Ack, Assignment, LightOrder, LightState, MessageKind, OrderStatus, OrderStatusKind,
    RawHallCall, ReliableMessaging,
};
pub use peer_monitor::PeerMonitor;
pub use status::StatusBroadcaster;
