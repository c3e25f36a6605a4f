/***************************************/
/*        3rd party libraries          */
/***************************************/
use serde::Deserialize;
use std::fs;

/***************************************/
/*           Compile-time              */
/***************************************/
// Floor count is fixed at compile time; the hardware panel and the wire
// format (`Queue`) both size themselves off this constant.
pub const NUM_FLOORS: u8 = 4;
pub const NUM_BUTTONS: u8 = 3;

/***************************************/
/*       Public data structures        */
/***************************************/
#[derive(Deserialize, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub elevator: ElevatorConfig,
    pub hardware: HardwareConfig,
}

#[derive(Deserialize, Clone)]
pub struct NetworkConfig {
    pub status_port: u16,
    pub peer_port: u16,
    pub assignment_port: u16,
    pub raw_hall_call_port: u16,
    pub ack_port: u16,
    pub order_status_port: u16,
    pub light_port: u16,

    pub peer_beacon_interval_ms: u64,
    pub peer_timeout_ms: u64,
    pub registry_snapshot_ms: u64,

    pub max_retries: u32,
    pub retry_interval_ms: u64,
    pub retry_backoff: u32,
    pub redundancy: usize,
    pub ack_redundancy: usize,
    pub dedup_ttl_ms: u64,
}

#[derive(Deserialize, Clone)]
pub struct ElevatorConfig {
    pub door_open_time_ms: u64,
    pub not_moving_time_limit_ms: u64,
    pub obstruction_time_limit_ms: u64,
    pub travel_time_s: u64,
}

#[derive(Deserialize, Clone)]
pub struct HardwareConfig {
    pub driver_address: String,
    pub hw_thread_sleep_time: u64,
}

/***************************************/
/*             Public API              */
/***************************************/
pub fn load_config() -> Config {
    let config_str = fs::read_to_string("config.toml").expect("Failed to read configuration file");
    toml::from_str(&config_str).expect("Failed to parse configuration file")
}

/// Stable node identity: `ELEVATOR_ID` if set, else hostname + a random
/// three-digit suffix so two nodes on the same host never collide.
pub fn local_id() -> String {
    if let Ok(id) = std::env::var("ELEVATOR_ID") {
        if !id.is_empty() {
            return id;
        }
    }
    let hostname = hostname_fallback();
    let suffix: u32 = std::process::id() % 1000;
    format!("{}-{:03}", hostname, suffix)
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "elevator".to_string())
}

/// TCP port of the hardware simulator: `ELEVATOR_PORT`, default 15657.
pub fn elevator_port() -> u16 {
    std::env::var("ELEVATOR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(15657)
}
