/**
 * Elevator hardware driver: polls the simulator for floor/obstruction/button
 * state and applies motor/lamp commands from the coordinator. Button presses
 * and floor arrivals are surfaced typed (`Button`, not a raw port number) so
 * the rest of the system never touches `driver_rust`'s numeric constants.
 *
 * Polling loop adapted to the shared `Button`/`Direction` enums.
 */
use driver_rust::elevio::elev::Elevator;
use crossbeam_channel as cbc;
use std::time::Duration;

use crate::config::{self, HardwareConfig, NUM_FLOORS};
use crate::shared::{Button, Direction};
use crate::unwrap_or_exit;

pub struct ElevatorDriver {
    elevator: Elevator,
    thread_sleep_time: u64,
    current_floor: Option<u8>,
    obstruction: bool,
    requests: [[bool; 3]; NUM_FLOORS as usize],

    hw_motor_rx: cbc::Receiver<Direction>,
    hw_door_lamp_rx: cbc::Receiver<bool>,
    hw_button_lamp_rx: cbc::Receiver<(u8, Button, bool)>,

    hw_button_tx: cbc::Sender<(u8, Button)>,
    hw_floor_tx: cbc::Sender<u8>,
    hw_obstruction_tx: cbc::Sender<bool>,

    terminate_rx: cbc::Receiver<()>,
}

impl ElevatorDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &HardwareConfig,
        hw_motor_rx: cbc::Receiver<Direction>,
        hw_door_lamp_rx: cbc::Receiver<bool>,
        hw_button_lamp_rx: cbc::Receiver<(u8, Button, bool)>,
        hw_button_tx: cbc::Sender<(u8, Button)>,
        hw_floor_tx: cbc::Sender<u8>,
        hw_obstruction_tx: cbc::Sender<bool>,
        terminate_rx: cbc::Receiver<()>,
    ) -> ElevatorDriver {
        let address = format!("{}:{}", config.driver_address, config::elevator_port());
        ElevatorDriver {
            elevator: unwrap_or_exit!(Elevator::init(&address, NUM_FLOORS)),
            thread_sleep_time: config.hw_thread_sleep_time,
            current_floor: None,
            obstruction: false,
            requests: [[false; 3]; NUM_FLOORS as usize],
            hw_motor_rx,
            hw_door_lamp_rx,
            hw_button_lamp_rx,
            hw_button_tx,
            hw_floor_tx,
            hw_obstruction_tx,
            terminate_rx,
        }
    }

    /// Synchronous reads taken once before handing the driver off to its own
    /// thread, so the FSM can run `init` with real boot-time readings instead
    /// of guessing.
    pub fn initial_floor(&self) -> Option<u8> {
        self.elevator.floor_sensor()
    }

    pub fn initial_obstruction(&self) -> bool {
        self.elevator.obstruction()
    }

    pub fn run(mut self) {
        for floor in 0..self.elevator.num_floors {
            self.elevator.call_button_light(floor, Button::HallUp.to_u8(), false);
            self.elevator.call_button_light(floor, Button::HallDown.to_u8(), false);
            self.elevator.call_button_light(floor, Button::Cab.to_u8(), false);
        }
        self.obstruction = self.elevator.obstruction();
        self.current_floor = self.elevator.floor_sensor();

        loop {
            if let Some(floor) = self.elevator.floor_sensor() {
                if Some(floor) != self.current_floor {
                    self.current_floor = Some(floor);
                    self.elevator.floor_indicator(floor);
                    unwrap_or_exit!(self.hw_floor_tx.send(floor));
                }
            }

            if self.elevator.obstruction() != self.obstruction {
                self.obstruction = !self.obstruction;
                unwrap_or_exit!(self.hw_obstruction_tx.send(self.obstruction));
            }

            for floor in 0..self.elevator.num_floors {
                for button in [Button::HallUp, Button::HallDown, Button::Cab] {
                    let idx = button.index();
                    if !self.requests[floor as usize][idx] && self.elevator.call_button(floor, button.to_u8()) {
                        self.requests[floor as usize][idx] = true;
                        unwrap_or_exit!(self.hw_button_tx.send((floor, button)));
                    }
                }
            }

            cbc::select! {
                recv(self.hw_motor_rx) -> msg => {
                    match msg {
                        Ok(dir) => self.elevator.motor_direction(dir.to_u8()),
                        Err(e) => {
                            log::error!("hw_motor_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.hw_button_lamp_rx) -> msg => {
                    match msg {
                        Ok((floor, button, on)) => {
                            self.elevator.call_button_light(floor, button.to_u8(), on);
                            // Re-arms the press-edge detector once the light
                            // governing this call is cleared.
                            if !on {
                                self.requests[floor as usize][button.index()] = false;
                            }
                        }
                        Err(e) => {
                            log::error!("hw_button_lamp_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.hw_door_lamp_rx) -> msg => {
                    match msg {
                        Ok(on) => self.elevator.door_light(on),
                        Err(e) => {
                            log::error!("hw_door_lamp_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.terminate_rx) -> _ => {
                    break;
                }
                default(Duration::from_millis(self.thread_sleep_time)) => {}
            }
        }
    }
}
