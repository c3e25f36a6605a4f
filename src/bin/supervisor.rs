/**
 * Launches and restarts the elevator binary. Every node is expected to run
 * under one of these: a fatal exit (`std::process::exit(1)`, see the two
 * fatal FSM timers) is a signal to relaunch, not a reason to give up.
 *
 * Reads `ELEVATOR_ID`/`ELEVATOR_PORT` from the environment and passes them
 * through to each launch. Uses a direct child-process wait rather than
 * polling for the process by name - `Child::wait` already reports exit
 * status directly.
 */
use clap::Parser;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(about = "Launches and restarts a single elevator node")]
struct Args {
    /// Path to the elevator binary to launch.
    #[clap(long, default_value = "./elevator-fleet")]
    bin: PathBuf,

    /// Delay before relaunching after an unexpected exit.
    #[clap(long, default_value = "2000")]
    restart_delay_ms: u64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    // Both are optional for the elevator process itself (it falls back to a
    // hostname-derived identity and port 15657), but we surface whatever the
    // supervisor was launched with so restarts are visible in the log.
    let elevator_id = std::env::var("ELEVATOR_ID").ok();
    let elevator_port = std::env::var("ELEVATOR_PORT").ok();

    log::info!(
        "supervisor started for elevator {} on port {}",
        elevator_id.as_deref().unwrap_or("<derived>"),
        elevator_port.as_deref().unwrap_or("<default>")
    );

    loop {
        log::info!("launching {:?}", args.bin);
        let mut command = Command::new(&args.bin);
        if let Some(id) = &elevator_id {
            command.env("ELEVATOR_ID", id);
        }
        if let Some(port) = &elevator_port {
            command.env("ELEVATOR_PORT", port);
        }
        let status = command.status();

        match status {
            Ok(status) if status.success() => {
                log::warn!("elevator process exited cleanly, restarting anyway");
            }
            Ok(status) => {
                log::warn!("elevator process exited with {}, restarting", status);
            }
            Err(e) => {
                log::error!("failed to launch {:?}: {}", args.bin, e);
            }
        }

        thread::sleep(Duration::from_millis(args.restart_delay_ms));
    }
}
