//! Polls vehicle speed and engine RPM once per second, until interrupted with ctrl-c.
//!
//! Usage: `obd-monitor [PORT]`

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use elm_obd2::{
    channel::SerialChannel,
    connection::SerialConnection,
    hardware::serial::scan_serial_ports,
    obd2, ObdError, ObdResult,
};

#[cfg(windows)]
const DEFAULT_PORT: &str = "COM5";
#[cfg(not(windows))]
const DEFAULT_PORT: &str = "/dev/ttyUSB0";

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_CHECK: Duration = Duration::from_millis(50);

fn main() {
    env_logger::builder()
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .init();

    let port = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_PORT.to_string());
    println!("Connecting to USB OBD on: {port}");

    let mut conn = match SerialConnection::open_port(&port) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Could not open {port}: {e}");
            if let Ok(ports) = scan_serial_ports() {
                eprintln!("Available ports: {ports:?}");
            }
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_ctrl_c_listener(shutdown.clone());
    conn.set_cancel_flag(Some(shutdown.clone()));

    println!("Press ctrl-c to exit");
    monitor(&mut conn, &shutdown, POLL_INTERVAL);

    // Closes the port
    drop(conn);
    println!("Exiting");
}

/// Prints speed and RPM every `interval` until `shutdown` is set.
/// Returns the number of successful polls
fn monitor<C: SerialChannel>(conn: &mut SerialConnection<C>, shutdown: &AtomicBool, interval: Duration) -> u32 {
    let mut polls = 0;
    while !shutdown.load(Ordering::Relaxed) {
        match poll(conn) {
            Ok((speed, rpm)) => {
                polls += 1;
                println!("  Speed: {speed} km/hr @ {rpm} RPM");
            }
            Err(ObdError::Cancelled) => break,
            Err(e) => log::error!("Query failed: {e}"),
        }
        wait_for_next_poll(shutdown, interval);
    }
    polls
}

/// Sets `shutdown` once ctrl-c is pressed
fn spawn_ctrl_c_listener(shutdown: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("Could not install ctrl-c handler: {e}");
                return;
            }
        };
        match rt.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                log::info!("Shutdown signal received");
                shutdown.store(true, Ordering::Relaxed);
            }
            Err(e) => log::error!("Failed to listen for ctrl-c: {e}"),
        }
    });
}

fn wait_for_next_poll(shutdown: &AtomicBool, interval: Duration) {
    let next = Instant::now() + interval;
    while !shutdown.load(Ordering::Relaxed) && Instant::now() < next {
        std::thread::sleep(SHUTDOWN_CHECK);
    }
}

fn poll<C: SerialChannel>(conn: &mut SerialConnection<C>) -> ObdResult<(u32, u32)> {
    let speed = obd2::speed(conn)?;
    let rpm = obd2::rpm(conn)?;
    Ok((speed, rpm))
}
