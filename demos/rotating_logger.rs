//! Writes timestamped lines to ./anvil-demo.log and reopens the file on
//! SIGHUP, so an external rotation tool can rename it away:
//!
//!   cargo run --example rotating_logger &
//!   mv anvil-demo.log anvil-demo.log.1
//!   kill -HUP <pid>

use daemon_anvil::{Level, Logger};
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut log = Logger::new()
        .level(Level::Info)
        .logfile("anvil-demo.log");

    log.init()?;
    log.install_rotation_handler()?;

    println!(
        "logging to anvil-demo.log; rotate with: kill -HUP {}",
        std::process::id()
    );

    for i in 0..30 {
        log.emit(Level::Info, format_args!("tick {}\n", i));
        thread::sleep(Duration::from_secs(2));
    }
    log.emit(Level::Notice, format_args!("demo done\n"));
    Ok(())
}
