//! Drops root privileges to the "nobody" account, the way a daemon would
//! right after binding its sockets. Run as root:
//!
//!   sudo cargo run --example drop_privs

use daemon_anvil::{IdentityChange, Level, Logger};

fn main() {
    let mut log = Logger::new().level(Level::Info);

    let uid = IdentityChange::new("nobody")
        .fallback_dir("/tmp")
        .context("in the demo")
        .apply(&mut log)
        .unwrap_or_else(|e| log.fatal(&e));

    log.emit(
        Level::Notice,
        format_args!(
            "now running as uid {} in {}\n",
            uid,
            std::env::current_dir().unwrap().display()
        ),
    );
    log.emit(
        Level::Info,
        format_args!("USER={} HOME={}\n", std::env::var("USER").unwrap_or_default(), std::env::var("HOME").unwrap_or_default()),
    );
}
