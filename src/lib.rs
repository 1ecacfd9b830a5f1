//! # DaemonAnvil
//!
//! **DaemonAnvil** is a small utility library for Unix daemons covering the
//! two chores every long-running service does once at startup: dropping
//! root privileges to a named unprivileged account, and routing leveled
//! log output to a terminal, the system log, or a rotatable log file.
//!
//! Both facilities are synchronous, single-threaded setup code. Failures
//! are returned as [`AnvilError`] values meant to be handed to
//! [`Logger::fatal`] immediately; there is no recovery path once the
//! process is in an undefined privilege or I/O state.
//!

#![cfg(unix)]

mod error;
mod fmtbuf;
mod identity;
mod logger;
mod sys;
mod types;

// Re-export public types to keep the API flat
pub use error::{AnvilError, AnvilResult};
pub use fmtbuf::BoundedBuf;
pub use identity::IdentityChange;
pub use logger::{fd_print, Level, Logger, Sink, DEFAULT_HEADER, HEADER_BUF, LOG_BUF};
pub use types::Account;
