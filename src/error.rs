use std::fmt;
use std::io;

/// Custom error type for DaemonAnvil.
/// Provides specific details about why an identity change or a logging
/// operation failed.
#[derive(Debug)]
pub enum AnvilError {
    /// Standard IO errors (log file creation, descriptor redirection, etc.)
    Io(io::Error),
    /// The requested account does not exist in the system user database.
    UnknownUser(String),
    /// Failed to drop privileges. The message already carries the account
    /// name and the caller-supplied context label.
    PrivilegeError(String),
    /// Specific system call failure (initgroups, sigaction, chdir).
    SyscallError { call: &'static str, errno: i32 },
}

impl fmt::Display for AnvilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnvilError::Io(err) => write!(f, "IO Error: {}", err),
            AnvilError::UnknownUser(user) => {
                write!(f, "could not change to unknown user {}", user)
            }
            AnvilError::PrivilegeError(msg) => write!(f, "Privilege Drop Error: {}", msg),
            AnvilError::SyscallError { call, errno } => {
                write!(f, "Syscall '{}' failed with errno {}", call, errno)
            }
        }
    }
}

impl std::error::Error for AnvilError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnvilError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for AnvilError {
    fn from(err: io::Error) -> Self {
        AnvilError::Io(err)
    }
}

/// A specialized Result type for DaemonAnvil operations.
pub type AnvilResult<T> = Result<T, AnvilError>;
