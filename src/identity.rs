use crate::error::{AnvilError, AnvilResult};
use crate::logger::{Level, Logger};
use crate::sys;
use crate::types::Account;
use std::path::PathBuf;

/// Shell exported to children of the downgraded process.
const DEFAULT_SHELL: &str = "/bin/sh";

/// Irreversible switch of the process identity to an unprivileged
/// account.
///
/// Resolves the account, exports `USER`/`HOME`/`SHELL` for later
/// children, initializes supplementary groups, then lowers the real and
/// effective group and user ids. Optionally moves the working directory
/// into the account home, falling back to a caller-supplied directory.
///
/// # Example
/// ```no_run
/// use daemon_anvil::{IdentityChange, Logger};
///
/// let mut log = Logger::new();
/// let uid = IdentityChange::new("nobody")
///     .fallback_dir("/tmp")
///     .context("at startup")
///     .apply(&mut log)
///     .unwrap_or_else(|e| log.fatal(&e));
/// ```
#[derive(Debug, Clone)]
pub struct IdentityChange {
    user: String,
    fallback_dir: Option<PathBuf>,
    context: String,
}

impl IdentityChange {
    /// Targets the named account. No directory change is requested by
    /// default.
    pub fn new(user: &str) -> Self {
        IdentityChange {
            user: user.to_owned(),
            fallback_dir: None,
            context: String::new(),
        }
    }

    /// Requests a working-directory change into the account home after
    /// the drop, with `path` as the backup when the home is unusable.
    pub fn fallback_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.fallback_dir = Some(path.into());
        self
    }

    /// Label appended to every diagnostic, e.g. which job or startup
    /// phase triggered the change.
    pub fn context(mut self, label: &str) -> Self {
        self.context = label.to_owned();
        self
    }

    /// Resolves the account and downgrades the process to it, returning
    /// the resolved uid. Any error leaves the process in an undefined
    /// privilege state; callers are expected to hand it to a terminal
    /// handler such as [`Logger::fatal`] immediately and unconditionally.
    pub fn apply(&self, log: &mut Logger) -> AnvilResult<u32> {
        let acct = Account::lookup(&self.user).map_err(|e| self.labeled(e))?;

        // for the benefit of children spawned after the drop
        std::env::set_var("USER", &acct.name);
        std::env::set_var("HOME", &acct.home);
        std::env::set_var("SHELL", DEFAULT_SHELL);

        sys::unix::init_groups(&self.user, acct.gid).map_err(|e| {
            AnvilError::PrivilegeError(format!(
                "could not initgroups for user {} gid {}{}: {}",
                self.user,
                acct.gid,
                self.ctx(),
                e
            ))
        })?;
        // the gid must change while the process still has the privilege
        // to change it; lowering the uid first would lock us out
        sys::unix::set_regid(acct.gid).map_err(|e| {
            AnvilError::PrivilegeError(format!(
                "could not setregid for user {} gid {}{}: {}",
                self.user,
                acct.gid,
                self.ctx(),
                e
            ))
        })?;
        sys::unix::set_reuid(acct.uid).map_err(|e| {
            AnvilError::PrivilegeError(format!(
                "could not setreuid for user {} uid {}{}: {}",
                self.user,
                acct.uid,
                self.ctx(),
                e
            ))
        })?;

        if let Some(fallback) = &self.fallback_dir {
            if let Err(e) = sys::unix::chdir(&acct.home) {
                log.emit(
                    Level::Warning,
                    format_args!(
                        "could not chdir to {} for user {}{}: {}\n",
                        acct.home.display(),
                        self.user,
                        self.ctx(),
                        e
                    ),
                );
                sys::unix::chdir(fallback).map_err(|e| {
                    AnvilError::PrivilegeError(format!(
                        "could not chdir to {} for user {}{}: {}",
                        fallback.display(),
                        self.user,
                        self.ctx(),
                        e
                    ))
                })?;
            }
        }

        Ok(acct.uid)
    }

    fn ctx(&self) -> String {
        if self.context.is_empty() {
            String::new()
        } else {
            format!(" {}", self.context)
        }
    }

    fn labeled(&self, err: AnvilError) -> AnvilError {
        match err {
            AnvilError::UnknownUser(name) => AnvilError::PrivilegeError(format!(
                "could not change to unknown user {}{}",
                name,
                self.ctx()
            )),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_fails_before_touching_process_state() {
        let mut log = Logger::new();
        let err = IdentityChange::new("anvil-no-such-user")
            .context("during testing")
            .apply(&mut log)
            .unwrap_err();
        match err {
            AnvilError::PrivilegeError(msg) => {
                assert!(msg.contains("unknown user anvil-no-such-user"));
                assert!(msg.contains("during testing"));
            }
            other => panic!("expected PrivilegeError, got {:?}", other),
        }
    }

    #[test]
    fn context_label_is_optional() {
        let mut log = Logger::new();
        let err = IdentityChange::new("anvil-no-such-user")
            .apply(&mut log)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Privilege Drop Error: could not change to unknown user anvil-no-such-user"
        );
    }
}
