use crate::error::{AnvilError, AnvilResult};
use crate::types::Account;
use std::ffi::{CStr, CString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::OnceLock;

/// Descriptor the file sink writes to unless reconfigured. Background
/// daemons keep their log file on stderr's slot.
pub(crate) const DEFAULT_LOG_FD: libc::c_int = libc::STDERR_FILENO;

/// Plain-data snapshot reachable from the rotation signal handler.
///
/// Captured once at installation time. `pid` is the daemon's pid; forked
/// children inherit the handler but must not touch the log file.
pub(crate) struct LogfileSnapshot {
    pub pid: libc::pid_t,
    pub path: CString,
    pub fd: libc::c_int,
}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn path_cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

unsafe fn owned_cstr(ptr: *const libc::c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

// =========================================================================
// Account database
// =========================================================================

/// Resolves `name` in the system user database.
pub(crate) fn lookup_account(name: &str) -> AnvilResult<Account> {
    let cname =
        CString::new(name).map_err(|_| AnvilError::UnknownUser(name.to_owned()))?;
    let pwd = unsafe { libc::getpwnam(cname.as_ptr()) };
    if pwd.is_null() {
        return Err(AnvilError::UnknownUser(name.to_owned()));
    }
    unsafe {
        Ok(Account {
            name: owned_cstr((*pwd).pw_name),
            uid: (*pwd).pw_uid,
            gid: (*pwd).pw_gid,
            home: std::path::PathBuf::from(owned_cstr((*pwd).pw_dir)),
            shell: owned_cstr((*pwd).pw_shell),
        })
    }
}

// =========================================================================
// Identity changes
// =========================================================================

pub(crate) fn init_groups(name: &str, gid: u32) -> io::Result<()> {
    let cname = CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid user name"))?;
    if unsafe { libc::initgroups(cname.as_ptr(), gid as libc::gid_t) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn set_regid(gid: u32) -> io::Result<()> {
    if unsafe { libc::setregid(gid as libc::gid_t, gid as libc::gid_t) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn set_reuid(uid: u32) -> io::Result<()> {
    if unsafe { libc::setreuid(uid as libc::uid_t, uid as libc::uid_t) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn chdir(path: &Path) -> io::Result<()> {
    let cpath = path_cstring(path)?;
    if unsafe { libc::chdir(cpath.as_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// =========================================================================
// Descriptors and raw writes
// =========================================================================

/// Writes `bytes` to `fd` in one shot. Short writes and write errors are
/// tolerated silently, the log sink never reports them.
pub(crate) fn write_fd(fd: libc::c_int, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let _ = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
}

/// Opens `path` for appending, creating it 0600 if absent.
pub(crate) fn open_append(path: &Path) -> io::Result<libc::c_int> {
    let cpath = path_cstring(path)?;
    let fd = unsafe {
        libc::open(
            cpath.as_ptr(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
            0o600 as libc::c_uint,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

pub(crate) fn redirect_fd(fd: libc::c_int, target_fd: libc::c_int) -> io::Result<()> {
    if unsafe { libc::dup2(fd, target_fd) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn close_fd(fd: libc::c_int) {
    let _ = unsafe { libc::close(fd) };
}

pub(crate) fn pid() -> libc::pid_t {
    unsafe { libc::getpid() }
}

/// Local hostname, empty string when the lookup fails. The OS does not
/// promise termination on truncation, so the last byte is forced.
pub(crate) fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return String::new();
    }
    let last = buf.len() - 1;
    buf[last] = 0;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(last);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

// =========================================================================
// System log
// =========================================================================

static SYSLOG_IDENT: OnceLock<CString> = OnceLock::new();

/// Opens the system log with `ident`, tagging entries with the pid.
/// The first call wins; the ident string must stay alive for the whole
/// process, which the static provides.
pub(crate) fn open_syslog(ident: &str) {
    let cident = SYSLOG_IDENT.get_or_init(|| CString::new(ident).unwrap_or_default());
    unsafe { libc::openlog(cident.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON) };
}

/// Hands one formatted message to the system log at `level`. Bytes past
/// an embedded NUL are dropped, the OS interface is a C string.
pub(crate) fn syslog_write(level: libc::c_int, bytes: &[u8]) {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    if let Ok(msg) = CString::new(&bytes[..end]) {
        unsafe { libc::syslog(level, b"%s\0".as_ptr() as *const libc::c_char, msg.as_ptr()) };
    }
}

// =========================================================================
// Rotation signal
// =========================================================================

/// Reopen body shared by the SIGHUP handler. Must stay async-signal-safe:
/// open, dup2, close, getpid, and nothing that allocates. A failed reopen
/// ends the process with the OS errno, continuing with a dead log sink
/// is not an option.
pub(crate) fn reopen_logfile(snap: &LogfileSnapshot) {
    unsafe {
        if libc::getpid() != snap.pid {
            return;
        }
        let fd = libc::open(
            snap.path.as_ptr(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
            0o600 as libc::c_uint,
        );
        if fd < 0 {
            libc::_exit(last_errno());
        }
        libc::dup2(fd, snap.fd);
        libc::close(fd);
    }
}

/// Arms SIGHUP to reopen `path` over `fd`. The calling process is
/// recorded as the daemon. The handler is registered with
/// restartable-syscall semantics and stays installed for the process
/// lifetime.
pub(crate) fn install_rotation(path: &Path, fd: libc::c_int) -> AnvilResult<()> {
    let snap = LogfileSnapshot {
        pid: pid(),
        path: path_cstring(path).map_err(AnvilError::Io)?,
        fd,
    };
    let registered = unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGHUP, move || {
            reopen_logfile(&snap)
        })
    };
    match registered {
        Ok(_id) => Ok(()),
        Err(e) => Err(AnvilError::SyscallError {
            call: "sigaction",
            errno: e.raw_os_error().unwrap_or(0),
        }),
    }
}

/// Arms SIGHUP as a no-op. Foreground and syslog sinks have nothing to
/// rotate but should not die to a stray hangup either.
pub(crate) fn install_ignore() -> AnvilResult<()> {
    let registered =
        unsafe { signal_hook::low_level::register(signal_hook::consts::SIGHUP, || {}) };
    match registered {
        Ok(_id) => Ok(()),
        Err(e) => Err(AnvilError::SyscallError {
            call: "sigaction",
            errno: e.raw_os_error().unwrap_or(0),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::os::unix::io::IntoRawFd;
    use std::path::PathBuf;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("anvil-sys-{}-{}", std::process::id(), tag))
    }

    fn snapshot_for(pid: libc::pid_t, path: &Path, fd: libc::c_int) -> LogfileSnapshot {
        LogfileSnapshot {
            pid,
            path: path_cstring(path).unwrap(),
            fd,
        }
    }

    #[test]
    fn reopen_is_skipped_for_foreign_pids() {
        let original = temp_path("foreign-orig.log");
        let rotated = temp_path("foreign-rotated.log");
        let _ = fs::remove_file(&rotated);
        let fd = fs::File::create(&original).unwrap().into_raw_fd();

        let snap = snapshot_for(pid() + 1, &rotated, fd);
        reopen_logfile(&snap);
        write_fd(fd, b"stays put\n");
        close_fd(fd);

        assert_eq!(fs::read_to_string(&original).unwrap(), "stays put\n");
        assert!(!rotated.exists());
        let _ = fs::remove_file(&original);
    }

    #[test]
    fn reopen_redirects_the_descriptor_for_the_daemon_pid() {
        let original = temp_path("daemon-orig.log");
        let rotated = temp_path("daemon-rotated.log");
        let _ = fs::remove_file(&rotated);
        let fd = fs::File::create(&original).unwrap().into_raw_fd();

        let snap = snapshot_for(pid(), &rotated, fd);
        reopen_logfile(&snap);
        write_fd(fd, b"moved\n");
        close_fd(fd);

        assert_eq!(fs::read_to_string(&original).unwrap(), "");
        assert_eq!(fs::read_to_string(&rotated).unwrap(), "moved\n");
        let _ = fs::remove_file(&original);
        let _ = fs::remove_file(&rotated);
    }

    #[test]
    fn open_append_creates_with_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_path("perm.log");
        let _ = fs::remove_file(&path);
        let fd = open_append(&path).unwrap();
        write_fd(fd, b"a");
        close_fd(fd);

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_append_appends_to_existing_content() {
        let path = temp_path("append.log");
        let _ = fs::remove_file(&path);
        fs::File::create(&path)
            .unwrap()
            .write_all(b"first\n")
            .unwrap();

        let fd = open_append(&path).unwrap();
        write_fd(fd, b"second\n");
        close_fd(fd);

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn lookup_account_resolves_root() {
        let acct = lookup_account("root").unwrap();
        assert_eq!(acct.uid, 0);
        assert_eq!(acct.name, "root");
        assert!(!acct.home.as_os_str().is_empty());
    }

    #[test]
    fn lookup_account_rejects_unknown_names() {
        match lookup_account("anvil-no-such-user") {
            Err(AnvilError::UnknownUser(name)) => assert_eq!(name, "anvil-no-such-user"),
            other => panic!("expected UnknownUser, got {:?}", other.map(|a| a.name)),
        }
    }

    #[test]
    fn hostname_is_terminated() {
        let host = hostname();
        assert!(!host.contains('\0'));
    }
}
