use crate::error::{AnvilError, AnvilResult};
use crate::fmtbuf::BoundedBuf;
use crate::sys;
use chrono::Local;
use std::fmt;
use std::fmt::Write as _;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::str::FromStr;

/// Upper bound in bytes for one assembled log line, header included.
/// One byte is reserved; at most `LOG_BUF - 1` bytes reach the sink.
pub const LOG_BUF: usize = 2048;
/// Upper bound in bytes for the rendered timestamp/hostname header.
pub const HEADER_BUF: usize = 256;

/// Token in the header template replaced by the local hostname.
const HOST_MARKER: &str = "{host}";

/// Default header template: strftime specifiers plus the hostname token.
pub const DEFAULT_HEADER: &str = "%b %e %H:%M:%S {host} ";

/// Message severity, numbered like the system log levels: smaller means
/// more severe. A message is emitted when its level is numerically at or
/// below the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Level {
    /// Lowercase name used by configuration surfaces.
    pub fn name(&self) -> &'static str {
        match self {
            Level::Err => "err",
            Level::Warning => "warning",
            Level::Notice => "notice",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }

    fn to_syslog(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = AnvilError;

    fn from_str(s: &str) -> Result<Self, AnvilError> {
        match s {
            "err" | "error" => Ok(Level::Err),
            "warning" | "warn" => Ok(Level::Warning),
            "notice" => Ok(Level::Notice),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            other => Err(AnvilError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown log level '{}'", other),
            ))),
        }
    }
}

/// Where emitted messages go. The modes are mutually exclusive and
/// chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    /// Raw writes to the target descriptor. What a daemon uses when it
    /// stays attached to a terminal and should behave like a normal
    /// program.
    Foreground,
    /// Delegate each message to the system log at its level.
    Syslog,
    /// Timestamped writes to the log descriptor, rotatable via SIGHUP.
    File,
}

/// The logging facade. Built once at startup; the only state that moves
/// afterwards is the suppress-header flag, owned here and updated by
/// every file-mode write.
///
/// # Example
/// ```no_run
/// use daemon_anvil::{Level, Logger};
///
/// let mut log = Logger::new()
///     .level(Level::Info)
///     .logfile("/var/log/mydaemon.log");
/// log.init().unwrap();
/// log.install_rotation_handler().unwrap();
/// log.emit(Level::Notice, format_args!("daemon started\n"));
/// ```
#[derive(Debug)]
pub struct Logger {
    level: Level,
    sink: Sink,
    path: PathBuf,
    header: String,
    syslog_ident: String,
    log_fd: RawFd,
    suppress_header: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a logger with defaults: foreground sink, `notice`
    /// threshold, the stock header template, descriptor 2.
    pub fn new() -> Self {
        Logger {
            level: Level::Notice,
            sink: Sink::Foreground,
            path: PathBuf::new(),
            header: DEFAULT_HEADER.to_owned(),
            syslog_ident: String::from("daemon"),
            log_fd: sys::unix::DEFAULT_LOG_FD,
            suppress_header: false,
        }
    }

    // --- Public Getters ---

    /// Returns the configured sink.
    pub fn sink(&self) -> Sink {
        self.sink
    }

    /// Returns the minimum severity that gets emitted.
    pub fn threshold(&self) -> Level {
        self.level
    }

    /// Returns the configured log file path (empty unless in file mode).
    pub fn logfile_path(&self) -> &Path {
        &self.path
    }

    // --- Builder Methods ---

    /// Sets the verbosity threshold. Messages strictly less severe are
    /// dropped before reaching any sink.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Switches to the foreground sink.
    pub fn foreground(mut self) -> Self {
        self.sink = Sink::Foreground;
        self
    }

    /// Switches to the system log, tagging entries with `ident`.
    pub fn syslog(mut self, ident: &str) -> Self {
        self.sink = Sink::Syslog;
        self.syslog_ident = ident.to_owned();
        self
    }

    /// Switches to the file sink writing to `path`.
    pub fn logfile<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.sink = Sink::File;
        self.path = path.into();
        self
    }

    /// Sets the header template: a strftime format string in which the
    /// literal `{host}` token is replaced by the local hostname.
    pub fn header(mut self, template: &str) -> Self {
        self.header = template.to_owned();
        self
    }

    /// Points file-mode writes (and default emits) at `fd` instead of
    /// descriptor 2.
    pub fn target_fd(mut self, fd: RawFd) -> Self {
        self.log_fd = fd;
        self
    }

    // --- Startup ---

    /// Completes sink setup. In syslog mode this opens the system log
    /// under the configured ident; in file mode it opens the log file
    /// (append, create 0600) and redirects the log descriptor onto it.
    /// The foreground sink needs no setup.
    pub fn init(&self) -> AnvilResult<()> {
        match self.sink {
            Sink::Foreground => Ok(()),
            Sink::Syslog => {
                sys::unix::open_syslog(&self.syslog_ident);
                Ok(())
            }
            Sink::File => {
                let fd = sys::unix::open_append(&self.path)?;
                if fd == self.log_fd {
                    return Ok(());
                }
                let redirected = sys::unix::redirect_fd(fd, self.log_fd);
                sys::unix::close_fd(fd);
                redirected.map_err(AnvilError::from)
            }
        }
    }

    /// Records the calling process as the daemon and arms SIGHUP with
    /// restartable-syscall semantics. In file mode the handler reopens
    /// the log file; the other sinks install a no-op handler since there
    /// is nothing to rotate. Children forked later inherit the handler
    /// but are recognized by pid and do nothing.
    ///
    /// Call once at startup; a second call stacks another handler.
    pub fn install_rotation_handler(&self) -> AnvilResult<()> {
        match self.sink {
            Sink::File => sys::unix::install_rotation(&self.path, self.log_fd),
            _ => sys::unix::install_ignore(),
        }
    }

    // --- Emitting ---

    /// Emits one formatted message at `level` through the configured
    /// sink. Dropped entirely when `level` is less severe than the
    /// threshold. Output longer than the line buffer is clamped.
    pub fn emit(&mut self, level: Level, msg: fmt::Arguments<'_>) {
        self.emit_to(level, self.log_fd, msg);
    }

    /// Like [`Logger::emit`] but writes to `fd`, for callers whose
    /// descriptor 2 is temporarily wired to a child's pipe.
    pub fn emit_to(&mut self, level: Level, fd: RawFd, msg: fmt::Arguments<'_>) {
        if level > self.level {
            return;
        }
        match self.sink {
            Sink::Foreground => {
                let mut line = BoundedBuf::<LOG_BUF>::new();
                let _ = line.write_fmt(msg);
                sys::unix::write_fd(fd, line.as_bytes());
            }
            Sink::Syslog => {
                let mut line = BoundedBuf::<LOG_BUF>::new();
                let _ = line.write_fmt(msg);
                sys::unix::syslog_write(level.to_syslog(), line.as_bytes());
            }
            Sink::File => {
                let mut line = BoundedBuf::<LOG_BUF>::new();
                if !self.suppress_header {
                    self.render_header(&mut line);
                }
                let _ = line.write_fmt(msg);
                sys::unix::write_fd(fd, line.as_bytes());
                // an open line must not get a timestamp spliced into it
                self.suppress_header = !line.ends_with_newline();
            }
        }
    }

    /// Thin terminal handler for unrecoverable errors: logs the error
    /// through the configured sink and exits with a failure status.
    pub fn fatal(&mut self, err: &AnvilError) -> ! {
        self.emit(Level::Err, format_args!("{}\n", err));
        exit(1);
    }

    /// Renders the header into its own bounded buffer, then appends it
    /// to the line. A template chrono cannot render yields no header
    /// rather than a partial one.
    fn render_header(&self, line: &mut BoundedBuf<LOG_BUF>) {
        let mut hdr = BoundedBuf::<HEADER_BUF>::new();
        let now = Local::now();
        let rendered = match self.header.split_once(HOST_MARKER) {
            Some((pre, post)) => write!(hdr, "{}", now.format(pre)).and_then(|_| {
                hdr.push_bytes(sys::unix::hostname().as_bytes());
                write!(hdr, "{}", now.format(post))
            }),
            None => write!(hdr, "{}", now.format(&self.header)),
        };
        if rendered.is_ok() {
            line.push_bytes(hdr.as_bytes());
        }
    }
}

/// Formats `msg` and writes it straight to `fd`, bypassing level
/// filtering and headers. Shares the line-buffer clamp with the facade.
pub fn fd_print(fd: RawFd, msg: fmt::Arguments<'_>) {
    let mut line = BoundedBuf::<LOG_BUF>::new();
    let _ = line.write_fmt(msg);
    sys::unix::write_fd(fd, line.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_numerically() {
        assert!(Level::Err < Level::Warning);
        assert!(Level::Notice < Level::Debug);
        assert!(Level::Err <= Level::Err);
    }

    #[test]
    fn level_names_round_trip() {
        for level in [
            Level::Err,
            Level::Warning,
            Level::Notice,
            Level::Info,
            Level::Debug,
        ] {
            assert_eq!(level.name().parse::<Level>().unwrap(), level);
        }
    }

    #[test]
    fn unknown_level_name_is_rejected() {
        assert!("chatty".parse::<Level>().is_err());
    }

    #[test]
    fn defaults_match_a_terminal_attached_daemon() {
        let log = Logger::new();
        assert_eq!(log.sink(), Sink::Foreground);
        assert_eq!(log.threshold(), Level::Notice);
        assert_eq!(log.logfile_path(), Path::new(""));
    }

    #[test]
    fn logfile_builder_switches_the_sink() {
        let log = Logger::new().logfile("/tmp/anvil.log").level(Level::Debug);
        assert_eq!(log.sink(), Sink::File);
        assert_eq!(log.logfile_path(), Path::new("/tmp/anvil.log"));
        assert_eq!(log.threshold(), Level::Debug);
    }
}
