//! Remote shell adapter driving the system `ssh` binary.
//!
//! All calls share one multiplexed master connection (`ControlMaster`), so only the first
//! call pays for the handshake. The session is a serial resource: every call takes the
//! session lock, which also makes the adapter safe to share between workers.
//!
//! The remote side needs a POSIX shell and GNU `find` (`-printf`). Ranged reads run
//! `tail -c +N | head -c L` remotely so only the requested bytes cross the wire.

use crate::core::address::PathAddress;
use crate::core::backend::{Backend, DirectoryEntry, DirectoryListing};
use crate::core::error::{BrowseError, ErrorKind, Result};

use sha2::{Digest, Sha256};

use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};

/// Exit codes of the guard snippets wrapped around remote commands.
const EXIT_MISSING: i32 = 21;
const EXIT_IS_DIR: i32 = 22;
const EXIT_NOT_DIR: i32 = 23;
/// Exit status `ssh` itself uses for connection failures.
const EXIT_SSH: i32 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteShellOptions {
    pub ssh_command: String,
    /// Idle time after which the master connection is closed and reopened on next use.
    pub idle_timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for RemoteShellOptions {
    fn default() -> Self {
        Self {
            ssh_command: "ssh".to_string(),
            idle_timeout: Duration::from_secs(300),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Session {
    last_used: Option<Instant>,
}

#[derive(Debug)]
struct Output {
    code: Option<i32>,
    stdout: Vec<u8>,
    stderr: String,
}

pub struct RemoteShellBackend {
    ssh: PathBuf,
    target: String,
    port: Option<u16>,
    control_path: PathBuf,
    extra_args: Vec<String>,
    timeout: Duration,
    idle_timeout: Duration,
    session: Mutex<Session>,
    label: String,
}

impl RemoteShellBackend {
    /// Locates `ssh` and prepares the session. No connection is opened until the first call.
    pub fn new(authority: &str, options: &RemoteShellOptions, timeout: Duration) -> Result<Self> {
        let ssh = which::which(&options.ssh_command).map_err(|_| {
            BrowseError::configuration(format!(
                "'{}' was not found in PATH; the remote shell backend needs an ssh client",
                options.ssh_command
            ))
        })?;

        let (target, port) = split_authority(authority)?;

        let digest = hex::encode(Sha256::digest(authority.as_bytes()));
        let control_path = std::env::temp_dir().join(format!(
            "lookout-{}-{}.sock",
            std::process::id(),
            &digest[..12]
        ));

        Ok(Self {
            ssh,
            target,
            port,
            control_path,
            extra_args: options.extra_args.clone(),
            timeout,
            idle_timeout: options.idle_timeout,
            session: Mutex::new(Session { last_used: None }),
            label: format!("ssh://{}", authority),
        })
    }

    fn base_args(&self) -> Vec<OsString> {
        let persist = self.idle_timeout.as_secs().max(1);
        let mut args: Vec<OsString> = vec![
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            format!("ControlPath={}", self.control_path.display()).into(),
            "-o".into(),
            format!("ControlPersist={}s", persist).into(),
            "-o".into(),
            format!("ConnectTimeout={}", self.timeout.as_secs().max(1)).into(),
        ];
        if let Some(port) = self.port {
            args.push("-p".into());
            args.push(port.to_string().into());
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// Runs `script` on the remote host under the session lock.
    fn run(&self, script: &str) -> Result<Output> {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());

        if session
            .last_used
            .is_some_and(|t| t.elapsed() > self.idle_timeout)
        {
            tracing::debug!(host = %self.target, "remote session idle, reopening");
            self.close_master();
        }

        let mut args = self.base_args();
        args.push(self.target.clone().into());
        args.push("--".into());
        args.push(script.into());

        tracing::debug!(host = %self.target, script, "remote command");
        let output = run_with_timeout(Command::new(&self.ssh).args(&args), self.timeout)?;
        session.last_used = Some(Instant::now());

        if output.code == Some(EXIT_SSH) {
            // the master may be wedged; start clean next time
            session.last_used = None;
            self.close_master();
        }
        Ok(output)
    }

    fn close_master(&self) {
        let mut cmd = Command::new(&self.ssh);
        cmd.arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .args(["-O", "exit"])
            .arg(&self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let _ = cmd.status();
        let _ = std::fs::remove_file(&self.control_path);
    }

    fn checked(&self, script: &str, addr: &PathAddress) -> Result<Vec<u8>> {
        let output = self.run(script)?;
        match output.code {
            Some(0) => Ok(output.stdout),
            code => Err(classify_failure(code, &output.stderr, addr)),
        }
    }
}

impl Backend for RemoteShellBackend {
    fn list(&self, addr: &PathAddress) -> Result<DirectoryListing> {
        let q = shell_quote(&addr.key_path());
        let script = format!(
            "{guard_dir}; find {q} -mindepth 1 -maxdepth 1 -printf '%Y\\t%s\\t%T@\\t%f\\n'; \
             printf 'REV\\t'; find {q} -maxdepth 0 -printf '%T@\\n'",
            guard_dir = guard_dir(&q),
        );
        let stdout = self.checked(&script, addr)?;
        let text = String::from_utf8_lossy(&stdout);

        let mut revision = None;
        let mut entries = Vec::new();
        for line in text.lines() {
            if let Some(rev) = line.strip_prefix("REV\t") {
                revision = Some(rev.trim().to_string());
            } else if let Some(entry) = parse_find_line(line) {
                entries.push(entry);
            }
        }

        tracing::debug!(address = %addr, count = entries.len(), "listed remote directory");
        Ok(DirectoryListing::new(addr.clone(), entries, revision))
    }

    fn stat(&self, addr: &PathAddress) -> Result<DirectoryEntry> {
        let q = shell_quote(&addr.key_path());
        let script = format!(
            "{guard}; find {q} -maxdepth 0 -printf '%Y\\t%s\\t%T@\\t%f\\n'",
            guard = guard_exists(&q),
        );
        let stdout = self.checked(&script, addr)?;
        let text = String::from_utf8_lossy(&stdout);
        let entry = text
            .lines()
            .find_map(parse_find_line)
            .ok_or_else(|| BrowseError::internal(format!("unexpected stat output for {}", addr)))?;

        // find prints "/" for the root; keep the address name instead
        let name = addr.name().unwrap_or("/");
        Ok(DirectoryEntry::new(name, entry.is_dir())
            .with_size(entry.size())
            .with_modified(entry.modified()))
    }

    fn open_range(&self, addr: &PathAddress, offset: u64, len: u64) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let q = shell_quote(&addr.key_path());
        let script = format!(
            "{guard}; [ -d {q} ] && exit {EXIT_IS_DIR}; tail -c +{start} {q} | head -c {len}",
            guard = guard_exists(&q),
            start = offset.saturating_add(1),
        );
        self.checked(&script, addr)
    }

    fn exists(&self, addr: &PathAddress) -> Result<bool> {
        let q = shell_quote(&addr.key_path());
        let output = self.run(&format!("[ -e {q} ] && echo yes || echo no"))?;
        match output.code {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).trim() == "yes"),
            code => Err(classify_failure(code, &output.stderr, addr)),
        }
    }

    fn probe_revision(&self, addr: &PathAddress, _known: Option<&str>) -> Result<Option<String>> {
        let q = shell_quote(&addr.key_path());
        let script = format!("{}; find {q} -maxdepth 0 -printf '%T@'", guard_exists(&q));
        let stdout = self.checked(&script, addr)?;
        let rev = String::from_utf8_lossy(&stdout).trim().to_string();
        Ok((!rev.is_empty()).then_some(rev))
    }

    fn shutdown(&self) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if session.last_used.take().is_some() {
            self.close_master();
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// `user@host:port` → (`user@host`, port).
fn split_authority(authority: &str) -> Result<(String, Option<u16>)> {
    let (user, host_port) = match authority.rsplit_once('@') {
        Some((user, rest)) => (Some(user), rest),
        None => (None, authority),
    };
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                BrowseError::configuration(format!("invalid port in '{}'", authority))
            })?;
            (host, Some(port))
        }
        None => (host_port, None),
    };
    if host.is_empty() {
        return Err(BrowseError::configuration(format!(
            "no host in '{}'",
            authority
        )));
    }
    let target = match user {
        Some(user) => format!("{}@{}", user, host),
        None => host.to_string(),
    };
    Ok((target, port))
}

fn guard_exists(q: &str) -> String {
    format!("[ -e {q} ] || {{ echo 'No such file or directory' >&2; exit {EXIT_MISSING}; }}")
}

fn guard_dir(q: &str) -> String {
    format!(
        "{}; [ -d {q} ] || {{ echo 'Not a directory' >&2; exit {EXIT_NOT_DIR}; }}",
        guard_exists(q)
    )
}

/// Single-quotes `s` for a POSIX shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Parses one `%Y\t%s\t%T@\t%f` line.
fn parse_find_line(line: &str) -> Option<DirectoryEntry> {
    let mut parts = line.splitn(4, '\t');
    let kind = parts.next()?;
    let size = parts.next()?.parse::<u64>().ok();
    let mtime = parts.next()?.parse::<f64>().ok();
    let name = parts.next()?;
    if name.is_empty() {
        return None;
    }

    let is_dir = kind == "d";
    let modified = mtime
        .filter(|t| t.is_finite() && *t >= 0.0)
        .map(|t| UNIX_EPOCH + Duration::from_secs_f64(t));
    Some(
        DirectoryEntry::new(name, is_dir)
            .with_size(if is_dir { None } else { size })
            .with_modified(modified)
            .with_meta("type", kind),
    )
}

fn classify_failure(code: Option<i32>, stderr: &str, addr: &PathAddress) -> BrowseError {
    let detail = stderr.trim();
    let text = format!("{}: {}", addr, if detail.is_empty() { "remote command failed" } else { detail });

    let kind = match code {
        Some(EXIT_MISSING) => ErrorKind::NotFound,
        Some(EXIT_NOT_DIR) => ErrorKind::NotFound,
        Some(EXIT_IS_DIR) => ErrorKind::UnsupportedFormat,
        Some(EXIT_SSH) => {
            if detail.contains("Permission denied (") || detail.contains("Host key verification failed") {
                ErrorKind::Auth
            } else if detail.contains("Could not resolve hostname") || detail.contains("Bad configuration") {
                ErrorKind::Configuration
            } else {
                ErrorKind::Network
            }
        }
        // killed by a signal
        None => ErrorKind::Network,
        Some(_) if detail.contains("Permission denied") => ErrorKind::PermissionDenied,
        Some(_) if detail.contains("No such file or directory") => ErrorKind::NotFound,
        Some(_) => ErrorKind::Internal,
    };
    BrowseError::new(kind, text)
}

/// Runs `cmd` to completion, killing it once `timeout` has passed.
fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut s) = stdout {
            let _ = s.read_to_end(&mut buf);
        }
        buf
    });
    let err_reader = thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut s) = stderr {
            let _ = s.read_to_string(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(Duration::from_millis(10));
    };

    let stdout = out_reader.join().unwrap_or_default();
    let stderr = err_reader.join().unwrap_or_default();

    match status {
        Some(status) => Ok(Output {
            code: status.code(),
            stdout,
            stderr,
        }),
        None => Err(BrowseError::network(format!(
            "remote command timed out after {}s",
            timeout.as_secs()
        ))),
    }
}
