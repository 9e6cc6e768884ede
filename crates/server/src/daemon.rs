//! Process-state management: the pidfile advisory lock and `--stop` (see
//! §6, "Process state").
//!
//! Full daemonization (double-fork + session detach) is explicitly named an
//! external collaborator out of scope for this core; `daemonize()` is a
//! documented no-op seam rather than a faked background mode.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs4::fs_std::FileExt;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use stellite_core::{Error, Result};

/// Holds the exclusive advisory lock on the pidfile for the process
/// lifetime; dropping it releases the lock (the OS also releases it on
/// process exit, but an explicit guard keeps cleanup deterministic in
/// tests).
pub struct PidFileGuard {
    file: File,
    path: std::path::PathBuf,
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire the pidfile's exclusive advisory lock and write this process's
/// pid into it. Fails if another live process already holds the lock.
pub fn acquire_pidfile(path: &Path) -> Result<PidFileGuard> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| Error::other(format!("opening pidfile {}: {e}", path.display())))?;

    FileExt::try_lock_exclusive(&file)
        .map_err(|e| Error::other(format!("pidfile {} is already locked: {e}", path.display())))?;

    write!(file, "{}", std::process::id())
        .map_err(|e| Error::other(format!("writing pidfile {}: {e}", path.display())))?;

    Ok(PidFileGuard {
        file,
        path: path.to_owned(),
    })
}

/// Read the pid from `path` and send it `SIGQUIT`, matching `--stop`'s
/// documented behaviour.
pub fn stop(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::other(format!("reading pidfile {}: {e}", path.display())))?;
    let pid: i32 = text
        .trim()
        .parse()
        .map_err(|e| Error::other(format!("malformed pidfile {}: {e}", path.display())))?;

    signal::kill(Pid::from_raw(pid), Signal::SIGQUIT)
        .map_err(|e| Error::other(format!("sending SIGQUIT to pid {pid}: {e}")))
}

/// Documented no-op: full daemonization is out of scope for this core (see
/// §1). The binary always runs in the foreground.
pub fn daemonize() -> Result<()> {
    Err(Error::other(
        "daemonization (double-fork + session detach) is not implemented; run under a supervisor instead",
    ))
}
