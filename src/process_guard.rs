//! Lifecycle management for external tool processes
//!
//! Terraform creates real infrastructure. If clustergen is interrupted while
//! `terraform apply` is running, the tool must not keep going unattended.
//!
//! - Tools are spawned in their own process group with a parent-death signal
//! - Every running tool PID is tracked in a global [`ChildRegistry`]
//! - On SIGINT/SIGTERM/SIGHUP or when a [`ProcessGuard`] drops, each tracked
//!   group gets SIGTERM, then SIGKILL once the grace period runs out
//!
//! A signal does not exit the process. The interrupted tool returns to its
//! caller like any failed run, so the cluster asset still reads back the
//! Terraform state and stages metadata, and the store persists both. `main`
//! exits with `128 + signal` afterwards. A second signal exits immediately.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Grace period used when the guard drops
pub const DROP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Grace period used from the signal handler thread
pub const SIGNAL_GRACE_PERIOD: Duration = Duration::from_secs(3);

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Signal number of the first shutdown request, 0 if none
static SHUTDOWN_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Signal that requested shutdown, if one arrived
pub fn shutdown_requested() -> Option<i32> {
    match SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        0 => None,
        sig => Some(sig),
    }
}

/// Name of a signal number, e.g. `SIGINT`
pub fn signal_name(sig: i32) -> &'static str {
    Signal::try_from(sig).map(Signal::as_str).unwrap_or("signal")
}

/// Record a shutdown request for `sig` and stop every running tool.
///
/// Returns once the tools are gone; the process keeps running so callers
/// waiting on a tool can finish their bookkeeping.
pub fn interrupt(sig: i32) {
    SHUTDOWN_SIGNAL.store(sig, Ordering::SeqCst);
    ChildRegistry::with_global(|registry| registry.terminate_all(SIGNAL_GRACE_PERIOD));
}

/// PIDs (and therefore process group IDs) of running tools
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    terminating: bool,
}

impl ChildRegistry {
    /// The process-wide registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Run `f` against the global registry; a poisoned lock is recovered.
    pub fn with_global<R>(f: impl FnOnce(&mut ChildRegistry) -> R) -> R {
        let registry = Self::global();
        let mut guard = registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    /// Track `pid`. A tool that starts after termination began is stopped
    /// right away.
    pub fn register(&mut self, pid: u32) {
        if self.terminating {
            warn!(pid, "Tool started during shutdown, terminating it");
            signal_tree(pid, Signal::SIGTERM);
        }
        self.pids.insert(pid);
        debug!(pid, "Tracking tool process");
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!(pid, "Stopped tracking tool process");
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Whether [`ChildRegistry::terminate_all`] already ran
    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    /// Terminate every tracked process group.
    ///
    /// SIGTERM first, SIGKILL for whatever is still alive after
    /// `grace_period`. Only the first call does anything.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.terminating {
            debug!("Tool termination already in progress");
            return;
        }
        self.terminating = true;

        if self.pids.is_empty() {
            return;
        }

        let pids: Vec<u32> = self.pids.drain().collect();
        info!("Terminating {} running tool process(es)", pids.len());

        for &pid in &pids {
            signal_tree(pid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace_period;
        while Instant::now() < deadline {
            if !pids.iter().any(|&pid| is_process_alive(pid)) {
                info!("Tool processes exited after SIGTERM");
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in pids.iter().filter(|&&pid| is_process_alive(pid)) {
            warn!(pid, "Tool ignored SIGTERM, sending SIGKILL");
            signal_tree(pid, Signal::SIGKILL);
        }
    }
}

/// Signal the process group led by `pid`, falling back to the process itself.
fn signal_tree(pid: u32, sig: Signal) {
    if let Err(group_err) = send_signal_to_group(pid, sig) {
        debug!(pid, %group_err, "Group signal failed, signalling process");
        if let Err(e) = send_signal(pid, sig) {
            // ESRCH: already gone
            if e != nix::errno::Errno::ESRCH {
                error!(pid, "Failed to send {}: {}", sig, e);
            }
        }
    }
}

fn raw_pid(pid: u32) -> i32 {
    i32::try_from(pid).unwrap_or(i32::MAX)
}

fn send_signal(pid: u32, sig: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(raw_pid(pid)), sig)
}

/// Negative PID addresses the whole group, so providers spawned by
/// Terraform are reached too.
fn send_signal_to_group(pgid: u32, sig: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-raw_pid(pgid)), sig)
}

/// Exists and is not a zombie
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(raw_pid(pid)), None).is_err() {
        return false;
    }
    // Field 3 of /proc/<pid>/stat is the state letter
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_none_or(|state| !matches!(state, "Z" | "X")),
        Err(_) => true,
    }
}

/// Terminates all tracked tools when dropped.
///
/// The binary holds one for the duration of `main`.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }

    pub fn child_count(&self) -> usize {
        self.registry.lock().map(|r| r.count()).unwrap_or(0)
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(DROP_GRACE_PERIOD);
        }
    }
}

/// Install SIGINT/SIGTERM/SIGHUP handlers. Call once at startup.
///
/// The first signal goes through [`interrupt`]; check
/// [`shutdown_requested`] before exiting. A second signal exits with
/// `128 + signal` without waiting.
pub fn init_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                let name = signal_name(sig);
                if shutdown_requested().is_some() {
                    error!("Received {} again, exiting immediately", name);
                    std::process::exit(128 + sig);
                }
                warn!("Received {}, stopping running tools", name);
                interrupt(sig);
            }
        })?;

    Ok(())
}

/// Process group setup for [`std::process::Command`]
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group that receives
    /// SIGTERM if this process dies.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;

        self.process_group(0);
        // SAFETY: prctl is async-signal-safe and touches no shared state.
        unsafe {
            self.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    /// Reap `pid` if it is our child, or wait until it is gone.
    fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
        use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match waitpid(Pid::from_raw(raw_pid(pid)), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return true,
                Err(nix::errno::Errno::ECHILD) if !is_process_alive(pid) => return true,
                _ => {}
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_register_unregister() {
        let mut registry = ChildRegistry::default();
        registry.register(10);
        registry.register(20);
        registry.register(10);
        assert_eq!(registry.count(), 2);
        registry.unregister(10);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_terminate_kills_process_group() {
        let child = Command::new("bash")
            .args(["-c", "sleep 60"])
            .in_new_process_group()
            .spawn()
            .expect("spawn");
        let pid = child.id();

        let mut registry = ChildRegistry::default();
        registry.register(pid);
        assert!(is_process_alive(pid));

        registry.terminate_all(Duration::from_millis(500));
        assert!(wait_for_exit(pid, Duration::from_secs(2)));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_sigterm_trap_exits_cleanly() {
        let child = Command::new("bash")
            .args(["-c", "trap 'exit 0' TERM; sleep 60 & wait"])
            .in_new_process_group()
            .spawn()
            .expect("spawn");
        let pid = child.id();
        std::thread::sleep(Duration::from_millis(50));

        let mut registry = ChildRegistry::default();
        registry.register(pid);
        registry.terminate_all(Duration::from_secs(2));
        assert!(wait_for_exit(pid, Duration::from_secs(3)));
    }

    #[test]
    fn test_terminate_only_runs_once() {
        let mut registry = ChildRegistry::default();
        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.is_terminating());

        registry.register(999_999);
        registry.terminate_all(Duration::from_millis(10));
        // Second call is a no-op, the PID stays tracked
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_register_during_shutdown_stops_tool() {
        let mut registry = ChildRegistry::default();
        registry.terminate_all(Duration::from_millis(10));

        let child = Command::new("bash")
            .args(["-c", "sleep 60"])
            .in_new_process_group()
            .spawn()
            .expect("spawn");
        let pid = child.id();
        registry.register(pid);
        assert!(wait_for_exit(pid, Duration::from_secs(2)));
    }

    #[test]
    fn test_signal_name() {
        assert_eq!(signal_name(libc::SIGINT), "SIGINT");
        assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
        assert_eq!(signal_name(0), "signal");
    }

    #[test]
    fn test_already_reaped_pid_is_harmless() {
        let mut child = Command::new("bash")
            .args(["-c", "exit 0"])
            .spawn()
            .expect("spawn");
        let pid = child.id();
        child.wait().expect("wait");

        let mut registry = ChildRegistry::default();
        registry.register(pid);
        registry.terminate_all(Duration::from_millis(100));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_nonexistent_pid_is_not_alive() {
        assert!(!is_process_alive(999_999));
        assert!(send_signal(999_999, Signal::SIGTERM).is_err());
    }
}
