//! Child process supervision for the build hook.
//!
//! The platform kills a build that exceeds its time budget or is cancelled
//! from the UI. When that happens, a half-finished `setup:di:compile` or a
//! fan-out of static content workers must not keep running against a
//! directory tree that is about to be discarded.
//!
//! - Foreground commands run in their own process group with a parent-death
//!   signal and are tracked in a global registry.
//! - On SIGINT/SIGTERM/SIGHUP every tracked group gets SIGTERM, then SIGKILL
//!   after a grace period.
//! - Background commands are deliberately detached and never tracked.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();

/// Running foreground build commands, keyed by process group id
#[derive(Debug, Default)]
pub struct ChildRegistry {
    groups: BTreeMap<u32, String>,
    /// Set by the first teardown; a second signal must not start another
    stopping: bool,
}

impl ChildRegistry {
    /// Lock the process-wide registry, recovering from a poisoned lock
    pub fn lock_global() -> MutexGuard<'static, ChildRegistry> {
        CHILD_REGISTRY
            .get_or_init(|| Mutex::new(ChildRegistry::default()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track the group led by `pgid`, which runs `command`
    pub fn register(&mut self, pgid: u32, command: &str) {
        tracing::debug!("Tracking process group {} for `{}`", pgid, command);
        self.groups.insert(pgid, command.to_string());
    }

    pub fn unregister(&mut self, pgid: u32) {
        if self.groups.remove(&pgid).is_some() {
            tracing::debug!("Process group {} finished", pgid);
        }
    }

    pub fn count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Stop every tracked build command.
    ///
    /// Each group gets SIGTERM so `bin/magento` can exit cleanly; groups whose
    /// leader is still around after `grace_period` get SIGKILL. Only the first
    /// call does anything.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if std::mem::replace(&mut self.stopping, true) {
            tracing::debug!("Teardown already in progress");
            return;
        }

        let groups = std::mem::take(&mut self.groups);
        for (pgid, command) in &groups {
            tracing::info!("Stopping `{}` (process group {})", command, pgid);
            signal_group(*pgid, Signal::SIGTERM);
        }

        let mut remaining: Vec<u32> = groups.keys().copied().collect();
        let deadline = Instant::now() + grace_period;
        loop {
            remaining.retain(|&pgid| group_leader_alive(pgid));
            if remaining.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for pgid in remaining {
            let command = groups.get(&pgid).map(String::as_str).unwrap_or("?");
            tracing::warn!("`{}` ignored SIGTERM, killing process group {}", command, pgid);
            signal_group(pgid, Signal::SIGKILL);
        }
    }
}

/// Signal the whole group so the `php` workers under `xargs` are reached
/// too. Falls back to the leader alone if the group is already gone.
fn signal_group(pgid: u32, sig: Signal) {
    let leader = Pid::from_raw(pgid as i32);
    if let Err(e) = signal::killpg(leader, sig) {
        tracing::debug!("{} to process group {} failed: {}", sig, pgid, e);
        if let Err(e) = signal::kill(leader, sig) {
            tracing::debug!("{} to PID {} failed: {}", sig, pgid, e);
        }
    }
}

/// True while the group leader exists and has not been reaped or zombified
fn group_leader_alive(pgid: u32) -> bool {
    if signal::kill(Pid::from_raw(pgid as i32), None).is_err() {
        return false;
    }

    // State follows the parenthesised command name, which may contain spaces
    std::fs::read_to_string(format!("/proc/{pgid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
        })
        .is_none_or(|state| !matches!(state, 'Z' | 'X'))
}

/// Install SIGINT/SIGTERM/SIGHUP handlers that tear down running commands
/// and exit with `128 + signal`. Call once at startup.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::info!("Received signal {}, stopping running commands", sig);
            ChildRegistry::lock_global().terminate_all(Duration::from_secs(3));
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Process group setup for `std::process::Command`
pub trait CommandProcessGroup {
    /// Supervised: own process group, SIGTERM when the hook dies
    fn in_new_process_group(&mut self) -> &mut Self;

    /// Unsupervised: own process group only, survives the hook
    fn detached(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: setpgid and prctl are async-signal-safe and touch no
        // memory shared with the parent.
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }

    fn detached(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        self.process_group(0)
    }
}
