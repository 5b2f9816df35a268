//! Deferred device restart
//!
//! A reset command only arms the pending marker. The main loop performs the
//! restart once the grace interval has elapsed, which leaves the transport time
//! to acknowledge the command before the device goes down.

use std::time::Duration;

use lumen_core::Tick;
use tracing::{error, info, warn};

/// Delay between arming and restarting
pub const RESTART_GRACE: Duration = Duration::from_millis(500);

/// Pending restart marker
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingRestart {
    armed_at: Option<Tick>,
}

impl PendingRestart {
    /// Arm at `now`. Re-arming moves the arming time.
    pub fn arm(&mut self, now: Tick) {
        self.armed_at = Some(now);
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    pub fn armed_at(&self) -> Option<Tick> {
        self.armed_at
    }

    /// Armed and at least `grace` has passed since arming
    pub fn is_due(&self, now: Tick, grace: Duration) -> bool {
        match self.armed_at {
            Some(armed_at) => now.saturating_since(armed_at) >= grace,
            None => false,
        }
    }
}

/// Irreversible device restart
pub trait DeviceReset {
    /// Restart the device. Real implementations do not return.
    fn restart(&mut self);
}

/// Restarts the current process: re-executes the binary on Unix, exits elsewhere
/// (or when exec fails) so a supervisor can start it again.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRestart;

/// Exit status used when the process cannot re-execute itself
pub const RESTART_EXIT_CODE: i32 = 3;

impl DeviceReset for ProcessRestart {
    fn restart(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            match std::env::current_exe() {
                Ok(exe) => {
                    let err = std::process::Command::new(exe)
                        .args(std::env::args_os().skip(1))
                        .exec();
                    error!(error = %err, "re-exec failed");
                }
                Err(e) => error!(error = %e, "cannot locate current executable"),
            }
        }

        warn!(code = RESTART_EXIT_CODE, "exiting for restart");
        std::process::exit(RESTART_EXIT_CODE);
    }
}

/// Owns the pending marker and performs the restart when it falls due
pub struct RestartCoordinator {
    pending: PendingRestart,
    grace: Duration,
    reset: Box<dyn DeviceReset>,
}

impl RestartCoordinator {
    pub fn new(grace: Duration, reset: Box<dyn DeviceReset>) -> Self {
        RestartCoordinator {
            pending: PendingRestart::default(),
            grace,
            reset,
        }
    }

    pub fn pending(&self) -> PendingRestart {
        self.pending
    }

    pub fn pending_mut(&mut self) -> &mut PendingRestart {
        &mut self.pending
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Restart if due. Returns whether the restart was performed.
    pub fn poll(&mut self, now: Tick) -> bool {
        if !self.pending.is_due(now, self.grace) {
            return false;
        }
        info!(
            armed_at = ?self.pending.armed_at(),
            now = ?now,
            "restarting device"
        );
        self.reset.restart();
        true
    }
}
