//! Clock sync gate - blocks until wall-clock time is trustworthy
//!
//! Certificate validation and transport timestamps downstream depend on a
//! correct clock, so the gate never gives up: it retries until the time source
//! reports a plausible epoch.

use std::time::Duration;

use lumen_core::{EpochSeconds, LumenResult, MIN_PLAUSIBLE_EPOCH};
use tracing::{info, warn};

/// Default NTP servers
pub const NTP_SERVERS: &[&str] = &["pool.ntp.org", "time.nist.gov"];

/// Wait between failed sync attempts
pub const SYNC_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Wall-clock time source
pub trait TimeSource {
    /// One-time configuration with the servers to query
    fn configure(&mut self, servers: &[String]);

    /// Current epoch time. Unsynchronized sources may return an implausible
    /// value (e.g. seconds since boot) rather than an error.
    fn now_epoch(&mut self) -> LumenResult<EpochSeconds>;
}

/// Blocking delay between retries
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `std::thread::sleep`
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock sync gate
#[derive(Clone, Debug)]
pub struct ClockSyncGate {
    /// Servers handed to the time source
    servers: Vec<String>,
    /// Delay after a failed attempt
    retry_interval: Duration,
    /// Sanity floor for accepted readings
    min_epoch: EpochSeconds,
}

impl ClockSyncGate {
    /// Gate with the default servers, 2 s retry interval and epoch floor
    pub fn new() -> Self {
        ClockSyncGate {
            servers: NTP_SERVERS.iter().map(|s| s.to_string()).collect(),
            retry_interval: SYNC_RETRY_INTERVAL,
            min_epoch: MIN_PLAUSIBLE_EPOCH,
        }
    }

    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_min_epoch(mut self, min_epoch: EpochSeconds) -> Self {
        self.min_epoch = min_epoch;
        self
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Block until the source reports a plausible epoch, then return it.
    /// There is no retry limit.
    pub fn sync_clock(&self, source: &mut dyn TimeSource, sleeper: &dyn Sleeper) -> EpochSeconds {
        source.configure(&self.servers);

        loop {
            match source.now_epoch() {
                Ok(epoch) if epoch >= self.min_epoch => {
                    info!(epoch = epoch.as_secs(), "fetched NTP epoch time");
                    return epoch;
                }
                Ok(epoch) => {
                    warn!(
                        epoch = epoch.as_secs(),
                        retry_in = ?self.retry_interval,
                        "fetching NTP epoch time failed, waiting to retry"
                    );
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?self.retry_interval, "time source error, waiting to retry");
                }
            }
            sleeper.sleep(self.retry_interval);
        }
    }
}

impl Default for ClockSyncGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::LumenError;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Scripted {
        readings: VecDeque<LumenResult<EpochSeconds>>,
        configured: Vec<String>,
    }

    impl TimeSource for Scripted {
        fn configure(&mut self, servers: &[String]) {
            self.configured = servers.to_vec();
        }

        fn now_epoch(&mut self) -> LumenResult<EpochSeconds> {
            self.readings
                .pop_front()
                .unwrap_or(Ok(EpochSeconds::new(1_700_000_000)))
        }
    }

    #[derive(Default)]
    struct CountingSleeper {
        slept: RefCell<Vec<Duration>>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    #[test]
    fn test_sync_retries_until_plausible() {
        let mut source = Scripted {
            readings: VecDeque::from(vec![
                Ok(EpochSeconds::new(3)),
                Err(LumenError::TimeSync("no reply".into())),
                Ok(EpochSeconds::new(1_262_304_000)),
            ]),
            configured: Vec::new(),
        };
        let sleeper = CountingSleeper::default();

        let epoch = ClockSyncGate::new().sync_clock(&mut source, &sleeper);

        assert_eq!(epoch, EpochSeconds::new(1_262_304_000));
        assert_eq!(*sleeper.slept.borrow(), vec![SYNC_RETRY_INTERVAL; 2]);
        assert_eq!(source.configured, vec!["pool.ntp.org", "time.nist.gov"]);
    }

    #[test]
    fn test_floor_itself_is_accepted() {
        let mut source = Scripted {
            readings: VecDeque::from(vec![Ok(MIN_PLAUSIBLE_EPOCH)]),
            configured: Vec::new(),
        };
        let sleeper = CountingSleeper::default();

        let epoch = ClockSyncGate::new().sync_clock(&mut source, &sleeper);

        assert_eq!(epoch, MIN_PLAUSIBLE_EPOCH);
        assert!(sleeper.slept.borrow().is_empty());
    }
}
