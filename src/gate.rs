//! # Connectivity gate
//!
//! Blocks until the modem is associated with a WIFI access point. Association is polled with an
//! exponential backoff, optionally bounded by a max. number of attempts, and may be aborted at any time
//! by a [CancellationToken].
use crate::adapter::{Adapter, Error};
use crate::config::Config;
use crate::transport::Transport;
use core::sync::atomic::{AtomicBool, Ordering};
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use log::{debug, info, warn};

/// Lock free abort flag for long running waits. May be set from interrupt context.
#[derive(Debug, Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
}

impl CancellationToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    /// Requests cancellation of all waits observing this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Re-arms the token
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

/// Errors while waiting for WIFI association
#[derive(Clone, Debug, PartialEq)]
pub enum GateError {
    /// Wait was aborted by the cancellation token
    Cancelled,

    /// Max. number of attempts reached, contains the error of the last check
    AttemptsExhausted(Error),

    /// Non recoverable transport or timer error
    Adapter(Error),
}

#[cfg(feature = "defmt")]
impl defmt::Format for GateError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            GateError::Cancelled => defmt::write!(f, "GateError::Cancelled"),
            GateError::AttemptsExhausted(e) => defmt::write!(f, "GateError::AttemptsExhausted({})", e),
            GateError::Adapter(e) => defmt::write!(f, "GateError::Adapter({})", e),
        }
    }
}

/// Polls the WIFI association state until positive
pub struct ConnectivityGate<const TIMER_HZ: u32> {
    /// Delay after the first failed check
    poll_interval: TimerDurationU32<TIMER_HZ>,

    /// Upper bound of the delay
    max_poll_interval: TimerDurationU32<TIMER_HZ>,

    /// Max. number of checks, None => unbounded
    max_attempts: Option<u32>,
}

impl<const TIMER_HZ: u32> Default for ConnectivityGate<TIMER_HZ> {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl<const TIMER_HZ: u32> ConnectivityGate<TIMER_HZ> {
    pub fn new(config: &Config) -> Self {
        Self {
            poll_interval: TimerDurationU32::millis(config.poll_interval_ms),
            max_poll_interval: TimerDurationU32::millis(config.max_poll_interval_ms.max(config.poll_interval_ms)),
            max_attempts: config.max_wifi_attempts,
        }
    }

    /// Blocks until the modem reports an association. Returns the number of checks needed.
    pub fn wait<P: Transport, T: Timer<TIMER_HZ>>(
        &self,
        adapter: &mut Adapter<P, T, TIMER_HZ>,
        cancel: &CancellationToken,
    ) -> Result<u32, GateError> {
        let mut interval = self.poll_interval;
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                warn!("Waiting for WIFI cancelled after {} attempts", attempts);
                return Err(GateError::Cancelled);
            }

            attempts += 1;
            let error = match adapter.check_wifi_association() {
                Ok(_) => {
                    info!("WIFI associated after {} attempts", attempts);
                    return Ok(attempts);
                }
                Err(error @ (Error::TransportError(_) | Error::TimerError)) => {
                    return Err(GateError::Adapter(error));
                }
                Err(error) => error,
            };

            if self.max_attempts.is_some_and(|max| attempts >= max) {
                warn!("WIFI not associated, giving up after {} attempts", attempts);
                return Err(GateError::AttemptsExhausted(error));
            }

            debug!("WIFI not associated ({:?}), retrying in {} ms", error, interval.to_millis());
            Self::sleep(adapter, interval, cancel)?;
            interval = self.next_interval(interval);
        }
    }

    /// Waits for the initial poll interval, e.g. before retrying a failed step
    pub fn pause<P: Transport, T: Timer<TIMER_HZ>>(
        &self,
        adapter: &mut Adapter<P, T, TIMER_HZ>,
        cancel: &CancellationToken,
    ) -> Result<(), GateError> {
        Self::sleep(adapter, self.poll_interval, cancel)
    }

    /// Doubles the interval, bounded by the max. interval
    fn next_interval(&self, interval: TimerDurationU32<TIMER_HZ>) -> TimerDurationU32<TIMER_HZ> {
        let doubled = interval.ticks().saturating_mul(2);
        TimerDurationU32::from_ticks(doubled.min(self.max_poll_interval.ticks()))
    }

    /// Waits for the given duration on the adapter timer. Checks the token on each timer poll.
    fn sleep<P: Transport, T: Timer<TIMER_HZ>>(
        adapter: &mut Adapter<P, T, TIMER_HZ>,
        duration: TimerDurationU32<TIMER_HZ>,
        cancel: &CancellationToken,
    ) -> Result<(), GateError> {
        adapter
            .timer
            .start(duration)
            .map_err(|_| GateError::Adapter(Error::TimerError))?;

        loop {
            if cancel.is_cancelled() {
                return Err(GateError::Cancelled);
            }

            match adapter.timer.wait() {
                Ok(_) => return Ok(()),
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(_)) => return Err(GateError::Adapter(Error::TimerError)),
            }
        }
    }
}
