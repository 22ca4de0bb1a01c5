//! Reconciles a declared mode and update interval into the schedule used at run time.

use core::fmt;
use core::time::Duration;

use crate::{ConfigurationError, Mode, DEFAULT_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS};

/// Fully resolved run-time schedule.
///
/// A poll interval is present if and only if the mode is [`Mode::Qa`], and it
/// is never below [`MIN_POLL_INTERVAL_MS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EffectiveSchedule {
    mode: Mode,
    poll_interval_ms: Option<u32>,
}

impl EffectiveSchedule {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Time between two read requests, `None` in passive mode.
    pub fn poll_interval_ms(&self) -> Option<u32> {
        self.poll_interval_ms
    }
}

impl fmt::Display for EffectiveSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.poll_interval_ms {
            Some(ms) => write!(f, "Q&A, polled every {} ms", ms),
            None => f.write_str("Passive (initiative upload, every second)"),
        }
    }
}

/// Resolves `mode` and the optional `declared` interval.
///
/// Passive mode rejects any interval. Q&A mode defaults to
/// [`DEFAULT_POLL_INTERVAL_MS`] and raises shorter intervals to
/// [`MIN_POLL_INTERVAL_MS`].
pub fn resolve(
    mode: Mode,
    declared: Option<Duration>,
) -> Result<EffectiveSchedule, ConfigurationError> {
    match (mode, declared) {
        (Mode::Passive, Some(_)) => Err(ConfigurationError::IntervalInPassiveMode),
        (Mode::Passive, None) => Ok(EffectiveSchedule {
            mode,
            poll_interval_ms: None,
        }),
        (Mode::Qa, declared) => {
            let ms = match declared {
                Some(d) => {
                    u32::try_from(d.as_millis()).map_err(|_| ConfigurationError::IntervalTooLong)?
                }
                None => DEFAULT_POLL_INTERVAL_MS,
            };
            Ok(EffectiveSchedule {
                mode,
                poll_interval_ms: Some(ms.max(MIN_POLL_INTERVAL_MS)),
            })
        }
    }
}
