use core::time::Duration;

use crate::{schedule, ConfigurationError, EffectiveSchedule};

/// Represents the operating mode of the ZH03B sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// In Passive mode, the sensor pushes a reading every second on its own.
    Passive,
    /// In Q&A mode, the sensor only reports data when queried.
    Qa,
}

/// Selects which particulate matter channels are forwarded.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channels {
    pub pm1_0: bool,
    pub pm2_5: bool,
    pub pm10_0: bool,
}

impl Channels {
    /// Every channel enabled.
    pub const fn all() -> Channels {
        Channels {
            pm1_0: true,
            pm2_5: true,
            pm10_0: true,
        }
    }

    /// Returns `true` if no channel is enabled.
    pub fn is_empty(&self) -> bool {
        !(self.pm1_0 || self.pm2_5 || self.pm10_0)
    }
}

/// Configuration settings for the ZH03B sensor, as declared by the user.
///
/// A `Config` is not trusted as-is: [`Config::resolve`] turns it into the
/// [`EffectiveSchedule`] the driver runs with, or rejects it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// The operating mode of the sensor.
    pub mode: Mode,
    /// Time between two readings. Only meaningful in Q&A mode.
    pub update_interval: Option<Duration>,
    /// The channels forwarded to the registered consumers.
    pub channels: Channels,
}

impl Config {
    /// Creates a new `Config` for `mode`, without interval or channels.
    pub fn new(mode: Mode) -> Config {
        Config {
            mode,
            update_interval: None,
            channels: Channels::default(),
        }
    }

    /// Sets the device mode for the configuration.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the update interval. Only legal in Q&A mode.
    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval);
        self
    }

    /// Enables or disables the PM1.0 channel.
    pub fn pm_1_0(mut self, enabled: bool) -> Self {
        self.channels.pm1_0 = enabled;
        self
    }

    /// Enables or disables the PM2.5 channel.
    pub fn pm_2_5(mut self, enabled: bool) -> Self {
        self.channels.pm2_5 = enabled;
        self
    }

    /// Enables or disables the PM10 channel.
    pub fn pm_10_0(mut self, enabled: bool) -> Self {
        self.channels.pm10_0 = enabled;
        self
    }

    /// Validates the mode and interval pair.
    ///
    /// # Returns
    ///
    /// * `Ok(EffectiveSchedule)` with the interval defaulted and clamped in Q&A mode.
    /// * `Err(ConfigurationError)` if an interval is set in passive mode.
    pub fn resolve(&self) -> Result<EffectiveSchedule, ConfigurationError> {
        schedule::resolve(self.mode, self.update_interval)
    }
}

/// Provides default configuration values for the ZH03B sensor.
impl Default for Config {
    /// The default configuration uses `Passive` mode with no channel enabled.
    fn default() -> Config {
        Config::new(Mode::Passive)
    }
}
