//! Forwards decoded readings to consumers registered by the application.

use crate::{Channels, SensorFrame};

/// One particulate matter channel of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Pm1_0,
    Pm2_5,
    Pm10_0,
}

impl Channel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Channel::Pm1_0 => "PM1.0",
            Channel::Pm2_5 => "PM2.5",
            Channel::Pm10_0 => "PM10.0",
        }
    }
}

/// Handle receiving the values of one channel, in µg/m³.
pub trait Publisher {
    /// A fresh value is available.
    fn publish(&mut self, value: u16);

    /// Readings stopped arriving, the last published value is stale.
    fn link_degraded(&mut self) {}

    /// Readings arrive again after [`Publisher::link_degraded`].
    fn link_restored(&mut self) {}
}

/// Hands out one [`Publisher`] per enabled channel, once, at setup.
pub trait Registry {
    type Handle: Publisher;

    fn register(&mut self, channel: Channel) -> Self::Handle;
}

/// Routes each frame to the handles of the enabled channels.
pub struct ReadingSink<H> {
    pm1_0: Option<H>,
    pm2_5: Option<H>,
    pm10_0: Option<H>,
}

impl<H: Publisher> ReadingSink<H> {
    /// Registers a handle for every channel enabled in `channels`.
    pub fn register<R>(channels: Channels, registry: &mut R) -> Self
    where
        R: Registry<Handle = H>,
    {
        Self {
            pm1_0: channels.pm1_0.then(|| registry.register(Channel::Pm1_0)),
            pm2_5: channels.pm2_5.then(|| registry.register(Channel::Pm2_5)),
            pm10_0: channels.pm10_0.then(|| registry.register(Channel::Pm10_0)),
        }
    }

    /// Channels with a registered handle.
    pub fn channels(&self) -> Channels {
        Channels {
            pm1_0: self.pm1_0.is_some(),
            pm2_5: self.pm2_5.is_some(),
            pm10_0: self.pm10_0.is_some(),
        }
    }

    /// Publishes every present value of `frame` on its channel, skipping
    /// channels nobody registered for.
    pub fn forward(&mut self, frame: &SensorFrame) {
        let frame = frame.filter(self.channels());
        if let (Some(handle), Some(v)) = (self.pm1_0.as_mut(), frame.pm1_0) {
            handle.publish(v);
        }
        if let (Some(handle), Some(v)) = (self.pm2_5.as_mut(), frame.pm2_5) {
            handle.publish(v);
        }
        if let (Some(handle), Some(v)) = (self.pm10_0.as_mut(), frame.pm10_0) {
            handle.publish(v);
        }
    }

    pub fn link_degraded(&mut self) {
        self.handles_mut().for_each(|h| h.link_degraded());
    }

    pub fn link_restored(&mut self) {
        self.handles_mut().for_each(|h| h.link_restored());
    }

    fn handles_mut(&mut self) -> impl Iterator<Item = &mut H> {
        [
            self.pm1_0.as_mut(),
            self.pm2_5.as_mut(),
            self.pm10_0.as_mut(),
        ]
        .into_iter()
        .flatten()
    }
}
