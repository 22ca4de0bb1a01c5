#![cfg_attr(not(test), no_std)]

use core::convert::Infallible;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, ReadReady, Write};
use log::{debug, error, info, warn};

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

mod clock;
pub use clock::*;

pub mod codec;
pub use codec::{
    decode, decode_frame, encode_dormant, encode_mode_switch, encode_poll_request, Command,
    Frame, FrameDecoder, SensorFrame, RX_BUFFER_LEN,
};

mod schedule;
pub use schedule::*;

mod sink;
pub use sink::*;

/// Lifecycle of a session with the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Created, nothing sent yet.
    Idle,
    /// Waiting for the sensor to acknowledge the mode switch.
    ModeSwitching,
    /// Passive mode: consuming the frames the sensor pushes every second.
    Streaming,
    /// Q&A mode: requesting a reading once per poll interval.
    Polling,
    /// Torn down. No transition leaves this state.
    Stopped,
}

/// Health of the link as seen by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStatus {
    /// Failures since the last successful reading.
    pub consecutive_failures: u8,
    /// Set once `consecutive_failures` reaches [`DEGRADED_THRESHOLD`].
    pub degraded: bool,
    /// Most recent recoverable failure.
    pub last_error: Option<ProtocolError>,
    /// [`Clock::now_ms`] at the last successful reading.
    pub last_reading_ms: Option<u64>,
}

/// Represents a ZH03B particulate matter sensor session.
///
/// The session owns the serial link for its whole lifetime and runs with one
/// [`EffectiveSchedule`], resolved when it is created. A different
/// configuration needs a new session.
///
/// # Type Parameters
///
/// * `Serial`: The serial interface connected to the sensor. It must implement
///   `embedded_io_async::Read`, `ReadReady` and `Write`.
/// * `Delay`: Used to yield while waiting for bytes or for the next poll.
/// * `Clk`: Monotonic time source for deadlines.
/// * `H`: The consumer handle registered for each enabled channel.
pub struct Zh03b<Serial, Delay, Clk, H> {
    serial: Serial,
    delay: Delay,
    clock: Clk,
    schedule: EffectiveSchedule,
    sink: ReadingSink<H>,
    decoder: FrameDecoder,
    state: State,
    dormant: bool,
    next_poll_ms: u64,
    link: LinkStatus,
}

impl<S, D, C, H> Zh03b<S, D, C, H>
where
    S: Read + ReadReady + Write,
    D: DelayNs,
    C: Clock,
    H: Publisher,
{
    /// Creates a new session.
    ///
    /// Resolves `config` and registers one handle per enabled channel with
    /// `registry`. Nothing is sent to the sensor until [`Zh03b::start`].
    ///
    /// # Returns
    ///
    /// * `Err(ConfigurationError)` if the mode and update interval do not go together.
    pub fn new<R>(
        serial: S,
        delay: D,
        clock: C,
        config: &Config,
        registry: &mut R,
    ) -> Result<Self, ConfigurationError>
    where
        R: Registry<Handle = H>,
    {
        let schedule = config.resolve()?;
        if let (Some(declared), Some(effective)) =
            (config.update_interval, schedule.poll_interval_ms())
        {
            if declared.as_millis() < u128::from(effective) {
                warn!(
                    "update_interval of {} ms is shorter than the sensor measurement cycle, raised to {} ms",
                    declared.as_millis(),
                    effective
                );
            }
        }
        if config.channels.is_empty() {
            warn!("No PM channel enabled, readings will be decoded but not published");
        }

        Ok(Self {
            serial,
            delay,
            clock,
            schedule,
            sink: ReadingSink::register(config.channels, registry),
            decoder: FrameDecoder::new(),
            state: State::Idle,
            dormant: false,
            next_poll_ms: 0,
            link: LinkStatus::default(),
        })
    }

    /// Current lifecycle state of the session.
    pub fn state(&self) -> State {
        self.state
    }

    /// Mode and poll interval the session runs with, after clamping.
    ///
    /// # Returns
    ///
    /// * `poll_interval_ms()` is `None` in passive mode.
    pub fn schedule(&self) -> EffectiveSchedule {
        self.schedule
    }

    /// Snapshot of the link health: failure count, degraded flag, last error
    /// and time of the last reading.
    pub fn link_status(&self) -> LinkStatus {
        self.link
    }

    /// Whether the sensor was put to sleep with [`Zh03b::set_dormant`].
    pub fn is_dormant(&self) -> bool {
        self.dormant
    }

    /// Starts the session.
    ///
    /// This involves:
    /// - Discarding whatever is pending on the serial link.
    /// - Sending the mode switch command for the configured mode.
    /// - Waiting for the sensor to acknowledge it. In passive mode a stream
    ///   frame is accepted as acknowledgment.
    ///
    /// A missing acknowledgment stops the session and returns
    /// `Err(Error::ModeSwitchTimeout)`.
    pub async fn start(&mut self) -> Result<(), Error> {
        match self.state {
            State::Idle => {}
            State::Stopped => return Err(Error::NotRunning),
            _ => {
                debug!("Session already started ({:?})", self.state);
                return Ok(());
            }
        }

        let channels = self.sink.channels();
        info!("ZH03B particulate matter sensor:");
        info!("  Mode: {}", self.schedule);
        for (channel, enabled) in [
            (Channel::Pm1_0, channels.pm1_0),
            (Channel::Pm2_5, channels.pm2_5),
            (Channel::Pm10_0, channels.pm10_0),
        ] {
            info!("  {}: {}", channel.as_str(), if enabled { "on" } else { "off" });
        }

        self.state = State::ModeSwitching;
        if let Err(e) = self.switch_mode().await {
            error!(
                "Failed to set mode to {:?} during start: {}",
                self.schedule.mode(),
                e
            );
            self.stop();
            return Err(e);
        }

        self.state = match self.schedule.mode() {
            Mode::Passive => State::Streaming,
            Mode::Qa => {
                // first reading once the sensor had a full cycle to warm up
                self.next_poll_ms = self.clock.now_ms() + u64::from(self.poll_interval_ms());
                State::Polling
            }
        };
        debug!("ZH03B start sequence complete, now {:?}", self.state);
        Ok(())
    }

    /// Runs one iteration of the session.
    ///
    /// In passive mode, waits for the next stream frame. In Q&A mode, waits
    /// for the next poll tick, requests a reading and waits for the answer.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(frame))` when a reading was decoded and forwarded.
    /// * `Ok(None)` after a recoverable failure, counted in [`LinkStatus`], or while dormant.
    /// * `Err(Error)` on serial failures, or if the session is not running.
    pub async fn step(&mut self) -> Result<Option<SensorFrame>, Error> {
        match self.state {
            State::Streaming | State::Polling if self.dormant => {
                self.delay.delay_ms(STREAM_PERIOD_MS).await;
                Ok(None)
            }
            State::Streaming => self.stream_step().await,
            State::Polling => self.poll_step().await,
            _ => Err(Error::NotRunning),
        }
    }

    /// Starts the session and steps it until a hard error occurs.
    pub async fn run(&mut self) -> Result<Infallible, Error> {
        self.start().await?;
        loop {
            self.step().await?;
        }
    }

    /// Turns the sensor fan and laser off (`true`) or back on (`false`).
    ///
    /// No reading is requested and no failure is counted while dormant.
    /// Waking up in Q&A mode restarts the warm-up interval. Stream frames
    /// received before the acknowledgment are still forwarded.
    ///
    /// # Returns
    ///
    /// * `Err(Error::CommandRejected)` if the sensor answered with a failure status.
    /// * `Err(Error::DormantTimeout)` if it did not answer at all.
    pub async fn set_dormant(&mut self, dormant: bool) -> Result<(), Error> {
        if !matches!(self.state, State::Streaming | State::Polling) {
            return Err(Error::NotRunning);
        }

        debug!("Setting dormant mode to {}", dormant);
        self.drain().await?;
        self.write(&encode_dormant(dormant)).await?;

        let deadline = self.clock.now_ms() + u64::from(ACK_TIMEOUT_MS);
        loop {
            match self.next_frame(deadline, ProtocolError::PollTimeout).await? {
                Ok(Frame::DormantAck(true)) => break,
                Ok(Frame::DormantAck(false)) => {
                    error!("Sensor rejected dormant command ({})", dormant);
                    return Err(Error::CommandRejected);
                }
                Ok(Frame::Stream(frame)) if self.state == State::Streaming => {
                    self.deliver(frame);
                }
                Ok(other) => debug!("Ignoring {:?} while waiting for dormant ack", other),
                Err(_) => {
                    error!("Timeout waiting for dormant ack");
                    return Err(Error::DormantTimeout);
                }
            }
        }

        self.dormant = dormant;
        if !dormant && self.state == State::Polling {
            self.next_poll_ms = self.clock.now_ms() + u64::from(self.poll_interval_ms());
        }
        Ok(())
    }

    /// Tears the session down. Terminal: the session can not be restarted.
    pub fn stop(&mut self) {
        if self.state != State::Stopped {
            debug!("Stopping ZH03B session");
        }
        self.state = State::Stopped;
        self.decoder.clear();
    }

    /// Stops the session and hands the serial link back.
    pub fn release(mut self) -> S {
        self.stop();
        self.serial
    }

    async fn switch_mode(&mut self) -> Result<(), Error> {
        let mode = self.schedule.mode();
        self.drain().await?;
        debug!("Setting sensor to {:?} mode", mode);
        self.write(&encode_mode_switch(mode)).await?;

        let deadline = self.clock.now_ms() + u64::from(ACK_TIMEOUT_MS);
        loop {
            match self.next_frame(deadline, ProtocolError::PollTimeout).await? {
                Ok(Frame::ModeAck(acked)) if acked == mode => {
                    debug!("Mode set to {:?}", mode);
                    return Ok(());
                }
                Ok(Frame::Stream(frame)) if mode == Mode::Passive => {
                    // the sensor started streaming before (or instead of) echoing
                    debug!("Passive stream already running");
                    self.deliver(frame);
                    return Ok(());
                }
                Ok(other) => debug!("Ignoring {:?} while switching mode", other),
                Err(_) => return Err(Error::ModeSwitchTimeout),
            }
        }
    }

    async fn stream_step(&mut self) -> Result<Option<SensorFrame>, Error> {
        let deadline = self.clock.now_ms() + u64::from(STREAM_TIMEOUT_MS);
        loop {
            match self.next_frame(deadline, ProtocolError::StreamTimeout).await? {
                Ok(Frame::Stream(frame)) => return Ok(Some(self.deliver(frame))),
                Ok(other) => debug!("Ignoring {:?} in passive mode", other),
                Err(e) => {
                    self.record_failure(e);
                    return Ok(None);
                }
            }
        }
    }

    async fn poll_step(&mut self) -> Result<Option<SensorFrame>, Error> {
        let now = self.clock.now_ms();
        if self.next_poll_ms > now {
            let wait = u32::try_from(self.next_poll_ms - now).unwrap_or(u32::MAX);
            self.delay.delay_ms(wait).await;
        }

        // a late answer to a previous request is not a fresh reading
        self.drain().await?;
        debug!("Requesting Q&A reading");
        self.write(&encode_poll_request()).await?;

        let deadline = self.clock.now_ms() + u64::from(RESPONSE_TIMEOUT_MS);
        let reading = loop {
            match self.next_frame(deadline, ProtocolError::PollTimeout).await? {
                Ok(Frame::Reading(frame)) => break Some(self.deliver(frame)),
                Ok(other) => debug!("Ignoring {:?} in Q&A mode", other),
                Err(e) => {
                    self.record_failure(e);
                    break None;
                }
            }
        };

        self.next_poll_ms = self.clock.now_ms() + u64::from(self.poll_interval_ms());
        Ok(reading)
    }

    // Waits for the next decodable frame until `deadline_ms`. Recoverable
    // failures come back in the inner result.
    async fn next_frame(
        &mut self,
        deadline_ms: u64,
        on_timeout: ProtocolError,
    ) -> Result<Result<Frame, ProtocolError>, Error> {
        let mut last_decode_error = None;
        loop {
            loop {
                match self.decoder.next_frame() {
                    Ok(frame) => return Ok(Ok(frame)),
                    Err(DecodeError::Incomplete) => break,
                    Err(e) => {
                        warn!("Discarding frame: {}", e);
                        last_decode_error = Some(e);
                    }
                }
            }

            if self.clock.now_ms() >= deadline_ms {
                return Ok(Err(
                    last_decode_error.map_or(on_timeout, ProtocolError::Decode)
                ));
            }
            self.receive().await?;
        }
    }

    // Moves the available bytes into the decoder, or yields if there are none.
    async fn receive(&mut self) -> Result<(), Error> {
        let mut received = 0;
        if self.read_ready()? {
            let mut buffer = [0u8; RX_BUFFER_LEN];
            received = self.serial.read(&mut buffer).await.map_err(|e| {
                error!("Serial read error: {:?}", e);
                Error::ReadFailure
            })?;
            self.decoder.push(&buffer[..received]);
        }
        if received == 0 {
            self.delay.delay_ms(RX_POLL_STEP_MS).await;
        }
        Ok(())
    }

    // Discards everything pending on the link and in the decoder.
    async fn drain(&mut self) -> Result<(), Error> {
        let mut buffer = [0u8; RX_BUFFER_LEN];
        let mut dropped = 0;
        while self.read_ready()? {
            let n = self.serial.read(&mut buffer).await.map_err(|e| {
                error!("Serial read error while draining: {:?}", e);
                Error::ReadFailure
            })?;
            if n == 0 {
                break;
            }
            dropped += n;
        }
        dropped += self.decoder.len();
        self.decoder.clear();
        if dropped > 0 {
            debug!("Discarded {} pending bytes", dropped);
        }
        Ok(())
    }

    fn read_ready(&mut self) -> Result<bool, Error> {
        self.serial.read_ready().map_err(|e| {
            error!("Serial read error: {:?}", e);
            Error::ReadFailure
        })
    }

    // Writes a 9-byte command to the serial port.
    async fn write(&mut self, command: &Command) -> Result<(), Error> {
        debug!("Executing command: {:02X?}", command);
        self.serial.flush().await.map_err(|_| Error::WriteFailure)?;
        self.serial
            .write_all(command)
            .await
            .map_err(|_| Error::WriteFailure)?;
        self.serial.flush().await.map_err(|_| Error::WriteFailure)?; // Ensure data is sent
        Ok(())
    }

    fn deliver(&mut self, frame: SensorFrame) -> SensorFrame {
        debug!(
            "PM1.0: {:?}, PM2.5: {:?}, PM10: {:?} µg/m³",
            frame.pm1_0, frame.pm2_5, frame.pm10_0
        );
        self.sink.forward(&frame);

        if self.link.degraded {
            info!("Link restored");
            self.sink.link_restored();
        }
        self.link.degraded = false;
        self.link.consecutive_failures = 0;
        self.link.last_reading_ms = Some(self.clock.now_ms());
        frame
    }

    fn record_failure(&mut self, e: ProtocolError) {
        warn!("{}", e);
        self.link.last_error = Some(e);
        self.link.consecutive_failures = self.link.consecutive_failures.saturating_add(1);
        if !self.link.degraded && self.link.consecutive_failures >= DEGRADED_THRESHOLD {
            warn!(
                "Link degraded after {} consecutive failures",
                self.link.consecutive_failures
            );
            self.link.degraded = true;
            self.sink.link_degraded();
        }
    }

    fn poll_interval_ms(&self) -> u32 {
        // always set in Q&A mode
        self.schedule
            .poll_interval_ms()
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
    }
}
