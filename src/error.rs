use core::fmt;

/// Rejected configuration. Raised before any session is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigurationError {
    /// An update interval was declared while in passive mode.
    IntervalInPassiveMode,
    /// The update interval does not fit in 32 bits of milliseconds.
    IntervalTooLong,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::IntervalInPassiveMode => f.write_str(
                "update_interval can only be used with QA mode; PASSIVE mode streams automatically every second",
            ),
            ConfigurationError::IntervalTooLong => {
                f.write_str("update_interval is too long, it must fit in u32 milliseconds")
            }
        }
    }
}

impl core::error::Error for ConfigurationError {}

/// Why a chunk of received bytes did not yield a frame.
///
/// None of these end a session: the decoder buffers on `Incomplete` and
/// resynchronizes on the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// More bytes are needed.
    Incomplete,
    /// The frame checksum does not match its content.
    ChecksumMismatch,
    /// The checksum matched but the frame structure is not one we know.
    Malformed,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Incomplete => f.write_str("incomplete frame"),
            DecodeError::ChecksumMismatch => f.write_str("checksum mismatch"),
            DecodeError::Malformed => f.write_str("malformed frame"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// Recoverable run-time failure, counted towards the degraded link threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Frames were received but none could be decoded before the deadline.
    Decode(DecodeError),
    /// The sensor did not answer a read request in time.
    PollTimeout,
    /// The passive stream went silent.
    StreamTimeout,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Decode(e) => write!(f, "decode error: {}", e),
            ProtocolError::PollTimeout => f.write_str("timeout waiting for Q&A response"),
            ProtocolError::StreamTimeout => f.write_str("no frame received from passive stream"),
        }
    }
}

impl core::error::Error for ProtocolError {}

/// Hard failure returned by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The serial link refused a write.
    WriteFailure,
    /// The serial link failed while reading.
    ReadFailure,
    /// The sensor never acknowledged the mode switch. The session did not start.
    ModeSwitchTimeout,
    /// The sensor never acknowledged a dormant command.
    DormantTimeout,
    /// The sensor answered a command with a failure status.
    CommandRejected,
    /// The session is not running: not started yet, or stopped.
    NotRunning,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::WriteFailure => f.write_str("serial write failed"),
            Error::ReadFailure => f.write_str("serial read failed"),
            Error::ModeSwitchTimeout => f.write_str("sensor did not acknowledge the mode switch"),
            Error::DormantTimeout => {
                f.write_str("sensor did not acknowledge the dormant command")
            }
            Error::CommandRejected => f.write_str("sensor rejected the command"),
            Error::NotRunning => f.write_str("session is not running"),
        }
    }
}

impl core::error::Error for Error {}
