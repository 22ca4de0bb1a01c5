// STREAM_HEAD is the first byte of a frame pushed by the sensor in passive mode.
pub const STREAM_HEAD: u8 = 0x42;

// STREAM_HEAD_2 is the second marker byte of a passive mode frame.
pub const STREAM_HEAD_2: u8 = 0x4D;

// STREAM_FRAME_LEN is the size of a passive mode frame, markers and checksum included.
pub const STREAM_FRAME_LEN: usize = 24;

// STREAM_PAYLOAD_LEN is the value of the frame length field of a passive mode frame.
pub const STREAM_PAYLOAD_LEN: u16 = 0x0014;

// QA_HEAD is the first byte of every command and of every Q&A reply.
pub const QA_HEAD: u8 = 0xFF;

// QA_FRAME_LEN is the size of a command or of a Q&A reply.
pub const QA_FRAME_LEN: usize = 9;

// SENSOR_ADDRESS is the second byte of a command frame.
pub const SENSOR_ADDRESS: u8 = 0x01;

// CMD_READ asks for a single reading while in Q&A mode. Replies echo it at index 1.
pub const CMD_READ: u8 = 0x86;

// CMD_SET_MODE switches between passive and Q&A mode. Replies echo it at index 1.
pub const CMD_SET_MODE: u8 = 0x78;

// CMD_DORMANT turns the fan and laser off or back on. Replies echo it at index 1.
pub const CMD_DORMANT: u8 = 0xA7;

// MODE_PASSIVE_ARG and MODE_QA_ARG are the CMD_SET_MODE arguments.
pub const MODE_PASSIVE_ARG: u8 = 0x40;
pub const MODE_QA_ARG: u8 = 0x41;

// DORMANT_ACK_OK is the status byte of a successful dormant reply.
pub const DORMANT_ACK_OK: u8 = 0x01;

/// Minimum time between two Q&A readings, in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u32 = 30_000;

/// Q&A poll interval used when none is configured, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 60_000;

/// Period of the passive mode stream, in milliseconds.
pub const STREAM_PERIOD_MS: u32 = 1_000;

// A passive stream silent for this long counts as one failure.
pub const STREAM_TIMEOUT_MS: u32 = 3 * STREAM_PERIOD_MS;

// Time allowed for the sensor to answer a read request.
pub const RESPONSE_TIMEOUT_MS: u32 = 2_000;

// Time allowed for the sensor to acknowledge a mode switch or dormant command.
pub const ACK_TIMEOUT_MS: u32 = 1_000;

// Yield between two checks for available bytes.
pub const RX_POLL_STEP_MS: u32 = 10;

/// Consecutive failures after which the link is reported as degraded.
pub const DEGRADED_THRESHOLD: u8 = 3;
