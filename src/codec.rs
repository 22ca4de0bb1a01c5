//! ZH03B wire format.
//!
//! Two frame layouts share the link:
//!
//! * passive stream frames, 24 bytes, `42 4D 00 14 .. PM1.0 PM2.5 PM10 .. CS CS`,
//!   checksummed with the 16-bit sum of bytes 0..22;
//! * Q&A frames, 9 bytes, `FF CMD ..`, checksummed with the two's complement
//!   of the 8-bit sum of bytes 1..8. Commands use the same layout.

use heapless::Vec;
use log::{debug, warn};

use crate::*;

/// A 9-byte command ready to be written to the sensor.
pub type Command = [u8; QA_FRAME_LEN];

/// Size of the receive buffer kept by [`FrameDecoder`].
pub const RX_BUFFER_LEN: usize = 64;

/// Particulate matter concentrations carried by one verified frame, in µg/m³.
///
/// Frames coming off the wire always carry the three channels; a `None`
/// only appears after [`SensorFrame::filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorFrame {
    pub pm1_0: Option<u16>,
    pub pm2_5: Option<u16>,
    pub pm10_0: Option<u16>,
}

impl SensorFrame {
    pub fn new(pm1_0: u16, pm2_5: u16, pm10_0: u16) -> Self {
        Self {
            pm1_0: Some(pm1_0),
            pm2_5: Some(pm2_5),
            pm10_0: Some(pm10_0),
        }
    }

    /// Keeps only the values of the enabled `channels`.
    pub fn filter(&self, channels: Channels) -> SensorFrame {
        SensorFrame {
            pm1_0: self.pm1_0.filter(|_| channels.pm1_0),
            pm2_5: self.pm2_5.filter(|_| channels.pm2_5),
            pm10_0: self.pm10_0.filter(|_| channels.pm10_0),
        }
    }
}

/// A decoded, checksum-verified frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    /// Reading pushed by the sensor in passive mode.
    Stream(SensorFrame),
    /// Reading sent in answer to a read request.
    Reading(SensorFrame),
    /// The sensor acknowledged a switch to this mode.
    ModeAck(Mode),
    /// The sensor answered a dormant command, `true` on success.
    DormantAck(bool),
}

/// Encodes the command switching the sensor to `mode`.
pub fn encode_mode_switch(mode: Mode) -> Command {
    let arg = match mode {
        Mode::Passive => MODE_PASSIVE_ARG,
        Mode::Qa => MODE_QA_ARG,
    };
    command(CMD_SET_MODE, arg)
}

/// Encodes a single read request, answered only in Q&A mode.
pub fn encode_poll_request() -> Command {
    command(CMD_READ, 0x00)
}

/// Encodes the command entering (`true`) or leaving (`false`) dormant mode.
pub fn encode_dormant(dormant: bool) -> Command {
    command(CMD_DORMANT, u8::from(dormant))
}

fn command(cmd: u8, arg: u8) -> Command {
    let mut frame = [QA_HEAD, SENSOR_ADDRESS, cmd, arg, 0x00, 0x00, 0x00, 0x00, 0x00];
    frame[8] = qa_checksum(&frame);
    frame
}

pub(crate) fn qa_checksum(frame: &[u8]) -> u8 {
    (!frame[1..8].iter().fold(0u8, |sum, &b| sum.wrapping_add(b))).wrapping_add(1)
}

pub(crate) fn stream_checksum(frame: &[u8]) -> u16 {
    frame[..STREAM_FRAME_LEN - 2]
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
}

fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

/// Decodes a reading frame at the start of `buffer`.
///
/// Acknowledgments are valid frames but carry no reading, they are reported
/// as [`DecodeError::Malformed`].
pub fn decode(buffer: &[u8]) -> Result<SensorFrame, DecodeError> {
    match decode_frame(buffer)?.0 {
        Frame::Stream(frame) | Frame::Reading(frame) => Ok(frame),
        Frame::ModeAck(_) | Frame::DormantAck(_) => Err(DecodeError::Malformed),
    }
}

/// Decodes any frame at the start of `buffer`, returning it with the number
/// of bytes it spans.
///
/// The checksum is verified before any other field is trusted.
pub fn decode_frame(buffer: &[u8]) -> Result<(Frame, usize), DecodeError> {
    match buffer.first() {
        None => Err(DecodeError::Incomplete),
        Some(&STREAM_HEAD) => decode_stream(buffer).map(|f| (f, STREAM_FRAME_LEN)),
        Some(&QA_HEAD) => decode_qa(buffer).map(|f| (f, QA_FRAME_LEN)),
        // the lead byte of a stream frame is part of its checksum
        Some(_) if buffer.len() >= STREAM_FRAME_LEN && buffer[1] == STREAM_HEAD_2 => {
            if stream_checksum(buffer) != be_u16(buffer, STREAM_FRAME_LEN - 2) {
                Err(DecodeError::ChecksumMismatch)
            } else {
                Err(DecodeError::Malformed)
            }
        }
        Some(_) => Err(DecodeError::Malformed),
    }
}

fn decode_stream(buffer: &[u8]) -> Result<Frame, DecodeError> {
    if buffer.len() < STREAM_FRAME_LEN {
        // reject a stray 0x42 early instead of waiting for a whole frame
        if buffer.len() >= 2 && buffer[1] != STREAM_HEAD_2 {
            return Err(DecodeError::Malformed);
        }
        return Err(DecodeError::Incomplete);
    }

    let frame = &buffer[..STREAM_FRAME_LEN];
    if stream_checksum(frame) != be_u16(frame, STREAM_FRAME_LEN - 2) {
        return Err(DecodeError::ChecksumMismatch);
    }
    if frame[1] != STREAM_HEAD_2 || be_u16(frame, 2) != STREAM_PAYLOAD_LEN {
        return Err(DecodeError::Malformed);
    }

    Ok(Frame::Stream(SensorFrame::new(
        be_u16(frame, 10),
        be_u16(frame, 12),
        be_u16(frame, 14),
    )))
}

fn decode_qa(buffer: &[u8]) -> Result<Frame, DecodeError> {
    if buffer.len() < QA_FRAME_LEN {
        if buffer.len() >= 2 && !matches!(buffer[1], CMD_READ | CMD_SET_MODE | CMD_DORMANT) {
            return Err(DecodeError::Malformed);
        }
        return Err(DecodeError::Incomplete);
    }

    let frame = &buffer[..QA_FRAME_LEN];
    if qa_checksum(frame) != frame[8] {
        return Err(DecodeError::ChecksumMismatch);
    }

    match frame[1] {
        // FF 86 PM2.5 PM10 PM1.0 CS
        CMD_READ => Ok(Frame::Reading(SensorFrame::new(
            be_u16(frame, 6),
            be_u16(frame, 2),
            be_u16(frame, 4),
        ))),
        CMD_SET_MODE => match frame[2] {
            MODE_PASSIVE_ARG => Ok(Frame::ModeAck(Mode::Passive)),
            MODE_QA_ARG => Ok(Frame::ModeAck(Mode::Qa)),
            _ => Err(DecodeError::Malformed),
        },
        CMD_DORMANT => Ok(Frame::DormantAck(frame[2] == DORMANT_ACK_OK)),
        _ => Err(DecodeError::Malformed),
    }
}

/// Accumulates received bytes and cuts them into frames.
///
/// Bytes preceding a frame marker are dropped. A frame failing its checksum
/// or structure check loses its first byte so that the next call resumes at
/// the following marker.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8, RX_BUFFER_LEN>,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Appends received bytes, dropping the oldest ones if the buffer is full.
    pub fn push(&mut self, bytes: &[u8]) {
        let bytes = if bytes.len() > RX_BUFFER_LEN {
            &bytes[bytes.len() - RX_BUFFER_LEN..]
        } else {
            bytes
        };
        let free = RX_BUFFER_LEN - self.buffer.len();
        if bytes.len() > free {
            warn!(
                "Receive buffer full, dropping {} stale bytes",
                bytes.len() - free
            );
            self.discard(bytes.len() - free);
        }
        // capacity checked above
        let _ = self.buffer.extend_from_slice(bytes);
    }

    /// Decodes the next frame out of the buffered bytes.
    ///
    /// Call again after `ChecksumMismatch` or `Malformed`: more frames may
    /// already be buffered. `Incomplete` means the buffer is exhausted.
    pub fn next_frame(&mut self) -> Result<Frame, DecodeError> {
        let skip = self
            .buffer
            .iter()
            .position(|&b| b == STREAM_HEAD || b == QA_HEAD)
            .unwrap_or(self.buffer.len());
        if skip > 0 {
            debug!("Skipping {} bytes before frame marker", skip);
            self.discard(skip);
        }

        match decode_frame(&self.buffer) {
            Ok((frame, len)) => {
                debug!("Decoded frame: {:02X?}", &self.buffer[..len]);
                self.discard(len);
                Ok(frame)
            }
            Err(DecodeError::Incomplete) => Err(DecodeError::Incomplete),
            Err(e) => {
                debug!("Dropping marker after {}: {:02X?}", e, &self.buffer[..]);
                self.discard(1);
                Err(e)
            }
        }
    }

    /// Drops every buffered byte.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn discard(&mut self, n: usize) {
        let len = self.buffer.len();
        let n = n.min(len);
        self.buffer.copy_within(n.., 0);
        self.buffer.truncate(len - n);
    }
}
