#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorType, Read, ReadReady, Write};
use zh03b_nostd_rs::{Channel, Clock, Publisher, Registry, Zh03b};

pub type Driver = Zh03b<SimSerial, SimDelay, SimClock, Handle>;

/// Simulated monotonic time, advanced only by `SimDelay`.
#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    fn advance_ns(&self, ns: u64) {
        self.0.set(self.0.get() + ns);
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.0.get() / 1_000_000
    }
}

pub struct SimDelay(pub SimClock);

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.0.advance_ns(u64::from(ns));
    }

    async fn delay_us(&mut self, us: u32) {
        self.0.advance_ns(u64::from(us) * 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.0.advance_ns(u64::from(ms) * 1_000_000);
    }
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8>>;

pub struct SimState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    scheduled: VecDeque<(u64, Vec<u8>)>,
    responder: Responder,
    /// Every complete command received, with the time it was received at.
    pub commands: Vec<(u64, Vec<u8>)>,
}

/// Serial port wired to a simulated sensor.
///
/// Each complete 9-byte command is handed to the responder, whose answer
/// becomes readable right away. Scheduled bytes become readable once the
/// simulated clock reaches their time.
#[derive(Clone)]
pub struct SimSerial {
    pub state: Rc<RefCell<SimState>>,
    clock: SimClock,
}

impl SimSerial {
    pub fn new(clock: SimClock, responder: impl FnMut(&[u8]) -> Vec<u8> + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                rx: VecDeque::new(),
                tx: Vec::new(),
                scheduled: VecDeque::new(),
                responder: Box::new(responder),
                commands: Vec::new(),
            })),
            clock,
        }
    }

    /// Makes `bytes` readable at `at_ms`. Calls must be in time order.
    pub fn schedule(&self, at_ms: u64, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .scheduled
            .push_back((at_ms, bytes.to_vec()));
    }

    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .commands
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn command_times(&self) -> Vec<u64> {
        self.state.borrow().commands.iter().map(|(t, _)| *t).collect()
    }

    fn release_due(&self) {
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        while state.scheduled.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, bytes)) = state.scheduled.pop_front() {
                state.rx.extend(bytes);
            }
        }
    }
}

impl ErrorType for SimSerial {
    type Error = Infallible;
}

impl ReadReady for SimSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.release_due();
        Ok(!self.state.borrow().rx.is_empty())
    }
}

impl Read for SimSerial {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.release_due();
        let mut state = self.state.borrow_mut();
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        state.tx.extend_from_slice(buf);
        while state.tx.len() >= 9 {
            let command: Vec<u8> = state.tx.drain(..9).collect();
            let reply = (state.responder)(&command);
            state.rx.extend(reply);
            state.commands.push((now, command));
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Records what the driver publishes, per channel.
#[derive(Default, Clone)]
pub struct Board {
    pub registered: Rc<RefCell<Vec<Channel>>>,
    pub published: Rc<RefCell<Vec<(Channel, u16)>>>,
    pub degraded: Rc<RefCell<Vec<Channel>>>,
    pub restored: Rc<RefCell<Vec<Channel>>>,
}

impl Board {
    pub fn published(&self) -> Vec<(Channel, u16)> {
        self.published.borrow().clone()
    }

    pub fn degraded(&self) -> Vec<Channel> {
        self.degraded.borrow().clone()
    }

    pub fn restored(&self) -> Vec<Channel> {
        self.restored.borrow().clone()
    }
}

pub struct Handle {
    channel: Channel,
    board: Board,
}

impl Publisher for Handle {
    fn publish(&mut self, value: u16) {
        self.board.published.borrow_mut().push((self.channel, value));
    }

    fn link_degraded(&mut self) {
        self.board.degraded.borrow_mut().push(self.channel);
    }

    fn link_restored(&mut self) {
        self.board.restored.borrow_mut().push(self.channel);
    }
}

impl Registry for Board {
    type Handle = Handle;

    fn register(&mut self, channel: Channel) -> Handle {
        self.registered.borrow_mut().push(channel);
        Handle {
            channel,
            board: self.clone(),
        }
    }
}

fn qa_checksum(frame: &[u8]) -> u8 {
    (!frame[1..8].iter().fold(0u8, |s, &b| s.wrapping_add(b))).wrapping_add(1)
}

/// Q&A answer to a read request.
pub fn qa_reading(pm1_0: u16, pm2_5: u16, pm10_0: u16) -> Vec<u8> {
    let mut f = vec![0xFF, 0x86];
    f.extend_from_slice(&pm2_5.to_be_bytes());
    f.extend_from_slice(&pm10_0.to_be_bytes());
    f.extend_from_slice(&pm1_0.to_be_bytes());
    f.push(qa_checksum(&f));
    f
}

/// Passive mode frame.
pub fn stream_frame(pm1_0: u16, pm2_5: u16, pm10_0: u16) -> Vec<u8> {
    let mut f = vec![0u8; 24];
    f[0] = 0x42;
    f[1] = 0x4D;
    f[3] = 0x14;
    f[10..12].copy_from_slice(&pm1_0.to_be_bytes());
    f[12..14].copy_from_slice(&pm2_5.to_be_bytes());
    f[14..16].copy_from_slice(&pm10_0.to_be_bytes());
    let sum = f[..22].iter().fold(0u16, |s, &b| s.wrapping_add(u16::from(b)));
    f[22..24].copy_from_slice(&sum.to_be_bytes());
    f
}

/// Acknowledgment of a mode switch, echoing the requested mode.
pub fn mode_ack(command: &[u8]) -> Vec<u8> {
    let mut f = vec![0xFF, command[2], command[3], 0, 0, 0, 0, 0, 0];
    f[8] = qa_checksum(&f);
    f
}

/// Answer to a dormant command.
pub fn dormant_ack(ok: bool) -> Vec<u8> {
    let mut f = vec![0xFF, 0xA7, u8::from(ok), 0, 0, 0, 0, 0, 0];
    f[8] = qa_checksum(&f);
    f
}

pub fn is_mode_switch(command: &[u8]) -> bool {
    command[2] == 0x78
}

pub fn is_read(command: &[u8]) -> bool {
    command[2] == 0x86
}

pub fn is_dormant(command: &[u8]) -> bool {
    command[2] == 0xA7
}

/// A sensor acknowledging every command and answering reads with `reading`.
pub fn healthy(reading: Vec<u8>) -> impl FnMut(&[u8]) -> Vec<u8> {
    move |command| {
        if is_read(command) {
            reading.clone()
        } else if is_dormant(command) {
            dormant_ack(true)
        } else {
            mode_ack(command)
        }
    }
}
