use crate::bus::BusDevice;
use crate::error::ImuError;
use std::time::{Duration, Instant};

/// Total frame length (header included) the hub may send in one transfer.
pub const MAX_FRAME_LEN: usize = 512;
/// Every frame starts with a 4-octet header: length, channel, sequence.
pub const HEADER_LEN: usize = 4;

/// Bit 15 of the little-endian length word marks a continuation fragment.
const CONTINUATION_BIT: u16 = 0x8000;

/// How long the reader sleeps between header polls while the hub is idle.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The six logical streams the hub multiplexes over one bus. Control and
/// command exchanges use 0..2, sensor reports arrive on 3..5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Command = 0,
    Executable = 1,
    HubControl = 2,
    SensorNormal = 3,
    Wake = 4,
    GyroRv = 5,
}

impl Channel {
    pub fn from_u8(value: u8) -> Option<Channel> {
        match value {
            0 => Some(Channel::Command),
            1 => Some(Channel::Executable),
            2 => Some(Channel::HubControl),
            3 => Some(Channel::SensorNormal),
            4 => Some(Channel::Wake),
            5 => Some(Channel::GyroRv),
            _ => None,
        }
    }
}

/// # Explanation
/// Each channel carries its own octet counter for outgoing frames. The
/// counters are independent and wrap modulo 256; a frame is stamped with the
/// counter value before the increment.
#[derive(Debug, Default)]
pub struct SequenceTable {
    counters: [u8; 6],
}

impl SequenceTable {
    pub fn new() -> Self {
        SequenceTable { counters: [0; 6] }
    }

    pub fn next(&mut self, channel: Channel) -> u8 {
        let index = channel as usize;
        let sequence = self.counters[index];
        self.counters[index] = sequence.wrapping_add(1);
        sequence
    }

    pub fn clear(&mut self) {
        self.counters = [0; 6];
    }
}

/// The parsed 4-octet frame header. `length` is the total frame length with
/// the continuation bit already masked off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u16,
    pub channel: u8,
    pub sequence: u8,
    pub continuation: bool,
}

impl FrameHeader {
    /// # Explanation
    /// Interprets the raw header octets. The high bit of the length word is
    /// a continuation flag and must never contaminate the length itself, so
    /// it is masked off first. A header of all zeros is not an error; it is
    /// how an idle hub answers a read, and the caller treats it as "no frame
    /// pending".
    pub fn parse(raw: &[u8; 4]) -> Result<Option<FrameHeader>, ImuError> {
        let raw_length = u16::from_le_bytes([raw[0], raw[1]]);
        let continuation = raw_length & CONTINUATION_BIT != 0;
        let length = raw_length & !CONTINUATION_BIT;

        if length == 0 {
            return Ok(None);
        }
        if (length as usize) < HEADER_LEN {
            return Err(ImuError::InvalidHeader(length));
        }
        if length as usize > MAX_FRAME_LEN {
            return Err(ImuError::OversizeFrame(length as usize));
        }

        Ok(Some(FrameHeader {
            length,
            channel: raw[2],
            sequence: raw[3],
            continuation,
        }))
    }

    pub fn payload_len(&self) -> usize {
        self.length as usize - HEADER_LEN
    }
}

/// One frame as it came off the bus.
#[derive(Debug, Clone)]
pub struct ShtpFrame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

/// # Explanation
/// The framing layer over one bus device. It owns the per-channel sequence
/// table, builds outgoing frames in a single write and polls the bus for
/// incoming ones. Reading is a bounded poll: a Linux I2C read completes
/// immediately, and an idle hub answers the header read with zeros, so
/// "block up to a timeout" is realized by re-reading the header until the
/// deadline passes.
pub struct ShtpPort<B: BusDevice> {
    bus: B,
    sequences: SequenceTable,
}

impl<B: BusDevice> ShtpPort<B> {
    pub fn new(bus: B) -> Self {
        ShtpPort {
            bus,
            sequences: SequenceTable::new(),
        }
    }

    /// Resets the outgoing sequence counters, as required after a session
    /// bootstrap.
    pub fn clear_sequences(&mut self) {
        self.sequences.clear();
    }

    /// # Explanation
    /// Waits for a frame for at most `timeout`. Returns `Ok(None)` when the
    /// hub stayed idle the whole window (a soft condition, not an error).
    /// Length violations and bus faults are propagated.
    pub fn read_frame(&mut self, timeout: Duration) -> Result<Option<ShtpFrame>, ImuError> {
        let deadline = Instant::now() + timeout;

        loop {
            let mut raw = [0u8; HEADER_LEN];
            self.bus.read_exact(&mut raw)?;

            match FrameHeader::parse(&raw)? {
                Some(header) => {
                    let mut payload = vec![0u8; header.payload_len()];
                    if !payload.is_empty() {
                        self.bus.read_exact(&mut payload)?;
                    }
                    if header.continuation {
                        log::debug!(
                            "Continuation fragment on channel {} ({} octets).",
                            header.channel,
                            payload.len()
                        );
                    }
                    return Ok(Some(ShtpFrame { header, payload }));
                }
                None => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    /// # Explanation
    /// Builds `[len_lo, len_hi, channel, sequence, payload...]` and transmits
    /// it in one call. The length word always has the continuation bit clear;
    /// nothing this host sends exceeds a single frame.
    pub fn write_frame(&mut self, channel: Channel, payload: &[u8]) -> Result<(), ImuError> {
        let length = payload.len() + HEADER_LEN;
        if length > MAX_FRAME_LEN {
            return Err(ImuError::OversizeFrame(length));
        }

        let mut frame = Vec::with_capacity(length);
        frame.extend_from_slice(&(length as u16).to_le_bytes());
        frame.push(channel as u8);
        frame.push(self.sequences.next(channel));
        frame.extend_from_slice(payload);

        self.bus.write_exact(&frame)
    }
}
