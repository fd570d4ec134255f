#![allow(dead_code)]

use raspberry_pi_gestures::bus::BusDevice;
use raspberry_pi_gestures::error::ImuError;
use std::collections::VecDeque;
use std::io::{Read, Write};

/// Builds the raw octets of one frame: `[len_lo, len_hi, channel, sequence,
/// payload...]`.
pub fn frame(channel: u8, sequence: u8, payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() + 4) as u16;
    let mut bytes = Vec::with_capacity(length as usize);
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes.push(channel);
    bytes.push(sequence);
    bytes.extend_from_slice(payload);
    bytes
}

/// Frames queued when the host writes a frame with a matching channel and
/// leading payload octet. Lets a scripted bus answer requests in order, the
/// way the hub answers a reset with its advertisement burst.
pub struct AutoResponse {
    pub channel: u8,
    pub report_id: u8,
    pub frames: Vec<Vec<u8>>,
}

/// # Explanation
/// An in-memory stand-in for the two-wire bus. Reads drain a byte queue and
/// fall back to an all-zero answer when it is empty, which is exactly how an
/// idle hub responds. Writes are captured frame by frame for inspection and
/// may trigger scripted responses.
pub struct MockBus {
    pub incoming: VecDeque<u8>,
    pub written: Vec<Vec<u8>>,
    pub auto: Vec<AutoResponse>,
}

impl MockBus {
    pub fn new() -> Self {
        MockBus {
            incoming: VecDeque::new(),
            written: Vec::new(),
            auto: Vec::new(),
        }
    }

    pub fn queue_raw(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes.iter().copied());
    }

    pub fn queue_frame(&mut self, channel: u8, sequence: u8, payload: &[u8]) {
        let bytes = frame(channel, sequence, payload);
        self.queue_raw(&bytes);
    }
}

impl BusDevice for MockBus {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ImuError> {
        if self.incoming.is_empty() {
            buf.fill(0);
            return Ok(());
        }
        if self.incoming.len() < buf.len() {
            return Err(ImuError::ShortRead {
                expected: buf.len(),
                got: self.incoming.len(),
            });
        }
        for byte in buf.iter_mut() {
            *byte = self.incoming.pop_front().unwrap();
        }
        Ok(())
    }

    fn write_exact(&mut self, buf: &[u8]) -> Result<(), ImuError> {
        if buf.len() >= 5 {
            let channel = buf[2];
            let report_id = buf[4];
            if let Some(index) = self
                .auto
                .iter()
                .position(|r| r.channel == channel && r.report_id == report_id)
            {
                let response = self.auto.remove(index);
                for bytes in &response.frames {
                    self.queue_raw(bytes);
                }
            }
        }
        self.written.push(buf.to_vec());
        Ok(())
    }
}

/// A byte source backed by a file, the second transport variant the framer
/// must support.
pub struct FileBus {
    file: std::fs::File,
}

impl FileBus {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        Ok(FileBus {
            file: std::fs::File::open(path)?,
        })
    }
}

impl BusDevice for FileBus {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ImuError> {
        self.file.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ImuError::ShortRead {
                expected: buf.len(),
                got: 0,
            },
            _ => ImuError::Bus(e.to_string()),
        })
    }

    fn write_exact(&mut self, buf: &[u8]) -> Result<(), ImuError> {
        self.file
            .write_all(buf)
            .map_err(|e| ImuError::Bus(e.to_string()))
    }
}
