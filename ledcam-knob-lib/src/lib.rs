//! Knob box protocol implementation for LedCam
//!
//! The knob box is a microcontroller on a serial line that samples two
//! potentiometers. Writing a single `\n` asks it for a sample; some time later
//! it answers with one line of the form `"<int>\t<int>\n"`.
//!
//! [`KnobReader`] turns that request/response exchange into a polled value
//! that never blocks the frame loop: every call returns immediately with the
//! most recent reading, and a fresh request is only sent once the previous one
//! has been answered.

use std::io;

use heapless::HistoryBuffer;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Byte written to the knob box to request one sample.
pub const REQUEST_MARKER: u8 = b'\n';

/// Number of readings averaged by [`KnobReader::buffered_read`].
pub const HISTORY_LEN: usize = 10;

/// Shortest well-formed response, `"0\t0\n"`.
pub const DEFAULT_MIN_RESPONSE_BYTES: usize = 4;

/// One raw sample from the knob box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reading {
    pub a: i32,
    pub b: i32,
}

impl Reading {
    /// Substituted for any line that fails to parse
    pub const SENTINEL: Self = Self { a: 0, b: 0 };

    pub const fn new(a: i32, b: i32) -> Self {
        Self { a, b }
    }

    /// Parse a response line into a reading
    ///
    /// Only the first two tab-separated fields are used. Surrounding whitespace
    /// (including the line terminator) is ignored. Negative values are what the
    /// knob box reports for a failed ADC read, so they are rejected too.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(line).ok()?;
        let mut fields = text.trim().split('\t');

        let a: i32 = fields.next()?.trim().parse().ok()?;
        let b: i32 = fields.next()?.trim().parse().ok()?;

        if a < 0 || b < 0 {
            return None;
        }

        Some(Self { a, b })
    }
}

/// A reading mapped onto `[0.0, 1.0]` per knob
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedReading {
    pub a: f32,
    pub b: f32,
}

/// Serial-like link to the knob box
///
/// Implementations must never block in [`KnobTransport::bytes_available`] or
/// [`KnobTransport::read_line`].
pub trait KnobTransport {
    /// Send raw bytes to the device
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Number of received bytes waiting to be read
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Consume one newline-terminated line, terminator included.
    ///
    /// Returns `Ok(None)` while the line is still incomplete. Partial data
    /// must be kept for the next call.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Polling state, each variant carrying the value handed out while in it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// No request outstanding
    Idle(Reading),
    /// A request was written and its response has not been consumed yet
    AwaitingResponse(Reading),
}

impl PollState {
    /// The reading returned to callers in this state
    pub const fn held(&self) -> Reading {
        match self {
            Self::Idle(r) | Self::AwaitingResponse(r) => *r,
        }
    }
}

/// Fixed window of the last [`HISTORY_LEN`] readings
pub struct ReadingHistory {
    buffer: HistoryBuffer<Reading, HISTORY_LEN>,
}

impl ReadingHistory {
    /// Create a history where every slot holds `initial`
    pub fn new(initial: Reading) -> Self {
        Self {
            buffer: HistoryBuffer::new_with(initial),
        }
    }

    /// Insert a reading, evicting the oldest
    pub fn push(&mut self, reading: Reading) {
        self.buffer.write(reading);
    }

    /// Per-knob arithmetic mean, truncated toward zero
    // The buffer starts full, so it always holds HISTORY_LEN readings, and a
    // mean of i32 values fits back into i32
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn mean(&self) -> Reading {
        let (sum_a, sum_b) = self.buffer.as_slice().iter().fold((0i64, 0i64), |(a, b), r| {
            (a + i64::from(r.a), b + i64::from(r.b))
        });
        Reading::new(
            (sum_a / HISTORY_LEN as i64) as i32,
            (sum_b / HISTORY_LEN as i64) as i32,
        )
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }
}

/// Raw-to-unit calibration for the knob potentiometers
///
/// The raw value is scaled from `full_scale` counts to `supply_voltage` volts,
/// clamped to `[min_voltage, max_voltage]`, and that window is mapped onto
/// `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// ADC reference voltage
    pub supply_voltage: f32,
    /// Raw count corresponding to `supply_voltage`
    pub full_scale: f32,
    /// Voltage mapped to 0.0; anything lower is clamped
    pub min_voltage: f32,
    /// Voltage mapped to 1.0; anything higher is clamped
    pub max_voltage: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            supply_voltage: 3.3,
            full_scale: 65535.0,
            min_voltage: 0.05,
            max_voltage: 2.8,
        }
    }
}

impl Calibration {
    /// Map one raw component onto `[0.0, 1.0]`
    #[allow(clippy::cast_precision_loss)] // 16-bit raw values are exact in f32
    pub fn normalize_raw(&self, raw: i32) -> f32 {
        let voltage = raw as f32 * self.supply_voltage / self.full_scale;
        if voltage.is_nan() || voltage <= self.min_voltage {
            return 0.0;
        }
        if voltage >= self.max_voltage {
            return 1.0;
        }
        ((voltage - self.min_voltage) / (self.max_voltage - self.min_voltage)).clamp(0.0, 1.0)
    }

    /// Map both components of a reading
    pub fn normalize(&self, reading: Reading) -> NormalizedReading {
        NormalizedReading {
            a: self.normalize_raw(reading.a),
            b: self.normalize_raw(reading.b),
        }
    }
}

/// Non-blocking, smoothed reader for the knob box
pub struct KnobReader<T> {
    transport: T,
    state: PollState,
    history: ReadingHistory,
    calibration: Calibration,
    min_response_bytes: usize,
    malformed_lines: u64,
}

impl<T: KnobTransport> KnobReader<T> {
    /// Create a reader that reports `(initial_value, initial_value)` until the
    /// first response arrives
    pub fn new(transport: T, initial_value: i32) -> Self {
        let initial = Reading::new(initial_value, initial_value);
        Self {
            transport,
            state: PollState::Idle(initial),
            history: ReadingHistory::new(initial),
            calibration: Calibration::default(),
            min_response_bytes: DEFAULT_MIN_RESPONSE_BYTES,
            malformed_lines: 0,
        }
    }

    #[must_use]
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Bytes that must be buffered before a response line is attempted
    #[must_use]
    pub fn with_min_response_bytes(mut self, min_response_bytes: usize) -> Self {
        self.min_response_bytes = min_response_bytes.max(1);
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Number of response lines that failed to parse so far
    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Advance the request/response cycle by one step and return the current
    /// reading. Never waits for the device.
    ///
    /// # Errors
    ///
    /// Returns any I/O error reported by the transport. These mean the device
    /// is gone and are not recovered here.
    pub fn read(&mut self) -> io::Result<Reading> {
        match self.state {
            PollState::Idle(held) => {
                self.transport.write(&[REQUEST_MARKER])?;
                self.state = PollState::AwaitingResponse(held);
                Ok(held)
            }
            PollState::AwaitingResponse(held) => {
                if self.transport.bytes_available()? < self.min_response_bytes {
                    return Ok(held);
                }

                let Some(line) = self.transport.read_line()? else {
                    return Ok(held);
                };

                let reading = Reading::parse(&line).unwrap_or_else(|| {
                    self.malformed_lines += 1;
                    warn!(
                        "invalid value(s) in knob line {:?}",
                        String::from_utf8_lossy(&line)
                    );
                    Reading::SENTINEL
                });

                debug!("Knob reading: {reading:?}");
                self.state = PollState::Idle(reading);
                Ok(reading)
            }
        }
    }

    /// Step the state machine and return the moving average of the last
    /// [`HISTORY_LEN`] results
    ///
    /// # Errors
    ///
    /// Propagates transport errors from [`KnobReader::read`].
    pub fn buffered_read(&mut self) -> io::Result<Reading> {
        let reading = self.read()?;
        self.history.push(reading);
        Ok(self.history.mean())
    }

    /// Smoothed reading mapped onto `[0.0, 1.0]`, polled once per frame
    ///
    /// # Errors
    ///
    /// Propagates transport errors from [`KnobReader::read`].
    pub fn normalized_read(&mut self) -> io::Result<NormalizedReading> {
        let reading = self.buffered_read()?;
        Ok(self.calibration.normalize(reading))
    }
}
