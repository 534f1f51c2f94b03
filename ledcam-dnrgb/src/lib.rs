//! DNRGB datagram format for LedCam.
//!
//! This crate defines the UDP datagram used to push RGB data for a run of LEDs
//! to a WLED-compatible controller. Every datagram carries a 4-byte header
//! followed by the raw RGB payload for `n` consecutive LEDs.
//!
//! # Datagram Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1   | Protocol id (always [`DNRGB_PROTOCOL`]) |
//! | 1 | 1   | Wait time, in units of 100 ms, before the receiver reverts |
//! | 2 | 2   | Start index (u16 BE) of the first LED in the payload |
//! | 4 | 3×n | RGB payload, one triple per LED |
//!
//! There is no checksum, no acknowledgement and no fragmentation at this
//! level. Callers keep each datagram under [`MAX_LEDS_PER_DATAGRAM`].

use deku::prelude::*;

/// Protocol id of DNRGB in the WLED realtime UDP protocol family.
pub const DNRGB_PROTOCOL: u8 = 4;

/// Default wait time: the receiver holds the data for 500 ms.
pub const DEFAULT_WAIT_TIME: u8 = 5;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 4;

/// Bytes per LED in the payload (R, G, B).
pub const BYTES_PER_LED: usize = 3;

/// Largest LED count a WLED receiver accepts in one DNRGB datagram.
pub const MAX_LEDS_PER_DATAGRAM: usize = 489;

/// LEDs reachable through the 16-bit start index.
pub const MAX_ADDRESSABLE_LEDS: usize = u16::MAX as usize + 1;

/// 4-byte DNRGB header.
///
/// Construct with [`DnrgbHeader::new`], which range-checks the fields instead
/// of truncating them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct DnrgbHeader {
    protocol: u8,
    wait_time: u8,
    start_index: u16,
}

impl DnrgbHeader {
    /// Build a header for a payload starting at `start_index`.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::WaitTimeOutOfRange`] if `wait_time > 255` and
    /// [`HeaderError::StartIndexOutOfRange`] if `start_index > 65535`.
    pub fn new(wait_time: u32, start_index: u32) -> Result<Self, HeaderError> {
        let wait_time =
            u8::try_from(wait_time).map_err(|_| HeaderError::WaitTimeOutOfRange(wait_time))?;
        let start_index = u16::try_from(start_index)
            .map_err(|_| HeaderError::StartIndexOutOfRange(start_index))?;

        Ok(Self {
            protocol: DNRGB_PROTOCOL,
            wait_time,
            start_index,
        })
    }

    #[must_use]
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    #[must_use]
    pub fn wait_time(&self) -> u8 {
        self.wait_time
    }

    #[must_use]
    pub fn start_index(&self) -> u16 {
        self.start_index
    }

    /// Append the 4 header bytes to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::Codec`] if serialization fails.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), HeaderError> {
        let bytes = DekuContainerWrite::to_bytes(self)?;
        out.extend_from_slice(&bytes);
        Ok(())
    }

    /// Split a received datagram into its header and RGB payload.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::Truncated`] if fewer than [`HEADER_SIZE`] bytes
    /// are present, [`HeaderError::UnknownProtocol`] if the protocol byte is
    /// not DNRGB, and [`HeaderError::PartialLed`] if the payload is not a whole
    /// number of RGB triples.
    pub fn decode(datagram: &[u8]) -> Result<(Self, &[u8]), HeaderError> {
        if datagram.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated(datagram.len()));
        }

        let ((rest, _), header) = Self::from_bytes((datagram, 0))?;

        if header.protocol != DNRGB_PROTOCOL {
            return Err(HeaderError::UnknownProtocol(header.protocol));
        }
        if rest.len() % BYTES_PER_LED != 0 {
            return Err(HeaderError::PartialLed(rest.len()));
        }

        Ok((header, rest))
    }
}

/// A header plus the RGB payload it addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub header: DnrgbHeader,
    /// Raw RGB bytes, 3 per LED.
    pub payload: Vec<u8>,
}

impl Datagram {
    /// Number of LEDs described by the payload.
    #[must_use]
    pub fn led_count(&self) -> usize {
        self.payload.len() / BYTES_PER_LED
    }

    /// Serialize to the on-wire byte layout.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::Codec`] if the header fails to serialize.
    pub fn to_bytes(&self) -> Result<Vec<u8>, HeaderError> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        self.header.write_to(&mut buf)?;
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Errors from building or parsing DNRGB headers.
#[derive(Debug)]
pub enum HeaderError {
    /// Wait time does not fit in one byte.
    WaitTimeOutOfRange(u32),
    /// Start index does not fit in 16 bits.
    StartIndexOutOfRange(u32),
    /// Datagram shorter than the header.
    Truncated(usize),
    /// Protocol byte is not [`DNRGB_PROTOCOL`].
    UnknownProtocol(u8),
    /// Payload length is not a multiple of 3.
    PartialLed(usize),
    /// Error from the underlying bit codec.
    Codec(DekuError),
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitTimeOutOfRange(v) => write!(f, "wait time {v} must be within 0-255"),
            Self::StartIndexOutOfRange(v) => {
                write!(f, "start index {v} must be a nonnegative 16-bit number")
            }
            Self::Truncated(len) => {
                write!(f, "datagram of {len} bytes is shorter than the {HEADER_SIZE}-byte header")
            }
            Self::UnknownProtocol(p) => write!(f, "unknown protocol id {p}"),
            Self::PartialLed(len) => write!(f, "payload of {len} bytes is not whole RGB triples"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
        }
    }
}

impl std::error::Error for HeaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DekuError> for HeaderError {
    fn from(e: DekuError) -> Self {
        Self::Codec(e)
    }
}
