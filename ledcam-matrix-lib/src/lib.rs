//! Quadrant matrix encoding for LedCam
//!
//! This library maps a square RGB frame onto a physical LED matrix built from
//! four serpentine-wired strip segments, one per quadrant, and turns each
//! segment into DNRGB datagrams. It is hardware-agnostic and can be tested
//! without a network or a controller.
//!
//! ```text
//!   frame (4x4)            LED address space
//!
//!   a b | c d              [pad] a b f e       quadrant 0, start 0
//!   e f | g h              [pad] c d h g       quadrant 1, start 5
//!   ----+----              [pad] i j n m       quadrant 2, start 10
//!   i j | k l              [pad] k l p o       quadrant 3, start 15
//!   m n | o p
//! ```
//!
//! Odd rows of every quadrant run right-to-left, and each quadrant starts with
//! a configurable number of unlit placeholder LEDs.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use derive_more::{Display, Error, From};
use ledcam_dnrgb::{Datagram, DnrgbHeader, HeaderError, DEFAULT_WAIT_TIME, MAX_LEDS_PER_DATAGRAM};
pub use ledcam_dnrgb::MAX_ADDRESSABLE_LEDS;
use log::{debug, warn};
pub use rgb::RGB8;
use serde::{Deserialize, Serialize};

/// Number of strip segments the matrix is wired as
pub const QUADRANT_COUNT: usize = 4;

/// A row-major RGB frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    pixels: Vec<RGB8>,
}

impl PixelGrid {
    /// Wrap an existing row-major pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::SizeMismatch`] if `pixels` does not hold exactly
    /// `width * height` entries.
    pub fn new(width: usize, height: usize, pixels: Vec<RGB8>) -> Result<Self, EncodeError> {
        let expected = width * height;
        if pixels.len() != expected {
            return Err(EncodeError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Grid with every pixel set to `color`
    #[must_use]
    pub fn filled(width: usize, height: usize, color: RGB8) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    /// Grid where each pixel is `f(x, y)`
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> RGB8) -> Self {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[RGB8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [RGB8] {
        &mut self.pixels
    }

    /// Pixel at column `x`, row `y`
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<RGB8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }

    pub fn set(&mut self, x: usize, y: usize, color: RGB8) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }

    /// One row as a slice
    #[must_use]
    pub fn row(&self, y: usize) -> &[RGB8] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    /// Replace every pixel with `f(pixel)`
    pub fn map_pixels(&mut self, mut f: impl FnMut(RGB8) -> RGB8) {
        for pixel in &mut self.pixels {
            *pixel = f(*pixel);
        }
    }
}

/// One of the four equal sub-grids, in wiring order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Quadrant {
    /// All quadrants in the order their segments are chained
    pub const ALL: [Self; QUADRANT_COUNT] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomLeft,
        Self::BottomRight,
    ];

    /// Position in [`Quadrant::ALL`], also the index into per-quadrant settings
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::TopLeft => 0,
            Self::TopRight => 1,
            Self::BottomLeft => 2,
            Self::BottomRight => 3,
        }
    }

    /// Top-left pixel of this quadrant in a grid of `half` × `half` quadrants
    const fn origin(self, half: usize) -> (usize, usize) {
        match self {
            Self::TopLeft => (0, 0),
            Self::TopRight => (half, 0),
            Self::BottomLeft => (0, half),
            Self::BottomRight => (half, half),
        }
    }
}

/// Physical wiring and transmission settings for the matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixLayout {
    /// Unlit LEDs wired ahead of each quadrant's first pixel, indexed by
    /// [`Quadrant::index`]
    pub leading_leds: [usize; QUADRANT_COUNT],
    /// Receiver hold time in units of 100 ms
    pub wait_time: u32,
    /// Largest LED run sent in one datagram
    pub max_leds_per_datagram: usize,
}

impl Default for MatrixLayout {
    fn default() -> Self {
        Self {
            leading_leds: [1; QUADRANT_COUNT],
            wait_time: u32::from(DEFAULT_WAIT_TIME),
            max_leds_per_datagram: MAX_LEDS_PER_DATAGRAM,
        }
    }
}

impl MatrixLayout {
    /// Total LEDs addressed for a `side` × `side` frame, padding included.
    /// `None` if the count does not fit in `usize`.
    #[must_use]
    pub fn total_leds(&self, side: usize) -> Option<usize> {
        let half = side / 2;
        let pixels = half.checked_mul(half)?;
        self.leading_leds
            .iter()
            .try_fold(0usize, |total, pad| total.checked_add(pad.checked_add(pixels)?))
    }
}

/// One quadrant's LEDs in strip order, with padding, and where they start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedSegment {
    pub quadrant: Quadrant,
    /// Index of `leds[0]` in the receiver's LED address space
    pub start_index: usize,
    pub leds: Vec<RGB8>,
}

/// Input-contract violations. These indicate a bug in the frame pipeline.
#[derive(Debug, Display, Error, From)]
pub enum EncodeError {
    #[display("frame is {width}x{height}, the matrix needs a square frame")]
    NotSquare { width: usize, height: usize },
    #[display("frame side {side} cannot be split into quadrants")]
    OddSide { side: usize },
    #[display("frame is empty")]
    Empty,
    #[display("pixel buffer holds {actual} pixels, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[display("max_leds_per_datagram must be at least 1")]
    ZeroChunk,
    #[display("layout addresses more than {limit} LEDs")]
    TooManyLeds { limit: usize },
    #[display("invalid datagram header: {_0}")]
    #[from]
    Header(HeaderError),
}

fn check_grid(grid: &PixelGrid) -> Result<usize, EncodeError> {
    if grid.width() != grid.height() {
        return Err(EncodeError::NotSquare {
            width: grid.width(),
            height: grid.height(),
        });
    }
    let side = grid.width();
    if side == 0 {
        return Err(EncodeError::Empty);
    }
    if side % 2 != 0 {
        return Err(EncodeError::OddSide { side });
    }
    Ok(side)
}

/// Flatten one quadrant in serpentine order.
///
/// Rows are taken top to bottom; even rows (0, 2, ...) run left to right and
/// odd rows run right to left, matching a strip that snakes back and forth.
///
/// # Errors
///
/// Returns an [`EncodeError`] if the grid is not square with an even side.
pub fn quadrant_leds(grid: &PixelGrid, quadrant: Quadrant) -> Result<Vec<RGB8>, EncodeError> {
    let half = check_grid(grid)? / 2;
    let (x0, y0) = quadrant.origin(half);

    let mut leds = Vec::with_capacity(half * half);
    for row in 0..half {
        let cells = &grid.row(y0 + row)[x0..x0 + half];
        if row % 2 == 0 {
            leds.extend_from_slice(cells);
        } else {
            leds.extend(cells.iter().rev());
        }
    }
    Ok(leds)
}

/// Split a frame into its four padded segments with their start indices.
///
/// Start indices are the running total of the LED counts of the segments
/// before it, so the four segments tile the address space without gaps.
///
/// # Errors
///
/// Returns an [`EncodeError`] if the grid is not square with an even side, or
/// [`EncodeError::TooManyLeds`] if the padded segments do not fit the 16-bit
/// LED address space. Nothing is allocated in that case.
pub fn build_segments(
    grid: &PixelGrid,
    layout: &MatrixLayout,
) -> Result<Vec<LedSegment>, EncodeError> {
    let side = check_grid(grid)?;
    match layout.total_leds(side) {
        Some(total) if total <= MAX_ADDRESSABLE_LEDS => {}
        _ => {
            return Err(EncodeError::TooManyLeds {
                limit: MAX_ADDRESSABLE_LEDS,
            })
        }
    }

    let mut start_index = 0;
    let mut segments = Vec::with_capacity(QUADRANT_COUNT);
    for quadrant in Quadrant::ALL {
        let pad = layout.leading_leds[quadrant.index()];
        let pixels = quadrant_leds(grid, quadrant)?;

        let mut leds = vec![RGB8::default(); pad];
        leds.extend(pixels);

        let len = leds.len();
        segments.push(LedSegment {
            quadrant,
            start_index,
            leds,
        });
        start_index += len;
    }
    Ok(segments)
}

/// Encode a frame into the datagrams for all four segments.
///
/// Segments longer than `layout.max_leds_per_datagram` are split, each chunk
/// addressed at the segment start plus its offset within the segment.
///
/// # Errors
///
/// Returns an [`EncodeError`] for a malformed grid, an empty chunk size, or a
/// start index beyond what the header can carry. Nothing is produced in that
/// case.
pub fn encode_frame(grid: &PixelGrid, layout: &MatrixLayout) -> Result<Vec<Datagram>, EncodeError> {
    if layout.max_leds_per_datagram == 0 {
        return Err(EncodeError::ZeroChunk);
    }

    let segments = build_segments(grid, layout)?;
    let mut datagrams = Vec::new();

    for segment in &segments {
        for (chunk_idx, chunk) in segment
            .leds
            .chunks(layout.max_leds_per_datagram)
            .enumerate()
        {
            let start = segment.start_index + chunk_idx * layout.max_leds_per_datagram;
            let start = u32::try_from(start).map_err(|_| EncodeError::TooManyLeds {
                limit: MAX_ADDRESSABLE_LEDS,
            })?;
            let header = DnrgbHeader::new(layout.wait_time, start)?;
            let payload = chunk.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
            datagrams.push(Datagram { header, payload });
        }
    }

    Ok(datagrams)
}

/// Destination for encoded datagrams
pub trait DatagramSink {
    /// Send one datagram. At most one attempt is made.
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;
}

/// Sends datagrams to a fixed controller address over UDP
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSink {
    /// Bind an ephemeral local port for sending to `target`
    ///
    /// # Errors
    ///
    /// Returns any error from binding the socket.
    pub fn bind(target: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        debug!("UDP sink bound to {:?}, target {target}", socket.local_addr());
        Ok(Self { socket, target })
    }

    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl DatagramSink for UdpSink {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send_to(datagram, self.target).map(|_| ())
    }
}

/// Outcome of sending one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Datagrams handed to the sink
    pub datagrams: usize,
    /// Datagrams the sink failed to send
    pub dropped: usize,
    /// Bytes handed to the sink, headers included
    pub bytes: usize,
}

/// Encodes frames and pushes them through a [`DatagramSink`]
pub struct MatrixSender<S> {
    layout: MatrixLayout,
    sink: S,
}

impl<S: DatagramSink> MatrixSender<S> {
    pub fn new(layout: MatrixLayout, sink: S) -> Self {
        Self { layout, sink }
    }

    pub fn layout(&self) -> &MatrixLayout {
        &self.layout
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Encode and send one frame, best effort.
    ///
    /// A datagram that fails to send is logged and dropped; the rest of the
    /// frame is still sent.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the frame cannot be encoded. Nothing is
    /// sent in that case.
    pub fn send_frame(&mut self, grid: &PixelGrid) -> Result<FrameReport, EncodeError> {
        let datagrams = encode_frame(grid, &self.layout)?;
        let mut report = FrameReport::default();

        for datagram in &datagrams {
            let bytes = datagram.to_bytes()?;
            report.datagrams += 1;
            report.bytes += bytes.len();

            if let Err(e) = self.sink.send(&bytes) {
                report.dropped += 1;
                warn!(
                    "Dropped segment at LED {} ({} LEDs): {e}",
                    datagram.header.start_index(),
                    datagram.led_count()
                );
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledcam_dnrgb::{BYTES_PER_LED, DNRGB_PROTOCOL, HEADER_SIZE};

    /// Sink that keeps every datagram it was given
    #[derive(Default)]
    struct CaptureSink {
        sent: Vec<Vec<u8>>,
    }

    impl DatagramSink for CaptureSink {
        fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
            self.sent.push(datagram.to_vec());
            Ok(())
        }
    }

    /// Sink that fails every other send
    #[derive(Default)]
    struct FlakySink {
        attempts: usize,
    }

    impl DatagramSink for FlakySink {
        fn send(&mut self, _datagram: &[u8]) -> io::Result<()> {
            self.attempts += 1;
            if self.attempts % 2 == 0 {
                Err(io::Error::new(io::ErrorKind::Other, "network unreachable"))
            } else {
                Ok(())
            }
        }
    }

    /// Grid where each pixel encodes its own coordinates
    #[allow(clippy::cast_possible_truncation)]
    fn coordinate_grid(side: usize) -> PixelGrid {
        PixelGrid::from_fn(side, side, |x, y| RGB8::new(x as u8, y as u8, 0))
    }

    fn no_padding() -> MatrixLayout {
        MatrixLayout {
            leading_leds: [0; QUADRANT_COUNT],
            ..MatrixLayout::default()
        }
    }

    #[test]
    fn black_4x4_start_indices() {
        let grid = PixelGrid::filled(4, 4, RGB8::default());
        let segments = build_segments(&grid, &MatrixLayout::default()).expect("valid grid");

        let starts: Vec<_> = segments.iter().map(|s| s.start_index).collect();
        assert_eq!(starts, [0, 5, 10, 15]);
        for segment in &segments {
            assert_eq!(segment.leds.len(), 5);
            assert!(segment.leds.iter().all(|&c| c == RGB8::default()));
        }
    }

    #[test]
    fn serpentine_reverses_odd_rows() {
        let a = RGB8::new(1, 0, 0);
        let b = RGB8::new(2, 0, 0);
        let c = RGB8::new(3, 0, 0);
        let d = RGB8::new(4, 0, 0);
        let mut grid = PixelGrid::filled(4, 4, RGB8::default());
        grid.set(0, 0, a);
        grid.set(1, 0, b);
        grid.set(0, 1, c);
        grid.set(1, 1, d);

        let leds = quadrant_leds(&grid, Quadrant::TopLeft).expect("valid grid");
        assert_eq!(leds, [a, b, d, c]);
    }

    #[test]
    fn quadrants_cover_expected_pixels() {
        let grid = coordinate_grid(4);
        let px = |x: u8, y: u8| RGB8::new(x, y, 0);

        assert_eq!(
            quadrant_leds(&grid, Quadrant::TopRight).expect("valid grid"),
            [px(2, 0), px(3, 0), px(3, 1), px(2, 1)]
        );
        assert_eq!(
            quadrant_leds(&grid, Quadrant::BottomLeft).expect("valid grid"),
            [px(0, 2), px(1, 2), px(1, 3), px(0, 3)]
        );
        assert_eq!(
            quadrant_leds(&grid, Quadrant::BottomRight).expect("valid grid"),
            [px(2, 2), px(3, 2), px(3, 3), px(2, 3)]
        );
    }

    #[test]
    fn serpentine_three_rows() {
        let grid = coordinate_grid(6);
        let leds = quadrant_leds(&grid, Quadrant::TopLeft).expect("valid grid");
        let xs: Vec<u8> = leds.iter().map(|c| c.r).collect();
        let ys: Vec<u8> = leds.iter().map(|c| c.g).collect();
        assert_eq!(xs, [0, 1, 2, 2, 1, 0, 0, 1, 2]);
        assert_eq!(ys, [0, 0, 0, 1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn padding_is_prepended_per_quadrant() {
        let grid = PixelGrid::filled(2, 2, RGB8::new(9, 9, 9));
        let layout = MatrixLayout {
            leading_leds: [0, 2, 1, 3],
            ..MatrixLayout::default()
        };
        let segments = build_segments(&grid, &layout).expect("valid grid");

        let starts: Vec<_> = segments.iter().map(|s| s.start_index).collect();
        assert_eq!(starts, [0, 1, 4, 6]);
        assert_eq!(
            segments[1].leds,
            [RGB8::default(), RGB8::default(), RGB8::new(9, 9, 9)]
        );
        assert_eq!(layout.total_leds(2), Some(10));
    }

    #[test]
    fn datagrams_decode_to_segments() {
        let grid = coordinate_grid(4);
        let datagrams = encode_frame(&grid, &MatrixLayout::default()).expect("valid grid");
        assert_eq!(datagrams.len(), QUADRANT_COUNT);

        for (datagram, expected_start) in datagrams.iter().zip([0u16, 5, 10, 15]) {
            let bytes = datagram.to_bytes().expect("should serialize");
            assert_eq!(bytes.len(), HEADER_SIZE + 5 * BYTES_PER_LED);

            let (header, payload) = DnrgbHeader::decode(&bytes).expect("should decode");
            assert_eq!(header.protocol(), DNRGB_PROTOCOL);
            assert_eq!(header.wait_time(), DEFAULT_WAIT_TIME);
            assert_eq!(header.start_index(), expected_start);
            // Leading placeholder is black
            assert_eq!(&payload[..3], [0, 0, 0]);
        }

        // Top-right quadrant: (2,0) (3,0) (3,1) (2,1) after the pad
        assert_eq!(
            datagrams[1].payload,
            [0, 0, 0, 2, 0, 0, 3, 0, 0, 3, 1, 0, 2, 1, 0]
        );
    }

    #[test]
    fn custom_wait_time_round_trips() {
        let grid = PixelGrid::filled(2, 2, RGB8::default());
        let layout = MatrixLayout {
            wait_time: 255,
            ..MatrixLayout::default()
        };
        let datagrams = encode_frame(&grid, &layout).expect("valid grid");
        let bytes = datagrams[3].to_bytes().expect("should serialize");
        let (header, _) = DnrgbHeader::decode(&bytes).expect("should decode");
        assert_eq!(header.wait_time(), 255);
        assert_eq!(header.start_index(), 6);
    }

    #[test]
    fn long_segments_are_chunked() {
        // 8x8 frame: 16 pixels + 1 pad per quadrant
        let grid = coordinate_grid(8);
        let layout = MatrixLayout {
            max_leds_per_datagram: 5,
            ..MatrixLayout::default()
        };
        let datagrams = encode_frame(&grid, &layout).expect("valid grid");

        let starts: Vec<_> = datagrams.iter().map(|d| d.header.start_index()).collect();
        let counts: Vec<_> = datagrams.iter().map(Datagram::led_count).collect();
        assert_eq!(&starts[..5], [0, 5, 10, 15, 17]);
        assert_eq!(&counts[..5], [5, 5, 5, 2, 5]);
        assert_eq!(datagrams.len(), 4 * QUADRANT_COUNT);
        assert_eq!(Some(counts.iter().sum::<usize>()), layout.total_leds(8));

        // Chunks of one segment concatenate back to the segment
        let segments = build_segments(&grid, &layout).expect("valid grid");
        let rejoined: Vec<u8> = datagrams[..4]
            .iter()
            .flat_map(|d| d.payload.iter().copied())
            .collect();
        let expected: Vec<u8> = segments[0]
            .leds
            .iter()
            .flat_map(|c| [c.r, c.g, c.b])
            .collect();
        assert_eq!(rejoined, expected);
    }

    #[test]
    fn non_square_rejected() {
        let grid = PixelGrid::filled(4, 2, RGB8::default());
        let err = encode_frame(&grid, &MatrixLayout::default()).unwrap_err();
        assert!(matches!(err, EncodeError::NotSquare { width: 4, height: 2 }));
    }

    #[test]
    fn odd_side_rejected() {
        let grid = PixelGrid::filled(5, 5, RGB8::default());
        let err = encode_frame(&grid, &MatrixLayout::default()).unwrap_err();
        assert!(matches!(err, EncodeError::OddSide { side: 5 }));
    }

    #[test]
    fn empty_grid_rejected() {
        let grid = PixelGrid::filled(0, 0, RGB8::default());
        let err = encode_frame(&grid, &MatrixLayout::default()).unwrap_err();
        assert!(matches!(err, EncodeError::Empty));
    }

    #[test]
    fn zero_chunk_rejected() {
        let grid = PixelGrid::filled(2, 2, RGB8::default());
        let layout = MatrixLayout {
            max_leds_per_datagram: 0,
            ..no_padding()
        };
        let err = encode_frame(&grid, &layout).unwrap_err();
        assert!(matches!(err, EncodeError::ZeroChunk));
    }

    #[test]
    fn address_space_overflow_rejected() {
        let grid = PixelGrid::filled(2, 2, RGB8::default());
        // First segment ends at LED 65535, second would start at 65536
        let layout = MatrixLayout {
            leading_leds: [65535, 1, 1, 1],
            ..MatrixLayout::default()
        };
        let err = encode_frame(&grid, &layout).unwrap_err();
        assert!(matches!(err, EncodeError::TooManyLeds { limit: 65536 }));
    }

    #[test]
    fn huge_padding_from_config_rejected() {
        let layout: MatrixLayout =
            serde_json::from_str(r#"{"leading_leds": [18446744073709551615, 0, 0, 0]}"#)
                .expect("should parse");
        assert_eq!(layout.total_leds(4), None);

        let grid = PixelGrid::filled(4, 4, RGB8::default());
        let err = encode_frame(&grid, &layout).unwrap_err();
        assert!(matches!(err, EncodeError::TooManyLeds { .. }));
    }

    #[test]
    fn full_address_space_accepted() {
        let grid = PixelGrid::filled(2, 2, RGB8::default());
        let layout = MatrixLayout {
            leading_leds: [65532, 0, 0, 0],
            ..MatrixLayout::default()
        };
        assert_eq!(layout.total_leds(2), Some(65536));

        let segments = build_segments(&grid, &layout).expect("fits");
        assert_eq!(segments[3].start_index, 65535);
        let datagrams = encode_frame(&grid, &layout).expect("fits");
        let last = datagrams.last().expect("at least one datagram");
        assert_eq!(last.header.start_index(), 65535);
    }

    #[test]
    fn wrong_buffer_size_rejected() {
        let err = PixelGrid::new(2, 2, vec![RGB8::default(); 3]).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::SizeMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn sender_sends_every_segment() {
        let grid = PixelGrid::filled(4, 4, RGB8::new(10, 20, 30));
        let mut sender = MatrixSender::new(no_padding(), CaptureSink::default());

        let report = sender.send_frame(&grid).expect("valid grid");
        assert_eq!(report.datagrams, 4);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.bytes, 4 * (HEADER_SIZE + 4 * BYTES_PER_LED));

        let sent = &sender.sink().sent;
        assert_eq!(sent.len(), 4);
        assert_eq!(&sent[2][..HEADER_SIZE], [DNRGB_PROTOCOL, 5, 0, 8]);
        assert_eq!(&sent[2][HEADER_SIZE..HEADER_SIZE + 3], [10, 20, 30]);
    }

    #[test]
    fn failed_send_drops_only_that_segment() {
        let grid = PixelGrid::filled(4, 4, RGB8::default());
        let mut sender = MatrixSender::new(MatrixLayout::default(), FlakySink::default());

        let report = sender.send_frame(&grid).expect("valid grid");
        assert_eq!(report.datagrams, 4);
        assert_eq!(report.dropped, 2);
        assert_eq!(sender.sink().attempts, 4);
    }

    #[test]
    fn invalid_frame_sends_nothing() {
        let grid = PixelGrid::filled(3, 3, RGB8::default());
        let mut sender = MatrixSender::new(MatrixLayout::default(), CaptureSink::default());
        assert!(sender.send_frame(&grid).is_err());
        assert!(sender.sink().sent.is_empty());
    }

    #[test]
    fn udp_sink_delivers_locally() {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .expect("set timeout");
        let target = receiver.local_addr().expect("local addr");

        let grid = PixelGrid::filled(2, 2, RGB8::new(1, 2, 3));
        let sink = UdpSink::bind(target).expect("bind sink");
        let mut sender = MatrixSender::new(no_padding(), sink);
        sender.send_frame(&grid).expect("valid grid");

        let mut buf = [0u8; 64];
        let len = receiver.recv(&mut buf).expect("datagram");
        let (header, payload) = DnrgbHeader::decode(&buf[..len]).expect("should decode");
        assert_eq!(header.start_index(), 0);
        assert_eq!(payload, [1, 2, 3]);
    }

    #[test]
    fn layout_from_partial_json() {
        let layout: MatrixLayout =
            serde_json::from_str(r#"{"leading_leds": [2, 0, 0, 1]}"#).expect("should parse");
        assert_eq!(layout.leading_leds, [2, 0, 0, 1]);
        assert_eq!(layout.wait_time, 5);
        assert_eq!(layout.max_leds_per_datagram, MAX_LEDS_PER_DATAGRAM);
    }
}
