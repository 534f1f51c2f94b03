//! Main streaming loop
//!
//! Each cycle pulls a frame from the source, polls the knobs once, runs the
//! effects and hands the result to the matrix sender.

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use ledcam_knob_lib::{KnobReader, KnobTransport};
use ledcam_matrix_lib::{DatagramSink, FrameReport, MatrixSender};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::EffectsConfig;
use crate::effects;
use crate::frame_source::FrameSource;

/// Frames between timing log lines
const STATS_INTERVAL: u64 = 60;

/// Running totals since the loop started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub datagrams: u64,
    pub dropped: u64,
    pub bytes: u64,
}

impl LoopStats {
    fn record(&mut self, report: FrameReport) {
        self.frames += 1;
        self.datagrams += report.datagrams as u64;
        self.dropped += report.dropped as u64;
        self.bytes += report.bytes as u64;
    }
}

pub struct FrameLoop<F, K, S> {
    source: F,
    knobs: Option<KnobReader<K>>,
    effects: EffectsConfig,
    sender: MatrixSender<S>,
    frame_interval: Duration,
    started: Instant,
    window_start: Instant,
    window_dropped: u64,
    stats: LoopStats,
    rng: StdRng,
}

impl<F, K, S> FrameLoop<F, K, S>
where
    F: FrameSource,
    K: KnobTransport,
    S: DatagramSink,
{
    pub fn new(
        source: F,
        knobs: Option<KnobReader<K>>,
        effects: EffectsConfig,
        sender: MatrixSender<S>,
        frame_interval: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            source,
            knobs,
            effects,
            sender,
            frame_interval,
            started: now,
            window_start: now,
            window_dropped: 0,
            stats: LoopStats::default(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn sender(&self) -> &MatrixSender<S> {
        &self.sender
    }

    /// Run one full cycle without pacing
    ///
    /// # Errors
    ///
    /// Fails if the source cannot produce a frame, the knob port is gone, or
    /// the frame does not fit the matrix layout.
    pub fn step(&mut self) -> Result<FrameReport> {
        let mut grid = self.source.next_frame().context("capturing frame")?;

        let knobs = match self.knobs.as_mut() {
            Some(reader) => Some(reader.normalized_read().context("reading knobs")?),
            None => None,
        };

        effects::apply(
            &mut grid,
            &self.effects,
            knobs,
            self.started.elapsed(),
            &mut self.rng,
        );

        let report = self.sender.send_frame(&grid).context("sending frame")?;
        self.stats.record(report);
        self.window_dropped += report.dropped as u64;

        if self.stats.frames % STATS_INTERVAL == 0 {
            let elapsed = self.window_start.elapsed();
            info!(
                "Frame time for {STATS_INTERVAL}: {:.1} ms ({:.1} ms/frame), {} datagrams dropped",
                elapsed.as_secs_f64() * 1000.0,
                elapsed.as_secs_f64() * 1000.0 / STATS_INTERVAL as f64,
                self.window_dropped
            );
            self.window_start = Instant::now();
            self.window_dropped = 0;
        }

        Ok(report)
    }

    /// Stream frames until `max_frames` have been sent, or forever if `None`
    ///
    /// # Errors
    ///
    /// Stops at the first error from [`FrameLoop::step`].
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<LoopStats> {
        info!(
            "Streaming every {} ms{}",
            self.frame_interval.as_millis(),
            if self.knobs.is_some() { "" } else { " without knobs" }
        );

        while max_frames.map_or(true, |max| self.stats.frames < max) {
            let cycle_start = Instant::now();
            self.step()?;

            let spent = cycle_start.elapsed();
            if let Some(remaining) = self.frame_interval.checked_sub(spent) {
                sleep(remaining);
            } else {
                debug!("Frame took {} ms, over budget", spent.as_millis());
            }
        }

        info!(
            "Sent {} frames, {} datagrams ({} bytes), {} dropped",
            self.stats.frames, self.stats.datagrams, self.stats.bytes, self.stats.dropped
        );
        Ok(self.stats)
    }
}
