use anyhow::{Context, Result};
use log::{debug, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

// Re-export library settings types so the whole config lives in one place
pub use ledcam_knob_lib::Calibration;
pub use ledcam_matrix_lib::MatrixLayout;

use ledcam_matrix_lib::MAX_ADDRESSABLE_LEDS;

/// Configurable log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
        }
    }
}

/// Where the LED controller listens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Controller host name or IP address
    pub host: String,
    /// Controller realtime UDP port
    pub port: u16,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "4.3.2.1".to_string(),
            port: 21324,
        }
    }
}

impl TargetConfig {
    /// Resolve to the first matching socket address
    pub fn resolve(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("resolving {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("no address for {}:{}", self.host, self.port))
    }
}

/// Matrix geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Frame side length in pixels (LEDs)
    #[serde(default = "default_matrix_size")]
    pub size: usize,
    #[serde(flatten)]
    pub layout: MatrixLayout,
}

const fn default_matrix_size() -> usize {
    42
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            size: default_matrix_size(),
            layout: MatrixLayout::default(),
        }
    }
}

/// Knob box on the serial port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnobConfig {
    pub enabled: bool,
    /// Serial device path
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Bytes that must be buffered before a response line is read
    #[serde(default = "default_min_response_bytes")]
    pub min_response_bytes: usize,
    /// Raw value reported before the first response arrives
    #[serde(default)]
    pub initial_value: i32,
    #[serde(default)]
    pub calibration: Calibration,
}

const fn default_baud_rate() -> u32 {
    115_200
}

const fn default_min_response_bytes() -> usize {
    ledcam_knob_lib::DEFAULT_MIN_RESPONSE_BYTES
}

impl Default for KnobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: "/dev/ttyACM0".to_string(),
            baud_rate: default_baud_rate(),
            min_response_bytes: default_min_response_bytes(),
            initial_value: 0,
            calibration: Calibration::default(),
        }
    }
}

/// Per-frame image effects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Flip horizontally so the matrix acts like a mirror
    pub mirror: bool,
    /// Apply LED gamma correction
    pub gamma: bool,
    /// Let the knobs drive the noise mask and its color
    pub knob_effects: bool,
    /// Counter-clockwise quarter turns (0-3)
    pub orientation: u8,
    /// Draw a solid white border around the frame
    pub ring_light: bool,
    /// Border thickness in pixels
    pub ring_width: usize,
    /// Border brightness (0-255)
    pub ring_brightness: u8,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            mirror: true,
            gamma: true,
            knob_effects: true,
            orientation: 3,
            ring_light: true,
            ring_width: 3,
            ring_brightness: 255,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub knobs: KnobConfig,
    #[serde(default)]
    pub effects: EffectsConfig,
    /// Minimum time between frames
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

const fn default_frame_interval_ms() -> u64 {
    33
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            target: TargetConfig::default(),
            matrix: MatrixConfig::default(),
            knobs: KnobConfig::default(),
            effects: EffectsConfig::default(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl Config {
    /// Clamp values to valid ranges and fix invalid values
    pub fn validate(&mut self) {
        if self.matrix.size == 0 || self.matrix.size % 2 != 0 {
            let fixed = (self.matrix.size.max(2) + 1) & !1;
            warn!("Matrix size {} is not a positive even number, using {fixed}", self.matrix.size);
            self.matrix.size = fixed;
        }
        if self.matrix.layout.max_leds_per_datagram == 0 {
            warn!("max_leds_per_datagram is 0, resetting to default");
            self.matrix.layout.max_leds_per_datagram = MatrixLayout::default().max_leds_per_datagram;
        }
        if self.matrix.layout.wait_time > 255 {
            warn!("Clamping wait_time from {} to 255", self.matrix.layout.wait_time);
            self.matrix.layout.wait_time = 255;
        }
        for pad in &mut self.matrix.layout.leading_leds {
            if *pad > MAX_ADDRESSABLE_LEDS {
                warn!("Clamping leading_leds entry from {pad} to {MAX_ADDRESSABLE_LEDS}");
                *pad = MAX_ADDRESSABLE_LEDS;
            }
        }
        match self.matrix.layout.total_leds(self.matrix.size) {
            Some(total) if total <= MAX_ADDRESSABLE_LEDS => {}
            _ => warn!(
                "Matrix of size {} with leading_leds {:?} addresses more than {MAX_ADDRESSABLE_LEDS} LEDs",
                self.matrix.size, self.matrix.layout.leading_leds
            ),
        }
        if self.effects.orientation > 3 {
            warn!("Orientation {} wraps to {}", self.effects.orientation, self.effects.orientation % 4);
            self.effects.orientation %= 4;
        }
        if self.effects.ring_width * 2 > self.matrix.size {
            warn!("Ring width {} covers the whole frame", self.effects.ring_width);
        }
        if self.target.host.is_empty() {
            warn!("Target host is empty, resetting to default");
            self.target = TargetConfig::default();
        }
    }

    /// Load from `path`, falling back to defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let mut config = Self::load(path)?;
        info!("Loaded config from {}", path.display());
        config.validate();
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let buf = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_slice(&buf)
            .with_context(|| format!("parsing {}", path.display()))?;
        debug!(
            "Config parsed: target={}:{}, size={}, knobs={}",
            config.target.host, config.target.port, config.matrix.size, config.knobs.enabled
        );
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        debug!("Saving config to {}", path.display());
        let json = serde_json::to_vec_pretty(self)?;
        debug!("Config JSON size: {} bytes", json.len());
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!("Config saved to {}", path.display());
        Ok(())
    }
}
