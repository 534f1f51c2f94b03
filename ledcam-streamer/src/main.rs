//! Stream frames to a networked LED matrix, shaped by two serial knobs
//!
//! Usage: ledcam --target 192.168.1.50:21324 --serial /dev/ttyACM0

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ledcam_knob_lib::KnobReader;
use ledcam_matrix_lib::{MatrixSender, UdpSink, MAX_ADDRESSABLE_LEDS};
use log::{info, warn};

mod config;
mod effects;
mod frame_loop;
mod frame_source;
mod serial;

use config::{Config, LogLevel};
use frame_loop::FrameLoop;
use frame_source::TestPattern;
use serial::SerialTransport;

#[derive(Parser, Debug)]
#[command(name = "ledcam")]
#[command(version, about = "Stream frames to a DNRGB LED matrix")]
struct Args {
    /// JSON config file; created with defaults by --write-config
    #[arg(short, long, default_value = "ledcam.json")]
    config: PathBuf,

    /// Controller address as host:port, overriding the config
    #[arg(short, long)]
    target: Option<String>,

    /// Knob serial device, overriding the config
    #[arg(short, long)]
    serial: Option<String>,

    /// Run without reading the knobs
    #[arg(long)]
    no_knobs: bool,

    /// Frame side length in pixels
    #[arg(long)]
    size: Option<usize>,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Log level, overriding the config
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,

    /// Save the effective config to --config and exit
    #[arg(long)]
    write_config: bool,
}

fn apply_args(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(target) = &args.target {
        let (host, port) = target
            .rsplit_once(':')
            .with_context(|| format!("target {target} is not host:port"))?;
        config.target.host = host.trim_matches(['[', ']']).to_string();
        config.target.port = port
            .parse()
            .with_context(|| format!("invalid port in target {target}"))?;
    }
    if let Some(serial) = &args.serial {
        config.knobs.port.clone_from(serial);
    }
    if args.no_knobs {
        config.knobs.enabled = false;
    }
    if let Some(size) = args.size {
        config.matrix.size = size;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate();
    Ok(())
}

fn open_knobs(config: &Config) -> Result<Option<KnobReader<SerialTransport>>> {
    let knobs = &config.knobs;
    if !knobs.enabled {
        info!("Knobs disabled");
        return Ok(None);
    }
    if !SerialTransport::is_present(&knobs.port) {
        warn!("Serial port {} not found, knobs will NOT be read", knobs.port);
        return Ok(None);
    }

    let transport = SerialTransport::open(&knobs.port, knobs.baud_rate)?;
    let reader = KnobReader::new(transport, knobs.initial_value)
        .with_calibration(knobs.calibration)
        .with_min_response_bytes(knobs.min_response_bytes);
    Ok(Some(reader))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over the config when set
    let from_env = std::env::var_os("RUST_LOG").is_some();
    let mut builder = env_logger::Builder::from_default_env();
    if !from_env {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    info!("Starting ledcam...");

    let mut config = Config::load_or_default(&args.config)?;
    apply_args(&mut config, &args)?;

    if !from_env {
        let level = config.log_level.as_level_filter();
        log::set_max_level(level);
        info!("Log level set to {:?}", config.log_level);
    }

    if args.write_config {
        return config.save(&args.config);
    }

    let target = config.target.resolve()?;
    let sink = UdpSink::bind(target).with_context(|| format!("binding UDP socket for {target}"))?;
    let total_leds = config
        .matrix
        .layout
        .total_leds(config.matrix.size)
        .filter(|&total| total <= MAX_ADDRESSABLE_LEDS)
        .with_context(|| {
            format!(
                "a {}x{} matrix with leading_leds {:?} does not fit {MAX_ADDRESSABLE_LEDS} LEDs",
                config.matrix.size, config.matrix.size, config.matrix.layout.leading_leds
            )
        })?;
    info!(
        "Sending {}x{} frames ({total_leds} LEDs) to {target}",
        config.matrix.size, config.matrix.size
    );

    let knobs = open_knobs(&config)?;
    let sender = MatrixSender::new(config.matrix.layout.clone(), sink);
    let source = TestPattern::new(config.matrix.size);

    let mut frame_loop = FrameLoop::new(
        source,
        knobs,
        config.effects.clone(),
        sender,
        Duration::from_millis(config.frame_interval_ms),
    );
    frame_loop.run(args.frames)?;
    Ok(())
}
