//! vvvf - traction inverter sound emulator CLI
//!
//! Renders scripted drives to WAV, dumps display traces to CSV, inspects
//! configurations and (with the `streaming` feature) plays a drive live.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vvvf::constants::{DEFAULT_DISPLAY_WIDTH, DEFAULT_SAMPLE_RATE};
use vvvf::{
    CarrierKind, DriveSchedule, InverterConfig, ModulationSpec, Result, SpeedRange, TraceCapture,
};

#[cfg(feature = "export-wav")]
use vvvf::export::ExportConfig as ExportSettings;
#[cfg(not(feature = "export-wav"))]
use render::ExportSettings;

/// VVVF inverter sound emulator
#[derive(Parser)]
#[command(name = "vvvf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scripted drive to a WAV file (`export-wav` feature)
    Render {
        /// Inverter configuration JSON (default: built-in demo)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Notch schedule, e.g. "P3:20,N:5,B4:25"
        #[arg(short, long)]
        schedule: String,

        /// Output WAV path
        #[arg(short, long)]
        out: PathBuf,

        /// Sample rate in Hz
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Samples per generated chunk (default: 100 ms)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Write two identical channels
        #[arg(long)]
        stereo: bool,

        /// Scale the output peak to 0.95
        #[arg(long)]
        normalize: bool,

        /// Fade out over the last N seconds
        #[arg(long, default_value_t = 0.0)]
        fade_out: f32,

        /// Generate chunks on a worker thread
        #[arg(long)]
        worker: bool,
    },

    /// Capture one display frame at a fixed speed and write it as CSV
    Trace {
        /// Inverter configuration JSON (default: built-in demo)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Speed in km/h
        #[arg(long)]
        speed: f64,

        /// Samples per frame
        #[arg(long, default_value_t = DEFAULT_DISPLAY_WIDTH)]
        width: usize,

        /// Sample rate in Hz
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Output CSV path
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Play a scripted drive on the default audio device (`streaming` feature)
    Play {
        /// Inverter configuration JSON (default: built-in demo)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Notch schedule, e.g. "P3:20,N:5,B4:25"
        #[arg(short, long)]
        schedule: String,

        /// Master volume (0.0 - 1.0)
        #[arg(long, default_value_t = 0.5)]
        volume: f32,

        /// Generate chunks on a worker thread
        #[arg(long)]
        worker: bool,
    },

    /// Print configuration metadata and the speed range table
    Info {
        /// Inverter configuration JSON (default: built-in demo)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Render {
            config,
            schedule,
            out,
            sample_rate,
            chunk_size,
            stereo,
            normalize,
            fade_out,
            worker,
        } => {
            let config = load_config(config.as_deref())?;
            let schedule: DriveSchedule = schedule.parse()?;
            let mut export = ExportSettings::with_sample_rate(sample_rate)
                .normalize(normalize)
                .fade_out(fade_out)
                .worker(worker);
            if stereo {
                export.channels = 2;
            }
            if let Some(size) = chunk_size {
                export.chunk_size = size;
            }
            render::run(&config, &schedule, &out, export)
        }

        Commands::Trace {
            config,
            speed,
            width,
            sample_rate,
            out,
        } => {
            let config = load_config(config.as_deref())?;
            let mut capture = TraceCapture::new(&config, width, f64::from(sample_rate));
            let trace = capture.capture(speed);
            trace.write_csv(&out)?;
            println!(
                "Wrote {} samples at {:.1} km/h to {}",
                trace.len(),
                speed,
                out.display()
            );
            Ok(())
        }

        Commands::Play {
            config,
            schedule,
            volume,
            worker,
        } => {
            let config = load_config(config.as_deref())?;
            let schedule: DriveSchedule = schedule.parse()?;
            play::run(&config, &schedule, volume, worker)
        }

        Commands::Info { config } => {
            let config = load_config(config.as_deref())?;
            print_info(&config);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<InverterConfig> {
    match path {
        Some(path) => InverterConfig::from_file(path),
        None => Ok(InverterConfig::demo()),
    }
}

fn print_info(config: &InverterConfig) {
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".into());
    println!("Name:          {}", field(&config.name));
    println!("Manufacturer:  {}", field(&config.manufacturer));
    println!("Date:          {}", field(&config.date));
    if let Some(description) = &config.description {
        println!("Description:   {description}");
    }
    println!("Acceleration:  {} km/h/s per notch", config.max_acceleration());
    println!("Max speed:     {} km/h", config.max_speed());
    println!("Gear ratio:    {}", config.gear_ratio());
    if let Some(detection) = &config.mode_detection {
        println!(
            "Mode detect:   history {} every {} samples, check every {}",
            detection.history_size, detection.sample_interval, detection.mode_check_interval
        );
    }

    println!();
    println!("  #  speed (km/h)    modulation");
    for (index, range) in config.speed_ranges.iter().enumerate() {
        println!(
            "{index:>3}  {:>6.1} - {:<6.1}  {}",
            range.min_speed,
            range.max_speed,
            describe_range(range)
        );
    }
    for (a, b) in config.overlapping_ranges() {
        println!("  note: range #{a} shadows range #{b} where they overlap");
    }
}

fn describe_range(range: &SpeedRange) -> String {
    let mut parts = Vec::new();
    if let Some(spec) = &range.modulation {
        parts.push(describe_spec(spec));
    }
    if let Some(per_mode) = &range.per_mode {
        for (key, spec) in per_mode {
            parts.push(format!("{key:?}: {}", describe_spec(spec)));
        }
    }
    if let Some(modifiers) = &range.amplitude_modifiers {
        parts.push(format!("{} amplitude modifier(s)", modifiers.len()));
    }
    parts.join("; ")
}

fn describe_spec(spec: &ModulationSpec) -> String {
    let mut text = match spec.carrier {
        CarrierKind::Fixed { carrier_frequency } => format!("fixed {carrier_frequency} Hz"),
        CarrierKind::Ramp {
            min_carrier_frequency,
            max_carrier_frequency,
        } => format!("ramp {min_carrier_frequency}-{max_carrier_frequency} Hz"),
        CarrierKind::Sync { pulse_count } => format!("sync {pulse_count}P"),
    };
    if spec.wide_pulse {
        text.push_str(&format!(" wide x{}", spec.modulation_index()));
    }
    text
}

#[cfg(feature = "export-wav")]
mod render {
    use std::path::Path;

    use vvvf::export::{render_drive_to_wav, ExportConfig};
    use vvvf::{DriveSchedule, InverterConfig, Result};

    pub(super) fn run(
        config: &InverterConfig,
        schedule: &DriveSchedule,
        out: &Path,
        export: ExportConfig,
    ) -> Result<()> {
        let summary = render_drive_to_wav(config, schedule, out, export)?;
        println!(
            "Wrote {} ({:.1}s, {} chunks, top speed {:.1} km/h, peak {:.3})",
            out.display(),
            summary.duration_seconds,
            summary.chunks,
            summary.top_speed,
            summary.peak
        );
        if summary.dropped > 0 || summary.underruns > 0 {
            println!(
                "  queue: {} dropped, {} underruns",
                summary.dropped, summary.underruns
            );
        }
        Ok(())
    }
}

#[cfg(not(feature = "export-wav"))]
mod render {
    use std::path::Path;

    use vvvf::{DriveSchedule, InverterConfig, Result, VvvfError};

    /// Argument holder when WAV export is compiled out
    #[derive(Default)]
    #[allow(dead_code)]
    pub(super) struct ExportSettings {
        pub channels: u16,
        pub chunk_size: usize,
    }

    impl ExportSettings {
        pub(super) fn with_sample_rate(_sample_rate: u32) -> Self {
            Self::default()
        }

        pub(super) fn normalize(self, _enable: bool) -> Self {
            self
        }

        pub(super) fn fade_out(self, _seconds: f32) -> Self {
            self
        }

        pub(super) fn worker(self, _enable: bool) -> Self {
            self
        }
    }

    pub(super) fn run(
        _config: &InverterConfig,
        _schedule: &DriveSchedule,
        _out: &Path,
        _export: ExportSettings,
    ) -> Result<()> {
        Err(VvvfError::Other("WAV rendering requires the \"export-wav\" feature".into()))
    }
}

#[cfg(feature = "streaming")]
mod play {
    use std::io::{self, Write};
    use std::thread;
    use std::time::{Duration, Instant};

    use vvvf::streaming::{
        AudioDevice, InlineChunkSource, MixingTimeline, PlaybackSession, SchedulerConfig,
        SharedSpeed, StreamConfig, WorkerChunkSource,
    };
    use vvvf::{DriveSchedule, InverterConfig, ModulationEngine, Notch, Result, TrainDynamics};

    const CONTROL_PERIOD: Duration = Duration::from_millis(50);

    pub(super) fn run(
        config: &InverterConfig,
        schedule: &DriveSchedule,
        volume: f32,
        worker: bool,
    ) -> Result<()> {
        let stream = StreamConfig::default();
        let timeline = MixingTimeline::new(stream.sample_rate);
        timeline.set_volume(volume);
        let device = AudioDevice::new(timeline.clone(), &stream)?;

        let speed = SharedSpeed::new(0.0);
        let engine = ModulationEngine::new(config);
        let scheduler = SchedulerConfig::default();
        let mut session = if worker {
            PlaybackSession::start(
                WorkerChunkSource::spawn(engine, stream.sample_rate)?,
                timeline,
                scheduler,
                stream.chunk_size,
                speed.clone(),
            )?
        } else {
            PlaybackSession::start(
                InlineChunkSource::new(engine, stream.sample_rate),
                timeline,
                scheduler,
                stream.chunk_size,
                speed.clone(),
            )?
        };

        let mut dynamics = TrainDynamics::from_config(config);
        let started = Instant::now();
        let mut last = started;
        while let Some(notch) = schedule.notch_at(started.elapsed().as_secs_f64()) {
            thread::sleep(CONTROL_PERIOD);
            let now = Instant::now();
            dynamics.set_notch(notch);
            speed.set(dynamics.update((now - last).as_secs_f64()));
            last = now;
            print_status(notch, dynamics.speed(), session.queue_depth());
        }
        println!();

        session.stop();
        device.finish();
        let stats = session.stats();
        println!(
            "Played {:.1}s: {} chunks, {} dropped, {} underruns",
            started.elapsed().as_secs_f64(),
            stats.committed,
            stats.dropped,
            stats.underruns
        );
        Ok(())
    }

    fn print_status(notch: Notch, speed: f64, depth: usize) {
        print!("\r{:<3} {speed:>6.1} km/h  queue {depth}   ", notch.to_string());
        let _ = io::stdout().flush();
    }
}

#[cfg(not(feature = "streaming"))]
mod play {
    use vvvf::{DriveSchedule, InverterConfig, Result, VvvfError};

    pub(super) fn run(
        _config: &InverterConfig,
        _schedule: &DriveSchedule,
        _volume: f32,
        _worker: bool,
    ) -> Result<()> {
        Err(VvvfError::Other(
            "live playback requires the \"streaming\" feature; rebuild with `--features streaming`"
                .into(),
        ))
    }
}
