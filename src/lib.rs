//! VVVF traction inverter sound emulator
//!
//! Emulates the acoustic signature of a variable-voltage variable-frequency
//! traction inverter. Given a continuously changing vehicle speed it produces,
//! sample by sample, the switching waveform the inverter leg would output,
//! together with the carrier and command references used to derive it.
//!
//! # Features
//! - Naturally-sampled PWM engine (sawtooth/triangle carrier vs. sine command)
//! - Fixed, ramped and synchronous carrier modes selected by speed range
//! - Amplitude shaping and optional acceleration/braking mode detection
//! - Chunk scheduler with crossfaded overlap, bounded queue and backpressure
//! - Inline or worker-thread chunk generation
//! - Offline WAV rendering and optional real-time streaming playback
//!
//! # Crate feature flags
//! - `export-wav` (default): Offline rendering of a drive schedule to WAV (`export`)
//! - `streaming` (opt-in): Real-time audio output (enables optional `rodio` dep)
//!
//! # Quick start
//! ## Per-sample generation
//! ```
//! use vvvf::{InverterConfig, ModulationEngine};
//! let config = InverterConfig::demo();
//! let mut engine = ModulationEngine::new(&config);
//! let triple = engine.generate_sample(42.0, 44_100.0);
//! assert!(triple.sound_sample.abs() <= 1.0);
//! ```
//!
//! ## Scheduled playback timeline (cooperative)
//! ```
//! use vvvf::streaming::{AudioChunk, BufferScheduler, MixingTimeline, SchedulerConfig};
//! use vvvf::{InverterConfig, ModulationEngine};
//!
//! let config = InverterConfig::demo();
//! let mut engine = ModulationEngine::new(&config);
//! let timeline = MixingTimeline::new(44_100);
//! let mut scheduler = BufferScheduler::new(timeline, SchedulerConfig::default());
//! scheduler.start();
//! for _ in 0..3 {
//!     let samples = engine.produce_chunk(30.0, 4410, 44_100.0);
//!     scheduler.submit(AudioChunk::new(samples, 44_100));
//! }
//! scheduler.tick();
//! assert_eq!(scheduler.in_flight(), 3);
//! ```

#![warn(missing_docs)]

// Domain modules
pub mod config; // Inverter configuration (parsed JSON model)
pub mod constants;
pub mod inverter; // PWM synthesis core
pub mod streaming; // Chunk scheduling & playback
pub mod trace; // Display trace capture
pub mod train; // Speed supplier (notch controller, dynamics)

#[cfg(feature = "export-wav")]
pub mod export; // Offline rendering

/// Error types for inverter emulator operations
#[derive(thiserror::Error, Debug)]
pub enum VvvfError {
    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration JSON could not be parsed
    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Trace export failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for VvvfError {
    /// Converts a String into `VvvfError::Other`.
    ///
    /// Prefer the specific variants (`ConfigError`, `AudioFileError`,
    /// `AudioDeviceError`) where the failure class is known.
    fn from(msg: String) -> Self {
        VvvfError::Other(msg)
    }
}

impl From<&str> for VvvfError {
    /// Converts a string slice into `VvvfError::Other`.
    fn from(msg: &str) -> Self {
        VvvfError::Other(msg.to_string())
    }
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, VvvfError>;

// Public API exports
pub use config::{AmplitudeModifier, CarrierKind, InverterConfig, ModulationSpec, SpeedRange};
pub use inverter::{
    CarrierWaveform, ModeClassifier, ModulationEngine, OscillatorPhase, RegimeLabel, SampleTriple,
    SpeedRangeTable,
};
pub use streaming::{AudioChunk, BufferScheduler, MixingTimeline, SchedulerConfig, StreamConfig};
pub use trace::{Trace, TraceCapture};
pub use train::{DriveSchedule, Notch, TrainDynamics};

#[cfg(feature = "streaming")]
pub use streaming::AudioDevice;
