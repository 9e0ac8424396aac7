//! Offline rendering
//!
//! Renders a scripted drive through the same chunk, scheduler and timeline
//! path used for live playback, then writes the result to disk.

pub mod wav;

pub use wav::{render_drive, render_drive_to_wav, RenderSummary};

use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_SAMPLE_RATE};

/// Export configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportConfig {
    /// Sample rate for export (default: 44100 Hz)
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Samples per generated chunk
    pub chunk_size: usize,
    /// Scale the render so its peak sits at 0.95
    pub normalize: bool,
    /// Fade out duration in seconds (0 = no fade)
    pub fade_out_duration: f32,
    /// Generate chunks on a worker thread instead of inline
    pub use_worker: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            normalize: false,
            fade_out_duration: 0.0,
            use_worker: false,
        }
    }
}

impl ExportConfig {
    /// Create config for stereo export
    pub fn stereo() -> Self {
        Self {
            channels: 2,
            ..Default::default()
        }
    }

    /// Create config with custom sample rate
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chunk_size: (sample_rate / 10).max(1) as usize,
            ..Default::default()
        }
    }

    /// Enable peak normalization
    pub fn normalize(mut self, enable: bool) -> Self {
        self.normalize = enable;
        self
    }

    /// Add fade out at the end
    pub fn fade_out(mut self, duration_seconds: f32) -> Self {
        self.fade_out_duration = duration_seconds;
        self
    }

    /// Generate on a worker thread
    pub fn worker(mut self, enable: bool) -> Self {
        self.use_worker = enable;
        self
    }
}

/// Scale samples so the peak magnitude becomes 0.95
fn normalize_samples(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
    if peak > 0.0 {
        let scale = 0.95 / peak;
        for sample in samples.iter_mut() {
            *sample *= scale;
        }
    }
}

/// Apply fade out to the end of audio samples
fn apply_fade_out(samples: &mut [f32], fade_duration: f32, sample_rate: u32) {
    if fade_duration <= 0.0 || samples.is_empty() {
        return;
    }

    let fade_samples = ((fade_duration * sample_rate as f32) as usize).min(samples.len());
    let start = samples.len() - fade_samples;
    for (i, sample) in samples[start..].iter_mut().enumerate() {
        *sample *= 1.0 - (i as f32 / fade_samples as f32);
    }
}
