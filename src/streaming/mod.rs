//! Chunk scheduling and playback
//!
//! Turns discretely produced sample chunks into continuous, click-free
//! playback: chunks are queued by the [`BufferScheduler`], committed onto a
//! [`PlaybackTimeline`] with a short crossfade overlap, and mixed
//! sample-accurately by the [`MixingTimeline`].
//!
//! Generation can happen inline (the caller produces chunks right before
//! submitting them) or on a dedicated worker thread; both feed the same
//! scheduler through the [`ChunkSource`] trait.

pub mod scheduler;
pub mod session;
pub mod source;
pub mod timeline;

#[cfg(feature = "streaming")]
pub mod audio_device;

pub use scheduler::{
    BufferScheduler, ScheduledChunk, SchedulerConfig, SchedulerState, SchedulerStats,
};
pub use session::{PlaybackSession, SharedSpeed};
pub use source::{ChunkSource, InlineChunkSource, WorkerChunkSource, WorkerRequest};
pub use timeline::{HandleId, MixingTimeline, PlaybackTimeline};

#[cfg(feature = "streaming")]
pub use audio_device::AudioDevice;

use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_SAMPLE_RATE};

/// Streaming configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Samples generated per chunk
    /// Smaller chunks follow speed changes faster but cost more ticks
    pub chunk_size: usize,

    /// Number of output channels (the signal itself is mono)
    pub channels: u16,
}

impl StreamConfig {
    /// Configuration with 50 ms chunks
    pub fn low_latency(sample_rate: u32) -> Self {
        StreamConfig {
            sample_rate,
            chunk_size: (sample_rate / 20) as usize,
            channels: 1,
        }
    }

    /// Configuration with 100 ms chunks, one per scheduler tick
    pub fn stable(sample_rate: u32) -> Self {
        StreamConfig {
            sample_rate,
            chunk_size: (sample_rate / 10) as usize,
            channels: 1,
        }
    }

    /// Duration of one chunk in milliseconds
    pub fn chunk_ms(&self) -> f32 {
        ((self.chunk_size as f32) / (self.sample_rate as f32)) * 1000.0
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            channels: 1,
        }
    }
}

/// Contiguous block of generated samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono samples
    pub samples: Vec<f32>,
    /// Rate the samples were generated at
    pub sample_rate: u32,
    /// `samples.len() / sample_rate`
    pub duration_seconds: f64,
    /// Timeline position assigned when the scheduler commits the chunk
    pub scheduled_start_time: Option<f64>,
}

impl AudioChunk {
    /// Wrap freshly generated samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration_seconds = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / f64::from(sample_rate)
        };
        AudioChunk {
            samples,
            sample_rate,
            duration_seconds,
            scheduled_start_time: None,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the chunk holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stream_config_chunk_ms() {
        assert_relative_eq!(StreamConfig::default().chunk_ms(), 100.0);
        assert_relative_eq!(StreamConfig::low_latency(44_100).chunk_ms(), 50.0);
        assert_eq!(StreamConfig::stable(48_000).chunk_size, 4800);
    }

    #[test]
    fn test_chunk_duration() {
        let chunk = AudioChunk::new(vec![0.0; 4410], 44_100);
        assert_relative_eq!(chunk.duration_seconds, 0.1);
        assert_eq!(chunk.scheduled_start_time, None);
        assert_eq!(AudioChunk::new(vec![0.0; 8], 0).duration_seconds, 0.0);
    }
}
