//! Audio device integration using rodio
//!
//! Plays a [`MixingTimeline`] on the system audio device. The rodio source
//! renders the timeline in small batches; while nothing is committed the
//! timeline renders silence, which keeps the stream alive across gaps.

use super::{MixingTimeline, StreamConfig};
use crate::{Result, VvvfError};
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Frames rendered per timeline lock
const RENDER_BATCH_FRAMES: usize = 512;

/// rodio source reading from the mixing timeline
struct TimelineSource {
    timeline: MixingTimeline,
    sample_rate: u32,
    channels: u16,
    finished: Arc<AtomicBool>,
    /// Mono frames rendered from the timeline
    frames: Vec<f32>,
    /// Next frame to emit
    frame_pos: usize,
    /// Channel of the current frame already emitted
    channel_pos: u16,
}

impl TimelineSource {
    fn new(
        timeline: MixingTimeline,
        sample_rate: u32,
        channels: u16,
        finished: Arc<AtomicBool>,
    ) -> Self {
        TimelineSource {
            timeline,
            sample_rate,
            channels: channels.max(1),
            finished,
            frames: vec![0.0; RENDER_BATCH_FRAMES],
            frame_pos: RENDER_BATCH_FRAMES,
            channel_pos: 0,
        }
    }
}

impl Source for TimelineSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(RENDER_BATCH_FRAMES * self.channels as usize)
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for TimelineSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.frame_pos >= self.frames.len() {
            self.timeline.render(&mut self.frames);
            self.frame_pos = 0;
            self.channel_pos = 0;
        }

        // Mono signal duplicated across channels
        let sample = self.frames[self.frame_pos];
        self.channel_pos += 1;
        if self.channel_pos >= self.channels {
            self.channel_pos = 0;
            self.frame_pos += 1;
        }
        Some(sample)
    }
}

/// Audio playback device using rodio
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start playing `timeline`
    pub fn new(timeline: MixingTimeline, config: &StreamConfig) -> Result<Self> {
        if timeline.sample_rate() != config.sample_rate {
            return Err(VvvfError::AudioDeviceError(format!(
                "timeline runs at {} Hz but the stream is configured for {} Hz",
                timeline.sample_rate(),
                config.sample_rate
            )));
        }

        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            VvvfError::AudioDeviceError(format!("Failed to create audio stream: {}", e))
        })?;

        let sink = Sink::try_new(&stream_handle).map_err(|e| {
            VvvfError::AudioDeviceError(format!("Failed to create audio sink: {}", e))
        })?;

        let finished = Arc::new(AtomicBool::new(false));
        let source = TimelineSource::new(
            timeline,
            config.sample_rate,
            config.channels,
            Arc::clone(&finished),
        );
        sink.append(source);

        tracing::info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            "audio output started"
        );

        Ok(AudioDevice {
            _stream: stream,
            sink,
            running: Arc::new(AtomicBool::new(true)),
            finished,
        })
    }

    /// Pause playback
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume playback
    pub fn play(&self) {
        self.sink.play();
    }

    /// Whether the stream is still playing (false after `finish`)
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signal that the stream should end instead of rendering silence forever
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.finish();
        self.pause();
    }
}
