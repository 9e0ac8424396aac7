//! Playback timeline
//!
//! A timeline accepts chunks at absolute start times and plays them out.
//! [`MixingTimeline`] is the in-process implementation: committed chunks
//! become voices that are summed at their start frame with linear fade
//! ramps, so overlapping chunk edges crossfade.

use super::AudioChunk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Identifier of a committed chunk
pub type HandleId = u64;

/// Something committed chunks can be played on
pub trait PlaybackTimeline {
    /// Current playback position in seconds
    fn now(&self) -> f64;

    /// Schedule `chunk` to start at `start` seconds with `fade` second ramps
    fn commit(&mut self, chunk: AudioChunk, start: f64, fade: f64) -> HandleId;

    /// Stop a committed chunk immediately and forget it
    fn cancel(&mut self, id: HandleId);

    /// Handles that finished playing since the last call
    fn drain_finished(&mut self) -> Vec<HandleId>;
}

#[derive(Debug)]
struct Voice {
    id: HandleId,
    start_frame: u64,
    /// Requested start minus `start_frame`, in frames
    start_offset: f64,
    samples: Vec<f32>,
    fade_frames: f64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }

    /// Linear ramp in over the first `fade_frames`, out over the last
    ///
    /// Measured from the requested (unrounded) start, so a neighbour whose
    /// start rounded the other way still crossfades to unity.
    #[inline]
    fn gain(&self, index: usize) -> f32 {
        if self.fade_frames <= 0.0 {
            return 1.0;
        }
        let t = index as f64 - self.start_offset;
        let fade_in = (t / self.fade_frames).clamp(0.0, 1.0);
        let fade_out = ((self.samples.len() as f64 - t) / self.fade_frames).clamp(0.0, 1.0);
        (fade_in * fade_out) as f32
    }
}

#[derive(Debug)]
struct MixerState {
    sample_rate: u32,
    /// Frames rendered so far
    frame: u64,
    volume: f32,
    voices: Vec<Voice>,
    finished: Vec<HandleId>,
    next_id: HandleId,
}

/// Sample-accurate mixing timeline
///
/// Cloning yields another handle to the same timeline, so the scheduler
/// and an output sink can share it.
#[derive(Debug, Clone)]
pub struct MixingTimeline {
    state: Arc<Mutex<MixerState>>,
}

impl MixingTimeline {
    /// Create an empty timeline at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        MixingTimeline {
            state: Arc::new(Mutex::new(MixerState {
                sample_rate: sample_rate.max(1),
                frame: 0,
                volume: 1.0,
                voices: Vec::new(),
                finished: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Mix the next `output.len()` frames into `output` and advance the clock
    ///
    /// Frames with no voice render as silence.
    pub fn render(&self, output: &mut [f32]) {
        output.fill(0.0);
        let mut state = self.state.lock();
        let block_start = state.frame;
        let block_end = block_start + output.len() as u64;
        let volume = state.volume;

        for voice in &state.voices {
            let from = voice.start_frame.max(block_start);
            let to = voice.end_frame().min(block_end);
            for frame in from..to {
                let index = (frame - voice.start_frame) as usize;
                output[(frame - block_start) as usize] +=
                    voice.samples[index] * voice.gain(index) * volume;
            }
        }

        state.frame = block_end;
        let MixerState {
            voices, finished, ..
        } = &mut *state;
        voices.retain(|voice| {
            let done = voice.end_frame() <= block_end;
            if done {
                finished.push(voice.id);
            }
            !done
        });
    }

    /// Master gain applied to every voice
    pub fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume.clamp(0.0, 1.0);
    }

    /// Current master gain
    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Timeline sample rate
    pub fn sample_rate(&self) -> u32 {
        self.state.lock().sample_rate
    }

    /// Frames rendered so far
    pub fn position_frames(&self) -> u64 {
        self.state.lock().frame
    }

    /// Number of committed voices not yet fully rendered
    pub fn active_voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Frame at which the last committed voice ends (or the clock if none)
    pub fn end_frame(&self) -> u64 {
        let state = self.state.lock();
        state
            .voices
            .iter()
            .map(Voice::end_frame)
            .max()
            .unwrap_or(state.frame)
            .max(state.frame)
    }
}

impl PlaybackTimeline for MixingTimeline {
    fn now(&self) -> f64 {
        let state = self.state.lock();
        state.frame as f64 / f64::from(state.sample_rate)
    }

    fn commit(&mut self, chunk: AudioChunk, start: f64, fade: f64) -> HandleId {
        let mut state = self.state.lock();
        let rate = f64::from(state.sample_rate);
        if chunk.sample_rate != state.sample_rate {
            tracing::warn!(
                chunk_rate = chunk.sample_rate,
                timeline_rate = state.sample_rate,
                "chunk sample rate differs from timeline; playing at timeline rate"
            );
        }
        let exact_start = (start * rate).max(0.0);
        let rounded = exact_start.round() as u64;
        // A start already in the past plays from the current frame
        let (start_frame, start_offset) = if rounded < state.frame {
            (state.frame, 0.0)
        } else {
            (rounded, exact_start - rounded as f64)
        };
        let fade_frames = (fade * rate).max(0.0);

        let id = state.next_id;
        state.next_id += 1;
        state.voices.push(Voice {
            id,
            start_frame,
            start_offset,
            samples: chunk.samples,
            fade_frames,
        });
        id
    }

    fn cancel(&mut self, id: HandleId) {
        self.state.lock().voices.retain(|voice| voice.id != id);
    }

    fn drain_finished(&mut self) -> Vec<HandleId> {
        std::mem::take(&mut self.state.lock().finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn chunk(value: f32, len: usize, rate: u32) -> AudioChunk {
        AudioChunk::new(vec![value; len], rate)
    }

    #[test]
    fn test_render_places_chunk_at_start() {
        let mut timeline = MixingTimeline::new(100);
        timeline.commit(chunk(0.5, 10, 100), 0.05, 0.0);
        let mut out = vec![1.0; 20];
        timeline.render(&mut out);
        assert!(out[..5].iter().all(|&s| s == 0.0));
        assert!(out[5..15].iter().all(|&s| s == 0.5));
        assert!(out[15..].iter().all(|&s| s == 0.0));
        assert_eq!(timeline.position_frames(), 20);
        assert_abs_diff_eq!(timeline.now(), 0.2);
    }

    #[test]
    fn test_fades_and_crossfade_sum_to_unity() {
        let mut timeline = MixingTimeline::new(100);
        // Two chunks of 20 frames overlapping by the 5 frame fade
        timeline.commit(chunk(1.0, 20, 100), 0.0, 0.05);
        timeline.commit(chunk(1.0, 20, 100), 0.15, 0.05);
        let mut out = vec![0.0; 35];
        timeline.render(&mut out);

        assert_eq!(out[0], 0.0);
        assert_abs_diff_eq!(out[1], 0.2, epsilon = 1e-6);
        // Steady middle and the whole overlap region are at unity gain
        for (i, &s) in out.iter().enumerate().take(30).skip(5) {
            assert!((s - 1.0).abs() < 1e-6, "frame {i}: {s}");
        }
        assert_abs_diff_eq!(out[34], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_finished_handles_are_reported_once() {
        let mut timeline = MixingTimeline::new(100);
        let a = timeline.commit(chunk(0.1, 10, 100), 0.0, 0.0);
        let b = timeline.commit(chunk(0.1, 10, 100), 0.1, 0.0);
        let mut out = vec![0.0; 10];
        timeline.render(&mut out);
        assert_eq!(timeline.drain_finished(), vec![a]);
        assert!(timeline.drain_finished().is_empty());
        timeline.render(&mut out);
        assert_eq!(timeline.drain_finished(), vec![b]);
        assert_eq!(timeline.active_voices(), 0);
    }

    #[test]
    fn test_cancel_silences_voice() {
        let mut timeline = MixingTimeline::new(100);
        let id = timeline.commit(chunk(0.3, 50, 100), 0.0, 0.0);
        timeline.cancel(id);
        let mut out = vec![0.0; 50];
        timeline.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(timeline.drain_finished().is_empty());
    }

    #[test]
    fn test_volume_and_shared_clone() {
        let mut timeline = MixingTimeline::new(100);
        let sink = timeline.clone();
        sink.set_volume(0.5);
        timeline.commit(chunk(0.8, 4, 100), 0.0, 0.0);
        let mut out = vec![0.0; 4];
        sink.render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.4).abs() < 1e-6));
        assert_eq!(timeline.position_frames(), 4);
        sink.set_volume(3.0);
        assert_eq!(timeline.volume(), 1.0);
    }

    #[test]
    fn test_crossfade_unity_on_half_frame_boundaries() {
        // 0.095 s steps and a 5 ms fade fall on half frames at 44.1 kHz
        let mut timeline = MixingTimeline::new(44_100);
        for i in 0..5 {
            timeline.commit(chunk(1.0, 4410, 44_100), i as f64 * 0.095, 0.005);
        }
        let mut out = vec![0.0; 17_640];
        timeline.render(&mut out);
        for (i, &s) in out.iter().enumerate().skip(221) {
            assert!((s - 1.0).abs() < 1e-5, "frame {i}: {s}");
        }
    }

    #[test]
    fn test_late_commit_starts_now() {
        let mut timeline = MixingTimeline::new(100);
        let mut out = vec![0.0; 10];
        timeline.render(&mut out);
        timeline.commit(chunk(1.0, 5, 100), 0.0, 0.0);
        assert_eq!(timeline.end_frame(), 15);
        timeline.render(&mut out);
        assert!(out[..5].iter().all(|&s| s == 1.0));
    }
}
