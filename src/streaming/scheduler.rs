//! Buffer scheduler
//!
//! Bounded, lossy FIFO of generated chunks plus the periodic scheduling
//! step that commits them onto a [`PlaybackTimeline`]. Consecutive chunks
//! overlap by the fade length, and each one is committed with matching
//! linear ramps, so boundaries crossfade instead of clicking.
//!
//! The scheduler does not own a clock or a thread. Someone calls
//! [`BufferScheduler::tick`] on a fixed period (see `PlaybackSession`) and
//! the timeline reports the current position.

use super::timeline::{HandleId, PlaybackTimeline};
use super::AudioChunk;
use crate::constants::{
    FADE_OVERLAP_SECS, MAX_QUEUE_SIZE, MIN_START_DEPTH, SCHEDULER_TICK_MS, SCHEDULING_WINDOW_SECS,
};
use std::collections::VecDeque;
use std::time::Duration;

/// Scheduler tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Queued-but-uncommitted chunks kept before the oldest is dropped
    pub max_queue_size: usize,
    /// Queue depth required before playback starts
    pub min_start_depth: usize,
    /// How far ahead of the playback position chunks are committed (seconds)
    pub scheduling_window: f64,
    /// Crossfade length between consecutive chunks (seconds)
    pub fade_overlap: f64,
    /// Period the owner should call `tick` with
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_queue_size: MAX_QUEUE_SIZE,
            min_start_depth: MIN_START_DEPTH,
            scheduling_window: SCHEDULING_WINDOW_SECS,
            fade_overlap: FADE_OVERLAP_SECS,
            tick_interval: Duration::from_millis(SCHEDULER_TICK_MS),
        }
    }
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    /// Waiting for enough queued chunks to start
    #[default]
    Idle,
    /// Committing chunks on every tick
    Scheduling,
}

/// Counters for monitoring queue health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Chunks accepted by `submit`
    pub submitted: u64,
    /// Chunks discarded because the queue was full
    pub dropped: u64,
    /// Chunks committed to the timeline
    pub committed: u64,
    /// Ticks that found the queue starved while the window still had room
    pub underruns: u64,
}

/// A chunk committed to the timeline and not yet finished
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    /// Timeline handle
    pub id: HandleId,
    /// Start time in seconds
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

/// Chunk queue and scheduling step over a playback timeline
#[derive(Debug)]
pub struct BufferScheduler<T: PlaybackTimeline> {
    timeline: T,
    config: SchedulerConfig,
    queue: VecDeque<AudioChunk>,
    in_flight: Vec<ScheduledChunk>,
    state: SchedulerState,
    armed: bool,
    stats: SchedulerStats,
}

impl<T: PlaybackTimeline> BufferScheduler<T> {
    /// Create an idle, disarmed scheduler over `timeline`
    pub fn new(timeline: T, config: SchedulerConfig) -> Self {
        BufferScheduler {
            timeline,
            config,
            queue: VecDeque::with_capacity(config.max_queue_size.max(1)),
            in_flight: Vec::new(),
            state: SchedulerState::Idle,
            armed: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Queue a chunk, dropping the oldest queued one when full
    pub fn submit(&mut self, chunk: AudioChunk) {
        if self.queue.len() >= self.config.max_queue_size.max(1) {
            self.queue.pop_front();
            self.stats.dropped += 1;
            tracing::warn!(
                depth = self.queue.len(),
                "chunk queue full; dropped oldest chunk"
            );
        }
        self.queue.push_back(chunk);
        self.stats.submitted += 1;
    }

    /// Arm the scheduler; playback begins on the first tick with enough queued chunks
    pub fn start(&mut self) {
        self.armed = true;
    }

    /// Run one scheduling step
    pub fn tick(&mut self) {
        if !self.armed {
            return;
        }

        let finished = self.timeline.drain_finished();
        if !finished.is_empty() {
            self.in_flight.retain(|c| !finished.contains(&c.id));
        }

        let starting = self.state == SchedulerState::Idle;
        if starting {
            if self.queue.len() < self.config.min_start_depth {
                return;
            }
            tracing::debug!(depth = self.queue.len(), "starting playback");
            self.state = SchedulerState::Scheduling;
        }

        let fade = self.config.fade_overlap;
        let now = self.timeline.now();
        let limit = now + self.config.scheduling_window;
        let mut horizon = self.commit_horizon(now);

        while horizon < limit {
            let Some(mut chunk) = self.queue.pop_front() else {
                break;
            };
            let duration = chunk.duration_seconds;
            chunk.scheduled_start_time = Some(horizon);
            let id = self.timeline.commit(chunk, horizon, fade);
            self.in_flight.push(ScheduledChunk {
                id,
                start: horizon,
                duration,
            });
            self.stats.committed += 1;
            horizon += duration - fade;
        }

        // The starting tick has nothing committed yet and is not steady state
        if !starting && horizon < limit && self.queue.len() < self.config.min_start_depth {
            self.stats.underruns += 1;
            tracing::warn!(
                depth = self.queue.len(),
                ahead_ms = (horizon - now) * 1000.0,
                "chunk queue underrun"
            );
        }

        if self.in_flight.is_empty() && self.queue.is_empty() {
            tracing::debug!("playback drained; waiting for new chunks");
            self.state = SchedulerState::Idle;
        }
    }

    /// Cancel all playback, clear the queue and disarm
    pub fn stop(&mut self) {
        for chunk in self.in_flight.drain(..) {
            self.timeline.cancel(chunk.id);
        }
        // Discard completions that raced the cancel
        self.timeline.drain_finished();
        self.queue.clear();
        self.state = SchedulerState::Idle;
        self.armed = false;
    }

    /// Where the next chunk would start
    ///
    /// The end of the furthest committed chunk minus the overlap, never
    /// earlier than `now`.
    fn commit_horizon(&self, now: f64) -> f64 {
        let fade = self.config.fade_overlap;
        self.in_flight
            .iter()
            .map(|c| c.start + c.duration - fade)
            .fold(now, f64::max)
    }

    /// Queued chunks not yet committed
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Committed chunks not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Committed chunks in commit order
    pub fn scheduled(&self) -> &[ScheduledChunk] {
        &self.in_flight
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Whether `start` was called and `stop` was not
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Counters since creation
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Active tunables
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Underlying timeline
    pub fn timeline(&self) -> &T {
        &self.timeline
    }

    /// Underlying timeline, mutably
    pub fn timeline_mut(&mut self) -> &mut T {
        &mut self.timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::MixingTimeline;
    use approx::assert_abs_diff_eq;

    /// Timeline with a manually driven clock
    #[derive(Default)]
    struct ManualTimeline {
        now: f64,
        commits: Vec<(HandleId, f64, f32)>,
        cancelled: Vec<HandleId>,
        finished: Vec<HandleId>,
    }

    impl PlaybackTimeline for ManualTimeline {
        fn now(&self) -> f64 {
            self.now
        }

        fn commit(&mut self, chunk: AudioChunk, start: f64, _fade: f64) -> HandleId {
            let id = self.commits.len() as HandleId;
            self.commits.push((id, start, chunk.samples[0]));
            id
        }

        fn cancel(&mut self, id: HandleId) {
            self.cancelled.push(id);
        }

        fn drain_finished(&mut self) -> Vec<HandleId> {
            std::mem::take(&mut self.finished)
        }
    }

    fn chunk(tag: f32, seconds: f64) -> AudioChunk {
        AudioChunk::new(vec![tag; (seconds * 1000.0).round() as usize], 1000)
    }

    fn scheduler() -> BufferScheduler<ManualTimeline> {
        BufferScheduler::new(ManualTimeline::default(), SchedulerConfig::default())
    }

    #[test]
    fn test_three_chunks_overlap_by_fade() {
        let mut s = scheduler();
        s.timeline_mut().now = 2.0;
        s.start();
        for tag in 0..3 {
            s.submit(chunk(tag as f32, 0.1));
        }
        s.tick();

        let starts: Vec<f64> = s.scheduled().iter().map(|c| c.start).collect();
        assert_eq!(starts.len(), 3);
        assert_abs_diff_eq!(starts[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(starts[1], 2.095, epsilon = 1e-9);
        assert_abs_diff_eq!(starts[2], 2.190, epsilon = 1e-9);
        assert_eq!(s.queue_depth(), 0);
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let mut s = scheduler();
        for tag in 0..7 {
            s.submit(chunk(tag as f32, 0.2));
            assert!(s.queue_depth() <= MAX_QUEUE_SIZE);
        }
        assert_eq!(s.queue_depth(), MAX_QUEUE_SIZE);
        assert_eq!(s.stats().dropped, 2);

        s.start();
        s.tick();
        // Oldest two were dropped; commits begin with chunk 2
        assert_eq!(s.timeline().commits[0].2, 2.0);
    }

    #[test]
    fn test_waits_for_two_chunks() {
        let mut s = scheduler();
        s.start();
        s.submit(chunk(0.0, 0.1));
        s.tick();
        assert_eq!(s.state(), SchedulerState::Idle);
        assert_eq!(s.in_flight(), 0);

        s.submit(chunk(1.0, 0.1));
        s.tick();
        assert_eq!(s.state(), SchedulerState::Scheduling);
        assert_eq!(s.in_flight(), 2);
    }

    #[test]
    fn test_not_started_never_commits() {
        let mut s = scheduler();
        for tag in 0..4 {
            s.submit(chunk(tag as f32, 0.1));
        }
        s.tick();
        assert_eq!(s.in_flight(), 0);
        assert_eq!(s.queue_depth(), 4);
    }

    #[test]
    fn test_window_limits_commits() {
        let mut s = scheduler();
        s.start();
        for tag in 0..5 {
            s.submit(chunk(tag as f32, 0.2));
        }
        s.tick();
        // Starts 0, 0.195, 0.39; the horizon then reaches 0.585 > 0.5
        assert_eq!(s.in_flight(), 3);
        assert_eq!(s.queue_depth(), 2);

        s.timeline_mut().now = 0.3;
        s.tick();
        let starts: Vec<f64> = s.scheduled().iter().map(|c| c.start).collect();
        assert_eq!(starts.len(), 5);
        assert_abs_diff_eq!(starts[3], 0.585, epsilon = 1e-9);
        assert_abs_diff_eq!(starts[4], 0.78, epsilon = 1e-9);
    }

    #[test]
    fn test_finished_handles_leave_in_flight() {
        let mut s = scheduler();
        s.start();
        for tag in 0..3 {
            s.submit(chunk(tag as f32, 0.1));
        }
        s.tick();
        s.timeline_mut().finished = vec![0, 1];
        s.timeline_mut().now = 0.2;
        s.tick();
        assert_eq!(s.in_flight(), 1);
        assert_eq!(s.scheduled()[0].id, 2);
    }

    #[test]
    fn test_horizon_resets_to_now_after_gap() {
        let mut s = scheduler();
        s.start();
        for tag in 0..2 {
            s.submit(chunk(tag as f32, 0.1));
        }
        s.tick();
        s.timeline_mut().now = 5.0;
        s.submit(chunk(2.0, 0.1));
        s.tick();
        assert_abs_diff_eq!(s.scheduled()[2].start, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_underrun_is_counted_not_fatal() {
        let mut s = scheduler();
        s.start();
        s.submit(chunk(0.0, 0.1));
        s.submit(chunk(1.0, 0.1));
        s.tick();
        assert_eq!(s.stats().underruns, 0);
        s.tick();
        assert_eq!(s.stats().underruns, 1);
        s.tick();
        assert_eq!(s.stats().underruns, 2);
        assert_eq!(s.state(), SchedulerState::Scheduling);
    }

    #[test]
    fn test_stop_cancels_everything() {
        let mut s = scheduler();
        s.start();
        for tag in 0..5 {
            s.submit(chunk(tag as f32, 0.2));
        }
        s.tick();
        s.stop();
        assert_eq!(s.timeline().cancelled, vec![0, 1, 2]);
        assert_eq!(s.in_flight(), 0);
        assert_eq!(s.queue_depth(), 0);
        assert_eq!(s.state(), SchedulerState::Idle);
        assert!(!s.is_armed());

        s.submit(chunk(9.0, 0.1));
        s.submit(chunk(9.0, 0.1));
        s.tick();
        assert_eq!(s.in_flight(), 0);
    }

    #[test]
    fn test_drains_back_to_idle() {
        let mut s = scheduler();
        s.start();
        s.submit(chunk(0.0, 0.1));
        s.submit(chunk(1.0, 0.1));
        s.tick();
        s.timeline_mut().finished = vec![0, 1];
        s.tick();
        assert_eq!(s.state(), SchedulerState::Idle);
        assert!(s.is_armed());
    }

    #[test]
    fn test_mixing_timeline_end_to_end() {
        let timeline = MixingTimeline::new(1000);
        let mut s = BufferScheduler::new(timeline.clone(), SchedulerConfig::default());
        s.start();
        s.submit(chunk(1.0, 0.1));
        s.submit(chunk(1.0, 0.1));
        s.tick();

        let mut out = vec![0.0f32; 195];
        timeline.render(&mut out);
        // Unity gain across the crossfaded boundary at frame 95..100
        for &sample in &out[5..190] {
            assert!((sample - 1.0).abs() < 1e-5, "{sample}");
        }
        s.tick();
        assert_eq!(s.in_flight(), 0);
        assert_eq!(s.state(), SchedulerState::Idle);
    }
}
