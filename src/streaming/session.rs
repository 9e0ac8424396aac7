//! Periodic playback session
//!
//! Runs the scheduling tick on its own thread: every tick pulls finished
//! chunks from the source, keeps at least two requests in the pipeline at
//! the current speed, and lets the scheduler commit what fits in its
//! window. The speed itself is published by the caller through
//! [`SharedSpeed`].

use super::scheduler::{BufferScheduler, SchedulerConfig, SchedulerStats};
use super::source::ChunkSource;
use super::timeline::MixingTimeline;
use crate::{Result, VvvfError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Speed value shared between a speed supplier and the session thread
#[derive(Debug, Clone, Default)]
pub struct SharedSpeed(Arc<AtomicU64>);

impl SharedSpeed {
    /// Cell holding `speed` km/h
    pub fn new(speed: f64) -> Self {
        SharedSpeed(Arc::new(AtomicU64::new(speed.to_bits())))
    }

    /// Current speed in km/h
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Publish a new speed in km/h
    pub fn set(&self, speed: f64) {
        self.0.store(speed.to_bits(), Ordering::Relaxed);
    }
}

/// Scheduler plus the thread ticking it
pub struct PlaybackSession {
    scheduler: Arc<Mutex<BufferScheduler<MixingTimeline>>>,
    timeline: MixingTimeline,
    stop_signal: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl PlaybackSession {
    /// Start ticking `source` into a scheduler over `timeline`
    ///
    /// Nothing is audible until someone renders the timeline (an
    /// `AudioDevice`, or a test pulling frames by hand).
    pub fn start<S>(
        mut source: S,
        timeline: MixingTimeline,
        config: SchedulerConfig,
        chunk_size: usize,
        speed: SharedSpeed,
    ) -> Result<Self>
    where
        S: ChunkSource + Send + 'static,
    {
        let scheduler = Arc::new(Mutex::new(BufferScheduler::new(timeline.clone(), config)));
        let stop_signal = Arc::new(AtomicBool::new(false));

        let ticker = {
            let scheduler = Arc::clone(&scheduler);
            let stop_signal = Arc::clone(&stop_signal);
            let min_depth = config.min_start_depth;
            thread::Builder::new()
                .name("vvvf-scheduler".into())
                .spawn(move || {
                    tracing::debug!(
                        tick_ms = config.tick_interval.as_millis() as u64,
                        "scheduler thread started"
                    );
                    while !stop_signal.load(Ordering::Relaxed) {
                        {
                            let mut scheduler = scheduler.lock();
                            let wanted = min_depth
                                .saturating_sub(scheduler.queue_depth() + source.pending());
                            for _ in 0..wanted {
                                source.request(speed.get(), chunk_size);
                            }
                            while let Some(chunk) = source.poll() {
                                scheduler.submit(chunk);
                            }
                            scheduler.start();
                            scheduler.tick();
                        }
                        thread::sleep(config.tick_interval);
                    }
                    tracing::debug!("scheduler thread exiting");
                })
                .map_err(|e| VvvfError::Other(format!("Failed to spawn scheduler thread: {e}")))?
        };

        Ok(PlaybackSession {
            scheduler,
            timeline,
            stop_signal,
            ticker: Some(ticker),
        })
    }

    /// Cancel the tick thread and all scheduled playback
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Relaxed);
        if let Some(ticker) = self.ticker.take() {
            if ticker.join().is_err() {
                tracing::warn!("scheduler thread panicked");
            }
        }
        self.scheduler.lock().stop();
    }

    /// Whether the tick thread is still running
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Queued chunks waiting for the window
    pub fn queue_depth(&self) -> usize {
        self.scheduler.lock().queue_depth()
    }

    /// Committed chunks still playing
    pub fn in_flight(&self) -> usize {
        self.scheduler.lock().in_flight()
    }

    /// Scheduler counters
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.lock().stats()
    }

    /// Timeline the session commits to
    pub fn timeline(&self) -> &MixingTimeline {
        &self.timeline
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
