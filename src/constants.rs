//! Shared constants
//!
//! Timing and sizing defaults used across the engine, the scheduler and the CLI.

use std::f64::consts::PI;

/// Full turn in radians; phase accumulators live in `[0, TWO_PI)`
pub const TWO_PI: f64 = 2.0 * PI;

/// Default sample rate (44.1 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default chunk size in samples (100 ms at 44.1 kHz)
pub const DEFAULT_CHUNK_SIZE: usize = 4410;

/// Default number of samples rendered per display frame
pub const DEFAULT_DISPLAY_WIDTH: usize = 1024;

/// Maximum queued-but-unscheduled chunks before the oldest is dropped
pub const MAX_QUEUE_SIZE: usize = 5;

/// Minimum queue depth required before playback begins
pub const MIN_START_DEPTH: usize = 2;

/// Scheduler tick period in milliseconds
pub const SCHEDULER_TICK_MS: u64 = 100;

/// How far ahead of "now" the scheduler commits chunks (seconds)
pub const SCHEDULING_WINDOW_SECS: f64 = 0.5;

/// Crossfade overlap between consecutive chunks (seconds)
pub const FADE_OVERLAP_SECS: f64 = 0.005;

/// Default ring size of the speed history used for mode detection
pub const DEFAULT_HISTORY_SIZE: usize = 32;

/// Default decimation: keep one speed sample every N engine calls (10 ms @ 44.1 kHz)
pub const DEFAULT_HISTORY_SAMPLE_INTERVAL: u32 = 441;

/// Default re-classification period in engine calls (100 ms @ 44.1 kHz)
pub const DEFAULT_MODE_CHECK_INTERVAL: u32 = 4410;

/// Default maximum acceleration (km/h/s) when the configuration omits it
pub const DEFAULT_MAX_ACCELERATION: f64 = 2.0;

/// Default maximum vehicle speed (km/h) when the configuration omits it
pub const DEFAULT_MAX_SPEED: f64 = 400.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunk_is_one_tick_long() {
        let chunk_ms = DEFAULT_CHUNK_SIZE as f64 * 1000.0 / DEFAULT_SAMPLE_RATE as f64;
        assert!((chunk_ms - SCHEDULER_TICK_MS as f64).abs() < 1e-9);
    }

    #[test]
    fn test_fade_shorter_than_chunk() {
        let chunk_secs = DEFAULT_CHUNK_SIZE as f64 / DEFAULT_SAMPLE_RATE as f64;
        assert!(FADE_OVERLAP_SECS * 2.0 < chunk_secs);
        assert!(SCHEDULING_WINDOW_SECS > chunk_secs);
    }
}
