//! Carrier/command phase accumulators
//!
//! Two independent angles advanced once per generated sample and wrapped
//! lazily back into `[0, 2π)`. A single correction per call is enough as
//! long as each per-sample increment stays below a full turn, i.e. the
//! driven frequency stays below the sample rate.

use crate::constants::TWO_PI;

/// Phase state owned by exactly one engine instance
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OscillatorPhase {
    carrier: f64,
    command: f64,
}

impl OscillatorPhase {
    /// Both phases at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase pair starting at the given angles (wrapped into range)
    pub fn from_angles(carrier: f64, command: f64) -> Self {
        OscillatorPhase {
            carrier: wrap_angle(carrier.rem_euclid(TWO_PI)),
            command: wrap_angle(command.rem_euclid(TWO_PI)),
        }
    }

    /// Per-sample phase increment for `frequency` at `sample_rate`
    #[inline]
    pub fn increment(frequency: f64, sample_rate: f64) -> f64 {
        TWO_PI * frequency / sample_rate
    }

    /// Advance the carrier and return the (not yet wrapped) new angle
    #[inline]
    pub fn advance_carrier(&mut self, frequency: f64, sample_rate: f64) -> f64 {
        self.carrier += Self::increment(frequency, sample_rate);
        self.carrier
    }

    /// Advance the command and return the (not yet wrapped) new angle
    #[inline]
    pub fn advance_command(&mut self, frequency: f64, sample_rate: f64) -> f64 {
        self.command += Self::increment(frequency, sample_rate);
        self.command
    }

    /// Bring both angles back into `[0, 2π)` with one correction each
    #[inline]
    pub fn wrap(&mut self) {
        self.carrier = wrap_angle(self.carrier);
        self.command = wrap_angle(self.command);
    }

    /// Carrier angle in radians
    pub fn carrier(&self) -> f64 {
        self.carrier
    }

    /// Command angle in radians
    pub fn command(&self) -> f64 {
        self.command
    }

    /// Return both phases to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Single-step wrap; also folds a negative angle (reverse running) back up
#[inline]
fn wrap_angle(angle: f64) -> f64 {
    let wrapped = if angle >= TWO_PI {
        angle - TWO_PI
    } else if angle < 0.0 {
        angle + TWO_PI
    } else {
        angle
    };
    // -tiny + 2π can round to exactly 2π
    if wrapped >= TWO_PI {
        0.0
    } else {
        wrapped
    }
}
