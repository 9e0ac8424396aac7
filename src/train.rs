//! Speed supplier
//!
//! The engine only consumes a speed value. This module produces one the
//! way a driver's cab does: a notch controller (power P1..P3, neutral,
//! brake B1..B5) integrated into a speed by simple longitudinal dynamics,
//! plus scripted drive schedules for offline rendering.

use crate::config::InverterConfig;
use crate::constants::{DEFAULT_MAX_ACCELERATION, DEFAULT_MAX_SPEED};
use crate::{Result, VvvfError};
use std::fmt;
use std::str::FromStr;

/// Highest power notch
pub const MAX_POWER_NOTCH: u8 = 3;
/// Highest brake notch
pub const MAX_BRAKE_NOTCH: u8 = 5;

/// Master controller position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Notch {
    /// Power notch 1..=3
    Power(u8),
    /// Coasting
    #[default]
    Neutral,
    /// Brake notch 1..=5
    Brake(u8),
}

impl Notch {
    /// Position on the ladder B5 = -5 .. N = 0 .. P3 = 3
    fn ladder_index(self) -> i8 {
        match self {
            Notch::Power(level) => level.min(MAX_POWER_NOTCH) as i8,
            Notch::Neutral => 0,
            Notch::Brake(level) => -(level.min(MAX_BRAKE_NOTCH) as i8),
        }
    }

    fn from_ladder_index(index: i8) -> Self {
        let index = index.clamp(-(MAX_BRAKE_NOTCH as i8), MAX_POWER_NOTCH as i8);
        match index {
            0 => Notch::Neutral,
            i if i > 0 => Notch::Power(i as u8),
            i => Notch::Brake(i.unsigned_abs()),
        }
    }

    /// One notch towards P3 (B1 steps to N), saturating
    pub fn step_up(self) -> Self {
        Self::from_ladder_index(self.ladder_index() + 1)
    }

    /// One notch towards B5 (P1 steps to N), saturating
    pub fn step_down(self) -> Self {
        Self::from_ladder_index(self.ladder_index() - 1)
    }

    /// Signed acceleration multiplier: +level under power, -level under brake
    pub fn effort(self) -> f64 {
        f64::from(self.ladder_index())
    }
}

impl fmt::Display for Notch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notch::Power(level) => write!(f, "P{level}"),
            Notch::Neutral => write!(f, "N"),
            Notch::Brake(level) => write!(f, "B{level}"),
        }
    }
}

impl FromStr for Notch {
    type Err = VvvfError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid =
            || VvvfError::Other(format!("invalid notch '{s}' (expected P1-P3, N or B1-B5)"));
        let mut chars = s.chars();
        let kind = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        let rest = chars.as_str();
        match kind {
            'N' if rest.is_empty() => Ok(Notch::Neutral),
            'P' | 'B' => {
                let level: u8 = rest.parse().map_err(|_| invalid())?;
                match kind {
                    'P' if (1..=MAX_POWER_NOTCH).contains(&level) => Ok(Notch::Power(level)),
                    'B' if (1..=MAX_BRAKE_NOTCH).contains(&level) => Ok(Notch::Brake(level)),
                    _ => Err(invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }
}

/// Longitudinal dynamics driven by a notch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainDynamics {
    speed: f64,
    max_acceleration: f64,
    max_speed: f64,
    notch: Notch,
}

impl TrainDynamics {
    /// Stationary train in neutral
    pub fn new(max_acceleration: f64, max_speed: f64) -> Self {
        TrainDynamics {
            speed: 0.0,
            max_acceleration,
            max_speed: max_speed.max(0.0),
            notch: Notch::Neutral,
        }
    }

    /// Limits taken from the configuration's vehicle metadata
    pub fn from_config(config: &InverterConfig) -> Self {
        Self::new(config.max_acceleration(), config.max_speed())
    }

    /// Integrate over `dt` seconds and return the new speed
    pub fn update(&mut self, dt: f64) -> f64 {
        self.speed += self.notch.effort() * self.max_acceleration * dt;
        self.speed = self.speed.clamp(0.0, self.max_speed);
        self.speed
    }

    /// Current speed in km/h
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Override the speed (clamped to the limits)
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(0.0, self.max_speed);
    }

    /// Active notch
    pub fn notch(&self) -> Notch {
        self.notch
    }

    /// Move the controller
    pub fn set_notch(&mut self, notch: Notch) {
        self.notch = notch;
    }

    /// Per-notch acceleration in km/h/s
    pub fn max_acceleration(&self) -> f64 {
        self.max_acceleration
    }

    /// Speed ceiling in km/h
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }
}

impl Default for TrainDynamics {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ACCELERATION, DEFAULT_MAX_SPEED)
    }
}

/// Scripted sequence of notches, each held for a number of seconds
#[derive(Debug, Clone, PartialEq)]
pub struct DriveSchedule {
    steps: Vec<(Notch, f64)>,
}

impl DriveSchedule {
    /// Schedule from `(notch, seconds)` steps
    pub fn new(steps: Vec<(Notch, f64)>) -> Result<Self> {
        if steps.is_empty() {
            return Err(VvvfError::Other("drive schedule is empty".into()));
        }
        if let Some((notch, secs)) = steps.iter().find(|(_, s)| !(s.is_finite() && *s >= 0.0)) {
            return Err(VvvfError::Other(format!(
                "drive schedule step {notch} has invalid duration {secs}"
            )));
        }
        Ok(DriveSchedule { steps })
    }

    /// Steps in order
    pub fn steps(&self) -> &[(Notch, f64)] {
        &self.steps
    }

    /// Sum of all step durations in seconds
    pub fn total_duration(&self) -> f64 {
        self.steps.iter().map(|(_, secs)| secs).sum()
    }

    /// Notch active at `elapsed` seconds, `None` once the schedule is over
    pub fn notch_at(&self, elapsed: f64) -> Option<Notch> {
        if elapsed < 0.0 {
            return None;
        }
        let mut end = 0.0;
        for &(notch, secs) in &self.steps {
            end += secs;
            if elapsed < end {
                return Some(notch);
            }
        }
        None
    }

    /// Drive `dynamics` through the schedule, returning the speed after each `step` seconds
    pub fn speed_profile(&self, mut dynamics: TrainDynamics, step: f64) -> Vec<f64> {
        if !(step.is_finite() && step > 0.0) {
            return Vec::new();
        }
        let count = (self.total_duration() / step).ceil() as usize;
        (0..count)
            .map(|i| {
                let notch = self.notch_at(i as f64 * step).unwrap_or(Notch::Neutral);
                dynamics.set_notch(notch);
                dynamics.update(step)
            })
            .collect()
    }
}

impl FromStr for DriveSchedule {
    type Err = VvvfError;

    /// Parse `"P3:20,N:5,B4:25"`
    fn from_str(s: &str) -> Result<Self> {
        let steps = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| {
                let (notch, secs) = part.split_once(':').ok_or_else(|| {
                    VvvfError::Other(format!(
                        "schedule step '{}' is not NOTCH:SECONDS",
                        part.trim()
                    ))
                })?;
                let secs: f64 = secs.trim().parse().map_err(|_| {
                    VvvfError::Other(format!("schedule step '{}' has a bad duration", part.trim()))
                })?;
                Ok((notch.parse::<Notch>()?, secs))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(steps)
    }
}

impl fmt::Display for DriveSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (notch, secs)) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{notch}:{secs}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_notch_ladder_saturates() {
        assert_eq!(Notch::Neutral.step_up(), Notch::Power(1));
        assert_eq!(Notch::Power(3).step_up(), Notch::Power(3));
        assert_eq!(Notch::Power(1).step_down(), Notch::Neutral);
        assert_eq!(Notch::Brake(1).step_up(), Notch::Neutral);
        assert_eq!(Notch::Brake(4).step_down(), Notch::Brake(5));
        assert_eq!(Notch::Brake(5).step_down(), Notch::Brake(5));
    }

    #[test]
    fn test_parse_notch() {
        assert_eq!("P2".parse::<Notch>().unwrap(), Notch::Power(2));
        assert_eq!("n".parse::<Notch>().unwrap(), Notch::Neutral);
        assert_eq!(" B4 ".parse::<Notch>().unwrap(), Notch::Brake(4));
        for bad in ["", "P0", "P4", "B6", "X1", "N1", "Pfast"] {
            assert!(bad.parse::<Notch>().is_err(), "{bad:?} should be rejected");
        }
        assert_eq!(Notch::Brake(3).to_string(), "B3");
    }

    #[test]
    fn test_dynamics_power_and_brake() {
        let mut train = TrainDynamics::new(2.0, 100.0);
        train.set_notch(Notch::Power(3));
        assert_relative_eq!(train.update(1.0), 6.0);
        train.set_notch(Notch::Neutral);
        assert_relative_eq!(train.update(10.0), 6.0);
        train.set_notch(Notch::Brake(2));
        assert_relative_eq!(train.update(1.0), 2.0);
        // Clamped at standstill
        assert_eq!(train.update(10.0), 0.0);
    }

    #[test]
    fn test_dynamics_clamps_to_max_speed() {
        let mut train = TrainDynamics::new(50.0, 120.0);
        train.set_notch(Notch::Power(3));
        assert_eq!(train.update(10.0), 120.0);
    }

    #[test]
    fn test_dynamics_from_config() {
        let train = TrainDynamics::from_config(&InverterConfig::demo());
        assert_eq!(train.max_acceleration(), 3.0);
        assert_eq!(train.max_speed(), 200.0);
        let defaults = TrainDynamics::from_config(&InverterConfig::from_ranges(Vec::new()));
        assert_eq!(defaults.max_acceleration(), 2.0);
        assert_eq!(defaults.max_speed(), 400.0);
    }

    #[test]
    fn test_schedule_parse_and_lookup() {
        let schedule: DriveSchedule = "P3:20, N:5 ,B4:25".parse().unwrap();
        assert_eq!(schedule.steps().len(), 3);
        assert_relative_eq!(schedule.total_duration(), 50.0);
        assert_eq!(schedule.notch_at(0.0), Some(Notch::Power(3)));
        assert_eq!(schedule.notch_at(20.0), Some(Notch::Neutral));
        assert_eq!(schedule.notch_at(49.9), Some(Notch::Brake(4)));
        assert_eq!(schedule.notch_at(50.0), None);
        assert_eq!(schedule.to_string(), "P3:20,N:5,B4:25");
    }

    #[test]
    fn test_schedule_rejects_garbage() {
        assert!("".parse::<DriveSchedule>().is_err());
        assert!("P3".parse::<DriveSchedule>().is_err());
        assert!("P3:abc".parse::<DriveSchedule>().is_err());
        assert!("P3:-1".parse::<DriveSchedule>().is_err());
        assert!("Q1:5".parse::<DriveSchedule>().is_err());
    }

    #[test]
    fn test_speed_profile() {
        let schedule: DriveSchedule = "P1:2,B1:2".parse().unwrap();
        let speeds = schedule.speed_profile(TrainDynamics::new(1.0, 100.0), 0.5);
        assert_eq!(speeds.len(), 8);
        assert_relative_eq!(speeds[3], 2.0);
        assert_relative_eq!(speeds[7], 0.0);
    }
}
