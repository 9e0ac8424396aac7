//! Driving regime detection
//!
//! Keeps a decimated ring of recent speeds and labels the regime from the
//! mean of consecutive speed deltas. The label is latched between checks so
//! the selected modulation does not flicker sample to sample.

use crate::config::{ModeDetection, ModeKey};

/// Detected driving regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegimeLabel {
    /// Speed trending up
    Accelerating,
    /// Speed trending down
    Braking,
    /// No trend (or not enough history yet)
    #[default]
    Neutral,
}

impl RegimeLabel {
    /// `perMode` key tried first for this regime
    pub fn mode_key(self) -> ModeKey {
        match self {
            RegimeLabel::Accelerating => ModeKey::Acceleration,
            RegimeLabel::Braking => ModeKey::Brake,
            RegimeLabel::Neutral => ModeKey::Neutral,
        }
    }
}

/// Windowed speed-history analyser
#[derive(Debug, Clone)]
pub struct ModeClassifier {
    /// Circular buffer of decimated speed samples
    history: Box<[f64]>,
    /// Next write position in `history`
    position: usize,
    /// Number of valid samples (saturates at capacity)
    filled: usize,
    sample_interval: u64,
    mode_check_interval: u64,
    /// Total `observe` calls so far
    calls: u64,
    label: RegimeLabel,
}

impl ModeClassifier {
    /// Create a classifier; zero settings are raised to 1 (history to 2)
    pub fn new(settings: ModeDetection) -> Self {
        let capacity = settings.history_size.max(2);
        ModeClassifier {
            history: vec![0.0; capacity].into_boxed_slice(),
            position: 0,
            filled: 0,
            sample_interval: u64::from(settings.sample_interval.max(1)),
            mode_check_interval: u64::from(settings.mode_check_interval.max(1)),
            calls: 0,
            label: RegimeLabel::Neutral,
        }
    }

    /// Feed one speed value (one per generated sample) and return the latched label
    pub fn observe(&mut self, speed: f64) -> RegimeLabel {
        if self.calls % self.sample_interval == 0 {
            self.push(speed);
        }
        self.calls += 1;
        if self.calls % self.mode_check_interval == 0 {
            self.label = self.classify();
        }
        self.label
    }

    /// Label in effect until the next check
    pub fn label(&self) -> RegimeLabel {
        self.label
    }

    /// Mean of consecutive deltas across the history, oldest to newest
    pub fn mean_delta(&self) -> Option<f64> {
        if self.filled < 2 {
            return None;
        }
        let capacity = self.history.len();
        let start = if self.filled < capacity { 0 } else { self.position };
        let mut previous = self.history[start];
        let mut sum = 0.0;
        for i in 1..self.filled {
            let current = self.history[(start + i) % capacity];
            sum += current - previous;
            previous = current;
        }
        Some(sum / (self.filled - 1) as f64)
    }

    /// Forget all history and return to `Neutral`
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.position = 0;
        self.filled = 0;
        self.calls = 0;
        self.label = RegimeLabel::Neutral;
    }

    fn push(&mut self, speed: f64) {
        self.history[self.position] = speed;
        self.position = (self.position + 1) % self.history.len();
        self.filled = (self.filled + 1).min(self.history.len());
    }

    fn classify(&self) -> RegimeLabel {
        match self.mean_delta() {
            Some(mean) if mean > 0.0 => RegimeLabel::Accelerating,
            Some(mean) if mean < 0.0 => RegimeLabel::Braking,
            _ => RegimeLabel::Neutral,
        }
    }
}

impl Default for ModeClassifier {
    fn default() -> Self {
        Self::new(ModeDetection::default())
    }
}
