//! Naturally-sampled PWM engine
//!
//! One call produces one sample of the emulated inverter leg voltage: a
//! sawtooth or triangle carrier is compared against a sinusoidal command
//! whose frequency follows the vehicle speed. Which carrier, at what
//! frequency and with what command amplitude is decided per sample from the
//! speed range table (and, optionally, the detected driving regime).
//!
//! The phase state lives in an [`OscillatorPhase`] owned by the engine.
//! Consumers that need independent waveforms (audio vs. display) must each
//! own an engine; nothing here is shared or static.

use super::phase::OscillatorPhase;
use super::regime::{ModeClassifier, RegimeLabel};
use super::table::SpeedRangeTable;
use crate::config::{AmplitudeModifier, CarrierKind, InverterConfig, SpeedRange};
use std::collections::HashSet;
use std::f64::consts::PI;

/// Output of one engine call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleTriple {
    /// Comparator output (emulated leg voltage)
    pub sound_sample: f64,
    /// Command reference after amplitude shaping
    pub command_sample: f64,
    /// Carrier reference in `[0, 1]`
    pub carrier_sample: f64,
}

impl SampleTriple {
    /// Silence: returned at standstill and outside every speed range
    pub const ZERO: SampleTriple = SampleTriple {
        sound_sample: 0.0,
        command_sample: 0.0,
        carrier_sample: 0.0,
    };
}

/// Carrier waveform shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierWaveform {
    /// Rising ramp with period π, range `[0, 1)` (asynchronous modes)
    Sawtooth,
    /// Symmetric triangle with period π, range `[0, 1]` (synchronous mode)
    Triangle,
}

impl CarrierWaveform {
    /// Carrier value at `phase` radians
    ///
    /// The period is π rather than 2π, so one accumulator sweep covers both
    /// polarity half-cycles of the command.
    #[inline]
    pub fn sample(self, phase: f64) -> f64 {
        let ramp = (phase % PI) / PI;
        match self {
            CarrierWaveform::Sawtooth => ramp,
            CarrierWaveform::Triangle => (ramp * 2.0 - 1.0).abs(),
        }
    }
}

/// Fully resolved parameters for one PWM step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmDrive {
    /// Carrier frequency in Hz
    pub carrier_frequency: f64,
    /// Carrier shape
    pub waveform: CarrierWaveform,
    /// Command frequency in Hz
    pub command_frequency: f64,
    /// Command amplitude; also the comparator's power rail
    pub amplitude: f64,
    /// Extra command scale when wide pulse mode is on
    pub wide_pulse: Option<f64>,
}

impl PwmDrive {
    /// Comparator output magnitude
    #[inline]
    pub fn power_rail(&self) -> f64 {
        self.amplitude
    }
}

/// Time-domain comparator of naturally-sampled PWM
///
/// `+rail` while the command is positive and above the carrier, `-rail`
/// while it is negative and below the mirrored carrier, `0` otherwise.
#[inline]
pub fn compare(command: f64, carrier: f64, rail: f64) -> f64 {
    if command > 0.0 && command > carrier {
        rail
    } else if command < 0.0 && command < -carrier {
        -rail
    } else {
        0.0
    }
}

/// Advance `phase` by one sample under `drive` and return the outputs
///
/// Order matters for bit-exact output: the carrier is advanced and sampled,
/// then the command, then the comparator runs, and only then are both
/// phases wrapped.
pub fn pwm_step(phase: &mut OscillatorPhase, drive: &PwmDrive, sample_rate: f64) -> SampleTriple {
    let carrier_phase = phase.advance_carrier(drive.carrier_frequency, sample_rate);
    let carrier = drive.waveform.sample(carrier_phase);

    let command_phase = phase.advance_command(drive.command_frequency, sample_rate);
    let mut command = command_phase.sin() * drive.amplitude;
    if let Some(index) = drive.wide_pulse {
        command *= index;
    }

    let output = compare(command, carrier, drive.power_rail());

    phase.wrap();

    SampleTriple {
        sound_sample: output,
        command_sample: command,
        carrier_sample: carrier,
    }
}

/// Run an amplitude chain at `speed` inside `range`
///
/// Starts at 1. Every recognised modifier overwrites the running value (it
/// does not multiply), so the last one decides; unknown kinds are skipped.
pub fn apply_amplitude_modifiers(
    modifiers: &[AmplitudeModifier],
    speed: f64,
    range: &SpeedRange,
) -> f64 {
    let mut amplitude = 1.0;
    for modifier in modifiers {
        match *modifier {
            AmplitudeModifier::Constant { value } => amplitude = value,
            AmplitudeModifier::Ramp {
                start_value,
                end_value,
            } => {
                amplitude = start_value + (end_value - start_value) * range.position(speed);
            }
            AmplitudeModifier::Unknown => {}
        }
    }
    amplitude
}

/// Carrier frequency and shape for `carrier` at `speed` inside `range`
pub fn resolve_carrier(
    carrier: CarrierKind,
    speed: f64,
    range: &SpeedRange,
    command_frequency: f64,
) -> (f64, CarrierWaveform) {
    match carrier {
        CarrierKind::Fixed { carrier_frequency } => (carrier_frequency, CarrierWaveform::Sawtooth),
        CarrierKind::Ramp {
            min_carrier_frequency,
            max_carrier_frequency,
        } => {
            let ratio = range.position(speed);
            (
                min_carrier_frequency + (max_carrier_frequency - min_carrier_frequency) * ratio,
                CarrierWaveform::Sawtooth,
            )
        }
        CarrierKind::Sync { pulse_count } => (
            f64::from(pulse_count) * command_frequency,
            CarrierWaveform::Triangle,
        ),
    }
}

/// Speed-driven PWM sample generator
#[derive(Debug, Clone)]
pub struct ModulationEngine {
    table: SpeedRangeTable,
    gear_ratio: f64,
    phase: OscillatorPhase,
    classifier: Option<ModeClassifier>,
    /// (range, modifier position) pairs already reported as unknown
    reported_unknown: HashSet<(usize, usize)>,
    reported_nyquist: bool,
}

impl ModulationEngine {
    /// Build an engine from a parsed configuration
    ///
    /// A mode classifier is attached when the configuration has a
    /// `modeDetection` block or any `perMode` table.
    pub fn new(config: &InverterConfig) -> Self {
        let classifier = config
            .uses_mode_detection()
            .then(|| ModeClassifier::new(config.mode_detection.unwrap_or_default()));
        ModulationEngine {
            table: SpeedRangeTable::from_config(config),
            gear_ratio: config.gear_ratio(),
            phase: OscillatorPhase::new(),
            classifier,
            reported_unknown: HashSet::new(),
            reported_nyquist: false,
        }
    }

    /// Generate one sample at `speed` (km/h)
    ///
    /// Returns the zero triple without touching the phases at standstill or
    /// when no speed range matches.
    pub fn generate_sample(&mut self, speed: f64, sample_rate: f64) -> SampleTriple {
        let regime = self.classifier.as_mut().map(|c| c.observe(speed));

        if speed == 0.0 {
            return SampleTriple::ZERO;
        }

        let preferred = regime.map(RegimeLabel::mode_key);
        let Some((index, range, spec)) = self.table.resolve(speed, preferred) else {
            return SampleTriple::ZERO;
        };

        let modifiers = range.amplitude_chain(spec);
        for (position, _) in modifiers
            .iter()
            .enumerate()
            .filter(|(_, m)| matches!(m, AmplitudeModifier::Unknown))
        {
            if self.reported_unknown.insert((index, position)) {
                tracing::warn!(
                    range = index,
                    position,
                    "unknown amplitude modifier type; keeping running amplitude"
                );
            }
        }

        let drive = build_drive(
            range,
            spec.carrier,
            spec.wide_pulse.then(|| spec.modulation_index()),
            modifiers,
            speed,
            self.gear_ratio,
        );

        let nyquist = sample_rate / 2.0;
        if !self.reported_nyquist
            && (drive.carrier_frequency.abs() > nyquist || drive.command_frequency.abs() > nyquist)
        {
            self.reported_nyquist = true;
            tracing::warn!(
                carrier_hz = drive.carrier_frequency,
                command_hz = drive.command_frequency,
                sample_rate,
                "drive frequency above Nyquist; output will alias"
            );
        }

        pwm_step(&mut self.phase, &drive, sample_rate)
    }

    /// Fill `output` with sound samples at a constant `speed`
    pub fn produce_chunk_into(&mut self, speed: f64, sample_rate: f64, output: &mut [f32]) {
        for sample in output.iter_mut() {
            *sample = self.generate_sample(speed, sample_rate).sound_sample as f32;
        }
    }

    /// Generate `size` sound samples at a constant `speed`
    pub fn produce_chunk(&mut self, speed: f64, size: usize, sample_rate: f64) -> Vec<f32> {
        let mut samples = vec![0.0; size];
        self.produce_chunk_into(speed, sample_rate, &mut samples);
        samples
    }

    /// Parameters the engine would use at `speed` under `regime`, without side effects
    pub fn drive_at(&self, speed: f64, regime: Option<RegimeLabel>) -> Option<PwmDrive> {
        if speed == 0.0 {
            return None;
        }
        let (_, range, spec) = self.table.resolve(speed, regime.map(RegimeLabel::mode_key))?;
        Some(build_drive(
            range,
            spec.carrier,
            spec.wide_pulse.then(|| spec.modulation_index()),
            range.amplitude_chain(spec),
            speed,
            self.gear_ratio,
        ))
    }

    /// Current phase state
    pub fn phase(&self) -> OscillatorPhase {
        self.phase
    }

    /// Zero both phases (the display path does this every frame)
    pub fn reset_phase(&mut self) {
        self.phase.reset();
    }

    /// Latched regime label, if mode detection is active
    pub fn regime(&self) -> Option<RegimeLabel> {
        self.classifier.as_ref().map(ModeClassifier::label)
    }

    /// Speed range table in use
    pub fn table(&self) -> &SpeedRangeTable {
        &self.table
    }

    /// Command frequency divisor
    pub fn gear_ratio(&self) -> f64 {
        self.gear_ratio
    }
}

fn build_drive(
    range: &SpeedRange,
    carrier: CarrierKind,
    wide_pulse: Option<f64>,
    modifiers: &[AmplitudeModifier],
    speed: f64,
    gear_ratio: f64,
) -> PwmDrive {
    let command_frequency = speed / gear_ratio;
    let amplitude = apply_amplitude_modifiers(modifiers, speed, range);
    let (carrier_frequency, waveform) = resolve_carrier(carrier, speed, range, command_frequency);
    PwmDrive {
        carrier_frequency,
        waveform,
        command_frequency,
        amplitude,
        wide_pulse,
    }
}
