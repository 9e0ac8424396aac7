//! Inverter configuration
//!
//! The parsed form of an inverter configuration file: an ordered table of
//! speed ranges, each carrying the modulation descriptor the engine uses
//! while the vehicle speed sits inside it, plus vehicle metadata.
//!
//! Loading accepts the camelCase JSON produced by the configuration
//! collaborator, including its legacy spellings (`spwm` for `modulation`,
//! `pulseMode` for `pulseCount`).

mod demo;

use crate::constants::{
    DEFAULT_HISTORY_SAMPLE_INTERVAL, DEFAULT_HISTORY_SIZE, DEFAULT_MAX_ACCELERATION,
    DEFAULT_MAX_SPEED, DEFAULT_MODE_CHECK_INTERVAL,
};
use crate::{Result, VvvfError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Complete inverter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterConfig {
    /// Display name of the trainset/inverter
    #[serde(default)]
    pub name: Option<String>,
    /// Inverter manufacturer
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Free-form date of the recording or build
    #[serde(default)]
    pub date: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Maximum acceleration in km/h/s (strings are accepted, as the original files use them)
    #[serde(
        rename = "maxAcceleration_kmh_s",
        default,
        deserialize_with = "number_or_string"
    )]
    pub max_acceleration: Option<f64>,
    /// Maximum vehicle speed in km/h
    #[serde(rename = "maxSpeed_kmh", default, deserialize_with = "number_or_string")]
    pub max_speed: Option<f64>,
    /// Ordered speed range table (first match wins)
    pub speed_ranges: Vec<SpeedRange>,
    /// Ratio between vehicle speed and command frequency (1 when absent)
    #[serde(default)]
    pub motor_gear_ratio: Option<f64>,
    /// Speed-history mode detection settings
    #[serde(default)]
    pub mode_detection: Option<ModeDetection>,
}

/// One row of the speed range table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedRange {
    /// Inclusive lower bound
    pub min_speed: f64,
    /// Exclusive upper bound
    pub max_speed: f64,
    /// Flat modulation descriptor
    #[serde(default, alias = "spwm", skip_serializing_if = "Option::is_none")]
    pub modulation: Option<ModulationSpec>,
    /// Amplitude chain shared by every modulation of this range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude_modifiers: Option<Vec<AmplitudeModifier>>,
    /// Mode-specific descriptors, selected by the detected driving regime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_mode: Option<BTreeMap<ModeKey, ModulationSpec>>,
}

/// Modulation descriptor: carrier kind plus shaping flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulationSpec {
    /// How the carrier frequency is derived
    #[serde(flatten)]
    pub carrier: CarrierKind,
    /// Scale the command by `modulation_index` to widen pulses
    #[serde(default)]
    pub wide_pulse: bool,
    /// Command scale factor used by wide pulse mode (1 when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulation_index: Option<f64>,
    /// Amplitude chain owned by this descriptor; takes precedence over the range chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude_modifiers: Option<Vec<AmplitudeModifier>>,
}

/// Carrier frequency model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CarrierKind {
    /// Constant carrier frequency (asynchronous PWM)
    #[serde(rename_all = "camelCase")]
    Fixed {
        /// Carrier frequency in Hz
        carrier_frequency: f64,
    },
    /// Carrier frequency interpolated across the owning speed range
    #[serde(rename_all = "camelCase")]
    Ramp {
        /// Frequency at the range's lower bound
        min_carrier_frequency: f64,
        /// Frequency approached at the range's upper bound
        max_carrier_frequency: f64,
    },
    /// Carrier locked to a multiple of the command frequency
    #[serde(rename_all = "camelCase")]
    Sync {
        /// Carrier periods per command period
        #[serde(alias = "pulseMode")]
        pulse_count: u32,
    },
}

/// Amplitude shaping step
///
/// Modifiers are applied in order and each one overwrites the running
/// amplitude, so the last recognised modifier decides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AmplitudeModifier {
    /// Literal amplitude value
    Constant {
        /// Amplitude to use
        value: f64,
    },
    /// Amplitude interpolated across the owning speed range
    #[serde(rename_all = "camelCase")]
    Ramp {
        /// Amplitude at the lower bound
        start_value: f64,
        /// Amplitude approached at the upper bound
        end_value: f64,
    },
    /// Any unrecognised `type` tag; skipped with a warning
    #[serde(other)]
    Unknown,
}

/// Keys of a range's `perMode` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModeKey {
    /// Used while accelerating
    Acceleration,
    /// Used while braking
    Brake,
    /// Used while coasting
    Neutral,
    /// Generic entry shared by all regimes
    AccelerationBrakeNeutral,
}

impl ModeKey {
    /// Fallback order tried after the regime's own entry
    pub const FALLBACK_ORDER: [ModeKey; 4] = [
        ModeKey::AccelerationBrakeNeutral,
        ModeKey::Acceleration,
        ModeKey::Brake,
        ModeKey::Neutral,
    ];
}

/// Speed history settings for the mode classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModeDetection {
    /// Number of retained speed samples
    pub history_size: usize,
    /// Keep one speed sample every N engine calls
    pub sample_interval: u32,
    /// Re-classify every N engine calls
    pub mode_check_interval: u32,
}

impl Default for ModeDetection {
    fn default() -> Self {
        ModeDetection {
            history_size: DEFAULT_HISTORY_SIZE,
            sample_interval: DEFAULT_HISTORY_SAMPLE_INTERVAL,
            mode_check_interval: DEFAULT_MODE_CHECK_INTERVAL,
        }
    }
}

impl SpeedRange {
    /// Whether `speed` falls inside `[min_speed, max_speed)`
    #[inline]
    pub fn contains(&self, speed: f64) -> bool {
        speed >= self.min_speed && speed < self.max_speed
    }

    /// Relative position of `speed` inside the range (0 at the lower bound)
    #[inline]
    pub fn position(&self, speed: f64) -> f64 {
        (speed - self.min_speed) / (self.max_speed - self.min_speed)
    }

    /// Whether this range selects its descriptor by driving regime
    pub fn is_mode_dependent(&self) -> bool {
        self.per_mode.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Pick the active descriptor
    ///
    /// With a `perMode` table the preferred key is tried first, then
    /// [`ModeKey::FALLBACK_ORDER`], then the flat `modulation`.
    pub fn modulation_for(&self, preferred: Option<ModeKey>) -> Option<&ModulationSpec> {
        if let Some(per_mode) = &self.per_mode {
            let found = preferred
                .into_iter()
                .chain(ModeKey::FALLBACK_ORDER)
                .find_map(|key| per_mode.get(&key));
            if found.is_some() {
                return found;
            }
        }
        self.modulation.as_ref()
    }

    /// Amplitude chain applying to `spec` (its own chain, else the range's)
    pub fn amplitude_chain<'a>(&'a self, spec: &'a ModulationSpec) -> &'a [AmplitudeModifier] {
        spec.amplitude_modifiers
            .as_deref()
            .or(self.amplitude_modifiers.as_deref())
            .unwrap_or(&[])
    }

    fn validate(&self, index: usize) -> Result<()> {
        if !self.min_speed.is_finite() || !self.max_speed.is_finite() {
            return Err(VvvfError::ConfigError(format!(
                "speed range #{index} has non-finite bounds"
            )));
        }
        if self.min_speed >= self.max_speed {
            return Err(VvvfError::ConfigError(format!(
                "speed range #{index}: minSpeed {} must be below maxSpeed {}",
                self.min_speed, self.max_speed
            )));
        }
        if self.modulation.is_none() && !self.is_mode_dependent() {
            return Err(VvvfError::ConfigError(format!(
                "speed range #{index} has neither a modulation nor a perMode table"
            )));
        }
        let specs = self
            .modulation
            .iter()
            .chain(self.per_mode.iter().flat_map(|m| m.values()));
        for spec in specs {
            spec.validate(index)?;
        }
        Ok(())
    }
}

impl ModulationSpec {
    /// Descriptor with the given carrier and no shaping flags
    pub fn new(carrier: CarrierKind) -> Self {
        ModulationSpec {
            carrier,
            wide_pulse: false,
            modulation_index: None,
            amplitude_modifiers: None,
        }
    }

    /// Command scale used in wide pulse mode
    pub fn modulation_index(&self) -> f64 {
        self.modulation_index.unwrap_or(1.0)
    }

    fn validate(&self, index: usize) -> Result<()> {
        let bad = |what: &str| -> Result<()> {
            Err(VvvfError::ConfigError(format!(
                "speed range #{index}: {what}"
            )))
        };
        match self.carrier {
            CarrierKind::Fixed { carrier_frequency } => {
                if !(carrier_frequency.is_finite() && carrier_frequency > 0.0) {
                    return bad("carrierFrequency must be positive");
                }
            }
            CarrierKind::Ramp {
                min_carrier_frequency,
                max_carrier_frequency,
            } => {
                let ok = |f: f64| f.is_finite() && f > 0.0;
                if !ok(min_carrier_frequency) || !ok(max_carrier_frequency) {
                    return bad("ramp carrier frequencies must be positive");
                }
            }
            CarrierKind::Sync { pulse_count } => {
                if pulse_count == 0 {
                    return bad("pulseCount must be at least 1");
                }
            }
        }
        if let Some(index_value) = self.modulation_index {
            if !index_value.is_finite() {
                return bad("modulationIndex must be finite");
            }
        }
        Ok(())
    }
}

impl InverterConfig {
    /// Configuration with the given range table and no metadata
    pub fn from_ranges(speed_ranges: Vec<SpeedRange>) -> Self {
        InverterConfig {
            name: None,
            manufacturer: None,
            date: None,
            description: None,
            max_acceleration: None,
            max_speed: None,
            speed_ranges,
            motor_gear_ratio: None,
            mode_detection: None,
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: InverterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            VvvfError::ConfigError(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Command frequency divisor
    pub fn gear_ratio(&self) -> f64 {
        self.motor_gear_ratio.unwrap_or(1.0)
    }

    /// Maximum acceleration in km/h/s
    pub fn max_acceleration(&self) -> f64 {
        self.max_acceleration.unwrap_or(DEFAULT_MAX_ACCELERATION)
    }

    /// Maximum vehicle speed in km/h
    pub fn max_speed(&self) -> f64 {
        self.max_speed.unwrap_or(DEFAULT_MAX_SPEED)
    }

    /// Whether any range selects its descriptor by driving regime
    pub fn uses_mode_detection(&self) -> bool {
        self.mode_detection.is_some() || self.speed_ranges.iter().any(SpeedRange::is_mode_dependent)
    }

    /// Check the table for values the engine cannot run with
    ///
    /// Overlapping ranges are accepted (the earlier range shadows the later
    /// one) and only reported.
    pub fn validate(&self) -> Result<()> {
        if self.speed_ranges.is_empty() {
            return Err(VvvfError::ConfigError("speedRanges is empty".into()));
        }
        let ratio = self.gear_ratio();
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(VvvfError::ConfigError(format!(
                "motorGearRatio must be positive, got {ratio}"
            )));
        }
        if let Some(detection) = &self.mode_detection {
            if detection.history_size == 0
                || detection.sample_interval == 0
                || detection.mode_check_interval == 0
            {
                return Err(VvvfError::ConfigError(
                    "modeDetection values must be non-zero".into(),
                ));
            }
        }
        for (index, range) in self.speed_ranges.iter().enumerate() {
            range.validate(index)?;
        }
        for (a, b) in self.overlapping_ranges() {
            tracing::warn!(
                first = a,
                second = b,
                "speed ranges overlap; range #{a} shadows range #{b}"
            );
        }
        Ok(())
    }

    /// Index pairs of ranges whose intervals intersect
    pub fn overlapping_ranges(&self) -> Vec<(usize, usize)> {
        let ranges = &self.speed_ranges;
        let mut pairs = Vec::new();
        for i in 0..ranges.len() {
            for j in (i + 1)..ranges.len() {
                if ranges[i].min_speed < ranges[j].max_speed
                    && ranges[j].min_speed < ranges[i].max_speed
                {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(carrier_frequency: f64) -> ModulationSpec {
        ModulationSpec::new(CarrierKind::Fixed { carrier_frequency })
    }

    #[test]
    fn test_parse_legacy_keys() {
        let json = r#"{
            "name": "Legacy",
            "maxAcceleration_kmh_s": "2.5",
            "maxSpeed_kmh": 320,
            "speedRanges": [
                { "minSpeed": 0, "maxSpeed": 10, "spwm": { "type": "fixed", "carrierFrequency": 400 } },
                { "minSpeed": 10, "maxSpeed": 50, "spwm": { "type": "sync", "pulseMode": 9,
                  "amplitudeModifiers": [ { "type": "ramp", "startValue": 0.5, "endValue": 1.0 } ] } }
            ]
        }"#;
        let config = InverterConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_acceleration(), 2.5);
        assert_eq!(config.max_speed(), 320.0);
        assert_eq!(config.gear_ratio(), 1.0);
        assert_eq!(
            config.speed_ranges[1].modulation.as_ref().unwrap().carrier,
            CarrierKind::Sync { pulse_count: 9 }
        );
        let spec = config.speed_ranges[1].modulation.as_ref().unwrap();
        assert_eq!(
            config.speed_ranges[1].amplitude_chain(spec),
            &[AmplitudeModifier::Ramp {
                start_value: 0.5,
                end_value: 1.0
            }]
        );
    }

    #[test]
    fn test_parse_modern_keys_and_flags() {
        let json = r#"{
            "motorGearRatio": 2.0,
            "speedRanges": [
                { "minSpeed": 0, "maxSpeed": 100,
                  "modulation": { "type": "ramp", "minCarrierFrequency": 500, "maxCarrierFrequency": 1500,
                                  "widePulse": true, "modulationIndex": 1.3 },
                  "amplitudeModifiers": [ { "type": "constant", "value": 0.8 } ] }
            ]
        }"#;
        let config = InverterConfig::from_json_str(json).unwrap();
        let range = &config.speed_ranges[0];
        let spec = range.modulation.as_ref().unwrap();
        assert!(spec.wide_pulse);
        assert_eq!(spec.modulation_index(), 1.3);
        assert_eq!(config.gear_ratio(), 2.0);
        assert_eq!(
            range.amplitude_chain(spec),
            &[AmplitudeModifier::Constant { value: 0.8 }]
        );
    }

    #[test]
    fn test_unknown_modifier_kind_is_parsed() {
        let json = r#"{ "type": "sinusoidal", "depth": 3 }"#;
        let modifier: AmplitudeModifier = serde_json::from_str(json).unwrap();
        assert_eq!(modifier, AmplitudeModifier::Unknown);
    }

    #[test]
    fn test_per_mode_fallback_order() {
        let mut per_mode = BTreeMap::new();
        per_mode.insert(ModeKey::Brake, fixed(300.0));
        per_mode.insert(ModeKey::Neutral, fixed(200.0));
        let range = SpeedRange {
            min_speed: 0.0,
            max_speed: 10.0,
            modulation: Some(fixed(100.0)),
            amplitude_modifiers: None,
            per_mode: Some(per_mode),
        };

        let pick = |key| match range.modulation_for(key).unwrap().carrier {
            CarrierKind::Fixed { carrier_frequency } => carrier_frequency,
            _ => unreachable!(),
        };
        assert_eq!(pick(Some(ModeKey::Neutral)), 200.0);
        // No Acceleration entry: generic, then Acceleration, then Brake
        assert_eq!(pick(Some(ModeKey::Acceleration)), 300.0);
        assert_eq!(pick(None), 300.0);
    }

    #[test]
    fn test_per_mode_empty_falls_back_to_flat() {
        let range = SpeedRange {
            min_speed: 0.0,
            max_speed: 10.0,
            modulation: Some(fixed(100.0)),
            amplitude_modifiers: None,
            per_mode: Some(BTreeMap::new()),
        };
        assert_eq!(range.modulation_for(Some(ModeKey::Brake)), Some(&fixed(100.0)));
        assert!(!range.is_mode_dependent());
    }

    #[test]
    fn test_validation_rejects_inverted_range() {
        let config = InverterConfig::from_ranges(vec![SpeedRange {
            min_speed: 10.0,
            max_speed: 5.0,
            modulation: Some(fixed(100.0)),
            amplitude_modifiers: None,
            per_mode: None,
        }]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must be below"), "{err}");
    }

    #[test]
    fn test_validation_rejects_missing_modulation() {
        let json = r#"{ "speedRanges": [ { "minSpeed": 0, "maxSpeed": 10 } ] }"#;
        assert!(matches!(
            InverterConfig::from_json_str(json),
            Err(VvvfError::ConfigError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_gear_ratio() {
        let mut config = InverterConfig::demo();
        config.motor_gear_ratio = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            InverterConfig::from_json_str("{ \"speedRanges\": [ "),
            Err(VvvfError::Json(_))
        ));
    }

    #[test]
    fn test_overlaps_are_reported_not_rejected() {
        let range = |min, max| SpeedRange {
            min_speed: min,
            max_speed: max,
            modulation: Some(fixed(100.0)),
            amplitude_modifiers: None,
            per_mode: None,
        };
        let config = InverterConfig::from_ranges(vec![
            range(0.0, 20.0),
            range(10.0, 30.0),
            range(30.0, 40.0),
        ]);
        assert!(config.validate().is_ok());
        assert_eq!(config.overlapping_ranges(), vec![(0, 1)]);
    }

    #[test]
    fn test_bundled_demo_file_matches_builtin() {
        let from_file: InverterConfig =
            serde_json::from_str(include_str!("../../configs/demo.json")).unwrap();
        assert_eq!(from_file, InverterConfig::demo());
        assert!(from_file.validate().is_ok());
    }
}
