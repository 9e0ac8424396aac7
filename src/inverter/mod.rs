//! Inverter emulation core
//!
//! Speed range lookup, driving regime detection, the carrier/command phase
//! pair and the naturally-sampled PWM engine built on top of them.

pub mod engine;
pub mod phase;
pub mod regime;
pub mod table;

pub use engine::{
    apply_amplitude_modifiers, compare, pwm_step, resolve_carrier, CarrierWaveform,
    ModulationEngine, PwmDrive, SampleTriple,
};
pub use phase::OscillatorPhase;
pub use regime::{ModeClassifier, RegimeLabel};
pub use table::SpeedRangeTable;
