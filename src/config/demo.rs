//! Built-in demonstration configuration (mirrors `configs/demo.json`)

use super::{AmplitudeModifier, CarrierKind, InverterConfig, ModulationSpec, SpeedRange};

fn range(
    min_speed: f64,
    max_speed: f64,
    carrier: CarrierKind,
    amplitude: AmplitudeModifier,
) -> SpeedRange {
    SpeedRange {
        min_speed,
        max_speed,
        modulation: Some(ModulationSpec::new(carrier)),
        amplitude_modifiers: Some(vec![amplitude]),
        per_mode: None,
    }
}

impl InverterConfig {
    /// Asynchronous start, ramped mid range, synchronous top end
    pub fn demo() -> Self {
        let ramp = |start_value, end_value| AmplitudeModifier::Ramp {
            start_value,
            end_value,
        };
        let mut wide = ModulationSpec::new(CarrierKind::Sync { pulse_count: 3 });
        wide.wide_pulse = true;
        wide.modulation_index = Some(1.25);

        let mut speed_ranges = vec![
            range(
                0.0,
                10.0,
                CarrierKind::Fixed {
                    carrier_frequency: 400.0,
                },
                ramp(0.2, 0.4),
            ),
            range(
                10.0,
                25.0,
                CarrierKind::Fixed {
                    carrier_frequency: 800.0,
                },
                ramp(0.4, 0.6),
            ),
            range(
                25.0,
                75.0,
                CarrierKind::Ramp {
                    min_carrier_frequency: 450.0,
                    max_carrier_frequency: 1200.0,
                },
                ramp(0.6, 0.9),
            ),
            range(
                75.0,
                125.0,
                CarrierKind::Sync { pulse_count: 9 },
                ramp(0.9, 1.0),
            ),
        ];
        speed_ranges.push(SpeedRange {
            min_speed: 125.0,
            max_speed: 201.0,
            modulation: Some(wide),
            amplitude_modifiers: Some(vec![AmplitudeModifier::Constant { value: 1.0 }]),
            per_mode: None,
        });

        InverterConfig {
            name: Some("Demo VVVF".into()),
            manufacturer: Some("Generic".into()),
            date: Some("2024".into()),
            description: Some(
                "Asynchronous start, ramped carrier, 9-pulse then wide 3-pulse synchronous".into(),
            ),
            max_acceleration: Some(3.0),
            max_speed: Some(200.0),
            speed_ranges,
            motor_gear_ratio: Some(1.0),
            mode_detection: None,
        }
    }
}
