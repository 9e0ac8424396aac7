//! Speed range table
//!
//! Ordered lookup from vehicle speed to the configured modulation
//! descriptor. The first range containing the speed wins; a speed outside
//! every range is a defined silence condition, not an error.

use crate::config::{InverterConfig, ModeKey, ModulationSpec, SpeedRange};

/// Ordered, first-match speed range table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedRangeTable {
    ranges: Vec<SpeedRange>,
}

impl SpeedRangeTable {
    /// Create a table from ranges in priority order
    pub fn new(ranges: Vec<SpeedRange>) -> Self {
        SpeedRangeTable { ranges }
    }

    /// Copy the range table out of a configuration
    pub fn from_config(config: &InverterConfig) -> Self {
        Self::new(config.speed_ranges.clone())
    }

    /// First range with `min_speed <= speed < max_speed`
    pub fn lookup(&self, speed: f64) -> Option<&SpeedRange> {
        self.lookup_index(speed).map(|i| &self.ranges[i])
    }

    /// Index of the range [`lookup`](Self::lookup) would return
    pub fn lookup_index(&self, speed: f64) -> Option<usize> {
        self.ranges.iter().position(|range| range.contains(speed))
    }

    /// Matching range together with its active modulation descriptor
    ///
    /// Returns `None` when no range matches, or when the matching range has
    /// no descriptor for the requested mode and no flat fallback.
    pub fn resolve(
        &self,
        speed: f64,
        preferred: Option<ModeKey>,
    ) -> Option<(usize, &SpeedRange, &ModulationSpec)> {
        let index = self.lookup_index(speed)?;
        let range = &self.ranges[index];
        let spec = range.modulation_for(preferred)?;
        Some((index, range, spec))
    }

    /// Lowest `min_speed` and highest `max_speed` across the table
    pub fn speed_domain(&self) -> Option<(f64, f64)> {
        let first = self.ranges.first()?;
        Some(self.ranges.iter().fold(
            (first.min_speed, first.max_speed),
            |(lo, hi), r| (lo.min(r.min_speed), hi.max(r.max_speed)),
        ))
    }

    /// Ranges in priority order
    pub fn ranges(&self) -> &[SpeedRange] {
        &self.ranges
    }

    /// Number of ranges
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the table has no ranges
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CarrierKind;

    fn fixed_range(min_speed: f64, max_speed: f64, carrier_frequency: f64) -> SpeedRange {
        SpeedRange {
            min_speed,
            max_speed,
            modulation: Some(ModulationSpec::new(CarrierKind::Fixed { carrier_frequency })),
            amplitude_modifiers: None,
            per_mode: None,
        }
    }

    #[test]
    fn test_lookup_bounds() {
        let table = SpeedRangeTable::new(vec![
            fixed_range(0.0, 10.0, 400.0),
            fixed_range(10.0, 25.0, 800.0),
        ]);
        assert_eq!(table.lookup_index(0.0), Some(0));
        assert_eq!(table.lookup_index(9.999), Some(0));
        // Upper bound is exclusive
        assert_eq!(table.lookup_index(10.0), Some(1));
        assert_eq!(table.lookup_index(25.0), None);
        assert_eq!(table.lookup_index(-0.1), None);
        assert_eq!(table.lookup_index(f64::NAN), None);
    }

    #[test]
    fn test_lookup_first_match_wins_on_overlap() {
        let table = SpeedRangeTable::new(vec![
            fixed_range(0.0, 20.0, 400.0),
            fixed_range(10.0, 30.0, 800.0),
        ]);
        for speed in [10.0, 12.5, 19.99] {
            assert_eq!(table.lookup_index(speed), Some(0), "speed {speed}");
        }
        assert_eq!(table.lookup_index(20.0), Some(1));
    }

    #[test]
    fn test_speed_domain() {
        let table =
            SpeedRangeTable::new(vec![fixed_range(5.0, 10.0, 1.0), fixed_range(-1.0, 3.0, 1.0)]);
        assert_eq!(table.speed_domain(), Some((-1.0, 10.0)));
        assert_eq!(SpeedRangeTable::default().speed_domain(), None);
    }

    #[test]
    fn test_resolve_returns_spec() {
        let table = SpeedRangeTable::from_config(&InverterConfig::demo());
        let (index, range, spec) = table.resolve(100.0, None).unwrap();
        assert_eq!(index, 3);
        assert!(range.contains(100.0));
        assert_eq!(spec.carrier, CarrierKind::Sync { pulse_count: 9 });
    }
}
