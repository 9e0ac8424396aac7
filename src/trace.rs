//! Waveform trace capture for displays
//!
//! A display shows a static snapshot of the three signals at the current
//! speed. [`TraceCapture`] keeps its own engine for that purpose and zeroes
//! its phases after every frame, so the snapshot is stable and the audio
//! engine's phase is never touched.

use crate::config::InverterConfig;
use crate::inverter::ModulationEngine;
use crate::Result;
use serde::Serialize;
use std::io;
use std::path::Path;

/// One frame of the three engine signals
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trace {
    /// Speed the frame was rendered at (km/h)
    pub speed: f64,
    /// Sample rate used for the phase increments
    pub sample_rate: f64,
    /// Comparator output
    pub sound: Vec<f64>,
    /// Command reference
    pub command: Vec<f64>,
    /// Carrier reference
    pub carrier: Vec<f64>,
}

#[derive(Serialize)]
struct TraceRow {
    index: usize,
    time_s: f64,
    sound: f64,
    command: f64,
    carrier: f64,
}

impl Trace {
    /// Samples per signal
    pub fn len(&self) -> usize {
        self.sound.len()
    }

    /// Whether the trace holds no samples
    pub fn is_empty(&self) -> bool {
        self.sound.is_empty()
    }

    /// Write `index,time_s,sound,command,carrier` rows to a CSV file
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = csv::Writer::from_path(path)?;
        self.write_rows(writer)
    }

    /// Same as [`write_csv`](Self::write_csv) into any writer
    pub fn write_csv_to<W: io::Write>(&self, writer: W) -> Result<()> {
        self.write_rows(csv::Writer::from_writer(writer))
    }

    fn write_rows<W: io::Write>(&self, mut writer: csv::Writer<W>) -> Result<()> {
        let step = if self.sample_rate > 0.0 {
            1.0 / self.sample_rate
        } else {
            0.0
        };
        for index in 0..self.len() {
            writer.serialize(TraceRow {
                index,
                time_s: index as f64 * step,
                sound: self.sound[index],
                command: self.command[index],
                carrier: self.carrier[index],
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Display-side capture with a private engine
#[derive(Debug, Clone)]
pub struct TraceCapture {
    engine: ModulationEngine,
    width: usize,
    sample_rate: f64,
}

impl TraceCapture {
    /// Capture `width` samples per frame at `sample_rate`
    pub fn new(config: &InverterConfig, width: usize, sample_rate: f64) -> Self {
        TraceCapture {
            engine: ModulationEngine::new(config),
            width,
            sample_rate,
        }
    }

    /// Render one frame at `speed`, then reset the phases for the next one
    pub fn capture(&mut self, speed: f64) -> Trace {
        let mut trace = Trace {
            speed,
            sample_rate: self.sample_rate,
            sound: Vec::with_capacity(self.width),
            command: Vec::with_capacity(self.width),
            carrier: Vec::with_capacity(self.width),
        };
        for _ in 0..self.width {
            let triple = self.engine.generate_sample(speed, self.sample_rate);
            trace.sound.push(triple.sound_sample);
            trace.command.push(triple.command_sample);
            trace.carrier.push(triple.carrier_sample);
        }
        self.engine.reset_phase();
        trace
    }

    /// Samples per frame
    pub fn width(&self) -> usize {
        self.width
    }

    /// Change the frame width
    pub fn set_width(&mut self, width: usize) {
        self.width = width;
    }
}
