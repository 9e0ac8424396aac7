//! WAV file export functionality

use super::{apply_fade_out, normalize_samples, ExportConfig};
use crate::config::InverterConfig;
use crate::inverter::ModulationEngine;
use crate::streaming::{
    BufferScheduler, ChunkSource, InlineChunkSource, MixingTimeline, SchedulerConfig,
    WorkerChunkSource,
};
use crate::train::{DriveSchedule, Notch, TrainDynamics};
use crate::{Result, VvvfError};
use std::path::Path;
use std::time::Duration;

/// How long an offline render waits on the generator thread per chunk
const WORKER_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of an offline render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSummary {
    /// Frames per channel in the output
    pub frames: usize,
    /// Output duration in seconds
    pub duration_seconds: f64,
    /// Chunks committed to the timeline
    pub chunks: u64,
    /// Chunks lost to a full queue
    pub dropped: u64,
    /// Steady-state underruns seen by the scheduler
    pub underruns: u64,
    /// Peak magnitude of the final samples
    pub peak: f32,
    /// Highest speed reached during the drive (km/h)
    pub top_speed: f64,
}

/// Render `schedule` to mono samples
///
/// The drive is simulated chunk by chunk: the train dynamics advance by one
/// chunk step, a chunk is generated at the resulting speed, and the
/// scheduler commits it onto a timeline that is rendered one scheduler tick
/// at a time.
pub fn render_drive(
    config: &InverterConfig,
    schedule: &DriveSchedule,
    export: &ExportConfig,
) -> Result<(Vec<f32>, RenderSummary)> {
    if export.sample_rate == 0 || export.chunk_size == 0 {
        return Err(VvvfError::Other(
            "sample rate and chunk size must be non-zero".into(),
        ));
    }
    let rate = f64::from(export.sample_rate);
    let scheduler_config = SchedulerConfig::default();
    let chunk_step = export.chunk_size as f64 / rate - scheduler_config.fade_overlap;
    if chunk_step <= 0.0 {
        return Err(VvvfError::Other(format!(
            "chunk of {} samples is shorter than the crossfade",
            export.chunk_size
        )));
    }

    let engine = ModulationEngine::new(config);
    let mut source: Box<dyn ChunkSource> = if export.use_worker {
        Box::new(WorkerChunkSource::spawn(engine, export.sample_rate)?)
    } else {
        Box::new(InlineChunkSource::new(engine, export.sample_rate))
    };

    let timeline = MixingTimeline::new(export.sample_rate);
    let mut scheduler = BufferScheduler::new(timeline.clone(), scheduler_config);
    let mut dynamics = TrainDynamics::from_config(config);

    let total = schedule.total_duration();
    let total_frames = (total * rate).round() as usize;
    let tick_frames =
        ((scheduler_config.tick_interval.as_secs_f64() * rate).round() as usize).max(1);
    let prime_depth = scheduler_config.max_queue_size.max(scheduler_config.min_start_depth);

    tracing::info!(
        seconds = total,
        steps = schedule.steps().len(),
        worker = export.use_worker,
        "rendering drive"
    );

    let mut output = Vec::with_capacity(total_frames + tick_frames);
    let mut block = vec![0.0f32; tick_frames];
    let mut generated = 0.0;
    let mut requested = 0usize;
    let mut top_speed = 0.0f64;

    let generating = |generated: f64, requested: usize| {
        generated < total || requested < scheduler_config.min_start_depth
    };

    scheduler.start();
    loop {
        while generating(generated, requested)
            && scheduler.queue_depth() + source.pending() < prime_depth
        {
            dynamics.set_notch(schedule.notch_at(generated).unwrap_or(Notch::Neutral));
            let speed = dynamics.update(chunk_step);
            top_speed = top_speed.max(speed);
            source.request(speed, export.chunk_size);
            generated += chunk_step;
            requested += 1;
        }
        while source.pending() > 0 {
            let chunk = source
                .wait(WORKER_TIMEOUT)
                .ok_or_else(|| VvvfError::Other("chunk generator stopped responding".into()))?;
            scheduler.submit(chunk);
        }

        scheduler.tick();
        timeline.render(&mut block);
        output.extend_from_slice(&block);

        let drained = scheduler.queue_depth() == 0 && timeline.active_voices() == 0;
        if !generating(generated, requested) && drained {
            break;
        }
    }
    scheduler.stop();
    output.truncate(total_frames);

    if export.normalize {
        normalize_samples(&mut output);
    }
    if export.fade_out_duration > 0.0 {
        apply_fade_out(&mut output, export.fade_out_duration, export.sample_rate);
    }

    let stats = scheduler.stats();
    let summary = RenderSummary {
        frames: output.len(),
        duration_seconds: output.len() as f64 / rate,
        chunks: stats.committed,
        dropped: stats.dropped,
        underruns: stats.underruns,
        peak: output.iter().fold(0.0f32, |peak, s| peak.max(s.abs())),
        top_speed,
    };
    Ok((output, summary))
}

/// Render `schedule` and write it to a 16-bit PCM WAV file
///
/// # Examples
///
/// ```no_run
/// use vvvf::export::{render_drive_to_wav, ExportConfig};
/// use vvvf::{DriveSchedule, InverterConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = InverterConfig::from_file("configs/demo.json")?;
/// let schedule: DriveSchedule = "P3:30,N:5,B4:20".parse()?;
/// render_drive_to_wav(&config, &schedule, "drive.wav", ExportConfig::stereo().normalize(true))?;
/// # Ok(())
/// # }
/// ```
pub fn render_drive_to_wav<P: AsRef<Path>>(
    config: &InverterConfig,
    schedule: &DriveSchedule,
    output_path: P,
    export: ExportConfig,
) -> Result<RenderSummary> {
    let (samples, summary) = render_drive(config, schedule, &export)?;

    let final_samples = if export.channels == 2 {
        mono_to_stereo(&samples)
    } else {
        samples
    };

    tracing::info!(
        path = %output_path.as_ref().display(),
        frames = summary.frames,
        channels = export.channels,
        "writing WAV file"
    );
    write_wav_file(
        output_path.as_ref(),
        &final_samples,
        export.sample_rate,
        export.channels,
    )?;

    Ok(summary)
}

/// Convert mono samples to stereo (duplicate each sample)
fn mono_to_stereo(mono: &[f32]) -> Vec<f32> {
    let mut stereo = Vec::with_capacity(mono.len() * 2);
    for &sample in mono {
        stereo.push(sample);
        stereo.push(sample);
    }
    stereo
}

/// Write samples to WAV file
fn write_wav_file(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) -> Result<()> {
    if !(1..=2).contains(&channels) {
        return Err(VvvfError::AudioFileError(format!(
            "unsupported channel count {channels}"
        )));
    }
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| VvvfError::AudioFileError(format!("Failed to create WAV file: {}", e)))?;

    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| VvvfError::AudioFileError(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| VvvfError::AudioFileError(format!("Failed to finalize WAV file: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_to_stereo() {
        let mono = vec![0.1, 0.2, 0.3];
        let stereo = mono_to_stereo(&mono);

        assert_eq!(stereo.len(), 6);
        assert_eq!(stereo, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_render_length_and_bounds() {
        let schedule: DriveSchedule = "P3:2,N:0.5,B5:1".parse().unwrap();
        let (samples, summary) =
            render_drive(&InverterConfig::demo(), &schedule, &ExportConfig::default()).unwrap();
        assert_eq!(samples.len(), 3 * 44_100 + 22_050);
        assert_eq!(summary.frames, samples.len());
        assert_eq!(summary.dropped, 0);
        assert!(summary.peak <= 1.0 + 1e-6);
        assert!(summary.peak > 0.0);
        // P3 on a 3 km/h/s notch step for 2 s, quantised to chunk steps
        assert!((summary.top_speed - 18.0).abs() < 1.0, "{}", summary.top_speed);
    }

    #[test]
    fn test_worker_render_matches_inline() {
        let schedule: DriveSchedule = "P2:1,B2:0.5".parse().unwrap();
        let config = InverterConfig::demo();
        let (inline, _) = render_drive(&config, &schedule, &ExportConfig::default()).unwrap();
        let (worker, _) =
            render_drive(&config, &schedule, &ExportConfig::default().worker(true)).unwrap();
        assert_eq!(inline, worker);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let export = ExportConfig {
            chunk_size: 0,
            ..ExportConfig::default()
        };
        let schedule: DriveSchedule = "P1:1".parse().unwrap();
        assert!(render_drive(&InverterConfig::demo(), &schedule, &export).is_err());
    }

    #[test]
    fn test_write_wav_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.wav");
        let schedule: DriveSchedule = "P3:0.5".parse().unwrap();
        let summary = render_drive_to_wav(
            &InverterConfig::demo(),
            &schedule,
            &path,
            ExportConfig::stereo().normalize(true),
        )
        .unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len() as usize, summary.frames * 2);
        assert!((summary.peak - 0.95).abs() < 1e-4);
    }
}
