//! Background music fitting and mixing.
//!
//! All buffers are mono `f32` at [`SAMPLE_RATE`].

use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::debug;

use crate::error::{PodcastError, Result};

/// Sample rate of every buffer in the pipeline.
pub const SAMPLE_RATE: u32 = 24_000;

/// Loudest music gain accepted (+20 dB).
pub const MAX_MUSIC_GAIN: f32 = 10.0;

/// Convert a segment's music volume to a linear gain.
///
/// Values at or below zero are decibels; positive values are already gains.
/// The result is clamped to `[0, MAX_MUSIC_GAIN]`; a NaN volume is silent.
pub fn db_to_gain(volume: f32) -> f32 {
    let gain = if volume <= 0.0 {
        10f32.powf(volume / 20.0)
    } else {
        volume
    };
    if gain.is_nan() {
        0.0
    } else {
        gain.clamp(0.0, MAX_MUSIC_GAIN)
    }
}

/// Fit a music track to `target_length` samples and scale it by `volume`.
///
/// The track is tiled end to end and truncated. A missing or empty track
/// yields silence.
pub fn adjust_music(track: Option<&[f32]>, target_length: usize, volume: f32) -> Vec<f32> {
    match track {
        Some(track) if !track.is_empty() => track
            .iter()
            .cycle()
            .take(target_length)
            .map(|&s| to_f32(s as f64 * volume as f64))
            .collect(),
        _ => vec![0.0; target_length],
    }
}

/// Add two buffers sample by sample and peak-normalize the result.
///
/// The longer buffer is truncated to the shorter one. Summing happens in
/// f64 so two loud finite inputs cannot overflow.
pub fn mix(speech: &[f32], music: &[f32]) -> Vec<f32> {
    let mixed: Vec<f64> = speech
        .iter()
        .zip(music)
        .map(|(&a, &b)| a as f64 + b as f64)
        .collect();
    normalized(mixed)
}

/// Divide by the largest absolute sample when it exceeds 1.0.
///
/// Non-finite samples become silence.
pub fn peak_normalize(samples: &mut [f32]) {
    let wide = samples.iter().map(|&s| s as f64).collect();
    for (sample, value) in samples.iter_mut().zip(normalized(wide)) {
        *sample = value;
    }
}

fn normalized(mut samples: Vec<f64>) -> Vec<f32> {
    for sample in samples.iter_mut() {
        if !sample.is_finite() {
            *sample = 0.0;
        }
    }
    let peak = samples.iter().fold(0.0f64, |max, s| max.max(s.abs()));
    let scale = if peak > 1.0 { peak } else { 1.0 };
    samples.into_iter().map(|s| (s / scale) as f32).collect()
}

/// Narrow to f32 without overflowing to infinity.
fn to_f32(value: f64) -> f32 {
    value.clamp(f32::MIN as f64, f32::MAX as f64) as f32
}

/// Load a WAV file as mono samples at [`SAMPLE_RATE`].
pub fn load_music(path: &Path) -> Result<Vec<f32>> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    if interleaved.iter().any(|s| !s.is_finite()) {
        return Err(PodcastError::AudioIo(format!(
            "{} contains non-finite samples",
            path.display()
        )));
    }

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| to_f32(frame.iter().map(|&s| s as f64).sum::<f64>() / frame.len() as f64))
            .collect()
    };

    debug!(
        "Loaded {} ({} Hz, {} channel(s), {} frames)",
        path.display(),
        spec.sample_rate,
        spec.channels,
        mono.len()
    );

    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

/// Linear-interpolation resampler.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let last = samples.len() - 1;

    (0..new_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos as usize).min(last);
            let frac = (pos - idx as f64) as f32;
            let next = samples[(idx + 1).min(last)];
            samples[idx] * (1.0 - frac) + next * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-5, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_adjust_music_tiles_and_scales() {
        let music = adjust_music(Some(&[1.0, 2.0, 3.0]), 7, 0.5);
        assert_close(&music, &[0.5, 1.0, 1.5, 0.5, 1.0, 1.5, 0.5]);
        assert_eq!(adjust_music(Some(&[1.0, 2.0, 3.0]), 10, 1.0).len(), 10);
    }

    #[test]
    fn test_adjust_music_truncates() {
        let music = adjust_music(Some(&[1.0, 2.0, 3.0, 4.0]), 2, 1.0);
        assert_close(&music, &[1.0, 2.0]);
    }

    #[test]
    fn test_adjust_music_without_track_is_silent() {
        assert_eq!(adjust_music(None, 4, 0.5), vec![0.0; 4]);
        assert_eq!(adjust_music(Some(&[]), 3, 0.5), vec![0.0; 3]);
    }

    #[test]
    fn test_mix_normalizes_peak() {
        assert_close(&mix(&[0.9, 0.9], &[0.9, 0.9]), &[1.0, 1.0]);
        assert_close(&mix(&[0.9, -0.3], &[0.9, 0.0]), &[1.0, -0.3 / 1.8]);
    }

    #[test]
    fn test_mix_loud_inputs_stay_finite() {
        let mixed = mix(&[f32::MAX, 0.5], &[f32::MAX, 0.5]);
        assert!(mixed.iter().all(|s| s.is_finite()));
        assert_close(&mixed, &[1.0, 0.0]);
    }

    #[test]
    fn test_huge_gain_is_clamped() {
        let gain = db_to_gain(1e39f64 as f32);
        assert_eq!(gain, MAX_MUSIC_GAIN);
        assert_eq!(db_to_gain(f32::NAN), 0.0);

        let music = adjust_music(Some(&[0.0, 0.5]), 4, gain);
        let mixed = mix(&[0.5; 4], &music);
        assert!(mixed.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }

    #[test]
    fn test_peak_normalize_silences_non_finite() {
        let mut samples = vec![f32::NAN, 2.0, f32::INFINITY, -1.0];
        peak_normalize(&mut samples);
        assert_close(&samples, &[0.0, 1.0, 0.0, -0.5]);
    }

    #[test]
    fn test_mix_truncates_to_shorter() {
        let mixed = mix(&[0.1, -0.2, 0.4], &[0.1, 0.2]);
        assert_close(&mixed, &[0.2, 0.0]);
    }

    #[test]
    fn test_peak_normalize_leaves_quiet_buffers() {
        let mut quiet = vec![0.0, 0.4, -0.9];
        peak_normalize(&mut quiet);
        assert_eq!(quiet, vec![0.0, 0.4, -0.9]);
    }

    #[test]
    fn test_db_to_gain() {
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-6);
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert_eq!(db_to_gain(0.3), 0.3);
    }

    #[test]
    fn test_load_music_downmixes_and_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calm.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..480 {
            writer.write_sample(i16::MAX / 2).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let samples = load_music(&path).unwrap();
        assert_eq!(samples.len(), 240);
        assert!(samples.iter().all(|s| (s - 0.25).abs() < 1e-3));
    }

    #[test]
    fn test_load_music_rejects_non_finite_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [0.1f32, f32::NAN, 0.2] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let err = load_music(&path).unwrap_err();
        assert!(matches!(err, PodcastError::AudioIo(ref m) if m.contains("non-finite")));
    }

    #[test]
    fn test_load_music_missing_file() {
        assert!(load_music(Path::new("/nonexistent/track.wav")).is_err());
    }
}
