//! Speech synthesis for podcast segments.

use kokoro_tiny::TtsEngine;
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::error::{PodcastError, Result};
use crate::mixer::SAMPLE_RATE;

/// English accent used for synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    American,
    British,
}

impl Locale {
    /// Parse `American` or `British` (case-insensitive).
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "american" => Ok(Locale::American),
            "british" => Ok(Locale::British),
            _ => Err(PodcastError::InvalidInput(format!(
                "Accent must be either 'American' or 'British', got '{}'",
                name
            ))),
        }
    }

    /// Kokoro language code.
    pub fn lang_code(&self) -> char {
        match self {
            Locale::American => 'a',
            Locale::British => 'b',
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::American => write!(f, "American"),
            Locale::British => write!(f, "British"),
        }
    }
}

/// A text-to-speech backend producing mono samples at [`SAMPLE_RATE`].
pub trait SpeechSynthesizer {
    fn synthesize(&mut self, text: &str, voice: &str, locale: Locale, speed: f32)
    -> Result<Vec<f32>>;
}

/// Validates segment synthesis requests and the audio that comes back.
pub struct SegmentSynthesizer {
    backend: Box<dyn SpeechSynthesizer>,
}

impl SegmentSynthesizer {
    pub fn new(backend: Box<dyn SpeechSynthesizer>) -> Self {
        Self { backend }
    }

    /// Synthesize one segment's text.
    ///
    /// Empty text, a non-positive speed and an unknown accent are
    /// `InvalidInput`. Backend failures and empty or non-finite audio are
    /// `Synthesis` errors.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn synthesize_segment(
        &mut self,
        text: &str,
        voice: &str,
        locale: &str,
        speed: f32,
    ) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(PodcastError::InvalidInput("Empty text provided".to_string()));
        }
        if !(speed > 0.0) || !speed.is_finite() {
            return Err(PodcastError::InvalidInput(format!(
                "Speed must be positive, got {}",
                speed
            )));
        }
        let locale = Locale::parse(locale)?;

        let samples = self
            .backend
            .synthesize(text, voice, locale, speed)
            .map_err(|e| match e {
                PodcastError::Synthesis(message) => PodcastError::Synthesis(message),
                other => PodcastError::Synthesis(other.to_string()),
            })?;

        if samples.is_empty() {
            return Err(PodcastError::Synthesis("Generated audio is empty".to_string()));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(PodcastError::Synthesis(
                "Generated audio contains invalid values (inf/nan)".to_string(),
            ));
        }

        debug!("Synthesized {} samples", samples.len());
        Ok(samples)
    }
}

/// Map a voice display name to its Kokoro voice id.
///
/// Ids pass through unchanged.
pub fn voice_id_for(name: &str) -> &str {
    match name {
        "Default Mix (Bella & Sarah)" => "af",
        "Bella (American Female)" => "af_bella",
        "Nicole (American Female)" => "af_nicole",
        "Sarah (American Female)" => "af_sarah",
        "Sky (American Female)" => "af_sky",
        "Adam (American Male)" => "am_adam",
        "Michael (American Male)" => "am_michael",
        "Emma (British Female)" => "bf_emma",
        "Isabella (British Female)" => "bf_isabella",
        "George (British Male)" => "bm_george",
        "Lewis (British Male)" => "bm_lewis",
        other => other,
    }
}

/// Kokoro TTS backend via kokoro-tiny.
pub struct KokoroSynthesizer {
    engine: TtsEngine,
    available_voices: Vec<String>,
}

impl KokoroSynthesizer {
    /// Initialize the TTS engine (downloads model on first run).
    pub async fn new() -> Result<Self> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| PodcastError::Synthesis(format!("Failed to initialize TTS: {}", e)))?;

        let available_voices = engine.voices();

        Ok(Self {
            engine,
            available_voices,
        })
    }

    /// Validate that a voice ID exists.
    pub fn validate_voice(&self, voice_id: &str) -> Result<()> {
        if voice_id.is_empty() {
            return Err(PodcastError::InvalidInput(format!(
                "Voice ID cannot be empty. Available voices:\n{}",
                self.format_available_voices()
            )));
        }

        if !self.available_voices.iter().any(|v| v == voice_id) {
            return Err(PodcastError::InvalidInput(format!(
                "Unknown voice '{}'. Available voices:\n{}",
                voice_id,
                self.format_available_voices()
            )));
        }

        Ok(())
    }

    /// Format available voices for display.
    fn format_available_voices(&self) -> String {
        let mut english_voices: Vec<&String> = self
            .available_voices
            .iter()
            .filter(|v| {
                v.starts_with("af_")
                    || v.starts_with("am_")
                    || v.starts_with("bf_")
                    || v.starts_with("bm_")
            })
            .collect();
        english_voices.sort();

        english_voices
            .iter()
            .map(|v| format!("  - {}", v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl SpeechSynthesizer for KokoroSynthesizer {
    /// Synthesize text in chunks; kokoro-tiny has a strict limit on text length.
    fn synthesize(
        &mut self,
        text: &str,
        voice: &str,
        locale: Locale,
        speed: f32,
    ) -> Result<Vec<f32>> {
        let voice_id = voice_id_for(voice);
        self.validate_voice(voice_id)?;
        if !voice_id.starts_with(locale.lang_code()) {
            warn!("Voice '{}' does not match the {} accent", voice_id, locale);
        }

        // ~200 char safe limit per call
        let chunks = split_into_chunks(text, 200);
        let pause = vec![0.0; (SAMPLE_RATE as f32 * 0.3) as usize];

        let mut all_samples = Vec::new();

        for chunk in chunks {
            if chunk.trim().is_empty() {
                continue;
            }

            let samples = self
                .engine
                .synthesize(&chunk, Some(voice_id))
                .map_err(|e| PodcastError::Synthesis(format!("Synthesis failed: {}", e)))?;

            all_samples.extend(samples);
            all_samples.extend(&pause);
        }

        // Trailing padding so the last word is not cut off
        all_samples.extend(vec![0.0; (SAMPLE_RATE as f32 * 0.5) as usize]);

        Ok(adjust_audio_speed(all_samples, speed))
    }
}

/// Split text into chunks that are safe for TTS synthesis.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    // Split by sentence-ending punctuation
    for sentence in text.split_inclusive(&['.', '!', '?', ';', '\n'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current_chunk.len() + sentence.len() > max_chars {
            if !current_chunk.is_empty() {
                chunks.push(current_chunk.trim().to_string());
                current_chunk = String::new();
            }

            // If single sentence is too long, split by commas
            if sentence.len() > max_chars {
                for part in sentence.split_inclusive(',') {
                    if current_chunk.len() + part.len() > max_chars && !current_chunk.is_empty() {
                        chunks.push(current_chunk.trim().to_string());
                        current_chunk = String::new();
                    }
                    current_chunk.push_str(part);
                    current_chunk.push(' ');
                }
            } else {
                current_chunk.push_str(sentence);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(sentence);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

/// Adjust playback rate using linear interpolation.
/// Rate < 1.0 = slower (e.g., 0.75 = 75% speed), Rate > 1.0 = faster.
pub fn adjust_audio_speed(samples: Vec<f32>, rate: f32) -> Vec<f32> {
    if (rate - 1.0).abs() < 0.001 {
        return samples;
    }

    // Slower = longer
    let new_len = (samples.len() as f32 / rate) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f32 * rate;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f32;

        if src_idx + 1 < samples.len() {
            let sample = samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac;
            result.push(sample);
        } else if src_idx < samples.len() {
            result.push(samples[src_idx]);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend returning a fixed buffer, or an error.
    struct FixedBackend {
        output: std::result::Result<Vec<f32>, String>,
        calls: usize,
    }

    impl SpeechSynthesizer for FixedBackend {
        fn synthesize(&mut self, _: &str, _: &str, _: Locale, _: f32) -> Result<Vec<f32>> {
            self.calls += 1;
            self.output.clone().map_err(PodcastError::ConfigError)
        }
    }

    fn synthesizer(output: std::result::Result<Vec<f32>, String>) -> SegmentSynthesizer {
        SegmentSynthesizer::new(Box::new(FixedBackend { output, calls: 0 }))
    }

    #[test]
    fn test_synthesize_segment_ok() {
        let mut synth = synthesizer(Ok(vec![0.1, -0.2]));
        let samples = synth.synthesize_segment("Hello", "af_bella", "American", 1.0).unwrap();
        assert_eq!(samples, vec![0.1, -0.2]);
    }

    #[test]
    fn test_rejects_empty_text() {
        let mut synth = synthesizer(Ok(vec![0.1]));
        let err = synth.synthesize_segment("  \n", "af_bella", "American", 1.0).unwrap_err();
        assert!(matches!(err, PodcastError::InvalidInput(ref m) if m.contains("Empty text")));
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        let mut synth = synthesizer(Ok(vec![0.1]));
        for speed in [0.0, -1.0, f32::NAN] {
            let err = synth.synthesize_segment("Hi", "af_bella", "American", speed).unwrap_err();
            assert!(matches!(err, PodcastError::InvalidInput(ref m) if m.contains("Speed")));
        }
    }

    #[test]
    fn test_rejects_unknown_locale() {
        let mut synth = synthesizer(Ok(vec![0.1]));
        let err = synth.synthesize_segment("Hi", "af_bella", "Australian", 1.0).unwrap_err();
        assert!(matches!(err, PodcastError::InvalidInput(ref m) if m.contains("Accent")));
    }

    #[test]
    fn test_backend_error_is_wrapped() {
        let mut synth = synthesizer(Err("model missing".to_string()));
        let err = synth.synthesize_segment("Hi", "af_bella", "British", 1.0).unwrap_err();
        assert!(matches!(err, PodcastError::Synthesis(ref m) if m.contains("model missing")));
    }

    #[test]
    fn test_rejects_empty_audio() {
        let mut synth = synthesizer(Ok(vec![]));
        let err = synth.synthesize_segment("Hi", "af_bella", "American", 1.0).unwrap_err();
        assert!(matches!(err, PodcastError::Synthesis(_)));
    }

    #[test]
    fn test_rejects_non_finite_audio() {
        let mut synth = synthesizer(Ok(vec![0.1, f32::INFINITY]));
        let err = synth.synthesize_segment("Hi", "af_bella", "American", 1.0).unwrap_err();
        assert!(matches!(err, PodcastError::Synthesis(ref m) if m.contains("inf/nan")));
    }

    #[test]
    fn test_locale_parse() {
        assert_eq!(Locale::parse("american").unwrap(), Locale::American);
        assert_eq!(Locale::parse(" British ").unwrap(), Locale::British);
        assert_eq!(Locale::British.lang_code(), 'b');
    }

    #[test]
    fn test_voice_id_for() {
        assert_eq!(voice_id_for("George (British Male)"), "bm_george");
        assert_eq!(voice_id_for("af_sky"), "af_sky");
    }

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 35);
        }
    }

    #[test]
    fn test_split_into_chunks_dialogue_lines() {
        let chunks = split_into_chunks("Host: Hi\nGuest: Hello", 10);
        assert_eq!(chunks, vec!["Host: Hi", "Guest: Hello"]);
    }

    #[test]
    fn test_adjust_audio_speed() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        assert_eq!(adjust_audio_speed(samples.clone(), 1.0).len(), 100);
        assert_eq!(adjust_audio_speed(samples.clone(), 2.0).len(), 50);
        assert_eq!(adjust_audio_speed(samples, 0.5).len(), 200);
    }
}
