//! Turns a finished script into the final audio track and metadata.

use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::config::{MusicConfig, VoiceConfig};
use crate::error::{PodcastError, Result};
use crate::mixer::{SAMPLE_RATE, adjust_music, db_to_gain, load_music, mix, peak_normalize};
use crate::orchestrator::{PipelineCallback, PipelineEvent};
use crate::script::{PodcastScript, Segment};
use crate::tts::{Locale, SegmentSynthesizer};

const STAGE_NAME: &str = "Audio Generator";

/// Moods with a bundled track name.
pub const MOODS: [&str; 5] = ["upbeat", "calm", "dramatic", "tech", "inspirational"];

/// Maps a segment's music mood to a track on disk.
#[derive(Debug, Clone)]
pub struct MusicLibrary {
    tracks: BTreeMap<String, PathBuf>,
}

impl MusicLibrary {
    /// `<directory>/<mood>.wav` for every known mood.
    pub fn new(directory: &Path) -> Self {
        let tracks = MOODS
            .iter()
            .map(|mood| (mood.to_string(), directory.join(format!("{}.wav", mood))))
            .collect();
        Self { tracks }
    }

    /// Library for the music directory, with per-mood overrides applied.
    ///
    /// Overrides for moods outside [`MOODS`] are ignored.
    pub fn from_config(config: &MusicConfig) -> Self {
        let mut library = Self::new(&config.directory);
        for (mood, path) in &config.tracks {
            let key = mood.trim().to_lowercase();
            if MOODS.contains(&key.as_str()) {
                library.tracks.insert(key, path.clone());
            } else {
                warn!("Ignoring music track for unknown mood '{}'", mood);
            }
        }
        library
    }

    pub fn resolve(&self, mood: &str) -> Option<&Path> {
        self.tracks
            .get(&mood.trim().to_lowercase())
            .map(PathBuf::as_path)
    }
}

/// Everything produced for one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastRecord {
    #[serde(flatten)]
    pub script: PodcastScript,
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
}

/// Synthesizes, mixes and concatenates segments in script order.
pub struct PodcastAssembler {
    synthesizer: SegmentSynthesizer,
    voice: VoiceConfig,
    music: MusicConfig,
    library: MusicLibrary,
    /// Loaded tracks by path; `None` for files that could not be read.
    track_cache: HashMap<PathBuf, Option<Vec<f32>>>,
    callback: Option<PipelineCallback>,
}

impl PodcastAssembler {
    pub fn new(synthesizer: SegmentSynthesizer, voice: VoiceConfig, music: MusicConfig) -> Self {
        let library = MusicLibrary::from_config(&music);
        Self {
            synthesizer,
            voice,
            music,
            library,
            track_cache: HashMap::new(),
            callback: None,
        }
    }

    /// Set a callback for progress events.
    pub fn with_callback(mut self, callback: PipelineCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Render every segment and write `output_path` plus `<stem>.json`.
    ///
    /// Invalid configured voice settings fail up front. Segments that fail
    /// are logged and left out. Fails with `EmptyPodcast` when no segment
    /// produced audio.
    #[instrument(skip(self, script), fields(title = %script.title))]
    pub fn assemble(&mut self, script: PodcastScript, output_path: &Path) -> Result<PodcastRecord> {
        Locale::parse(&self.voice.accent)?;
        if !(self.voice.speed > 0.0) || !self.voice.speed.is_finite() {
            return Err(PodcastError::InvalidInput(format!(
                "Speed must be positive, got {}",
                self.voice.speed
            )));
        }

        self.emit(PipelineEvent::StageStarted {
            stage: STAGE_NAME.to_string(),
            status: "Generating audio segments...".to_string(),
        });

        let total = script.segments.len();
        let mut rendered = Vec::with_capacity(total);

        for (index, segment) in script.segments.iter().enumerate() {
            match self.render_segment(segment) {
                Ok(samples) => {
                    debug!("Segment {} rendered: {} samples", index + 1, samples.len());
                    rendered.push(samples);
                    self.emit(PipelineEvent::StageCompleted {
                        stage: STAGE_NAME.to_string(),
                        status: format!("Generated segment {}/{}", index + 1, total),
                    });
                }
                Err(e) => warn!(
                    "Skipping segment {} ({}): {}",
                    index + 1,
                    segment.display_title(),
                    e
                ),
            }
        }

        if rendered.is_empty() {
            let error = PodcastError::EmptyPodcast;
            self.emit(PipelineEvent::StageFailed {
                stage: STAGE_NAME.to_string(),
                error: error.to_string(),
            });
            return Err(error);
        }

        let audio: Vec<f32> = rendered.concat();
        let duration_seconds = audio.len() as f64 / SAMPLE_RATE as f64;

        write_wav(output_path, &audio)?;
        let record = PodcastRecord {
            script,
            audio_path: output_path.to_path_buf(),
            duration_seconds,
        };
        let metadata_path = output_path.with_extension("json");
        fs::write(&metadata_path, serde_json::to_string_pretty(&record)?)?;

        info!(
            "Wrote {} ({:.1}s) and {}",
            output_path.display(),
            duration_seconds,
            metadata_path.display()
        );
        self.emit(PipelineEvent::StageCompleted {
            stage: STAGE_NAME.to_string(),
            status: format!("Podcast saved ({:.1}s)", duration_seconds),
        });

        Ok(record)
    }

    fn render_segment(&mut self, segment: &Segment) -> Result<Vec<f32>> {
        let speed = segment.enhancement_speed().unwrap_or(self.voice.speed);
        let mut samples = self.synthesizer.synthesize_segment(
            &segment.content,
            &self.voice.voice,
            &self.voice.accent,
            speed,
        )?;

        if let Some(effect) = &segment.sound_effect {
            debug!("Sound effect '{}' requested, not mixed", effect);
        }

        if self.music.enabled {
            let cue = segment.music.as_ref();
            if let Some(mood) = cue.and_then(|c| c.mood.as_deref()) {
                let volume = cue
                    .and_then(|c| c.volume)
                    .unwrap_or(self.music.volume_db);
                samples = self.mix_music(samples, mood, db_to_gain(volume));
            }
        }

        peak_normalize(&mut samples);
        Ok(samples)
    }

    fn mix_music(&mut self, speech: Vec<f32>, mood: &str, gain: f32) -> Vec<f32> {
        let Some(path) = self.library.resolve(mood).map(Path::to_path_buf) else {
            warn!("Unknown music mood '{}', no music added", mood);
            return speech;
        };

        let track = self.track_cache.entry(path).or_insert_with_key(|path| {
            load_music(path)
                .map_err(|e| warn!("Music track {} unavailable: {}", path.display(), e))
                .ok()
        });

        let music = adjust_music(track.as_deref(), speech.len(), gain);
        mix(&speech, &music)
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Write mono 32-bit float samples at [`SAMPLE_RATE`].
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(())
}

/// Generate the output filename from the episode title.
pub fn generate_output_filename(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect();

    format!("PodcastAI - {}.wav", sanitized.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::FactCheckResult;
    use crate::tts::SpeechSynthesizer;
    use serde_json::{Map, Value, json};
    use std::sync::{Arc, Mutex};

    /// Returns 0.1 s of audio per call; text containing `FAIL` errors.
    struct ToneBackend {
        speeds: Arc<Mutex<Vec<f32>>>,
    }

    impl SpeechSynthesizer for ToneBackend {
        fn synthesize(&mut self, text: &str, _: &str, _: Locale, speed: f32) -> Result<Vec<f32>> {
            self.speeds.lock().unwrap().push(speed);
            if text.contains("FAIL") {
                return Err(PodcastError::Synthesis("backend refused".to_string()));
            }
            Ok(vec![0.8; 2400])
        }
    }

    fn assembler(music: MusicConfig) -> (PodcastAssembler, Arc<Mutex<Vec<f32>>>) {
        let speeds = Arc::new(Mutex::new(Vec::new()));
        let backend = ToneBackend {
            speeds: speeds.clone(),
        };
        let assembler = PodcastAssembler::new(
            SegmentSynthesizer::new(Box::new(backend)),
            VoiceConfig::default(),
            music,
        );
        (assembler, speeds)
    }

    fn no_music() -> MusicConfig {
        MusicConfig {
            enabled: false,
            ..MusicConfig::default()
        }
    }

    fn script(segments: Vec<Value>) -> PodcastScript {
        PodcastScript {
            title: "Tides".to_string(),
            description: "About tides".to_string(),
            keywords: vec!["ocean".to_string()],
            segments: segments
                .iter()
                .enumerate()
                .map(|(i, v)| Segment::from_value(i, v).unwrap())
                .collect(),
            research: Map::new(),
            fact_check: FactCheckResult::default(),
            show_notes: Map::new(),
        }
    }

    #[test]
    fn test_failed_segment_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("episode.wav");
        let (mut assembler, _) = assembler(no_music());

        let record = assembler
            .assemble(
                script(vec![
                    json!({"title": "One", "content": "First."}),
                    json!({"title": "Two", "content": "FAIL here."}),
                    json!({"title": "Three", "content": "Third."}),
                ]),
                &output,
            )
            .unwrap();

        assert!((record.duration_seconds - 0.2).abs() < 1e-9);
        assert_eq!(record.script.segments.len(), 3);

        let reader = hound::WavReader::open(&output).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(reader.len(), 4800);

        let metadata: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("episode.json")).unwrap())
                .unwrap();
        assert_eq!(metadata["title"], "Tides");
        assert!(metadata["audio_path"].as_str().unwrap().ends_with("episode.wav"));
    }

    #[test]
    fn test_no_audio_is_empty_podcast() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("episode.wav");
        let (mut assembler, _) = assembler(no_music());

        let err = assembler
            .assemble(script(vec![json!({"content": "FAIL"})]), &output)
            .unwrap_err();
        assert!(matches!(err, PodcastError::EmptyPodcast));
        assert!(!output.exists());
    }

    #[test]
    fn test_invalid_voice_settings_abort() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("episode.wav");
        let (mut assembler, speeds) = assembler(no_music());
        assembler.voice.accent = "Scottish".to_string();

        let err = assembler
            .assemble(script(vec![json!({"content": "Hi."})]), &output)
            .unwrap_err();
        assert!(matches!(err, PodcastError::InvalidInput(_)));
        assert!(speeds.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_enhancement_speed_drops_segment() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assembler, _) = assembler(no_music());

        let record = assembler
            .assemble(
                script(vec![
                    json!({"content": "A.", "enhancements": {"speed": 0}}),
                    json!({"content": "B."}),
                ]),
                &dir.path().join("out.wav"),
            )
            .unwrap();
        assert!((record.duration_seconds - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_enhancement_speed_overrides_configured_speed() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assembler, speeds) = assembler(no_music());

        assembler
            .assemble(
                script(vec![
                    json!({"content": "A.", "enhancements": {"voice": {"speed": 1.1}}}),
                    json!({"content": "B."}),
                ]),
                &dir.path().join("out.wav"),
            )
            .unwrap();

        let speeds = speeds.lock().unwrap();
        assert!((speeds[0] - 1.1).abs() < 1e-6);
        assert_eq!(speeds[1], 1.0);
    }

    #[test]
    fn test_music_is_mixed_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("calm.wav"), &[0.8; 100]).unwrap();
        let (mut assembler, _) = assembler(MusicConfig {
            directory: dir.path().to_path_buf(),
            ..MusicConfig::default()
        });

        assembler
            .assemble(
                script(vec![json!({
                    "content": "Calm now.",
                    "music": {"mood": "calm", "volume": 1.0}
                })]),
                &dir.path().join("out.wav"),
            )
            .unwrap();

        let mut reader = hound::WavReader::open(dir.path().join("out.wav")).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 2400);
        assert!(samples.iter().all(|s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_out_of_range_music_volume_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("calm.wav"), &[0.8; 100]).unwrap();
        let (mut assembler, _) = assembler(MusicConfig {
            directory: dir.path().to_path_buf(),
            ..MusicConfig::default()
        });

        assembler
            .assemble(
                script(vec![json!({
                    "content": "Calm now.",
                    "music": {"mood": "calm", "volume": 1e39}
                })]),
                &dir.path().join("out.wav"),
            )
            .unwrap();

        let mut reader = hound::WavReader::open(dir.path().join("out.wav")).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 2400);
        // 0.8 speech + 0.8 music at the default -20 dB
        assert!(samples.iter().all(|s| s.is_finite() && (s - 0.88).abs() < 1e-4));
    }

    #[test]
    fn test_missing_track_and_unknown_mood_keep_speech() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assembler, _) = assembler(MusicConfig {
            directory: dir.path().join("nothing-here"),
            ..MusicConfig::default()
        });

        let record = assembler
            .assemble(
                script(vec![
                    json!({"content": "One.", "music": "upbeat"}),
                    json!({"content": "Two.", "music": {"mood": "polka"}}),
                ]),
                &dir.path().join("out.wav"),
            )
            .unwrap();

        assert!((record.duration_seconds - 0.2).abs() < 1e-9);
        let mut reader = hound::WavReader::open(dir.path().join("out.wav")).unwrap();
        assert!(reader.samples::<f32>().all(|s| (s.unwrap() - 0.8).abs() < 1e-6));
    }

    #[test]
    fn test_progress_events() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let (assembler, _) = assembler(no_music());
        let mut assembler = assembler.with_callback(Box::new(move |event: PipelineEvent| {
            sink.lock().unwrap().push(event.status());
        }));

        assembler
            .assemble(script(vec![json!({"content": "Hi."})]), &dir.path().join("o.wav"))
            .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events[0], "Generating audio segments...");
        assert_eq!(events[1], "Generated segment 1/1");
        assert!(events[2].starts_with("Podcast saved"));
    }

    #[test]
    fn test_music_library_overrides() {
        let mut config = MusicConfig::default();
        config
            .tracks
            .insert("Calm".to_string(), PathBuf::from("/srv/rain.wav"));
        config
            .tracks
            .insert("polka".to_string(), PathBuf::from("/srv/polka.wav"));
        let library = MusicLibrary::from_config(&config);
        assert_eq!(library.resolve("calm"), Some(Path::new("/srv/rain.wav")));
        assert_eq!(
            library.resolve("Tech"),
            Some(Path::new("music/tech.wav"))
        );
        assert_eq!(library.resolve("polka"), None);
    }

    #[test]
    fn test_generate_output_filename() {
        assert_eq!(
            generate_output_filename("Tides: How the Moon Works?"),
            "PodcastAI - Tides_ How the Moon Works_.wav"
        );
        let long = generate_output_filename(&"é".repeat(100));
        assert_eq!(long.chars().count(), "PodcastAI - .wav".len() + 50);
    }
}
