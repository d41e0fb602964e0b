//! PodcastAI CLI - AI Podcast Creator
//!
//! A command-line tool that researches a topic, writes and fact-checks a
//! podcast script with an LLM, and renders it to audio.

use clap::{ArgAction, Parser};
use colored::Colorize;
use podcastai_core::tts::voice_id_for;
use podcastai_core::{
    Config, CompletionConfig, KokoroSynthesizer, Locale, OpenAiCompletion, PipelineCallback,
    PipelineEvent, PipelineOrchestrator, PodcastAssembler, PodcastScript, SegmentSynthesizer,
    default_config, generate_output_filename,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "podcastai",
    version,
    about = "AI Podcast Creator - Turn a topic into a narrated episode",
    long_about = "A CLI tool that researches, scripts, fact-checks and narrates podcast episodes using OpenAI-compatible APIs and Kokoro TTS."
)]
struct Cli {
    /// The topic of the episode
    #[arg(value_name = "TOPIC")]
    topic: String,

    /// Path to a TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model name for every pipeline stage
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Target episode length in minutes
    #[arg(short, long, value_name = "MINUTES")]
    duration: Option<u32>,

    /// Presentation style (Conversational, Interview, Educational, ...)
    #[arg(short, long, value_name = "STYLE")]
    style: Option<String>,

    /// Voice id (af_bella) or display name ("Bella (American Female)")
    #[arg(long, value_name = "VOICE")]
    voice: Option<String>,

    /// Accent: American or British
    #[arg(long, value_name = "ACCENT")]
    accent: Option<String>,

    /// Speaking speed (1.0 = normal)
    #[arg(long, value_name = "SPEED")]
    speed: Option<f32>,

    /// Disable background music
    #[arg(long)]
    no_music: bool,

    /// Directory holding <mood>.wav music tracks
    #[arg(long, value_name = "DIR")]
    music_dir: Option<PathBuf>,

    /// Default music volume in dB
    #[arg(long, value_name = "DB", allow_hyphen_values = true)]
    music_volume: Option<f32>,

    /// Output WAV file (default: derived from the episode title)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;

    // Get API configuration from environment
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.deepseek.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    // Fail on voice settings before spending any tokens
    let locale = Locale::parse(&config.voice.accent)?;
    if !(config.voice.speed > 0.0) {
        return Err(format!("Speed must be positive, got {}", config.voice.speed).into());
    }

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  PodcastAI - AI Podcast Creator".bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), cli.topic.bright_white());
    println!(
        "{} {} min, {} style, {} ({} accent, {}x)",
        "Episode:".bold(),
        config.pipeline.duration_minutes,
        config.pipeline.style,
        config.voice.voice.bright_cyan(),
        locale,
        config.voice.speed
    );
    println!("{} {}", "Model:".bold(), config.pipeline.model.dimmed());
    println!();

    println!("{}", "Loading TTS model...".dimmed());
    let tts = KokoroSynthesizer::new().await?;
    tts.validate_voice(voice_id_for(&config.voice.voice))?;

    println!("{}", "─".repeat(70).dimmed());

    let completion_config =
        CompletionConfig::new(api_base, api_key).with_pipeline(&config.pipeline);
    let completion = Arc::new(OpenAiCompletion::new(completion_config)?);

    let orchestrator = PipelineOrchestrator::new(completion, &config.prompts)
        .with_callback(create_console_callback());

    let script = orchestrator
        .run(
            &cli.topic,
            config.pipeline.duration_minutes,
            &config.pipeline.style,
        )
        .await?;

    print_script(&script);

    let output_path = cli.output.clone().unwrap_or_else(|| {
        let filename = generate_output_filename(&script.title);
        match &config.output.directory {
            Some(dir) => dir.join(filename),
            None => PathBuf::from(filename),
        }
    });

    tracing::info!("Rendering audio to {}", output_path.display());
    let mut assembler = PodcastAssembler::new(
        SegmentSynthesizer::new(Box::new(tts)),
        config.voice.clone(),
        config.music.clone(),
    )
    .with_callback(create_console_callback());

    let record = assembler.assemble(script, &output_path)?;

    let minutes = (record.duration_seconds / 60.0).floor();
    let seconds = record.duration_seconds - minutes * 60.0;

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  Podcast complete.".bright_green().bold());
    println!(
        "  {} {}",
        "Audio:".bold(),
        record.audio_path.display().to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Metadata:".bold(),
        record.audio_path.with_extension("json").display()
    );
    println!("  {} {}:{:04.1}", "Duration:".bold(), minutes, seconds);
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "podcastai=warn,podcastai_core=warn",
        1 => "podcastai=info,podcastai_core=info",
        _ => "podcastai=debug,podcastai_core=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Config file (or embedded defaults) with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };

    if let Some(model) = &cli.model {
        config.pipeline.model = model.clone();
    }
    if let Some(duration) = cli.duration {
        config.pipeline.duration_minutes = duration;
    }
    if let Some(style) = &cli.style {
        config.pipeline.style = style.clone();
    }
    if let Some(voice) = &cli.voice {
        config.voice.voice = voice.clone();
    }
    if let Some(accent) = &cli.accent {
        config.voice.accent = accent.clone();
    }
    if let Some(speed) = cli.speed {
        config.voice.speed = speed;
    }
    if cli.no_music {
        config.music.enabled = false;
    }
    if let Some(dir) = &cli.music_dir {
        config.music.directory = dir.clone();
    }
    if let Some(volume) = cli.music_volume {
        config.music.volume_db = volume;
    }

    Ok(config)
}

/// Create a callback that prints pipeline events to the console.
fn create_console_callback() -> PipelineCallback {
    Box::new(move |event| match event {
        PipelineEvent::StageStarted { stage, status } => {
            println!();
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                stage.bright_cyan().bold(),
                status.dimmed()
            );
        }
        PipelineEvent::StageCompleted { stage, status } => {
            println!("  {} {}: {}", "✓".bright_green(), stage, status);
        }
        PipelineEvent::StageFailed { stage, error } => {
            eprintln!(
                "  {} {}: {}",
                "✗".red().bold(),
                stage.red(),
                error
            );
        }
        PipelineEvent::PipelineFinished { title, segments } => {
            println!();
            println!(
                "{} {} ({} segments)",
                "Script ready:".bright_green().bold(),
                title.bright_white(),
                segments
            );
        }
    })
}

/// Print the script outline and fact-check summary.
fn print_script(script: &PodcastScript) {
    println!();
    println!("{}", "─".repeat(70).dimmed());
    if !script.description.is_empty() {
        for line in textwrap(&script.description, 66).lines() {
            println!("  {}", line.italic());
        }
        println!();
    }

    for (i, segment) in script.segments.iter().enumerate() {
        println!(
            "  {} {} {}",
            segment.timestamp.as_deref().unwrap_or("--:--").dimmed(),
            format!("{}.", i + 1).bright_cyan(),
            segment.display_title().bold()
        );
    }

    if !script.keywords.is_empty() {
        println!();
        println!("  {} {}", "Keywords:".bold(), script.keywords.join(", "));
    }

    let fact_check = &script.fact_check;
    println!(
        "  {} {} claims: {} verified, {} uncertain, {} unverified",
        "Fact check:".bold(),
        fact_check.total(),
        fact_check.verified_claims.len().to_string().green(),
        fact_check.uncertain_claims.len().to_string().yellow(),
        fact_check.unverified_claims.len().to_string().red()
    );
    for claim in &fact_check.unverified_claims {
        let wrapped = textwrap(&format!("{} ({}%)", claim.claim, claim.confidence), 62);
        for (i, line) in wrapped.lines().enumerate() {
            let bullet = if i == 0 { "!" } else { " " };
            println!("    {} {}", bullet.red(), line.dimmed());
        }
    }
    println!("{}", "─".repeat(70).dimmed());
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
