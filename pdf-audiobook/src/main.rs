//! pdf2audio - Convert PDF files to audiobooks using chunked text-to-speech

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use pdf_audiobook::audio::AudioFormat;
use pdf_audiobook::tts::{self, DEFAULT_VOICE_LIST_TIMEOUT, ProviderKind, TtsProvider};
use pdf_audiobook::{AppConfig, CancelToken, Pipeline, PipelineState, Progress};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "pdf2audio")]
#[command(about = "Convert PDF files to audiobooks using text-to-speech", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the PDF file
    pdf_file: Option<PathBuf>,

    /// Output file path (default: <pdf-name>.mp3, or .wav for WAV voices)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Voice identifier (see `pdf2audio voices`)
    #[arg(long)]
    voice: Option<String>,

    /// Maximum characters per chunk
    #[arg(long)]
    max_chunk_size: Option<usize>,

    /// Chunk conversions to run at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Extra attempts for a failed chunk
    #[arg(long)]
    retries: Option<u32>,

    /// TTS provider (edge, http)
    #[arg(long)]
    provider: Option<String>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available voices
    Voices,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice
    SetVoice {
        /// Voice identifier
        voice: String,
    },
    /// Set TTS provider
    SetProvider {
        /// Provider name (edge, http)
        provider: String,
    },
    /// Set maximum chunk size
    SetChunkSize {
        /// Characters per chunk
        size: usize,
    },
    /// Set number of concurrent conversions
    SetConcurrency {
        /// Conversions in flight
        limit: usize,
    },
    /// Set retry attempts per chunk
    SetRetries {
        /// Extra attempts
        attempts: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    // Handle subcommands
    match &args.command {
        Some(Commands::Config { action }) => return handle_config_command(action),
        Some(Commands::Voices) => return handle_voices_command(&args).await,
        None => {}
    }

    let pdf_path = args
        .pdf_file
        .clone()
        .ok_or_else(|| anyhow::anyhow!("PDF file path is required. Run 'pdf2audio --help' for usage."))?;

    if !pdf_path.exists() {
        anyhow::bail!("PDF file not found: {}", pdf_path.display());
    }

    let config = load_config(&args)?;
    config.pipeline.validate()?;

    let provider = tts::create_provider(&config).context("Failed to create TTS provider")?;

    let voice = match args.voice.as_deref().or(config.voice.as_deref()) {
        Some(voice) => tts::select_voice(Some(voice), &[])?,
        None => {
            let voices = tts::resolve_voices(
                provider.as_ref(),
                &config.provider.default_voices(),
                DEFAULT_VOICE_LIST_TIMEOUT,
            )
            .await?;
            tts::select_voice(None, &voices)?
        }
    };

    debug!("PDF: {}", pdf_path.display());
    debug!("Provider: {} ({})", config.provider, provider.name());
    debug!("Voice: {}", voice);
    debug!("Pipeline: {:?}", config.pipeline);

    let pdf_bytes = std::fs::read(&pdf_path)
        .with_context(|| format!("Failed to read {}", pdf_path.display()))?;

    eprintln!("Converting {} with voice {}", pdf_path.display(), voice);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling...");
                cancel.cancel();
            }
        });
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let pipeline = Pipeline::from_provider(config.pipeline.clone(), provider);
    let source = pdf_path.display().to_string();
    let outcome = pipeline
        .convert_pdf(&pdf_bytes, &source, &voice, |p| update_progress(&pb, p), &cancel)
        .await;

    let Some(audio) = outcome.final_audio else {
        pb.abandon_with_message("failed");
        let summary = outcome
            .error_summary
            .unwrap_or_else(|| "Conversion failed".to_string());
        anyhow::bail!("{}", summary);
    };
    pb.finish_with_message("done");

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&pdf_path, AudioFormat::sniff(&audio)));

    std::fs::write(&output_path, &audio)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    if !outcome.failed_chunks.is_empty() {
        let skipped: Vec<String> = outcome.failed_chunks.iter().map(|i| i.to_string()).collect();
        eprintln!(
            "Warning: {} chunk(s) could not be converted and were skipped: {}",
            skipped.len(),
            skipped.join(", ")
        );
    }

    let size_mb = audio.len() as f64 / (1024.0 * 1024.0);
    eprintln!("Output: {} ({:.1} MB)", output_path.display(), size_mb);

    Ok(())
}

/// Load the config file and apply command line overrides.
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load().context("Failed to load configuration")?;

    if let Some(name) = &args.provider {
        config.provider = ProviderKind::parse(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown provider '{}'. Use 'edge' or 'http'.", name))?;
    }
    if let Some(size) = args.max_chunk_size {
        config.pipeline.max_chunk_size = size;
    }
    if let Some(limit) = args.concurrency {
        config.pipeline.concurrency_limit = limit;
    }
    if let Some(attempts) = args.retries {
        config.pipeline.retry_attempts = attempts;
    }

    Ok(config)
}

fn default_output_path(pdf_path: &Path, format: Option<AudioFormat>) -> PathBuf {
    let stem = pdf_path.file_stem().unwrap_or_default();
    let extension = format.unwrap_or(AudioFormat::Mp3).extension();
    pdf_path.with_file_name(format!("{}.{}", stem.to_string_lossy(), extension))
}

fn update_progress(pb: &ProgressBar, progress: Progress) {
    pb.set_position(progress.percent as u64);
    let message = match progress.state {
        PipelineState::Converting if progress.total > 0 => {
            format!("converting {}/{}", progress.completed, progress.total)
        }
        state => state.to_string(),
    };
    pb.set_message(message);
}

async fn handle_voices_command(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let provider = tts::create_provider(&config).context("Failed to create TTS provider")?;

    let voices = tts::resolve_voices(
        provider.as_ref(),
        &config.provider.default_voices(),
        DEFAULT_VOICE_LIST_TIMEOUT,
    )
    .await?;

    for voice in voices {
        let marker = if config.voice.as_deref() == Some(voice.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("{}{}", voice, marker);
    }

    Ok(())
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = AppConfig::load()?;
            println!("Configuration file: {:?}", AppConfig::config_path());
            println!();
            match &config.voice {
                Some(voice) => println!("voice = \"{}\"", voice),
                None => println!("voice = (first available)"),
            }
            println!("provider = \"{}\"", config.provider);
            if config.provider == ProviderKind::Http {
                println!("http.base_url = \"{}\"", config.http.base_url);
                println!("http.model = \"{}\"", config.http.model);
            }
            println!("max_chunk_size = {}", config.pipeline.max_chunk_size);
            println!("concurrency_limit = {}", config.pipeline.concurrency_limit);
            println!("retry_attempts = {}", config.pipeline.retry_attempts);
            println!("chunk_timeout_secs = {}", config.pipeline.chunk_timeout_secs);
            println!("assembler = \"{}\"", config.pipeline.assembler);
        }
        ConfigAction::SetVoice { voice } => {
            let mut config = AppConfig::load()?;
            config.voice = Some(voice.clone());
            config.save()?;
            println!("Default voice set to: {}", voice);
        }
        ConfigAction::SetProvider { provider } => {
            let kind = ProviderKind::parse(provider)
                .ok_or_else(|| anyhow::anyhow!("Unknown provider '{}'. Use 'edge' or 'http'.", provider))?;
            let mut config = AppConfig::load()?;
            config.provider = kind;
            config.save()?;
            println!("Provider set to: {}", kind);
        }
        ConfigAction::SetChunkSize { size } => {
            if *size == 0 {
                anyhow::bail!("Chunk size must be greater than 0");
            }
            let mut config = AppConfig::load()?;
            config.pipeline.max_chunk_size = *size;
            config.save()?;
            println!("Max chunk size set to: {}", size);
        }
        ConfigAction::SetConcurrency { limit } => {
            if *limit == 0 {
                anyhow::bail!("Concurrency must be at least 1");
            }
            let mut config = AppConfig::load()?;
            config.pipeline.concurrency_limit = *limit;
            config.save()?;
            println!("Concurrency set to: {}", limit);
        }
        ConfigAction::SetRetries { attempts } => {
            let mut config = AppConfig::load()?;
            config.pipeline.retry_attempts = *attempts;
            config.save()?;
            println!("Retry attempts set to: {}", attempts);
        }
    }

    Ok(())
}
