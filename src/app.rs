//! Caption application entry point.
//!
//! Wires the complete flow: capture → segment → transcribe → caption,
//! with the optional translation overlay, rendered to the terminal.

use crate::audio::capture::{CpalAudioSource, suppress_audio_warnings};
use crate::audio::{AudioSource, MixedSource, SourceFactory, WavAudioSource};
use crate::config::{Config, SourceMode};
use crate::error::{LivecapError, Result};
use crate::output::TerminalSink;
use crate::pipeline::orchestrator::{Pipeline, PipelineConfig};
use crate::stt::{SpeechEngine, WhisperEngine, WhisperEngineConfig};
use crate::translate::{DeepLConfig, DeepLTranslator, Translator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Where the caption audio comes from.
pub enum CaptionInput {
    /// Live capture per the configured source mode.
    Live,
    /// Replay a WAV file.
    WavFile(PathBuf),
    /// Replay WAV data piped to stdin.
    Stdin,
}

/// Run the caption command: capture audio → segment → transcribe →
/// render captions (and translations) until interrupted.
///
/// # Arguments
/// * `config` - Effective configuration (file + env + CLI overrides)
/// * `input` - Live capture or WAV replay
/// * `quiet` - Suppress status messages (captions still render)
/// * `verbosity` - Verbosity level (0=default, 1=pipeline stats)
pub async fn run_caption_command(
    config: Config,
    input: CaptionInput,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    config.validate()?;

    // Suppress noisy JACK/ALSA warnings before audio init
    suppress_audio_warnings();

    let mut pipeline_config = PipelineConfig::from_config(&config);

    let audio_source: Box<dyn AudioSource> = match &input {
        CaptionInput::WavFile(path) => {
            let file = std::fs::File::open(path)?;
            Box::new(WavAudioSource::from_reader(Box::new(file))?)
        }
        CaptionInput::Stdin => Box::new(WavAudioSource::from_stdin()?),
        CaptionInput::Live => build_live_source(&config, &mut pipeline_config, quiet)?,
    };
    let finite = audio_source.is_finite();

    if !quiet {
        eprintln!("Loading model '{}'...", config.stt.model);
    }
    let engine: Arc<dyn SpeechEngine> = Arc::new(WhisperEngine::new(WhisperEngineConfig {
        model_path: resolve_model_path(&config.stt.model)?,
        threads: None,
    })?);

    let translator: Option<Arc<dyn Translator>> = if config.translation.enabled {
        let translator = DeepLTranslator::new(DeepLConfig {
            api_key: config.translation.api_key.clone().unwrap_or_default(),
            timeout: Duration::from_millis(config.translation.timeout_ms),
        })?;
        Some(Arc::new(translator))
    } else {
        None
    };

    if !quiet {
        match &translator {
            Some(_) => eprintln!(
                "Captioning with translation to {}. Ctrl+C to stop.",
                config.translation.target_language
            ),
            None => eprintln!("Captioning. Ctrl+C to stop."),
        }
    }

    let sink = Box::new(TerminalSink::new());
    let pipeline = Pipeline::new(pipeline_config);
    let handle = pipeline.start(audio_source, engine, translator, sink)?;
    let metrics = handle.metrics();

    if finite {
        // File replay drains on its own; no signal handling needed.
        tokio::task::spawn_blocking(move || handle.wait())
            .await
            .map_err(|e| LivecapError::Other(format!("pipeline wait failed: {}", e)))?;
    } else {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| LivecapError::Other(format!("Failed to wait for Ctrl+C: {}", e)))?;

        if !quiet {
            eprintln!("\nShutting down...");
        }
        handle.stop();
    }

    if verbosity >= 1 {
        use std::sync::atomic::Ordering;
        eprintln!(
            "livecap: {} frames captured, {} overruns",
            metrics.frames_captured.load(Ordering::Relaxed),
            metrics.overruns.load(Ordering::Relaxed),
        );
    }

    Ok(())
}

/// Build the live capture source for the configured mode and wire the
/// pipeline so a later mode toggle can rebuild it.
///
/// The side channel carries mixed-mode degradation notices into the
/// display stream; it is wired for every live mode because a toggle can
/// switch into mixed at any point.
fn build_live_source(
    config: &Config,
    pipeline_config: &mut PipelineConfig,
    quiet: bool,
) -> Result<Box<dyn AudioSource>> {
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let factory = live_source_factory(config, event_tx);

    let source = factory.build(config.audio.mode)?;
    if !quiet {
        eprintln!("Capturing {} audio", config.audio.mode);
    }

    pipeline_config.source_event_rx = Some(event_rx);
    pipeline_config.source_factory = Some(factory);
    Ok(source)
}

/// Factory the capture thread uses to swap sources when the hot-config
/// mode changes.
fn live_source_factory(
    config: &Config,
    event_tx: crossbeam_channel::Sender<crate::pipeline::DisplayEvent>,
) -> SourceFactory {
    let mic_device = config.audio.mic_device.clone();
    let system_device = config.audio.system_device.clone();
    let stall_timeout = Duration::from_millis(config.audio.stall_timeout_ms);

    SourceFactory::new(move |mode| match mode {
        SourceMode::Mic => {
            let source = CpalAudioSource::new(mic_device.as_deref(), SourceMode::Mic)?;
            Ok(Box::new(source) as Box<dyn AudioSource>)
        }
        SourceMode::System => {
            let source = CpalAudioSource::new(system_device.as_deref(), SourceMode::System)?;
            Ok(Box::new(source))
        }
        SourceMode::Mixed => {
            let mic = CpalAudioSource::new(mic_device.as_deref(), SourceMode::Mic)?;
            let system = CpalAudioSource::new(system_device.as_deref(), SourceMode::System)?;
            Ok(Box::new(
                MixedSource::new(Box::new(mic), Box::new(system))
                    .with_stall_timeout(stall_timeout)
                    .with_event_sender(event_tx.clone()),
            ))
        }
    })
}

/// Resolve a model name or path to the ggml model file on disk.
///
/// Accepts absolute paths, existing relative paths, and bare model names
/// (`base`, `small.en`), which are looked up in the user data directory
/// and then in `./models/`.
fn resolve_model_path(model: &str) -> Result<PathBuf> {
    let path = PathBuf::from(model);

    if path.is_absolute() || path.exists() {
        return Ok(path);
    }

    if model.contains('/') || model.contains('\\') {
        return Ok(path);
    }

    let filename = if model.ends_with(".bin") {
        model.to_string()
    } else {
        format!("ggml-{}.bin", model)
    };

    let mut candidates = Vec::new();
    if let Some(data_dir) = dirs::data_dir() {
        candidates.push(data_dir.join("livecap").join("models").join(&filename));
    }
    candidates.push(PathBuf::from("models").join(&filename));

    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.clone());
        }
    }

    Err(LivecapError::ModelNotFound {
        path: candidates
            .last()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| filename.clone()),
    })
}
