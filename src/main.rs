use anyhow::Result;
use clap::Parser;
use livecap::app::{CaptionInput, run_caption_command};
use livecap::audio::capture::list_devices;
use livecap::cli::{Cli, Commands, ConfigAction};
use livecap::config::Config;
use livecap::error::LivecapError;
use owo_colors::OwoColorize;
use std::io::IsTerminal;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_cli_overrides(&mut config, &cli);

            let input = if let Some(path) = cli.wav.clone() {
                CaptionInput::WavFile(path)
            } else if std::io::stdin().is_terminal() {
                CaptionInput::Live
            } else {
                // Pipe mode: stdin has WAV data
                CaptionInput::Stdin
            };

            if let Err(e) = run_caption_command(config, input, cli.quiet, cli.verbose).await {
                report_error(&e);
            }
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/livecap/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// CLI flags win over the config file and environment.
fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(mode) = cli.source {
        config.audio.mode = mode;
    }
    if let Some(device) = &cli.mic_device {
        config.audio.mic_device = Some(device.clone());
    }
    if let Some(device) = &cli.system_device {
        config.audio.system_device = Some(device.clone());
    }
    if let Some(model) = &cli.model {
        config.stt.model = model.clone();
    }
    if let Some(language) = &cli.language {
        config.stt.language = language.clone();
    }
    if cli.translate {
        config.translation.enabled = true;
    }
    if let Some(target) = &cli.target_language {
        config.translation.target_language = target.clone();
    }
    if let Some(debounce) = cli.debounce {
        config.audio.debounce_ms = debounce;
    }
    if let Some(threshold) = cli.threshold {
        config.audio.silence_threshold = threshold;
    }
    if let Some(words) = cli.word_buffer {
        config.display.word_buffer = words;
    }
}

/// Print a pipeline startup error and exit non-zero.
///
/// Device errors also list what is available, since a typo in a device
/// name is the common case.
fn report_error(error: &LivecapError) -> ! {
    eprintln!("{}", format!("Error: {}", error).red());

    match error {
        LivecapError::DeviceUnavailable { .. } => {
            eprintln!();
            if let Ok(devices) = list_devices()
                && !devices.is_empty()
            {
                eprintln!("Available audio input devices:");
                for device in &devices {
                    eprintln!("  {}", device);
                }
            } else {
                eprintln!("No audio input devices found.");
            }
        }
        LivecapError::ModelNotFound { .. } => {
            eprintln!();
            eprintln!("Download a ggml Whisper model and point stt.model at it, e.g.:");
            eprintln!("  livecap --model /path/to/ggml-base.bin");
        }
        _ => {}
    }

    std::process::exit(1);
}

/// List available audio input devices.
fn list_audio_devices() -> Result<()> {
    let devices = list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&std::path::Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut config = load_config(custom_path)?;
            if config.translation.api_key.is_some() {
                config.translation.api_key = Some("<redacted>".to_string());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Dump => {
            print!("{}", CONFIG_TEMPLATE);
        }
    }
    Ok(())
}

const CONFIG_TEMPLATE: &str = r#"# livecap configuration
# Place at ~/.config/livecap/config.toml

[audio]
# Sources to caption: "mic", "system", or "mixed"
mode = "system"
# Device names as shown by `livecap devices`; omit for sensible defaults
# mic_device = "pipewire"
# system_device = "alsa_output.analog-stereo.monitor"
# RMS level below which a frame counts as silence
silence_threshold = 0.02
# Silence duration that closes an utterance (ms)
debounce_ms = 700
# Audio kept from before speech onset (ms)
pre_roll_ms = 500
# Audio kept after speech ends (ms)
post_roll_ms = 150
# Hard cap on utterance length; longer speech is split (ms)
max_segment_ms = 10000

[stt]
# Whisper model name or path to a ggml file
model = "base"
# Transcription language ("auto" = detect)
language = "auto"
# Parallel transcription workers
concurrency = 1

[translation]
enabled = false
# DeepL target language code
target_language = "EN"
# Or set LIVECAP_DEEPL_KEY
# api_key = ""
# Preceding sentences sent as translation context
context_sentences = 3

[display]
# Caption window size in words
word_buffer = 40
"#;
