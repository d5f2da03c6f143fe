//! Holdtype - Push-to-talk speech-to-text for Wayland
//!
//! Run with `holdtype` or `holdtype daemon` to start the daemon.
//! Use `holdtype transcribe <file>` to transcribe an audio file.
//! Use `holdtype record start/stop/toggle` to control a running daemon
//! from compositor keybindings.

use clap::Parser;
use holdtype::cli::{Cli, Commands, RecordAction};
use holdtype::{audio, config, daemon, engine};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("holdtype={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;

    // CLI overrides
    if cli.clipboard {
        config.output.mode = config::OutputMode::Clipboard;
    }
    if let Some(model) = cli.model {
        config.engine.model = model;
    }
    if let Some(hotkey) = cli.hotkey {
        config.hotkey.key = hotkey;
    }
    if cli.toggle {
        config.hotkey.mode = config::ActivationMode::Toggle;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = daemon::Daemon::new(config);
            daemon.run().await?;
        }

        Commands::Transcribe { file } => {
            transcribe_file(&config, &file)?;
        }

        Commands::Config => {
            show_config(&config);
        }

        Commands::Record { action } => {
            run_record(&config, action)?;
        }
    }

    Ok(())
}

/// Transcribe an audio file through the same engine the daemon uses
fn transcribe_file(config: &config::Config, path: &Path) -> anyhow::Result<()> {
    use engine::{EngineLoader, WhisperLoader, ENGINE_SAMPLE_RATE};
    use hound::WavReader;

    println!("Loading audio file: {:?}", path);

    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    println!(
        "Audio format: {} Hz, {} channel(s), {:?}",
        spec.sample_rate, spec.channels, spec.sample_format
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_val)
                .collect()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
    };

    // Mix to mono if stereo
    let mono_samples: Vec<f32> = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect()
    } else {
        samples
    };

    let final_samples = if spec.sample_rate != ENGINE_SAMPLE_RATE {
        println!(
            "Resampling from {} Hz to {} Hz...",
            spec.sample_rate, ENGINE_SAMPLE_RATE
        );
        audio::resample(&mono_samples, spec.sample_rate, ENGINE_SAMPLE_RATE)
    } else {
        mono_samples
    };

    println!(
        "Processing {} samples ({:.2}s)...",
        final_samples.len(),
        final_samples.len() as f32 / ENGINE_SAMPLE_RATE as f32
    );

    let engine = WhisperLoader::new(&config.engine).load()?;
    let output = engine.transcribe(&final_samples)?;

    if output.text.is_empty() {
        println!("\n(no speech detected)");
    } else {
        println!("\n{}", output.text);
        eprintln!("(confidence {:.2})", output.confidence);
    }
    Ok(())
}

/// Send a control signal to the running daemon
fn run_record(config: &config::Config, action: RecordAction) -> anyhow::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid_path = config::Config::runtime_dir().join("pid");
    let pid_str = std::fs::read_to_string(&pid_path).map_err(|_| {
        anyhow::anyhow!(
            "Daemon not running (no PID file at {:?}). Start it with: holdtype",
            pid_path
        )
    })?;
    let pid: i32 = pid_str.trim().parse()?;

    let signal = match action {
        RecordAction::Start => Signal::SIGUSR1,
        RecordAction::Stop => Signal::SIGUSR2,
        RecordAction::Toggle => {
            // Decide from the daemon's state file; default to start
            let recording = config
                .resolve_state_file()
                .and_then(|path| std::fs::read_to_string(path).ok())
                .map(|s| s.trim() == "recording")
                .unwrap_or(false);
            if recording {
                Signal::SIGUSR2
            } else {
                Signal::SIGUSR1
            }
        }
    };

    kill(Pid::from_raw(pid), signal)
        .map_err(|e| anyhow::anyhow!("Failed to signal daemon (pid {}): {}", pid, e))?;

    tracing::debug!("Sent {:?} to daemon (pid {})", signal, pid);
    Ok(())
}

/// Show current configuration
fn show_config(config: &config::Config) {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[hotkey]");
    println!("  key = {:?}", config.hotkey.key);
    println!("  modifiers = {:?}", config.hotkey.modifiers);
    println!("  mode = {:?}", config.hotkey.mode);
    println!("  debounce_ms = {}", config.hotkey.debounce_ms);
    println!("  enabled = {}", config.hotkey.enabled);

    println!("\n[audio]");
    println!("  device = {:?}", config.audio.device);
    println!("  sample_rate = {}", config.audio.sample_rate);
    println!("  block_size = {}", config.audio.block_size);
    println!("  queue_depth = {}", config.audio.queue_depth);
    println!("  max_duration_secs = {}", config.audio.max_duration_secs);

    println!("\n[engine]");
    println!("  model = {:?}", config.engine.model);
    println!("  language = {:?}", config.engine.language);
    println!("  translate = {}", config.engine.translate);
    if let Some(threads) = config.engine.threads {
        println!("  threads = {}", threads);
    }
    println!("  failure_threshold = {}", config.engine.failure_threshold);

    println!("\n[pipeline]");
    println!("  min_duration_ms = {}", config.pipeline.min_duration_ms);
    println!("  overlap_policy = {:?}", config.pipeline.overlap_policy);
    println!("  backpressure = {:?}", config.pipeline.backpressure);
    println!(
        "  gap_tolerance_blocks = {}",
        config.pipeline.gap_tolerance_blocks
    );

    println!("\n[output]");
    println!("  mode = {:?}", config.output.mode);
    println!(
        "  fallback_to_clipboard = {}",
        config.output.fallback_to_clipboard
    );
    println!(
        "  notification.on_transcription = {}",
        config.output.notification.on_transcription
    );

    if let Some(ref state_file) = config.state_file {
        println!("\nstate_file = {:?}", state_file);
        if let Some(resolved) = config.resolve_state_file() {
            println!("  (resolves to: {:?})", resolved);
        }
    }

    println!("\n---");
    println!(
        "Config file: {:?}",
        config::Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );
    println!("Models dir: {:?}", config::Config::models_dir());
}
