//! Daemon module - process-level wiring
//!
//! Builds the pipeline coordinator and attaches its surroundings: the
//! hotkey watcher, signal-based external control, the text sink
//! subscriber, and the state file subscriber. The coordinator owns all
//! pipeline state; the daemon only routes triggers in and events out.

use crate::audio::CpalSourceFactory;
use crate::config::Config;
use crate::engine::WhisperLoader;
use crate::error::Result;
use crate::hotkey::{self, HotkeyEvent};
use crate::output::{self, TextSink};
use crate::pipeline::events::{EventPublisher, PipelineEvent};
use crate::pipeline::{CoordinatorConfig, PipelineCoordinator};
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};

/// Write state to file for external integrations (e.g. Waybar)
fn write_state_file(path: &PathBuf, state: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    if let Err(e) = std::fs::write(path, state) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", state);
    }
}

fn cleanup_state_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove state file: {}", e);
        }
    }
}

/// Write PID file for external control via signals
fn write_pid_file() -> Option<PathBuf> {
    let pid_path = Config::runtime_dir().join("pid");

    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

fn cleanup_pid_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// Main daemon that owns the pipeline and its attachments
pub struct Daemon {
    config: Config,
    state_file_path: Option<PathBuf>,
    pid_file_path: Option<PathBuf>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let state_file_path = config.resolve_state_file();
        Self {
            config,
            state_file_path,
            pid_file_path: None,
        }
    }

    /// Run the daemon until SIGINT/SIGTERM
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting holdtype daemon");

        self.pid_file_path = write_pid_file();

        // External control for compositor keybindings
        let mut sigusr1 = signal(SignalKind::user_defined1())?;
        let mut sigusr2 = signal(SignalKind::user_defined2())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        Config::ensure_directories()?;

        tracing::info!("Output mode: {:?}", self.config.output.mode);
        if let Some(ref path) = self.state_file_path {
            tracing::info!("State file: {:?}", path);
        }

        let publisher = EventPublisher::new(self.config.pipeline.event_queue_depth);

        let (coordinator, handle) = PipelineCoordinator::new(
            CoordinatorConfig::from(&self.config),
            CpalSourceFactory::new(&self.config.audio),
            WhisperLoader::new(&self.config.engine),
            publisher.clone(),
        );

        // Subscribers attach before the pipeline starts publishing
        let sink_chain = output::create_sink_chain(&self.config.output);
        tracing::debug!(
            "Sink chain: {}",
            sink_chain
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        let sink_task = tokio::spawn(run_sink_task(publisher.subscribe(), sink_chain));

        let state_task = self.state_file_path.clone().map(|path| {
            write_state_file(&path, "idle");
            tokio::spawn(run_state_task(publisher.subscribe(), path))
        });

        // Hotkey watcher, forwarded into the pipeline's trigger channel
        let mut watcher = if self.config.hotkey.enabled {
            tracing::info!("Hotkey: {}", self.config.hotkey.key);
            Some(hotkey::create_watcher(&self.config.hotkey)?)
        } else {
            tracing::info!(
                "Built-in hotkey disabled, use 'holdtype record' commands or \
                 compositor keybindings"
            );
            None
        };

        let forward_task = match watcher.as_mut() {
            Some(watcher) => {
                let rx = watcher.start().await?;
                Some(tokio::spawn(forward_triggers(rx, handle.trigger_sender())))
            }
            None => None,
        };

        let mut pipeline_task = tokio::spawn(coordinator.run());
        let mut pipeline_done = false;

        loop {
            tokio::select! {
                _ = sigusr1.recv() => {
                    tracing::debug!("Received SIGUSR1 (start recording)");
                    handle.trigger(HotkeyEvent::Pressed).await;
                }

                _ = sigusr2.recv() => {
                    tracing::debug!("Received SIGUSR2 (stop recording)");
                    handle.trigger(HotkeyEvent::Released).await;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }

                result = &mut pipeline_task => {
                    pipeline_done = true;
                    match result {
                        Ok(Ok(())) => tracing::info!("Pipeline exited"),
                        Ok(Err(e)) => tracing::error!("Pipeline failed: {}", e),
                        Err(e) => tracing::error!("Pipeline task panicked: {}", e),
                    }
                    break;
                }
            }
        }

        // Ordered teardown: stop new triggers, drain the pipeline,
        // then let the subscribers finish the remaining events
        if let Some(mut watcher) = watcher {
            watcher.stop().await?;
        }
        if let Some(task) = forward_task {
            task.abort();
        }

        if !pipeline_done {
            handle.shutdown().await;
            match pipeline_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Pipeline failed during shutdown: {}", e),
                Err(e) => tracing::error!("Pipeline task panicked: {}", e),
            }
        }

        // Dropping the last publisher closes the broadcast channel and
        // ends the subscriber tasks after they drain
        drop(handle);
        drop(publisher);
        let _ = sink_task.await;
        if let Some(task) = state_task {
            let _ = task.await;
        }

        if let Some(ref path) = self.state_file_path {
            cleanup_state_file(path);
        }
        if let Some(ref path) = self.pid_file_path {
            cleanup_pid_file(path);
        }

        tracing::info!("Daemon stopped");
        Ok(())
    }
}

/// Forward watcher events into the pipeline trigger channel
async fn forward_triggers(mut rx: mpsc::Receiver<HotkeyEvent>, tx: mpsc::Sender<HotkeyEvent>) {
    while let Some(event) = rx.recv().await {
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

/// Subscriber task delivering transcriptions to the sink chain
async fn run_sink_task(
    mut rx: broadcast::Receiver<PipelineEvent>,
    chain: Vec<Box<dyn TextSink>>,
) {
    let mut lag_logged = false;
    loop {
        match rx.recv().await {
            Ok(PipelineEvent::Transcribed(result)) => {
                lag_logged = false;
                if result.text.is_empty() {
                    tracing::debug!("Session {} transcribed to nothing", result.session_id);
                    continue;
                }
                let text = output::sanitize(&result.text);
                tracing::info!(
                    "Session {} transcribed {:.1}s of audio (confidence {:.2})",
                    result.session_id,
                    result.duration_secs,
                    result.confidence
                );
                if let Err(e) = output::deliver_with_fallback(&chain, &text).await {
                    tracing::error!("Delivery failed for session {}: {}", result.session_id, e);
                }
            }
            Ok(PipelineEvent::SessionAborted { session_id, reason }) => {
                lag_logged = false;
                tracing::debug!("Session {} aborted: {}", session_id, reason);
            }
            Ok(PipelineEvent::SessionFailed { session_id, error }) => {
                lag_logged = false;
                tracing::warn!("Session {} failed: {}", session_id, error);
            }
            Ok(_) => {
                lag_logged = false;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // Log once per lag burst, then keep consuming
                if !lag_logged {
                    tracing::warn!("Sink subscriber lagging, {} event(s) lost", n);
                    lag_logged = true;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Subscriber task mirroring pipeline activity into the state file
async fn run_state_task(mut rx: broadcast::Receiver<PipelineEvent>, path: PathBuf) {
    use crate::engine::EngineState;
    loop {
        match rx.recv().await {
            Ok(event) => {
                let state = match event {
                    PipelineEvent::SessionStarted { .. } => Some("recording"),
                    PipelineEvent::EngineStateChanged {
                        state: EngineState::Busy,
                    } => Some("transcribing"),
                    PipelineEvent::Transcribed(_)
                    | PipelineEvent::SessionAborted { .. }
                    | PipelineEvent::SessionFailed { .. } => Some("idle"),
                    _ => None,
                };
                if let Some(state) = state {
                    write_state_file(&path, state);
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {
                // Missed intermediate states are fine, the next event
                // rewrites the file
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
