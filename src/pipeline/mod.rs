//! Pipeline coordinator
//!
//! The coordinator is the single owner of pipeline state. It drains
//! the hotkey channel, the active session's audio channel, engine load
//! completions, and transcription completions in one select loop; no
//! other task mutates session or engine state. Inference runs on a
//! blocking worker so the event loop never stalls behind the engine.
//!
//! Guarantees:
//! - at most one session is ever recording
//! - every started session yields exactly one published outcome
//! - outcomes reach subscribers in session order
//! - a completed capture is never discarded without a published signal
//! - engine load failure degrades the pipeline instead of stopping it;
//!   recording keeps working and the load is retried on a backoff

pub mod events;
pub mod sequencer;

use crate::audio::{AudioSource, SourceEvent, SourceFactory};
use crate::config::{ActivationMode, BackpressurePolicy, Config, OverlapPolicy};
use crate::engine::{EngineLoader, EngineState, SpeechEngine, TranscriptionResult};
use crate::error::{EngineError, PipelineError};
use crate::hotkey::HotkeyEvent;
use crate::session::{AbortReason, CaptureBuffer, CaptureSession, FinalizeOutcome, SessionId};
use events::{EventPublisher, PipelineEvent};
use sequencer::{ResultSequencer, SessionOutcome};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Coordinator behavior, distilled from [`Config`]
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub sample_rate: u32,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub gap_tolerance_blocks: u64,
    pub activation_mode: ActivationMode,
    pub overlap_policy: OverlapPolicy,
    pub backpressure: BackpressurePolicy,
    pub failure_threshold: u32,
    pub retry_initial: Duration,
    pub retry_max: Duration,
    pub shutdown_timeout: Duration,
}

impl From<&Config> for CoordinatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            sample_rate: config.audio.sample_rate,
            min_duration: Duration::from_millis(config.pipeline.min_duration_ms),
            max_duration: Duration::from_secs(config.audio.max_duration_secs as u64),
            gap_tolerance_blocks: config.pipeline.gap_tolerance_blocks,
            activation_mode: config.hotkey.mode,
            overlap_policy: config.pipeline.overlap_policy,
            backpressure: config.pipeline.backpressure,
            failure_threshold: config.engine.failure_threshold,
            retry_initial: Duration::from_millis(config.engine.retry_initial_ms),
            retry_max: Duration::from_millis(config.engine.retry_max_ms),
            shutdown_timeout: Duration::from_secs(config.engine.shutdown_timeout_secs),
        }
    }
}

/// Completion message from the transcription worker
struct JobDone {
    session_id: SessionId,
    audio_secs: f32,
    output: Result<crate::engine::EngineOutput, EngineError>,
}

/// The one session currently capturing audio
struct ActiveSession {
    session: CaptureSession,
    source: Box<dyn AudioSource>,
}

/// In-flight transcription bookkeeping
struct Inflight {
    session_id: SessionId,
    /// Result will be discarded when it lands (drop_and_warn policy)
    discard: bool,
}

/// Control handle held by the daemon (and tests)
pub struct PipelineHandle {
    triggers: mpsc::Sender<HotkeyEvent>,
    shutdown: mpsc::Sender<()>,
}

impl PipelineHandle {
    /// Feed a trigger event (from the hotkey watcher or signal IPC)
    pub async fn trigger(&self, event: HotkeyEvent) {
        let _ = self.triggers.send(event).await;
    }

    /// Clone the trigger sender for a forwarding task
    pub fn trigger_sender(&self) -> mpsc::Sender<HotkeyEvent> {
        self.triggers.clone()
    }

    /// Request an orderly shutdown
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(()).await;
    }
}

/// The central state machine tying watcher, sessions, and engine together
pub struct PipelineCoordinator {
    config: CoordinatorConfig,
    sources: Arc<dyn SourceFactory>,
    loader: Arc<dyn EngineLoader>,
    publisher: EventPublisher,

    trigger_rx: Option<mpsc::Receiver<HotkeyEvent>>,
    shutdown_rx: Option<mpsc::Receiver<()>>,
    job_tx: mpsc::Sender<JobDone>,
    job_rx: Option<mpsc::Receiver<JobDone>>,
    load_tx: mpsc::Sender<Result<Box<dyn SpeechEngine>, EngineError>>,
    load_rx: Option<mpsc::Receiver<Result<Box<dyn SpeechEngine>, EngineError>>>,

    next_session: u64,
    active: Option<ActiveSession>,
    /// Trigger remembered under the "queue" overlap policy
    pending_trigger: bool,
    /// Armed once per session; block arrivals never reset it
    capture_deadline: Option<Instant>,

    engine_state: EngineState,
    engine: Option<Arc<dyn SpeechEngine>>,
    retry_backoff: Duration,
    retry_at: Option<Instant>,
    consecutive_failures: u32,

    inflight: Option<Inflight>,
    /// Completed captures awaiting the engine, oldest first. The wait
    /// policy keeps all of them; drop_and_warn keeps only the newest.
    queued: VecDeque<(SessionId, CaptureBuffer)>,
    sequencer: ResultSequencer,
}

impl PipelineCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        sources: Arc<dyn SourceFactory>,
        loader: Arc<dyn EngineLoader>,
        publisher: EventPublisher,
    ) -> (Self, PipelineHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (job_tx, job_rx) = mpsc::channel(4);
        let (load_tx, load_rx) = mpsc::channel(1);

        let retry_backoff = config.retry_initial;

        let coordinator = Self {
            config,
            sources,
            loader,
            publisher,
            trigger_rx: Some(trigger_rx),
            shutdown_rx: Some(shutdown_rx),
            job_tx,
            job_rx: Some(job_rx),
            load_tx,
            load_rx: Some(load_rx),
            next_session: 1,
            active: None,
            pending_trigger: false,
            capture_deadline: None,
            engine_state: EngineState::Uninitialized,
            engine: None,
            retry_backoff,
            retry_at: None,
            consecutive_failures: 0,
            inflight: None,
            queued: VecDeque::new(),
            sequencer: ResultSequencer::new(1),
        };

        let handle = PipelineHandle {
            triggers: trigger_tx,
            shutdown: shutdown_tx,
        };

        (coordinator, handle)
    }

    /// Run the coordinator until shutdown is requested or an invariant
    /// is violated. Consumes the coordinator.
    pub async fn run(mut self) -> Result<(), PipelineError> {
        let mut trigger_rx = self
            .trigger_rx
            .take()
            .ok_or(PipelineError::ChannelClosed("trigger"))?;
        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .ok_or(PipelineError::ChannelClosed("shutdown"))?;
        let mut job_rx = self
            .job_rx
            .take()
            .ok_or(PipelineError::ChannelClosed("job"))?;
        let mut load_rx = self
            .load_rx
            .take()
            .ok_or(PipelineError::ChannelClosed("load"))?;

        // The active session's audio stream; Some exactly while a
        // session is recording
        let mut source_rx: Option<mpsc::Receiver<SourceEvent>> = None;

        self.begin_engine_load();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    break;
                }

                event = trigger_rx.recv() => {
                    match event {
                        Some(event) => self.on_trigger(event, &mut source_rx).await?,
                        None => {
                            tracing::warn!("Trigger channel closed, shutting down");
                            break;
                        }
                    }
                }

                event = recv_source(&mut source_rx) => {
                    self.on_source_event(event, &mut source_rx).await?;
                }

                Some(done) = job_rx.recv() => {
                    self.on_job_done(done)?;
                }

                Some(loaded) = load_rx.recv() => {
                    self.on_engine_loaded(loaded);
                }

                // Safety cap on runaway recordings. The deadline is a
                // fixed instant armed at session start, so a steady
                // stream of audio events cannot keep pushing it out.
                _ = tokio::time::sleep_until(self.capture_deadline.unwrap_or_else(Instant::now)),
                        if self.capture_deadline.is_some() => {
                    self.on_capture_deadline(&mut source_rx).await?;
                }

                // Degraded-mode engine reload
                _ = tokio::time::sleep_until(self.retry_at.unwrap_or_else(Instant::now)),
                        if self.retry_at.is_some() => {
                    tracing::info!("Retrying engine load");
                    self.begin_engine_load();
                }
            }
        }

        self.shutdown(&mut source_rx, &mut job_rx).await;
        Ok(())
    }

    async fn on_trigger(
        &mut self,
        event: HotkeyEvent,
        source_rx: &mut Option<mpsc::Receiver<SourceEvent>>,
    ) -> Result<(), PipelineError> {
        match (event, self.config.activation_mode) {
            (HotkeyEvent::Pressed, ActivationMode::PushToTalk) => {
                self.trigger_start(source_rx).await?;
            }
            (HotkeyEvent::Released, ActivationMode::PushToTalk) => {
                self.trigger_stop(source_rx).await?;
            }
            (HotkeyEvent::Pressed, ActivationMode::Toggle) => {
                if self.active.is_some() {
                    self.trigger_stop(source_rx).await?;
                } else {
                    self.trigger_start(source_rx).await?;
                }
            }
            (HotkeyEvent::Released, ActivationMode::Toggle) => {
                tracing::trace!("Ignoring release in toggle mode");
            }
        }
        Ok(())
    }

    /// Start a new session unless one is active
    async fn trigger_start(
        &mut self,
        source_rx: &mut Option<mpsc::Receiver<SourceEvent>>,
    ) -> Result<(), PipelineError> {
        if self.active.is_some() {
            match self.config.overlap_policy {
                OverlapPolicy::Ignore => {
                    tracing::debug!("Trigger during active recording ignored");
                }
                OverlapPolicy::Queue => {
                    tracing::debug!("Trigger during active recording queued");
                    self.pending_trigger = true;
                }
            }
            return Ok(());
        }

        if source_rx.is_some() {
            return Err(PipelineError::InvariantViolation(
                "audio stream open without an active session".to_string(),
            ));
        }

        let mut source = match self.sources.create() {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("Failed to create audio source: {}", e);
                self.fail_to_start(e.to_string());
                return Ok(());
            }
        };

        let rx = match source.open().await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!("Failed to open audio source: {}", e);
                self.fail_to_start(e.to_string());
                return Ok(());
            }
        };

        let id = SessionId(self.next_session);
        self.next_session += 1;

        tracing::info!("Recording started (session {})", id);
        self.publisher
            .publish(PipelineEvent::SessionStarted { session_id: id });

        self.active = Some(ActiveSession {
            session: CaptureSession::new(id, self.config.sample_rate),
            source,
        });
        self.capture_deadline = Some(Instant::now() + self.config.max_duration);
        *source_rx = Some(rx);

        Ok(())
    }

    /// A press whose device never opened still surfaces to subscribers:
    /// the session is allocated, started, and immediately aborted
    fn fail_to_start(&mut self, error: String) {
        let id = SessionId(self.next_session);
        self.next_session += 1;
        self.publisher
            .publish(PipelineEvent::SessionStarted { session_id: id });
        self.finish_aborted(id, AbortReason::Device(error));
    }

    /// Stop the active session, validate the capture, and hand it on
    async fn trigger_stop(
        &mut self,
        source_rx: &mut Option<mpsc::Receiver<SourceEvent>>,
    ) -> Result<(), PipelineError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        self.capture_deadline = None;
        let ActiveSession {
            mut session,
            mut source,
        } = active;
        let mut rx = source_rx.take();

        let id = session.id();
        tracing::info!(
            "Recording stopped (session {}, {:.1}s)",
            id,
            session.elapsed().as_secs_f32()
        );

        let close_result = source.close().await;

        // The capture thread flushes its partial block before acking
        // the close; drain whatever is still queued
        if let Some(rx) = rx.as_mut() {
            while let Ok(event) = rx.try_recv() {
                if let SourceEvent::Block(block) = event {
                    session.push_block(&block);
                }
            }
        }

        if let Err(e) = close_result {
            let reason = session.abort(AbortReason::Device(e.to_string()));
            self.finish_aborted(id, reason);
        } else {
            match session.finalize(self.config.min_duration, self.config.gap_tolerance_blocks) {
                FinalizeOutcome::Completed(buffer) => self.on_capture_completed(id, buffer),
                FinalizeOutcome::Aborted(reason) => self.finish_aborted(id, reason),
            }
        }

        if self.pending_trigger {
            self.pending_trigger = false;
            self.trigger_start(source_rx).await?;
        }

        Ok(())
    }

    async fn on_source_event(
        &mut self,
        event: Option<SourceEvent>,
        source_rx: &mut Option<mpsc::Receiver<SourceEvent>>,
    ) -> Result<(), PipelineError> {
        match event {
            Some(SourceEvent::Block(block)) => {
                if let Some(active) = self.active.as_mut() {
                    active.session.push_block(&block);
                }
            }
            Some(SourceEvent::Failed(e)) => {
                tracing::warn!("Audio stream failed: {}", e);
                self.abort_active(AbortReason::Device(e.to_string()), source_rx)
                    .await;
            }
            None => {
                // Capture thread went away without a terminal event
                if self.active.is_some() {
                    self.abort_active(
                        AbortReason::Device("audio stream ended unexpectedly".to_string()),
                        source_rx,
                    )
                    .await;
                } else {
                    *source_rx = None;
                }
            }
        }
        Ok(())
    }

    /// Abort the active session with a device-level cause
    async fn abort_active(
        &mut self,
        reason: AbortReason,
        source_rx: &mut Option<mpsc::Receiver<SourceEvent>>,
    ) {
        *source_rx = None;
        self.capture_deadline = None;
        if let Some(active) = self.active.take() {
            let ActiveSession {
                session,
                mut source,
            } = active;
            let _ = source.close().await;
            let id = session.id();
            let reason = session.abort(reason);
            self.finish_aborted(id, reason);
        }
    }

    async fn on_capture_deadline(
        &mut self,
        source_rx: &mut Option<mpsc::Receiver<SourceEvent>>,
    ) -> Result<(), PipelineError> {
        self.capture_deadline = None;
        if self.active.is_some() {
            tracing::warn!(
                "Recording exceeded {:.0}s limit, finalizing",
                self.config.max_duration.as_secs_f32()
            );
            self.trigger_stop(source_rx).await?;
        }
        Ok(())
    }

    /// Route a validated capture to the engine, the queue slot, or a
    /// degraded-mode hold
    fn on_capture_completed(&mut self, id: SessionId, buffer: CaptureBuffer) {
        match self.engine_state {
            EngineState::Ready => self.dispatch(id, buffer),
            EngineState::Busy => match self.config.backpressure {
                BackpressurePolicy::Wait => {
                    tracing::debug!("Engine busy, queueing session {}", id);
                    self.enqueue(id, buffer);
                }
                BackpressurePolicy::DropAndWarn => {
                    if let Some(inflight) = self.inflight.as_mut() {
                        if !inflight.discard {
                            tracing::warn!(
                                "Discarding in-flight transcription of session {} in favor of {}",
                                inflight.session_id,
                                id
                            );
                            inflight.discard = true;
                        }
                    }
                    self.enqueue(id, buffer);
                }
            },
            EngineState::Loading => {
                // Normal startup; the capture is transcribed the moment
                // the model lands
                tracing::debug!(
                    "Engine still loading, holding capture for session {}",
                    id
                );
                self.publisher
                    .publish(PipelineEvent::EngineUnavailable { session_id: id });
                self.enqueue(id, buffer);
            }
            EngineState::Uninitialized | EngineState::Failed => {
                tracing::warn!(
                    "Engine unavailable ({}), holding capture for session {}",
                    self.engine_state,
                    id
                );
                self.publisher
                    .publish(PipelineEvent::EngineUnavailable { session_id: id });
                self.enqueue(id, buffer);
            }
        }
    }

    /// Hold a capture for the engine. The wait policy queues in FIFO
    /// order; drop_and_warn keeps only the newest capture and publishes
    /// the superseded one
    fn enqueue(&mut self, id: SessionId, buffer: CaptureBuffer) {
        if let BackpressurePolicy::DropAndWarn = self.config.backpressure {
            if let Some((old_id, _)) = self.queued.pop_front() {
                tracing::warn!("Queued session {} superseded by {}", old_id, id);
                self.publish_outcome(
                    old_id,
                    SessionOutcome::Aborted {
                        reason: AbortReason::Superseded,
                    },
                );
            }
        }
        self.queued.push_back((id, buffer));
    }

    /// Hand a capture to the blocking transcription worker
    fn dispatch(&mut self, id: SessionId, buffer: CaptureBuffer) {
        let Some(engine) = self.engine.clone() else {
            // Ready without an engine instance cannot happen; treat the
            // session as failed rather than losing it silently
            tracing::error!("Engine state ready but no engine instance");
            self.publish_outcome(
                id,
                SessionOutcome::Failed {
                    error: EngineError::NotReady.to_string(),
                },
            );
            return;
        };

        self.set_engine_state(EngineState::Busy);
        self.inflight = Some(Inflight {
            session_id: id,
            discard: false,
        });

        let audio_secs = buffer.len() as f32 / buffer.sample_rate() as f32;
        let samples = buffer.into_samples();
        let job_tx = self.job_tx.clone();

        tracing::info!("Transcribing {:.1}s of audio (session {})", audio_secs, id);
        tokio::task::spawn_blocking(move || {
            let output = engine.transcribe(&samples);
            let _ = job_tx.blocking_send(JobDone {
                session_id: id,
                audio_secs,
                output,
            });
        });
    }

    fn on_job_done(&mut self, done: JobDone) -> Result<(), PipelineError> {
        let inflight = self.inflight.take().ok_or_else(|| {
            PipelineError::InvariantViolation(
                "transcription completed without an in-flight job".to_string(),
            )
        })?;
        if inflight.session_id != done.session_id {
            return Err(PipelineError::InvariantViolation(format!(
                "completion for session {} while {} was in flight",
                done.session_id, inflight.session_id
            )));
        }

        self.set_engine_state(EngineState::Ready);

        if inflight.discard {
            tracing::warn!("Discarding result of superseded session {}", done.session_id);
            self.publish_outcome(
                done.session_id,
                SessionOutcome::Aborted {
                    reason: AbortReason::Superseded,
                },
            );
        } else {
            match done.output {
                Ok(output) => {
                    self.consecutive_failures = 0;
                    let result = TranscriptionResult {
                        session_id: done.session_id,
                        text: output.text,
                        duration_secs: done.audio_secs,
                        confidence: output.confidence,
                        language: output.language,
                    };
                    self.publish_outcome(done.session_id, SessionOutcome::Transcribed(result));
                }
                Err(e) => {
                    tracing::error!("Transcription failed for session {}: {}", done.session_id, e);
                    self.consecutive_failures += 1;
                    self.publish_outcome(
                        done.session_id,
                        SessionOutcome::Failed {
                            error: e.to_string(),
                        },
                    );
                    if self.consecutive_failures >= self.config.failure_threshold {
                        tracing::error!(
                            "{} consecutive inference failures, taking engine out of service",
                            self.consecutive_failures
                        );
                        self.enter_degraded();
                    }
                }
            }
        }

        // Pick up the oldest queued capture if the engine survived
        if self.engine_state == EngineState::Ready {
            if let Some((id, buffer)) = self.queued.pop_front() {
                self.dispatch(id, buffer);
            }
        }

        Ok(())
    }

    /// Kick off a model load on the blocking pool. Idempotent while a
    /// load is running or an engine is available.
    fn begin_engine_load(&mut self) {
        if matches!(
            self.engine_state,
            EngineState::Loading | EngineState::Ready | EngineState::Busy
        ) {
            return;
        }
        self.retry_at = None;
        self.set_engine_state(EngineState::Loading);

        let loader = self.loader.clone();
        let load_tx = self.load_tx.clone();
        tokio::task::spawn_blocking(move || {
            let _ = load_tx.blocking_send(loader.load());
        });
    }

    fn on_engine_loaded(&mut self, loaded: Result<Box<dyn SpeechEngine>, EngineError>) {
        match loaded {
            Ok(engine) => {
                tracing::info!("Engine ready");
                self.engine = Some(Arc::from(engine));
                self.retry_backoff = self.config.retry_initial;
                self.retry_at = None;
                self.consecutive_failures = 0;
                self.set_engine_state(EngineState::Ready);

                // The oldest held capture goes first; the rest follow
                // as each job completes
                if let Some((id, buffer)) = self.queued.pop_front() {
                    tracing::info!("Transcribing held capture of session {}", id);
                    self.dispatch(id, buffer);
                }
            }
            Err(e) => {
                tracing::error!("Engine load failed: {}", e);
                self.set_engine_state(EngineState::Failed);
                tracing::warn!(
                    "Degraded mode: recording stays available, retrying load in {:.1}s",
                    self.retry_backoff.as_secs_f32()
                );
                self.retry_at = Some(Instant::now() + self.retry_backoff);
                self.retry_backoff = (self.retry_backoff * 2).min(self.config.retry_max);
            }
        }
    }

    /// Unload the engine after repeated runtime failures and schedule a
    /// reload
    fn enter_degraded(&mut self) {
        self.engine = None;
        self.set_engine_state(EngineState::Failed);
        self.retry_at = Some(Instant::now() + self.retry_backoff);
        self.retry_backoff = (self.retry_backoff * 2).min(self.config.retry_max);
    }

    fn set_engine_state(&mut self, state: EngineState) {
        if self.engine_state != state {
            tracing::debug!("Engine state: {} -> {}", self.engine_state, state);
            self.engine_state = state;
            self.publisher
                .publish(PipelineEvent::EngineStateChanged { state });
        }
    }

    fn finish_aborted(&mut self, id: SessionId, reason: AbortReason) {
        self.publish_outcome(id, SessionOutcome::Aborted { reason });
    }

    /// Push a terminal outcome through the sequencer and publish
    /// everything that is releasable in session order
    fn publish_outcome(&mut self, id: SessionId, outcome: SessionOutcome) {
        for (session_id, outcome) in self.sequencer.push(id, outcome) {
            let event = match outcome {
                SessionOutcome::Transcribed(result) => PipelineEvent::Transcribed(result),
                SessionOutcome::Failed { error } => {
                    PipelineEvent::SessionFailed { session_id, error }
                }
                SessionOutcome::Aborted { reason } => {
                    PipelineEvent::SessionAborted { session_id, reason }
                }
            };
            self.publisher.publish(event);
        }
    }

    /// Ordered teardown: abort the live recording, bound the wait on
    /// the in-flight job, release the engine last
    async fn shutdown(
        &mut self,
        source_rx: &mut Option<mpsc::Receiver<SourceEvent>>,
        job_rx: &mut mpsc::Receiver<JobDone>,
    ) {
        tracing::info!("Pipeline shutting down");

        if let Some(active) = self.active.take() {
            let ActiveSession {
                session,
                mut source,
            } = active;
            let _ = source.close().await;
            let id = session.id();
            let reason = session.abort(AbortReason::Shutdown);
            self.finish_aborted(id, reason);
        }
        *source_rx = None;

        // Nothing new gets dispatched below; retire the queued captures
        // so the sequencer can flush after the in-flight one lands
        while let Some((id, _)) = self.queued.pop_front() {
            self.finish_aborted(id, AbortReason::Shutdown);
        }

        if self.inflight.is_some() {
            match tokio::time::timeout(self.config.shutdown_timeout, job_rx.recv()).await {
                Ok(Some(done)) => {
                    if let Err(e) = self.on_job_done(done) {
                        tracing::warn!("Completion handling during shutdown failed: {}", e);
                    }
                }
                Ok(None) => {
                    tracing::warn!("Transcription worker disappeared during shutdown");
                }
                Err(_) => {
                    if let Some(inflight) = self.inflight.take() {
                        tracing::error!(
                            "Timed out after {:.0}s waiting for the in-flight transcription \
                             of session {}; abandoning it",
                            self.config.shutdown_timeout.as_secs_f32(),
                            inflight.session_id
                        );
                        self.publish_outcome(
                            inflight.session_id,
                            SessionOutcome::Failed {
                                error: "shutdown timed out waiting for the engine".to_string(),
                            },
                        );
                    }
                }
            }
        }

        self.engine = None;
        self.set_engine_state(EngineState::Uninitialized);
        tracing::info!("Pipeline stopped");
    }
}

/// Await the next event of the active audio stream, or pend forever if
/// no session is recording
async fn recv_source(rx: &mut Option<mpsc::Receiver<SourceEvent>>) -> Option<SourceEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
