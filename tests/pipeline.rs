//! End-to-end tests of the pipeline coordinator using mock sources and
//! engines. These exercise the session lifecycle, result ordering,
//! backpressure policies, device failure handling, and degraded mode
//! without touching real audio hardware or a whisper model.

use async_trait::async_trait;
use holdtype::audio::{AudioBlock, AudioSource, SourceEvent, SourceFactory, SourceStats};
use holdtype::config::{ActivationMode, BackpressurePolicy, OverlapPolicy};
use holdtype::engine::{EngineLoader, EngineOutput, EngineState, SpeechEngine};
use holdtype::error::{AudioError, EngineError, PipelineError};
use holdtype::hotkey::HotkeyEvent;
use holdtype::pipeline::events::{EventPublisher, PipelineEvent};
use holdtype::pipeline::{CoordinatorConfig, PipelineCoordinator, PipelineHandle};
use holdtype::session::{AbortReason, SessionId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

/// Source that delivers a fixed number of pre-queued blocks per session
struct MockSource {
    blocks: u64,
    block_samples: usize,
    fail_stream: bool,
    open_now: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    opened: bool,
    // Keeps the event channel alive until close(), like a real device
    hold: Option<mpsc::Sender<SourceEvent>>,
}

#[async_trait]
impl AudioSource for MockSource {
    async fn open(&mut self) -> Result<mpsc::Receiver<SourceEvent>, AudioError> {
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);
        self.opened = true;

        let (tx, rx) = mpsc::channel(self.blocks as usize + 4);
        for seq in 0..self.blocks {
            let _ = tx.try_send(SourceEvent::Block(AudioBlock {
                seq,
                captured_at: Instant::now(),
                samples: vec![0.1; self.block_samples],
            }));
        }
        if self.fail_stream {
            let _ = tx.try_send(SourceEvent::Failed(AudioError::Stream(
                "mock device lost".to_string(),
            )));
        }
        self.hold = Some(tx);
        Ok(rx)
    }

    async fn close(&mut self) -> Result<SourceStats, AudioError> {
        if self.opened {
            self.open_now.fetch_sub(1, Ordering::SeqCst);
            self.opened = false;
        }
        self.hold = None;
        Ok(SourceStats::default())
    }
}

#[derive(Clone)]
struct MockSourceFactory {
    blocks: u64,
    block_samples: usize,
    open_now: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    fail_first_stream: Arc<AtomicBool>,
}

impl MockSourceFactory {
    fn new(blocks: u64, block_samples: usize) -> Arc<Self> {
        Arc::new(Self {
            blocks,
            block_samples,
            open_now: Arc::new(AtomicUsize::new(0)),
            max_open: Arc::new(AtomicUsize::new(0)),
            fail_first_stream: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl SourceFactory for MockSourceFactory {
    fn create(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(MockSource {
            blocks: self.blocks,
            block_samples: self.block_samples,
            fail_stream: self.fail_first_stream.swap(false, Ordering::SeqCst),
            open_now: self.open_now.clone(),
            max_open: self.max_open.clone(),
            opened: false,
            hold: None,
        }))
    }
}

/// Source that streams blocks on a timer until closed, like a live
/// device
struct StreamingSource {
    cadence: Duration,
    block_samples: usize,
    stop: Option<tokio::sync::oneshot::Sender<()>>,
}

#[async_trait]
impl AudioSource for StreamingSource {
    async fn open(&mut self) -> Result<mpsc::Receiver<SourceEvent>, AudioError> {
        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop = Some(stop_tx);
        let cadence = self.cadence;
        let block_samples = self.block_samples;
        tokio::spawn(async move {
            let mut seq = 0u64;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(cadence) => {
                        let block = AudioBlock {
                            seq,
                            captured_at: Instant::now(),
                            samples: vec![0.1; block_samples],
                        };
                        seq += 1;
                        if tx.send(SourceEvent::Block(block)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn close(&mut self) -> Result<SourceStats, AudioError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        Ok(SourceStats::default())
    }
}

struct StreamingSourceFactory {
    cadence: Duration,
    block_samples: usize,
}

impl SourceFactory for StreamingSourceFactory {
    fn create(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(StreamingSource {
            cadence: self.cadence,
            block_samples: self.block_samples,
            stop: None,
        }))
    }
}

/// Factory standing in for a missing or unopenable microphone
struct FailingSourceFactory;

impl SourceFactory for FailingSourceFactory {
    fn create(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        Err(AudioError::DeviceNotFound("mock mic".to_string()))
    }
}

struct MockEngine {
    delay: Duration,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl SpeechEngine for MockEngine {
    fn transcribe(&self, samples: &[f32]) -> Result<EngineOutput, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(EngineError::Runtime("mock inference failure".to_string()));
        }
        Ok(EngineOutput {
            text: format!("{} samples", samples.len()),
            confidence: 0.9,
            language: "en".to_string(),
        })
    }
}

#[derive(Clone)]
struct MockLoader {
    delay: Duration,
    load_delay: Duration,
    fail: bool,
    calls: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
    fail_loads_remaining: Arc<AtomicUsize>,
}

impl MockLoader {
    fn new() -> Arc<Self> {
        Arc::new(Self::unwrapped())
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::unwrapped()
        })
    }

    fn slow_loading(load_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            load_delay,
            ..Self::unwrapped()
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::unwrapped()
        })
    }

    fn unwrapped() -> Self {
        Self {
            delay: Duration::ZERO,
            load_delay: Duration::ZERO,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            loads: Arc::new(AtomicUsize::new(0)),
            fail_loads_remaining: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl EngineLoader for MockLoader {
    fn load(&self) -> Result<Box<dyn SpeechEngine>, EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        if self
            .fail_loads_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EngineError::Load("mock load failure".to_string()));
        }
        Ok(Box::new(MockEngine {
            delay: self.delay,
            fail: self.fail,
            calls: self.calls.clone(),
        }))
    }
}

fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        sample_rate: 16000,
        min_duration: Duration::from_millis(150),
        max_duration: Duration::from_secs(60),
        gap_tolerance_blocks: 2,
        activation_mode: ActivationMode::PushToTalk,
        overlap_policy: OverlapPolicy::Ignore,
        backpressure: BackpressurePolicy::Wait,
        failure_threshold: 3,
        retry_initial: Duration::from_millis(20),
        retry_max: Duration::from_millis(100),
        shutdown_timeout: Duration::from_secs(2),
    }
}

struct Harness {
    handle: PipelineHandle,
    events: broadcast::Receiver<PipelineEvent>,
    task: tokio::task::JoinHandle<Result<(), PipelineError>>,
    publisher: EventPublisher,
}

impl Harness {
    fn start(
        config: CoordinatorConfig,
        sources: Arc<dyn SourceFactory>,
        loader: Arc<dyn EngineLoader>,
    ) -> Self {
        let publisher = EventPublisher::new(512);
        let events = publisher.subscribe();
        let (coordinator, handle) =
            PipelineCoordinator::new(config, sources, loader, publisher.clone());
        let task = tokio::spawn(coordinator.run());
        Self {
            handle,
            events,
            task,
            publisher,
        }
    }

    async fn press(&self) {
        self.handle.trigger(HotkeyEvent::Pressed).await;
    }

    async fn release(&self) {
        self.handle.trigger(HotkeyEvent::Released).await;
    }

    /// Wait for the first event the predicate maps to Some, skipping
    /// the rest
    async fn wait_for<T>(&mut self, mut pred: impl FnMut(&PipelineEvent) -> Option<T>) -> T {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("timed out waiting for pipeline event")
                .expect("event channel closed");
            if let Some(value) = pred(&event) {
                return value;
            }
        }
    }

    async fn wait_transcribed(&mut self) -> (SessionId, String) {
        self.wait_for(|event| match event {
            PipelineEvent::Transcribed(result) => Some((result.session_id, result.text.clone())),
            _ => None,
        })
        .await
    }

    async fn shutdown(mut self) -> Vec<PipelineEvent> {
        self.handle.shutdown().await;
        self.task
            .await
            .expect("pipeline task panicked")
            .expect("pipeline failed");
        drop(self.handle);
        drop(self.publisher);

        // Drain everything that is still buffered in the ring
        let mut remaining = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => remaining.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        remaining
    }
}

#[tokio::test]
async fn test_press_release_produces_transcription() {
    // 5 blocks x 1600 samples = 0.5s of audio, past the minimum
    let sources = MockSourceFactory::new(5, 1600);
    let loader = MockLoader::new();
    let mut harness = Harness::start(test_config(), sources.clone(), loader.clone());

    harness.press().await;
    let started = harness
        .wait_for(|event| match event {
            PipelineEvent::SessionStarted { session_id } => Some(*session_id),
            _ => None,
        })
        .await;
    assert_eq!(started, SessionId(1));

    harness.release().await;
    let (id, text) = harness.wait_transcribed().await;
    assert_eq!(id, SessionId(1));
    assert_eq!(text, "8000 samples");

    harness.shutdown().await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(sources.max_open.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_short_capture_never_reaches_engine() {
    // 1 block x 800 samples = 50ms, under the 150ms minimum
    let sources = MockSourceFactory::new(1, 800);
    let loader = MockLoader::new();
    let mut harness = Harness::start(test_config(), sources, loader.clone());

    harness.press().await;
    harness.release().await;

    let reason = harness
        .wait_for(|event| match event {
            PipelineEvent::SessionAborted { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .await;
    assert!(matches!(reason, AbortReason::TooShort { .. }));

    harness.shutdown().await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_results_publish_in_session_order_with_busy_engine() {
    let sources = MockSourceFactory::new(5, 1600);
    let loader = MockLoader::slow(Duration::from_millis(150));
    let mut harness = Harness::start(test_config(), sources.clone(), loader);

    // First session goes straight to the engine
    harness.press().await;
    harness.release().await;
    harness
        .wait_for(|event| match event {
            PipelineEvent::EngineStateChanged {
                state: EngineState::Busy,
            } => Some(()),
            _ => None,
        })
        .await;

    // Second session completes while the engine is busy and waits in
    // the queue slot
    harness.press().await;
    harness.release().await;

    let (first, _) = harness.wait_transcribed().await;
    let (second, _) = harness.wait_transcribed().await;
    assert_eq!(first, SessionId(1));
    assert_eq!(second, SessionId(2));

    harness.shutdown().await;
    assert_eq!(sources.max_open.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_device_failure_aborts_session_then_next_one_works() {
    let sources = MockSourceFactory::new(3, 1600);
    sources.fail_first_stream.store(true, Ordering::SeqCst);
    let loader = MockLoader::new();
    let mut harness = Harness::start(test_config(), sources.clone(), loader);

    harness.press().await;
    let (id, reason) = harness
        .wait_for(|event| match event {
            PipelineEvent::SessionAborted { session_id, reason } => {
                Some((*session_id, reason.clone()))
            }
            _ => None,
        })
        .await;
    assert_eq!(id, SessionId(1));
    assert!(matches!(reason, AbortReason::Device(_)));

    // Stale release for the dead session is ignored
    harness.release().await;

    // A fresh session on a healthy device transcribes normally
    harness.press().await;
    harness.release().await;
    let (id, _) = harness.wait_transcribed().await;
    assert_eq!(id, SessionId(2));

    harness.shutdown().await;
    assert_eq!(sources.open_now.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_engine_load_failure_degrades_and_recovers() {
    let sources = MockSourceFactory::new(5, 1600);
    let loader = MockLoader::new();
    loader.fail_loads_remaining.store(1, Ordering::SeqCst);
    let mut harness = Harness::start(test_config(), sources, loader.clone());

    harness
        .wait_for(|event| match event {
            PipelineEvent::EngineStateChanged {
                state: EngineState::Failed,
            } => Some(()),
            _ => None,
        })
        .await;

    // Recording still works in degraded mode; the capture is held
    harness.press().await;
    harness.release().await;
    let held = harness
        .wait_for(|event| match event {
            PipelineEvent::EngineUnavailable { session_id } => Some(*session_id),
            _ => None,
        })
        .await;
    assert_eq!(held, SessionId(1));

    // The backoff retry loads the engine and the held capture is
    // transcribed
    let (id, _) = harness.wait_transcribed().await;
    assert_eq!(id, SessionId(1));
    assert!(loader.loads.load(Ordering::SeqCst) >= 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_repeated_inference_failures_take_engine_out_of_service() {
    let sources = MockSourceFactory::new(5, 1600);
    let loader = MockLoader::failing();
    let mut config = test_config();
    config.failure_threshold = 2;
    // Slow retries down so the degraded state is observable
    config.retry_initial = Duration::from_secs(30);
    let mut harness = Harness::start(config, sources, loader.clone());

    for expected in 1..=2u64 {
        harness.press().await;
        harness.release().await;
        let id = harness
            .wait_for(|event| match event {
                PipelineEvent::SessionFailed { session_id, .. } => Some(*session_id),
                _ => None,
            })
            .await;
        assert_eq!(id, SessionId(expected));
    }

    harness
        .wait_for(|event| match event {
            PipelineEvent::EngineStateChanged {
                state: EngineState::Failed,
            } => Some(()),
            _ => None,
        })
        .await;

    harness.shutdown().await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_drop_and_warn_supersedes_inflight_result() {
    let sources = MockSourceFactory::new(5, 1600);
    let loader = MockLoader::slow(Duration::from_millis(200));
    let mut config = test_config();
    config.backpressure = BackpressurePolicy::DropAndWarn;
    let mut harness = Harness::start(config, sources, loader);

    harness.press().await;
    harness.release().await;
    harness
        .wait_for(|event| match event {
            PipelineEvent::EngineStateChanged {
                state: EngineState::Busy,
            } => Some(()),
            _ => None,
        })
        .await;

    // Completing a second capture while busy discards the in-flight
    // result, audibly: session 1 ends as superseded
    harness.press().await;
    harness.release().await;

    let (id, reason) = harness
        .wait_for(|event| match event {
            PipelineEvent::SessionAborted { session_id, reason } => {
                Some((*session_id, reason.clone()))
            }
            _ => None,
        })
        .await;
    assert_eq!(id, SessionId(1));
    assert_eq!(reason, AbortReason::Superseded);

    let (id, _) = harness.wait_transcribed().await;
    assert_eq!(id, SessionId(2));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_queue_overlap_policy_starts_next_session_on_stop() {
    let sources = MockSourceFactory::new(5, 1600);
    let loader = MockLoader::new();
    let mut config = test_config();
    config.overlap_policy = OverlapPolicy::Queue;
    let mut harness = Harness::start(config, sources.clone(), loader);

    harness.press().await;
    // Second press while recording is remembered, not acted on
    harness.press().await;
    harness.release().await;

    // Session 2 starts the moment session 1 stops
    harness
        .wait_for(|event| match event {
            PipelineEvent::SessionStarted {
                session_id: SessionId(2),
            } => Some(()),
            _ => None,
        })
        .await;

    harness.release().await;
    let (first, _) = harness.wait_transcribed().await;
    let (second, _) = harness.wait_transcribed().await;
    assert_eq!(first, SessionId(1));
    assert_eq!(second, SessionId(2));

    harness.shutdown().await;
    assert_eq!(sources.max_open.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_toggle_mode_press_press_cycle() {
    let sources = MockSourceFactory::new(5, 1600);
    let loader = MockLoader::new();
    let mut config = test_config();
    config.activation_mode = ActivationMode::Toggle;
    let mut harness = Harness::start(config, sources, loader);

    harness.press().await;
    // Releases are ignored in toggle mode
    harness.release().await;
    harness.press().await;

    let (id, _) = harness.wait_transcribed().await;
    assert_eq!(id, SessionId(1));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_max_duration_cap_fires_while_blocks_keep_arriving() {
    // Live source at a 20ms block cadence; the key is never released.
    // The cap must force-finalize even though audio events keep the
    // select loop busy.
    let sources = Arc::new(StreamingSourceFactory {
        cadence: Duration::from_millis(20),
        block_samples: 320,
    });
    let loader = MockLoader::new();
    let mut config = test_config();
    config.max_duration = Duration::from_millis(300);
    config.min_duration = Duration::from_millis(50);
    let mut harness = Harness::start(config, sources, loader);

    harness.press().await;
    let (id, _) = harness.wait_transcribed().await;
    assert_eq!(id, SessionId(1));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_captures_completed_during_engine_load_all_transcribe() {
    let sources = MockSourceFactory::new(5, 1600);
    let loader = MockLoader::slow_loading(Duration::from_millis(300));
    let mut harness = Harness::start(test_config(), sources, loader);

    // Two full captures finish before the model load lands. Under the
    // wait policy neither may be discarded.
    harness.press().await;
    harness.release().await;
    harness.press().await;
    harness.release().await;

    let (first, _) = harness.wait_transcribed().await;
    let (second, _) = harness.wait_transcribed().await;
    assert_eq!(first, SessionId(1));
    assert_eq!(second, SessionId(2));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_unopenable_device_publishes_aborted_session() {
    let loader = MockLoader::new();
    let mut harness = Harness::start(test_config(), Arc::new(FailingSourceFactory), loader);

    // The press must surface to subscribers even though no stream ever
    // opened
    harness.press().await;
    let started = harness
        .wait_for(|event| match event {
            PipelineEvent::SessionStarted { session_id } => Some(*session_id),
            _ => None,
        })
        .await;
    assert_eq!(started, SessionId(1));
    let (id, reason) = harness
        .wait_for(|event| match event {
            PipelineEvent::SessionAborted { session_id, reason } => {
                Some((*session_id, reason.clone()))
            }
            _ => None,
        })
        .await;
    assert_eq!(id, SessionId(1));
    assert!(matches!(reason, AbortReason::Device(_)));

    // The daemon keeps accepting triggers afterwards
    harness.release().await;
    harness.press().await;
    let started = harness
        .wait_for(|event| match event {
            PipelineEvent::SessionStarted { session_id } => Some(*session_id),
            _ => None,
        })
        .await;
    assert_eq!(started, SessionId(2));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_random_interleaving_preserves_invariants() {
    use rand::Rng;

    let sources = MockSourceFactory::new(5, 1600);
    let loader = MockLoader::new();
    let mut harness = Harness::start(test_config(), sources.clone(), loader);

    let mut rng = rand::thread_rng();
    for _ in 0..40 {
        if rng.gen_bool(0.5) {
            harness.press().await;
        } else {
            harness.release().await;
        }
        if rng.gen_bool(0.3) {
            tokio::time::sleep(Duration::from_millis(rng.gen_range(0..5))).await;
        }
    }
    harness.release().await;
    // Let in-flight work settle before shutdown collects the rest
    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = harness.shutdown().await;

    // Never more than one source open at a time, and none leaked
    assert!(sources.max_open.load(Ordering::SeqCst) <= 1);
    assert_eq!(sources.open_now.load(Ordering::SeqCst), 0);

    // Exactly one terminal outcome per started session, published in
    // session order
    let mut started = Vec::new();
    let mut terminal = Vec::new();
    for event in &events {
        match event {
            PipelineEvent::SessionStarted { session_id } => started.push(session_id.0),
            PipelineEvent::Transcribed(result) => terminal.push(result.session_id.0),
            PipelineEvent::SessionAborted { session_id, .. }
            | PipelineEvent::SessionFailed { session_id, .. } => terminal.push(session_id.0),
            _ => {}
        }
    }
    assert_eq!(started.len(), terminal.len());
    let expected: Vec<u64> = (1..=terminal.len() as u64).collect();
    assert_eq!(started, expected);
    assert_eq!(terminal, expected);
}
