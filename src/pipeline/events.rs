//! Pipeline event stream for subscribers
//!
//! Subscribers (text sinks, state file, notifications) receive events
//! over a bounded broadcast ring. Publication is fire-and-forget: a
//! slow subscriber lags and loses the oldest events rather than ever
//! blocking the coordinator.

use crate::engine::{EngineState, TranscriptionResult};
use crate::session::{AbortReason, SessionId};
use tokio::sync::broadcast;

/// Events published by the pipeline coordinator
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A recording session started
    SessionStarted { session_id: SessionId },
    /// A session ended without producing a transcription
    SessionAborted {
        session_id: SessionId,
        reason: AbortReason,
    },
    /// A session's transcription failed in the engine
    SessionFailed {
        session_id: SessionId,
        error: String,
    },
    /// A session was transcribed
    Transcribed(TranscriptionResult),
    /// A capture was accepted while the engine is unavailable; it is
    /// held and will be transcribed, superseded, or aborted later
    EngineUnavailable { session_id: SessionId },
    /// The engine slot changed state
    EngineStateChanged { state: EngineState },
}

/// Broadcast-based event publisher
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new subscriber. The receiver sees events published
    /// after this call; on lag it loses the oldest events and should
    /// log the fact once.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: PipelineEvent) {
        tracing::trace!("Publishing {:?}", event);
        let _ = self.tx.send(event);
    }
}
