//! Recording session lifecycle
//!
//! A [`CaptureSession`] owns exactly one recording: it accumulates
//! [`AudioBlock`]s into a [`CaptureBuffer`] while the trigger is held,
//! and is consumed by value on finalize. The buffer is handed to the
//! coordinator only when validation passes; an aborted session never
//! produces a partial result.
//!
//! Sessions hold no reference to each other. Only the coordinator
//! creates them, and it holds at most one at a time.

use crate::audio::AudioBlock;
use std::fmt;
use std::time::{Duration, Instant};

/// Monotonically increasing recording session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle states of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Recording,
    Finalizing,
    Completed,
    Aborted,
}

/// Why a session ended without producing a transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Capture was shorter than the configured minimum
    TooShort { millis: u64, min_millis: u64 },
    /// More device blocks were dropped than the configured tolerance
    GappedCapture { dropped: u64, tolerance: u64 },
    /// The audio device failed mid-recording
    Device(String),
    /// A newer capture replaced this one before it could be transcribed
    Superseded,
    /// The pipeline shut down before this session could finish
    Shutdown,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::TooShort { millis, min_millis } => {
                write!(f, "capture too short ({}ms < {}ms)", millis, min_millis)
            }
            AbortReason::GappedCapture { dropped, tolerance } => {
                write!(
                    f,
                    "capture lost {} blocks (tolerance {})",
                    dropped, tolerance
                )
            }
            AbortReason::Device(e) => write!(f, "audio device failed: {}", e),
            AbortReason::Superseded => write!(f, "superseded by a newer recording"),
            AbortReason::Shutdown => write!(f, "pipeline shut down"),
        }
    }
}

/// Sample accumulator owned by exactly one session.
/// Immutable after the session hands it to the coordinator.
#[derive(Debug)]
pub struct CaptureBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    next_seq: u64,
    dropped_blocks: u64,
}

impl CaptureBuffer {
    fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            next_seq: 0,
            dropped_blocks: 0,
        }
    }

    /// Append a block, recording any sequence gap as dropped blocks
    fn push_block(&mut self, block: &AudioBlock) {
        if block.seq > self.next_seq {
            let missed = block.seq - self.next_seq;
            self.dropped_blocks += missed;
            tracing::debug!(
                "Capture gap: expected block {}, got {} ({} missed)",
                self.next_seq,
                block.seq,
                missed
            );
        }
        self.next_seq = block.seq + 1;
        self.samples.extend_from_slice(&block.samples);
    }

    /// Duration of accumulated audio
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consume the buffer, yielding the samples for inference
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Result of finalizing a session
#[derive(Debug)]
pub enum FinalizeOutcome {
    /// Validation passed; buffer ownership transfers to the coordinator
    Completed(CaptureBuffer),
    /// Validation failed; no audio leaves the session
    Aborted(AbortReason),
}

/// One active recording
#[derive(Debug)]
pub struct CaptureSession {
    id: SessionId,
    state: SessionState,
    buffer: CaptureBuffer,
    started_at: Instant,
}

impl CaptureSession {
    pub fn new(id: SessionId, sample_rate: u32) -> Self {
        Self {
            id,
            state: SessionState::Recording,
            buffer: CaptureBuffer::new(sample_rate),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Accept a block from the device while recording
    pub fn push_block(&mut self, block: &AudioBlock) {
        debug_assert_eq!(self.state, SessionState::Recording);
        self.buffer.push_block(block);
    }

    /// Validate and finish the session, consuming it.
    ///
    /// Too-short or too-gappy captures abort here so the engine never
    /// sees spurious single-keystroke noise or corrupted audio.
    pub fn finalize(mut self, min_duration: Duration, gap_tolerance: u64) -> FinalizeOutcome {
        self.state = SessionState::Finalizing;

        let duration = self.buffer.duration();
        if duration < min_duration {
            tracing::debug!(
                "Session {} too short ({:.0}ms), aborting",
                self.id,
                duration.as_secs_f64() * 1000.0
            );
            return FinalizeOutcome::Aborted(AbortReason::TooShort {
                millis: duration.as_millis() as u64,
                min_millis: min_duration.as_millis() as u64,
            });
        }

        if self.buffer.dropped_blocks > gap_tolerance {
            tracing::warn!(
                "Session {} dropped {} blocks (tolerance {}), aborting",
                self.id,
                self.buffer.dropped_blocks,
                gap_tolerance
            );
            return FinalizeOutcome::Aborted(AbortReason::GappedCapture {
                dropped: self.buffer.dropped_blocks,
                tolerance: gap_tolerance,
            });
        }

        self.state = SessionState::Completed;
        FinalizeOutcome::Completed(self.buffer)
    }

    /// Abort the session with a cause, consuming it
    pub fn abort(mut self, reason: AbortReason) -> AbortReason {
        self.state = SessionState::Aborted;
        tracing::debug!("Session {} aborted: {}", self.id, reason);
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(seq: u64, n: usize) -> AudioBlock {
        AudioBlock {
            seq,
            captured_at: Instant::now(),
            samples: vec![0.1; n],
        }
    }

    #[test]
    fn test_contiguous_blocks_have_no_gap() {
        let mut session = CaptureSession::new(SessionId(1), 16000);
        for seq in 0..5 {
            session.push_block(&block(seq, 1600));
        }
        match session.finalize(Duration::from_millis(150), 0) {
            FinalizeOutcome::Completed(buf) => {
                assert_eq!(buf.len(), 8000);
                assert_eq!(buf.dropped_blocks(), 0);
                assert_eq!(buf.duration(), Duration::from_millis(500));
            }
            FinalizeOutcome::Aborted(r) => panic!("unexpected abort: {}", r),
        }
    }

    #[test]
    fn test_seq_gap_recorded_as_dropped_blocks() {
        let mut session = CaptureSession::new(SessionId(1), 16000);
        session.push_block(&block(0, 1600));
        session.push_block(&block(3, 1600)); // blocks 1 and 2 lost
        session.push_block(&block(4, 1600));

        match session.finalize(Duration::from_millis(150), 5) {
            FinalizeOutcome::Completed(buf) => assert_eq!(buf.dropped_blocks(), 2),
            FinalizeOutcome::Aborted(r) => panic!("unexpected abort: {}", r),
        }
    }

    #[test]
    fn test_gap_over_tolerance_aborts() {
        let mut session = CaptureSession::new(SessionId(1), 16000);
        session.push_block(&block(0, 1600));
        session.push_block(&block(4, 1600));
        session.push_block(&block(5, 1600));

        match session.finalize(Duration::from_millis(150), 2) {
            FinalizeOutcome::Aborted(AbortReason::GappedCapture { dropped, tolerance }) => {
                assert_eq!(dropped, 3);
                assert_eq!(tolerance, 2);
            }
            other => panic!("expected gapped abort, got {:?}", other),
        }
    }

    #[test]
    fn test_short_capture_aborts() {
        let mut session = CaptureSession::new(SessionId(1), 16000);
        // 50ms of audio at 16kHz
        session.push_block(&block(0, 800));

        match session.finalize(Duration::from_millis(150), 2) {
            FinalizeOutcome::Aborted(AbortReason::TooShort { millis, min_millis }) => {
                assert_eq!(millis, 50);
                assert_eq!(min_millis, 150);
            }
            other => panic!("expected too-short abort, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_capture_aborts_as_too_short() {
        let session = CaptureSession::new(SessionId(1), 16000);
        assert!(matches!(
            session.finalize(Duration::from_millis(150), 2),
            FinalizeOutcome::Aborted(AbortReason::TooShort { .. })
        ));
    }
}
