//! Session-ordered result publication
//!
//! Transcription work is dispatched to a worker and can in principle
//! complete out of order relative to session creation. Subscribers are
//! promised outcomes in session order, so the sequencer buffers any
//! outcome that arrives before its predecessor has been released.
//!
//! Every session produces exactly one terminal outcome (a result, a
//! failure, or an abort), so session ids released here are dense and
//! the cursor advances one id at a time.

use crate::engine::TranscriptionResult;
use crate::session::{AbortReason, SessionId};
use std::collections::BTreeMap;

/// Terminal outcome of one session
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Transcribed(TranscriptionResult),
    Failed { error: String },
    Aborted { reason: AbortReason },
}

/// Reorder buffer keyed by session id
#[derive(Debug)]
pub struct ResultSequencer {
    /// Next session id allowed to publish
    next: u64,
    /// Outcomes waiting for a predecessor
    pending: BTreeMap<u64, SessionOutcome>,
}

impl ResultSequencer {
    /// `first_id` is the id the first created session will get
    pub fn new(first_id: u64) -> Self {
        Self {
            next: first_id,
            pending: BTreeMap::new(),
        }
    }

    /// Record a terminal outcome and return every outcome that is now
    /// releasable, in session order.
    pub fn push(&mut self, id: SessionId, outcome: SessionOutcome) -> Vec<(SessionId, SessionOutcome)> {
        debug_assert!(
            id.0 >= self.next,
            "outcome for session {} arrived twice",
            id
        );
        self.pending.insert(id.0, outcome);

        let mut ready = Vec::new();
        while let Some(outcome) = self.pending.remove(&self.next) {
            ready.push((SessionId(self.next), outcome));
            self.next += 1;
        }

        if !self.pending.is_empty() {
            tracing::debug!(
                "Holding {} out-of-order outcome(s), waiting for session #{}",
                self.pending.len(),
                self.next
            );
        }

        ready
    }

    /// Number of outcomes waiting on a predecessor
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
