//! Auto-play state machine
//!
//! The engine decides what a periodic tick should do and holds the timer
//! handles so that stopping aborts them. The controller owns the actual
//! commit path and the `selecting` lock.

use crate::candidates::CandidateBatch;
use crate::sampling;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A pick waiting out its visual-feedback delay
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSelection {
    pub token: String,
    /// Epoch of the batch the pick was drawn from
    pub epoch: u64,
    /// Identifies the feedback timer that will confirm this pick
    pub ticket: u64,
}

/// Snapshot of shared state taken at tick time
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub loading: bool,
    pub selecting: bool,
    pub batch: Option<&'a CandidateBatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickDecision {
    /// Engine is idle
    Stopped,
    /// Loading, or a selection is pending or being committed
    Busy,
    /// No active batch yet
    NeedCandidates,
    /// Every candidate is excluded or a repeat
    NothingEligible,
    /// Start the feedback delay for this pick
    Pick(PendingSelection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPlayMode {
    Idle,
    Running,
}

pub struct AutoPlayEngine {
    mode: AutoPlayMode,
    pending: Option<PendingSelection>,
    last_selected: Option<String>,
    next_ticket: u64,
    ticker: Option<JoinHandle<()>>,
    feedback: Option<JoinHandle<()>>,
    rng: StdRng,
}

impl AutoPlayEngine {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            mode: AutoPlayMode::Idle,
            pending: None,
            last_selected: None,
            next_ticket: 0,
            ticker: None,
            feedback: None,
            rng,
        }
    }

    pub fn is_running(&self) -> bool {
        self.mode == AutoPlayMode::Running
    }

    pub fn mode(&self) -> AutoPlayMode {
        self.mode
    }

    /// Idle -> Running. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.reset();
        self.mode = AutoPlayMode::Running;
        info!("Auto-play started");
        true
    }

    /// Running -> Idle. Aborts the tick and feedback timers and drops any pending pick.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        if let Some(pending) = &self.pending {
            debug!(token = %pending.token, "Abandoning pending selection");
        }
        self.reset();
        info!("Auto-play stopped");
        true
    }

    fn reset(&mut self) {
        self.mode = AutoPlayMode::Idle;
        self.pending = None;
        self.last_selected = None;
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(feedback) = self.feedback.take() {
            feedback.abort();
        }
    }

    pub fn attach_ticker(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.ticker.replace(handle) {
            old.abort();
        }
    }

    pub fn attach_feedback(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.feedback.replace(handle) {
            old.abort();
        }
    }

    /// Decide what this tick does. A `Pick` is recorded as the pending selection.
    pub fn tick(&mut self, input: TickInput<'_>) -> TickDecision {
        if !self.is_running() {
            return TickDecision::Stopped;
        }
        if input.loading || input.selecting || self.pending.is_some() {
            return TickDecision::Busy;
        }
        let Some(batch) = input.batch else {
            return TickDecision::NeedCandidates;
        };

        let pool = sampling::eligible(&batch.candidates, self.last_selected.as_deref());
        let Some(choice) = sampling::sample(&pool, &mut self.rng) else {
            return TickDecision::NothingEligible;
        };

        self.next_ticket += 1;
        let pending = PendingSelection {
            token: choice.token.clone(),
            epoch: batch.epoch,
            ticket: self.next_ticket,
        };
        debug!(token = %pending.token, epoch = pending.epoch, "Auto-play picked");
        self.pending = Some(pending.clone());
        TickDecision::Pick(pending)
    }

    /// Resolve the pending pick after its feedback delay.
    ///
    /// Returns the token to commit, or `None` if the pick is no longer valid. The pending
    /// pick is cleared either way unless `ticket` belongs to a different pick.
    pub fn confirm(&mut self, ticket: u64, input: TickInput<'_>) -> Option<String> {
        if !self.is_running() {
            return None;
        }
        match &self.pending {
            Some(pending) if pending.ticket == ticket => {}
            _ => return None,
        }
        let pending = self.pending.take()?;
        self.feedback = None;

        let batch_epoch = input.batch.map(|b| b.epoch);
        if input.loading || input.selecting || batch_epoch != Some(pending.epoch) {
            debug!(
                token = %pending.token,
                pick_epoch = pending.epoch,
                batch_epoch = ?batch_epoch,
                "Discarding pending selection"
            );
            return None;
        }
        Some(pending.token)
    }

    pub fn pending(&self) -> Option<&PendingSelection> {
        self.pending.as_ref()
    }

    pub fn record_selected(&mut self, token: &str) {
        self.last_selected = Some(token.to_string());
    }

    pub fn last_selected(&self) -> Option<&str> {
        self.last_selected.as_deref()
    }
}

impl Default for AutoPlayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AutoPlayEngine {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(feedback) = self.feedback.take() {
            feedback.abort();
        }
    }
}
