//! Active candidate batch and its fetch bookkeeping

use crate::epoch::{Channel, EpochTracker};
use crate::gateway::{Candidate, GatewayError};
use tracing::{debug, warn};

/// Candidates produced by one completed fetch, in rank order
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBatch {
    pub epoch: u64,
    pub candidates: Vec<Candidate>,
}

impl CandidateBatch {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// What happened to a completed fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Became the active batch
    Applied,
    /// A newer fetch was issued; result dropped
    Stale,
    /// Gateway failed
    Failed { consecutive_errors: u32, message: String },
}

#[derive(Debug, Default)]
pub struct CandidateSession {
    active: Option<CandidateBatch>,
    loading: bool,
    consecutive_errors: u32,
}

impl CandidateSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a fetch as started and issue its epoch
    pub fn begin_fetch(&mut self, epochs: &mut EpochTracker) -> u64 {
        self.loading = true;
        let epoch = epochs.next_epoch(Channel::Candidates);
        debug!(epoch, "Candidate fetch issued");
        epoch
    }

    /// Record the result of the fetch tagged `epoch`
    pub fn complete_fetch(
        &mut self,
        epochs: &EpochTracker,
        epoch: u64,
        result: Result<Vec<Candidate>, GatewayError>,
    ) -> FetchOutcome {
        // Loading tracks the latest issued fetch only; an older completion leaves it set
        if epochs.is_current(Channel::Candidates, epoch) {
            self.loading = false;
        }

        match result {
            Ok(candidates) => {
                self.consecutive_errors = 0;
                if epochs.is_current(Channel::Candidates, epoch) {
                    debug!(epoch, count = candidates.len(), "Candidate batch applied");
                    self.active = Some(CandidateBatch { epoch, candidates });
                    FetchOutcome::Applied
                } else {
                    debug!(
                        epoch,
                        latest = epochs.latest(Channel::Candidates),
                        "Discarding stale candidate batch"
                    );
                    FetchOutcome::Stale
                }
            }
            Err(e) => {
                self.consecutive_errors += 1;
                warn!(epoch, consecutive = self.consecutive_errors, error = %e, "Candidate fetch failed");
                FetchOutcome::Failed {
                    consecutive_errors: self.consecutive_errors,
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn active(&self) -> Option<&CandidateBatch> {
        self.active.as_ref()
    }

    pub fn active_epoch(&self) -> Option<u64> {
        self.active.as_ref().map(|batch| batch.epoch)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn reset_errors(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Token at display rank `rank` in the active batch
    pub fn token_at(&self, rank: usize) -> Option<&str> {
        self.active
            .as_ref()
            .and_then(|batch| batch.candidates.get(rank))
            .map(|c| c.token.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(tokens: &[&str]) -> Vec<Candidate> {
        tokens.iter().map(|t| Candidate::new(*t, 50.0)).collect()
    }

    #[test]
    fn test_out_of_order_responses_keep_latest() {
        let mut epochs = EpochTracker::new();
        let mut session = CandidateSession::new();

        let first = session.begin_fetch(&mut epochs);
        let second = session.begin_fetch(&mut epochs);

        let outcome = session.complete_fetch(&epochs, second, Ok(batch(&[" b"])));
        assert_eq!(outcome, FetchOutcome::Applied);
        let outcome = session.complete_fetch(&epochs, first, Ok(batch(&[" a"])));
        assert_eq!(outcome, FetchOutcome::Stale);

        assert_eq!(session.active_epoch(), Some(second));
        assert_eq!(session.token_at(0), Some(" b"));
        assert!(!session.is_loading());
    }

    #[test]
    fn test_errors_count_and_reset_on_success() {
        let mut epochs = EpochTracker::new();
        let mut session = CandidateSession::new();

        for expected in 1..=2 {
            let e = session.begin_fetch(&mut epochs);
            let outcome = session.complete_fetch(
                &epochs,
                e,
                Err(GatewayError::Remote { status: 500, detail: "down".into() }),
            );
            assert!(matches!(
                outcome,
                FetchOutcome::Failed { consecutive_errors, .. } if consecutive_errors == expected
            ));
        }
        assert!(session.active().is_none());

        let e = session.begin_fetch(&mut epochs);
        session.complete_fetch(&epochs, e, Ok(batch(&["x"])));
        assert_eq!(session.consecutive_errors(), 0);
    }

    #[test]
    fn test_stale_success_resets_errors_but_not_loading() {
        let mut epochs = EpochTracker::new();
        let mut session = CandidateSession::new();

        let old = session.begin_fetch(&mut epochs);
        let err_epoch = session.begin_fetch(&mut epochs);
        session.complete_fetch(
            &epochs,
            err_epoch,
            Err(GatewayError::Remote { status: 502, detail: "bad".into() }),
        );
        assert_eq!(session.consecutive_errors(), 1);

        session.begin_fetch(&mut epochs);
        assert!(session.is_loading());
        assert_eq!(session.complete_fetch(&epochs, old, Ok(batch(&["y"]))), FetchOutcome::Stale);
        assert_eq!(session.consecutive_errors(), 0);
        assert!(session.is_loading(), "latest fetch is still outstanding");
    }

    #[test]
    fn test_stale_failure_keeps_loading() {
        let mut epochs = EpochTracker::new();
        let mut session = CandidateSession::new();

        let old = session.begin_fetch(&mut epochs);
        let latest = session.begin_fetch(&mut epochs);
        session.complete_fetch(
            &epochs,
            old,
            Err(GatewayError::Remote { status: 500, detail: "late".into() }),
        );
        assert!(session.is_loading());

        session.complete_fetch(&epochs, latest, Ok(batch(&["z"])));
        assert!(!session.is_loading());
    }
}
