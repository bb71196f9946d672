//! Speculative continuation paths
//!
//! Paths are replaced wholesale by each accepted generation, mutated in place
//! only by `extend`, and cleared by `adopt`. Generation responses are epoched
//! on the beam channel; extensions are tied to the generation they were
//! started against.

use crate::epoch::{Channel, EpochTracker};
use crate::gateway::{GatewayError, GeneratedPath, PathToken};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct BeamPath {
    pub id: String,
    /// Full context plus continuation
    pub text: String,
    pub tokens: Vec<PathToken>,
    pub cumulative_probability: f64,
}

impl From<GeneratedPath> for BeamPath {
    fn from(path: GeneratedPath) -> Self {
        Self {
            id: path.id,
            text: path.text,
            tokens: path.tokens,
            cumulative_probability: path.cumulative_probability,
        }
    }
}

impl BeamPath {
    /// Continuation text only, relative to `context`
    pub fn continuation<'a>(&'a self, context: &str) -> &'a str {
        self.text.strip_prefix(context).unwrap_or(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Applied { count: usize },
    Stale,
    Failed(String),
}

/// Handle for an in-flight extension
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendTicket {
    pub path_id: String,
    pub seed_text: String,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtendOutcome {
    Extended,
    /// Path set was replaced or cleared while the request was in flight
    Dropped,
    Failed(String),
}

/// Drop paths whose trimmed text repeats an earlier one.
///
/// A path whose `id` repeats an earlier kept path is dropped as well, since ids
/// address paths for extend and adopt and must stay unique.
pub fn dedup_paths(paths: Vec<GeneratedPath>) -> Vec<BeamPath> {
    let mut seen = HashSet::new();
    let mut ids = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.text.trim().to_string()))
        .filter(|p| ids.insert(p.id.clone()))
        .map(BeamPath::from)
        .collect()
}

#[derive(Debug, Default)]
pub struct BeamSession {
    paths: Vec<BeamPath>,
    last_generated_context: Option<String>,
    loading: bool,
    generation: u64,
    extending: HashSet<String>,
}

impl BeamSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> &[BeamPath] {
        &self.paths
    }

    pub fn path(&self, id: &str) -> Option<&BeamPath> {
        self.paths.iter().find(|p| p.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_extending(&self, id: &str) -> bool {
        self.extending.contains(id)
    }

    pub fn last_generated_context(&self) -> Option<&str> {
        self.last_generated_context.as_deref()
    }

    /// Entering the beam view regenerates only when the context moved or nothing is shown
    pub fn needs_generation(&self, context: &str) -> bool {
        self.paths.is_empty() || self.last_generated_context.as_deref() != Some(context)
    }

    /// Forget which context the current paths belong to
    pub fn invalidate(&mut self) {
        self.last_generated_context = None;
    }

    /// Drop every path and orphan any in-flight generate or extension
    pub fn cancel(&mut self, epochs: &mut EpochTracker) {
        let epoch = epochs.next_epoch(Channel::Beam);
        debug!(epoch, "Beam exploration cancelled");
        self.loading = false;
        self.paths.clear();
        self.extending.clear();
        self.generation += 1;
        self.last_generated_context = None;
    }

    pub fn begin_generate(&mut self, epochs: &mut EpochTracker) -> u64 {
        let epoch = epochs.next_epoch(Channel::Beam);
        self.loading = true;
        debug!(epoch, "Beam generation issued");
        epoch
    }

    pub fn complete_generate(
        &mut self,
        epochs: &EpochTracker,
        epoch: u64,
        context: &str,
        result: Result<Vec<GeneratedPath>, GatewayError>,
    ) -> GenerateOutcome {
        if !epochs.is_current(Channel::Beam, epoch) {
            debug!(epoch, latest = epochs.latest(Channel::Beam), "Discarding stale beam result");
            return GenerateOutcome::Stale;
        }
        self.loading = false;

        match result {
            Ok(paths) => {
                self.paths = dedup_paths(paths);
                self.generation += 1;
                self.extending.clear();
                self.last_generated_context = Some(context.to_string());
                info!(epoch, count = self.paths.len(), "Beam paths applied");
                GenerateOutcome::Applied { count: self.paths.len() }
            }
            Err(e) => {
                warn!(epoch, error = %e, "Beam generation failed");
                GenerateOutcome::Failed(e.to_string())
            }
        }
    }

    /// Start extending `id`. `None` if the path is unknown or already extending.
    pub fn begin_extend(&mut self, id: &str) -> Option<ExtendTicket> {
        let path = self.path(id)?;
        if self.extending.contains(id) {
            return None;
        }
        let ticket = ExtendTicket {
            path_id: path.id.clone(),
            seed_text: path.text.clone(),
            generation: self.generation,
        };
        self.extending.insert(ticket.path_id.clone());
        Some(ticket)
    }

    pub fn complete_extend(
        &mut self,
        ticket: &ExtendTicket,
        result: Result<Vec<GeneratedPath>, GatewayError>,
    ) -> ExtendOutcome {
        if ticket.generation != self.generation {
            debug!(path = %ticket.path_id, "Dropping extension for replaced path set");
            return ExtendOutcome::Dropped;
        }
        self.extending.remove(&ticket.path_id);

        let extension = match result {
            Ok(paths) => match paths.into_iter().next() {
                Some(first) => first,
                None => return ExtendOutcome::Failed(GatewayError::EmptyResponse.to_string()),
            },
            Err(e) => {
                warn!(path = %ticket.path_id, error = %e, "Path extension failed");
                return ExtendOutcome::Failed(e.to_string());
            }
        };

        let Some(path) = self.paths.iter_mut().find(|p| p.id == ticket.path_id) else {
            return ExtendOutcome::Dropped;
        };
        path.tokens.extend(extension.tokens);
        path.cumulative_probability *= extension.cumulative_probability;
        path.text = extension.text;
        debug!(path = %path.id, probability = path.cumulative_probability, "Path extended");
        ExtendOutcome::Extended
    }

    /// Remove every path and return the adopted path's text
    pub fn adopt(&mut self, id: &str) -> Option<String> {
        let text = self.path(id)?.text.clone();
        self.paths.clear();
        self.extending.clear();
        self.generation += 1;
        self.last_generated_context = None;
        info!(path = id, "Adopted beam path");
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(id: &str, text: &str, prob: f64) -> GeneratedPath {
        GeneratedPath {
            id: id.to_string(),
            text: text.to_string(),
            cumulative_probability: prob,
            tokens: vec![PathToken {
                token: text.rsplit(' ').next().unwrap_or_default().to_string(),
                probability: prob,
            }],
        }
    }

    fn session_with(paths: Vec<GeneratedPath>) -> (BeamSession, EpochTracker) {
        let mut epochs = EpochTracker::new();
        let mut session = BeamSession::new();
        let e = session.begin_generate(&mut epochs);
        session.complete_generate(&epochs, e, "Once", Ok(paths));
        (session, epochs)
    }

    #[test]
    fn test_duplicate_text_first_wins() {
        let (session, _) = session_with(vec![
            generated("a", "Once upon", 0.5),
            generated("b", "Once upon ", 0.4),
            generated("c", "Once more", 0.1),
        ]);
        let ids: Vec<_> = session.paths().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_duplicate_id_is_dropped() {
        let (session, _) = session_with(vec![
            generated("a", "Once upon", 0.5),
            generated("a", "Once more", 0.4),
        ]);
        assert_eq!(session.paths().len(), 1);
        assert_eq!(session.path("a").unwrap().text, "Once upon");
    }

    #[test]
    fn test_cancel_orphans_in_flight_generate() {
        let (mut session, mut epochs) = session_with(vec![generated("a", "Once upon", 0.5)]);
        let ticket = session.begin_extend("a").unwrap();
        let pending = session.begin_generate(&mut epochs);

        session.cancel(&mut epochs);
        assert!(!session.is_loading());
        assert!(session.paths().is_empty());
        assert_eq!(session.last_generated_context(), None);

        let outcome = session.complete_generate(&epochs, pending, "Once", Ok(vec![generated("b", "Once more", 0.3)]));
        assert_eq!(outcome, GenerateOutcome::Stale);
        assert!(session.paths().is_empty());
        assert_eq!(
            session.complete_extend(&ticket, Ok(vec![generated("z", "Once upon a", 0.4)])),
            ExtendOutcome::Dropped
        );
    }

    #[test]
    fn test_stale_generation_keeps_newer_loading() {
        let mut epochs = EpochTracker::new();
        let mut session = BeamSession::new();
        let old = session.begin_generate(&mut epochs);
        let newer = session.begin_generate(&mut epochs);

        let outcome = session.complete_generate(&epochs, old, "A", Ok(vec![generated("x", "A x", 1.0)]));
        assert_eq!(outcome, GenerateOutcome::Stale);
        assert!(session.is_loading());
        assert!(session.paths().is_empty());

        session.complete_generate(&epochs, newer, "B", Ok(vec![generated("y", "B y", 1.0)]));
        assert!(!session.is_loading());
        assert_eq!(session.last_generated_context(), Some("B"));
    }

    #[test]
    fn test_extend_multiplies_probability() {
        let (mut session, _) = session_with(vec![
            generated("a", "Once upon", 0.5),
            generated("b", "Once more", 0.25),
        ]);

        let ticket = session.begin_extend("a").unwrap();
        assert_eq!(ticket.seed_text, "Once upon");
        assert!(session.begin_extend("a").is_none());

        let outcome = session.complete_extend(&ticket, Ok(vec![generated("z", "Once upon a", 0.4)]));
        assert_eq!(outcome, ExtendOutcome::Extended);

        let a = session.path("a").unwrap();
        assert!((a.cumulative_probability - 0.2).abs() < 1e-12);
        assert_eq!(a.text, "Once upon a");
        assert_eq!(a.tokens.len(), 2);
        assert_eq!(session.path("b").unwrap().cumulative_probability, 0.25);
    }

    #[test]
    fn test_extend_failure_leaves_path_and_allows_retry() {
        let (mut session, _) = session_with(vec![generated("a", "Once upon", 0.5)]);
        let ticket = session.begin_extend("a").unwrap();
        let outcome = session.complete_extend(
            &ticket,
            Err(GatewayError::Remote { status: 500, detail: "oops".into() }),
        );
        assert!(matches!(outcome, ExtendOutcome::Failed(_)));
        assert_eq!(session.path("a").unwrap().cumulative_probability, 0.5);
        assert!(!session.is_extending("a"));
        assert!(session.begin_extend("a").is_some());
    }

    #[test]
    fn test_extension_after_regeneration_is_dropped() {
        let (mut session, mut epochs) = session_with(vec![generated("a", "Once upon", 0.5)]);
        let ticket = session.begin_extend("a").unwrap();

        let e = session.begin_generate(&mut epochs);
        session.complete_generate(&epochs, e, "Once", Ok(vec![generated("a", "Once again", 0.9)]));

        let outcome = session.complete_extend(&ticket, Ok(vec![generated("z", "Once upon a", 0.4)]));
        assert_eq!(outcome, ExtendOutcome::Dropped);
        assert_eq!(session.path("a").unwrap().text, "Once again");
    }

    #[test]
    fn test_adopt_clears_everything() {
        let (mut session, _) = session_with(vec![
            generated("a", "Once upon", 0.5),
            generated("b", "Once more", 0.3),
            generated("c", "Once again", 0.2),
        ]);
        assert_eq!(session.adopt("b"), Some("Once more".to_string()));
        assert!(session.paths().is_empty());
        assert!(session.needs_generation("Once more"));
        assert_eq!(session.adopt("missing"), None);
    }

    #[test]
    fn test_view_switch_policy() {
        let (mut session, _) = session_with(vec![generated("a", "Once upon", 0.5)]);
        assert!(!session.needs_generation("Once"));
        assert!(session.needs_generation("Once upon"));
        session.invalidate();
        assert!(session.needs_generation("Once"));
    }

    #[test]
    fn test_continuation_strips_context() {
        let path = BeamPath::from(generated("a", "Once upon", 0.5));
        assert_eq!(path.continuation("Once"), " upon");
        assert_eq!(path.continuation("Other"), "Once upon");
    }
}
