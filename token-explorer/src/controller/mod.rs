//! Interactive exploration controller
//!
//! All state lives in one `Controller` driven by a single event loop. Gateway
//! calls and timers run as spawned tasks that report back through the event
//! channel; nothing is mutated across an await. Staleness is handled by epoch
//! checks on arrival, and commits are serialized by the `selecting` lock.


use crate::autoplay::{AutoPlayEngine, TickDecision, TickInput};
use crate::beam::{BeamPath, BeamSession, ExtendOutcome, ExtendTicket, GenerateOutcome};
use crate::candidates::{CandidateBatch, CandidateSession, FetchOutcome};
use crate::chat::{self, ChatSession, ChatTurn};
use crate::debounce::Debouncer;
use crate::epoch::{Channel, EpochTracker};
use crate::gateway::{
    BeamRequest, Candidate, CandidateRequest, GatewayError, GeneratedPath, InferenceGateway,
    ModelInfo, SamplingConfig,
};
use crate::{BeamConfig, ExplorerConfig};
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, trace, warn};

/// How the context is edited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Free-form flat text
    Text,
    /// System prompt plus USER/ASSISTANT turns
    Chat,
}

/// Which exploration panel is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Candidates,
    Beam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebounceKey {
    Context,
    Sampling,
    Beam,
}

/// User-initiated requests
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the whole context
    EditContext(String),
    /// Type text at the end of the context
    AppendText(String),
    SetSampling(SamplingConfig),
    SetBeamParams(BeamConfig),
    /// Commit an arbitrary token
    Select(String),
    /// Commit the candidate at this display rank
    SelectRank(usize),
    StartAutoPlay,
    StopAutoPlay,
    ShowCandidates,
    ShowBeams,
    RegenerateBeams,
    ExtendPath(String),
    AdoptPath(String),
    SetMode(Mode),
    SendUserTurn(String),
    FinishAssistantTurn,
    SetSystemPrompt(String),
    ResetChat,
    ListModels,
    SwitchModel(String),
    Shutdown,
}

/// Everything the event loop reacts to
#[derive(Debug)]
pub enum Event {
    Command(Command),
    /// `seq` identifies the schedule that armed the timer
    DebounceFired {
        key: DebounceKey,
        seq: u64,
    },
    CandidatesArrived {
        epoch: u64,
        result: Result<Vec<Candidate>, GatewayError>,
    },
    BeamsArrived {
        epoch: u64,
        context: String,
        result: Result<Vec<GeneratedPath>, GatewayError>,
    },
    ExtendArrived {
        ticket: ExtendTicket,
        result: Result<Vec<GeneratedPath>, GatewayError>,
    },
    AutoPlayTick,
    SelectionDue {
        ticket: u64,
    },
    ModelsListed(Result<Vec<ModelInfo>, GatewayError>),
    ModelSwitched {
        filename: String,
        result: Result<(), GatewayError>,
    },
}

/// Updates for whatever renders the session
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Context(String),
    Chat {
        system_prompt: String,
        turns: Vec<ChatTurn>,
        partial: String,
        generating: bool,
    },
    Mode(Mode),
    View(View),
    Loading(bool),
    Candidates(CandidateBatch),
    AutoPlay(bool),
    /// Auto-play pick shown during the feedback delay
    Pending(String),
    Committed(String),
    BeamLoading(bool),
    Beams {
        context: String,
        paths: Vec<BeamPath>,
    },
    BeamsEmpty,
    BeamError(String),
    PathExtending(String),
    PathExtendFailed {
        id: String,
        error: String,
    },
    InputEnabled(bool),
    ControlsEnabled(bool),
    Models(Vec<ModelInfo>),
    ModelSwitched(String),
    Error(String),
    /// Auto-play was stopped because the gateway keeps failing
    Fatal(String),
}

/// Cloneable sender for commands
#[derive(Clone)]
pub struct ControllerHandle {
    events: UnboundedSender<Event>,
}

impl ControllerHandle {
    /// Returns false once the controller has shut down
    pub fn send(&self, command: Command) -> bool {
        self.events.send(Event::Command(command)).is_ok()
    }
}

pub struct Controller {
    config: ExplorerConfig,
    gateway: Arc<dyn InferenceGateway>,
    events: UnboundedSender<Event>,
    view: UnboundedSender<ViewEvent>,
    epochs: EpochTracker,
    debouncer: Debouncer<DebounceKey>,
    context: String,
    sampling: SamplingConfig,
    beam_params: BeamConfig,
    candidates: CandidateSession,
    autoplay: AutoPlayEngine,
    beams: BeamSession,
    chat: ChatSession,
    mode: Mode,
    view_mode: View,
    /// Epoch of the fetch issued by the commit in progress
    selecting: Option<u64>,
    controls_enabled: bool,
}

impl Controller {
    /// Create a controller. The returned receiver must be passed to `run`.
    pub fn new(
        config: ExplorerConfig,
        gateway: Arc<dyn InferenceGateway>,
        view: UnboundedSender<ViewEvent>,
    ) -> (Self, UnboundedReceiver<Event>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            context: config.initial_context.clone(),
            sampling: config.sampling.clamped(),
            beam_params: config.beam,
            chat: ChatSession::new(config.chat.system_prompt.clone(), config.chat.end_markers.clone()),
            config,
            gateway,
            events,
            view,
            epochs: EpochTracker::new(),
            debouncer: Debouncer::new(),
            candidates: CandidateSession::new(),
            autoplay: AutoPlayEngine::new(),
            beams: BeamSession::new(),
            mode: Mode::Text,
            view_mode: View::Candidates,
            selecting: None,
            controls_enabled: true,
        };
        (controller, receiver)
    }

    /// Use a fixed random source for auto-play picks
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.autoplay = AutoPlayEngine::with_rng(rng);
        self
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            events: self.events.clone(),
        }
    }

    /// Drive the controller until `Command::Shutdown`
    pub async fn run(mut self, mut events: UnboundedReceiver<Event>) {
        self.start();
        while let Some(event) = events.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
        info!("Controller stopped");
    }

    /// Publish the initial state and fetch candidates for the initial context
    pub fn start(&mut self) {
        self.emit(ViewEvent::Mode(self.mode));
        self.emit_text_state();
        self.fetch_candidates();
    }

    pub fn context(&self) -> String {
        self.active_context()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn view_mode(&self) -> View {
        self.view_mode
    }

    pub fn sampling(&self) -> SamplingConfig {
        self.sampling
    }

    pub fn candidates(&self) -> &CandidateSession {
        &self.candidates
    }

    pub fn autoplay(&self) -> &AutoPlayEngine {
        &self.autoplay
    }

    pub fn beams(&self) -> &BeamSession {
        &self.beams
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn is_selecting(&self) -> bool {
        self.selecting.is_some()
    }

    pub fn controls_enabled(&self) -> bool {
        self.controls_enabled
    }

    /// Apply one event. Returns false when the loop should exit.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Command(command) => return self.on_command(command),
            Event::DebounceFired { key, seq } => self.on_debounce(key, seq),
            Event::CandidatesArrived { epoch, result } => self.on_candidates(epoch, result),
            Event::BeamsArrived { epoch, context, result } => self.on_beams(epoch, &context, result),
            Event::ExtendArrived { ticket, result } => self.on_extend(ticket, result),
            Event::AutoPlayTick => self.on_tick(),
            Event::SelectionDue { ticket } => self.on_selection_due(ticket),
            Event::ModelsListed(result) => match result {
                Ok(models) => self.emit(ViewEvent::Models(models)),
                Err(e) => self.emit(ViewEvent::Error(format!("Failed to list models: {e}"))),
            },
            Event::ModelSwitched { filename, result } => self.on_model_switched(filename, result),
        }
        true
    }

    fn on_command(&mut self, command: Command) -> bool {
        debug!(?command, "Command");
        match command {
            Command::EditContext(text) => self.edit_context(text),
            Command::AppendText(text) => {
                let mut context = self.active_context();
                context.push_str(&text);
                self.edit_context(context);
            }
            Command::SetSampling(sampling) => {
                self.sampling = sampling.clamped();
                self.debounce(DebounceKey::Sampling);
            }
            Command::SetBeamParams(params) => {
                self.beam_params = BeamConfig {
                    num_paths: params.num_paths.max(1),
                    depth: params.depth.max(1),
                };
                self.debounce(DebounceKey::Beam);
            }
            Command::Select(token) => self.manual_select(token),
            Command::SelectRank(rank) => match self.candidates.token_at(rank).map(str::to_string) {
                Some(token) => self.manual_select(token),
                None => debug!(rank, "No candidate at rank"),
            },
            Command::StartAutoPlay => self.start_autoplay(),
            Command::StopAutoPlay => self.stop_autoplay(),
            Command::ShowCandidates => {
                self.view_mode = View::Candidates;
                self.emit(ViewEvent::View(View::Candidates));
            }
            Command::ShowBeams => self.show_beams(),
            Command::RegenerateBeams => {
                self.debouncer.cancel(DebounceKey::Beam);
                self.generate_beams();
            }
            Command::ExtendPath(id) => self.extend_path(&id),
            Command::AdoptPath(id) => self.adopt_path(&id),
            Command::SetMode(mode) => self.set_mode(mode),
            Command::SendUserTurn(content) => self.send_user_turn(content),
            Command::FinishAssistantTurn => {
                self.stop_autoplay();
                self.finish_chat_turn();
                self.fetch_candidates();
            }
            Command::SetSystemPrompt(prompt) => {
                self.chat.system_prompt = prompt;
                self.emit_text_state();
                if self.mode == Mode::Chat {
                    self.debounce(DebounceKey::Context);
                }
            }
            Command::ResetChat => {
                self.stop_autoplay();
                self.chat.reset();
                self.emit(ViewEvent::InputEnabled(true));
                self.emit_text_state();
                if self.mode == Mode::Chat {
                    self.fetch_candidates();
                }
            }
            Command::ListModels => self.list_models(),
            Command::SwitchModel(filename) => self.switch_model(filename),
            Command::Shutdown => {
                self.stop_autoplay();
                return false;
            }
        }
        true
    }

    // ---- context & debouncing ----

    fn active_context(&self) -> String {
        match self.mode {
            Mode::Text => self.context.clone(),
            Mode::Chat => self.chat.to_context(),
        }
    }

    fn edit_context(&mut self, text: String) {
        match self.mode {
            Mode::Text => self.context = text,
            Mode::Chat => {
                self.reparse_chat(&text);
                self.emit(ViewEvent::InputEnabled(true));
            }
        }
        self.emit_text_state();
        self.debounce(DebounceKey::Context);
    }

    /// Rebuild the chat session from a flat context, keeping the system prompt if none parses
    fn reparse_chat(&mut self, text: &str) {
        let system_prompt = std::mem::take(&mut self.chat.system_prompt);
        self.chat = ChatSession::from_context(text, self.chat.end_markers().to_vec());
        if self.chat.system_prompt.is_empty() {
            self.chat.system_prompt = system_prompt;
        }
    }

    fn debounce(&mut self, key: DebounceKey) {
        let timing = &self.config.timing;
        let delay_ms = match key {
            DebounceKey::Context => timing.context_debounce_ms,
            DebounceKey::Sampling => timing.sampling_debounce_ms,
            DebounceKey::Beam => timing.beam_debounce_ms,
        };
        let events = self.events.clone();
        self.debouncer.schedule(key, Duration::from_millis(delay_ms), move |seq| async move {
            let _ = events.send(Event::DebounceFired { key, seq });
        });
    }

    fn on_debounce(&mut self, key: DebounceKey, seq: u64) {
        if !self.debouncer.fire(key, seq) {
            trace!(?key, seq, "Ignoring superseded debounce");
            return;
        }
        trace!(?key, seq, "Debounce fired");
        match key {
            DebounceKey::Context => {
                self.fetch_candidates();
                if self.view_mode == View::Beam {
                    self.generate_beams();
                }
            }
            DebounceKey::Sampling => {
                self.fetch_candidates();
            }
            DebounceKey::Beam => {
                if self.view_mode == View::Beam {
                    self.generate_beams();
                }
            }
        }
    }

    // ---- candidate session ----

    /// Issue a candidate fetch for the current context. Returns its epoch.
    fn fetch_candidates(&mut self) -> Option<u64> {
        let context = self.active_context();
        if context.is_empty() {
            debug!("Empty context, skipping candidate fetch");
            return None;
        }

        let epoch = self.candidates.begin_fetch(&mut self.epochs);
        self.emit(ViewEvent::Loading(true));

        let request = CandidateRequest::new(context, &self.sampling);
        let gateway = Arc::clone(&self.gateway);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = gateway.next_tokens(&request).await;
            let _ = events.send(Event::CandidatesArrived { epoch, result });
        });
        Some(epoch)
    }

    fn on_candidates(&mut self, epoch: u64, result: Result<Vec<Candidate>, GatewayError>) {
        let outcome = self.candidates.complete_fetch(&self.epochs, epoch, result);
        self.emit(ViewEvent::Loading(self.candidates.is_loading()));

        // A commit stays locked until candidates consistent with it are active,
        // or the latest fetch has failed
        if let Some(lock) = self.selecting {
            let settled = match &outcome {
                FetchOutcome::Applied => epoch >= lock,
                FetchOutcome::Failed { .. } => self.epochs.is_current(Channel::Candidates, epoch),
                FetchOutcome::Stale => false,
            };
            if settled {
                trace!(lock, epoch, "Selection lock released");
                self.selecting = None;
            }
        }

        match outcome {
            FetchOutcome::Applied => {
                if let Some(batch) = self.candidates.active() {
                    let batch = batch.clone();
                    self.emit(ViewEvent::Candidates(batch));
                }
            }
            FetchOutcome::Stale => {}
            FetchOutcome::Failed { consecutive_errors, message } => {
                self.emit(ViewEvent::Error(message.clone()));
                if consecutive_errors >= self.config.autoplay.max_consecutive_errors
                    && self.autoplay.is_running()
                {
                    error!(consecutive_errors, "Stopping auto-play after repeated fetch failures");
                    self.stop_autoplay();
                    self.emit(ViewEvent::Fatal(format!(
                        "Auto-play stopped after {consecutive_errors} consecutive errors: {message}"
                    )));
                }
            }
        }
    }

    // ---- selection ----

    fn manual_select(&mut self, token: String) {
        if !self.controls_enabled {
            warn!("Controls disabled, ignoring selection");
            return;
        }
        self.commit_selection(token);
    }

    /// Commit `token`. No-op while another commit holds the lock.
    fn commit_selection(&mut self, token: String) -> bool {
        if self.selecting.is_some() {
            debug!(token = %token, "Selection already in progress, ignoring");
            return false;
        }

        let marker = match self.mode {
            Mode::Chat => {
                if self.chat.append_token(&token) {
                    self.chat.pending_end_marker().map(str::to_string)
                } else {
                    // No assistant turn open: the token extends the flat chat context
                    let mut flat = self.chat.to_context();
                    flat.push_str(&token);
                    self.reparse_chat(&flat);
                    chat::find_end_marker(&flat, self.chat.end_markers()).map(str::to_string)
                }
            }
            Mode::Text => {
                self.context.push_str(&token);
                chat::find_end_marker(&self.context, self.chat.end_markers()).map(str::to_string)
            }
        };
        self.autoplay.record_selected(&token);
        self.emit(ViewEvent::Committed(token));

        if let Some(marker) = marker {
            info!(marker = %marker, "End-of-generation marker reached");
            self.stop_autoplay();
            if self.mode == Mode::Chat && self.chat.is_generating() {
                self.finish_chat_turn();
            }
        }
        self.emit_text_state();

        self.selecting = self.fetch_candidates();
        true
    }

    // ---- auto-play ----

    fn start_autoplay(&mut self) {
        if !self.controls_enabled {
            warn!("Controls disabled, not starting auto-play");
            return;
        }
        if !self.autoplay.start() {
            return;
        }
        self.candidates.reset_errors();

        let events = self.events.clone();
        let period = Duration::from_millis(self.config.timing.autoplay_interval_ms.max(1));
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if events.send(Event::AutoPlayTick).is_err() {
                    break;
                }
            }
        });
        self.autoplay.attach_ticker(ticker);
        self.emit(ViewEvent::AutoPlay(true));
    }

    fn stop_autoplay(&mut self) {
        if self.autoplay.stop() {
            self.emit(ViewEvent::AutoPlay(false));
        }
    }

    fn on_tick(&mut self) {
        let input = TickInput {
            loading: self.candidates.is_loading(),
            selecting: self.selecting.is_some(),
            batch: self.candidates.active(),
        };
        match self.autoplay.tick(input) {
            TickDecision::Stopped | TickDecision::Busy => {}
            TickDecision::NothingEligible => trace!("No eligible candidates this tick"),
            TickDecision::NeedCandidates => {
                self.fetch_candidates();
            }
            TickDecision::Pick(pending) => {
                self.emit(ViewEvent::Pending(pending.token.clone()));
                let events = self.events.clone();
                let delay = Duration::from_millis(self.config.timing.selection_feedback_ms);
                let ticket = pending.ticket;
                let feedback = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::SelectionDue { ticket });
                });
                self.autoplay.attach_feedback(feedback);
            }
        }
    }

    fn on_selection_due(&mut self, ticket: u64) {
        let input = TickInput {
            loading: self.candidates.is_loading(),
            selecting: self.selecting.is_some(),
            batch: self.candidates.active(),
        };
        if let Some(token) = self.autoplay.confirm(ticket, input) {
            self.commit_selection(token);
        }
    }

    // ---- beam exploration ----

    fn show_beams(&mut self) {
        self.view_mode = View::Beam;
        self.emit(ViewEvent::View(View::Beam));

        let context = self.active_context();
        if self.beams.needs_generation(&context) {
            self.generate_beams();
        } else {
            debug!("Beam paths still valid for context, not regenerating");
            self.emit_beams();
        }
    }

    fn generate_beams(&mut self) {
        let context = self.active_context();
        if context.trim().is_empty() {
            // Nothing to explore; whatever is in flight belongs to text that is gone
            if self.beams.is_loading() {
                self.emit(ViewEvent::BeamLoading(false));
            }
            self.beams.cancel(&mut self.epochs);
            self.emit(ViewEvent::BeamsEmpty);
            return;
        }

        let epoch = self.beams.begin_generate(&mut self.epochs);
        self.emit(ViewEvent::BeamLoading(true));

        let request = BeamRequest {
            context: context.clone(),
            num_paths: self.beam_params.num_paths,
            depth: self.beam_params.depth,
        };
        let gateway = Arc::clone(&self.gateway);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = gateway.beam_search(&request).await;
            let _ = events.send(Event::BeamsArrived { epoch, context, result });
        });
    }

    fn on_beams(&mut self, epoch: u64, context: &str, result: Result<Vec<GeneratedPath>, GatewayError>) {
        match self.beams.complete_generate(&self.epochs, epoch, context, result) {
            GenerateOutcome::Applied { .. } => {
                self.emit(ViewEvent::BeamLoading(false));
                self.emit_beams();
            }
            GenerateOutcome::Stale => {}
            GenerateOutcome::Failed(message) => {
                self.emit(ViewEvent::BeamLoading(false));
                self.emit(ViewEvent::BeamError(message));
            }
        }
    }

    fn extend_path(&mut self, id: &str) {
        let Some(ticket) = self.beams.begin_extend(id) else {
            debug!(path = id, "Path unknown or already extending");
            return;
        };
        self.emit(ViewEvent::PathExtending(ticket.path_id.clone()));

        let request = BeamRequest {
            context: ticket.seed_text.clone(),
            num_paths: 1,
            depth: self.beam_params.depth,
        };
        let gateway = Arc::clone(&self.gateway);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = gateway.beam_search(&request).await;
            let _ = events.send(Event::ExtendArrived { ticket, result });
        });
    }

    fn on_extend(&mut self, ticket: ExtendTicket, result: Result<Vec<GeneratedPath>, GatewayError>) {
        match self.beams.complete_extend(&ticket, result) {
            ExtendOutcome::Extended => self.emit_beams(),
            ExtendOutcome::Dropped => {}
            ExtendOutcome::Failed(error) => self.emit(ViewEvent::PathExtendFailed {
                id: ticket.path_id,
                error,
            }),
        }
    }

    fn adopt_path(&mut self, id: &str) {
        let Some(text) = self.beams.adopt(id) else {
            debug!(path = id, "Cannot adopt unknown path");
            return;
        };

        match self.mode {
            Mode::Text => self.context = text,
            Mode::Chat => {
                let current = self.chat.to_context();
                match text.strip_prefix(current.as_str()) {
                    Some(suffix) if self.chat.is_generating() => {
                        self.chat.append_token(suffix);
                    }
                    _ => self.reparse_chat(&text),
                }
            }
        }
        self.emit_text_state();
        self.emit(ViewEvent::Beams {
            context: self.active_context(),
            paths: Vec::new(),
        });

        self.generate_beams();
        self.fetch_candidates();
    }

    fn emit_beams(&self) {
        let context = self
            .beams
            .last_generated_context()
            .map(str::to_string)
            .unwrap_or_else(|| self.active_context());
        let paths = self.beams.paths().to_vec();
        self.emit(ViewEvent::Beams { context, paths });
    }

    // ---- chat ----

    fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        self.stop_autoplay();

        match mode {
            Mode::Chat => {
                let system_prompt = self.config.chat.system_prompt.clone();
                self.chat = ChatSession::from_context(&self.context, self.config.chat.end_markers.clone());
                if self.chat.system_prompt.is_empty() {
                    self.chat.system_prompt = system_prompt;
                }
            }
            Mode::Text => {
                self.context = self.chat.to_context();
            }
        }
        self.mode = mode;
        info!(?mode, "Mode changed");
        self.emit(ViewEvent::Mode(mode));
        self.emit(ViewEvent::InputEnabled(true));
        self.emit_text_state();
        self.fetch_candidates();
    }

    fn send_user_turn(&mut self, content: String) {
        if self.mode != Mode::Chat {
            self.set_mode(Mode::Chat);
        }
        if self.chat.is_generating() {
            warn!("Assistant turn still in progress, ignoring user turn");
            return;
        }

        self.chat.add_user_turn(content);
        self.chat.begin_assistant_turn();
        self.emit(ViewEvent::InputEnabled(false));
        self.emit_text_state();
        self.fetch_candidates();

        if self.config.chat.auto_generate {
            self.start_autoplay();
        }
    }

    fn finish_chat_turn(&mut self) {
        if let Some(turn) = self.chat.finish_assistant_turn() {
            debug!(len = turn.content.len(), "Assistant turn stored");
        }
        self.emit(ViewEvent::InputEnabled(true));
    }

    // ---- model management ----

    fn list_models(&mut self) {
        let gateway = Arc::clone(&self.gateway);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = gateway.list_models().await;
            let _ = events.send(Event::ModelsListed(result));
        });
    }

    fn switch_model(&mut self, filename: String) {
        if !self.controls_enabled {
            warn!("Model switch already in progress");
            return;
        }
        self.stop_autoplay();
        self.controls_enabled = false;
        self.emit(ViewEvent::ControlsEnabled(false));
        info!(gateway = self.gateway.name(), model = %filename, "Switching model");

        let gateway = Arc::clone(&self.gateway);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = gateway.switch_model(&filename).await;
            let _ = events.send(Event::ModelSwitched { filename, result });
        });
    }

    fn on_model_switched(&mut self, filename: String, result: Result<(), GatewayError>) {
        self.controls_enabled = true;
        self.emit(ViewEvent::ControlsEnabled(true));

        match result {
            Ok(()) => {
                info!(model = %filename, "Model switched");
                self.emit(ViewEvent::ModelSwitched(filename));
                self.beams.invalidate();
                self.fetch_candidates();
                if self.view_mode == View::Beam {
                    self.generate_beams();
                }
            }
            Err(e) => {
                warn!(model = %filename, error = %e, "Model switch failed");
                self.emit(ViewEvent::Error(format!("Failed to switch to {filename}: {e}")));
            }
        }
    }

    // ---- view ----

    fn emit(&self, event: ViewEvent) {
        let _ = self.view.send(event);
    }

    fn emit_text_state(&self) {
        match self.mode {
            Mode::Text => self.emit(ViewEvent::Context(self.context.clone())),
            Mode::Chat => self.emit(ViewEvent::Chat {
                system_prompt: self.chat.system_prompt.clone(),
                turns: self.chat.turns.clone(),
                partial: self.chat.partial().to_string(),
                generating: self.chat.is_generating(),
            }),
        }
    }
}
