//! Chat turns <-> flat model context
//!
//! The model only ever sees one flat string. In chat mode that string is
//! rendered from the system prompt and the turn list:
//!
//! ```text
//! <system prompt>
//!
//! USER: <content>
//!
//! ASSISTANT: <content>
//!
//! ASSISTANT:<partial content being generated>
//! ```
//!
//! Parsing goes the other way on a best-effort basis; content containing
//! blank lines does not survive a round trip.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

pub const USER_PREFIX: &str = "USER:";
pub const ASSISTANT_PREFIX: &str = "ASSISTANT:";

/// Markers that end a generation, checked in this order
pub const DEFAULT_END_MARKERS: [&str; 6] = [
    "<|end_of_text|>",
    "<|im_end|>",
    "<|eot|>",
    "</s>",
    "<end>",
    "<|END|>",
];

pub fn default_end_markers() -> Vec<String> {
    DEFAULT_END_MARKERS.iter().map(|m| m.to_string()).collect()
}

/// First marker (in configured order) that `text`, right-trimmed, ends with
pub fn find_end_marker<'a>(text: &str, markers: &'a [String]) -> Option<&'a str> {
    let trimmed = text.trim_end();
    markers
        .iter()
        .find(|m| !m.is_empty() && trimmed.ends_with(m.as_str()))
        .map(String::as_str)
}

/// Remove every occurrence of every marker
pub fn strip_end_markers(text: &str, markers: &[String]) -> String {
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .fold(text.to_string(), |acc, m| acc.replace(m.as_str(), ""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn prefix(self) -> &'static str {
        match self {
            Role::User => USER_PREFIX,
            Role::Assistant => ASSISTANT_PREFIX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"USER:|ASSISTANT:").expect("valid marker regex"))
}

fn blank_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t\r]*\n").expect("valid blank line regex"))
}

#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub system_prompt: String,
    pub turns: Vec<ChatTurn>,
    generating: bool,
    partial: String,
    end_markers: Vec<String>,
}

impl ChatSession {
    pub fn new(system_prompt: impl Into<String>, end_markers: Vec<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            end_markers,
            ..Default::default()
        }
    }

    /// Parse a flat context into a session. Lossy.
    pub fn from_context(context: &str, end_markers: Vec<String>) -> Self {
        let (system_prompt, turns) = context_to_turns(context);
        Self {
            system_prompt,
            turns,
            end_markers,
            ..Default::default()
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Raw in-progress assistant content
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// In-progress content as it should be displayed
    pub fn display_partial(&self) -> &str {
        self.partial.trim_start()
    }

    pub fn end_markers(&self) -> &[String] {
        &self.end_markers
    }

    pub fn add_user_turn(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn::user(content));
        self.partial.clear();
    }

    /// Open an assistant turn for generation
    pub fn begin_assistant_turn(&mut self) {
        self.partial.clear();
        self.generating = true;
    }

    /// Append a generated token. Returns false if no turn is in progress.
    pub fn append_token(&mut self, token: &str) -> bool {
        if !self.generating {
            return false;
        }
        self.partial.push_str(token);
        true
    }

    /// Marker ending the in-progress content, if any
    pub fn pending_end_marker(&self) -> Option<&str> {
        find_end_marker(&self.partial, &self.end_markers)
    }

    /// Close the in-progress turn. Returns the stored turn, if it had content.
    pub fn finish_assistant_turn(&mut self) -> Option<ChatTurn> {
        if !self.generating {
            return None;
        }
        let cleaned = strip_end_markers(&self.partial, &self.end_markers);
        let cleaned = cleaned.trim_start();
        self.partial.clear();
        self.generating = false;

        if cleaned.is_empty() {
            debug!("Assistant turn empty after cleaning, not stored");
            return None;
        }
        let turn = ChatTurn::assistant(cleaned);
        self.turns.push(turn.clone());
        Some(turn)
    }

    /// Drop every turn and any generation in progress
    pub fn reset(&mut self) {
        self.turns.clear();
        self.partial.clear();
        self.generating = false;
    }

    /// Flat context consumed by the gateway
    pub fn to_context(&self) -> String {
        turns_to_context(&self.system_prompt, &self.turns, self.generating.then_some(self.partial.as_str()))
    }
}

/// Render turns into the flat context. `partial` opens a trailing assistant block.
pub fn turns_to_context(system_prompt: &str, turns: &[ChatTurn], partial: Option<&str>) -> String {
    let mut blocks: Vec<String> = Vec::with_capacity(turns.len() + 2);
    if !system_prompt.is_empty() {
        blocks.push(system_prompt.to_string());
    }
    for turn in turns {
        blocks.push(format!("{} {}", turn.role.prefix(), turn.content));
    }
    if let Some(partial) = partial {
        blocks.push(format!("{}{}", ASSISTANT_PREFIX, partial));
    }
    blocks.join("\n\n")
}

/// Parse a flat context into `(system_prompt, turns)`. Unrecognized blocks are ignored.
pub fn context_to_turns(context: &str) -> (String, Vec<ChatTurn>) {
    let Some(first) = marker_regex().find(context) else {
        return (context.trim().to_string(), Vec::new());
    };

    let system_prompt = context[..first.start()].trim().to_string();
    let turns = blank_line_regex()
        .split(&context[first.start()..])
        .filter_map(|block| {
            let block = block.trim_start();
            if let Some(rest) = block.strip_prefix(USER_PREFIX) {
                Some(ChatTurn::user(rest.trim()))
            } else {
                block
                    .strip_prefix(ASSISTANT_PREFIX)
                    .map(|rest| ChatTurn::assistant(rest.trim()))
            }
        })
        .collect();

    (system_prompt, turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ChatSession {
        ChatSession::new("You are helpful.", default_end_markers())
    }

    #[test]
    fn test_finish_strips_marker_and_leading_space() {
        let mut chat = session();
        chat.add_user_turn("Hello");
        chat.begin_assistant_turn();
        for token in ["Hi", " there", "<|end_of_text|>"] {
            assert!(chat.append_token(token));
        }
        assert_eq!(chat.pending_end_marker(), Some("<|end_of_text|>"));

        let turn = chat.finish_assistant_turn().unwrap();
        assert_eq!(turn.content, "Hi there");
        assert!(!chat.is_generating());
        assert_eq!(chat.partial(), "");
        assert_eq!(chat.turns.len(), 2);
    }

    #[test]
    fn test_empty_turn_not_stored() {
        let mut chat = session();
        chat.begin_assistant_turn();
        chat.append_token(" </s>");
        assert_eq!(chat.finish_assistant_turn(), None);
        assert!(chat.turns.is_empty());
        assert!(!chat.is_generating());
    }

    #[test]
    fn test_append_requires_generation() {
        let mut chat = session();
        assert!(!chat.append_token("x"));
        assert_eq!(chat.finish_assistant_turn(), None);
    }

    #[test]
    fn test_to_context_with_open_turn() {
        let mut chat = session();
        chat.add_user_turn("Hello");
        chat.turns.push(ChatTurn::assistant("Hi."));
        chat.add_user_turn("How are you?");
        chat.begin_assistant_turn();
        chat.append_token(" Fine");

        assert_eq!(
            chat.to_context(),
            "You are helpful.\n\nUSER: Hello\n\nASSISTANT: Hi.\n\nUSER: How are you?\n\nASSISTANT: Fine"
        );
        assert_eq!(chat.display_partial(), "Fine");
    }

    #[test]
    fn test_context_to_turns() {
        let context = "Be terse.\n\nUSER: Hi\n\nnoise block\n\nASSISTANT:  Hello there \n\nUSER: Bye";
        let (system, turns) = context_to_turns(context);
        assert_eq!(system, "Be terse.");
        assert_eq!(
            turns,
            vec![ChatTurn::user("Hi"), ChatTurn::assistant("Hello there"), ChatTurn::user("Bye")]
        );
    }

    #[test]
    fn test_context_without_markers_is_system_prompt() {
        let (system, turns) = context_to_turns("  Once upon a time  ");
        assert_eq!(system, "Once upon a time");
        assert!(turns.is_empty());
    }

    #[test]
    fn test_round_trip_simple_content() {
        let turns = vec![ChatTurn::user("Hi"), ChatTurn::assistant("Hello")];
        let context = turns_to_context("System", &turns, None);
        let (system, parsed) = context_to_turns(&context);
        assert_eq!(system, "System");
        assert_eq!(parsed, turns);
    }

    #[test]
    fn test_find_end_marker_uses_trimmed_suffix() {
        let markers = default_end_markers();
        assert_eq!(find_end_marker("done</s>  \n", &markers), Some("</s>"));
        assert_eq!(find_end_marker("</s> not done", &markers), None);
        assert_eq!(find_end_marker("a<|im_end|>", &markers), Some("<|im_end|>"));
    }

    #[test]
    fn test_strip_removes_all_markers() {
        let markers = default_end_markers();
        assert_eq!(strip_end_markers("a<end>b</s><|END|>", &markers), "ab");
    }
}
