//! Line-oriented console input
//!
//! Each stdin line becomes at most one controller `Command`. Sampling and beam
//! parameters are edited one field at a time, so the console keeps its own copy
//! and sends the whole updated value.

use crate::BeamConfig;
use crate::controller::{Command, Mode};
use crate::gateway::SamplingConfig;

pub const HELP: &str = r#"  N                 pick candidate N (as numbered in the list)
  :pick TOKEN       commit an arbitrary token (\n for newline)
  :set TEXT         replace the context
  :type TEXT        append TEXT to the context
  :auto / :stop     start or stop auto-play
  :temp F  :topk N  :topp F  :penalty F
                    change sampling parameters
  :beam             show beam paths
  :candidates       show candidates
  :regen            regenerate beam paths
  :paths N [DEPTH]  beam path count and depth
  :extend ID        extend a beam path
  :adopt ID         adopt a beam path as the context
  :text / :chat     switch editing mode
  :say TEXT         send a user turn (chat mode)
  :system TEXT      set the system prompt
  :finish           end the assistant turn
  :reset            clear the chat
  :models           list models
  :switch FILE      switch model
  :quit             exit"#;

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(Command),
    Help,
    Empty,
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct ConsoleState {
    pub sampling: SamplingConfig,
    pub beam: BeamConfig,
}

impl ConsoleState {
    pub fn new(sampling: SamplingConfig, beam: BeamConfig) -> Self {
        Self { sampling, beam }
    }

    pub fn parse(&mut self, line: &str) -> Input {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Input::Empty;
        }

        if let Ok(rank) = line.trim().parse::<usize>() {
            return match rank.checked_sub(1) {
                Some(rank) => Input::Command(Command::SelectRank(rank)),
                None => Input::Invalid("Candidates are numbered from 1".to_string()),
            };
        }

        let Some(line) = line.strip_prefix(':') else {
            return Input::Invalid(format!("Unknown input: {line} (try :help)"));
        };
        // Text arguments keep their leading whitespace after the single separator
        let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
        match self.command(name, rest) {
            Ok(command) => Input::Command(command),
            Err(input) => input,
        }
    }

    fn command(&mut self, name: &str, rest: &str) -> Result<Command, Input> {
        let arg = rest.trim();
        let command = match name {
            "help" | "h" => return Err(Input::Help),
            "quit" | "q" => Command::Shutdown,
            "pick" => Command::Select(unescape(rest)),
            "set" => Command::EditContext(unescape(rest)),
            "type" => Command::AppendText(unescape(rest)),
            "auto" => Command::StartAutoPlay,
            "stop" => Command::StopAutoPlay,
            "temp" | "topk" | "topp" | "penalty" => self.set_sampling(name, arg)?,
            "paths" => self.set_paths(arg)?,
            "beam" => Command::ShowBeams,
            "candidates" => Command::ShowCandidates,
            "regen" => Command::RegenerateBeams,
            "extend" => Command::ExtendPath(required(name, arg)?),
            "adopt" => Command::AdoptPath(required(name, arg)?),
            "text" => Command::SetMode(Mode::Text),
            "chat" => Command::SetMode(Mode::Chat),
            "say" => Command::SendUserTurn(required(name, arg)?),
            "system" => Command::SetSystemPrompt(unescape(arg)),
            "finish" => Command::FinishAssistantTurn,
            "reset" => Command::ResetChat,
            "models" => Command::ListModels,
            "switch" => Command::SwitchModel(required(name, arg)?),
            other => return Err(Input::Invalid(format!("Unknown command :{other} (try :help)"))),
        };
        Ok(command)
    }

    fn set_sampling(&mut self, name: &str, arg: &str) -> Result<Command, Input> {
        let invalid = || Input::Invalid(format!(":{name} needs a number, got {arg:?}"));
        let mut sampling = self.sampling;
        match name {
            "temp" => sampling.temperature = arg.parse::<f32>().map_err(|_| invalid())?,
            "topk" => sampling.top_k = arg.parse::<u32>().map_err(|_| invalid())?,
            "topp" => sampling.top_p = arg.parse::<f32>().map_err(|_| invalid())?,
            _ => sampling.repeat_penalty = arg.parse::<f32>().map_err(|_| invalid())?,
        }
        self.sampling = sampling.clamped();
        Ok(Command::SetSampling(self.sampling))
    }

    fn set_paths(&mut self, arg: &str) -> Result<Command, Input> {
        let mut parts = arg.split_whitespace().map(str::parse::<u32>);
        let num_paths = match parts.next() {
            Some(Ok(n)) => n,
            _ => return Err(Input::Invalid(":paths needs a path count".to_string())),
        };
        let depth = match parts.next() {
            None => self.beam.depth,
            Some(Ok(d)) => d,
            Some(Err(_)) => return Err(Input::Invalid(":paths depth must be a number".to_string())),
        };
        self.beam = BeamConfig {
            num_paths: num_paths.max(1),
            depth: depth.max(1),
        };
        Ok(Command::SetBeamParams(self.beam))
    }
}

fn required(name: &str, arg: &str) -> Result<String, Input> {
    if arg.is_empty() {
        Err(Input::Invalid(format!(":{name} needs an argument")))
    } else {
        Ok(arg.to_string())
    }
}

fn unescape(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console() -> ConsoleState {
        ConsoleState::new(SamplingConfig::default(), BeamConfig::default())
    }

    fn command(console: &mut ConsoleState, line: &str) -> Command {
        match console.parse(line) {
            Input::Command(command) => command,
            other => panic!("{line:?} parsed as {other:?}"),
        }
    }

    #[test]
    fn test_rank_is_one_based() {
        let mut c = console();
        assert_eq!(command(&mut c, "1"), Command::SelectRank(0));
        assert_eq!(command(&mut c, " 3 "), Command::SelectRank(2));
        assert!(matches!(c.parse("0"), Input::Invalid(_)));
    }

    #[test]
    fn test_text_arguments_keep_leading_space() {
        let mut c = console();
        assert_eq!(command(&mut c, ":type  world"), Command::AppendText(" world".to_string()));
        assert_eq!(command(&mut c, ":pick \\n"), Command::Select("\n".to_string()));
        assert_eq!(
            command(&mut c, ":set Once upon"),
            Command::EditContext("Once upon".to_string())
        );
    }

    #[test]
    fn test_sampling_edits_accumulate() {
        let mut c = console();
        command(&mut c, ":temp 0.3");
        let Command::SetSampling(sampling) = command(&mut c, ":topk 5") else {
            panic!("expected sampling update");
        };
        assert_eq!(sampling.temperature, 0.3);
        assert_eq!(sampling.top_k, 5);
        assert!(matches!(c.parse(":temp hot"), Input::Invalid(_)));
    }

    #[test]
    fn test_paths_keeps_depth_when_omitted() {
        let mut c = console();
        assert_eq!(
            command(&mut c, ":paths 4"),
            Command::SetBeamParams(BeamConfig { num_paths: 4, depth: 5 })
        );
        assert_eq!(
            command(&mut c, ":paths 2 8"),
            Command::SetBeamParams(BeamConfig { num_paths: 2, depth: 8 })
        );
    }

    #[test]
    fn test_misc_commands() {
        let mut c = console();
        assert_eq!(c.parse(""), Input::Empty);
        assert_eq!(c.parse(":help"), Input::Help);
        assert_eq!(command(&mut c, ":chat"), Command::SetMode(Mode::Chat));
        assert_eq!(command(&mut c, ":say Hi"), Command::SendUserTurn("Hi".to_string()));
        assert_eq!(command(&mut c, ":quit"), Command::Shutdown);
        assert!(matches!(c.parse(":adopt"), Input::Invalid(_)));
        assert!(matches!(c.parse(":bogus"), Input::Invalid(_)));
        assert!(matches!(c.parse("hello"), Input::Invalid(_)));
    }
}
