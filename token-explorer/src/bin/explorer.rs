//! Token Explorer CLI - step through a model's next-token distribution
//!
//! Usage:
//!   explorer [--config <file>] [--url <url>] [--context <text>] [-v|-vv]
//!
//! Example:
//!   explorer --url http://gpu-box:8000 --context "The capital of France is"

use anyhow::{Context, Result};
use colored::Colorize;
use explorer::chat::Role;
use explorer::console::{ConsoleState, HELP, Input};
use explorer::controller::{Mode, View};
use explorer::display::{probability_bar, visible_token};
use explorer::{Command, Controller, ExplorerConfig, HttpGateway, InferenceGateway, ViewEvent};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

const BAR_WIDTH: usize = 20;

fn print_usage() {
    eprintln!(
        r#"
{} - Explore next-token candidates and beam paths interactively

{}
    explorer [OPTIONS]

{}
    -c, --config <FILE>     TOML configuration file
    -u, --url <URL>         Inference gateway URL (default: http://localhost:8000)
    --context <TEXT>        Initial context
    -v, --verbose           Debug logging to stderr
    -vv                     Trace logging to stderr
    -h, --help              Print this help message

{}
{}
"#,
        "Token Explorer".bold(),
        "USAGE:".bold(),
        "OPTIONS:".bold(),
        "COMMANDS:".bold(),
        HELP,
    );
}

struct CliArgs {
    config: Option<PathBuf>,
    url: Option<String>,
    context: Option<String>,
    verbose: u8, // 0=warn, 1=debug, 2=trace
}

fn parse_args() -> Result<CliArgs> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(0);
    }

    let mut config = None;
    let mut url = None;
    let mut context = None;
    let mut verbose: u8 = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let path = args.get(i).context("--config needs a file")?;
                config = Some(PathBuf::from(path));
            }
            "--url" | "-u" => {
                i += 1;
                url = Some(args.get(i).context("--url needs a value")?.clone());
            }
            "--context" => {
                i += 1;
                context = Some(args.get(i).context("--context needs a value")?.clone());
            }
            "--verbose" | "-v" => {
                verbose = verbose.max(1);
            }
            "-vv" => {
                verbose = 2;
            }
            other => {
                print_usage();
                anyhow::bail!("Unknown argument: {other}");
            }
        }
        i += 1;
    }

    Ok(CliArgs {
        config,
        url,
        context,
        verbose,
    })
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn render(event: ViewEvent) {
    match event {
        ViewEvent::Context(context) => {
            println!();
            println!("{} {}", "Context:".dimmed(), context.bold());
        }
        ViewEvent::Chat {
            system_prompt,
            turns,
            partial,
            generating,
        } => {
            println!();
            if !system_prompt.is_empty() {
                println!("{} {}", "System:".dimmed(), system_prompt);
            }
            for turn in turns {
                match turn.role {
                    Role::User => println!("{} {}", "USER:".blue().bold(), turn.content),
                    Role::Assistant => println!("{} {}", "ASSISTANT:".green().bold(), turn.content),
                }
            }
            if generating {
                println!("{} {}{}", "ASSISTANT:".green().bold(), partial.trim_start(), "▌".dimmed());
            }
        }
        ViewEvent::Mode(mode) => {
            let name = match mode {
                Mode::Text => "text",
                Mode::Chat => "chat",
            };
            println!("{} {}", "Mode:".dimmed(), name.cyan());
        }
        ViewEvent::View(view) => {
            let name = match view {
                View::Candidates => "candidates",
                View::Beam => "beam paths",
            };
            println!("{} {}", "Showing:".dimmed(), name.cyan());
        }
        ViewEvent::Loading(_) | ViewEvent::BeamLoading(false) => {}
        ViewEvent::BeamLoading(true) => println!("{}", "Generating beam paths...".dimmed()),
        ViewEvent::Candidates(batch) => {
            if batch.is_empty() {
                println!("{}", "(no candidates)".dimmed());
            }
            for (rank, candidate) in batch.candidates.iter().enumerate() {
                let line = format!(
                    "{:>3}  {:<16} {} {:>6.2}%",
                    rank + 1,
                    visible_token(&candidate.token),
                    probability_bar(candidate.probability_pct, BAR_WIDTH),
                    candidate.probability_pct,
                );
                if candidate.excluded {
                    println!("{}", line.dimmed());
                } else {
                    println!("{line}");
                }
            }
        }
        ViewEvent::AutoPlay(true) => println!("{}", "Auto-play started".yellow()),
        ViewEvent::AutoPlay(false) => println!("{}", "Auto-play stopped".yellow()),
        ViewEvent::Pending(token) => println!("{} {}", "→".yellow(), visible_token(&token).yellow()),
        ViewEvent::Committed(token) => println!("{} {}", "+".green(), visible_token(&token).green()),
        ViewEvent::Beams { context, paths } => {
            if paths.is_empty() {
                println!("{}", "(no beam paths)".dimmed());
            }
            for path in paths {
                let continuation: String = path
                    .tokens
                    .iter()
                    .map(|t| visible_token(&t.token))
                    .collect::<Vec<_>>()
                    .join("|");
                println!(
                    "{}  {:>7.3}%  {}{}  {}",
                    path.id.cyan(),
                    path.cumulative_probability * 100.0,
                    context.dimmed(),
                    path.continuation(&context).bold(),
                    continuation.dimmed(),
                );
            }
        }
        ViewEvent::BeamsEmpty => println!("{}", "Enter some context to explore beam paths".dimmed()),
        ViewEvent::BeamError(error) => eprintln!("{} {}", "Beam error:".red(), error),
        ViewEvent::PathExtending(id) => println!("{} {}", "Extending".dimmed(), id.cyan()),
        ViewEvent::PathExtendFailed { id, error } => {
            eprintln!("{} {}: {}", "Extend failed".red(), id, error)
        }
        ViewEvent::InputEnabled(enabled) => {
            if !enabled {
                println!("{}", "Assistant is generating (:finish to stop)".dimmed());
            }
        }
        ViewEvent::ControlsEnabled(false) => println!("{}", "Switching model...".yellow()),
        ViewEvent::ControlsEnabled(true) => {}
        ViewEvent::Models(models) => {
            for model in models {
                println!("  {}  {}", model.filename.cyan(), format!("{:.0} MB", model.size_mb).dimmed());
            }
        }
        ViewEvent::ModelSwitched(filename) => println!("{} {}", "Now using".green(), filename.bold()),
        ViewEvent::Error(error) => eprintln!("{} {}", "Error:".red(), error),
        ViewEvent::Fatal(error) => eprintln!("{} {}", "Stopped:".red().bold(), error),
    }
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    init_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(path) => ExplorerConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => ExplorerConfig::default(),
    };
    if let Some(url) = args.url {
        config.gateway.base_url = url;
    }
    if let Some(context) = args.context {
        config.initial_context = context;
    }

    let gateway = HttpGateway::new(config.gateway.base_url.clone(), config.gateway.timeout())
        .context("Failed to create HTTP client")?;

    let url = gateway.base_url();
    let health = gateway.health_check().await;
    if health.healthy {
        info!(url, latency_ms = ?health.latency_ms, "Gateway reachable");
        eprintln!("{} {}", "Connected to".green(), url);
    } else {
        let error = health.error.unwrap_or_default();
        warn!(url, error = %error, "Gateway health check failed");
        eprintln!(
            "{} {} is not responding ({}); requests will be retried as you go",
            "Warning:".yellow(),
            url,
            error
        );
    }
    eprintln!("{}", "Type :help for commands".dimmed());

    let mut console = ConsoleState::new(config.sampling.clamped(), config.beam);
    let (view_tx, mut view_rx) = mpsc::unbounded_channel();
    let (controller, events) = Controller::new(config, Arc::new(gateway), view_tx);
    let handle = controller.handle();

    let controller_task = tokio::spawn(controller.run(events));
    let renderer = tokio::spawn(async move {
        while let Some(event) = view_rx.recv().await {
            render(event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match console.parse(&line) {
            Input::Empty => {}
            Input::Help => eprintln!("{HELP}"),
            Input::Invalid(message) => eprintln!("{} {}", "Error:".red(), message),
            Input::Command(command) => {
                let quit = command == Command::Shutdown;
                if !handle.send(command) || quit {
                    break;
                }
            }
        }
    }

    handle.send(Command::Shutdown);
    controller_task.await.context("Controller task failed")?;
    renderer.await.context("Renderer task failed")?;
    Ok(())
}
