use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{BackendApi, ProblemSession, SessionEvent, SubmitDisposition};
use shared::domain::Difficulty;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod notify;
mod stats;

use config::{apply_cli_overrides, load_settings, normalize_server_url};
use notify::{notify, print_problem, ActivitySpinner, Notice};
use stats::SessionStats;

#[derive(Parser, Debug)]
#[command(name = "calcduo", about = "Terminal client for a remote math drill service")]
struct Args {
    /// Base address of the problem service
    #[arg(long)]
    server_url: Option<String>,
    /// Difficulty of the first problem: easy, medium, or hard
    #[arg(long)]
    difficulty: Option<Difficulty>,
    /// Request timeout in seconds (transport default when unset)
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Probe the backend health endpoint and exit
    #[arg(long)]
    check: bool,
}

/// One line of user input, either an answer or a slash command.
#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Answer(String),
    NewProblem,
    SwitchDifficulty(Difficulty),
    Stats,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

impl ShellCommand {
    fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return ShellCommand::Empty;
        }
        let Some(command) = trimmed.strip_prefix('/') else {
            return ShellCommand::Answer(trimmed.to_string());
        };

        let mut parts = command.split_whitespace();
        match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("new") => ShellCommand::NewProblem,
            Some("difficulty") => match parts.next().map(str::parse::<Difficulty>) {
                Some(Ok(level)) => ShellCommand::SwitchDifficulty(level),
                _ => ShellCommand::Unknown(trimmed.to_string()),
            },
            Some("stats") => ShellCommand::Stats,
            Some("help") => ShellCommand::Help,
            Some("quit") | Some("exit") | Some("q") => ShellCommand::Quit,
            _ => ShellCommand::Unknown(trimmed.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    apply_cli_overrides(
        &mut settings,
        args.server_url.as_deref(),
        args.difficulty,
        args.timeout_secs,
    );
    let server_url = normalize_server_url(&settings.server_url)?;

    let mut http = reqwest::Client::builder();
    if let Some(secs) = settings.request_timeout_secs {
        http = http.timeout(Duration::from_secs(secs));
    }
    let api = BackendApi::with_client(
        http.build().context("failed to build HTTP client")?,
        server_url,
    );

    if args.check {
        let healthy = api
            .health()
            .await
            .with_context(|| format!("health probe against {} failed", api.base_url()))?;
        if !healthy {
            bail!("backend at {} reports not ok", api.base_url());
        }
        println!("backend at {} is healthy", api.base_url());
        return Ok(());
    }

    // Startup connectivity probe; log-only, never gates the session.
    match api.health().await {
        Ok(true) => info!(server_url = api.base_url(), "backend: healthy"),
        Ok(false) => warn!(server_url = api.base_url(), "backend: reports not ok"),
        Err(error) => warn!(server_url = api.base_url(), %error, "backend: health probe failed"),
    }

    let difficulty = settings.difficulty;
    print_banner(difficulty);

    let session = ProblemSession::with_difficulty(Arc::new(api), difficulty);
    let mut events = session.subscribe_events();
    tokio::spawn({
        let session = session.clone();
        async move { session.ensure_started().await }
    });

    run_shell(session, &mut events).await
}

async fn run_shell(
    session: Arc<ProblemSession>,
    events: &mut broadcast::Receiver<SessionEvent>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stats = SessionStats::default();
    let mut spinner: Option<ActivitySpinner> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => handle_session_event(event, &mut stats, &mut spinner),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "shell: event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = lines.next_line() => match line.context("failed to read stdin")? {
                Some(line) => {
                    if !handle_input_line(&session, &line, &stats) {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    spinner.take();
    println!();
    println!("Session summary: {stats}");
    Ok(())
}

fn handle_session_event(
    event: SessionEvent,
    stats: &mut SessionStats,
    spinner: &mut Option<ActivitySpinner>,
) {
    match event {
        SessionEvent::LoadStarted => {
            *spinner = Some(ActivitySpinner::start("Fetching a problem…"));
        }
        SessionEvent::ProblemLoaded { problem } => {
            spinner.take();
            print_problem(&problem.prompt);
        }
        SessionEvent::LoadFailed { message } => {
            spinner.take();
            notify(&Notice::error(message));
        }
        SessionEvent::SubmitStarted => {
            *spinner = Some(ActivitySpinner::start("Checking your answer…"));
        }
        SessionEvent::AnswerCorrect { feedback } => {
            spinner.take();
            stats.record_correct();
            notify(&Notice::success(feedback));
        }
        SessionEvent::AnswerIncorrect { feedback } => {
            spinner.take();
            stats.record_incorrect();
            notify(&Notice::failure(feedback));
        }
        SessionEvent::ProblemExpired { message } => {
            spinner.take();
            notify(&Notice::info(message));
        }
        SessionEvent::NoLiveProblem { message } => {
            spinner.take();
            notify(&Notice::info(message));
        }
        SessionEvent::SubmitFailed { message } => {
            spinner.take();
            notify(&Notice::error(message));
        }
    }
}

/// Dispatches one input line; returns false when the user asked to quit.
/// Controller calls are spawned so the input loop keeps draining events.
fn handle_input_line(session: &Arc<ProblemSession>, line: &str, stats: &SessionStats) -> bool {
    match ShellCommand::parse(line) {
        ShellCommand::Empty => {}
        ShellCommand::Quit => return false,
        ShellCommand::Help => print_help(),
        ShellCommand::Stats => println!("This session: {stats}"),
        ShellCommand::NewProblem => {
            let session = session.clone();
            tokio::spawn(async move { session.load_problem().await });
        }
        ShellCommand::SwitchDifficulty(level) => {
            println!("Switching to {level} problems.");
            let session = session.clone();
            tokio::spawn(async move { session.fetch_new_problem(level).await });
        }
        ShellCommand::Answer(text) => {
            let session = session.clone();
            tokio::spawn(async move {
                if session.submit_answer(&text).await == SubmitDisposition::Busy {
                    notify(&Notice::info("Still waiting on the server; answer ignored."));
                }
            });
        }
        ShellCommand::Unknown(raw) => {
            println!("Unrecognized command: {raw}");
            print_help();
        }
    }
    true
}

fn print_banner(difficulty: Difficulty) {
    println!("Calcduo: type your answer and press enter, or /help for commands.");
    println!("Starting with {difficulty} problems.");
}

fn print_help() {
    println!("Commands:");
    println!("  /new                            fetch another problem");
    println!("  /difficulty <easy|medium|hard>  switch level and fetch");
    println!("  /stats                          show this session's tally");
    println!("  /help                           show this help");
    println!("  /quit                           leave");
    println!("Any other input is submitted as your answer.");
}
