//! fbq - feedback analytics query client
//!
//! Asks questions against the streaming query backend, browses stored
//! feedbacks, and uploads CSV files for ingestion.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fbq_client::build_info;
use fbq_client::models::{DisplayResponse, Session, SessionState};
use fbq_client::render::{
    render_facets, render_feedback, render_history, render_response, render_transcript,
};
use fbq_client::{
    FeedbackBrowser, FeedbackClient, FeedbackFilters, FrameOutcome, HttpStreamConnector,
    SessionController, UploadClient,
};
use fbq_common::config::{self, ClientConfig, ConfigOverrides, CONFIG_PATH_ENV};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod shell;

use shell::{parse_line, ShellCommand};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "fbq", version, about = "Feedback analytics query client")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Query backend base URL (overrides FBQ_QUERY_URL and the config file)
    #[arg(long, global = true)]
    query_url: Option<String>,

    /// Ingestion backend base URL (overrides FBQ_INGEST_URL and the config file)
    #[arg(long, global = true)]
    ingest_url: Option<String>,

    /// Log level or tracing filter directive (overrides FBQ_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask one question and wait for the answer
    Ask(AskArgs),
    /// List stored feedbacks
    Feedbacks(FeedbackArgs),
    /// Upload a CSV file for ingestion
    Upload {
        /// CSV file to upload
        file: PathBuf,
    },
    /// Interactive session
    Shell,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Question to ask
    question: String,

    /// Print every progress line instead of only the latest
    #[arg(long)]
    expanded: bool,

    /// Print the backend's attempt history after the answer
    #[arg(long)]
    dev: bool,

    /// Use the one-shot endpoint (no progress lines)
    #[arg(long)]
    no_stream: bool,

    /// Write the image facet of the answer to this file
    #[arg(long, value_name = "PATH")]
    save_image: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FeedbackArgs {
    #[arg(long)]
    office: Option<String>,

    #[arg(long)]
    service: Option<String>,

    #[arg(long)]
    level: Option<String>,

    /// Also print the filter values found in the loaded rows
    #[arg(long)]
    facets: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let toml_config =
        config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    let overrides = ConfigOverrides {
        query_url: cli.query_url.clone(),
        ingest_url: cli.ingest_url.clone(),
        log_level: cli.log_level.clone(),
    };
    let config =
        ClientConfig::resolve(toml_config, &overrides).context("Invalid configuration")?;

    init_tracing(&config)?;

    info!(
        "Starting fbq v{} [{}] built {} ({})",
        build_info::VERSION,
        build_info::GIT_HASH,
        build_info::BUILD_TIMESTAMP,
        build_info::BUILD_PROFILE
    );
    info!(
        query_url = %config.query_url,
        ingest_url = %config.ingest_url,
        "Backends configured"
    );

    let ok = match cli.command {
        Command::Ask(args) => run_ask(&config, args).await?,
        Command::Feedbacks(args) => run_feedbacks(&config, args).await?,
        Command::Upload { file } => run_upload(&config, &file).await?,
        Command::Shell => run_shell(&config).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr unless a log
/// file is configured, so stdout only carries answers.
fn init_tracing(config: &ClientConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn run_ask(config: &ClientConfig, args: AskArgs) -> Result<bool> {
    let connector = HttpStreamConnector::new(&config.query_url, config.request_timeout)?;

    if args.no_stream {
        let answer = connector
            .ask_once(&args.question)
            .await
            .context("Query failed")?;
        print_answer(&answer.response, args.dev.then_some(answer.history.as_slice()));
        if let Some(path) = &args.save_image {
            save_image(&answer.response, path)?;
        }
        return Ok(true);
    }

    let mut controller =
        SessionController::new(connector, config.marker).with_stream_timeout(config.stream_timeout);
    if controller.submit(&args.question).is_none() {
        bail!("Question must not be blank");
    }

    let expanded = args.expanded;
    let mut count = 0;
    let state = controller
        .run_to_completion(|line| {
            count += 1;
            if expanded {
                eprintln!("{}. {}", count, line);
            } else {
                eprint!("\r\x1b[2K{}. {}", count, line);
            }
        })
        .await;
    if !expanded && count > 0 {
        eprintln!();
    }

    let session = controller.session();
    if let Some(response) = session.result() {
        let history = (args.dev && state == SessionState::Done).then_some(session.history());
        print_answer(response, history);
        if let (Some(path), SessionState::Done) = (&args.save_image, state) {
            save_image(response, path)?;
        }
    }

    Ok(state == SessionState::Done)
}

fn print_answer(response: &DisplayResponse, history: Option<&[fbq_common::events::AttemptRecord]>) {
    println!("{}", render_response(response));
    if let Some(history) = history {
        println!("\n{}", render_history(history));
    }
}

fn save_image(response: &DisplayResponse, path: &Path) -> Result<()> {
    let Some(image) = &response.image else {
        warn!("Answer has no image to save");
        return Ok(());
    };
    let bytes = image.decode().context("Image payload is not valid base64")?;
    std::fs::write(path, &bytes)
        .with_context(|| format!("Failed to write image to {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "Image saved");
    Ok(())
}

async fn run_feedbacks(config: &ClientConfig, args: FeedbackArgs) -> Result<bool> {
    let client = FeedbackClient::new(&config.query_url, config.request_timeout)?;
    let mut browser = FeedbackBrowser::new(client);

    let filters = FeedbackFilters {
        office: args.office,
        service: args.service,
        level: args.level,
    };
    let state = browser.load(filters).await;

    println!("{}", render_feedback(state));
    if args.facets && state.error().is_none() {
        println!("\n{}", render_facets(state.facets()));
    }
    Ok(state.error().is_none())
}

async fn run_upload(config: &ClientConfig, file: &Path) -> Result<bool> {
    let client = UploadClient::new(&config.ingest_url, config.request_timeout)?;
    let response = client.upload_csv(file).await;
    println!("{}", render_response(&response));
    Ok(true)
}

/// Interactive loop
///
/// Input lines and stream events are handled on this one task, so a new
/// question can supersede one still in flight.
async fn run_shell(config: &ClientConfig) -> Result<bool> {
    let connector = HttpStreamConnector::new(&config.query_url, config.request_timeout)?;
    let mut controller =
        SessionController::new(connector, config.marker).with_stream_timeout(config.stream_timeout);
    let mut browser = FeedbackBrowser::new(FeedbackClient::new(
        &config.query_url,
        config.request_timeout,
    )?);
    let uploader = UploadClient::new(&config.ingest_url, config.request_timeout)?;

    let mut expanded = false;
    let mut dev = false;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let stall_limit = controller.stream_timeout();
    let mut last_activity = Instant::now();

    println!("{}", shell::HELP);
    prompt()?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match parse_line(&line) {
                    ShellCommand::Empty => {}
                    ShellCommand::Ask(question) => {
                        if controller.submit(&question).is_some() {
                            last_activity = Instant::now();
                        }
                    }
                    ShellCommand::ToggleExpand => {
                        expanded = !expanded;
                        println!("expanded view {}", if expanded { "on" } else { "off" });
                        if let Some(view) = render_transcript(controller.session().transcript(), expanded) {
                            println!("{}", view);
                        }
                    }
                    ShellCommand::ToggleDev => {
                        dev = !dev;
                        println!("developer view {}", if dev { "on" } else { "off" });
                    }
                    ShellCommand::Feedbacks(filters) => {
                        let state = match filters {
                            Some(filters) => browser.load(filters).await,
                            None => browser.reset_and_load().await,
                        };
                        println!("{}", render_feedback(state));
                        if state.error().is_none() {
                            println!("\n{}", render_facets(state.facets()));
                        }
                    }
                    ShellCommand::Upload(path) => {
                        let response = uploader.upload_csv(&path).await;
                        println!("{}", render_response(&response));
                    }
                    ShellCommand::Help => println!("{}", shell::HELP),
                    ShellCommand::Quit => break,
                    ShellCommand::Invalid(message) => println!("{}", message),
                }
                prompt()?;
            }
            Some(event) = controller.next_event() => {
                let outcome = controller.handle_event(event);
                if outcome != FrameOutcome::Stale {
                    last_activity = Instant::now();
                }
                match outcome {
                    FrameOutcome::Appended(line) => {
                        let count = controller.session().transcript().len();
                        if expanded {
                            println!("{}. {}", count, line);
                        } else {
                            print!("\r\x1b[2K{}. {}", count, line);
                            std::io::stdout().flush()?;
                        }
                    }
                    outcome if outcome.is_terminal() => {
                        println!();
                        print_finished(controller.session(), dev);
                        prompt()?;
                    }
                    _ => {}
                }
            }
            _ = sleep_until(last_activity + stall_limit.unwrap_or_default()),
                if stall_limit.is_some() && controller.state() == SessionState::Loading => {
                if controller.fail_stalled() {
                    println!();
                    print_finished(controller.session(), dev);
                    prompt()?;
                }
            }
        }
    }

    Ok(true)
}

/// Answer of a finished session, with attempt history in developer view
fn print_finished(session: &Session, dev: bool) {
    if let Some(response) = session.result() {
        let history = (dev && session.state() == SessionState::Done).then_some(session.history());
        print_answer(response, history);
    }
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}
