//! Interactive shell command parsing

use fbq_client::FeedbackFilters;
use std::path::PathBuf;

/// Help text printed by `:help`
pub const HELP: &str = "\
Type a question to ask it (a new question supersedes the one in flight).
  :expand                      toggle the full progress transcript
  :dev                         toggle the attempt history view
  :feedbacks [office=..] [service=..] [level=..]
                               browse feedbacks (no filters: reset and load all)
  :upload <path.csv>           upload a CSV file for ingestion
  :help                        show this help
  :quit                        leave the shell";

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    Ask(String),
    ToggleExpand,
    ToggleDev,
    /// `None` when no filter was given
    Feedbacks(Option<FeedbackFilters>),
    Upload(PathBuf),
    Help,
    Quit,
    Invalid(String),
}

pub fn parse_line(line: &str) -> ShellCommand {
    let line = line.trim();
    if line.is_empty() {
        return ShellCommand::Empty;
    }
    let Some(command) = line.strip_prefix(':') else {
        return ShellCommand::Ask(line.to_string());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "expand" => ShellCommand::ToggleExpand,
        "dev" => ShellCommand::ToggleDev,
        "help" | "h" => ShellCommand::Help,
        "quit" | "q" | "exit" => ShellCommand::Quit,
        "upload" if rest.is_empty() => {
            ShellCommand::Invalid("usage: :upload <path.csv>".to_string())
        }
        "upload" => ShellCommand::Upload(PathBuf::from(rest)),
        "feedbacks" | "fb" => parse_filters(rest),
        other => ShellCommand::Invalid(format!("unknown command :{} (try :help)", other)),
    }
}

fn parse_filters(args: &str) -> ShellCommand {
    if args.is_empty() {
        return ShellCommand::Feedbacks(None);
    }

    let mut filters = FeedbackFilters::default();
    for arg in args.split_whitespace() {
        let Some((key, value)) = arg.split_once('=') else {
            return ShellCommand::Invalid(format!("expected key=value, got {}", arg));
        };
        let value = Some(value.to_string());
        match key {
            "office" => filters.office = value,
            "service" => filters.service = value,
            "level" => filters.level = value,
            other => return ShellCommand::Invalid(format!("unknown filter {}", other)),
        }
    }
    ShellCommand::Feedbacks(Some(filters))
}
