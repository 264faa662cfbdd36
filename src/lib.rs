pub mod artifacts;
pub mod config;
pub mod console;
pub mod fsinfo;
pub mod lister;
pub mod privilege;
pub mod pwscore;
pub mod reports;
pub mod task;
pub mod ui;

use std::path::PathBuf;

/// A parsed command line: the global `--config` plus one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config: Option<PathBuf>,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List(ListArgs),
    Watch(WatchArgs),
    Create(CreateArgs),
    Download(DownloadArgs),
    Remove(RemoveArgs),
    Pwscore(PwscoreArgs),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListArgs {
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatchArgs {
    pub json: bool,
    pub max_events: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateArgs {
    pub label: Option<String>,
    pub passphrase: Option<String>,
    pub obfuscate: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArgs {
    pub report: String,
    pub output: Option<PathBuf>,
    pub url_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveArgs {
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PwscoreArgs {
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliParseError {
    MissingValue(&'static str),
    InvalidNumber { flag: &'static str, value: String },
    MissingReport(&'static str),
    UnexpectedArgument(String),
    UnknownCommand(String),
    UnknownArgument(String),
}

impl std::fmt::Display for CliParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliParseError::MissingValue(flag) => write!(f, "{flag} requires a value"),
            CliParseError::InvalidNumber { flag, value } => {
                write!(f, "{flag} expects a positive number, got `{value}`")
            }
            CliParseError::MissingReport(command) => {
                write!(f, "`{command}` requires a report name or path")
            }
            CliParseError::UnexpectedArgument(arg) => write!(f, "unexpected argument: {arg}"),
            CliParseError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            CliParseError::UnknownArgument(arg) => write!(f, "unknown argument: {arg}"),
        }
    }
}

impl std::error::Error for CliParseError {}

pub fn parse_command<I>(args: I) -> Result<Invocation, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let (config, rest) = strip_config_flag(args)?;
    let mut args = rest.into_iter();
    let Some(cmd) = args.next() else {
        return Ok(Invocation {
            config,
            command: Command::Help,
        });
    };

    let command = match cmd.as_str() {
        "--help" | "-h" | "help" => Command::Help,
        "list" => parse_list(args)?,
        "watch" => parse_watch(args)?,
        "create" => parse_create(args)?,
        "download" => parse_download(args)?,
        "remove" => parse_remove(args)?,
        "pwscore" => parse_pwscore(args)?,
        other if other.starts_with('-') => {
            return Err(CliParseError::UnknownArgument(other.to_owned()))
        }
        other => return Err(CliParseError::UnknownCommand(other.to_owned())),
    };
    Ok(Invocation { config, command })
}

/// `--config` may appear anywhere on the line.
fn strip_config_flag<I>(args: I) -> Result<(Option<PathBuf>, Vec<String>), CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config = None;
    let mut rest = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let Some(path) = args.next() else {
                return Err(CliParseError::MissingValue("--config"));
            };
            config = Some(PathBuf::from(path));
        } else if let Some(path) = arg.strip_prefix("--config=") {
            if path.is_empty() {
                return Err(CliParseError::MissingValue("--config"));
            }
            config = Some(PathBuf::from(path));
        } else {
            rest.push(arg);
        }
    }
    Ok((config, rest))
}

fn parse_list<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = ListArgs::default();
    for arg in args {
        match arg.as_str() {
            "--json" => parsed.json = true,
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }
    Ok(Command::List(parsed))
}

fn parse_watch<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut parsed = WatchArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => parsed.json = true,
            "--max-events" => {
                let Some(value) = args.next() else {
                    return Err(CliParseError::MissingValue("--max-events"));
                };
                let count = value
                    .parse::<usize>()
                    .ok()
                    .filter(|count| *count > 0)
                    .ok_or(CliParseError::InvalidNumber {
                        flag: "--max-events",
                        value,
                    })?;
                parsed.max_events = Some(count);
            }
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }
    Ok(Command::Watch(parsed))
}

fn parse_create<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut parsed = CreateArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--label" => {
                let Some(label) = args.next() else {
                    return Err(CliParseError::MissingValue("--label"));
                };
                parsed.label = Some(label);
            }
            "--encrypt-pass" => {
                let Some(passphrase) = args.next() else {
                    return Err(CliParseError::MissingValue("--encrypt-pass"));
                };
                parsed.passphrase = Some(passphrase);
            }
            "--clean" => parsed.obfuscate = true,
            "--verbose" | "-v" => parsed.verbose = true,
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }
    Ok(Command::Create(parsed))
}

fn parse_download<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut report: Option<String> = None;
    let mut output: Option<PathBuf> = None;
    let mut url_only = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--output" | "-o" => {
                let Some(dir) = args.next() else {
                    return Err(CliParseError::MissingValue("--output"));
                };
                output = Some(PathBuf::from(dir));
            }
            "--url" => url_only = true,
            "--help" | "-h" => return Ok(Command::Help),
            other if other.starts_with('-') => {
                return Err(CliParseError::UnknownArgument(other.to_owned()))
            }
            _ if report.is_some() => return Err(CliParseError::UnexpectedArgument(arg)),
            _ => report = Some(arg),
        }
    }
    let report = report.ok_or(CliParseError::MissingReport("download"))?;
    Ok(Command::Download(DownloadArgs {
        report,
        output,
        url_only,
    }))
}

fn parse_remove<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut report: Option<String> = None;
    for arg in args {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            other if other.starts_with('-') => {
                return Err(CliParseError::UnknownArgument(other.to_owned()))
            }
            _ if report.is_some() => return Err(CliParseError::UnexpectedArgument(arg)),
            _ => report = Some(arg),
        }
    }
    let report = report.ok_or(CliParseError::MissingReport("remove"))?;
    Ok(Command::Remove(RemoveArgs { report }))
}

fn parse_pwscore<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = PwscoreArgs::default();
    for arg in args {
        match arg.as_str() {
            "--force" => parsed.force = true,
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }
    Ok(Command::Pwscore(parsed))
}

pub fn usage_text() -> &'static str {
    "sos-console\n\nUSAGE:\n  sos-console [--config <PATH>] <command> [options]\n\nCOMMANDS:\n  list                 List sos reports in the report directory\n  watch                Follow the report directory and print every change\n  create               Run `sos report` with a progress bar (Ctrl-C cancels)\n  download <report>    Copy a report out of the report directory\n  remove <report>      Delete a report and its .asc/.gpg/.md5/.sha256 files\n  pwscore              Score a password read from stdin\n\nOPTIONS (list):\n  --json               Print the listing as JSON\n\nOPTIONS (watch):\n  --json               Print one JSON state per line\n  --max-events <N>     Stop after N state changes\n\nOPTIONS (create):\n  --label <LABEL>      Add a label to the archive name\n  --encrypt-pass <P>   Encrypt the archive with a passphrase\n  --clean              Obfuscate hostnames, IP addresses and user names\n  --verbose            Run sos with verbose logging\n\nOPTIONS (download):\n  --output <DIR>       Destination directory (default: current directory)\n  --url                Print the transport download URL instead of copying\n\nOPTIONS (pwscore):\n  --force              Accept passwords the quality checker rejects\n\nGENERAL:\n  --config <PATH>      Config file (default: $SOS_CONSOLE_CONFIG or /etc/sos-console.toml)\n  -h, --help           Print help\n\nEXIT STATUS:\n  0 success, 1 failure, 2 invalid arguments, 130 cancelled\n"
}

pub fn print_usage() {
    eprintln!("{}", usage_text());
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
