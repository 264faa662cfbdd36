use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::artifacts::{DownloadError, RemoveError};
use crate::config::{ConfigError, ConsoleConfig};
use crate::fsinfo::{PollingFsInfo, PROBLEM_ACCESS_DENIED};
use crate::lister::{ListerError, ReportLister};
use crate::privilege::{Elevation, SuperuserMonitor};
use crate::pwscore::PasswordError;
use crate::reports::{parse_report_name, ReportDirResolver, SosConfReportDir};
use crate::task::TaskError;
use crate::ui::theme::resolve_color_enabled;
use crate::ui::{MessageBlock, OutputMode, PlainRenderer};
use crate::{Command, Invocation};

mod create;
mod listing;
mod operations;

pub use create::generated_archive;
pub use listing::{relative_age, render_listing};
pub use operations::resolve_report;

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug)]
pub enum ConsoleError {
    Config(ConfigError),
    Lister(ListerError),
    /// The report directory or operation needs administrative rights.
    AccessDenied { operation: &'static str },
    Watch(String),
    Task(TaskError),
    ReportFailed { message: String, detail: String },
    Cancelled,
    Download(DownloadError),
    Remove(RemoveError),
    Password(PasswordError),
    NotAReport(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    Ui(String),
}

impl std::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleError::Config(err) => write!(f, "{err}"),
            ConsoleError::Lister(err) => write!(f, "{err}"),
            ConsoleError::AccessDenied { operation } => {
                write!(f, "administrative access is required to {operation}")
            }
            ConsoleError::Watch(problem) => write!(f, "failed to list reports: {problem}"),
            ConsoleError::Task(err) => write!(f, "{err}"),
            ConsoleError::ReportFailed { message, .. } => write!(f, "{message}"),
            ConsoleError::Cancelled => write!(f, "cancelled"),
            ConsoleError::Download(err) => write!(f, "{err}"),
            ConsoleError::Remove(err) => write!(f, "{err}"),
            ConsoleError::Password(err) => write!(f, "{err}"),
            ConsoleError::NotAReport(arg) => write!(
                f,
                "`{arg}` is not a sos report archive (expected sosreport-*.tar.*)"
            ),
            ConsoleError::Io(err) => write!(f, "{err}"),
            ConsoleError::Json(err) => write!(f, "failed to encode JSON output: {err}"),
            ConsoleError::Ui(msg) => write!(f, "ui render failed: {msg}"),
        }
    }
}

impl std::error::Error for ConsoleError {}

impl ConsoleError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ConsoleError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }

    /// The block the binary prints on stderr for this failure.
    pub fn message_block(&self) -> MessageBlock {
        match self {
            ConsoleError::AccessDenied { operation } => MessageBlock::new(
                "Administrative access required",
                format!("You need administrative access to {operation}."),
            )
            .with_hint("Run as root or allow `sudo --non-interactive` for this user"),
            ConsoleError::ReportFailed { message, detail } => {
                let body = if detail.trim().is_empty() {
                    message.clone()
                } else {
                    detail.clone()
                };
                MessageBlock::new(message.clone(), body)
            }
            ConsoleError::Cancelled => {
                MessageBlock::new("Cancelled", "The report run was cancelled")
            }
            ConsoleError::NotAReport(_) => MessageBlock::new("Unknown report", self.to_string())
                .with_hint("Run `sos-console list` to see available reports"),
            ConsoleError::Config(_) => MessageBlock::new("Invalid configuration", self.to_string()),
            ConsoleError::Password(_) => MessageBlock::new("Password rejected", self.to_string()),
            _ => MessageBlock::new("Command failed", self.to_string()),
        }
    }
}

impl From<ConfigError> for ConsoleError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ListerError> for ConsoleError {
    fn from(value: ListerError) -> Self {
        Self::Lister(value)
    }
}

impl From<TaskError> for ConsoleError {
    fn from(value: TaskError) -> Self {
        Self::Task(value)
    }
}

impl From<DownloadError> for ConsoleError {
    fn from(value: DownloadError) -> Self {
        Self::Download(value)
    }
}

impl From<RemoveError> for ConsoleError {
    fn from(value: RemoveError) -> Self {
        Self::Remove(value)
    }
}

impl From<PasswordError> for ConsoleError {
    fn from(value: PasswordError) -> Self {
        Self::Password(value)
    }
}

impl From<std::io::Error> for ConsoleError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<crate::ui::UiError> for ConsoleError {
    fn from(value: crate::ui::UiError) -> Self {
        Self::Ui(value.to_string())
    }
}

/// Maps a sticky watch problem onto the error the user sees.
pub fn problem_error(problem: &str) -> ConsoleError {
    if problem == PROBLEM_ACCESS_DENIED {
        ConsoleError::AccessDenied {
            operation: "list sos reports",
        }
    } else {
        ConsoleError::Watch(problem.to_owned())
    }
}

/// Everything a command needs from its environment.
pub struct ConsoleContext {
    pub config: ConsoleConfig,
    pub elevation: Elevation,
    pub output_mode: OutputMode,
}

impl ConsoleContext {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConsoleError> {
        let config = ConsoleConfig::load(config_path)?;
        let elevation = Elevation::new(config.superuser_command.clone());
        Ok(Self {
            config,
            elevation,
            output_mode: OutputMode::from_env(),
        })
    }

    pub fn report_dir_resolver(&self) -> SosConfReportDir {
        SosConfReportDir::new(self.config.report_dir.clone())
    }

    pub fn report_dir(&self) -> Result<PathBuf, ConsoleError> {
        self.report_dir_resolver()
            .resolve()
            .map_err(|error| ConsoleError::Lister(ListerError::ReportDir(error)))
    }

    pub fn lister(&self) -> ReportLister {
        ReportLister::new(
            Box::new(PollingFsInfo::new(self.config.poll_interval())),
            Box::new(self.report_dir_resolver()),
            Box::new(SuperuserMonitor::new(self.elevation.clone())),
        )
    }

    pub fn superuser_monitor(&self) -> SuperuserMonitor {
        SuperuserMonitor::new(self.elevation.clone())
    }

    /// Renderer that buffers into a string, coloured like stdout would be.
    pub(crate) fn buffer_renderer(&self) -> PlainRenderer<Vec<u8>> {
        let color_enabled = resolve_color_enabled(self.output_mode, std::io::stdout().is_terminal());
        PlainRenderer::new(Vec::<u8>::new(), color_enabled)
    }
}

pub(crate) fn into_output(renderer: PlainRenderer<Vec<u8>>) -> Result<String, ConsoleError> {
    String::from_utf8(renderer.into_inner())
        .map_err(|error| ConsoleError::Ui(format!("invalid utf-8 in rendered output: {error}")))
}

/// Runs one command. Returned text goes to stdout; streaming commands
/// print as they go and return an empty string.
pub fn run_command(invocation: Invocation) -> Result<String, ConsoleError> {
    let Invocation { config, command } = invocation;
    if command == Command::Help {
        return Ok(String::new());
    }
    let ctx = ConsoleContext::load(config.as_deref())?;
    match command {
        Command::Help => Ok(String::new()),
        Command::List(args) => listing::run_list(&ctx, &args),
        Command::Watch(args) => listing::run_watch(&ctx, &args),
        Command::Create(args) => create::run_create(&ctx, &args),
        Command::Download(args) => operations::run_download(&ctx, &args),
        Command::Remove(args) => operations::run_remove(&ctx, &args),
        Command::Pwscore(args) => operations::run_pwscore(&ctx, &args),
    }
}

pub(crate) fn is_report_file_name(name: &str) -> bool {
    parse_report_name(name).is_some()
}

#[cfg(test)]
#[path = "../tests/console_tests.rs"]
mod tests;
