pub mod progress;
pub mod spawn;
pub mod terminal_text;

pub use progress::ProgressParser;
pub use spawn::{
    spawn, Canceller, TaskError, TaskFailure, TaskHandle, TaskOutput, TaskProblem, TaskSpec,
    CANCELLED,
};

use crate::privilege::{Elevation, Privilege};

pub const REPORT_FAILED: &str = "sos report failed";

/// User choices for a new report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateOptions {
    pub label: Option<String>,
    pub passphrase: Option<String>,
    pub obfuscate: bool,
    pub verbose: bool,
}

impl CreateOptions {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(label) = self.label.as_ref().filter(|label| !label.is_empty()) {
            args.push("--label".to_owned());
            args.push(label.clone());
        }
        if let Some(passphrase) = self.passphrase.as_ref().filter(|pass| !pass.is_empty()) {
            args.push("--encrypt-pass".to_owned());
            args.push(passphrase.clone());
        }
        if self.obfuscate {
            args.push("--clean".to_owned());
        }
        if self.verbose {
            args.push("-v".to_owned());
        }
        args
    }
}

/// A running `sos report` with its progress parser.
pub struct ReportTask {
    handle: TaskHandle,
    parser: ProgressParser,
}

impl ReportTask {
    pub fn start(
        options: &CreateOptions,
        sos_command: &[String],
        elevation: &Elevation,
    ) -> Result<Self, TaskError> {
        let mut argv = sos_command.to_vec();
        argv.extend(options.to_args());
        let spec = TaskSpec {
            argv,
            privilege: Privilege::Require,
            merge_stderr: true,
            pty: true,
        };
        log::debug!(
            "starting `{}` (label={}, encrypted={}, obfuscate={})",
            sos_command.join(" "),
            options.label.as_deref().unwrap_or("-"),
            options.passphrase.is_some(),
            options.obfuscate
        );
        Ok(Self {
            handle: spawn(&spec, elevation)?,
            parser: ProgressParser::new(),
        })
    }

    pub fn canceller(&self) -> Canceller {
        self.handle.canceller()
    }

    /// Waits for sos to finish, reporting each new progress value.
    pub fn wait<F>(self, mut on_progress: F) -> Result<TaskOutput, TaskFailure>
    where
        F: FnMut(f64),
    {
        let Self { handle, mut parser } = self;
        let mut last: Option<f64> = None;
        let result = handle.wait(|chunk| {
            let current = parser.feed(chunk);
            if current != last {
                if let Some(value) = current {
                    on_progress(value);
                }
                last = current;
            }
        });
        if let Err(failure) = &result {
            if !failure.is_cancelled() {
                log::error!(
                    "Failed to call sos report: problem={} message={}",
                    failure.problem.id(),
                    failure.message
                );
            }
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// What a report dialog shows about the current run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskState {
    pub running: bool,
    pub progress_percent: Option<f64>,
    pub error: Option<String>,
    pub error_detail: Option<String>,
}

impl TaskState {
    pub fn begin(&mut self) {
        *self = TaskState {
            running: true,
            ..TaskState::default()
        };
    }

    pub fn record_progress(&mut self, percent: f64) {
        self.progress_percent = Some(percent.clamp(0.0, 100.0));
    }

    /// Cancellation ends the run quietly; only real failures fill `error`.
    pub fn settle(&mut self, result: &Result<TaskOutput, TaskFailure>) -> RunOutcome {
        self.running = false;
        match result {
            Ok(_) => RunOutcome::Completed,
            Err(failure) if failure.is_cancelled() => RunOutcome::Cancelled,
            Err(failure) => {
                let message = if failure.message.trim().is_empty() {
                    REPORT_FAILED.to_owned()
                } else {
                    failure.message.clone()
                };
                self.error = Some(message);
                self.error_detail = Some(failure.output.clone());
                RunOutcome::Failed
            }
        }
    }

    pub fn spawn_failed(&mut self, error: &TaskError) {
        self.running = false;
        self.error = Some(error.to_string());
        self.error_detail = None;
    }
}

#[cfg(test)]
#[path = "../tests/task_tests.rs"]
mod tests;
