use std::io::{ErrorKind, Read};
#[cfg(unix)]
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command as ProcessCommand, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::{setpgid, Pid};

use crate::privilege::{Elevation, Privilege};

/// Close reason that marks a run as stopped by the user rather than failed.
pub const CANCELLED: &str = "cancelled";

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub argv: Vec<String>,
    pub privilege: Privilege,
    pub merge_stderr: bool,
    pub pty: bool,
}

#[derive(Debug)]
pub enum TaskError {
    EmptyCommand,
    Spawn {
        command: String,
        error: std::io::Error,
    },
    MissingStdio {
        command: String,
    },
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::EmptyCommand => write!(f, "no command to run"),
            TaskError::Spawn { command, error } => {
                write!(f, "failed to spawn `{command}`: {error}")
            }
            TaskError::MissingStdio { command } => {
                write!(f, "process `{command}` missing stdout/stderr pipe")
            }
        }
    }
}

impl std::error::Error for TaskError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskProblem {
    Cancelled,
    Closed(String),
    ExitCode(i32),
    Signal(i32),
    WaitFailed(String),
}

impl TaskProblem {
    pub fn id(&self) -> &str {
        match self {
            TaskProblem::Cancelled => CANCELLED,
            TaskProblem::Closed(reason) => reason,
            TaskProblem::ExitCode(_) => "exit-status",
            TaskProblem::Signal(_) => "terminated",
            TaskProblem::WaitFailed(_) => "internal-error",
        }
    }
}

/// A run that did not end with exit code 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub problem: TaskProblem,
    pub message: String,
    /// Everything the process wrote to its output stream.
    pub output: String,
}

impl TaskFailure {
    pub fn is_cancelled(&self) -> bool {
        self.problem.id() == CANCELLED
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TaskFailure {}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskOutput {
    pub output: String,
    pub stderr: String,
}

#[derive(Debug)]
enum TaskEvent {
    Output(String),
    Stderr(String),
    Exit(Result<ExitStatus, String>),
}

/// Asks a running task to stop. The run then fails with the given reason.
#[derive(Debug, Clone)]
pub struct Canceller {
    pid: u32,
    reason: Arc<Mutex<Option<String>>>,
}

impl Canceller {
    pub fn close(&self, reason: &str) {
        if let Ok(mut slot) = self.reason.lock() {
            if slot.is_none() {
                *slot = Some(reason.to_owned());
            }
        }
        log::debug!("closing task {} ({reason})", self.pid);
        #[cfg(unix)]
        {
            let _ = signal_process_group(self.pid, Signal::SIGTERM);
        }
    }

    fn reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|slot| slot.clone())
    }
}

pub struct TaskHandle {
    command: String,
    merge_stderr: bool,
    events: Receiver<TaskEvent>,
    canceller: Canceller,
}

impl TaskHandle {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Blocks until the process exits, passing every output chunk to `on_output`.
    pub fn wait<F>(self, mut on_output: F) -> Result<TaskOutput, TaskFailure>
    where
        F: FnMut(&str),
    {
        let mut output = String::new();
        let mut stderr = String::new();
        for event in self.events.iter() {
            match event {
                TaskEvent::Output(chunk) => {
                    on_output(&chunk);
                    output.push_str(&chunk);
                }
                TaskEvent::Stderr(chunk) => stderr.push_str(&chunk),
                TaskEvent::Exit(exit) => {
                    return settle(
                        self.canceller.reason(),
                        exit,
                        TaskOutput { output, stderr },
                        self.merge_stderr,
                    );
                }
            }
        }
        Err(TaskFailure {
            problem: TaskProblem::WaitFailed("event stream closed".to_owned()),
            message: format!("lost track of `{}`", self.command),
            output,
        })
    }
}

fn settle(
    reason: Option<String>,
    exit: Result<ExitStatus, String>,
    captured: TaskOutput,
    merge_stderr: bool,
) -> Result<TaskOutput, TaskFailure> {
    if let Some(reason) = reason {
        let problem = if reason == CANCELLED {
            TaskProblem::Cancelled
        } else {
            TaskProblem::Closed(reason.clone())
        };
        return Err(TaskFailure {
            problem,
            message: reason,
            output: captured.output,
        });
    }

    let status = match exit {
        Ok(status) => status,
        Err(error) => {
            return Err(TaskFailure {
                message: format!("failed waiting for process: {error}"),
                problem: TaskProblem::WaitFailed(error),
                output: captured.output,
            });
        }
    };
    if status.success() {
        return Ok(captured);
    }

    let (problem, fallback) = match status.code() {
        Some(code) => (
            TaskProblem::ExitCode(code),
            format!("Process exited with code {code}"),
        ),
        None => {
            #[cfg(unix)]
            let signal = status.signal().unwrap_or_default();
            #[cfg(not(unix))]
            let signal = 0;
            (
                TaskProblem::Signal(signal),
                format!("Process terminated by signal {signal}"),
            )
        }
    };
    let stderr = captured.stderr.trim();
    let message = if !merge_stderr && !stderr.is_empty() {
        stderr.to_owned()
    } else {
        fallback
    };
    Err(TaskFailure {
        problem,
        message,
        output: captured.output,
    })
}

pub fn spawn(spec: &TaskSpec, elevation: &Elevation) -> Result<TaskHandle, TaskError> {
    let argv = elevation.argv(&spec.argv, spec.privilege);
    if argv.is_empty() {
        return Err(TaskError::EmptyCommand);
    }
    let command = argv.join(" ");
    let mut process = if spec.pty {
        pty_command(&argv)
    } else {
        let mut process = ProcessCommand::new(&argv[0]);
        process.args(&argv[1..]).stdin(Stdio::null());
        process
    };
    process.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    unsafe {
        process.pre_exec(|| {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(|error| std::io::Error::new(ErrorKind::Other, error.to_string()))
        });
    }

    let mut child = process.spawn().map_err(|error| TaskError::Spawn {
        command: argv[0].clone(),
        error,
    })?;
    let stdout = child.stdout.take().ok_or_else(|| TaskError::MissingStdio {
        command: command.clone(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| TaskError::MissingStdio {
        command: command.clone(),
    })?;

    let (tx, rx) = mpsc::channel::<TaskEvent>();
    let readers = vec![
        spawn_reader(stdout, tx.clone(), false),
        spawn_reader(stderr, tx.clone(), !spec.merge_stderr),
    ];
    let pid = child.id();

    thread::spawn(move || {
        // script(1) ends the session on stdin EOF, so stdin stays open until exit.
        let stdin = child.stdin.take();
        let status = child.wait().map_err(|error| error.to_string());
        drop(stdin);
        for reader in readers {
            let _ = reader.join();
        }
        let _ = tx.send(TaskEvent::Exit(status));
    });

    Ok(TaskHandle {
        command,
        merge_stderr: spec.merge_stderr,
        events: rx,
        canceller: Canceller {
            pid,
            reason: Arc::new(Mutex::new(None)),
        },
    })
}

fn spawn_reader<R>(mut source: R, tx: Sender<TaskEvent>, is_stderr: bool) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        let mut pending = Vec::<u8>::new();
        loop {
            match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let text = drain_utf8(&mut pending);
                    if !text.is_empty() && tx.send(wrap(text, is_stderr)).is_err() {
                        return;
                    }
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        if !pending.is_empty() {
            let _ = tx.send(wrap(
                String::from_utf8_lossy(&pending).into_owned(),
                is_stderr,
            ));
        }
    })
}

fn wrap(text: String, is_stderr: bool) -> TaskEvent {
    if is_stderr {
        TaskEvent::Stderr(text)
    } else {
        TaskEvent::Output(text)
    }
}

/// Takes the decodable prefix of `pending`, leaving a split multi-byte
/// sequence behind for the next read.
pub(crate) fn drain_utf8(pending: &mut Vec<u8>) -> String {
    let decoded = std::str::from_utf8(pending).map(str::to_owned);
    match decoded {
        Ok(text) => {
            pending.clear();
            text
        }
        Err(error) if error.error_len().is_none() => {
            let valid = error.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

/// Runs `argv` under script(1) so tools that check for a terminal keep
/// their interactive output format.
fn pty_command(argv: &[String]) -> ProcessCommand {
    #[cfg(target_os = "macos")]
    {
        let mut process = ProcessCommand::new("script");
        process.arg("-q").arg("/dev/null").args(argv);
        process.stdin(Stdio::piped());
        return process;
    }

    #[allow(unreachable_code)]
    {
        let rendered = argv
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<String>>()
            .join(" ");
        let mut process = ProcessCommand::new("script");
        process
            .arg("--quiet")
            .arg("--return")
            .arg("--flush")
            .arg("--command")
            .arg(rendered)
            .arg("/dev/null");
        process.stdin(Stdio::piped());
        process
    }
}

pub(crate) fn shell_quote(raw: &str) -> String {
    if raw.is_empty() {
        return "''".to_owned();
    }
    if raw
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || "-_./=:,+@".contains(ch))
    {
        return raw.to_owned();
    }
    let escaped = raw.replace('\'', "'\"'\"'");
    format!("'{escaped}'")
}

#[cfg(unix)]
fn signal_process_group(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    let pid = pid as i32;
    if pid > 0 {
        kill(Pid::from_raw(-pid), signal)
    } else {
        Ok(())
    }
}
