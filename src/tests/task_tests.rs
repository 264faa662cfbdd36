use super::spawn::{drain_utf8, shell_quote};
use super::{
    CreateOptions, RunOutcome, TaskError, TaskFailure, TaskOutput, TaskProblem, TaskState,
    CANCELLED, REPORT_FAILED,
};

fn failure(problem: TaskProblem, message: &str) -> Result<TaskOutput, TaskFailure> {
    Err(TaskFailure {
        problem,
        message: message.to_owned(),
        output: "Starting 1/2 [Running: a]\r\nboom\r\n".to_owned(),
    })
}

#[test]
fn create_options_map_to_sos_flags() {
    let options = CreateOptions {
        label: Some("case-42".to_owned()),
        passphrase: Some("s3cret".to_owned()),
        obfuscate: true,
        verbose: true,
    };
    assert_eq!(
        options.to_args(),
        vec!["--label", "case-42", "--encrypt-pass", "s3cret", "--clean", "-v"]
    );
}

#[test]
fn empty_label_and_passphrase_are_skipped() {
    let options = CreateOptions {
        label: Some(String::new()),
        passphrase: Some(String::new()),
        ..CreateOptions::default()
    };
    assert!(options.to_args().is_empty());
}

#[test]
fn begin_resets_previous_error_and_progress() {
    let mut state = TaskState {
        running: false,
        progress_percent: Some(40.0),
        error: Some("old".to_owned()),
        error_detail: Some("old output".to_owned()),
    };
    state.begin();
    assert_eq!(
        state,
        TaskState {
            running: true,
            ..TaskState::default()
        }
    );
}

#[test]
fn cancelled_run_leaves_error_empty() {
    let mut state = TaskState::default();
    state.begin();
    state.record_progress(30.0);
    let outcome = state.settle(&failure(TaskProblem::Cancelled, CANCELLED));
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(!state.running);
    assert_eq!(state.error, None);
    assert_eq!(state.error_detail, None);
}

#[test]
fn failed_run_keeps_message_and_raw_output() {
    let mut state = TaskState::default();
    state.begin();
    let outcome = state.settle(&failure(
        TaskProblem::ExitCode(1),
        "Process exited with code 1",
    ));
    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(state.error.as_deref(), Some("Process exited with code 1"));
    assert_eq!(
        state.error_detail.as_deref(),
        Some("Starting 1/2 [Running: a]\r\nboom\r\n")
    );
}

#[test]
fn blank_failure_message_falls_back_to_generic_text() {
    let mut state = TaskState::default();
    state.settle(&failure(TaskProblem::Closed("disconnected".to_owned()), " "));
    assert_eq!(state.error.as_deref(), Some(REPORT_FAILED));
}

#[test]
fn only_the_reserved_token_counts_as_cancellation() {
    let cancelled = TaskFailure {
        problem: TaskProblem::Cancelled,
        message: CANCELLED.to_owned(),
        output: String::new(),
    };
    let closed = TaskFailure {
        problem: TaskProblem::Closed("terminated".to_owned()),
        message: "terminated".to_owned(),
        output: String::new(),
    };
    let exited = TaskFailure {
        problem: TaskProblem::ExitCode(130),
        message: "Process exited with code 130".to_owned(),
        output: String::new(),
    };
    assert!(cancelled.is_cancelled());
    assert!(!closed.is_cancelled());
    assert!(!exited.is_cancelled());
}

#[test]
fn completed_run_clears_running() {
    let mut state = TaskState::default();
    state.begin();
    assert_eq!(state.settle(&Ok(TaskOutput::default())), RunOutcome::Completed);
    assert!(!state.running);
}

#[test]
fn spawn_failure_is_reported_without_detail() {
    let mut state = TaskState::default();
    state.begin();
    state.spawn_failed(&TaskError::Spawn {
        command: "sos".to_owned(),
        error: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
    });
    assert!(!state.running);
    assert!(state.error.as_deref().unwrap_or_default().contains("sos"));
}

#[test]
fn drain_utf8_keeps_split_multibyte_sequences() {
    let bytes = "héllo".as_bytes();
    let mut pending = bytes[..2].to_vec();
    assert_eq!(drain_utf8(&mut pending), "h");
    assert_eq!(pending.len(), 1);
    pending.extend_from_slice(&bytes[2..]);
    assert_eq!(drain_utf8(&mut pending), "éllo");
    assert!(pending.is_empty());
}

#[test]
fn shell_quote_leaves_simple_words_alone() {
    assert_eq!(shell_quote("--batch"), "--batch");
    assert_eq!(shell_quote("my label"), "'my label'");
    assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    assert_eq!(shell_quote(""), "''");
}
