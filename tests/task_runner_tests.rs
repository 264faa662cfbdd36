use sos_console::privilege::{Elevation, Privilege};
use sos_console::task::{spawn, ProgressParser, TaskProblem, TaskSpec, CANCELLED};
use std::thread;
use std::time::{Duration, Instant};

fn unprivileged() -> Elevation {
    Elevation {
        superuser_command: vec!["false".to_owned()],
        is_root: false,
    }
}

fn shell(script: &str, merge_stderr: bool) -> TaskSpec {
    TaskSpec {
        argv: vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()],
        privilege: Privilege::None,
        merge_stderr,
        pty: false,
    }
}

fn pty_shell(script: &str) -> TaskSpec {
    TaskSpec {
        pty: true,
        ..shell(script, true)
    }
}

#[test]
fn task_captures_output_in_order() {
    let handle = spawn(
        &shell("printf 'Starting 1/2\\n'; printf 'Finishing plugins\\n'", true),
        &unprivileged(),
    )
    .expect("spawn");
    let mut chunks = Vec::new();
    let output = handle
        .wait(|chunk| chunks.push(chunk.to_owned()))
        .expect("task succeeds");

    assert_eq!(output.output, "Starting 1/2\nFinishing plugins\n");
    assert_eq!(chunks.concat(), output.output);
}

#[test]
fn merged_stderr_lands_in_output() {
    let handle = spawn(&shell("printf oops 1>&2", true), &unprivileged()).expect("spawn");
    let output = handle.wait(|_| {}).expect("task succeeds");
    assert_eq!(output.output, "oops");
    assert!(output.stderr.is_empty());
}

#[test]
fn non_zero_exit_reports_code_and_output() {
    let handle = spawn(&shell("printf partial; exit 3", true), &unprivileged()).expect("spawn");
    let failure = handle.wait(|_| {}).expect_err("task fails");
    assert_eq!(failure.problem, TaskProblem::ExitCode(3));
    assert_eq!(failure.message, "Process exited with code 3");
    assert_eq!(failure.output, "partial");
    assert!(!failure.is_cancelled());
}

#[test]
fn separate_stderr_becomes_failure_message() {
    let handle = spawn(
        &shell("printf 'no such plugin' 1>&2; exit 1", false),
        &unprivileged(),
    )
    .expect("spawn");
    let failure = handle.wait(|_| {}).expect_err("task fails");
    assert_eq!(failure.message, "no such plugin");
}

#[test]
fn required_privilege_prefixes_superuser_command() {
    // `false` stands in for a superuser command that refuses.
    let spec = TaskSpec {
        privilege: Privilege::Require,
        ..shell("exit 0", true)
    };
    let handle = spawn(&spec, &unprivileged()).expect("spawn");
    assert!(handle.command().starts_with("false sh -c"));
    assert!(handle.wait(|_| {}).is_err());
}

#[test]
fn cancelling_stops_the_process_group() {
    let handle = spawn(&shell("sleep 30 & wait", true), &unprivileged()).expect("spawn");
    let canceller = handle.canceller();
    let started = Instant::now();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        canceller.close(CANCELLED);
    });

    let failure = handle.wait(|_| {}).expect_err("task is cancelled");
    assert!(failure.is_cancelled());
    assert_eq!(failure.problem, TaskProblem::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn closing_with_another_reason_is_a_failure() {
    let handle = spawn(&shell("sleep 30", true), &unprivileged()).expect("spawn");
    let canceller = handle.canceller();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        canceller.close("terminated");
    });

    let failure = handle.wait(|_| {}).expect_err("task is closed");
    assert!(!failure.is_cancelled());
    assert_eq!(failure.problem, TaskProblem::Closed("terminated".to_owned()));
    assert_eq!(failure.message, "terminated");
}

#[test]
fn pty_output_is_terminal_framed_and_parsed() {
    let handle = spawn(
        &pty_shell(
            "printf 'Starting 3/4 x [Running: a]\\n'; printf 'Finishing plugins [Running: b c]\\n'",
        ),
        &unprivileged(),
    )
    .expect("spawn");
    let mut parser = ProgressParser::new();
    let mut percent = None;
    let output = handle
        .wait(|chunk| {
            if let Some(value) = parser.feed(chunk) {
                percent = Some(value);
            }
        })
        .expect("task succeeds");

    assert!(
        output
            .output
            .contains("Starting 3/4 x [Running: a]\r\nFinishing plugins [Running: b c]\r\n"),
        "{:?}",
        output.output
    );
    assert_eq!(percent, Some(50.0));
}

#[test]
fn pty_runs_can_be_cancelled() {
    let handle = spawn(&pty_shell("sleep 30 & wait"), &unprivileged()).expect("spawn");
    let canceller = handle.canceller();
    let started = Instant::now();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        canceller.close(CANCELLED);
    });

    let failure = handle.wait(|_| {}).expect_err("task is cancelled");
    assert_eq!(failure.problem, TaskProblem::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn missing_program_is_a_spawn_error() {
    let spec = TaskSpec {
        argv: vec!["/nonexistent/sos".to_owned()],
        privilege: Privilege::None,
        merge_stderr: true,
        pty: false,
    };
    assert!(spawn(&spec, &unprivileged()).is_err());
}
