use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nix::libc;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::privilege::PrivilegeMonitor;
use crate::reports::parse_report_name;
use crate::task::terminal_text::render_plain;
use crate::task::{Canceller, CreateOptions, ReportTask, RunOutcome, TaskState, CANCELLED};
use crate::ui::{KeyValue, MessageBlock, PlainRenderer, Renderer};
use crate::CreateArgs;

use super::{into_output, ConsoleContext, ConsoleError};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Routes Ctrl-C to the running report for as long as it is alive.
struct InterruptGuard {
    previous: Option<SigAction>,
    done: Arc<AtomicBool>,
    watcher: Option<thread::JoinHandle<()>>,
}

impl InterruptGuard {
    fn install(canceller: Canceller) -> Self {
        INTERRUPTED.store(false, Ordering::SeqCst);
        let action = SigAction::new(
            SigHandler::Handler(on_interrupt),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler only stores to an atomic.
        let previous = match unsafe { sigaction(Signal::SIGINT, &action) } {
            Ok(previous) => Some(previous),
            Err(error) => {
                log::warn!("could not install Ctrl-C handler: {error}");
                None
            }
        };
        let done = Arc::new(AtomicBool::new(false));
        let watcher_done = Arc::clone(&done);
        let watcher = thread::Builder::new()
            .name("sos-interrupt".to_owned())
            .spawn(move || {
                while !watcher_done.load(Ordering::SeqCst) {
                    if INTERRUPTED.swap(false, Ordering::SeqCst) {
                        canceller.close(CANCELLED);
                        return;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            })
            .map_err(|error| log::warn!("could not start interrupt watcher: {error}"))
            .ok();
        Self {
            previous,
            done,
            watcher,
        }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
        if let Some(previous) = self.previous.take() {
            // SAFETY: restores the disposition that was active before install.
            let _ = unsafe { sigaction(Signal::SIGINT, &previous) };
        }
    }
}

pub(super) fn run_create(ctx: &ConsoleContext, args: &CreateArgs) -> Result<String, ConsoleError> {
    if ctx.superuser_monitor().allowed() == Some(false) {
        return Err(ConsoleError::AccessDenied {
            operation: "create reports",
        });
    }
    let options = CreateOptions {
        label: args.label.clone(),
        passphrase: args.passphrase.clone(),
        obfuscate: args.obfuscate,
        verbose: args.verbose,
    };

    let mut state = TaskState::default();
    state.begin();
    let task = match ReportTask::start(&options, &ctx.config.sos_command, &ctx.elevation) {
        Ok(task) => task,
        Err(error) => {
            state.spawn_failed(&error);
            return Err(error.into());
        }
    };

    let mut progress_renderer = PlainRenderer::stderr(ctx.output_mode);
    let progress = progress_renderer.progress("Creating report")?;
    let guard = InterruptGuard::install(task.canceller());
    let result = task.wait(|percent| {
        state.record_progress(percent);
        progress.set_percent(percent);
    });
    drop(guard);

    match state.settle(&result) {
        RunOutcome::Completed => {
            progress.finish_success("Report created");
            let output = result.map(|captured| captured.output).unwrap_or_default();
            let mut renderer = ctx.buffer_renderer();
            let mut block = MessageBlock::new("Report created", "sos report finished");
            if let Some(archive) = generated_archive(&output) {
                block = MessageBlock::new("Report created", archive.display().to_string())
                    .with_hint("Use `sos-console download <report>` to copy it");
            }
            renderer.success_block(&block)?;
            if options.passphrase.is_some() || options.obfuscate {
                renderer.key_values(&[
                    KeyValue::new("encrypted", options.passphrase.is_some().to_string()),
                    KeyValue::new("obfuscated", options.obfuscate.to_string()),
                ])?;
            }
            into_output(renderer)
        }
        RunOutcome::Cancelled => {
            progress.finish_error("Cancelled");
            Err(ConsoleError::Cancelled)
        }
        RunOutcome::Failed => {
            progress.finish_error("Failed");
            Err(ConsoleError::ReportFailed {
                message: state.error.unwrap_or_default(),
                detail: render_plain(state.error_detail.as_deref().unwrap_or_default()),
            })
        }
    }
}

/// Finds the archive path sos prints once it is done.
pub fn generated_archive(output: &str) -> Option<PathBuf> {
    render_plain(output)
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('/'))
        .map(PathBuf::from)
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| parse_report_name(name).is_some())
        })
}
