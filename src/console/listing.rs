use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::lister::WatcherState;
use crate::reports::sorted_newest_first;
use crate::ui::{KeyValue, NoticeLevel, Renderer, TableSpec};
use crate::{ListArgs, WatchArgs};

use super::{into_output, problem_error, ConsoleContext, ConsoleError};

const LIST_TIMEOUT: Duration = Duration::from_secs(30);

pub(super) fn run_list(ctx: &ConsoleContext, args: &ListArgs) -> Result<String, ConsoleError> {
    let mut lister = ctx.lister();
    lister.restart()?;
    let timeout = LIST_TIMEOUT.max(ctx.config.poll_interval() * 3);
    let state = lister.wait_ready(timeout)?.clone();
    if let Some(problem) = &state.problem {
        return Err(problem_error(problem));
    }
    let report_dir = lister
        .report_dir()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    if args.json {
        return Ok(serde_json::to_string_pretty(&listing_json(&report_dir, &state))?);
    }
    let mut renderer = ctx.buffer_renderer();
    render_listing(&mut renderer, &report_dir, &state, now_secs())?;
    into_output(renderer)
}

/// Prints every state change until `--max-events` is reached.
pub(super) fn run_watch(ctx: &ConsoleContext, args: &WatchArgs) -> Result<String, ConsoleError> {
    let mut lister = ctx.lister();
    let updates = lister.subscribe();
    lister.restart()?;
    let interval = ctx.config.poll_interval();
    let mut seen = 0usize;
    let stdout = std::io::stdout();

    loop {
        lister.pump(interval);
        match lister.refresh_privilege() {
            Ok(true) => log::debug!("privilege changed, report watch restarted"),
            Ok(false) => {}
            Err(error) => log::warn!("failed to restart report watch: {error}"),
        }
        while let Ok(state) = updates.try_recv() {
            let report_dir = lister
                .report_dir()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let mut out = stdout.lock();
            if args.json {
                writeln!(
                    out,
                    "{}",
                    serde_json::to_string(&listing_json(&report_dir, &state))?
                )?;
            } else {
                let mut renderer = ctx.buffer_renderer();
                render_watch_update(&mut renderer, &report_dir, &state, now_secs())?;
                out.write_all(&renderer.into_inner())?;
            }
            out.flush()?;
            seen += 1;
            if args.max_events.is_some_and(|max| seen >= max) {
                return Ok(String::new());
            }
        }
    }
}

fn listing_json(report_dir: &Path, state: &WatcherState) -> serde_json::Value {
    json!({
        "report_dir": report_dir,
        "ready": state.ready,
        "problem": state.problem,
        "reports": sorted_newest_first(state.records.values()),
    })
}

pub fn render_listing(
    renderer: &mut dyn Renderer,
    report_dir: &Path,
    state: &WatcherState,
    now: u64,
) -> Result<(), ConsoleError> {
    renderer.section("Reports")?;
    renderer.key_values(&[
        KeyValue::new("directory", report_dir.display().to_string()),
        KeyValue::new("reports", state.records.len().to_string()),
    ])?;
    renderer.text("")?;
    if state.records.is_empty() {
        renderer.notice(NoticeLevel::Info, "no system diagnostic reports")?;
        return Ok(());
    }
    let rows = sorted_newest_first(state.records.values())
        .into_iter()
        .map(|record| {
            let attributes = record.attributes();
            vec![
                record.name.clone(),
                relative_age(record.created_at, now),
                if attributes.is_empty() {
                    "-".to_owned()
                } else {
                    attributes.join(", ")
                },
                record.file_name(),
            ]
        })
        .collect::<Vec<Vec<String>>>();
    renderer.table(&TableSpec::new(
        vec![
            "Report".to_owned(),
            "Created".to_owned(),
            "Attributes".to_owned(),
            "File".to_owned(),
        ],
        rows,
    ))?;
    Ok(())
}

fn render_watch_update(
    renderer: &mut dyn Renderer,
    report_dir: &Path,
    state: &WatcherState,
    now: u64,
) -> Result<(), ConsoleError> {
    if let Some(problem) = &state.problem {
        let error = problem_error(problem);
        renderer.notice(NoticeLevel::Warning, &error.to_string())?;
        return Ok(());
    }
    render_listing(renderer, report_dir, state, now)?;
    renderer.text("")?;
    Ok(())
}

/// Human distance between an archive's mtime and `now`, both unix seconds.
pub fn relative_age(created_at: u64, now: u64) -> String {
    let elapsed = now.saturating_sub(created_at);
    let (count, unit) = match elapsed {
        0..=59 => return "just now".to_owned(),
        60..=3_599 => (elapsed / 60, "minute"),
        3_600..=86_399 => (elapsed / 3_600, "hour"),
        86_400..=2_591_999 => (elapsed / 86_400, "day"),
        2_592_000..=31_535_999 => (elapsed / 2_592_000, "month"),
        _ => (elapsed / 31_536_000, "year"),
    };
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
