use std::io::Read;
use std::path::{Path, PathBuf};

use crate::artifacts::{download_request_url, download_to, remove_report};
use crate::pwscore::{password_quality, PasswordStrength};
use crate::ui::{KeyValue, MessageBlock, Renderer};
use crate::{DownloadArgs, PwscoreArgs, RemoveArgs};

use super::{into_output, is_report_file_name, ConsoleContext, ConsoleError};

/// Accepts a bare archive name (looked up in the report directory) or a path.
pub fn resolve_report(arg: &str, report_dir: &Path) -> Result<PathBuf, ConsoleError> {
    let candidate = Path::new(arg);
    let is_archive = candidate
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(is_report_file_name);
    if !is_archive {
        return Err(ConsoleError::NotAReport(arg.to_owned()));
    }
    if candidate.components().count() > 1 {
        Ok(candidate.to_path_buf())
    } else {
        Ok(report_dir.join(candidate))
    }
}

fn report_path(ctx: &ConsoleContext, arg: &str) -> Result<PathBuf, ConsoleError> {
    // Only bare names need the report directory.
    if Path::new(arg).components().count() > 1 {
        return resolve_report(arg, Path::new(""));
    }
    resolve_report(arg, &ctx.report_dir()?)
}

pub(super) fn run_download(
    ctx: &ConsoleContext,
    args: &DownloadArgs,
) -> Result<String, ConsoleError> {
    let path = report_path(ctx, &args.report)?;
    if args.url_only {
        let session = ctx.config.transport_session()?;
        return Ok(download_request_url(
            &session,
            &path,
            ctx.config.max_read_size,
        )?);
    }

    let dest_dir = match &args.output {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let target = download_to(&path, &dest_dir, ctx.config.max_read_size, &ctx.elevation)?;
    let mut renderer = ctx.buffer_renderer();
    renderer.success_block(&MessageBlock::new(
        "Report downloaded",
        target.display().to_string(),
    ))?;
    into_output(renderer)
}

pub(super) fn run_remove(ctx: &ConsoleContext, args: &RemoveArgs) -> Result<String, ConsoleError> {
    let path = report_path(ctx, &args.report)?;
    let removed = remove_report(&path, &ctx.elevation)?;
    let mut renderer = ctx.buffer_renderer();
    if removed.is_empty() {
        renderer.warning_block(&MessageBlock::new(
            "Nothing to delete",
            format!("no files found for {}", path.display()),
        ))?;
        return into_output(renderer);
    }
    renderer.success_block(&MessageBlock::new(
        "Report deleted",
        path.display().to_string(),
    ))?;
    let items = removed
        .iter()
        .map(|removed| removed.display().to_string())
        .collect::<Vec<String>>();
    renderer.bullet_list("removed", &items)?;
    into_output(renderer)
}

pub(super) fn run_pwscore(ctx: &ConsoleContext, args: &PwscoreArgs) -> Result<String, ConsoleError> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    let password = raw
        .strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(raw.as_str());
    let quality = password_quality(password, args.force, &ctx.config.pwscore_path)?;

    let mut renderer = ctx.buffer_renderer();
    let mut items = vec![
        KeyValue::new("score", quality.value.to_string()),
        KeyValue::new(
            "strength",
            PasswordStrength::from_score(quality.value).label(),
        ),
    ];
    if let Some(message) = &quality.message {
        items.push(KeyValue::new("message", message.clone()));
    }
    renderer.key_values(&items)?;
    into_output(renderer)
}
