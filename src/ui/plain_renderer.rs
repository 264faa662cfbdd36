use std::io::{IsTerminal, Write};

use anstream::{AutoStream, ColorChoice};
use anstyle::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::ui::progress::{IndicatifProgressHandle, NoopProgressHandle, PROGRESS_LENGTH};
use crate::ui::renderer::{ProgressHandle, Renderer, UiResult};
use crate::ui::table::render_table;
use crate::ui::theme::{is_ci_environment, resolve_color_enabled, OutputMode, Theme};
use crate::ui::widgets::{KeyValue, MessageBlock, NoticeLevel, TableSpec};

pub struct PlainRenderer<W: Write> {
    writer: W,
    color_enabled: bool,
    progress_enabled: bool,
    theme: Theme,
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(writer: W, color_enabled: bool) -> Self {
        Self {
            writer,
            color_enabled,
            progress_enabled: false,
            theme: Theme::default(),
        }
    }

    pub fn with_progress_enabled(mut self, enabled: bool) -> Self {
        self.progress_enabled = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn style_text(&self, style: Style, text: &str) -> String {
        if !self.color_enabled {
            return text.to_owned();
        }
        format!("{}{}{}", style.render(), text, style.render_reset())
    }

    fn write_block(&mut self, label: &str, style: Style, block: &MessageBlock) -> UiResult<()> {
        let marker = self.style_text(style, label);
        writeln!(self.writer, "{marker} {}", block.title)?;
        for line in block.body.lines() {
            writeln!(self.writer, "  {line}")?;
        }
        if let Some(hint) = &block.hint {
            let hint_label = self.style_text(self.theme.muted, "hint");
            writeln!(self.writer, "  {hint_label}: {hint}")?;
        }
        Ok(())
    }
}

fn color_choice(mode: OutputMode) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match mode {
        OutputMode::Auto => ColorChoice::Auto,
        OutputMode::Always => ColorChoice::AlwaysAnsi,
        OutputMode::Never => ColorChoice::Never,
    }
}

impl PlainRenderer<AutoStream<std::io::Stderr>> {
    pub fn stderr(mode: OutputMode) -> Self {
        let stream = AutoStream::new(std::io::stderr(), color_choice(mode));
        let color_enabled = resolve_color_enabled(mode, std::io::stderr().is_terminal());
        let progress_enabled = std::io::stderr().is_terminal() && !is_ci_environment();
        Self::new(stream, color_enabled).with_progress_enabled(progress_enabled)
    }
}

impl<W: Write> Renderer for PlainRenderer<W> {
    fn text(&mut self, body: &str) -> UiResult<()> {
        write!(self.writer, "{body}")?;
        if !body.ends_with('\n') {
            writeln!(self.writer)?;
        }
        Ok(())
    }

    fn section(&mut self, title: &str) -> UiResult<()> {
        let rendered = self.style_text(self.theme.accent, title);
        let underline = self.style_text(self.theme.muted, &"─".repeat(title.chars().count()));
        writeln!(self.writer, "{rendered}")?;
        writeln!(self.writer, "{underline}")?;
        Ok(())
    }

    fn notice(&mut self, level: NoticeLevel, body: &str) -> UiResult<()> {
        let (label, style) = match level {
            NoticeLevel::Info => ("info", self.theme.accent),
            NoticeLevel::Success => ("ok", self.theme.success),
            NoticeLevel::Warning => ("warn", self.theme.warning),
            NoticeLevel::Error => ("error", self.theme.error),
        };
        let marker = self.style_text(style, "•");
        let label = self.style_text(self.theme.muted, label);
        writeln!(self.writer, "{marker} {label}: {body}")?;
        Ok(())
    }

    fn bullet_list(&mut self, title: &str, items: &[String]) -> UiResult<()> {
        writeln!(self.writer, "{title}:")?;
        if items.is_empty() {
            writeln!(self.writer, "- <none>")?;
            return Ok(());
        }
        for item in items {
            writeln!(self.writer, "- {item}")?;
        }
        Ok(())
    }

    fn success_block(&mut self, block: &MessageBlock) -> UiResult<()> {
        self.write_block("[success]", self.theme.success, block)
    }

    fn error_block(&mut self, block: &MessageBlock) -> UiResult<()> {
        self.write_block("[error]", self.theme.error, block)
    }

    fn warning_block(&mut self, block: &MessageBlock) -> UiResult<()> {
        self.write_block("[warning]", self.theme.warning, block)
    }

    fn key_values(&mut self, items: &[KeyValue]) -> UiResult<()> {
        for item in items {
            let key = self.style_text(self.theme.label, &item.key);
            let value = self.style_text(self.theme.value, &item.value);
            writeln!(self.writer, "{key}: {value}")?;
        }
        Ok(())
    }

    fn table(&mut self, spec: &TableSpec) -> UiResult<()> {
        let rendered = render_table(spec);
        writeln!(self.writer, "{rendered}")?;
        Ok(())
    }

    fn progress(&mut self, label: &str) -> UiResult<Box<dyn ProgressHandle>> {
        if self.progress_enabled {
            let bar = ProgressBar::new(PROGRESS_LENGTH);
            if let Ok(style) =
                ProgressStyle::with_template("{msg} [{bar:30.cyan/blue}] {pos:>3}%")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.set_message(label.to_owned());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            return Ok(Box::new(IndicatifProgressHandle::new(bar)));
        }
        self.notice(NoticeLevel::Info, label)?;
        Ok(Box::new(NoopProgressHandle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::renderer::Renderer;

    #[test]
    fn renders_blocks_without_color_when_disabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);

        renderer
            .error_block(
                &MessageBlock::new(
                    "Administrative access required",
                    "Listing reports needs superuser rights",
                )
                .with_hint("Run `sos-console` as root or configure sudo"),
            )
            .expect("render error block");

        let rendered = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(
            rendered,
            "[error] Administrative access required\n  Listing reports needs superuser rights\n  hint: Run `sos-console` as root or configure sudo\n"
        );
    }

    #[test]
    fn indents_every_line_of_a_multiline_body() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        renderer
            .warning_block(&MessageBlock::new("sos report failed", "first\nsecond"))
            .expect("warning block");

        let rendered = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(rendered, "[warning] sos report failed\n  first\n  second\n");
    }

    #[test]
    fn renders_section_and_key_values_without_color_when_disabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);

        renderer.section("Reports").expect("section");
        renderer
            .key_values(&[KeyValue::new("directory", "/var/tmp")])
            .expect("key values");

        let rendered = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(rendered, "Reports\n───────\ndirectory: /var/tmp\n");
    }

    #[test]
    fn colors_section_titles_when_enabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), true);
        renderer.section("Reports").expect("section");
        let rendered = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert!(rendered.contains("\u{1b}["));
        assert!(rendered.contains("Reports"));
    }

    #[test]
    fn progress_falls_back_to_a_notice_when_disabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false).with_progress_enabled(false);

        let progress = renderer.progress("Creating report").expect("progress");
        progress.set_percent(40.0);
        progress.finish_success("Done");

        let rendered = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(rendered, "• info: Creating report\n");
    }

    #[test]
    fn renders_bullet_list_and_table_without_color_when_disabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        renderer
            .bullet_list(
                "removed",
                &[
                    "/var/tmp/sosreport-h.tar.xz".to_owned(),
                    "/var/tmp/sosreport-h.tar.xz.sha256".to_owned(),
                ],
            )
            .expect("bullet list");
        renderer.bullet_list("skipped", &[]).expect("empty list");
        renderer
            .table(&TableSpec::new(
                vec!["Report".to_owned(), "Attributes".to_owned()],
                vec![vec!["host-case".to_owned(), "encrypted".to_owned()]],
            ))
            .expect("table");

        let rendered = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert!(rendered.contains("removed:\n- /var/tmp/sosreport-h.tar.xz\n"));
        assert!(rendered.contains("skipped:\n- <none>\n"));
        assert!(rendered.contains("Report"));
        assert!(rendered.contains("host-case"));
        assert!(rendered.lines().all(|line| line == line.trim_end()));
    }
}
