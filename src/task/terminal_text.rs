use vt100::Parser as VtParser;

const RENDER_COLS: u16 = 200;
const MAX_RENDER_LINES: usize = 1000;

/// Collapses raw pty output into the text a terminal would show.
///
/// Carriage-return rewrites and escape sequences disappear; long lines wrap
/// at 200 columns. Only the last 1000 lines are kept.
pub fn render_plain(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let normalized = raw.replace("\r\n", "\n");
    let lines = normalized
        .trim_end_matches(['\r', '\n'])
        .split('\n')
        .collect::<Vec<&str>>();
    let tail = &lines[lines.len().saturating_sub(MAX_RENDER_LINES)..];
    let cols = usize::from(RENDER_COLS);
    let rows = tail
        .iter()
        .map(|line| line.chars().count() / cols + 1)
        .sum::<usize>()
        .clamp(1, usize::from(u16::MAX));
    let mut parser = VtParser::new(rows as u16, RENDER_COLS, 0);
    parser.process(tail.join("\r\n").as_bytes());
    let contents = parser.screen().contents();
    contents
        .lines()
        .map(str::trim_end)
        .collect::<Vec<&str>>()
        .join("\n")
        .trim_end()
        .to_owned()
}
