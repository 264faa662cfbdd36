use std::sync::OnceLock;

use regex::Regex;

struct Rules {
    starting: Regex,
    finishing: Regex,
    legacy_running: Regex,
}

// A match never spans a carriage return, so rewritten segments of one
// terminal line are not mixed.
fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        starting: Regex::new(r"Starting ([0-9]+)/([0-9]+)[^\r]*\[Running: ([^\r]*)\]")
            .expect("starting pattern is valid"),
        finishing: Regex::new(r"Finishing plugins[^\r]*\[Running: ([^\r]*)\]")
            .expect("finishing pattern is valid"),
        // sos < 3.6
        legacy_running: Regex::new(r"Running ([0-9]+)/([0-9]+):")
            .expect("running pattern is valid"),
    })
}

/// Derives a 0–100 progress value from `sos report` terminal output.
///
/// sos has no progress API, so the output is scraped. Every chunk is
/// appended to the buffer and the whole buffer is rescanned from the newest
/// line backward; the first line matching one of the rules decides the
/// value. A rescan that matches nothing keeps the previous value.
///
/// One parser covers one run: `plugins_total` carries the plugin count of
/// the latest "Starting" line over to later "Finishing plugins" lines.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    output: String,
    plugins_total: u64,
    progress: Option<f64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Option<f64> {
        self.output.push_str(chunk);
        if let Some(value) = self.rescan() {
            self.progress = Some(value);
        }
        self.progress
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    pub fn plugins_total(&self) -> u64 {
        self.plugins_total
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    fn rescan(&mut self) -> Option<f64> {
        let rules = rules();
        for line in self.output.rsplit('\n') {
            if let Some(caps) = rules.starting.captures(line) {
                let started = parse_count(caps.get(1).map(|m| m.as_str()));
                let total = parse_count(caps.get(2).map(|m| m.as_str()));
                self.plugins_total = total;
                let running = running_count(caps.get(3).map(|m| m.as_str()));
                return percent(started as f64 - running as f64, total as f64);
            }
            if let Some(caps) = rules.finishing.captures(line) {
                if self.plugins_total == 0 {
                    return Some(100.0);
                }
                let running = running_count(caps.get(1).map(|m| m.as_str()));
                let total = self.plugins_total as f64;
                return percent(total - running as f64, total);
            }
            if let Some(caps) = rules.legacy_running.captures(line) {
                let done = parse_count(caps.get(1).map(|m| m.as_str()));
                let total = parse_count(caps.get(2).map(|m| m.as_str()));
                return percent(done as f64, total as f64);
            }
        }
        None
    }
}

fn parse_count(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.parse::<u64>().ok())
        .unwrap_or_default()
}

/// Names in a `[Running: a b c]` list. An empty list still counts as one.
fn running_count(raw: Option<&str>) -> usize {
    raw.unwrap_or_default().split(' ').count()
}

fn percent(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator <= 0.0 {
        return None;
    }
    Some((numerator / denominator * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
#[path = "../tests/progress_tests.rs"]
mod tests;
