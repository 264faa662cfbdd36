pub mod report_dir;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

pub use report_dir::{ReportDirError, ReportDirResolver, SosConfReportDir};

const ARCHIVE_PATTERN: &str = r"^(secured-)?sosreport-(.*)\.tar\.[^.]+(\.gpg)?$";
const OBFUSCATED_SUFFIX: &str = "-obfuscated";

/// A single report archive found in the report directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRecord {
    pub name: String,
    pub encrypted: bool,
    pub obfuscated: bool,
    /// Modification time of the archive, in unix seconds.
    pub created_at: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportName {
    pub name: String,
    pub encrypted: bool,
    pub obfuscated: bool,
}

fn archive_regex() -> &'static Regex {
    static ARCHIVE: OnceLock<Regex> = OnceLock::new();
    ARCHIVE.get_or_init(|| Regex::new(ARCHIVE_PATTERN).expect("archive pattern is valid"))
}

/// Splits an archive file name into its report name and attributes.
///
/// Returns `None` for anything that is not a sos report archive.
pub fn parse_report_name(file_name: &str) -> Option<ReportName> {
    let captures = archive_regex().captures(file_name)?;
    let inner = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    let (name, obfuscated) = match inner.strip_suffix(OBFUSCATED_SUFFIX) {
        Some(stripped) => (stripped, true),
        None => (inner, false),
    };
    Some(ReportName {
        name: name.to_owned(),
        encrypted: captures.get(1).is_some(),
        obfuscated,
    })
}

impl ReportRecord {
    pub fn from_entry(report_dir: &Path, file_name: &str, created_at: u64) -> Option<Self> {
        let parsed = parse_report_name(file_name)?;
        Some(Self {
            name: parsed.name,
            encrypted: parsed.encrypted,
            obfuscated: parsed.obfuscated,
            created_at,
            path: report_dir.join(file_name),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn attributes(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.encrypted {
            labels.push("encrypted");
        }
        if self.obfuscated {
            labels.push("obfuscated");
        }
        labels
    }
}

/// Newest first, ties broken by path so output is stable.
pub fn sorted_newest_first<'a, I>(records: I) -> Vec<&'a ReportRecord>
where
    I: IntoIterator<Item = &'a ReportRecord>,
{
    let mut sorted = records.into_iter().collect::<Vec<&ReportRecord>>();
    sorted.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.path.cmp(&b.path))
    });
    sorted
}

#[cfg(test)]
#[path = "../tests/reports_tests.rs"]
mod tests;
