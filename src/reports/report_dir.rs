use std::fs;
use std::path::PathBuf;

pub const SOS_CONF_PATH: &str = "/etc/sos/sos.conf";
pub const DEFAULT_REPORT_DIR: &str = "/var/tmp";

#[derive(Debug)]
pub enum ReportDirError {
    Read { path: PathBuf, error: std::io::Error },
}

impl std::fmt::Display for ReportDirError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportDirError::Read { path, error } => {
                write!(f, "failed to read {}: {error}", path.display())
            }
        }
    }
}

impl std::error::Error for ReportDirError {}

/// Decides which directory sos writes its archives to.
pub trait ReportDirResolver {
    fn resolve(&self) -> Result<PathBuf, ReportDirError>;
}

/// Explicit override, then `tmp-dir` from the sos configuration, then `/var/tmp`.
#[derive(Debug, Clone)]
pub struct SosConfReportDir {
    pub override_dir: Option<PathBuf>,
    pub sos_conf: PathBuf,
}

impl SosConfReportDir {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self {
            override_dir,
            sos_conf: PathBuf::from(SOS_CONF_PATH),
        }
    }

    pub fn with_sos_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.sos_conf = path.into();
        self
    }
}

impl ReportDirResolver for SosConfReportDir {
    fn resolve(&self) -> Result<PathBuf, ReportDirError> {
        if let Some(dir) = self.override_dir.as_ref() {
            return Ok(dir.clone());
        }
        match fs::read_to_string(&self.sos_conf) {
            Ok(raw) => Ok(tmp_dir_from_sos_conf(&raw)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR))),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(PathBuf::from(DEFAULT_REPORT_DIR))
            }
            Err(error) => Err(ReportDirError::Read {
                path: self.sos_conf.clone(),
                error,
            }),
        }
    }
}

impl ReportDirResolver for PathBuf {
    fn resolve(&self) -> Result<PathBuf, ReportDirError> {
        Ok(self.clone())
    }
}

/// Reads `tmp-dir` from the `[global]` or `[report]` section of an ini-style sos.conf.
pub(crate) fn tmp_dir_from_sos_conf(raw: &str) -> Option<String> {
    let mut section = String::new();
    let mut found: Option<String> = None;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_owned();
            continue;
        }
        if section != "global" && section != "report" {
            continue;
        }
        let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
            continue;
        };
        let key = key.trim().replace('_', "-");
        let value = value.trim();
        if key == "tmp-dir" && !value.is_empty() {
            // [report] wins over [global] regardless of file order.
            if section == "report" || found.is_none() {
                found = Some(value.to_owned());
            }
        }
    }
    found
}
