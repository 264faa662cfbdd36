use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};

pub const DEFAULT_PWSCORE_PATH: &str = "/usr/bin/pwscore";
pub const EXCELLENT_PASSWORD: &str = "Excellent password";
pub const NOT_ACCEPTABLE: &str = "Password is not acceptable";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordQuality {
    pub value: u8,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordStrength {
    Weak,
    Acceptable,
    Strong,
}

impl PasswordStrength {
    pub fn from_score(value: u8) -> Self {
        if value > 66 {
            PasswordStrength::Strong
        } else if value > 33 {
            PasswordStrength::Acceptable
        } else {
            PasswordStrength::Weak
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PasswordStrength::Weak => "weak",
            PasswordStrength::Acceptable => "acceptable",
            PasswordStrength::Strong => "strong",
        }
    }
}

#[derive(Debug)]
pub enum PasswordError {
    Spawn { path: PathBuf, error: io::Error },
    Io(io::Error),
    /// pwscore refused the password; carries its explanation.
    Rejected(String),
    TooWeak,
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Spawn { path, error } => {
                write!(f, "failed to start {}: {error}", path.display())
            }
            PasswordError::Io(error) => write!(f, "failed to talk to pwscore: {error}"),
            PasswordError::Rejected(message) => write!(f, "{message}"),
            PasswordError::TooWeak => write!(f, "Password is too weak"),
        }
    }
}

impl std::error::Error for PasswordError {}

impl From<io::Error> for PasswordError {
    fn from(error: io::Error) -> Self {
        PasswordError::Io(error)
    }
}

/// Scores `password` with the external pwscore tool.
///
/// With `force`, a refusal from the tool is accepted as a score of zero
/// instead of an error. A score of zero from the tool itself is always
/// too weak.
pub fn password_quality(
    password: &str,
    force: bool,
    pwscore_path: &Path,
) -> Result<PasswordQuality, PasswordError> {
    let mut child = ProcessCommand::new(pwscore_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| PasswordError::Spawn {
            path: pwscore_path.to_path_buf(),
            error,
        })?;
    if let Some(mut stdin) = child.stdin.take() {
        // pwscore may exit before reading everything.
        match stdin.write_all(password.as_bytes()) {
            Err(error) if error.kind() != io::ErrorKind::BrokenPipe => return Err(error.into()),
            _ => {}
        }
    }
    let output = child.wait_with_output()?;

    if !output.status.success() {
        if force {
            return Ok(PasswordQuality {
                value: 0,
                message: None,
            });
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        log::debug!("pwscore rejected password: {}", output.status);
        return Err(PasswordError::Rejected(if stderr.is_empty() {
            NOT_ACCEPTABLE.to_owned()
        } else {
            stderr
        }));
    }

    let value = parse_score(&String::from_utf8_lossy(&output.stdout));
    quality_from_score(value)
}

/// Unparseable output counts as zero.
pub fn parse_score(stdout: &str) -> u8 {
    stdout
        .trim()
        .parse::<i64>()
        .map(|value| value.clamp(0, 100) as u8)
        .unwrap_or(0)
}

pub fn quality_from_score(value: u8) -> Result<PasswordQuality, PasswordError> {
    match value {
        0 => Err(PasswordError::TooWeak),
        100 => Ok(PasswordQuality {
            value,
            message: Some(EXCELLENT_PASSWORD.to_owned()),
        }),
        _ => Ok(PasswordQuality {
            value,
            message: None,
        }),
    }
}

#[cfg(test)]
#[path = "tests/pwscore_tests.rs"]
mod tests;
