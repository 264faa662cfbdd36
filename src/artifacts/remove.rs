use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;

use crate::privilege::{Elevation, Privilege};

/// Files sos may leave next to an archive, by suffix. The empty suffix is the archive.
pub const SIDECAR_SUFFIXES: [&str; 5] = ["", ".asc", ".gpg", ".md5", ".sha256"];

#[derive(Debug)]
pub enum RemoveError {
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    Elevated {
        path: PathBuf,
        detail: String,
    },
}

impl std::fmt::Display for RemoveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoveError::Io { path, error } => {
                write!(f, "failed to delete {}: {error}", path.display())
            }
            RemoveError::Elevated { path, detail } => {
                write!(f, "failed to delete {}: {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for RemoveError {}

pub fn sidecar_paths(path: &Path) -> Vec<PathBuf> {
    SIDECAR_SUFFIXES
        .iter()
        .map(|suffix| {
            let mut raw = path.as_os_str().to_os_string();
            raw.push(suffix);
            PathBuf::from(raw)
        })
        .collect()
}

/// Deletes a report archive and every sidecar next to it.
///
/// All deletions run at once. Files that do not exist are skipped. The first
/// failure (in suffix order) is returned; files already deleted stay deleted.
/// On success the paths that were actually removed are returned.
pub fn remove_report(path: &Path, elevation: &Elevation) -> Result<Vec<PathBuf>, RemoveError> {
    let paths = sidecar_paths(path);
    let results = thread::scope(|scope| {
        let workers = paths
            .iter()
            .map(|candidate| scope.spawn(move || remove_one(candidate, elevation)))
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .zip(paths.iter())
            .map(|(worker, candidate)| {
                worker.join().unwrap_or_else(|_| {
                    Err(RemoveError::Elevated {
                        path: candidate.clone(),
                        detail: "deletion worker panicked".to_owned(),
                    })
                })
            })
            .collect::<Vec<Result<bool, RemoveError>>>()
    });

    let mut removed = Vec::new();
    for (candidate, result) in paths.into_iter().zip(results) {
        if result? {
            removed.push(candidate);
        }
    }
    log::debug!("removed {} file(s) for {}", removed.len(), path.display());
    Ok(removed)
}

/// Returns whether a file was there to delete.
fn remove_one(path: &Path, elevation: &Elevation) -> Result<bool, RemoveError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) if error.kind() == ErrorKind::PermissionDenied && !elevation.is_root => {
            remove_elevated(path, elevation)
        }
        Err(error) => Err(RemoveError::Io {
            path: path.to_path_buf(),
            error,
        }),
    }
}

fn remove_elevated(path: &Path, elevation: &Elevation) -> Result<bool, RemoveError> {
    let argv = vec![
        "rm".to_owned(),
        "-f".to_owned(),
        "--".to_owned(),
        path.display().to_string(),
    ];
    let output = elevation
        .command(&argv, Privilege::Require)
        .stdin(Stdio::null())
        .output()
        .map_err(|error| RemoveError::Io {
            path: path.to_path_buf(),
            error,
        })?;
    if output.status.success() {
        return Ok(true);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    Err(RemoveError::Elevated {
        path: path.to_path_buf(),
        detail: if stderr.is_empty() {
            format!("`rm` exited with {}", output.status)
        } else {
            stderr
        },
    })
}
