use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use url::Url;

use crate::privilege::{Elevation, Privilege};

pub const DEFAULT_MAX_READ_SIZE: u64 = 150 * 1024 * 1024;
pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-xz, application/octet-stream";

#[derive(Debug)]
pub enum DownloadError {
    InvalidPath(PathBuf),
    TransportUri { uri: String, error: url::ParseError },
    Encode(serde_json::Error),
    /// The transfer page came back with an error title.
    Transfer(String),
    Read { path: PathBuf, error: io::Error },
    Write { path: PathBuf, error: io::Error },
    TooLarge { path: PathBuf, limit: u64 },
    Elevated { path: PathBuf, detail: String },
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadError::InvalidPath(path) => {
                write!(f, "{} has no file name to download", path.display())
            }
            DownloadError::TransportUri { uri, error } => {
                write!(f, "invalid transport uri `{uri}`: {error}")
            }
            DownloadError::Encode(error) => write!(f, "failed to encode download request: {error}"),
            DownloadError::Transfer(title) => write!(f, "{title}"),
            DownloadError::Read { path, error } => {
                write!(f, "failed to read {}: {error}", path.display())
            }
            DownloadError::Write { path, error } => {
                write!(f, "failed to write {}: {error}", path.display())
            }
            DownloadError::TooLarge { path, limit } => write!(
                f,
                "{} is larger than the download limit of {limit} bytes",
                path.display()
            ),
            DownloadError::Elevated { path, detail } => {
                write!(f, "failed to read {}: {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for DownloadError {}

/// Where the web transport lives and the session token it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSession {
    pub uri: Url,
    pub host: String,
    pub csrf_token: String,
}

impl TransportSession {
    pub fn parse(uri: &str, host: &str, csrf_token: &str) -> Result<Self, DownloadError> {
        let uri = Url::parse(uri).map_err(|error| DownloadError::TransportUri {
            uri: uri.to_owned(),
            error,
        })?;
        Ok(Self {
            uri,
            host: host.to_owned(),
            csrf_token: csrf_token.to_owned(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ExternalHeaders {
    #[serde(rename = "content-disposition")]
    content_disposition: String,
    #[serde(rename = "content-type")]
    content_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChannelRequest<'a> {
    host: &'a str,
    payload: &'static str,
    binary: &'static str,
    path: String,
    superuser: &'static str,
    max_read_size: u64,
    external: ExternalHeaders,
}

pub fn base_name(path: &Path) -> Result<String, DownloadError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| DownloadError::InvalidPath(path.to_path_buf()))
}

/// Builds the path-only URL that streams `path` through the transport as an attachment.
pub fn download_request_url(
    session: &TransportSession,
    path: &Path,
    max_read_size: u64,
) -> Result<String, DownloadError> {
    let basename = base_name(path)?;
    let request = ChannelRequest {
        host: &session.host,
        payload: "fsread1",
        binary: "raw",
        path: path.display().to_string(),
        superuser: "require",
        max_read_size,
        external: ExternalHeaders {
            content_disposition: format!("attachment; filename=\"{basename}\""),
            content_type: ARCHIVE_CONTENT_TYPE,
        },
    };
    let body = serde_json::to_vec(&request).map_err(DownloadError::Encode)?;
    let query = STANDARD.encode(body);
    let channel = session
        .uri
        .join(&format!("channel/{}", session.csrf_token))
        .map_err(|error| DownloadError::TransportUri {
            uri: session.uri.to_string(),
            error,
        })?;
    Ok(format!("{}?{}", channel.path(), query))
}

/// An empty title on the transfer page means the browser got the file.
pub fn transfer_result(title: Option<&str>) -> Result<(), DownloadError> {
    match title.map(str::trim) {
        Some(title) if !title.is_empty() => Err(DownloadError::Transfer(title.to_owned())),
        _ => Ok(()),
    }
}

/// Copies a report into `dest_dir` under its own file name.
///
/// Reading falls back to an elevated `cat` when the archive is not readable
/// by the current user. Anything over `max_read_size` bytes is refused and
/// the partial copy removed.
pub fn download_to(
    path: &Path,
    dest_dir: &Path,
    max_read_size: u64,
    elevation: &Elevation,
) -> Result<PathBuf, DownloadError> {
    let target = dest_dir.join(base_name(path)?);
    if target == path || same_file(path, &target) {
        return Err(DownloadError::Write {
            path: target,
            error: io::Error::new(ErrorKind::AlreadyExists, "destination is the report itself"),
        });
    }
    let copied = match File::open(path) {
        Ok(source) => copy_limited(source, path, &target, max_read_size),
        Err(error) if error.kind() == ErrorKind::PermissionDenied && !elevation.is_root => {
            copy_elevated(path, &target, max_read_size, elevation)
        }
        Err(error) => Err(DownloadError::Read {
            path: path.to_path_buf(),
            error,
        }),
    };
    let bytes = copied?;
    log::debug!("downloaded {bytes} bytes to {}", target.display());
    Ok(target)
}

/// True when both paths name one inode, however they are spelled.
fn same_file(path: &Path, target: &Path) -> bool {
    match (fs::metadata(path), fs::metadata(target)) {
        (Ok(source), Ok(dest)) => source.dev() == dest.dev() && source.ino() == dest.ino(),
        _ => false,
    }
}

/// Removes the partial target again if anything goes wrong after creating it.
fn copy_limited<R: Read>(
    source: R,
    path: &Path,
    target: &Path,
    max_read_size: u64,
) -> Result<u64, DownloadError> {
    let mut out = File::create(target).map_err(|error| DownloadError::Write {
        path: target.to_path_buf(),
        error,
    })?;
    let result = stream_limited(source, &mut out, path, target, max_read_size);
    if result.is_err() {
        drop(out);
        let _ = fs::remove_file(target);
    }
    result
}

fn stream_limited<R: Read>(
    source: R,
    out: &mut File,
    path: &Path,
    target: &Path,
    max_read_size: u64,
) -> Result<u64, DownloadError> {
    let mut limited = source.take(max_read_size.saturating_add(1));
    let copied = io::copy(&mut limited, out).map_err(|error| DownloadError::Read {
        path: path.to_path_buf(),
        error,
    })?;
    if copied > max_read_size {
        return Err(DownloadError::TooLarge {
            path: path.to_path_buf(),
            limit: max_read_size,
        });
    }
    out.flush().map_err(|error| DownloadError::Write {
        path: target.to_path_buf(),
        error,
    })?;
    Ok(copied)
}

fn copy_elevated(
    path: &Path,
    target: &Path,
    max_read_size: u64,
    elevation: &Elevation,
) -> Result<u64, DownloadError> {
    let argv = vec!["cat".to_owned(), "--".to_owned(), path.display().to_string()];
    let mut child = elevation
        .command(&argv, Privilege::Require)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| DownloadError::Read {
            path: path.to_path_buf(),
            error,
        })?;
    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill();
        return Err(DownloadError::Elevated {
            path: path.to_path_buf(),
            detail: "missing stdout pipe".to_owned(),
        });
    };
    let copied = copy_limited(stdout, path, target, max_read_size);
    if copied.is_err() {
        let _ = child.kill();
    }
    let output = child.wait_with_output().map_err(|error| DownloadError::Read {
        path: path.to_path_buf(),
        error,
    })?;
    let copied = copied?;
    if !output.status.success() {
        let _ = fs::remove_file(target);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        return Err(DownloadError::Elevated {
            path: path.to_path_buf(),
            detail: if stderr.is_empty() {
                format!("`cat` exited with {}", output.status)
            } else {
                stderr
            },
        });
    }
    Ok(copied)
}
