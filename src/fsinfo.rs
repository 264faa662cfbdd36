use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, UNIX_EPOCH};

use indexmap::IndexMap;
use serde::Serialize;
use walkdir::WalkDir;

use crate::privilege::Privilege;

pub const PROBLEM_ACCESS_DENIED: &str = "access-denied";
pub const PROBLEM_NOT_FOUND: &str = "not-found";
pub const PROBLEM_INTERNAL: &str = "internal-error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsInfoField {
    Entries,
    Mtime,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Reg,
    Dir,
    Lnk,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FsEntry {
    pub kind: EntryKind,
    pub mtime: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FsInfo {
    pub entries: IndexMap<String, FsEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FsInfoProblem {
    pub problem: String,
    pub message: Option<String>,
}

impl FsInfoProblem {
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problem: problem.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FsInfoState {
    pub loading: bool,
    pub error: Option<FsInfoProblem>,
    pub info: Option<FsInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsInfoEvent {
    Change(FsInfoState),
    Close(FsInfoProblem),
}

/// Delivery end of a watch. Every event is tagged with the generation of the
/// watch that produced it; nothing is sent once the watch is closed.
#[derive(Debug, Clone)]
pub struct FsInfoSink {
    generation: u64,
    tx: Sender<(u64, FsInfoEvent)>,
    closed: Arc<AtomicBool>,
}

impl FsInfoSink {
    pub fn new(generation: u64, tx: Sender<(u64, FsInfoEvent)>) -> Self {
        Self {
            generation,
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn send(&self, event: FsInfoEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send((self.generation, event)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub enum FsInfoError {
    Spawn(std::io::Error),
}

impl std::fmt::Display for FsInfoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsInfoError::Spawn(error) => write!(f, "failed to start directory watch: {error}"),
        }
    }
}

impl std::error::Error for FsInfoError {}

/// An open watch. Closing is idempotent.
pub trait FsInfoWatch {
    fn close(&mut self);
}

pub trait FsInfoService {
    fn open(
        &self,
        root: &Path,
        fields: &[FsInfoField],
        privilege: Privilege,
        sink: FsInfoSink,
    ) -> Result<Box<dyn FsInfoWatch>, FsInfoError>;
}

/// Watches one directory level by periodic snapshots.
#[derive(Debug, Clone)]
pub struct PollingFsInfo {
    pub interval: Duration,
}

impl PollingFsInfo {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

struct PollingWatch {
    sink: FsInfoSink,
}

impl FsInfoWatch for PollingWatch {
    fn close(&mut self) {
        self.sink.close();
    }
}

impl Drop for PollingWatch {
    fn drop(&mut self) {
        self.sink.close();
    }
}

impl FsInfoService for PollingFsInfo {
    fn open(
        &self,
        root: &Path,
        _fields: &[FsInfoField],
        _privilege: Privilege,
        sink: FsInfoSink,
    ) -> Result<Box<dyn FsInfoWatch>, FsInfoError> {
        let root = root.to_path_buf();
        let interval = self.interval;
        let worker_sink = sink.clone();
        thread::Builder::new()
            .name("fsinfo-poll".to_owned())
            .spawn(move || poll_loop(root, interval, worker_sink))
            .map_err(FsInfoError::Spawn)?;
        Ok(Box::new(PollingWatch { sink }))
    }
}

fn poll_loop(root: PathBuf, interval: Duration, sink: FsInfoSink) {
    if !sink.send(FsInfoEvent::Change(FsInfoState {
        loading: true,
        ..FsInfoState::default()
    })) {
        return;
    }
    let mut last: Option<FsInfo> = None;
    loop {
        match read_dir_info(&root) {
            Ok(info) => {
                if last.as_ref() != Some(&info) {
                    let state = FsInfoState {
                        loading: false,
                        error: None,
                        info: Some(info.clone()),
                    };
                    if !sink.send(FsInfoEvent::Change(state)) {
                        return;
                    }
                    last = Some(info);
                }
            }
            Err(problem) => {
                sink.send(FsInfoEvent::Close(problem));
                return;
            }
        }
        thread::sleep(interval);
        if sink.is_closed() {
            return;
        }
    }
}

/// Lists the direct children of `root` with their type and mtime.
pub fn read_dir_info(root: &Path) -> Result<FsInfo, FsInfoProblem> {
    let mut entries = IndexMap::<String, FsEntry>::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                // Entries vanishing between readdir and stat are routine.
                if error.depth() > 0 && io_kind(&error) == Some(ErrorKind::NotFound) {
                    continue;
                }
                return Err(problem_from_walk(root, &error));
            }
        };
        let file_type = entry.file_type();
        let kind = if file_type.is_file() {
            EntryKind::Reg
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_symlink() {
            EntryKind::Lnk
        } else {
            EntryKind::Other
        };
        let mtime = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs());
        entries.insert(
            entry.file_name().to_string_lossy().into_owned(),
            FsEntry { kind, mtime },
        );
    }
    Ok(FsInfo { entries })
}

fn io_kind(error: &walkdir::Error) -> Option<ErrorKind> {
    error.io_error().map(std::io::Error::kind)
}

fn problem_from_walk(root: &Path, error: &walkdir::Error) -> FsInfoProblem {
    let problem = match io_kind(error) {
        Some(ErrorKind::PermissionDenied) => PROBLEM_ACCESS_DENIED,
        Some(ErrorKind::NotFound) => PROBLEM_NOT_FOUND,
        _ => PROBLEM_INTERNAL,
    };
    FsInfoProblem::new(problem).with_message(format!("{}: {error}", root.display()))
}

#[cfg(test)]
#[path = "tests/fsinfo_tests.rs"]
mod tests;
