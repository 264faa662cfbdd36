use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::fsinfo::{
    EntryKind, FsInfoError, FsInfoEvent, FsInfoField, FsInfoProblem, FsInfoService, FsInfoSink,
    FsInfoState, FsInfoWatch, PROBLEM_INTERNAL,
};
use crate::privilege::{Privilege, PrivilegeMonitor};
use crate::reports::{ReportDirError, ReportDirResolver, ReportRecord};

const WATCH_FIELDS: [FsInfoField; 3] = [FsInfoField::Entries, FsInfoField::Mtime, FsInfoField::Type];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WatcherState {
    pub ready: bool,
    pub problem: Option<String>,
    pub records: BTreeMap<PathBuf, ReportRecord>,
}

#[derive(Debug)]
pub enum ListerError {
    ReportDir(ReportDirError),
    Watch(FsInfoError),
    Timeout,
}

impl std::fmt::Display for ListerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListerError::ReportDir(err) => write!(f, "{err}"),
            ListerError::Watch(err) => write!(f, "{err}"),
            ListerError::Timeout => write!(f, "timed out waiting for the report listing"),
        }
    }
}

impl std::error::Error for ListerError {}

impl From<FsInfoError> for ListerError {
    fn from(value: FsInfoError) -> Self {
        Self::Watch(value)
    }
}

/// Keeps a live view of the reports in the sos report directory.
///
/// Watch events are queued by the service and applied on the caller's
/// thread by [`ReportLister::pump`]. Each restart closes the previous watch
/// and bumps a generation counter, so late events from a closed watch are
/// discarded instead of being applied twice.
pub struct ReportLister {
    service: Box<dyn FsInfoService>,
    resolver: Box<dyn ReportDirResolver>,
    privilege: Box<dyn PrivilegeMonitor>,
    state: WatcherState,
    report_dir: Option<PathBuf>,
    watch: Option<Box<dyn FsInfoWatch>>,
    generation: u64,
    last_allowed: Option<bool>,
    events_tx: Sender<(u64, FsInfoEvent)>,
    events_rx: Receiver<(u64, FsInfoEvent)>,
    listeners: Vec<Sender<WatcherState>>,
}

impl ReportLister {
    pub fn new(
        service: Box<dyn FsInfoService>,
        resolver: Box<dyn ReportDirResolver>,
        privilege: Box<dyn PrivilegeMonitor>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            service,
            resolver,
            privilege,
            state: WatcherState::default(),
            report_dir: None,
            watch: None,
            generation: 0,
            last_allowed: None,
            events_tx,
            events_rx,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    pub fn report_dir(&self) -> Option<&Path> {
        self.report_dir.as_deref()
    }

    /// Number of the current watch; zero until the first watch opens.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Receives a snapshot after every state change. Drop the receiver to unsubscribe.
    pub fn subscribe(&mut self) -> Receiver<WatcherState> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    /// (Re)opens the watch. Does nothing while privilege is still unknown.
    pub fn restart(&mut self) -> Result<(), ListerError> {
        self.last_allowed = self.privilege.allowed();
        if self.last_allowed.is_none() {
            log::debug!("privilege not known yet, report watch deferred");
            return Ok(());
        }

        self.close_watch();
        self.state.ready = false;
        self.state.problem = None;
        self.generation += 1;

        let report_dir = match self.resolver.resolve() {
            Ok(dir) => dir,
            Err(error) => {
                log::warn!("Failed to resolve the sos report directory: {error}");
                self.fail(error.to_string());
                return Err(ListerError::ReportDir(error));
            }
        };
        log::debug!(
            "watching {} for reports (generation {})",
            report_dir.display(),
            self.generation
        );
        let sink = FsInfoSink::new(self.generation, self.events_tx.clone());
        match self
            .service
            .open(&report_dir, &WATCH_FIELDS, Privilege::Require, sink)
        {
            Ok(watch) => {
                self.watch = Some(watch);
                self.report_dir = Some(report_dir);
                Ok(())
            }
            Err(error) => {
                log::warn!("Failed to watch for sosreports: {error}");
                self.report_dir = Some(report_dir);
                self.fail(PROBLEM_INTERNAL.to_owned());
                Err(error.into())
            }
        }
    }

    /// Restarts when the privilege monitor answers differently than last time.
    pub fn refresh_privilege(&mut self) -> Result<bool, ListerError> {
        if self.privilege.allowed() == self.last_allowed {
            return Ok(false);
        }
        self.restart()?;
        Ok(true)
    }

    /// Applies at most one queued watch event. Returns whether the state changed.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        match self.events_rx.recv_timeout(timeout) {
            Ok((generation, event)) => self.handle_event(generation, event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Pumps until the first full listing or a problem arrives.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<&WatcherState, ListerError> {
        let deadline = Instant::now() + timeout;
        while !self.state.ready {
            let now = Instant::now();
            if now >= deadline {
                return Err(ListerError::Timeout);
            }
            self.pump(deadline - now);
        }
        Ok(&self.state)
    }

    pub fn handle_event(&mut self, generation: u64, event: FsInfoEvent) -> bool {
        if generation != self.generation || self.watch.is_none() {
            log::trace!("dropping event from stale watch generation {generation}");
            return false;
        }
        match event {
            FsInfoEvent::Change(state) => self.apply_change(state),
            FsInfoEvent::Close(problem) => {
                self.close_watch();
                self.fail(problem.problem);
                true
            }
        }
    }

    fn apply_change(&mut self, change: FsInfoState) -> bool {
        if change.loading {
            return false;
        }
        if let Some(FsInfoProblem { problem, message }) = change.error {
            log::warn!(
                "Failed to watch for sosreports: {}",
                message.as_deref().unwrap_or(problem.as_str())
            );
            self.fail(message.unwrap_or(problem));
            return true;
        }

        let report_dir = self.report_dir.clone().unwrap_or_default();
        let mut records = BTreeMap::new();
        if let Some(info) = change.info {
            for (name, entry) in &info.entries {
                if entry.kind != EntryKind::Reg {
                    continue;
                }
                let created_at = entry.mtime.unwrap_or_default();
                if let Some(record) = ReportRecord::from_entry(&report_dir, name, created_at) {
                    records.insert(record.path.clone(), record);
                }
            }
        }
        self.state.records = records;
        self.state.ready = true;
        self.state.problem = None;
        self.emit_changed();
        true
    }

    fn fail(&mut self, problem: String) {
        self.state.problem = Some(problem);
        self.state.ready = true;
        self.emit_changed();
    }

    fn emit_changed(&mut self) {
        let snapshot = self.state.clone();
        self.listeners
            .retain(|listener| listener.send(snapshot.clone()).is_ok());
    }

    fn close_watch(&mut self) {
        if let Some(mut watch) = self.watch.take() {
            watch.close();
        }
    }
}

impl Drop for ReportLister {
    fn drop(&mut self) {
        self.close_watch();
    }
}

#[cfg(test)]
#[path = "tests/lister_tests.rs"]
mod tests;
