use super::{ReportLister, WatcherState};
use crate::fsinfo::{
    EntryKind, FsEntry, FsInfo, FsInfoError, FsInfoEvent, FsInfoField, FsInfoProblem,
    FsInfoService, FsInfoSink, FsInfoState, FsInfoWatch,
};
use crate::privilege::{Privilege, PrivilegeMonitor};
use crate::reports::{ReportDirError, ReportDirResolver};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    opens: RefCell<Vec<(PathBuf, FsInfoSink)>>,
    closes: Cell<usize>,
}

impl Recorder {
    fn open_count(&self) -> usize {
        self.opens.borrow().len()
    }

    fn sink(&self, index: usize) -> FsInfoSink {
        self.opens.borrow()[index].1.clone()
    }

    fn active(&self) -> usize {
        self.opens
            .borrow()
            .iter()
            .filter(|(_, sink)| !sink.is_closed())
            .count()
    }
}

struct FakeService(Rc<Recorder>);

struct FakeWatch {
    sink: FsInfoSink,
    recorder: Rc<Recorder>,
}

impl FsInfoWatch for FakeWatch {
    fn close(&mut self) {
        self.sink.close();
        self.recorder.closes.set(self.recorder.closes.get() + 1);
    }
}

impl FsInfoService for FakeService {
    fn open(
        &self,
        root: &Path,
        _fields: &[FsInfoField],
        _privilege: Privilege,
        sink: FsInfoSink,
    ) -> Result<Box<dyn FsInfoWatch>, FsInfoError> {
        self.0
            .opens
            .borrow_mut()
            .push((root.to_path_buf(), sink.clone()));
        Ok(Box::new(FakeWatch {
            sink,
            recorder: self.0.clone(),
        }))
    }
}

struct SharedPrivilege(Rc<Cell<Option<bool>>>);

impl PrivilegeMonitor for SharedPrivilege {
    fn allowed(&self) -> Option<bool> {
        self.0.get()
    }
}

struct FailingResolver;

impl ReportDirResolver for FailingResolver {
    fn resolve(&self) -> Result<PathBuf, ReportDirError> {
        Err(ReportDirError::Read {
            path: PathBuf::from("/etc/sos/sos.conf"),
            error: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }
}

fn lister(allowed: Option<bool>) -> (ReportLister, Rc<Recorder>, Rc<Cell<Option<bool>>>) {
    let recorder = Rc::new(Recorder::default());
    let privilege = Rc::new(Cell::new(allowed));
    let lister = ReportLister::new(
        Box::new(FakeService(recorder.clone())),
        Box::new(PathBuf::from("/var/tmp")),
        Box::new(SharedPrivilege(privilege.clone())),
    );
    (lister, recorder, privilege)
}

fn listing(names: &[(&str, EntryKind)]) -> FsInfoEvent {
    let mut info = FsInfo::default();
    for (index, (name, kind)) in names.iter().enumerate() {
        info.entries.insert(
            (*name).to_owned(),
            FsEntry {
                kind: *kind,
                mtime: Some(1_000 + index as u64),
            },
        );
    }
    FsInfoEvent::Change(FsInfoState {
        loading: false,
        error: None,
        info: Some(info),
    })
}

fn pump_all(lister: &mut ReportLister) -> usize {
    let mut changes = 0;
    while lister.pump(Duration::from_millis(10)) {
        changes += 1;
    }
    changes
}

#[test]
fn unknown_privilege_defers_watch() {
    let (mut lister, recorder, privilege) = lister(None);
    lister.restart().expect("restart");
    assert_eq!(recorder.open_count(), 0);
    assert!(!lister.state().ready);

    privilege.set(Some(false));
    assert!(lister.refresh_privilege().expect("refresh"));
    assert_eq!(recorder.open_count(), 1);
    assert_eq!(recorder.opens.borrow()[0].0, PathBuf::from("/var/tmp"));
}

#[test]
fn loading_events_are_ignored_and_listing_marks_ready() {
    let (mut lister, recorder, _) = lister(Some(true));
    let updates = lister.subscribe();
    lister.restart().expect("restart");

    recorder.sink(0).send(FsInfoEvent::Change(FsInfoState {
        loading: true,
        ..FsInfoState::default()
    }));
    assert_eq!(pump_all(&mut lister), 0);
    assert!(!lister.state().ready);

    recorder.sink(0).send(listing(&[
        ("sosreport-a.tar.xz", EntryKind::Reg),
        ("secured-sosreport-b-obfuscated.tar.xz", EntryKind::Reg),
        ("sosreport-a.tar.xz.sha256", EntryKind::Reg),
        ("sosreport-dir.tar.xz", EntryKind::Dir),
        ("notes.txt", EntryKind::Reg),
    ]));
    assert_eq!(pump_all(&mut lister), 1);

    let state = lister.state();
    assert!(state.ready);
    assert_eq!(state.problem, None);
    assert_eq!(state.records.len(), 2);
    let b = &state.records[&PathBuf::from("/var/tmp/secured-sosreport-b-obfuscated.tar.xz")];
    assert_eq!(b.name, "b");
    assert!(b.encrypted && b.obfuscated);

    let snapshot: WatcherState = updates.try_recv().expect("change notification");
    assert_eq!(&snapshot, lister.state());
    assert!(updates.try_recv().is_err());
}

#[test]
fn records_are_replaced_not_patched() {
    let (mut lister, recorder, _) = lister(Some(true));
    lister.restart().expect("restart");
    recorder
        .sink(0)
        .send(listing(&[("sosreport-a.tar.xz", EntryKind::Reg)]));
    recorder
        .sink(0)
        .send(listing(&[("sosreport-b.tar.xz", EntryKind::Reg)]));
    assert_eq!(pump_all(&mut lister), 2);
    let names = lister
        .state()
        .records
        .values()
        .map(|r| r.name.clone())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["b".to_owned()]);
}

#[test]
fn error_change_prefers_message_and_is_sticky() {
    let (mut lister, recorder, _) = lister(Some(true));
    lister.restart().expect("restart");
    recorder.sink(0).send(FsInfoEvent::Change(FsInfoState {
        loading: false,
        error: Some(FsInfoProblem::new("internal-error").with_message("boom")),
        info: None,
    }));
    assert_eq!(pump_all(&mut lister), 1);
    assert!(lister.state().ready);
    assert_eq!(lister.state().problem.as_deref(), Some("boom"));

    recorder.sink(0).send(FsInfoEvent::Change(FsInfoState {
        loading: false,
        error: Some(FsInfoProblem::new("access-denied")),
        info: None,
    }));
    pump_all(&mut lister);
    assert_eq!(lister.state().problem.as_deref(), Some("access-denied"));
}

#[test]
fn close_records_problem_until_restart() {
    let (mut lister, recorder, privilege) = lister(Some(false));
    lister.restart().expect("restart");
    recorder
        .sink(0)
        .send(FsInfoEvent::Close(FsInfoProblem::new("access-denied")));
    assert_eq!(pump_all(&mut lister), 1);
    assert!(lister.state().ready);
    assert_eq!(lister.state().problem.as_deref(), Some("access-denied"));
    assert_eq!(recorder.active(), 0);

    privilege.set(Some(true));
    lister.refresh_privilege().expect("refresh");
    assert!(!lister.state().ready);
    assert_eq!(lister.state().problem, None);
    recorder
        .sink(1)
        .send(listing(&[("sosreport-a.tar.xz", EntryKind::Reg)]));
    pump_all(&mut lister);
    assert!(lister.state().ready);
    assert_eq!(lister.state().problem, None);
    assert_eq!(lister.state().records.len(), 1);
}

#[test]
fn rapid_restarts_keep_exactly_one_subscription() {
    let (mut lister, recorder, privilege) = lister(Some(false));
    lister.restart().expect("restart");
    privilege.set(Some(true));
    lister.refresh_privilege().expect("first change");
    privilege.set(Some(false));
    lister.refresh_privilege().expect("second change");

    assert_eq!(recorder.open_count(), 3);
    assert_eq!(recorder.closes.get(), 2);
    assert_eq!(recorder.active(), 1);

    let updates = lister.subscribe();
    let stale = lister.generation() - 1;
    assert!(!lister.handle_event(stale, listing(&[("sosreport-old.tar.xz", EntryKind::Reg)])));
    assert!(!recorder
        .sink(1)
        .send(listing(&[("sosreport-old.tar.xz", EntryKind::Reg)])));

    recorder
        .sink(2)
        .send(listing(&[("sosreport-new.tar.xz", EntryKind::Reg)]));
    assert_eq!(pump_all(&mut lister), 1);
    assert_eq!(updates.try_iter().count(), 1);
    let names = lister
        .state()
        .records
        .values()
        .map(|r| r.name.clone())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["new".to_owned()]);
}

#[test]
fn unchanged_privilege_does_not_restart() {
    let (mut lister, recorder, _) = lister(Some(true));
    lister.restart().expect("restart");
    assert!(!lister.refresh_privilege().expect("refresh"));
    assert_eq!(recorder.open_count(), 1);
}

#[test]
fn resolver_failure_surfaces_as_problem() {
    let recorder = Rc::new(Recorder::default());
    let mut lister = ReportLister::new(
        Box::new(FakeService(recorder.clone())),
        Box::new(FailingResolver),
        Box::new(SharedPrivilege(Rc::new(Cell::new(Some(true))))),
    );
    assert!(lister.restart().is_err());
    assert!(lister.state().ready);
    assert!(lister.state().problem.is_some());
    assert_eq!(recorder.open_count(), 0);
}

#[test]
fn dropped_subscriber_is_pruned() {
    let (mut lister, recorder, _) = lister(Some(true));
    let updates = lister.subscribe();
    drop(updates);
    lister.restart().expect("restart");
    recorder
        .sink(0)
        .send(listing(&[("sosreport-a.tar.xz", EntryKind::Reg)]));
    assert_eq!(pump_all(&mut lister), 1);
    assert!(lister.listeners.is_empty());
}

#[test]
fn drop_closes_the_watch() {
    let (mut lister, recorder, _) = lister(Some(true));
    lister.restart().expect("restart");
    drop(lister);
    assert_eq!(recorder.active(), 0);
}
