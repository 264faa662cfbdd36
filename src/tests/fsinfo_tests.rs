use super::{
    read_dir_info, EntryKind, FsInfoEvent, FsInfoField, FsInfoService, FsInfoSink, PollingFsInfo,
    PROBLEM_NOT_FOUND,
};
use crate::privilege::Privilege;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[test]
fn lists_direct_children_with_types() {
    let root = temp_dir("fsinfo-list");
    fs::write(root.join("sosreport-a.tar.xz"), b"a").expect("write file");
    fs::create_dir_all(root.join("nested/deeper")).expect("mkdir");
    fs::write(root.join("nested/deeper/inner.txt"), b"x").expect("write nested");

    let info = read_dir_info(&root).expect("read");
    assert_eq!(info.entries.len(), 2);
    let file = &info.entries["sosreport-a.tar.xz"];
    assert_eq!(file.kind, EntryKind::Reg);
    assert!(file.mtime.is_some());
    assert_eq!(info.entries["nested"].kind, EntryKind::Dir);
    assert!(!info.entries.contains_key("inner.txt"));
}

#[test]
fn missing_directory_maps_to_not_found_problem() {
    let root = temp_dir("fsinfo-missing").join("absent");
    let problem = read_dir_info(&root).expect_err("missing dir");
    assert_eq!(problem.problem, PROBLEM_NOT_FOUND);
    assert!(problem.message.is_some());
}

#[test]
fn polling_watch_reports_loading_then_listing() {
    let root = temp_dir("fsinfo-poll");
    fs::write(root.join("sosreport-a.tar.xz"), b"a").expect("write file");
    let (tx, rx) = mpsc::channel();
    let service = PollingFsInfo::new(Duration::from_millis(20));
    let mut watch = service
        .open(
            &root,
            &[FsInfoField::Entries],
            Privilege::None,
            FsInfoSink::new(7, tx),
        )
        .expect("open");

    let (generation, first) = rx.recv_timeout(Duration::from_secs(2)).expect("first");
    assert_eq!(generation, 7);
    match first {
        FsInfoEvent::Change(state) => assert!(state.loading),
        other => panic!("unexpected event {other:?}"),
    }
    let (_, second) = rx.recv_timeout(Duration::from_secs(2)).expect("second");
    match second {
        FsInfoEvent::Change(state) => {
            assert!(!state.loading);
            let info = state.info.expect("info");
            assert!(info.entries.contains_key("sosreport-a.tar.xz"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    watch.close();
    fs::write(root.join("sosreport-b.tar.xz"), b"b").expect("write file");
    std::thread::sleep(Duration::from_millis(100));
    assert!(rx.try_recv().is_err(), "closed watch must stay silent");
}

#[test]
fn polling_watch_closes_on_missing_directory() {
    let root = temp_dir("fsinfo-poll-missing").join("absent");
    let (tx, rx) = mpsc::channel();
    let service = PollingFsInfo::new(Duration::from_millis(20));
    let _watch = service
        .open(&root, &[], Privilege::None, FsInfoSink::new(1, tx))
        .expect("open");

    let mut closed = None;
    for _ in 0..5 {
        if let Ok((_, FsInfoEvent::Close(problem))) = rx.recv_timeout(Duration::from_secs(1)) {
            closed = Some(problem);
            break;
        }
    }
    assert_eq!(closed.expect("close event").problem, PROBLEM_NOT_FOUND);
}

fn temp_dir(name: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("sos-console-{name}-{ts}"));
    fs::create_dir_all(&root).expect("mkdir");
    root
}
