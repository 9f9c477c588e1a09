//! End-to-end POSIX AIO flows against real files.
use adelie::posix_aio::{
    aio_cancel_all, aio_fsync, aio_read, aio_write, AioCancelStat, AioFsyncMode, AioStatus, Aiocb,
    Notify,
};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

fn scratch_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("adelie-aio-{}-{}", tag, std::process::id()))
}

fn wait_complete(op: &mut Aiocb) {
    while op.error() == AioStatus::InProgress {
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn read_at_offset_fills_owned_buffer() {
    let path = scratch_path("read");
    let mut f = File::create(&path).unwrap();
    f.write_all(b"the quick brown fox jumps over the lazy dog").unwrap();
    drop(f);

    let file = File::open(&path).unwrap();
    let mut op = aio_read(file.as_raw_fd(), 9, 4, Notify::None).unwrap();

    wait_complete(&mut op);
    assert_eq!(op.error(), AioStatus::Complete);
    assert_eq!(op.aio_return().unwrap(), 9);
    assert_eq!(op.buffer(None), b"quick bro");
    assert_eq!(op.buffer(Some(5)), b"quick");

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn write_lands_in_the_file() {
    let path = scratch_path("write");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .unwrap();

    let mut op = aio_write(file.as_raw_fd(), b"written asynchronously", 0, Notify::None).unwrap();
    wait_complete(&mut op);
    assert_eq!(op.aio_return().unwrap(), 22);

    let mut sync = aio_fsync(file.as_raw_fd(), AioFsyncMode::Sync, Notify::None).unwrap();
    wait_complete(&mut sync);
    assert_eq!(sync.aio_return().unwrap(), 0);

    let mut back = String::new();
    File::open(&path).unwrap().read_to_string(&mut back).unwrap();
    assert_eq!(back, "written asynchronously");

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn read_past_eof_returns_zero() {
    let path = scratch_path("eof");
    File::create(&path).unwrap().write_all(b"tiny").unwrap();

    let file = File::open(&path).unwrap();
    let mut op = aio_read(file.as_raw_fd(), 64, 1000, Notify::None).unwrap();
    wait_complete(&mut op);
    assert_eq!(op.aio_return().unwrap(), 0);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn return_before_completion_is_einprogress_like() {
    // aio_return refuses to produce a value for an unfinished operation;
    // poll until done and it hands over the count exactly once.
    let path = scratch_path("poll");
    let mut f = File::create(&path).unwrap();
    f.write_all(&vec![7u8; 4096]).unwrap();
    drop(f);

    let file = File::open(&path).unwrap();
    for _ in 0..50 {
        let mut op = aio_read(file.as_raw_fd(), 256, 0, Notify::None).unwrap();
        wait_complete(&mut op);
        let n = op.aio_return().unwrap();
        assert_eq!(n, 256);
        assert!(op.buffer(None).iter().all(|&b| b == 7));
    }

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn cancel_everything_on_idle_fd_reports_alldone() {
    let path = scratch_path("cancel");
    File::create(&path).unwrap().write_all(b"x").unwrap();

    let file = File::open(&path).unwrap();
    let mut op = aio_read(file.as_raw_fd(), 1, 0, Notify::None).unwrap();
    wait_complete(&mut op);
    op.aio_return().unwrap();

    // nothing outstanding anymore
    assert_eq!(
        aio_cancel_all(file.as_raw_fd()).unwrap(),
        AioCancelStat::AllDone
    );

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn dropping_inflight_operations_is_safe() {
    let path = scratch_path("drop");
    let mut f = File::create(&path).unwrap();
    f.write_all(&vec![1u8; 65536]).unwrap();
    drop(f);

    let file = File::open(&path).unwrap();
    // drop handles at every stage of their lifecycle
    for _ in 0..10 {
        let op = aio_read(file.as_raw_fd(), 4096, 0, Notify::None).unwrap();
        drop(op);
    }
    let mut op = aio_read(file.as_raw_fd(), 4096, 0, Notify::None).unwrap();
    wait_complete(&mut op);
    drop(op);

    std::fs::remove_file(&path).unwrap();
}
