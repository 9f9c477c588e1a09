//! End-to-end kernel AIO ring flows, eventfd completion linkage included.
use adelie::event::{eventfd, read_eventfd, EfdFlags};
use adelie::kaio::{Context, Iocb};
use nix::errno::Errno;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

fn scratch_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("adelie-kaio-{}-{}", tag, std::process::id()))
}

#[test]
fn pread_with_eventfd_completion() {
    let path = scratch_path("pread");
    let content: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
    File::create(&path).unwrap().write_all(&content).unwrap();

    let ctx = Context::setup(10).unwrap();
    let file = File::open(&path).unwrap();
    let efd = eventfd(0, EfdFlags::empty()).unwrap();

    let mut ops = [Iocb::pread(file.as_raw_fd(), 8192, 0)];
    ops[0].set_eventfd(&efd);
    ops[0].set_data(42);

    assert_eq!(ctx.submit(&mut ops).unwrap(), 1);

    // the completion bumps the eventfd before it is readable from the ring
    assert_eq!(read_eventfd(&efd).unwrap(), 1);

    let events = ctx
        .getevents(1, 10, Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, 42);
    assert_eq!(events[0].res, 8192);

    let buf = ops[0].event_buffer(&events[0]).unwrap();
    assert_eq!(buf, content.as_slice());

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn pwrite_then_read_back() {
    let path = scratch_path("pwrite");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .unwrap();

    let ctx = Context::setup(4).unwrap();
    let mut ops = [Iocb::pwrite(file.as_raw_fd(), b"ring buffered write", 0)];
    assert_eq!(ctx.submit(&mut ops).unwrap(), 1);

    let events = ctx
        .getevents(1, 4, Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].res, 19);
    assert!(ops[0].complete(&events[0]));

    let mut back = String::new();
    File::open(&path).unwrap().read_to_string(&mut back).unwrap();
    assert_eq!(back, "ring buffered write");

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn batch_submit_matches_events_by_cookie() {
    let path = scratch_path("batch");
    let content = vec![9u8; 4096];
    File::create(&path).unwrap().write_all(&content).unwrap();

    let ctx = Context::setup(8).unwrap();
    let file = File::open(&path).unwrap();

    let mut ops = vec![
        Iocb::pread(file.as_raw_fd(), 1024, 0),
        Iocb::pread(file.as_raw_fd(), 1024, 1024),
        Iocb::pread(file.as_raw_fd(), 1024, 2048),
    ];
    for (i, op) in ops.iter_mut().enumerate() {
        op.set_data(i as u64);
    }
    assert_eq!(ctx.submit(&mut ops).unwrap(), 3);

    let mut seen = [false; 3];
    let mut remaining = 3;
    while remaining > 0 {
        let events = ctx
            .getevents(1, 8, Some(Duration::from_secs(5)))
            .unwrap();
        for ev in &events {
            assert_eq!(ev.res, 1024);
            seen[ev.data as usize] = true;
            let matched = ops.iter_mut().any(|op| op.complete(ev));
            assert!(matched);
            remaining -= 1;
        }
    }
    assert_eq!(seen, [true; 3]);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn fsync_opcode_when_the_filesystem_supports_it() {
    let path = scratch_path("fsync");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .unwrap();

    let ctx = Context::setup(2).unwrap();
    let mut ops = [Iocb::fsync(file.as_raw_fd())];
    match ctx.submit(&mut ops) {
        // aio fsync needs kernel >= 4.18 and filesystem support
        Err(Errno::EINVAL) => {
            std::fs::remove_file(&path).unwrap();
            return;
        }
        other => assert_eq!(other.unwrap(), 1),
    }

    let events = ctx
        .getevents(1, 2, Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].res, 0);
    assert!(ops[0].complete(&events[0]));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn explicit_destroy_reports_the_kernel_verdict() {
    let ctx = Context::setup(1).unwrap();
    ctx.destroy().unwrap();
}

#[test]
fn zero_timeout_polls_an_empty_ring() {
    let ctx = Context::setup(1).unwrap();
    let events = ctx.getevents(0, 1, Some(Duration::ZERO)).unwrap();
    assert!(events.is_empty());
}
