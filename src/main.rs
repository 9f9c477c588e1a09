mod cli;
mod conf;
mod logging;

use crate::cli::Cli;
use crate::conf::Config;
use crate::logging::{FileLogHandler, LogHandler, Logger, StdoutLogHandler};
use adelie::event::{eventfd, read_eventfd, EfdFlags, EventFd};
use adelie::signals::{read_signalfd, signalfd, SfdFlags, SigSet, Signal};
use adelie::timer::{self, read_timerfd, TimerFd, TimerFlags};
use clap::Parser;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::time::Instant;
use std::{fs, io};

enum Watched {
    Timer(String, TimerFd),
    Eventfd(String, EventFd),
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let config: Config = match cli.config.as_path().extension() {
        Some(ext) => match ext.to_str() {
            Some("toml") => toml::from_str(&fs::read_to_string(&cli.config)?).unwrap(),
            _ => panic!("not supported"),
        },
        None => panic!("No extension"),
    };

    // Block every watched signal in this thread so delivery is forced
    // through the signalfd instead of interrupting syscalls. SIGINT and
    // SIGTERM are always watched; they end the loop.
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    for sig in &config.signal {
        let parsed = sig.signal.parse().unwrap();
        mask.add(parsed);
    }
    mask.thread_block()?;

    let mut signal_fd = signalfd(&mask, SfdFlags::empty())?;

    let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
    epoll.add(
        &signal_fd,
        EpollEvent::new(EpollFlags::EPOLLIN, signal_fd.as_raw_fd() as u64),
    )?;

    let mut watched: HashMap<RawFd, Watched> = HashMap::new();

    for tc in &config.timer {
        let tfd = timer::create(tc.clock.clock_id(), TimerFlags::empty())?;
        timer::settime(&tfd, tc.spec(), tc.absolute)?;

        let fd = tfd.as_fd().as_raw_fd();
        epoll.add(&tfd, EpollEvent::new(EpollFlags::EPOLLIN, fd as u64))?;
        watched.insert(fd, Watched::Timer(tc.name.clone(), tfd));
    }

    for ec in &config.eventfd {
        let flags = if ec.semaphore {
            EfdFlags::EFD_SEMAPHORE
        } else {
            EfdFlags::empty()
        };
        let efd = eventfd(ec.initval, flags)?;

        let fd = efd.as_fd().as_raw_fd();
        epoll.add(&efd, EpollEvent::new(EpollFlags::EPOLLIN, fd as u64))?;
        watched.insert(fd, Watched::Eventfd(ec.name.clone(), efd));
    }

    let mut handler = match &config.log {
        Some(path) => LogHandler::File(FileLogHandler::new(path)?),
        None => LogHandler::Stdout(StdoutLogHandler),
    };

    let started = Instant::now();
    let mut event_buffer = [EpollEvent::empty(); 1];

    loop {
        let num_fds = epoll.wait(&mut event_buffer, EpollTimeout::NONE)?;
        if num_fds == 0 {
            continue;
        }

        let fd = event_buffer[0].data() as RawFd;
        let elapsed = started.elapsed().as_secs_f64();

        if fd == signal_fd.as_raw_fd() {
            if let Some(info) = read_signalfd(&mut signal_fd)? {
                handler.log(&format!(
                    "[{elapsed:10.3}] signal {:?} code={} pid={} uid={}",
                    info.signo, info.code, info.pid, info.uid
                ))?;
                if matches!(info.signo, Signal::SIGINT | Signal::SIGTERM) {
                    break;
                }
            }
            continue;
        }

        match watched.get(&fd) {
            Some(Watched::Timer(name, tfd)) => {
                let expirations = read_timerfd(tfd)?;
                handler.log(&format!(
                    "[{elapsed:10.3}] timer {name}: {expirations} expiration(s)"
                ))?;
            }
            Some(Watched::Eventfd(name, efd)) => {
                let value = read_eventfd(efd)?;
                handler.log(&format!("[{elapsed:10.3}] eventfd {name}: counter {value}"))?;
            }
            None => unreachable!(),
        }
    }

    Ok(())
}
