use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

pub trait Logger {
    fn log(&mut self, line: &str) -> io::Result<()>;
}

pub struct FileLogHandler {
    file: File,
}

impl FileLogHandler {
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|e| {
                eprintln!("Failed to open log file: {}", e);
                e
            })?;

        Ok(Self { file })
    }
}

impl Logger for FileLogHandler {
    fn log(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{}", line)?;
        Ok(())
    }
}

pub struct StdoutLogHandler;

impl Logger for StdoutLogHandler {
    fn log(&mut self, line: &str) -> io::Result<()> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        writeln!(lock, "{}", line)?;
        Ok(())
    }
}

pub enum LogHandler {
    File(FileLogHandler),
    Stdout(StdoutLogHandler),
}

impl Logger for LogHandler {
    fn log(&mut self, line: &str) -> io::Result<()> {
        match self {
            Self::File(x) => x.log(line),
            Self::Stdout(x) => x.log(line),
        }
    }
}
