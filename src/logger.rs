//! A filesystem logger for use (primarily) with the `DirectIP` server daemon.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

pub fn init<P: 'static + AsRef<Path> + Send + Sync>(path: P) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(Logger { path }))?;
    log::set_max_level(LevelFilter::Debug);
    Ok(())
}

struct Logger<P: AsRef<Path>> {
    path: P,
}

impl<P: AsRef<Path> + Send + Sync> Log for Logger<P> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    /// Log a message.
    ///
    /// This function has some panics in it. I'm not sure of the "right" way to handle exceptional
    /// situaions in this logging module. Part of me wants to ignore everything, since logging
    /// should not interfere with the functioning of the program as a whole. However, since I'm in
    /// dev mode for the whole system, silent logs might be worse than a crashing program. For now,
    /// I'll keep the panics, but with the idea that I need to fix this in the future.
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .unwrap();
            file.write_all(
                format!(
                    "({}) {}: {}\n",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.args()
                )
                .as_bytes(),
            )
            .unwrap();
        }
    }

    fn flush(&self) {}
}
