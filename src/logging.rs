use chrono::Local;
use colored::*;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use std::str::FromStr;

// Dependencies that are chatty at info (sqlx logs every statement).
const QUIET_TARGETS: &[&str] = &["sqlx", "hyper", "reqwest", "redis"];

struct LocalTimeLogger;

impl log::Log for LocalTimeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if QUIET_TARGETS
            .iter()
            .any(|target| metadata.target().starts_with(target))
        {
            return metadata.level() <= Level::Warn;
        }
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now().format("%Y-%m-%d %H:%M:%S");
            let level = record.level();
            let message = record.args();

            let colored_level = match level {
                Level::Error => level.to_string().red(),
                Level::Warn => level.to_string().yellow(),
                Level::Info => level.to_string().cyan(),
                Level::Debug => level.to_string().purple(),
                Level::Trace => level.to_string().normal(),
            };

            println!("{} [{}] - {}", now, colored_level, message);
        }
    }

    fn flush(&self) {}
}

pub fn init_logger() -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(LocalTimeLogger))
        .map(|()| log::set_max_level(LevelFilter::Info))
}

/// Applies the configured level; unknown names keep the current level.
pub fn set_level(level: &str) {
    match LevelFilter::from_str(level) {
        Ok(filter) => log::set_max_level(filter),
        Err(_) => log::warn!("Unknown log level '{}', keeping {}", level, log::max_level()),
    }
}
