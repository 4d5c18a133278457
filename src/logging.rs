use std::fs::OpenOptions;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use log::error;

pub const LOG_TIME_FORMAT: &str = "%b %d %H:%M:%S";

static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();
static HOST: OnceLock<String> = OnceLock::new();

enum Status {
    Start, // Run starting
    Stop,  // Run stopping
    Alert, // Data-quality issue detected in the corpus
    Error, // Error in program execution
}

impl Status {
    fn to_str(&self) -> &str {
        match self {
            Status::Start => "START",
            Status::Stop => "STOP",
            Status::Alert => "ALERT",
            Status::Error => "ERROR",
        }
    }
}

pub struct Logging;

impl Logging {
    /// Set the directory receiving certgrid.log. Must be called once before any event.
    pub fn init(dir: &Path) {
        LOG_DIR.set(dir.to_path_buf()).unwrap_or(());
    }

    /// Log the run start event
    pub fn start() {
        Logging::log(Status::Start, "");
    }

    /// Log the run stop event
    pub fn stop() {
        Logging::log(Status::Stop, "");
    }

    /// Log a data-quality finding that needs an operator's eye
    pub fn alert(message: &str) {
        Logging::log(Status::Alert, message);
    }

    /// Log an error in the program execution
    pub fn error(message: &str) {
        Logging::log(Status::Error, message);
    }

    fn log(status: Status, message: &str) {
        let dir = match LOG_DIR.get() {
            Some(d) => d.clone(),
            None => PathBuf::from("."),
        };

        let host = HOST.get_or_init(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| String::from("localhost"))
        });

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("certgrid.log"));
        let mut file = match file {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Couldn't open log file: {e}");
                return;
            }
        };

        let now = (DateTime::from(SystemTime::now()) as DateTime<Local>)
            .format(LOG_TIME_FORMAT)
            .to_string();

        let comment = if message.is_empty() {
            format!("{} {} certgrid[{}]: {}", now, host, std::process::id(), status.to_str())
        } else {
            format!(
                "{} {} certgrid[{}]: {}: {}",
                now,
                host,
                std::process::id(),
                status.to_str(),
                message
            )
        };

        if let Err(e) = writeln!(file, "{comment}") {
            eprintln!("Couldn't write to file: {e}");
            error!("Couldn't write to file: {}", e);
        }
    }
}
