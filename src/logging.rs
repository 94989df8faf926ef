use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const MARKER: &str = "== NEW ERROR ==";

/// Install the `log` backend. `RUST_LOG` overrides the `info` default.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Append-only file that receives one record per failed token exchange.
///
/// The file is opened for every record so it can be rotated or deleted while
/// the service runs.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DiagnosticLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format_error<D: Display>(error: D) -> String {
        format!("[{}] {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), error)
    }

    /// Append a record. The whole record goes out in one write so concurrent
    /// records never interleave.
    pub fn record<D: Display>(&self, error: D, body: Option<&str>) -> std::io::Result<()> {
        let mut record = format!("{MARKER}\n{}\n", Self::format_error(error));
        if let Some(body) = body {
            record.push_str(&body.replace('\n', ""));
            record.push('\n');
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(record.as_bytes())
    }

    /// Same as [`DiagnosticLog::record`] but a failing sink only reaches the console log.
    pub fn record_or_warn<D: Display>(&self, error: D, body: Option<&str>) {
        if let Err(err) = self.record(error, body) {
            log::warn!("failed to write diagnostic log `{}`: {err}", self.path.display());
        }
    }

    /// Number of records currently in the file.
    pub fn count(&self) -> usize {
        std::fs::read_to_string(&self.path)
            .map(|content| content.lines().filter(|line| *line == MARKER).count())
            .unwrap_or(0)
    }
}
