//! # Cycle Recorder
//!
//! Writes one JSON object per completed control cycle to rotating JSONL
//! files, so a drive can be inspected or replayed afterwards.
//!
//! ## File Layout
//!
//! ```text
//! <log_dir>/cycles-20261019T101500-0000.jsonl
//! <log_dir>/cycles-20261019T101500-0001.jsonl
//! ```
//!
//! A new file is started after `max_records_per_file` records. Only the
//! newest `max_files_to_keep` files matching the prefix are retained.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::error::Result;

/// Record file name prefix
const FILE_PREFIX: &str = "cycles-";

/// Record file extension
const FILE_EXTENSION: &str = "jsonl";

/// One completed cycle
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CycleRecord {
    pub timestamp: DateTime<Utc>,
    pub cycle: u64,
    pub elapsed_ms: u64,
    pub accel: [f32; 3],
    pub speed: f32,
    pub accel_magnitude: f32,
    pub prediction: f32,
    pub command: String,
    pub dispatched: bool,
}

/// Rotating JSONL writer for [`CycleRecord`]s
pub struct CycleRecorder {
    log_dir: PathBuf,
    session: String,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    file_index: usize,
    records_in_file: usize,
}

impl std::fmt::Debug for CycleRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleRecorder")
            .field("log_dir", &self.log_dir)
            .field("session", &self.session)
            .field("file_index", &self.file_index)
            .field("records_in_file", &self.records_in_file)
            .finish_non_exhaustive()
    }
}

impl CycleRecorder {
    /// Create the recorder, creating `log_dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be created.
    pub fn new(config: &RecorderConfig) -> Result<Self> {
        fs::create_dir_all(&config.log_dir)?;
        let session = Utc::now().format("%Y%m%dT%H%M%S").to_string();
        info!("Recording cycles to {} (session {})", config.log_dir, session);

        Ok(Self {
            log_dir: PathBuf::from(&config.log_dir),
            session,
            max_records_per_file: config.max_records_per_file,
            max_files_to_keep: config.max_files_to_keep,
            writer: None,
            file_index: 0,
            records_in_file: 0,
        })
    }

    /// Append a record, rotating files as needed.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Json` if the record cannot be written.
    pub fn record(&mut self, record: &CycleRecord) -> Result<()> {
        if self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if self.writer.is_none() {
            self.open_current()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }
        self.records_in_file += 1;
        Ok(())
    }

    /// Flush buffered records to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Path of the file currently being written
    pub fn current_path(&self) -> PathBuf {
        self.log_dir.join(format!(
            "{}{}-{:04}.{}",
            FILE_PREFIX, self.session, self.file_index, FILE_EXTENSION
        ))
    }

    fn open_current(&mut self) -> Result<()> {
        let path = self.current_path();
        debug!("Opening cycle record file {}", path.display());
        let file = File::create(&path)?;
        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.prune_old_files();
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;
        self.writer = None;
        self.file_index += 1;
        self.open_current()
    }

    /// Delete the oldest record files beyond the retention limit.
    fn prune_old_files(&self) {
        let mut files = match list_record_files(&self.log_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list {}: {}", self.log_dir.display(), e);
                return;
            }
        };

        if files.len() <= self.max_files_to_keep {
            return;
        }

        files.sort_by_cached_key(|path| record_file_order(path));
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed old record file {}", path.display()),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for CycleRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush cycle records: {}", e);
        }
    }
}

/// Sort key for a record file: `(session, index)`.
///
/// The index is compared as a number so rotation past `9999` still sorts
/// after earlier files. Names that do not parse sort first.
fn record_file_order(path: &Path) -> (String, Option<usize>, PathBuf) {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = stem.strip_prefix(FILE_PREFIX).unwrap_or(&stem);

    match name.rsplit_once('-') {
        Some((session, index)) => (
            session.to_string(),
            index.parse().ok(),
            path.to_path_buf(),
        ),
        None => (String::new(), None, path.to_path_buf()),
    }
}

fn list_record_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_record = path
            .file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                name.starts_with(FILE_PREFIX) && name.ends_with(FILE_EXTENSION)
            })
            .unwrap_or(false);
        if is_record {
            files.push(path);
        }
    }
    Ok(files)
}
