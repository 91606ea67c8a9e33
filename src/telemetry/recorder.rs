//! # Session Recorder
//!
//! Appends supervisor outputs to JSON Lines files with rotation.
//!
//! Each record is one line:
//!
//! ```text
//! {"ts":"2024-05-01T12:00:00.123+00:00","kind":"directive","data":{"kind":"yaw_change","delta_deg":45.0}}
//! ```
//!
//! Files are named `session_<YYYYmmdd_HHMMSS>_<seq>.jsonl`. A new file is
//! started every `max_records_per_file` records and only the newest
//! `max_files_to_keep` session files in the directory are retained.
//!
//! Writing is synchronous file I/O. Async callers collect a [`RecordBatch`]
//! and hand it to [`SessionRecorder::persist`], which writes on the blocking
//! pool so the runtime threads never wait on the disk.

use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::error::{Result, SupervisorError};

const FILE_PREFIX: &str = "session_";
const FILE_SUFFIX: &str = ".jsonl";

/// Payload category of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Heartbeat,
    Directive,
}

#[derive(Serialize)]
struct Record<'a, T: Serialize> {
    ts: String,
    kind: RecordKind,
    data: &'a T,
}

/// Records serialized on the async side, waiting to be written.
#[derive(Debug, Default)]
pub struct RecordBatch {
    lines: Vec<(RecordKind, String)>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes `data` now, stamped with the current time.
    pub fn push<T: Serialize>(&mut self, kind: RecordKind, data: &T) {
        match encode(kind, data) {
            Ok(line) => self.lines.push((kind, line)),
            Err(e) => error!("Failed to encode {:?} record: {}", kind, e),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn encode<T: Serialize>(kind: RecordKind, data: &T) -> serde_json::Result<String> {
    serde_json::to_string(&Record {
        ts: Utc::now().to_rfc3339(),
        kind,
        data,
    })
}

/// Where and how much to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderSettings {
    pub log_dir: PathBuf,
    pub max_records_per_file: usize,
    pub max_files_to_keep: usize,
}

/// JSONL writer owned by the supervisor.
#[derive(Debug)]
pub struct SessionRecorder {
    settings: RecorderSettings,
    session_stamp: String,
    next_seq: u32,
    writer: Option<LineWriter<File>>,
    records_in_file: usize,
    total_records: u64,
}

impl SessionRecorder {
    /// Creates the log directory if needed. No file is opened until the first record.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Config`] for zero limits, [`SupervisorError::Io`] if the
    /// directory cannot be created.
    pub fn new(settings: RecorderSettings) -> Result<Self> {
        if settings.max_records_per_file == 0 || settings.max_files_to_keep == 0 {
            return Err(SupervisorError::Config(
                "recorder limits must be greater than 0".to_string(),
            ));
        }
        fs::create_dir_all(&settings.log_dir)?;
        info!("Recording session to {}", settings.log_dir.display());

        Ok(Self {
            settings,
            session_stamp: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            next_seq: 0,
            writer: None,
            records_in_file: 0,
            total_records: 0,
        })
    }

    /// Records written so far, across all files.
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    /// Appends one record. Failures are logged and the record is dropped.
    pub fn record<T: Serialize>(&mut self, kind: RecordKind, data: &T) {
        match encode(kind, data) {
            Ok(line) => self.write(kind, &line),
            Err(e) => error!("Failed to encode {:?} record: {}", kind, e),
        }
    }

    /// Appends every record of `batch`, oldest first, then flushes.
    pub fn write_batch(&mut self, batch: RecordBatch) {
        for (kind, line) in &batch.lines {
            self.write(*kind, line);
        }
        if let Err(e) = self.flush() {
            error!("Failed to flush session records: {}", e);
        }
    }

    /// Writes `batch` on the blocking pool, then hands the recorder back.
    ///
    /// Returns `None` if the writing task panicked; recording stops there.
    pub async fn persist(mut self, batch: RecordBatch) -> Option<Self> {
        let written = tokio::task::spawn_blocking(move || {
            self.write_batch(batch);
            self
        })
        .await;
        match written {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                error!("Session recording stopped: {}", e);
                None
            }
        }
    }

    fn write(&mut self, kind: RecordKind, line: &str) {
        if let Err(e) = self.write_line(line) {
            error!("Failed to record {:?}: {}", kind, e);
            // Start over on a fresh file next time
            self.writer = None;
        }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.settings.max_records_per_file {
            self.rotate()?;
        }
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
        }
        self.records_in_file += 1;
        self.total_records += 1;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        let path = self.settings.log_dir.join(format!(
            "{}{}_{:04}{}",
            FILE_PREFIX, self.session_stamp, self.next_seq, FILE_SUFFIX
        ));
        self.next_seq += 1;

        if let Some(mut previous) = self.writer.take() {
            previous.flush()?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened record file {}", path.display());
        self.writer = Some(LineWriter::new(file));
        self.records_in_file = 0;

        prune(&self.settings.log_dir, self.settings.max_files_to_keep)
    }

    /// Flushes the current file.
    pub fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Failed to flush session records: {}", e);
        }
    }
}

/// Session files in `dir`, oldest first.
pub fn session_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    // Stamp and zero-padded sequence make names sort chronologically
    files.sort();
    Ok(files)
}

fn prune(dir: &Path, keep: usize) -> io::Result<()> {
    let files = session_files(dir)?;
    let excess = files.len().saturating_sub(keep);
    for path in files.into_iter().take(excess) {
        fs::remove_file(&path)?;
        debug!("Removed old record file {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Directive;
    use crate::heartbeat::LivenessState;
    use tempfile::tempdir;

    fn settings(dir: &Path, per_file: usize, keep: usize) -> RecorderSettings {
        RecorderSettings {
            log_dir: dir.to_path_buf(),
            max_records_per_file: per_file,
            max_files_to_keep: keep,
        }
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_zero_limits_rejected() {
        let dir = tempdir().unwrap();
        assert!(SessionRecorder::new(settings(dir.path(), 0, 1)).is_err());
        assert!(SessionRecorder::new(settings(dir.path(), 1, 0)).is_err());
    }

    #[test]
    fn test_creates_missing_directory_lazily_opens_file() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("logs").join("run");
        let recorder = SessionRecorder::new(settings(&nested, 10, 2)).unwrap();

        assert!(nested.is_dir());
        assert!(session_files(&nested).unwrap().is_empty());
        assert_eq!(recorder.total_records(), 0);
    }

    #[test]
    fn test_record_shape() {
        let dir = tempdir().unwrap();
        let mut recorder = SessionRecorder::new(settings(dir.path(), 10, 2)).unwrap();

        recorder.record(RecordKind::Heartbeat, &LivenessState::Connected);
        recorder.record(
            RecordKind::Directive,
            &Directive::AltitudeChange { delta_m: 1.5 },
        );
        recorder.flush().unwrap();

        let files = session_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        let lines = read_lines(&files[0]);
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["kind"], "heartbeat");
        assert_eq!(lines[0]["data"], "Connected");
        assert!(chrono::DateTime::parse_from_rfc3339(lines[0]["ts"].as_str().unwrap()).is_ok());

        assert_eq!(lines[1]["kind"], "directive");
        assert_eq!(lines[1]["data"]["kind"], "altitude_change");
        assert_eq!(lines[1]["data"]["delta_m"], 1.5);
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = tempdir().unwrap();
        let mut recorder = SessionRecorder::new(settings(dir.path(), 2, 2)).unwrap();

        for delta in 0..5 {
            recorder.record(
                RecordKind::Directive,
                &Directive::YawChange { delta_deg: delta as f64 * 10.0 },
            );
        }
        recorder.flush().unwrap();
        assert_eq!(recorder.total_records(), 5);

        // Files held [0,1] [2,3] [4]; the oldest was pruned
        let files = session_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(read_lines(&files[0]).len(), 2);
        let newest = read_lines(&files[1]);
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0]["data"]["delta_deg"], 40.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_persist_writes_batch_off_runtime() {
        let dir = tempdir().unwrap();
        let recorder = SessionRecorder::new(settings(dir.path(), 10, 2)).unwrap();

        let mut batch = RecordBatch::new();
        batch.push(RecordKind::Heartbeat, &LivenessState::Connected);
        batch.push(RecordKind::Directive, &Directive::YawChange { delta_deg: -30.0 });
        assert_eq!(batch.len(), 2);

        let recorder = recorder.persist(batch).await.expect("recorder handed back");
        assert_eq!(recorder.total_records(), 2);

        // An empty batch opens nothing new
        let mut recorder = recorder.persist(RecordBatch::new()).await.unwrap();
        assert_eq!(recorder.total_records(), 2);
        recorder.flush().unwrap();

        let lines = read_lines(&session_files(dir.path()).unwrap()[0]);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "heartbeat");
        assert_eq!(lines[1]["data"]["delta_deg"], -30.0);
    }

    #[test]
    fn test_foreign_files_untouched() {
        let dir = tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "keep me").unwrap();

        let mut recorder = SessionRecorder::new(settings(dir.path(), 1, 1)).unwrap();
        for _ in 0..3 {
            recorder.record(RecordKind::Heartbeat, &LivenessState::Disconnected);
        }

        assert!(notes.exists());
        assert_eq!(session_files(dir.path()).unwrap().len(), 1);
    }
}
