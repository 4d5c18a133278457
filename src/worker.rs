//! Worker-pool plumbing and on-disk artifacts. Per-week tasks fan out over a
//! fixed pool of OS threads and come back over a channel; week artifacts are
//! msgpack files written to a temporary name and renamed, so a crash never
//! leaves a readable partial file.

use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::directory::DirectoryError;
use crate::ingest::{ActivityRecord, IngestError};
use crate::tables::{NumTable, TableError};

#[derive(Debug)]
pub enum PipelineError {
    Ingest(IngestError),
    Directory(DirectoryError),
    Table(TableError),
    Config(ConfigError),
    Io(std::io::Error),
    Encode(rmp_serde::encode::Error),
    Decode(rmp_serde::decode::Error),
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Ingest(e) => write!(f, "{e}"),
            PipelineError::Directory(e) => write!(f, "{e}"),
            PipelineError::Table(e) => write!(f, "{e}"),
            PipelineError::Config(e) => write!(f, "{e}"),
            PipelineError::Io(e) => write!(f, "io error: {e}"),
            PipelineError::Encode(e) => write!(f, "artifact encode error: {e}"),
            PipelineError::Decode(e) => write!(f, "artifact decode error: {e}"),
        }
    }
}

impl Error for PipelineError {}

impl From<IngestError> for PipelineError {
    fn from(e: IngestError) -> Self {
        PipelineError::Ingest(e)
    }
}

impl From<DirectoryError> for PipelineError {
    fn from(e: DirectoryError) -> Self {
        PipelineError::Directory(e)
    }
}

impl From<TableError> for PipelineError {
    fn from(e: TableError) -> Self {
        PipelineError::Table(e)
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Config(e)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e)
    }
}

impl From<rmp_serde::encode::Error> for PipelineError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        PipelineError::Encode(e)
    }
}

impl From<rmp_serde::decode::Error> for PipelineError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        PipelineError::Decode(e)
    }
}

/// Parameters and products of one run, serialized next to the artifacts.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: String,
    pub day_anchor: String,
    pub week_anchor: String,
    pub modes: Vec<String>,
    pub temporal_modes: Vec<String>,
    pub lag_window: usize,
    pub diff_window_days: i64,
    pub subsessions: Vec<String>,
    pub weeks: Vec<i64>,
    pub n_users: usize,
    pub org_values: HashMap<String, Vec<String>>,
    pub outputs: Vec<String>,
}

/// Per-week artifacts under the work directory: raw merged records in
/// `rawweeks/`, numericized tables in `numweeks/`.
pub struct ArtifactStore {
    work_dir: PathBuf,
}

impl ArtifactStore {
    pub fn open(work_dir: PathBuf) -> Result<ArtifactStore, PipelineError> {
        fs::create_dir_all(work_dir.join("rawweeks"))?;
        fs::create_dir_all(work_dir.join("numweeks"))?;
        Ok(ArtifactStore { work_dir })
    }

    fn raw_path(&self, week: i64) -> PathBuf {
        self.work_dir.join("rawweeks").join(format!("week_{week}.msgpack"))
    }

    fn num_path(&self, week: i64) -> PathBuf {
        self.work_dir.join("numweeks").join(format!("week_{week}.msgpack"))
    }

    fn write_atomic(&self, path: &PathBuf, bytes: &[u8]) -> Result<(), PipelineError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn write_raw_week(
        &self,
        week: i64,
        records: &[ActivityRecord],
    ) -> Result<(), PipelineError> {
        let bytes = rmp_serde::to_vec(records)?;
        self.write_atomic(&self.raw_path(week), &bytes)
    }

    pub fn read_raw_week(&self, week: i64) -> Result<Vec<ActivityRecord>, PipelineError> {
        let bytes = fs::read(self.raw_path(week))?;
        Ok(rmp_serde::from_slice(&bytes)?)
    }

    pub fn write_num_week(&self, week: i64, table: &NumTable) -> Result<(), PipelineError> {
        let bytes = rmp_serde::to_vec(table)?;
        self.write_atomic(&self.num_path(week), &bytes)
    }

    pub fn read_num_week(&self, week: i64) -> Result<NumTable, PipelineError> {
        let bytes = fs::read(self.num_path(week))?;
        Ok(rmp_serde::from_slice(&bytes)?)
    }

    /// Week numbers with a stored raw artifact, ascending.
    pub fn raw_weeks(&self) -> Result<Vec<i64>, PipelineError> {
        let mut weeks = Vec::new();
        for entry in fs::read_dir(self.work_dir.join("rawweeks"))? {
            let path = entry?.path();
            if path.extension().map(|e| e == "msgpack").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Ok(week) = stem.trim_start_matches("week_").parse() {
                        weeks.push(week);
                    }
                }
            }
        }
        weeks.sort_unstable();
        Ok(weeks)
    }

    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<(), PipelineError> {
        let path = self.work_dir.join("run_manifest.json");
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        self.write_atomic(&path, json.as_bytes())?;
        info!("run manifest written to {}", path.display());
        Ok(())
    }
}

/// Runs `work` over every task on a fixed pool of `workers` threads. Results
/// come back in task order.
pub fn fan_out<T, R, F>(tasks: Vec<T>, workers: usize, work: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let n = tasks.len();
    let queue: Mutex<VecDeque<(usize, T)>> = Mutex::new(tasks.into_iter().enumerate().collect());
    let (tx, rx) = mpsc::channel::<(usize, R)>();

    thread::scope(|scope| {
        for _ in 0..workers.max(1).min(n.max(1)) {
            let tx = tx.clone();
            let queue = &queue;
            let work = &work;
            scope.spawn(move || loop {
                let task = queue.lock().unwrap().pop_front();
                match task {
                    Some((i, t)) => {
                        if tx.send((i, work(t))).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            });
        }
        drop(tx);
    });

    let mut results: Vec<(usize, R)> = rx.into_iter().collect();
    results.sort_by_key(|(i, _)| *i);
    results.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::RowMeta;

    #[test]
    fn fan_out_keeps_task_order() {
        let out = fan_out((0..100).collect(), 4, |i: i64| i * 2);
        assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn fan_out_with_more_workers_than_tasks() {
        let out = fan_out(vec![1, 2], 8, |i: i64| i + 1);
        assert_eq!(out, vec![2, 3]);
    }

    #[test]
    fn num_week_round_trips() {
        let dir = std::env::temp_dir().join("certgrid_artifact_test");
        let store = ArtifactStore::open(dir.clone()).unwrap();
        let mut t = NumTable::new(vec!["a".to_string(), "b".to_string()]);
        t.push_row(
            vec![1, 2],
            RowMeta {
                act_id: "{X1}".to_string(),
                pc: "PC-1".to_string(),
                epoch: 42,
            },
        )
        .unwrap();
        store.write_num_week(7, &t).unwrap();
        let back = store.read_num_week(7).unwrap();
        assert_eq!(back.columns, t.columns);
        assert_eq!(back.len(), 1);
        assert_eq!(back.meta[0].epoch, 42);
        assert_eq!(store.raw_weeks().unwrap(), Vec::<i64>::new());
        fs::remove_dir_all(dir).unwrap();
    }
}
