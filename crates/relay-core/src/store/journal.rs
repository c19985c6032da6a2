//! Append-only JSON Lines journal of record snapshots.
//!
//! Every write is one full [`EventRecord`] on its own line, flushed and synced
//! before `append` returns. On load the highest `version` per event wins, so lines
//! written out of order by concurrent writers are harmless. Opening compacts the
//! file down to one line per event, which also drops a torn tail before anything
//! new is appended after it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::EventRecord;
use crate::domain::{EngineError, EventId};

pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Opens (or creates) the journal and returns the latest snapshot of every event.
    pub async fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<EventRecord>), EngineError> {
        let path = path.as_ref().to_path_buf();
        let (records, lines) = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => parse(&path, &contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), 0),
            Err(e) => return Err(e.into()),
        };
        compact(&path, &records).await?;
        if lines > records.len() {
            debug!(path = %path.display(), lines, kept = records.len(), "journal compacted");
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), restored = records.len(), "journal opened");

        Ok((
            Self {
                path,
                file: Mutex::new(file),
            },
            records,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &EventRecord) -> Result<(), EngineError> {
        let line = encode(record)?;
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

fn encode(record: &EventRecord) -> Result<Vec<u8>, EngineError> {
    let mut line = serde_json::to_vec(record)
        .map_err(|e| EngineError::StoreUnavailable(format!("journal encode: {e}")))?;
    line.push(b'\n');
    Ok(line)
}

/// Replaces the journal with one line per record via a synced temp file and a rename.
async fn compact(path: &Path, records: &[EventRecord]) -> Result<(), EngineError> {
    let mut contents = Vec::new();
    for record in records {
        contents.extend(encode(record)?);
    }

    let tmp = path.with_extension("jsonl.compact");
    let mut file = File::create(&tmp).await?;
    file.write_all(&contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Returns the latest snapshot per event and the number of lines read.
fn parse(path: &Path, contents: &str) -> Result<(Vec<EventRecord>, usize), EngineError> {
    let mut latest: HashMap<EventId, EventRecord> = HashMap::new();
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();

    for (index, line) in lines.iter().enumerate() {
        let record: EventRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            // a torn final line is what a crash mid-write leaves behind
            Err(e) if index + 1 == lines.len() => {
                warn!(path = %path.display(), error = %e, "ignoring torn journal tail");
                continue;
            }
            Err(e) => {
                return Err(EngineError::StoreUnavailable(format!(
                    "corrupt journal {} at line {}: {e}",
                    path.display(),
                    index + 1
                )));
            }
        };

        let id = record.event.id();
        match latest.get(&id) {
            Some(existing) if existing.version >= record.version => {}
            _ => {
                latest.insert(id, record);
            }
        }
    }

    let mut records: Vec<EventRecord> = latest.into_values().collect();
    records.sort_by_key(|r| r.event.id());
    Ok((records, lines.len()))
}
