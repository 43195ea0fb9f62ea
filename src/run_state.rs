use std::fs;
use std::io;
use std::path::PathBuf;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failed,
}

/// The durable record of the last run.  `last_run` only advances when a run
/// completes successfully; a failed run keeps the previous timestamp so the
/// next invocation retries the same window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub last_run: Timestamp,
    pub status: RunStatus,
    pub last_artifact: Option<String>,
}

pub struct RunStateStore {
    pub path: PathBuf,
}

impl RunStateStore {
    /// Read the record of the last run.  A missing file is the legitimate
    /// initial condition and returns `Ok(None)`; a file that cannot be read
    /// or parsed is an error, never a default.
    pub fn load(&self) -> Result<Option<RunRecord>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Unreadable {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        let record = serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(Some(record))
    }

    /// Write the record atomically: temp file in the same directory, then
    /// rename over the target.
    pub fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        let write_err = |e: io::Error| StoreError::Write {
            path: self.path.clone(),
            source: e,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let contents = serde_json::to_string_pretty(record).expect("RunRecord is serializable");
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::fs;

    use super::*;
    use crate::error::StoreError;

    #[test]
    fn absent_state_is_none() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let store = RunStateStore {
            path: dir.path().join("last_run.json"),
        };
        assert!(store.load()?.is_none());
        Ok(())
    }

    #[test]
    fn save_then_load_round_trips() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let store = RunStateStore {
            path: dir.path().join("state/last_run.json"),
        };
        let record = RunRecord {
            last_run: "2024-03-01T00:00:00Z".parse()?,
            status: RunStatus::Success,
            last_artifact: Some("data_20240301T000000Z.csv".to_string()),
        };
        store.save(&record)?;
        assert_eq!(store.load()?, Some(record));
        // no temp file left behind
        assert!(!store.path.with_extension("json.tmp").exists());
        Ok(())
    }

    #[test]
    fn status_marker_is_screaming_case() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let store = RunStateStore {
            path: dir.path().join("last_run.json"),
        };
        let record = RunRecord {
            last_run: "2024-03-01T00:00:00Z".parse()?,
            status: RunStatus::Failed,
            last_artifact: None,
        };
        store.save(&record)?;
        let contents = fs::read_to_string(&store.path)?;
        assert!(contents.contains("\"FAILED\""));
        assert!(contents.contains("2024-03-01T00:00:00Z"));
        Ok(())
    }

    #[test]
    fn corrupt_file_is_not_absent() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("last_run.json");
        fs::write(&path, "not json at all")?;
        let store = RunStateStore { path };
        match store.load() {
            Err(StoreError::Corrupt { .. }) => Ok(()),
            other => panic!("expected Corrupt, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn save_overwrites_previous_record() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let store = RunStateStore {
            path: dir.path().join("last_run.json"),
        };
        let first = RunRecord {
            last_run: "2024-02-01T00:00:00Z".parse()?,
            status: RunStatus::Success,
            last_artifact: None,
        };
        let second = RunRecord {
            last_run: "2024-03-01T00:00:00Z".parse()?,
            status: RunStatus::Success,
            last_artifact: Some("data_20240301T000000Z.csv".to_string()),
        };
        store.save(&first)?;
        store.save(&second)?;
        assert_eq!(store.load()?, Some(second));
        Ok(())
    }
}
