use std::path::PathBuf;
use std::time::Duration;

use jiff::tz::TimeZone;
use jiff::{Timestamp, ToSpan};
use log::{error, info};

use crate::artifact::ArtifactWriter;
use crate::error::{LoadError, PipelineError};
use crate::extract::Extractor;
use crate::run_state::{RunRecord, RunStateStore, RunStatus};
use crate::warehouse::Warehouse;

/// When the next run becomes due: one calendar month after the last
/// successful run, day-of-month clamped to the target month's last day
/// (Jan 31 is due again on Feb 29 in a leap year, Feb 28 otherwise).
/// Computed in UTC.
pub fn next_due(last_run: Timestamp) -> Timestamp {
    last_run
        .to_zoned(TimeZone::UTC)
        .saturating_add(1.month())
        .timestamp()
}

pub fn is_due(last_run: Timestamp, now: Timestamp) -> bool {
    now >= next_due(last_run)
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The last successful run is less than a calendar month old.
    NotDue { next_due: Timestamp },
    /// The window was empty; state advanced, nothing written or loaded.
    Empty,
    Loaded {
        rows_loaded: usize,
        artifact: PathBuf,
    },
}

/// Composes the run-state check, extraction, artifact write and warehouse
/// load for one invocation.  Retry cadence across invocations belongs to the
/// external scheduler; the only in-process retry is the bounded one around
/// connectivity failures in the load step.
pub struct Pipeline {
    pub store: RunStateStore,
    pub extractor: Box<dyn Extractor>,
    pub writer: ArtifactWriter,
    pub warehouse: Box<dyn Warehouse>,
    pub target_table: String,
    pub max_load_attempts: u32,
    pub initial_retry_wait: Duration,
}

impl Pipeline {
    pub fn run(&self) -> Result<RunOutcome, PipelineError> {
        self.run_at(Timestamp::now())
    }

    /// Run the pipeline as of `now`.  The run state is only ever written as
    /// the final step, so an interruption anywhere earlier leaves it
    /// unchanged.
    pub fn run_at(&self, now: Timestamp) -> Result<RunOutcome, PipelineError> {
        let prior = self.store.load()?;

        if let Some(record) = &prior {
            if !is_due(record.last_run, now) {
                return Ok(RunOutcome::NotDue {
                    next_due: next_due(record.last_run),
                });
            }
        }

        info!("starting monthly data extraction and load");
        let since = prior.as_ref().map(|record| record.last_run);
        let rows = self.extractor.extract(since)?;

        if rows.is_empty() {
            info!("extraction window is empty, nothing to load");
            self.store.save(&RunRecord {
                last_run: now,
                status: RunStatus::Success,
                last_artifact: None,
            })?;
            return Ok(RunOutcome::Empty);
        }

        let artifact = match self.writer.write(&rows, now) {
            Ok(path) => path,
            Err(e) => {
                self.record_failure(prior);
                return Err(PipelineError::Artifact(e));
            }
        };
        info!("saved {} records to {}", rows.len(), artifact.display());

        match self.load_with_retry(&artifact) {
            Ok(rows_loaded) => {
                self.store.save(&RunRecord {
                    last_run: now,
                    status: RunStatus::Success,
                    last_artifact: artifact
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned()),
                })?;
                info!("monthly data extraction and load completed");
                Ok(RunOutcome::Loaded {
                    rows_loaded,
                    artifact,
                })
            }
            Err((attempts, source)) => {
                self.record_failure(prior);
                Err(PipelineError::Load { attempts, source })
            }
        }
    }

    /// Connectivity failures get up to `max_load_attempts` tries with a
    /// doubling wait; everything else fails immediately.
    fn load_with_retry(&self, artifact: &std::path::Path) -> Result<usize, (u32, LoadError)> {
        let mut attempts = 0;
        let mut wait_duration = self.initial_retry_wait;

        loop {
            attempts += 1;
            match self.warehouse.load(artifact, &self.target_table) {
                Ok(rows) => return Ok(rows),
                Err(LoadError::Connectivity(message)) if attempts < self.max_load_attempts => {
                    info!(
                        "load attempt {}/{} failed: {}; retrying in {:?}",
                        attempts, self.max_load_attempts, message, wait_duration
                    );
                    std::thread::sleep(wait_duration);
                    wait_duration *= 2;
                }
                Err(e) => return Err((attempts, e)),
            }
        }
    }

    /// Mark the stored record FAILED without advancing its timestamp, so the
    /// next invocation retries the same window.  An absent store stays
    /// absent.
    fn record_failure(&self, prior: Option<RunRecord>) {
        if let Some(mut record) = prior {
            record.status = RunStatus::Failed;
            if let Err(e) = self.store.save(&record) {
                error!("failed to record the failed run: {}", e);
            }
        }
    }
}
