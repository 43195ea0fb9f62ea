use std::fs;
use std::io;
use std::path::PathBuf;

use jiff::Timestamp;

use crate::extract::Row;

/// Serializes one run's records to a timestamped CSV file under `base_dir`.
/// Files are immutable once visible and are never deleted here; retention is
/// an external concern.
pub struct ArtifactWriter {
    pub base_dir: PathBuf,
}

impl ArtifactWriter {
    /// Artifact name for a run, e.g. `data_20240301T103000Z.csv`.  Does not
    /// check if the file exists.
    pub fn filename(&self, run_time: Timestamp) -> PathBuf {
        self.base_dir
            .join(format!("data_{}.csv", run_time.strftime("%Y%m%dT%H%M%SZ")))
    }

    /// Write the records and return the artifact path.  The content goes to
    /// a temp file first and is renamed on completion, so a crashed run
    /// never leaves a partial artifact visible.  A same-second collision
    /// gets a numeric suffix instead of overwriting.
    pub fn write(&self, rows: &[Row], run_time: Timestamp) -> Result<PathBuf, io::Error> {
        fs::create_dir_all(&self.base_dir)?;
        let path = self.unique_path(run_time);
        let tmp = path.with_extension("csv.tmp");

        let mut wtr = csv::Writer::from_path(&tmp)?;
        wtr.write_record(["id", "value", "captured_at"])?;
        for row in rows {
            wtr.write_record(&[
                row.id.clone(),
                row.value.clone(),
                row.captured_at.to_string(),
            ])?;
        }
        wtr.flush()?;
        drop(wtr);

        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    fn unique_path(&self, run_time: Timestamp) -> PathBuf {
        let mut path = self.filename(run_time);
        let mut n = 1;
        while path.exists() {
            path = self.base_dir.join(format!(
                "data_{}_{}.csv",
                run_time.strftime("%Y%m%dT%H%M%SZ"),
                n
            ));
            n += 1;
        }
        path
    }
}
