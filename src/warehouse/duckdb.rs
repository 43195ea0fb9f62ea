use std::path::Path;
use std::time::Duration;

use duckdb::Connection;
use log::info;

use crate::error::LoadError;
use crate::warehouse::Warehouse;

/// Local warehouse backed by a DuckDB file.  Used for development runs and
/// for exercising the load path without a cloud account.
pub struct DuckdbWarehouse {
    pub duckdb_path: String,
}

impl Warehouse for DuckdbWarehouse {
    fn load(&self, artifact: &Path, table: &str) -> Result<usize, LoadError> {
        let conn = open_with_retry(&self.duckdb_path, 8, Duration::from_millis(25))?;
        conn.execute_batch(&format!(
            r#"
CREATE TABLE IF NOT EXISTS {} (
    id VARCHAR NOT NULL,
    value VARCHAR NOT NULL,
    captured_at TIMESTAMPTZ NOT NULL
);
        "#,
            table
        ))
        .map_err(classify)?;

        // One INSERT commits atomically.  The anti-join makes re-loading an
        // already committed artifact a no-op.
        let sql = format!(
            r#"
INSERT INTO {table}
    SELECT id, value, captured_at
    FROM read_csv('{path}', header = true,
        columns = {{
            'id': 'VARCHAR NOT NULL',
            'value': 'VARCHAR NOT NULL',
            'captured_at': 'TIMESTAMPTZ NOT NULL'
        }}) t
    WHERE NOT EXISTS (
        SELECT * FROM {table} d
        WHERE d.id = t.id AND d.captured_at = t.captured_at
    );
        "#,
            table = table,
            path = artifact.display()
        );
        let rows = conn.execute(&sql, []).map_err(classify)?;
        info!("loaded {} rows into {} at {}", rows, table, self.duckdb_path);
        Ok(rows)
    }
}

/// Another process may hold the file lock; wait it out with a doubling
/// backoff before giving up.
fn open_with_retry(
    duckdb_path: &str,
    max_attempts: u32,
    initial_wait: Duration,
) -> Result<Connection, LoadError> {
    let mut attempts = 0;
    let mut wait_duration = initial_wait;

    loop {
        match Connection::open(duckdb_path) {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                attempts += 1;
                if attempts >= max_attempts {
                    return Err(classify(e));
                }
                std::thread::sleep(wait_duration);
                wait_duration *= 2;
            }
        }
    }
}

fn classify(e: duckdb::Error) -> LoadError {
    let message = e.to_string();
    if message.contains("Catalog Error")
        || message.contains("Binder Error")
        || message.contains("Conversion Error")
    {
        LoadError::Schema(message)
    } else if message.contains("IO Error") || message.contains("lock") {
        LoadError::Connectivity(message)
    } else {
        LoadError::Other(message)
    }
}
