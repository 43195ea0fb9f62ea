pub mod duckdb;
pub mod snowflake;

use std::path::Path;

use crate::error::LoadError;

/// Bulk-loads one artifact into a target table.  Implementations must be
/// all-or-nothing: either every row of the artifact becomes visible in the
/// table or none does.  The connection is scoped to the single call and
/// released on every exit path.
pub trait Warehouse {
    /// Load the artifact's rows into `table`, returning the number of rows
    /// loaded.
    fn load(&self, artifact: &Path, table: &str) -> Result<usize, LoadError>;
}
