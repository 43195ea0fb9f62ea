use std::path::Path;
use std::process::Command;

use log::info;

use crate::config::Credentials;
use crate::error::LoadError;
use crate::warehouse::Warehouse;

/// Production warehouse.  Each load runs one `snowsql` child process that
/// creates the table if needed, stages the artifact with PUT and commits it
/// with COPY INTO.  COPY INTO is Snowflake's transactional bulk load, so
/// either every row of the artifact lands or none does.
pub struct SnowflakeWarehouse {
    pub credentials: Credentials,
}

impl Warehouse for SnowflakeWarehouse {
    fn load(&self, artifact: &Path, table: &str) -> Result<usize, LoadError> {
        // PUT wants an absolute path
        let artifact = artifact
            .canonicalize()
            .map_err(|e| LoadError::Other(format!("cannot resolve {}: {}", artifact.display(), e)))?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                id STRING, value STRING, captured_at TIMESTAMP_TZ);\n\
             PUT 'file://{path}' @%{table} AUTO_COMPRESS=TRUE OVERWRITE=TRUE;\n\
             COPY INTO {table} FROM @%{table} \
                FILE_FORMAT=(TYPE=CSV SKIP_HEADER=1 FIELD_OPTIONALLY_ENCLOSED_BY='\"') \
                PURGE=TRUE;",
            table = table,
            path = artifact.display()
        );

        let mut cmd = Command::new("snowsql");
        cmd.args(["-a", &self.credentials.account, "-u", &self.credentials.user])
            .args(["-o", "friendly=false"])
            .args(["-o", "output_format=csv"])
            .args(["-o", "header=true"])
            .args(["-o", "exit_on_error=true"])
            // the password never goes on the command line
            .env("SNOWSQL_PWD", &self.credentials.password);
        if let Some(warehouse) = &self.credentials.warehouse {
            cmd.args(["-w", warehouse]);
        }
        if let Some(database) = &self.credentials.database {
            cmd.args(["-d", database]);
        }
        if let Some(schema) = &self.credentials.schema {
            cmd.args(["-s", schema]);
        }
        if let Some(role) = &self.credentials.role {
            cmd.args(["-r", role]);
        }

        let output = cmd
            .arg("-q")
            .arg(&sql)
            .output()
            .map_err(|e| LoadError::Connectivity(format!("failed to invoke snowsql: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(classify_failure(&format!("{}{}", stderr, stdout)));
        }
        match parse_rows_loaded(&stdout) {
            Some(rows) => {
                info!("loaded {} rows into Snowflake table {}", rows, table);
                Ok(rows)
            }
            None => Err(LoadError::Other(format!(
                "no COPY result in snowsql output: {}",
                stdout
            ))),
        }
    }
}

/// Map the client's output onto the load-error taxonomy.  Auth and schema
/// problems are fatal; connection problems are worth a retry.
pub(crate) fn classify_failure(text: &str) -> LoadError {
    let lower = text.to_lowercase();
    if lower.contains("incorrect username or password")
        || lower.contains("authentication")
        || lower.contains("250001")
    {
        LoadError::Auth(first_line(text))
    } else if lower.contains("could not connect")
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("network error")
        || lower.contains("250003")
    {
        LoadError::Connectivity(first_line(text))
    } else if lower.contains("does not exist or not authorized")
        || lower.contains("invalid identifier")
        || lower.contains("compilation error")
        || lower.contains("002003")
    {
        LoadError::Schema(first_line(text))
    } else {
        LoadError::Other(first_line(text))
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Pull `rows_loaded` out of the COPY INTO result.  With
/// `output_format=csv` each statement's result is a small CSV block; find
/// the header that carries a `rows_loaded` column and read the line below.
pub(crate) fn parse_rows_loaded(stdout: &str) -> Option<usize> {
    let mut lines = stdout.lines();
    while let Some(line) = lines.next() {
        let header: Vec<String> = split_csv_line(line);
        if let Some(idx) = header.iter().position(|h| h == "rows_loaded") {
            let data = lines.next()?;
            let fields = split_csv_line(data);
            return fields.get(idx)?.parse().ok();
        }
    }
    None
}

fn split_csv_line(line: &str) -> Vec<String> {
    line.split(',')
        .map(|field| field.trim().trim_matches('"').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::path::Path;

    use super::*;
    use crate::config::Config;

    #[test]
    fn classifies_auth_failures() {
        let err = classify_failure(
            "250001 (08001): Failed to connect to DB. \
             Incorrect username or password was specified.",
        );
        assert!(matches!(err, LoadError::Auth(_)));
    }

    #[test]
    fn classifies_connectivity_failures() {
        let err = classify_failure(
            "250003 (n/a): Could not connect to Snowflake backend after 0 attempt(s).\
             Aborting",
        );
        assert!(matches!(err, LoadError::Connectivity(_)));
        let err = classify_failure("HTTPSConnectionPool: Read timed out.");
        assert!(matches!(err, LoadError::Connectivity(_)));
    }

    #[test]
    fn classifies_schema_failures() {
        let err = classify_failure(
            "002003 (42S02): SQL compilation error:\n\
             Table 'MONTHLY_PUBLIC_DATA' does not exist or not authorized.",
        );
        assert!(matches!(err, LoadError::Schema(_)));
    }

    #[test]
    fn unrecognized_failures_are_other() {
        let err = classify_failure("something nobody has seen before");
        assert!(matches!(err, LoadError::Other(_)));
    }

    #[test]
    fn parses_rows_loaded_from_copy_output() {
        let stdout = "\
\"status\"\n\
\"Table MONTHLY_PUBLIC_DATA successfully created.\"\n\
\"source\",\"target\",\"source_size\",\"target_size\",\"source_compression\",\"target_compression\",\"status\",\"message\"\n\
\"data_20240301T000000Z.csv\",\"data_20240301T000000Z.csv.gz\",\"532\",\"311\",\"NONE\",\"GZIP\",\"UPLOADED\",\"\"\n\
\"file\",\"status\",\"rows_parsed\",\"rows_loaded\",\"error_limit\",\"errors_seen\",\"first_error\",\"first_error_line\",\"first_error_character\",\"first_error_column_name\"\n\
\"@%monthly_public_data/data_20240301T000000Z.csv.gz\",\"LOADED\",\"10\",\"10\",\"1\",\"0\",\"\",\"\",\"\",\"\"\n";
        assert_eq!(parse_rows_loaded(stdout), Some(10));
    }

    #[test]
    fn missing_copy_result_is_none() {
        assert_eq!(parse_rows_loaded("\"status\"\n\"ok\"\n"), None);
    }

    #[ignore]
    #[test]
    fn load_into_live_account() -> Result<(), Box<dyn Error>> {
        dotenvy::from_path(Path::new(".env/test.env")).unwrap();
        let config = Config::from_env()?;
        let warehouse = SnowflakeWarehouse {
            credentials: config.credentials,
        };
        let rows = warehouse.load(
            Path::new("monthly_data/data_20240301T000000Z.csv"),
            &config.target_table,
        )?;
        assert!(rows > 0);
        Ok(())
    }
}
