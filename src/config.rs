use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Warehouse credentials, sourced from the environment.  Never persisted.
/// The optional fields fall back to the account defaults when unset.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub account: String,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
}

// The password must never end up in a log line.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"********")
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    /// Directory for the monthly CSV artifacts
    pub data_save_path: PathBuf,
    /// File holding the record of the last run
    pub state_path: PathBuf,
    pub target_table: String,
    /// Upstream feed; the simulated extractor is used when unset
    pub source_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Collect the configuration from a variable lookup.  Split out from
    /// [`Config::from_env`] so tests can inject variables without touching
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = Credentials {
            user: require(&lookup, "SNOWFLAKE_USER")?,
            password: require(&lookup, "SNOWFLAKE_PASSWORD")?,
            account: require(&lookup, "SNOWFLAKE_ACCOUNT")?,
            warehouse: lookup("SNOWFLAKE_WAREHOUSE"),
            database: lookup("SNOWFLAKE_DATABASE"),
            schema: lookup("SNOWFLAKE_SCHEMA"),
            role: lookup("SNOWFLAKE_ROLE"),
        };
        let data_save_path = PathBuf::from(
            lookup("DATA_SAVE_PATH").unwrap_or_else(|| "./monthly_data".to_string()),
        );
        let state_path = data_save_path.join("last_run.json");
        Ok(Config {
            credentials,
            data_save_path,
            state_path,
            target_table: "MONTHLY_PUBLIC_DATA".to_string(),
            source_url: lookup("DATA_SOURCE_URL"),
        })
    }
}

fn require<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(key)),
    }
}
