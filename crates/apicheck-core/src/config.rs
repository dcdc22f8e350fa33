//! Run configuration: environment, services, databases, retry and logging toggles

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collections::ExtDict;

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Environment name selecting service and database entries (default: "qa")
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Project root for schema and data discovery (default: current directory)
    #[serde(default)]
    pub project_root: Option<PathBuf>,

    /// Debug proxy for every request, e.g. "127.0.0.1:8888"
    #[serde(default)]
    pub proxy: Option<String>,

    /// Record HTTP exchanges in the transcript
    #[serde(default = "enabled")]
    pub log_requests: bool,

    /// Record SQL queries in the transcript
    #[serde(default = "enabled")]
    pub log_sql: bool,

    /// Database login (default: "qa")
    #[serde(default = "default_db_login")]
    pub db_login: String,

    /// Database password (default: empty)
    #[serde(default)]
    pub db_password: String,

    /// `services.<name>.<environment>`
    #[serde(default)]
    pub services: IndexMap<String, IndexMap<String, ServiceProfile>>,

    /// `databases.<name>.<environment>`
    #[serde(default)]
    pub databases: IndexMap<String, IndexMap<String, DbProfile>>,

    /// Retry policy for transient statuses
    #[serde(default)]
    pub retry: RetrySettings,

    /// Transport settings
    #[serde(default)]
    pub http: HttpSettings,

    /// Directory for persisted transcripts (default: ".apicheck/transcripts")
    #[serde(default)]
    pub transcript_dir: Option<PathBuf>,
}

/// Where one service lives in one environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceProfile {
    pub url: String,

    /// Headers sent with every request to this service
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// Where one database lives in one environment.
///
/// A table with `path` is a SQLite file; one with `host` and `dbname` is a
/// PostgreSQL server reached with the `db_login` / `db_password`
/// credentials unless it names its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DbProfile {
    Sqlite {
        path: PathBuf,
    },
    Postgres(PgProfile),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PgProfile {
    pub host: String,

    /// Server port (default: 5432)
    #[serde(default = "default_pg_port")]
    pub port: u16,

    pub dbname: String,

    /// Overrides `db_login`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Overrides `db_password`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Connect timeout in seconds (default: 10)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Login resolved for one PostgreSQL profile.
#[derive(Clone, PartialEq, Eq)]
pub struct DbCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Re-send requests answered with a transient status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    /// Give up after this many seconds (default: 60)
    #[serde(default = "default_retry_timeout")]
    pub timeout_secs: u64,

    /// Pause between attempts in milliseconds (default: 500)
    #[serde(default = "default_retry_interval")]
    pub interval_ms: u64,

    /// Statuses that trigger a retry (default: [408])
    #[serde(default = "default_transient_statuses")]
    pub transient_statuses: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpSettings {
    /// Per-request timeout in seconds (default: 60)
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Accept self-signed and otherwise invalid certificates (default: true)
    #[serde(default = "enabled")]
    pub accept_invalid_certs: bool,
}

fn default_environment() -> String {
    "qa".to_string()
}

fn default_db_login() -> String {
    "qa".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_connect_timeout() -> u64 {
    10
}

fn enabled() -> bool {
    true
}

fn default_retry_timeout() -> u64 {
    60
}

fn default_retry_interval() -> u64 {
    500
}

fn default_transient_statuses() -> Vec<u16> {
    vec![408]
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_retry_timeout(),
            interval_ms: default_retry_interval(),
            transient_statuses: default_transient_statuses(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_request_timeout(),
            accept_invalid_certs: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            project_root: None,
            proxy: None,
            log_requests: true,
            log_sql: true,
            db_login: default_db_login(),
            db_password: String::new(),
            services: IndexMap::new(),
            databases: IndexMap::new(),
            retry: RetrySettings::default(),
            http: HttpSettings::default(),
            transcript_dir: None,
        }
    }
}

/// Environment variables read by [`Config::apply_env`].
pub const ENV_DB_LOGIN: &str = "DB_L";
pub const ENV_DB_PASSWORD: &str = "DB_P";
pub const ENV_LOG_REQUESTS: &str = "test_request_logs";
pub const ENV_LOG_SQL: &str = "test_sql_logs";
pub const ENV_PROXY: &str = "QA_AUTOTESTS_PROXY_FOR_DEBUG";

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from default location (.apicheck.toml)
    ///
    /// # Errors
    ///
    /// Returns error if a candidate file exists but cannot be loaded
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [".apicheck.toml", ".apicheck.json", "apicheck.toml"];

        for name in candidates {
            let path = Path::new(name);
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Overlay values from an arbitrary lookup. Toggles are on only when the
    /// variable equals `"yes"`; unset variables leave the loaded value alone.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(login) = lookup(ENV_DB_LOGIN) {
            self.db_login = login;
        }
        if let Some(password) = lookup(ENV_DB_PASSWORD) {
            self.db_password = password;
        }
        if let Some(flag) = lookup(ENV_LOG_REQUESTS) {
            self.log_requests = flag == "yes";
        }
        if let Some(flag) = lookup(ENV_LOG_SQL) {
            self.log_sql = flag == "yes";
        }
        if let Some(proxy) = lookup(ENV_PROXY).filter(|p| !p.trim().is_empty()) {
            self.proxy = Some(proxy);
        }
    }

    /// Profile of a service in the active environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownService`] if the service or its entry
    /// for the environment is missing.
    pub fn service(&self, name: &str) -> Result<&ServiceProfile, ConfigError> {
        self.services
            .get(name)
            .and_then(|envs| envs.get(&self.environment))
            .ok_or_else(|| ConfigError::UnknownService {
                name: name.to_string(),
                environment: self.environment.clone(),
            })
    }

    /// Profile of a database in the active environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDatabase`] if the database or its entry
    /// for the environment is missing.
    pub fn database(&self, name: &str) -> Result<&DbProfile, ConfigError> {
        self.databases
            .get(name)
            .and_then(|envs| envs.get(&self.environment))
            .ok_or_else(|| ConfigError::UnknownDatabase {
                name: name.to_string(),
                environment: self.environment.clone(),
            })
    }

    /// Credentials for `profile`: its own user/password, else the global
    /// `db_login` / `db_password`.
    #[must_use]
    pub fn db_credentials(&self, profile: &PgProfile) -> DbCredentials {
        DbCredentials {
            user: profile.user.clone().unwrap_or_else(|| self.db_login.clone()),
            password: profile
                .password
                .clone()
                .unwrap_or_else(|| self.db_password.clone()),
        }
    }

    /// Copy safe to write into a report: every password replaced by `***`.
    #[must_use]
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if !copy.db_password.is_empty() {
            copy.db_password = "***".into();
        }
        for profile in copy.databases.values_mut().flat_map(IndexMap::values_mut) {
            if let DbProfile::Postgres(pg) = profile {
                if pg.password.is_some() {
                    pg.password = Some("***".into());
                }
            }
        }
        copy
    }

    #[must_use]
    pub fn project_root(&self) -> PathBuf {
        self.project_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[must_use]
    pub fn transcript_dir(&self) -> PathBuf {
        self.transcript_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".apicheck/transcripts"))
    }

    /// Run summary for report headers. The password is masked.
    #[must_use]
    pub fn metadata(&self) -> ExtDict {
        let mut meta = ExtDict::new();
        meta.insert("environment", self.environment.as_str());
        meta.insert("log_requests", self.log_requests);
        meta.insert("log_sql", self.log_sql);
        meta.insert("db_login", self.db_login.as_str());
        meta.insert(
            "db_password",
            if self.db_password.is_empty() { "" } else { "***" },
        );
        meta.insert("proxy", self.proxy.as_deref());
        meta.insert("services", self.services.keys().count());
        meta
    }

    /// Create example config file
    #[must_use]
    pub fn example() -> &'static str {
        r#"# apicheck configuration

# Environment selecting the service/database entries below
environment = "qa"

# Debug proxy for every request (also: QA_AUTOTESTS_PROXY_FOR_DEBUG)
# proxy = "127.0.0.1:8888"

# Transcript toggles (also: test_request_logs / test_sql_logs = "yes")
log_requests = true
log_sql = true

# Database credentials (also: DB_L / DB_P)
db_login = "qa"
# db_password = ""

[services.users.qa]
url = "https://users.qa.example.com"
# [services.users.qa.headers]
# Authorization = "Bearer your-token-here"

[services.users.stage]
url = "https://users.stage.example.com"

[databases.main.qa]
path = "qa.sqlite3"

# PostgreSQL; user/password default to db_login/db_password
[databases.main.stage]
host = "postgresql.stage.example.com"
port = 5432
dbname = "main"

# Retry while the server answers with a transient status
[retry]
timeout_secs = 60
interval_ms = 500
transient_statuses = [408]

[http]
timeout_secs = 60
accept_invalid_certs = true

# Persisted transcripts (default: ".apicheck/transcripts")
# transcript_dir = ".apicheck/transcripts"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No service '{name}' configured for environment '{environment}'")]
    UnknownService { name: String, environment: String },
    #[error("No database '{name}' configured for environment '{environment}'")]
    UnknownDatabase { name: String, environment: String },
}
