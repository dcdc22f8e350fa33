//! Relational store access for fixtures and assertions.
//!
//! Queries are plain SQL text. Reads return rows as [`ExtDict`]s keyed by
//! column name. Writes never raise on statement errors: they roll back,
//! note the failure in the transcript and report it as
//! [`ExecOutcome::RolledBack`], so callers inspect the outcome.
//!
//! [`Database::open`] picks the backend the configured profile names:
//! a SQLite file ([`SqliteDb`]) or a PostgreSQL server ([`PostgresDb`]).

mod pg;
mod sqlite;

pub use pg::PostgresDb;
pub use sqlite::SqliteDb;

use thiserror::Error;

use apicheck_core::config::{Config, ConfigError, DbProfile};
use apicheck_core::{ExtDict, Transcript};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("cannot open database {target}: {reason}")]
    Open { target: String, reason: String },

    #[error("query failed: {reason}\n  {query}")]
    Query { query: String, reason: String },

    #[error("database '{name}' is not a {expected} database")]
    WrongBackend { name: String, expected: &'static str },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Committed; number of rows changed.
    Applied(usize),
    /// Committed without changing a row (schema statements, no-op updates).
    Unchanged,
    /// Failed and rolled back.
    RolledBack { error: String },
}

impl ExecOutcome {
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Applied(n) => *n,
            Self::Unchanged | Self::RolledBack { .. } => 0,
        }
    }

    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    fn committed(changed: usize) -> Self {
        if changed == 0 { Self::Unchanged } else { Self::Applied(changed) }
    }
}

pub trait SqlDb {
    /// First row of the result, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Query`] when the query cannot run.
    fn select_one(&self, query: &str) -> Result<Option<ExtDict>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError::Query`] when the query cannot run.
    fn select_all(&self, query: &str) -> Result<Vec<ExtDict>, DbError>;

    fn execute(&self, query: &str) -> ExecOutcome;

    /// Run every query in one transaction; any failure rolls back all of them.
    fn execute_few_transactions(&self, queries: &[&str]) -> ExecOutcome;
}

/// A configured database of either backend.
#[derive(Debug)]
pub enum Database {
    Sqlite(SqliteDb),
    Postgres(PostgresDb),
}

impl Database {
    /// Open the database `name` of the active environment. PostgreSQL
    /// profiles log in with [`Config::db_credentials`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for an unknown database and
    /// [`DbError::Open`] when the connection fails.
    pub fn open(config: &Config, name: &str) -> Result<Self, DbError> {
        match config.database(name)? {
            DbProfile::Sqlite { path } => SqliteDb::open(path).map(Self::Sqlite),
            DbProfile::Postgres(profile) => {
                PostgresDb::open(profile, &config.db_credentials(profile)).map(Self::Postgres)
            }
        }
    }

    #[must_use]
    pub fn with_transcript(self, transcript: Transcript) -> Self {
        match self {
            Self::Sqlite(db) => Self::Sqlite(db.with_transcript(transcript)),
            Self::Postgres(db) => Self::Postgres(db.with_transcript(transcript)),
        }
    }

    /// # Errors
    ///
    /// Returns [`DbError::Open`] if the backend refuses to close.
    pub fn close(self) -> Result<(), DbError> {
        match self {
            Self::Sqlite(db) => db.close(),
            Self::Postgres(db) => db.close(),
        }
    }

    fn backend(&self) -> &dyn SqlDb {
        match self {
            Self::Sqlite(db) => db,
            Self::Postgres(db) => db,
        }
    }
}

impl std::fmt::Display for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(db) => write!(f, "{db}"),
            Self::Postgres(db) => write!(f, "{db}"),
        }
    }
}

impl SqlDb for Database {
    fn select_one(&self, query: &str) -> Result<Option<ExtDict>, DbError> {
        self.backend().select_one(query)
    }

    fn select_all(&self, query: &str) -> Result<Vec<ExtDict>, DbError> {
        self.backend().select_all(query)
    }

    fn execute(&self, query: &str) -> ExecOutcome {
        self.backend().execute(query)
    }

    fn execute_few_transactions(&self, queries: &[&str]) -> ExecOutcome {
        self.backend().execute_few_transactions(queries)
    }
}

/// Transcript notes shared by both backends.
fn note_unchanged(transcript: Option<&Transcript>, query: &str) {
    if let Some(transcript) = transcript {
        transcript.append_text(format!("Count of changed rows: 0\nRequest: \"{query}\""));
    }
}

fn note_failure(transcript: Option<&Transcript>, backend: &str, query: &str, error: &str) -> ExecOutcome {
    tracing::warn!(backend, %query, %error, "statement rolled back");
    if let Some(transcript) = transcript {
        transcript.append_text(format!("{backend} database error:\n{error}"));
    }
    ExecOutcome::RolledBack {
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> Config {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn opens_sqlite_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fx.db");
        let config = config(&format!("[databases.fx.qa]\npath = {:?}\n", path.display().to_string()));

        let db = Database::open(&config, "fx").unwrap();
        assert!(matches!(db, Database::Sqlite(_)));
        assert!(db.to_string().contains("fx.db"));
        assert_eq!(db.execute("CREATE TABLE t (v INTEGER)"), ExecOutcome::Unchanged);
        assert_eq!(db.execute("INSERT INTO t VALUES (1)"), ExecOutcome::Applied(1));
        assert_eq!(db.select_one("SELECT v FROM t").unwrap().unwrap()["v"].as_i64(), Some(1));
        db.close().unwrap();
    }

    #[test]
    fn unreachable_postgres_is_an_open_error() {
        let config = config(
            "db_login = \"robot\"\n\
             [databases.main.qa]\nhost = \"127.0.0.1\"\nport = 1\ndbname = \"main\"\nconnect_timeout_secs = 1\n",
        );
        match Database::open(&config, "main") {
            Err(DbError::Open { target, .. }) => assert_eq!(target, "robot@127.0.0.1:1/main"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_database_is_a_config_error() {
        let err = Database::open(&Config::default(), "main").unwrap_err();
        assert!(matches!(err, DbError::Config(ConfigError::UnknownDatabase { .. })));
    }

    #[test]
    fn committed_outcome_counts_rows() {
        assert_eq!(ExecOutcome::committed(0), ExecOutcome::Unchanged);
        assert_eq!(ExecOutcome::committed(3).row_count(), 3);
        assert!(!ExecOutcome::RolledBack { error: "x".into() }.is_applied());
    }
}
