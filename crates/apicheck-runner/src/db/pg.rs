//! PostgreSQL backend over the blocking `postgres` client.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use parking_lot::Mutex;
use postgres::types::Type;
use postgres::{Client, NoTls, Row};

use apicheck_core::config::{Config, DbCredentials, DbProfile, PgProfile};
use apicheck_core::{ExtDict, Node, Transcript};

use super::{DbError, ExecOutcome, SqlDb, note_failure, note_unchanged};

pub struct PostgresDb {
    client: Mutex<Client>,
    target: String,
    transcript: Option<Transcript>,
}

impl std::fmt::Debug for PostgresDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDb").field("target", &self.target).finish_non_exhaustive()
    }
}

impl std::fmt::Display for PostgresDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connected to {}", self.target)
    }
}

/// `user@host:port/dbname`, never the password.
fn target(profile: &PgProfile, credentials: &DbCredentials) -> String {
    format!(
        "{}@{}:{}/{}",
        credentials.user, profile.host, profile.port, profile.dbname
    )
}

/// Driver settings for `profile` logging in as `credentials`.
#[must_use]
pub fn connect_config(profile: &PgProfile, credentials: &DbCredentials) -> postgres::Config {
    let mut cfg = postgres::Config::new();
    cfg.host(&profile.host)
        .port(profile.port)
        .dbname(&profile.dbname)
        .user(&credentials.user)
        .application_name("apicheck")
        .connect_timeout(Duration::from_secs(profile.connect_timeout_secs));
    if !credentials.password.is_empty() {
        cfg.password(&credentials.password);
    }
    cfg
}

impl PostgresDb {
    /// # Errors
    ///
    /// Returns [`DbError::Open`] when the server cannot be reached or
    /// rejects the login.
    pub fn open(profile: &PgProfile, credentials: &DbCredentials) -> Result<Self, DbError> {
        let target = target(profile, credentials);
        let client = connect_config(profile, credentials)
            .connect(NoTls)
            .map_err(|e| DbError::Open {
                target: target.clone(),
                reason: describe(&e),
            })?;
        tracing::debug!(%target, "database opened");
        Ok(Self {
            client: Mutex::new(client),
            target,
            transcript: None,
        })
    }

    /// Open the database `name` of the active environment with the
    /// credentials [`Config::db_credentials`] resolves.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for an unknown database,
    /// [`DbError::WrongBackend`] for a SQLite profile, otherwise as
    /// [`PostgresDb::open`].
    pub fn from_config(config: &Config, name: &str) -> Result<Self, DbError> {
        match config.database(name)? {
            DbProfile::Postgres(profile) => Self::open(profile, &config.db_credentials(profile)),
            DbProfile::Sqlite { .. } => Err(DbError::WrongBackend {
                name: name.to_string(),
                expected: "PostgreSQL",
            }),
        }
    }

    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// # Errors
    ///
    /// Returns [`DbError::Open`] if the server does not acknowledge the
    /// shutdown.
    pub fn close(self) -> Result<(), DbError> {
        let target = self.target;
        self.client.into_inner().close().map_err(|e| DbError::Open {
            target,
            reason: describe(&e),
        })
    }

    fn query_rows(&self, query: &str, limit: Option<usize>) -> Result<Vec<ExtDict>, DbError> {
        let failed = |e: postgres::Error| DbError::Query {
            query: query.to_string(),
            reason: describe(&e),
        };

        let rows = self.client.lock().query(query, &[]).map_err(failed)?;
        let take = limit.unwrap_or(rows.len());
        let mut out = Vec::with_capacity(take.min(rows.len()));
        for row in rows.iter().take(take) {
            let mut record = ExtDict::new();
            for (idx, column) in row.columns().iter().enumerate() {
                record.insert(column.name(), cell(row, idx).map_err(failed)?);
            }
            out.push(record);
        }

        if let Some(transcript) = &self.transcript {
            transcript.append_sql(query, &out, None);
        }
        Ok(out)
    }

    fn rolled_back(&self, query: &str, error: &postgres::Error) -> ExecOutcome {
        note_failure(self.transcript.as_ref(), "Postgres", query, &describe(error))
    }
}

/// Server-side failures as the server worded them.
fn describe(error: &postgres::Error) -> String {
    error
        .as_db_error()
        .map_or_else(|| error.to_string(), ToString::to_string)
}

fn row_count(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Decode one column. Types without a mapping come back as null with a
/// warning; cast them to text in the query to read them.
fn cell(row: &Row, idx: usize) -> Result<Node, postgres::Error> {
    let ty = row.columns()[idx].type_();
    let node = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            row.try_get::<_, Option<String>>(idx)?.into()
        }
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .and_then(|value| Node::try_from(value).ok())
            .unwrap_or(Node::Null),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx)?.into(),
        Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(idx)?.into(),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.into(),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .into(),
        _ => {
            tracing::warn!(column = row.columns()[idx].name(), column_type = %ty, "column type not decoded");
            Node::Null
        }
    };
    Ok(node)
}

impl SqlDb for PostgresDb {
    fn select_one(&self, query: &str) -> Result<Option<ExtDict>, DbError> {
        Ok(self.query_rows(query, Some(1))?.into_iter().next())
    }

    fn select_all(&self, query: &str) -> Result<Vec<ExtDict>, DbError> {
        self.query_rows(query, None)
    }

    fn execute(&self, query: &str) -> ExecOutcome {
        let mut client = self.client.lock();
        let mut tx = match client.transaction() {
            Ok(tx) => tx,
            Err(e) => return self.rolled_back(query, &e),
        };
        let changed = match tx.execute(query, &[]) {
            Ok(n) => row_count(n),
            Err(e) => {
                // dropping the transaction rolls it back
                drop(tx);
                return self.rolled_back(query, &e);
            }
        };
        if let Err(e) = tx.commit() {
            return self.rolled_back(query, &e);
        }
        if changed == 0 {
            note_unchanged(self.transcript.as_ref(), query);
        }
        ExecOutcome::committed(changed)
    }

    fn execute_few_transactions(&self, queries: &[&str]) -> ExecOutcome {
        let batch = queries.join(";\n");
        let mut client = self.client.lock();
        let mut tx = match client.transaction() {
            Ok(tx) => tx,
            Err(e) => return self.rolled_back(&batch, &e),
        };
        let mut changed = 0;
        for query in queries {
            match tx.execute(*query, &[]) {
                Ok(n) => changed += row_count(n),
                Err(e) => {
                    drop(tx);
                    return self.rolled_back(query, &e);
                }
            }
        }
        match tx.commit() {
            Ok(()) => ExecOutcome::committed(changed),
            Err(e) => self.rolled_back(&batch, &e),
        }
    }
}
