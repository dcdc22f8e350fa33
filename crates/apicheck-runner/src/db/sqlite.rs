//! SQLite backend over `rusqlite`.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use rusqlite::types::ValueRef;

use apicheck_core::config::{Config, DbProfile};
use apicheck_core::{ExtDict, Node, Transcript};

use super::{DbError, ExecOutcome, SqlDb, note_failure, note_unchanged};

pub struct SqliteDb {
    conn: Connection,
    path: Option<PathBuf>,
    transcript: Option<Transcript>,
}

impl std::fmt::Debug for SqliteDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDb").field("path", &self.path).finish_non_exhaustive()
    }
}

impl std::fmt::Display for SqliteDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "Connected to {}", path.display()),
            None => write!(f, "Connected to in-memory database"),
        }
    }
}

impl SqliteDb {
    /// # Errors
    ///
    /// Returns [`DbError::Open`] when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path).map_err(|e| DbError::Open {
            target: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "database opened");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            transcript: None,
        })
    }

    /// Open the database `name` of the active environment.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for an unknown database,
    /// [`DbError::WrongBackend`] for a PostgreSQL profile, otherwise as
    /// [`SqliteDb::open`].
    pub fn from_config(config: &Config, name: &str) -> Result<Self, DbError> {
        match config.database(name)? {
            DbProfile::Sqlite { path } => Self::open(path),
            DbProfile::Postgres(_) => Err(DbError::WrongBackend {
                name: name.to_string(),
                expected: "SQLite",
            }),
        }
    }

    /// # Errors
    ///
    /// Returns [`DbError::Open`] if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(|e| DbError::Open {
            target: ":memory:".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            conn,
            path: None,
            transcript: None,
        })
    }

    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// # Errors
    ///
    /// Returns [`DbError::Open`] if SQLite refuses to close the connection.
    pub fn close(self) -> Result<(), DbError> {
        let target = self
            .path
            .map_or_else(|| ":memory:".to_string(), |path| path.display().to_string());
        self.conn.close().map_err(|(_, e)| DbError::Open {
            target,
            reason: e.to_string(),
        })
    }

    fn query_rows(&self, query: &str, limit: Option<usize>) -> Result<Vec<ExtDict>, DbError> {
        let failed = |e: rusqlite::Error| DbError::Query {
            query: query.to_string(),
            reason: e.to_string(),
        };

        let mut stmt = self.conn.prepare(query).map_err(failed)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([]).map_err(failed)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(failed)? {
            let mut record = ExtDict::new();
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), cell(row.get_ref(idx).map_err(failed)?));
            }
            out.push(record);
            if limit.is_some_and(|n| out.len() >= n) {
                break;
            }
        }

        if let Some(transcript) = &self.transcript {
            transcript.append_sql(query, &out, None);
        }
        Ok(out)
    }

    fn rolled_back(&self, query: &str, error: &rusqlite::Error) -> ExecOutcome {
        note_failure(self.transcript.as_ref(), "SQLite", query, &error.to_string())
    }
}

fn cell(value: ValueRef<'_>) -> Node {
    match value {
        ValueRef::Null => Node::Null,
        ValueRef::Integer(i) => Node::from(i),
        ValueRef::Real(f) => Node::from(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Node::from(String::from_utf8_lossy(bytes).into_owned()),
    }
}

impl SqlDb for SqliteDb {
    fn select_one(&self, query: &str) -> Result<Option<ExtDict>, DbError> {
        Ok(self.query_rows(query, Some(1))?.into_iter().next())
    }

    fn select_all(&self, query: &str) -> Result<Vec<ExtDict>, DbError> {
        self.query_rows(query, None)
    }

    fn execute(&self, query: &str) -> ExecOutcome {
        let tx = match self.conn.unchecked_transaction() {
            Ok(tx) => tx,
            Err(e) => return self.rolled_back(query, &e),
        };
        let changed = match tx.execute(query, []) {
            Ok(n) => n,
            Err(e) => {
                // dropping the transaction rolls it back
                drop(tx);
                return self.rolled_back(query, &e);
            }
        };
        // schema statements report zero rows and still need the commit
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
        let tx = match self.conn.unchecked_transaction() {
            Ok(tx) => tx,
            Err(e) => return self.rolled_back(&batch, &e),
        };
        let mut changed = 0;
        for query in queries {
            match tx.execute(query, []) {
                Ok(n) => changed += n,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> SqliteDb {
        let db = SqliteDb::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, note TEXT);
                 INSERT INTO users (id, name, score) VALUES (1, 'ann', 9.5), (2, 'bob', NULL);",
            )
            .unwrap();
        db
    }

    #[test]
    fn rows_are_keyed_by_column() {
        let db = db();
        let row = db.select_one("SELECT * FROM users ORDER BY id").unwrap().unwrap();
        assert_eq!(row.keys().collect::<Vec<_>>(), ["id", "name", "score", "note"]);
        assert_eq!(row["id"].as_i64(), Some(1));
        assert_eq!(row["name"].as_str(), Some("ann"));
        assert_eq!(row["score"].as_f64(), Some(9.5));
        assert!(row["note"].is_null());

        assert_eq!(db.select_all("SELECT id FROM users").unwrap().len(), 2);
        assert!(db.select_one("SELECT * FROM users WHERE id = 99").unwrap().is_none());
    }

    #[test]
    fn bad_select_is_an_error() {
        let err = db().select_all("SELECT * FROM nowhere").unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
    }

    #[test]
    fn execute_reports_outcome() {
        let transcript = Transcript::default();
        let db = db().with_transcript(transcript.clone());

        assert_eq!(db.execute("UPDATE users SET note = 'x'"), ExecOutcome::Applied(2));
        assert_eq!(db.execute("DELETE FROM users WHERE id = 99"), ExecOutcome::Unchanged);
        let failed = db.execute("INSERT INTO users (id, name) VALUES (1, 'dup')");
        assert!(matches!(failed, ExecOutcome::RolledBack { .. }));
        assert_eq!(failed.row_count(), 0);

        // one note for the no-op, one for the failure
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let db = db();
        let outcome = db.execute_few_transactions(&[
            "DELETE FROM users WHERE id = 2",
            "INSERT INTO users (id, name) VALUES (1, 'dup')",
        ]);
        assert!(matches!(outcome, ExecOutcome::RolledBack { .. }));
        assert_eq!(db.select_all("SELECT id FROM users").unwrap().len(), 2);

        let outcome = db.execute_few_transactions(&[
            "DELETE FROM users WHERE id = 2",
            "INSERT INTO users (id, name) VALUES (3, 'cy')",
        ]);
        assert_eq!(outcome, ExecOutcome::Applied(2));
    }
}
