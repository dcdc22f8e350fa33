//! Fixed-interval polling helpers.

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use apicheck_core::ExtDict;

use crate::clock::Clock;
use crate::db::{DbError, SqlDb};

pub const DB_STATE_ATTEMPTS: u32 = 60;
pub const DB_STATE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("waiting for db state failed: no entry found!\n  {query}")]
    NoEntry { query: String },

    #[error("waiting for db state failed: timeout exceeded after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("operation kept failing until the timeout:\n{last_error}")]
    GaveUp { last_error: String },
}

/// Poll `query` until its first row satisfies `predicate`.
///
/// A query that returns no row fails at once with [`WaitError::NoEntry`];
/// the row is expected to exist and only its state to change.
///
/// # Errors
///
/// [`WaitError::NoEntry`], [`WaitError::Timeout`] after `attempts` polls,
/// or [`WaitError::Db`] when the query cannot run.
pub fn for_db_state<D, P, C>(
    db: &D,
    query: &str,
    predicate: P,
    attempts: u32,
    interval: Duration,
    clock: &C,
) -> Result<ExtDict, WaitError>
where
    D: SqlDb + ?Sized,
    P: Fn(&ExtDict) -> bool,
    C: Clock + ?Sized,
{
    for attempt in 1..=attempts {
        let Some(row) = db.select_one(query)? else {
            return Err(WaitError::NoEntry {
                query: query.to_string(),
            });
        };
        tracing::debug!(attempt, %row, "polled db state");
        if predicate(&row) {
            return Ok(row);
        }
        clock.sleep(interval);
    }
    Err(WaitError::Timeout { attempts })
}

/// Call `f` until it succeeds or `timeout` has passed, sleeping `interval`
/// after each failure. `f` is always called at least once.
///
/// # Errors
///
/// [`WaitError::GaveUp`] carrying the last failure's message.
pub fn success_waiter<T, E, F, C>(timeout: Duration, interval: Duration, clock: &C, mut f: F) -> Result<T, WaitError>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
    C: Clock + ?Sized,
{
    let deadline = clock.now() + timeout;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(error) => {
                clock.sleep(interval);
                if clock.now() >= deadline {
                    return Err(WaitError::GaveUp {
                        last_error: error.to_string(),
                    });
                }
            }
        }
    }
}
