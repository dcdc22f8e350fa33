//! apicheck-runner: endpoint dispatch, response validation and database
//! helpers for API test automation

pub mod clock;
pub mod db;
pub mod dispatch;
pub mod schema_check;
pub mod wait;

pub use clock::{Clock, ManualClock, SystemClock};
pub use db::{Database, DbError, ExecOutcome, PostgresDb, SqlDb, SqliteDb};
pub use dispatch::{
    ApiEndpoint, CallArgs, DispatchError, Dispatcher, PreparedCall, ReqwestTransport, RetryPolicy, Transport,
    TransportSettings,
};
pub use schema_check::{SchemaCheckError, SchemaValidator, conforms_to};
pub use wait::{WaitError, for_db_state, success_waiter};
