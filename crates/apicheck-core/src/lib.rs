//! apicheck-core: data model for HTTP API and database test automation
//!
//! This crate holds everything a test touches that does not perform I/O on
//! the network or a database: ordered containers with dotted access,
//! recursive conversion and sorting, the HTTP request/response model,
//! configuration, schema/data file lookup, the report transcript and the
//! JSON/YAML fixture tools.

pub mod collections;
pub mod config;
pub mod convert;
pub mod dump;
pub mod generator;
pub mod http;
pub mod matchers;
pub mod registry;
pub mod schema;
pub mod schemagen;
pub mod sort;
pub mod status;
pub mod transcode;
pub mod transcript;

pub use collections::{Addressing, DictError, ExtDict, Key, Node, SeqKind, Sequence, TupleDict};
pub use config::{Config, ConfigError, DbCredentials, DbProfile, PgProfile, ServiceProfile};
pub use convert::{ConvertError, RecursiveConverter};
pub use dump::{DumpError, TranscriptIndex, write_transcript};
pub use generator::to_http_file;
pub use http::{Body, Method, PathArgs, PathTemplate, Request, RequestError, Response, ResponseBody};
pub use matchers::{Matcher, Mismatch, Pattern};
pub use registry::{FileRegistry, LookupError};
pub use schema::TranscriptRecord;
pub use sort::{MatchPolicy, RecursiveSort, SortRules};
pub use status::{StatusChecker, StatusError};
pub use transcode::{Format, TranscodeError};
pub use transcript::{LogItem, Step, Transcript};
