//! HTTP message model: requests built by tests, responses decoded for them.
//!
//! Nothing here performs I/O. Transports live in `apicheck-runner`; they
//! turn a [`Request`] into bytes on the wire and hand back
//! [`ResponseParts`] for [`Response::from_parts`].

mod message;
mod method;
mod path;
mod request;
mod response;
pub mod xml;

use thiserror::Error;

pub use message::{MediaType, pretty_json, raw_formatted_headers};
pub use method::Method;
pub use path::{PathArgs, PathError, PathTemplate};
pub use request::{Body, EncodedBody, Request};
pub use response::{BodyOutcome, Response, ResponseBody, ResponseParts};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("unknown HTTP method '{0}'")]
    UnknownMethod(String),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("a {found} body cannot be sent as {media}")]
    UnsupportedBody { media: String, found: &'static str },

    #[error("byte body is not a JSON literal: {0}")]
    InvalidBytesLiteral(String),
}
