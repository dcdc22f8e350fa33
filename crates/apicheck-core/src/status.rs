//! HTTP status names and status assertions
//!
//! Every standard status has an upper-case name (`OK`, `NOT_FOUND`, ...) and
//! a matching checker method (`ok()`, `not_found()`, ...), so a test reads
//! `response.status_is().created()?` and fails with the full response dump.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("HTTP code \"{0}\" does not exist")]
    UnknownName(String),

    #[error("HTTP status {0} has no standard name")]
    UnknownCode(u16),

    #[error("Expected status: {expected}, actual: {actual}\n\n***DEBUG:***\n{dump}")]
    Mismatch {
        expected: u16,
        actual: u16,
        dump: String,
    },
}

/// Checks one response's status against expectations.
pub struct StatusChecker<'a> {
    actual: u16,
    dump: &'a dyn fmt::Display,
}

impl<'a> StatusChecker<'a> {
    /// `dump` is rendered into the error message on mismatch.
    pub fn new(actual: u16, dump: &'a dyn fmt::Display) -> Self {
        Self { actual, dump }
    }

    /// Expect an exact code.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Mismatch`] with the rendered dump.
    pub fn expect(&self, expected: u16) -> Result<(), StatusError> {
        if self.actual == expected {
            Ok(())
        } else {
            Err(StatusError::Mismatch {
                expected,
                actual: self.actual,
                dump: self.dump.to_string(),
            })
        }
    }

    /// Expect the status with the given name, e.g. `"NO_CONTENT"`.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::UnknownName`] for a name outside the table,
    /// otherwise as [`StatusChecker::expect`].
    pub fn named(&self, name: &str) -> Result<(), StatusError> {
        let code = status_code(name).ok_or_else(|| StatusError::UnknownName(name.to_string()))?;
        self.expect(code)
    }

    /// Expect a code that has a standard name.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::UnknownCode`] for codes outside the table,
    /// otherwise as [`StatusChecker::expect`].
    pub fn code(&self, code: u16) -> Result<(), StatusError> {
        status_name(code).ok_or(StatusError::UnknownCode(code))?;
        self.expect(code)
    }
}

macro_rules! http_statuses {
    ($($code:literal => $name:ident, $method:ident, $phrase:literal;)*) => {
        /// Every standard status as `(code, NAME)`.
        pub const STATUS_NAMES: &[(u16, &str)] = &[$(($code, stringify!($name)),)*];

        /// Registered reason phrase per code.
        const REASON_PHRASES: &[(u16, &str)] = &[$(($code, $phrase),)*];

        impl StatusChecker<'_> {
            $(
                #[doc = concat!("Expect `", stringify!($code), " ", stringify!($name), "`.")]
                ///
                /// # Errors
                ///
                /// Returns [`StatusError::Mismatch`] for any other status.
                pub fn $method(&self) -> Result<(), StatusError> {
                    self.expect($code)
                }
            )*
        }
    };
}

http_statuses! {
    100 => CONTINUE, continue_, "Continue";
    101 => SWITCHING_PROTOCOLS, switching_protocols, "Switching Protocols";
    102 => PROCESSING, processing, "Processing";
    103 => EARLY_HINTS, early_hints, "Early Hints";
    200 => OK, ok, "OK";
    201 => CREATED, created, "Created";
    202 => ACCEPTED, accepted, "Accepted";
    203 => NON_AUTHORITATIVE_INFORMATION, non_authoritative_information, "Non-Authoritative Information";
    204 => NO_CONTENT, no_content, "No Content";
    205 => RESET_CONTENT, reset_content, "Reset Content";
    206 => PARTIAL_CONTENT, partial_content, "Partial Content";
    207 => MULTI_STATUS, multi_status, "Multi-Status";
    208 => ALREADY_REPORTED, already_reported, "Already Reported";
    226 => IM_USED, im_used, "IM Used";
    300 => MULTIPLE_CHOICES, multiple_choices, "Multiple Choices";
    301 => MOVED_PERMANENTLY, moved_permanently, "Moved Permanently";
    302 => FOUND, found, "Found";
    303 => SEE_OTHER, see_other, "See Other";
    304 => NOT_MODIFIED, not_modified, "Not Modified";
    305 => USE_PROXY, use_proxy, "Use Proxy";
    307 => TEMPORARY_REDIRECT, temporary_redirect, "Temporary Redirect";
    308 => PERMANENT_REDIRECT, permanent_redirect, "Permanent Redirect";
    400 => BAD_REQUEST, bad_request, "Bad Request";
    401 => UNAUTHORIZED, unauthorized, "Unauthorized";
    402 => PAYMENT_REQUIRED, payment_required, "Payment Required";
    403 => FORBIDDEN, forbidden, "Forbidden";
    404 => NOT_FOUND, not_found, "Not Found";
    405 => METHOD_NOT_ALLOWED, method_not_allowed, "Method Not Allowed";
    406 => NOT_ACCEPTABLE, not_acceptable, "Not Acceptable";
    407 => PROXY_AUTHENTICATION_REQUIRED, proxy_authentication_required, "Proxy Authentication Required";
    408 => REQUEST_TIMEOUT, request_timeout, "Request Timeout";
    409 => CONFLICT, conflict, "Conflict";
    410 => GONE, gone, "Gone";
    411 => LENGTH_REQUIRED, length_required, "Length Required";
    412 => PRECONDITION_FAILED, precondition_failed, "Precondition Failed";
    413 => REQUEST_ENTITY_TOO_LARGE, request_entity_too_large, "Content Too Large";
    414 => REQUEST_URI_TOO_LONG, request_uri_too_long, "URI Too Long";
    415 => UNSUPPORTED_MEDIA_TYPE, unsupported_media_type, "Unsupported Media Type";
    416 => REQUESTED_RANGE_NOT_SATISFIABLE, requested_range_not_satisfiable, "Range Not Satisfiable";
    417 => EXPECTATION_FAILED, expectation_failed, "Expectation Failed";
    418 => IM_A_TEAPOT, im_a_teapot, "I'm a teapot";
    421 => MISDIRECTED_REQUEST, misdirected_request, "Misdirected Request";
    422 => UNPROCESSABLE_ENTITY, unprocessable_entity, "Unprocessable Content";
    423 => LOCKED, locked, "Locked";
    424 => FAILED_DEPENDENCY, failed_dependency, "Failed Dependency";
    425 => TOO_EARLY, too_early, "Too Early";
    426 => UPGRADE_REQUIRED, upgrade_required, "Upgrade Required";
    428 => PRECONDITION_REQUIRED, precondition_required, "Precondition Required";
    429 => TOO_MANY_REQUESTS, too_many_requests, "Too Many Requests";
    431 => REQUEST_HEADER_FIELDS_TOO_LARGE, request_header_fields_too_large, "Request Header Fields Too Large";
    451 => UNAVAILABLE_FOR_LEGAL_REASONS, unavailable_for_legal_reasons, "Unavailable For Legal Reasons";
    500 => INTERNAL_SERVER_ERROR, internal_server_error, "Internal Server Error";
    501 => NOT_IMPLEMENTED, not_implemented, "Not Implemented";
    502 => BAD_GATEWAY, bad_gateway, "Bad Gateway";
    503 => SERVICE_UNAVAILABLE, service_unavailable, "Service Unavailable";
    504 => GATEWAY_TIMEOUT, gateway_timeout, "Gateway Timeout";
    505 => HTTP_VERSION_NOT_SUPPORTED, http_version_not_supported, "HTTP Version Not Supported";
    506 => VARIANT_ALSO_NEGOTIATES, variant_also_negotiates, "Variant Also Negotiates";
    507 => INSUFFICIENT_STORAGE, insufficient_storage, "Insufficient Storage";
    508 => LOOP_DETECTED, loop_detected, "Loop Detected";
    510 => NOT_EXTENDED, not_extended, "Not Extended";
    511 => NETWORK_AUTHENTICATION_REQUIRED, network_authentication_required, "Network Authentication Required";
}

/// Upper-case name of a standard status.
#[must_use]
pub fn status_name(code: u16) -> Option<&'static str> {
    STATUS_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Code for an upper-case status name.
#[must_use]
pub fn status_code(name: &str) -> Option<u16> {
    STATUS_NAMES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(code, _)| *code)
}

/// Reason phrase as registered with IANA, e.g. `404` -> `Not Found`.
#[must_use]
pub fn reason_phrase(code: u16) -> Option<&'static str> {
    REASON_PHRASES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, phrase)| *phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_codes_agree() {
        for (code, name) in STATUS_NAMES {
            assert_eq!(status_code(name), Some(*code));
            assert_eq!(status_name(*code), Some(*name));
        }
        assert_eq!(status_name(299), None);
        assert_eq!(status_code("NOPE"), None);
    }

    #[test]
    fn checker_methods_follow_the_table() {
        let dump = "body";
        let checker = StatusChecker::new(404, &dump);
        assert!(checker.not_found().is_ok());
        assert!(checker.named("NOT_FOUND").is_ok());
        assert!(checker.code(404).is_ok());
        assert!(checker.ok().is_err());
    }

    #[test]
    fn mismatch_carries_the_dump() {
        let dump = "HTTP status: 500";
        let err = StatusChecker::new(500, &dump).created().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected status: 201, actual: 500\n\n***DEBUG:***\nHTTP status: 500"
        );
    }

    #[test]
    fn unknown_names_and_codes_are_errors() {
        let dump = "";
        let checker = StatusChecker::new(200, &dump);
        assert_eq!(
            checker.named("FINE").unwrap_err(),
            StatusError::UnknownName("FINE".into())
        );
        assert_eq!(checker.code(299).unwrap_err(), StatusError::UnknownCode(299));
    }

    #[test]
    fn reason_phrases_follow_the_registry() {
        assert_eq!(reason_phrase(404), Some("Not Found"));
        assert_eq!(reason_phrase(200), Some("OK"));
        assert_eq!(reason_phrase(203), Some("Non-Authoritative Information"));
        assert_eq!(reason_phrase(226), Some("IM Used"));
        assert_eq!(reason_phrase(418), Some("I'm a teapot"));
        assert_eq!(reason_phrase(414), Some("URI Too Long"));
        assert_eq!(reason_phrase(505), Some("HTTP Version Not Supported"));
        assert_eq!(reason_phrase(1), None);
    }

    #[test]
    fn every_named_status_has_a_phrase() {
        for (code, _) in STATUS_NAMES {
            assert!(reason_phrase(*code).is_some_and(|p| !p.is_empty()), "{code}");
        }
    }
}
