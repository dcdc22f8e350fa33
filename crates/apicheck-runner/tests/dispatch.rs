//! Dispatch retry behaviour against a scripted transport.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use apicheck_core::http::{Body, Method, Response, ResponseParts};
use apicheck_core::{LogItem, Transcript};
use apicheck_runner::{
    ApiEndpoint, CallArgs, DispatchError, Dispatcher, ManualClock, PreparedCall, RetryPolicy, Transport,
};

/// Answers with the queued statuses in order and records what was sent.
struct Scripted {
    statuses: RefCell<VecDeque<u16>>,
    sent: RefCell<Vec<PreparedCall>>,
}

impl Scripted {
    fn new(statuses: &[u16]) -> Self {
        Self {
            statuses: RefCell::new(statuses.iter().copied().collect()),
            sent: RefCell::new(Vec::new()),
        }
    }

    fn sent(&self) -> usize {
        self.sent.borrow().len()
    }
}

impl Transport for Scripted {
    fn send(&self, call: &PreparedCall) -> Result<Response, DispatchError> {
        self.sent.borrow_mut().push(call.clone());
        let status = self.statuses.borrow_mut().pop_front().unwrap_or(500);
        Ok(Response::from_parts(ResponseParts {
            status,
            reason: String::new(),
            url: call.url.to_string(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            cookies: Vec::new(),
            raw: format!(r#"{{"status": {status}}}"#).into_bytes(),
        }))
    }
}

fn endpoint() -> ApiEndpoint {
    ApiEndpoint::new("http://localhost:8080", Method::Post, "/orders/{id}").unwrap()
}

#[test]
fn transient_statuses_are_retried_until_success() {
    let transport = Scripted::new(&[408, 408, 200]);
    let clock = ManualClock::new();
    let transcript = Transcript::default();
    let dispatcher = Dispatcher::new(&transport)
        .with_clock(&clock)
        .with_transcript(transcript.clone());

    let response = dispatcher
        .call(&endpoint(), &CallArgs::new().arg(7).with_body(Body::from("{}")))
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body.as_dict().unwrap()["status"].as_i64(), Some(200));
    assert_eq!(transport.sent(), 3);
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(500); 2]);

    let items = transcript.items();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| matches!(item, LogItem::Http { .. })));
}

#[test]
fn final_status_returns_without_sleeping() {
    let transport = Scripted::new(&[503]);
    let clock = ManualClock::new();
    let dispatcher = Dispatcher::new(&transport).with_clock(&clock);

    let response = dispatcher.call(&endpoint(), &CallArgs::new().arg(1)).unwrap();
    assert_eq!(response.status, 503);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn retry_gives_up_with_the_last_response() {
    let transport = Scripted::new(&[408; 10]);
    let clock = ManualClock::new();
    let policy = RetryPolicy {
        timeout: Duration::from_secs(1),
        ..RetryPolicy::default()
    };
    let dispatcher = Dispatcher::new(&transport).with_clock(&clock).with_policy(policy);

    match dispatcher.call(&endpoint(), &CallArgs::new().arg(1)) {
        Err(DispatchError::Exhausted { attempts, response }) => {
            assert_eq!(attempts, 2);
            assert_eq!(response.status, 408);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(transport.sent(), 2);
}

#[test]
fn custom_transient_set() {
    let transport = Scripted::new(&[503, 429, 201]);
    let clock = ManualClock::new();
    let policy = RetryPolicy {
        transient: vec![429, 503],
        ..RetryPolicy::default()
    };
    let dispatcher = Dispatcher::new(&transport).with_clock(&clock).with_policy(policy);

    let response = dispatcher.call(&endpoint(), &CallArgs::new().arg(1)).unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(clock.sleeps().len(), 2);
}

#[test]
fn unsupported_scheme_fails_before_sending() {
    let transport = Scripted::new(&[200]);
    let dispatcher = Dispatcher::new(&transport).with_clock(ManualClock::new());
    let endpoint = ApiEndpoint::new("ws://localhost:8080", Method::Get, "/stream").unwrap();

    let err = dispatcher.call(&endpoint, &CallArgs::new()).unwrap_err();
    assert!(matches!(err, DispatchError::UnsupportedScheme { .. }));
    assert_eq!(transport.sent(), 0);
}

#[test]
fn http_logging_can_be_switched_off() {
    let transport = Scripted::new(&[200]);
    let transcript = Transcript::new(false, true);
    let dispatcher = Dispatcher::new(&transport)
        .with_clock(ManualClock::new())
        .with_transcript(transcript.clone());

    dispatcher.call(&endpoint(), &CallArgs::new().arg(1)).unwrap();
    assert!(transcript.is_empty());
}
