//! Integration tests for the dispatcher against the in-memory transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use conduit_net::{
    Api, ConnectionErrorReason, Decoded, Endpoint, EndpointOperatable, EndpointOperationError,
    HeaderPolicy, HttpErrorReason, JsonStrategy, Logger, MockTransport, NetworkError,
    NetworkListener, NoopLogger, RequestDescriptor, RequestEncodingReason, Response,
    TransportFailure, TransportOutcome,
};
use parking_lot::Mutex;
use serde::Deserialize;

type Responses = Arc<Mutex<Vec<Response>>>;

fn api_with(transport: &Arc<MockTransport>) -> Api {
    Api::builder("https://api.example.com")
        .transport(transport.clone())
        .logger(NoopLogger)
        .build()
        .expect("Failed to build api")
}

fn collect(responses: &Responses) -> impl Fn(Response) + Send + Sync + 'static {
    let responses = responses.clone();
    move |response| responses.lock().push(response)
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<&'static str>>,
}

impl Recorder {
    fn events(&self) -> Vec<&'static str> {
        self.events.lock().clone()
    }
}

impl NetworkListener for Recorder {
    fn on_unauthorized(&self, _response: &Response) {
        self.events.lock().push("unauthorized");
    }

    fn on_defective_client(&self, _response: &Response) {
        self.events.lock().push("defective_client");
    }

    fn on_unresponsive_server(&self, _response: &Response) {
        self.events.lock().push("unresponsive_server");
    }

    fn on_unavailable_network(&self, _response: &Response) {
        self.events.lock().push("unavailable_network");
    }
}

#[derive(Clone, Default)]
struct CountingLogger {
    requests: Arc<AtomicUsize>,
    responses: Arc<AtomicUsize>,
}

impl CountingLogger {
    fn counts(&self) -> (usize, usize) {
        (
            self.requests.load(Ordering::SeqCst),
            self.responses.load(Ordering::SeqCst),
        )
    }
}

impl Logger for CountingLogger {
    fn log_request(&self, _request: &RequestDescriptor) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn log_response(&self, _response: &Response) {
        self.responses.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_not_found_reaches_caller() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let responses = Responses::default();

    let endpoint = api.get("/users/42").on_response(collect(&responses)).build();
    endpoint.send();

    assert!(endpoint.is_in_flight());
    assert!(api.registry().contains_path("/users/42"));

    let task = transport.last_task().expect("task created");
    assert_eq!(task.request().path, "/users/42");
    task.complete(TransportOutcome::status(404, None));

    let responses = responses.lock();
    assert_eq!(responses.len(), 1);
    let response = &responses[0];
    assert!(!response.is_success());
    assert_eq!(response.status_code, Some(404));
    assert_eq!(
        response.error.as_ref().and_then(NetworkError::http_reason),
        Some(HttpErrorReason::NotFound)
    );

    assert!(!endpoint.is_in_flight());
    assert!(endpoint.current_task().is_none());
    assert!(!api.registry().contains_path("/users/42"));
}

#[test]
fn test_cancel_all_for_path_cancels_both_tasks() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let responses = Responses::default();

    let first = api
        .get("/repos")
        .ignore_result_on_cancel(false)
        .on_response(collect(&responses))
        .build();
    let second = api
        .get("/repos")
        .ignore_result_on_cancel(false)
        .on_response(collect(&responses))
        .build();
    first.send();
    second.send();

    assert_eq!(api.registry().tasks_for_path("/repos").len(), 2);
    assert_eq!(api.cancel_endpoints_with_path("/repos"), 2);

    for task in transport.tasks() {
        assert_eq!(task.cancel_calls(), 1);
    }
    let responses = responses.lock();
    assert_eq!(responses.len(), 2);
    for response in responses.iter() {
        assert_eq!(
            response.error,
            Some(NetworkError::Connection(ConnectionErrorReason::Cancelled))
        );
    }
    assert!(!api.registry().contains_path("/repos"));
    assert_eq!(api.registry().task_count(), 0);
}

#[test]
fn test_cancelled_results_are_dropped_by_default() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let responses = Responses::default();

    let endpoint = api.get("/repos").on_response(collect(&responses)).build();
    endpoint.send();
    endpoint.cancel();
    endpoint.cancel();

    let task = transport.last_task().expect("task created");
    assert_eq!(task.cancel_calls(), 1);
    assert!(responses.lock().is_empty());
    assert!(!endpoint.is_in_flight());
}

#[test]
fn test_cancel_without_in_flight_call_is_noop() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);

    assert_eq!(api.cancel_endpoints_with_path("/nothing"), 0);
    assert_eq!(api.cancel_all_endpoints(), 0);

    let endpoint = api.get("/idle").build();
    endpoint.cancel();
    assert_eq!(transport.task_count(), 0);
}

#[test]
fn test_cancel_relative_to_path() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);

    api.get("/repos/1").build().send();
    api.get("/repos/2").build().send();
    api.get("/users").build().send();

    assert_eq!(api.cancel_endpoints_relative_to("/repos"), 2);
    assert_eq!(api.registry().task_count(), 1);
    assert!(api.registry().contains_path("/users"));

    assert_eq!(api.cancel_all_endpoints(), 1);
    assert_eq!(api.registry().path_count(), 0);
}

#[test]
fn test_retry_before_send() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let responses = Responses::default();

    let endpoint = api.get("/users").on_response(collect(&responses)).build();
    endpoint.retry();

    assert_eq!(transport.task_count(), 0);
    assert!(!endpoint.has_been_sent());
    let responses = responses.lock();
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].error,
        Some(NetworkError::EndpointOperation(
            EndpointOperationError::RetryBeforeSent
        ))
    );
}

#[test]
fn test_retry_after_send_dispatches_again() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let responses = Responses::default();

    let endpoint = api.get("/feed").on_response(collect(&responses)).build();
    endpoint.send();
    transport
        .last_task()
        .expect("first task")
        .complete(TransportOutcome::status(503, None));

    endpoint.retry();
    assert_eq!(transport.task_count(), 2);
    assert_eq!(endpoint.send_count(), 2);
    transport
        .last_task()
        .expect("second task")
        .complete(TransportOutcome::status(200, Some(Bytes::from_static(b"[]"))));

    let responses = responses.lock();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].status_code, Some(503));
    assert!(responses[1].is_success());
}

#[test]
fn test_send_while_in_flight_is_rejected() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let responses = Responses::default();

    let endpoint = api.get("/slow").on_response(collect(&responses)).build();
    endpoint.send();
    endpoint.send();

    assert_eq!(transport.task_count(), 1);
    assert_eq!(
        responses.lock()[0].error,
        Some(NetworkError::EndpointOperation(
            EndpointOperationError::AlreadyInFlight
        ))
    );
    assert!(endpoint.is_in_flight());
}

#[test]
fn test_unauthorized_not_reported_when_disabled() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let recorder = Arc::new(Recorder::default());
    api.add_listener(&recorder);
    let responses = Responses::default();

    api.get("/me")
        .notify_listeners_on_unauthorized(false)
        .ignore_result_when_listeners_notified(true)
        .on_response(collect(&responses))
        .build()
        .send();
    transport
        .last_task()
        .expect("task created")
        .complete(TransportOutcome::status(401, None));

    assert!(recorder.events().is_empty());
    assert_eq!(
        responses.lock()[0].error.as_ref().and_then(NetworkError::http_reason),
        Some(HttpErrorReason::Unauthorized)
    );
}

#[test]
fn test_unauthorized_suppressed_after_notifying() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let recorder = Arc::new(Recorder::default());
    api.add_listener(&recorder);
    let responses = Responses::default();

    api.get("/me")
        .ignore_result_when_listeners_notified(true)
        .on_response(collect(&responses))
        .build()
        .send();
    transport
        .last_task()
        .expect("task created")
        .complete(TransportOutcome::status(401, None));

    assert_eq!(recorder.events(), vec!["unauthorized"]);
    assert!(responses.lock().is_empty());
}

#[test]
fn test_listeners_run_alongside_caller_by_default() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let recorder = Arc::new(Recorder::default());
    api.add_listener(&recorder);
    let responses = Responses::default();

    for (path, status) in [("/a", 401), ("/b", 422), ("/c", 500)] {
        api.get(path).on_response(collect(&responses)).build().send();
        transport
            .last_task()
            .expect("task created")
            .complete(TransportOutcome::status(status, None));
    }

    assert_eq!(
        recorder.events(),
        vec!["unauthorized", "defective_client", "unresponsive_server"]
    );
    assert_eq!(responses.lock().len(), 3);
}

#[test]
fn test_removed_and_dropped_listeners_are_not_notified() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);

    let removed = Arc::new(Recorder::default());
    let id = api.add_listener(&removed);
    assert!(api.remove_listener(id));
    assert!(!api.remove_listener(id));

    let dropped = Arc::new(Recorder::default());
    api.add_listener(&dropped);
    drop(dropped);
    assert_eq!(api.listener_count(), 1);

    api.get("/me").build().send();
    transport
        .last_task()
        .expect("task created")
        .complete(TransportOutcome::status(401, None));

    assert!(removed.events().is_empty());
    assert_eq!(api.listener_count(), 0);
}

#[test]
fn test_synchronous_encoding_failure_is_delivered() {
    let transport = Arc::new(MockTransport::new());
    let api = Api::builder("")
        .transport(transport.clone())
        .logger(NoopLogger)
        .build()
        .expect("Failed to build api");
    let responses = Responses::default();

    let endpoint = api.get("/users").on_response(collect(&responses)).build();
    endpoint.send();

    assert_eq!(transport.task_count(), 0);
    assert!(!endpoint.is_in_flight());
    assert!(endpoint.has_been_sent());
    assert_eq!(
        responses.lock()[0].error,
        Some(NetworkError::RequestEncoding(RequestEncodingReason::EmptyUrl))
    );
}

#[test]
fn test_synchronous_connection_failure_notifies_listeners() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let recorder = Arc::new(Recorder::default());
    api.add_listener(&recorder);
    let responses = Responses::default();

    transport.reject_next(NetworkError::Connection(
        ConnectionErrorReason::NotConnectedToInternet,
    ));
    api.get("/feed").on_response(collect(&responses)).build().send();

    assert_eq!(recorder.events(), vec!["unavailable_network"]);
    assert_eq!(responses.lock().len(), 1);
}

#[test]
fn test_transport_failure_is_classified() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let responses = Responses::default();

    api.get("/feed").on_response(collect(&responses)).build().send();
    transport
        .last_task()
        .expect("task created")
        .complete(TransportOutcome::failure(TransportFailure::TimedOut));

    assert_eq!(
        responses.lock()[0].error,
        Some(NetworkError::Connection(
            ConnectionErrorReason::NotConnectedToInternet
        ))
    );
}

#[test]
fn test_rejected_success_becomes_unexpected() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let responses = Responses::default();

    api.get("/feed").on_response(collect(&responses)).build().send();
    transport
        .last_task()
        .expect("task created")
        .complete(TransportOutcome::rejected(200, "content type mismatch", None));

    assert!(matches!(
        &responses.lock()[0].error,
        Some(NetworkError::Unexpected { message, .. }) if message == "content type mismatch"
    ));
}

#[test]
fn test_synchronous_completion() {
    let transport = Arc::new(MockTransport::with_responder(|request| {
        (request.path == "/ping").then(|| TransportOutcome::status(204, None))
    }));
    let api = api_with(&transport);
    let responses = Responses::default();

    let endpoint = api.get("/ping").on_response(collect(&responses)).build();
    endpoint.send();

    assert!(responses.lock()[0].is_success());
    assert!(!endpoint.is_in_flight());
    assert!(endpoint.current_task().is_none());
    assert_eq!(api.registry().task_count(), 0);
}

#[test]
fn test_interceptors_and_default_headers() {
    let transport = Arc::new(MockTransport::new());
    let api = Api::builder("https://api.example.com")
        .default_header("Accept", "application/json")
        .add_request_interceptor(|request| {
            request.query.push(("locale".to_string(), "en".to_string()));
        })
        .transport(transport.clone())
        .logger(NoopLogger)
        .build()
        .expect("Failed to build api");

    let endpoint = api.get("/feed").validate(false).build();
    endpoint.send();

    let task = transport.last_task().expect("task created");
    assert_eq!(task.request().headers.get("accept").unwrap(), "application/json");
    assert_eq!(task.request().query, vec![("locale".to_string(), "en".to_string())]);
    assert!(!task.validate_response());
    // The endpoint's own descriptor is untouched by interceptors.
    assert!(endpoint.descriptor().query.is_empty());
}

#[test]
fn test_invalid_default_header_fails_build() {
    let result = Api::builder("https://api.example.com")
        .default_header("Bad Header", "x")
        .transport(MockTransport::new())
        .build();
    assert!(matches!(
        result,
        Err(NetworkError::RequestEncoding(RequestEncodingReason::InvalidHeader { .. }))
    ));
}

#[test]
fn test_additional_header_applies_to_next_send_only() {
    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let endpoint: Endpoint = api.get("/me").build();

    endpoint.send();
    endpoint
        .set_additional_header("X-Trace", "1", HeaderPolicy::Replace)
        .expect("valid header");
    let first = transport.last_task().expect("first task");
    assert!(first.request().headers.get("x-trace").is_none());
    first.complete(TransportOutcome::status(200, None));

    endpoint.send();
    let second = transport.last_task().expect("second task");
    assert_eq!(second.request().headers.get("x-trace").unwrap(), "1");

    assert!(
        endpoint
            .set_additional_header("bad header", "1", HeaderPolicy::Append)
            .is_err()
    );
}

#[test]
fn test_decoded_continuation() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    let transport = Arc::new(MockTransport::new());
    let api = api_with(&transport);
    let users: Arc<Mutex<Vec<Decoded<User>>>> = Arc::default();

    let sink = users.clone();
    api.get("/users/1")
        .on_decoded(JsonStrategy::new().key_path("data"), move |decoded: Decoded<User>| {
            sink.lock().push(decoded)
        })
        .build()
        .send();
    transport.last_task().expect("task created").complete(TransportOutcome::status(
        200,
        Some(Bytes::from_static(br#"{"data":{"id":1,"name":"Ada"}}"#)),
    ));

    let users = users.lock();
    assert_eq!(
        users[0].value.as_ref().ok(),
        Some(&User {
            id: 1,
            name: "Ada".to_string()
        })
    );
}

#[test]
fn test_logger_sees_each_attempt_and_completion_once() {
    let transport = Arc::new(MockTransport::new());
    let logger = CountingLogger::default();
    let api = Api::builder("https://api.example.com")
        .transport(transport.clone())
        .logger(logger.clone())
        .build()
        .expect("Failed to build api");
    let responses = Responses::default();

    let endpoint = api.get("/feed").on_response(collect(&responses)).build();

    endpoint.retry();
    assert_eq!(logger.counts(), (0, 0), "retry before send is not logged");

    endpoint.send();
    assert_eq!(logger.counts(), (1, 0));
    endpoint.send();
    assert_eq!(logger.counts(), (1, 0), "rejected concurrent send is not logged");

    transport
        .last_task()
        .expect("task")
        .complete(TransportOutcome::status(200, Some(Bytes::from_static(b"[]"))));
    assert_eq!(logger.counts(), (1, 1));

    transport.reject_next(NetworkError::Connection(
        ConnectionErrorReason::NotConnectedToInternet,
    ));
    endpoint.retry();
    assert_eq!(logger.counts(), (2, 2), "synchronous failure logs both sides");

    endpoint.retry();
    transport
        .last_task()
        .expect("retried task")
        .complete(TransportOutcome::failure(TransportFailure::TimedOut));
    assert_eq!(logger.counts(), (3, 3));
    assert_eq!(responses.lock().len(), 4);
}
