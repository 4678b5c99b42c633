#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Client state machine against a scripted transport.

mod common;

use common::{Call, ScriptedTransport, failed, moved, ok};
use httpkit::{
    ClientOption, ContentKind, DEFAULT_USER_AGENT, ErrorCode, ExponentialBackoff, HttpClient,
    MultipartContent, NODEFINE, Part, RawContent, Request, RequestBody, TransportCode, Uri,
};

fn client(transport: &ScriptedTransport, option: ClientOption) -> HttpClient<ScriptedTransport> {
    let mut client = HttpClient::with_transport(transport.clone());
    client.configure(option);
    client
}

#[test]
fn retries_until_connection_succeeds() {
    let n = 4;
    let mut script = vec![failed(TransportCode::CouldNotConnect); n - 1];
    script.push(ok(200));
    let transport = ScriptedTransport::new(script);
    let mut client = client(&transport, ClientOption::default().with_retry_count(5));

    let response = client.get(&Uri::new("http://h.test/"), None).unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(client.metrics().retries, 3);
    assert_eq!(client.metrics().attempts, 4);
    assert_eq!(transport.executions(), n);
    // Retries re-execute without reconfiguring.
    assert_eq!(transport.count(|c| matches!(c, Call::Configure { .. })), 1);
}

#[test]
fn timeout_is_returned_after_all_retries() {
    let retry_count = 2;
    let transport = ScriptedTransport::repeating(failed(TransportCode::OperationTimedOut));
    let mut client = client(
        &transport,
        ClientOption::default()
            .with_retry_count(retry_count)
            .with_retry_backoff(ExponentialBackoff::fast()),
    );

    let err = client.get(&Uri::new("http://h.test/"), None).unwrap_err();
    assert_eq!(err, ErrorCode::RequestTimeout);
    assert_eq!(transport.executions(), 3);
    assert_eq!(client.metrics().attempts, 3);
    assert_eq!(client.response().status_code(), NODEFINE);
}

#[test]
fn non_transient_failures_are_not_retried() {
    for (code, expected) in [
        (TransportCode::CouldNotResolveHost, ErrorCode::CouldNotResolveHost),
        (TransportCode::CouldNotResolveProxy, ErrorCode::CouldNotResolveProxy),
        (TransportCode::PeerFailedVerification, ErrorCode::PeerVerificationFailed),
        (TransportCode::RecvError, ErrorCode::ReceiveError),
        (TransportCode::Other(99), ErrorCode::UnknownFailure),
    ] {
        let transport = ScriptedTransport::repeating(failed(code));
        let mut client = client(&transport, ClientOption::default().with_retry_count(3));
        assert_eq!(client.get(&Uri::new("http://h.test/"), None).unwrap_err(), expected);
        assert_eq!(transport.executions(), 1);
    }
}

#[test]
fn aborted_transfer_is_user_cancelled() {
    let transport = ScriptedTransport::repeating(failed(TransportCode::AbortedByCallback));
    let mut client = client(&transport, ClientOption::default().with_retry_count(3));
    let err = client.get(&Uri::new("http://h.test/"), None).unwrap_err();
    assert_eq!(err, ErrorCode::UserCancelled);
    assert_eq!(transport.executions(), 1);
}

#[test]
fn redirect_is_followed_when_enabled() {
    let transport = ScriptedTransport::new(vec![moved("http://h.test/new"), ok(200)]);
    let mut client = client(&transport, ClientOption::default().with_auto_redirect(true));

    let uri = Uri::new("http://h.test/old").with_query_param("a", "1");
    let response = client.get(&uri, None).unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.redirect_url(), "");
    assert_eq!(
        transport.configured_urls(),
        vec!["http://h.test/old?a=1".to_owned(), "http://h.test/new".to_owned()]
    );
    assert_eq!(client.metrics().redirects, 1);
    assert_eq!(client.metrics().attempts, 2);
}

#[test]
fn redirect_is_reported_when_disabled() {
    let transport = ScriptedTransport::new(vec![moved("http://h.test/new"), ok(200)]);
    let mut client = client(&transport, ClientOption::default());

    let response = client.get(&Uri::new("http://h.test/old"), None).unwrap();
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.redirect_url(), "http://h.test/new");
    assert_eq!(transport.executions(), 1);
}

#[test]
fn redirect_loop_stops_at_the_cap() {
    let transport = ScriptedTransport::repeating(moved("http://h.test/loop"));
    let mut client = client(
        &transport,
        ClientOption::default()
            .with_auto_redirect(true)
            .with_max_redirects(2),
    );

    let response = client.get(&Uri::new("http://h.test/"), None).unwrap();
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.redirect_url(), "http://h.test/loop");
    assert_eq!(transport.executions(), 3);
    assert_eq!(client.metrics().redirects, 2);
}

#[test]
fn other_3xx_statuses_are_plain_responses() {
    let transport = ScriptedTransport::new(vec![ok(302)]);
    let mut client = client(&transport, ClientOption::default().with_auto_redirect(true));
    let response = client.get(&Uri::new("http://h.test/"), None).unwrap();
    assert_eq!(response.status_code(), 302);
    assert_eq!(transport.executions(), 1);
}

#[test]
fn broken_multipart_attaches_nothing() {
    let transport = ScriptedTransport::new(vec![ok(200)]);
    let mut client = client(&transport, ClientOption::default());
    let mut request = Request::new().with_content(
        MultipartContent::new()
            .part(Part::value("ok", "1"))
            .part(Part::file_from_path("missing", "/definitely/not/here.bin")),
    );

    let err = client
        .post(&Uri::new("http://h.test/upload"), Some(&mut request))
        .unwrap_err();
    assert_eq!(err, ErrorCode::RequestDataCreationFailed);
    assert_eq!(transport.count(|c| matches!(c, Call::AttachBody(_))), 0);
    assert_eq!(transport.count(|c| matches!(c, Call::AttachHeaders(_))), 0);
    assert_eq!(transport.executions(), 0);
}

#[test]
fn headers_and_body_reach_the_transport_in_order() {
    let transport = ScriptedTransport::new(vec![ok(200)]);
    let mut client = client(&transport, ClientOption::default());
    let mut request = Request::new().with_content(RawContent::json(r#"{"a":1}"#));
    request.set_host("h.test");
    request.add_header_line("X-One: 1");

    client
        .post(&Uri::new("http://h.test/"), Some(&mut request))
        .unwrap();

    let calls = transport.calls();
    let headers_at = calls
        .iter()
        .position(|c| matches!(c, Call::AttachHeaders(_)))
        .unwrap();
    assert!(matches!(calls[0], Call::Reset));
    assert!(matches!(calls[1], Call::Configure { .. }));
    assert_eq!(headers_at, 2);
    assert_eq!(
        calls[2],
        Call::AttachHeaders(vec![
            "Host: h.test".to_owned(),
            "Accept-Encoding: gzip, deflate, br".to_owned(),
            "X-One: 1".to_owned(),
            "Connection: Keep-Alive".to_owned(),
            format!("User-Agent: {DEFAULT_USER_AGENT}"),
        ])
    );
    let Call::AttachBody(body) = &calls[3] else {
        panic!("expected a body after the headers");
    };
    assert_eq!(body.kind(), ContentKind::Raw);
    assert!(matches!(calls[4], Call::Execute));
}

#[test]
fn get_without_content_attaches_no_body() {
    let transport = ScriptedTransport::new(vec![ok(200)]);
    let mut client = client(&transport, ClientOption::default());
    let mut request = Request::new();
    client.get(&Uri::new("http://h.test/"), Some(&mut request)).unwrap();
    assert!(transport.calls().contains(&Call::AttachBody(RequestBody::None)));
}

#[test]
fn response_is_cleared_between_calls() {
    let transport = ScriptedTransport::new(vec![ok(404), failed(TransportCode::RecvError)]);
    let mut client = client(&transport, ClientOption::default());

    let response = client.get(&Uri::new("http://h.test/"), None).unwrap();
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.content().as_ref(), b"body");

    client.get(&Uri::new("http://h.test/"), None).unwrap_err();
    assert_eq!(client.response().status_code(), NODEFINE);
    assert!(client.response().content().is_empty());
    assert_eq!(client.metrics().attempts, 1);
}

#[test]
fn query_parameters_are_joined_in_insertion_order() {
    let transport = ScriptedTransport::new(vec![ok(200)]);
    let mut client = client(&transport, ClientOption::default());
    let mut uri = Uri::new("http://h.test/search");
    uri.add_query_param("a", "1");
    uri.add_query_param("b", &2);
    uri.params_mut().add_float("c", 1.50, 2);
    uri.params_mut().add_bool("d", true);

    client.get(&uri, None).unwrap();
    assert_eq!(
        transport.configured_urls(),
        vec!["http://h.test/search?a=1&b=2&c=1.5&d=true".to_owned()]
    );
}

#[test]
fn retries_accumulate_across_redirect_passes() {
    let transport = ScriptedTransport::new(vec![
        failed(TransportCode::CouldNotConnect),
        failed(TransportCode::CouldNotConnect),
        moved("http://h.test/b"),
        failed(TransportCode::CouldNotConnect),
        ok(200),
    ]);
    let mut client = client(
        &transport,
        ClientOption::default()
            .with_retry_count(5)
            .with_auto_redirect(true),
    );

    let response = client.get(&Uri::new("http://h.test/a"), None).unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(client.metrics().retries, 3);
    assert_eq!(client.metrics().attempts, 5);
    assert_eq!(client.metrics().redirects, 1);
}

#[test]
fn malformed_header_line_sends_nothing() {
    let transport = ScriptedTransport::new(vec![ok(200)]);
    let mut client = client(&transport, ClientOption::default());
    let mut request = Request::new();
    request.add_header_line("bad name: v");

    let err = client
        .get(&Uri::new("http://h.test/"), Some(&mut request))
        .unwrap_err();
    assert_eq!(err, ErrorCode::RequestDataCreationFailed);
    assert_eq!(transport.count(|c| matches!(c, Call::AttachBody(_))), 0);
    assert_eq!(transport.executions(), 0);
    assert_eq!(client.metrics().attempts, 0);
    assert_eq!(client.response().status_code(), NODEFINE);
}

#[test]
fn failed_configure_leaves_no_stale_response() {
    let transport = ScriptedTransport::new(vec![ok(404), moved("http://h.test/bad")])
        .rejecting_url("http://h.test/bad");
    let mut client = client(&transport, ClientOption::default());

    let response = client.get(&Uri::new("http://h.test/"), None).unwrap();
    assert_eq!(response.status_code(), 404);

    let err = client.get(&Uri::new("http://h.test/bad"), None).unwrap_err();
    assert_eq!(err, ErrorCode::UnknownFailure);
    assert_eq!(client.response().status_code(), NODEFINE);
    assert!(client.response().content().is_empty());
    assert_eq!(transport.executions(), 1);

    client.configure(ClientOption::default().with_auto_redirect(true));
    let err = client.get(&Uri::new("http://h.test/a"), None).unwrap_err();
    assert_eq!(err, ErrorCode::UnknownFailure);
    assert_eq!(client.response().status_code(), NODEFINE);
    assert_eq!(client.response().redirect_url(), "");
    assert_eq!(transport.executions(), 2);
}
