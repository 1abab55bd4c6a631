//! End-to-end coverage of the request pipeline's node-selection and
//! failover behavior, driven entirely through the public `Transport` API
//! against a scripted `MockTransport`.

use bytes::Bytes;
use clustrans::{
    CancellationToken,
    Config,
    ExecuteError,
    NodePool,
    PoolKind,
    RequestData,
    Response,
    ResponseKind,
    Sniffer,
    Transport,
};
use clustrans::mock::{
    FixedSniffSource,
    MockTransport,
    ScriptedCall,
};
use http::{
    Method,
    StatusCode,
};

fn uri(s: &str) -> http::Uri {
    s.parse().unwrap()
}

fn no_sniff_config() -> Config {
    Config::builder()
        .sniff_on_startup(false)
        .sniff_on_connection_fault(false)
        .ping_enabled(false)
        .build()
}

fn static_pool(uris: Vec<http::Uri>) -> NodePool {
    NodePool::new(PoolKind::Static, uris, Default::default())
}

fn sniffer_for(uris: Vec<http::Uri>) -> Sniffer<FixedSniffSource> {
    Sniffer::new(FixedSniffSource(uris), None, false, false)
}

#[tokio::test]
async fn single_node_happy_path() {
    let mock = std::sync::Arc::new(MockTransport::new());
    mock.push(uri("http://a/"), ScriptedCall::Response(StatusCode::OK, Bytes::from_static(b"ok")));

    let pool = static_pool(vec![uri("http://a/")]);
    let sniffer = sniffer_for(vec![uri("http://a/")]);
    let transport = Transport::new(pool, sniffer, mock.clone(), no_sniff_config());

    let request = RequestData::new(Method::GET, "/");
    let response = transport
        .execute::<(), clustrans::serializer::NoopSerializer>(request, ResponseKind::Bytes, None, None)
        .await
        .unwrap();

    match response {
        Response::Bytes(bytes) => assert_eq!(bytes.as_ref(), b"ok"),
        _ => panic!("expected a bytes response"),
    }
    assert_eq!(mock.calls(), vec![uri("http://a/")]);
}

#[tokio::test]
async fn failover_then_success() {
    let mock = std::sync::Arc::new(MockTransport::new());
    mock.push(
        uri("http://a/"),
        ScriptedCall::Fail { recoverable: true, message: "connection refused".to_owned() },
    );
    mock.push(uri("http://b/"), ScriptedCall::Response(StatusCode::OK, Bytes::from_static(b"ok")));

    let pool = static_pool(vec![uri("http://a/"), uri("http://b/")]);
    let sniffer = sniffer_for(vec![uri("http://a/"), uri("http://b/")]);
    let transport = Transport::new(pool, sniffer, mock.clone(), no_sniff_config());

    let request = RequestData::new(Method::GET, "/");
    let response = transport
        .execute::<(), clustrans::serializer::NoopSerializer>(request, ResponseKind::Void, None, None)
        .await
        .unwrap();

    assert!(matches!(response, Response::Void));
    assert_eq!(mock.calls(), vec![uri("http://a/"), uri("http://b/")]);
}

#[tokio::test]
async fn all_nodes_dead_exhausts_retry_budget() {
    let mock = std::sync::Arc::new(MockTransport::new());
    for node in ["http://a/", "http://b/"] {
        mock.push(uri(node), ScriptedCall::Fail { recoverable: true, message: "timeout".to_owned() });
    }

    let pool = static_pool(vec![uri("http://a/"), uri("http://b/")]);
    let sniffer = sniffer_for(vec![uri("http://a/"), uri("http://b/")]);
    let transport = Transport::new(pool, sniffer, mock.clone(), no_sniff_config());

    let request = RequestData::new(Method::GET, "/");
    let err = transport
        .execute::<(), clustrans::serializer::NoopSerializer>(request, ResponseKind::Void, None, None)
        .await
        .unwrap_err();

    match err {
        ExecuteError::Pipeline(e) => assert_eq!(e.kind(), clustrans::PipelineErrorKind::MaxRetriesReached),
        _ => panic!("expected a pipeline error"),
    }
    assert_eq!(mock.calls().len(), 2);
}

#[tokio::test]
async fn bad_authentication_is_not_retried() {
    let mock = std::sync::Arc::new(MockTransport::new());
    mock.push(
        uri("http://a/"),
        ScriptedCall::Fail { recoverable: false, message: "401 unauthorized".to_owned() },
    );

    let pool = static_pool(vec![uri("http://a/"), uri("http://b/")]);
    let sniffer = sniffer_for(vec![uri("http://a/"), uri("http://b/")]);
    let transport = Transport::new(pool, sniffer, mock.clone(), no_sniff_config());

    let request = RequestData::new(Method::GET, "/");
    let err = transport
        .execute::<(), clustrans::serializer::NoopSerializer>(request, ResponseKind::Void, None, None)
        .await
        .unwrap_err();

    match err {
        ExecuteError::Pipeline(e) => assert_eq!(e.kind(), clustrans::PipelineErrorKind::BadAuthentication),
        _ => panic!("expected a pipeline error"),
    }
    // Only the first node was ever attempted; a non-recoverable failure
    // aborts the whole request instead of advancing.
    assert_eq!(mock.calls(), vec![uri("http://a/")]);
}

#[tokio::test]
async fn head_not_found_counts_as_success() {
    let mock = std::sync::Arc::new(MockTransport::new());
    mock.push(uri("http://a/"), ScriptedCall::Response(StatusCode::NOT_FOUND, Bytes::new()));

    let pool = static_pool(vec![uri("http://a/")]);
    let sniffer = sniffer_for(vec![uri("http://a/")]);
    let transport = Transport::new(pool, sniffer, mock.clone(), no_sniff_config());

    let request = RequestData::new(Method::HEAD, "/");
    let response = transport
        .execute::<(), clustrans::serializer::NoopSerializer>(request, ResponseKind::Void, None, None)
        .await
        .unwrap();

    assert!(matches!(response, Response::Void));
}

#[tokio::test]
async fn cancellation_mid_flight_stops_before_any_attempt() {
    let mock = std::sync::Arc::new(MockTransport::new());

    let pool = static_pool(vec![uri("http://a/"), uri("http://b/")]);
    let sniffer = sniffer_for(vec![uri("http://a/"), uri("http://b/")]);
    let config = Config::builder()
        .sniff_on_startup(false)
        .sniff_on_connection_fault(false)
        .ping_enabled(true)
        .build();
    let transport = Transport::new(pool, sniffer, mock.clone(), config);

    let cancellation = CancellationToken::none();
    cancellation.cancel();

    let request = RequestData::new(Method::GET, "/");
    let err = transport
        .execute_cancellable::<(), clustrans::serializer::NoopSerializer>(
            request,
            ResponseKind::Void,
            None,
            None,
            &cancellation,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecuteError::Cancelled(_)));
    assert!(mock.calls().is_empty());
}
