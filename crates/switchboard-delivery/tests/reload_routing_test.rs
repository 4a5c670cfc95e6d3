//! Fan-out behavior across a live route swap.
//!
//! The forwarder looks the route table up once per dispatch, so replacing
//! the table redirects the next message without touching anything already
//! in flight.

use std::sync::Arc;

use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

use switchboard_core::{OutcomeStore, Route, RouteTable};
use switchboard_delivery::{ForwardClient, Forwarder};

fn route(domain: &str, endpoint: String) -> Vec<Route> {
    vec![Route {
        domain: domain.to_string(),
        endpoints: vec![endpoint],
    }]
}

#[tokio::test]
async fn dispatches_after_swap_target_only_the_new_endpoint() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server_a)
        .await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server_b)
        .await;

    let routes = Arc::new(RouteTable::new(&route(
        "t.example",
        format!("{}/hook", server_a.uri()),
    )));
    let outcomes = Arc::new(OutcomeStore::default());
    let forwarder = Forwarder::new(
        Arc::clone(&routes),
        Arc::clone(&outcomes),
        ForwardClient::with_defaults().expect("client should build"),
        3,
    );

    let payload = br#"{"call_id":"c1","domain":"t.example"}"#;
    forwarder
        .forward(payload, "t.example", 1)
        .await
        .expect("dispatch to A should succeed");

    // Hot reload: replace [A] with [B].
    routes.replace(&route("t.example", format!("{}/hook", server_b.uri())));

    for attempt in 1..=2 {
        forwarder
            .forward(payload, "t.example", attempt)
            .await
            .expect("dispatch to B should succeed");
    }

    server_a.verify().await;
    server_b.verify().await;

    assert_eq!(outcomes.delivered_for("t.example").len(), 3);
}

#[tokio::test]
async fn swapping_to_empty_routes_turns_tenant_into_silent_sink() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let routes = Arc::new(RouteTable::new(&route(
        "t.example",
        format!("{}/hook", server.uri()),
    )));
    let outcomes = Arc::new(OutcomeStore::default());
    let forwarder = Forwarder::new(
        Arc::clone(&routes),
        Arc::clone(&outcomes),
        ForwardClient::with_defaults().expect("client should build"),
        3,
    );

    let payload = br#"{"call_id":"c1","domain":"t.example"}"#;
    forwarder
        .forward(payload, "t.example", 1)
        .await
        .expect("routed dispatch should succeed");

    routes.replace(&[]);

    forwarder
        .forward(payload, "t.example", 1)
        .await
        .expect_err("unrouted dispatch must fail without HTTP");

    server.verify().await;
    assert_eq!(outcomes.failed_for("t.example").len(), 1);
}
