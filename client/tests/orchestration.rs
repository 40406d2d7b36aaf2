//! Dedupe, pacing, rate limits, metadata TTL and cancellation, driven through the client with
//! a scripted transport and paused time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{json_response, repository_body, search_body, MockApi, ENDPOINT, METADATA_PATH, SEARCH_PATH};
use futures::future::join_all;
use prismic_client::{
    AbortSignal, Client, ClientConfig, HttpRequest, HttpResponse, Method, PrismicError, QueryParams,
    RequestOptions,
};
use serde_json::json;

fn client_with(api: &Arc<MockApi>, config: ClientConfig) -> Client {
    Client::new(ENDPOINT, config.with_http_client(api.clone())).unwrap()
}

fn metadata_api() -> MockApi {
    MockApi::new().route(METADATA_PATH, |_, _| json_response(200, repository_body("R1")))
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_reads_share_one_call() {
    let api = Arc::new(metadata_api().with_latency(Duration::from_millis(50)));
    let client = client_with(&api, ClientConfig::default());
    let options = RequestOptions::default();

    let refs = join_all((0..5).map(|_| client.get_master_ref(&options))).await;

    assert_eq!(api.count(METADATA_PATH), 1);
    for r in refs {
        assert_eq!(r.unwrap().reference, "R1");
    }
    assert_eq!(client.dispatcher().flights().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn reads_with_distinct_signals_are_not_shared() {
    let api = Arc::new(metadata_api().with_latency(Duration::from_millis(50)));
    let client = client_with(&api, ClientConfig::default());
    let dispatcher = client.dispatcher();

    let a = HttpRequest::get(ENDPOINT).with_signal(AbortSignal::new());
    let b = HttpRequest::get(ENDPOINT).with_signal(AbortSignal::new());
    let (ra, rb) = tokio::join!(dispatcher.dispatch(a), dispatcher.dispatch(b));

    assert!(ra.unwrap().is_success());
    assert!(rb.unwrap().is_success());
    assert_eq!(api.count(METADATA_PATH), 2);
}

#[tokio::test(start_paused = true)]
async fn body_requests_to_one_host_are_spaced_by_the_interval() {
    let api = Arc::new(
        MockApi::new()
            .with_latency(Duration::from_millis(10))
            .route("/api/v2/mutate", |_, _| json_response(200, json!({"ok": true}))),
    );
    let client = client_with(
        &api,
        ClientConfig::default().with_request_interval(Duration::from_millis(200)),
    );
    let url = format!("{ENDPOINT}/mutate");

    let results = join_all((0..3).map(|i| {
        client
            .dispatcher()
            .dispatch(HttpRequest::with_body(Method::Post, &url, format!("{{\"n\":{i}}}")))
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    let calls = api.calls();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(200));
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limited_queries_wait_for_retry_after() {
    let api = Arc::new(metadata_api().route(SEARCH_PATH, |_, nth| {
        if nth == 0 {
            let mut res = json_response(429, json!({"message": "slow down"}));
            res.headers.insert("retry-after".into(), "2".into());
            res
        } else {
            json_response(200, search_body(vec![json!({"id": "doc"})]))
        }
    }));
    let client = client_with(&api, ClientConfig::default());

    let query = client.get(QueryParams::new()).await.unwrap();

    assert_eq!(query.results.len(), 1);
    let searches: Vec<_> = api.calls().into_iter().filter(|c| c.path == SEARCH_PATH).collect();
    assert_eq!(searches.len(), 2);
    assert!(searches[1].at - searches[0].at >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn master_ref_is_cached_for_the_ttl() {
    let api = Arc::new(metadata_api());
    let client = client_with(&api, ClientConfig::default());
    let options = RequestOptions::default();

    assert_eq!(client.get_master_ref(&options).await.unwrap().reference, "R1");
    assert_eq!(api.count(METADATA_PATH), 1);

    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(client.get_master_ref(&options).await.unwrap().reference, "R1");
    assert_eq!(api.count(METADATA_PATH), 1);

    tokio::time::advance(Duration::from_millis(4901)).await;
    assert_eq!(client.get_master_ref(&options).await.unwrap().reference, "R1");
    assert_eq!(api.count(METADATA_PATH), 2);
}

#[tokio::test(start_paused = true)]
async fn ttl_boundary_is_exclusive() {
    let api = Arc::new(metadata_api());
    let client = client_with(
        &api,
        ClientConfig::default().with_metadata_ttl(Duration::from_millis(5000)),
    );
    let options = RequestOptions::default();

    client.get_repository(&options).await.unwrap();
    tokio::time::advance(Duration::from_millis(4999)).await;
    client.get_repository(&options).await.unwrap();
    assert_eq!(api.count(METADATA_PATH), 1);

    tokio::time::advance(Duration::from_millis(2)).await;
    client.get_repository(&options).await.unwrap();
    assert_eq!(api.count(METADATA_PATH), 2);
}

#[tokio::test(start_paused = true)]
async fn pre_aborted_signal_makes_no_calls() {
    let api = Arc::new(
        metadata_api().route(SEARCH_PATH, |_, _| json_response(200, search_body(vec![]))),
    );
    let client = client_with(&api, ClientConfig::default());
    let signal = AbortSignal::new();
    signal.abort();

    let err = client
        .get(QueryParams::new().with_options(RequestOptions::default().with_signal(signal.clone())))
        .await
        .unwrap_err();
    assert!(err.is_aborted());

    let err = client
        .dispatcher()
        .dispatch(HttpRequest::with_body(Method::Post, format!("{ENDPOINT}/mutate"), "{}").with_signal(signal))
        .await
        .unwrap_err();
    assert!(matches!(err, PrismicError::Aborted { .. }));
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn abort_during_flight_rejects_the_caller() {
    let api = Arc::new(metadata_api().with_latency(Duration::from_secs(10)));
    let client = Arc::new(client_with(&api, ClientConfig::default()));
    let signal = AbortSignal::new();

    let task = {
        let client = Arc::clone(&client);
        let options = RequestOptions::default().with_signal(signal.clone());
        tokio::spawn(async move { client.get_repository(&options).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    signal.abort();

    let err = task.await.unwrap().unwrap_err();
    assert!(err.is_aborted());
}

#[tokio::test(start_paused = true)]
async fn default_headers_merge_under_call_headers() {
    let api = Arc::new(metadata_api());
    let client = client_with(
        &api,
        ClientConfig::default()
            .with_default_header("x-app", "site")
            .with_default_header("x-trace", "default"),
    );

    client
        .get_repository(&RequestOptions::default().with_header("x-trace", "call"))
        .await
        .unwrap();

    let headers = &api.calls()[0].headers;
    assert!(headers.contains(&("x-app".to_string(), "site".to_string())));
    assert!(headers.contains(&("x-trace".to_string(), "call".to_string())));
    assert!(!headers.contains(&("x-trace".to_string(), "default".to_string())));
}

#[tokio::test]
async fn unreachable_repository_is_reported() {
    let api = Arc::new(MockApi::new().route(METADATA_PATH, |_, _| HttpResponse {
        status: 404,
        headers: Default::default(),
        body: "Not Found".into(),
    }));
    let client = client_with(&api, ClientConfig::default());

    let err = client.get_repository(&RequestOptions::default()).await.unwrap_err();
    assert!(matches!(err, PrismicError::RepositoryNotFound(_)));
    assert_eq!(err.url(), Some(ENDPOINT));
}
