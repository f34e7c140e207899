//! Integration tests for MetEireannProvider using wiremock.

use std::{sync::Arc, time::Duration};

use metie_core::{
    FetchError, ForecastProvider, MetEireannProvider, RecordingMetrics,
    provider::met_eireann::MAX_BODY_BYTES,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIXTURE: &str = include_str!("fixtures/forecast.xml");
const ENDPOINT: &str = "/metno-wdb2ts/locationforecast";

fn provider(server: &MockServer, metrics: Arc<RecordingMetrics>) -> MetEireannProvider {
    let template = format!(
        "{}{ENDPOINT}?lat=${{lat}};long=${{long}};from=${{now}};to=${{later}}",
        server.uri()
    );
    MetEireannProvider::with_url_template(template, metrics).unwrap()
}

async fn mount(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_success() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_string(FIXTURE)).await;

    let metrics = Arc::new(RecordingMetrics::default());
    let fc = provider(&server, metrics.clone())
        .fetch(53.3375, -6.2597, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fc.temperature, 7.7);
    assert_eq!(fc.humidity, 63.8);
    assert_eq!(fc.rain_probability, 0.0);
    assert_eq!(metrics.fetch_successes(), 1);
    assert_eq!(metrics.responses(), vec![200]);
}

#[tokio::test]
async fn test_request_carries_coordinates_and_window() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_string(FIXTURE)).await;

    provider(&server, Arc::default())
        .fetch(53.3375, -6.2597, &CancellationToken::new())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let query = requests[0].url.query().unwrap_or_default().to_string();
    assert!(query.contains("lat=53.3375;"), "query was {query}");
    assert!(query.contains("long=-6.2597;"), "query was {query}");
    assert!(query.contains("from="));
    assert!(query.contains("to="));
}

#[tokio::test]
async fn test_non_200_is_http_error_with_code() {
    let server = MockServer::start().await;
    // A valid body must still be rejected when the status is wrong.
    mount(&server, ResponseTemplate::new(503).set_body_string(FIXTURE)).await;

    let metrics = Arc::new(RecordingMetrics::default());
    let err = provider(&server, metrics.clone())
        .fetch(53.3375, -6.2597, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::HttpStatus { code: 503 }));
    assert_eq!(metrics.fetch_failures("http"), 1);
    assert_eq!(metrics.fetch_successes(), 0);
    assert_eq!(metrics.responses(), vec![503]);
}

#[tokio::test]
async fn test_other_success_codes_are_rejected() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(204)).await;

    let err = provider(&server, Arc::default())
        .fetch(53.3375, -6.2597, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::HttpStatus { code: 204 }));
}

#[tokio::test]
async fn test_bad_body_is_parsing_error() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_string("<html>maintenance</html>")).await;

    let metrics = Arc::new(RecordingMetrics::default());
    let err = provider(&server, metrics.clone())
        .fetch(53.3375, -6.2597, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Parsing(_)));
    assert_eq!(metrics.fetch_failures("parsing"), 1);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_before_decoding() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_string(FIXTURE)).await;

    let metrics = Arc::new(RecordingMetrics::default());
    let err = provider(&server, metrics.clone())
        .with_body_limit(64)
        .fetch(53.3375, -6.2597, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::BodyTooLarge { limit: 64 }), "got {err:?}");
    assert_eq!(metrics.fetch_failures("http"), 1);
    assert_eq!(metrics.responses(), vec![200]);
}

#[test]
fn test_default_body_limit_fits_a_normal_forecast() {
    assert!(FIXTURE.len() < MAX_BODY_BYTES);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    // Nothing listens on port 1.
    let template = format!("http://127.0.0.1:1{ENDPOINT}?lat=${{lat}};long=${{long}};from=${{now}};to=${{later}}");
    let metrics = Arc::new(RecordingMetrics::default());
    let provider = MetEireannProvider::with_url_template(template, metrics.clone()).unwrap();

    let err = provider
        .fetch(53.3375, -6.2597, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Network(_)));
    assert_eq!(metrics.fetch_failures("network"), 1);
    assert!(metrics.responses().is_empty());
}

#[tokio::test]
async fn test_cancellation_unwinds_pending_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let metrics = Arc::new(RecordingMetrics::default());
    let provider = provider(&server, metrics.clone());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), provider.fetch(53.3375, -6.2597, &cancel))
        .await
        .expect("fetch must return promptly after cancellation")
        .unwrap_err();

    assert!(matches!(err, FetchError::Cancelled));
    assert_eq!(metrics.fetch_failures("network"), 1);
}
