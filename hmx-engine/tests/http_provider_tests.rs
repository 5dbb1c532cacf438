//! Integration tests for HttpAnalysisProvider against a local canned server

use hmx_common::config::ProviderSettings;
use hmx_engine::{
    AnalysisError, AnalysisProvider, AnalysisRequest, AnalyzeOptions, CoordinatorConfig,
    HttpAnalysisProvider, ProviderError, RequestCoordinator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const VALID_BODY: &str = r#"{
    "sourceIdentifier": "https://tracks.example/one.mp3",
    "bpm": 123.6,
    "key": "Am",
    "camelot": "8A",
    "keyType": "minor",
    "energy": 0.72,
    "loudness": -7.5,
    "duration": 215,
    "compatibleKeys": ["8A", "9A", "7A", "8B"]
}"#;

/// Serve one canned response per connection, in order; resolves to the raw
/// requests received
async fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut stream).await);

            let response = format!(
                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        }
        requests
    });

    (base_url, handle)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&buffer);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

fn provider(base_url: &str) -> HttpAnalysisProvider {
    let settings = ProviderSettings {
        base_url: base_url.to_string(),
        requests_per_second: 100,
        ..ProviderSettings::default()
    };
    HttpAnalysisProvider::new(&settings).unwrap()
}

fn request() -> AnalysisRequest {
    AnalysisRequest {
        source_identifier: "https://tracks.example/one.mp3".to_string(),
    }
}

#[tokio::test]
async fn test_decodes_successful_response() {
    let (base_url, server) = serve(vec![(200, VALID_BODY.to_string())]).await;

    let result = provider(&base_url).analyze(&request()).await.unwrap();

    assert_eq!(result.bpm, 124);
    assert_eq!(result.camelot.to_string(), "8A");
    assert_eq!(result.key(), "Am");
    assert_eq!(result.energy, 0.72);
    assert_eq!(result.duration_secs, 215);

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /analyze HTTP/1.1"));
    assert!(requests[0].contains(r#"{"sourceIdentifier":"https://tracks.example/one.mp3"}"#));
}

#[tokio::test]
async fn test_server_errors_are_retryable() {
    let (base_url, _server) = serve(vec![
        (503, "overloaded".to_string()),
        (429, String::new()),
    ])
    .await;
    let provider = provider(&base_url);

    let unavailable = provider.analyze(&request()).await.unwrap_err();
    assert!(matches!(unavailable, ProviderError::Unavailable { status: 503, .. }));
    assert!(unavailable.is_retryable());

    let limited = provider.analyze(&request()).await.unwrap_err();
    assert!(matches!(limited, ProviderError::RateLimited));
    assert!(limited.is_retryable());
}

#[tokio::test]
async fn test_client_errors_are_not_retryable() {
    let (base_url, _server) = serve(vec![(404, "unknown track".to_string())]).await;

    let err = provider(&base_url).analyze(&request()).await.unwrap_err();

    assert!(matches!(err, ProviderError::Rejected { status: 404, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_malformed_bodies_are_rejected() {
    let inconsistent = VALID_BODY.replace(r#""keyType": "minor""#, r#""keyType": "major""#);
    let (base_url, _server) = serve(vec![
        (200, "{ not json".to_string()),
        (200, inconsistent),
        (200, r#"{"bpm": 500, "camelot": "8A"}"#.to_string()),
    ])
    .await;
    let provider = provider(&base_url);

    for _ in 0..3 {
        let err = provider.analyze(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)), "got {err:?}");
        assert!(!err.is_retryable());
    }
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = provider(&base_url).analyze(&request()).await.unwrap_err();

    assert!(matches!(err, ProviderError::Network(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_coordinator_retries_http_failures() {
    let (base_url, server) = serve(vec![
        (502, "bad gateway".to_string()),
        (200, VALID_BODY.to_string()),
    ])
    .await;
    let config = CoordinatorConfig {
        base_delay: Duration::from_millis(10),
        ..CoordinatorConfig::default()
    };
    let coordinator = RequestCoordinator::new(Arc::new(provider(&base_url)), config);

    let analysis = coordinator
        .analyze("https://tracks.example/one.mp3", AnalyzeOptions::default())
        .await
        .unwrap();

    assert_eq!(analysis.result.bpm, 124);
    assert_eq!(server.await.unwrap().len(), 2);
    assert_eq!(coordinator.metrics().await.retries, 1);
}

#[tokio::test]
async fn test_offline_provider_fails_without_retry() {
    let http = Arc::new(provider("http://127.0.0.1:9"));
    http.set_offline(true);
    let coordinator = RequestCoordinator::new(http, CoordinatorConfig::default());

    let err = coordinator
        .analyze("https://tracks.example/one.mp3", AnalyzeOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::NonRetryable(_)));
    assert_eq!(coordinator.metrics().await.total_attempts, 1);
}
