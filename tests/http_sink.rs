//! HTTP ingestion sink against a local one-shot server

use std::time::Duration;

use catalog_harvester::delivery::{HttpIngestionSink, SinkConfig};
use catalog_harvester::domain::{IngestionSink, SinkError};
use catalog_harvester::test_utils::record;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct CapturedRequest {
    head: String,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Serve exactly one request with `status_line`, handing the request back
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = tx.send(CapturedRequest {
            head,
            body: buf[head_end..].to_vec(),
        });
    });

    (format!("http://{addr}/api/products/import"), rx)
}

fn sink(url: String) -> HttpIngestionSink {
    HttpIngestionSink::new(&SinkConfig {
        url,
        api_key: "test-key".to_string(),
        timeout: Duration::from_secs(5),
        user_agent: "catalog-harvester-tests".to_string(),
    })
    .unwrap()
}

#[tokio::test]
async fn posts_records_with_api_key() {
    let (url, request) = serve_once("201 Created", "").await;

    sink(url).deliver(&[record("SKU1", 199.99), record("SKU2", 5.0)]).await.unwrap();

    let request = request.await.unwrap();
    assert!(request.head.starts_with("POST /api/products/import"));
    assert_eq!(request.header("x-api-key"), Some("test-key"));
    assert_eq!(request.header("content-type"), Some("application/json"));

    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body.as_array().map(Vec::len), Some(2));
    assert_eq!(body[0]["productEan"], "SKU1");
    assert_eq!(body[0]["productPrice"], 199.99);
}

#[tokio::test]
async fn plain_ok_is_accepted() {
    let (url, _request) = serve_once("200 OK", "{}").await;
    assert!(sink(url).deliver(&[record("SKU1", 1.0)]).await.is_ok());
}

#[tokio::test]
async fn server_error_is_a_rejection_with_body() {
    let (url, _request) = serve_once("500 Internal Server Error", "database down").await;

    let error = sink(url).deliver(&[record("SKU1", 1.0)]).await.unwrap_err();

    assert_eq!(
        error,
        SinkError::Rejected {
            status: 500,
            body: "database down".to_string()
        }
    );
    assert_eq!(error.status_label(), "500");
}

#[tokio::test]
async fn other_success_codes_are_not_acceptance() {
    let (url, _request) = serve_once("202 Accepted", "queued").await;

    let error = sink(url).deliver(&[record("SKU1", 1.0)]).await.unwrap_err();
    assert!(matches!(error, SinkError::Rejected { status: 202, .. }));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let error = sink(format!("http://{addr}/import"))
        .deliver(&[record("SKU1", 1.0)])
        .await
        .unwrap_err();

    assert!(matches!(error, SinkError::Transport(_)));
    assert_eq!(error.status_label(), "EXCEPTION");
}
