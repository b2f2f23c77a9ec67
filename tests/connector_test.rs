// Integration tests for the connector against a mock daemon REST API

use reqwest::Url;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syncbar::config::Config;
use syncbar::connector::{ConnectionHealthCallback, HealthResult, VersionCheckResult};
use syncbar::SyncConnector;
use tokio::sync::mpsc;

/// Basic auth header for admin:secret
const ADMIN_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

fn connector_for(server: &mockito::ServerGuard) -> SyncConnector {
    let config = Config {
        url: server.url(),
        request_timeout_secs: 2,
        ..Config::default()
    };
    SyncConnector::new(&config)
        .unwrap()
        .with_health_interval(Duration::from_millis(100))
}

fn health_recorder() -> (ConnectionHealthCallback, Arc<Mutex<Vec<HealthResult>>>) {
    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let callback: ConnectionHealthCallback = Arc::new(move |result| {
        sink.lock().unwrap().push(result);
    });
    (callback, results)
}

async fn wait_for_results(
    results: &Arc<Mutex<Vec<HealthResult>>>,
    count: usize,
) -> Vec<HealthResult> {
    for _ in 0..100 {
        {
            let seen = results.lock().unwrap();
            if seen.len() >= count {
                return seen.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("health callback was not invoked {} times", count);
}

#[tokio::test]
async fn test_set_url_reports_version() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/system/version")
        .match_header("authorization", ADMIN_AUTH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"version":"v1.9.0","longVersion":"syncthing v1.9.0"}"#)
        .create_async()
        .await;

    let mut connector = connector_for(&server);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let url = Url::parse(&server.url()).unwrap();
    connector
        .set_url(url, "admin", "secret", move |message, success| {
            tx.send((message, success)).unwrap();
        })
        .unwrap();

    let reported = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(reported, Some(("v1.9.0".to_string(), true)));
    mock.assert_async().await;

    let current = connector.current_url();
    assert_eq!(current.username(), "admin");
    assert_eq!(current.password(), Some("secret"));
}

#[tokio::test]
async fn test_rejected_credentials_report_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/system/version")
        .with_status(401)
        .create_async()
        .await;

    let connector = connector_for(&server);
    let result = connector.check_connection().await;

    assert!(!result.success);
    assert!(result.version_string.contains("401"));
}

#[tokio::test]
async fn test_unreachable_daemon_reports_failure() {
    let config = Config {
        url: "http://127.0.0.1:1".to_string(),
        request_timeout_secs: 2,
        ..Config::default()
    };
    let connector = SyncConnector::new(&config).unwrap();

    let VersionCheckResult {
        version_string,
        success,
    } = connector.check_connection().await;
    assert!(!success);
    assert!(!version_string.is_empty());
}

#[tokio::test]
async fn test_health_counts_connections() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/system/connections")
        .with_status(200)
        .with_body(r#"{"total":{},"connections":{"peerA":{},"peerB":{}}}"#)
        .expect_at_least(1)
        .create_async()
        .await;

    let mut connector = connector_for(&server);
    let (callback, results) = health_recorder();
    connector.set_connection_health_callback(callback);

    let results = wait_for_results(&results, 1).await;
    let map = results[0].to_map();
    assert_eq!(map.get("state").map(String::as_str), Some("1"));
    assert_eq!(map.get("connections").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn test_health_with_no_peers() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/system/connections")
        .with_body(r#"{"connections":{}}"#)
        .expect_at_least(1)
        .create_async()
        .await;

    let mut connector = connector_for(&server);
    let (callback, results) = health_recorder();
    connector.set_connection_health_callback(callback);

    let results = wait_for_results(&results, 1).await;
    assert_eq!(results[0], HealthResult::reachable(0));
}

#[tokio::test]
async fn test_health_empty_body_is_unreachable() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/system/connections")
        .with_status(200)
        .with_body("")
        .expect_at_least(1)
        .create_async()
        .await;

    let mut connector = connector_for(&server);
    let (callback, results) = health_recorder();
    connector.set_connection_health_callback(callback);

    let results = wait_for_results(&results, 1).await;
    let map = results[0].to_map();
    assert_eq!(map.get("state").map(String::as_str), Some("0"));
    assert!(!map.contains_key("connections"));
}

#[tokio::test]
async fn test_health_server_error_keeps_polling() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/system/connections")
        .with_status(500)
        .expect_at_least(2)
        .create_async()
        .await;

    let mut connector = connector_for(&server);
    let (callback, results) = health_recorder();
    connector.set_connection_health_callback(callback);

    let results = wait_for_results(&results, 2).await;
    assert!(results.iter().all(|r| *r == HealthResult::unreachable()));
    assert!(connector.is_polling());
}

#[tokio::test]
async fn test_zero_health_interval_keeps_polling() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/system/connections")
        .with_body(r#"{"connections":{"a":{}}}"#)
        .expect_at_least(2)
        .create_async()
        .await;

    let config = Config {
        url: server.url(),
        request_timeout_secs: 2,
        ..Config::default()
    };
    let mut connector = SyncConnector::new(&config)
        .unwrap()
        .with_health_interval(Duration::ZERO);
    let (callback, results) = health_recorder();
    connector.set_connection_health_callback(callback);

    let results = wait_for_results(&results, 2).await;
    assert!(results.iter().all(|r| *r == HealthResult::reachable(1)));
    assert!(connector.is_polling());
}

#[tokio::test]
async fn test_health_follows_reconfigured_endpoint() {
    let mut old_server = mockito::Server::new_async().await;
    let _old_connections = old_server
        .mock("GET", "/rest/system/connections")
        .with_body(r#"{"connections":{"a":{}}}"#)
        .create_async()
        .await;
    let mut new_server = mockito::Server::new_async().await;
    let _new_version = new_server
        .mock("GET", "/rest/system/version")
        .with_body(r#"{"version":"v2.0.0"}"#)
        .create_async()
        .await;
    let _new_connections = new_server
        .mock("GET", "/rest/system/connections")
        .match_header("authorization", ADMIN_AUTH)
        .with_body(r#"{"connections":{"a":{},"b":{},"c":{}}}"#)
        .expect_at_least(1)
        .create_async()
        .await;

    let mut connector = connector_for(&old_server);
    let (callback, results) = health_recorder();
    connector.set_connection_health_callback(callback);
    wait_for_results(&results, 1).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let new_url = Url::parse(&new_server.url()).unwrap();
    connector
        .set_url(new_url, "admin", "secret", move |message, success| {
            tx.send((message, success)).unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv().await, Some(("v2.0.0".to_string(), true)));

    for _ in 0..100 {
        if results.lock().unwrap().last() == Some(&HealthResult::reachable(3)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("poller never reached the reconfigured daemon");
}
