//! Health endpoint served over a real socket

use bgremove_bot::health::{self, HEALTH_BODY};
use std::time::Duration;
use tokio::sync::oneshot;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_serves_until_shutdown() {
    let port = free_port();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(health::serve(port, async move {
        let _ = stop_rx.await;
    }));

    let url = format!("http://127.0.0.1:{port}/");
    let client = reqwest::Client::new();
    let mut body = None;
    for _ in 0..50 {
        if let Ok(response) = client.get(&url).send().await {
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            body = Some(response.text().await.unwrap());
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(body.as_deref(), Some(HEALTH_BODY));

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_port_in_use_is_config_error() {
    let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let err = health::serve(port, std::future::pending()).await.unwrap_err();
    assert_eq!(err.kind(), "ConfigError");
}

#[tokio::test]
async fn test_pre_bound_listener_holds_the_port_and_serves() {
    let listener = health::bind(0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    assert_eq!(
        health::bind(port).await.unwrap_err().kind(),
        "ConfigError"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(health::serve_on(listener, async move {
        let _ = stop_rx.await;
    }));

    let body = reqwest::get(format!("http://127.0.0.1:{port}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, HEALTH_BODY);

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
