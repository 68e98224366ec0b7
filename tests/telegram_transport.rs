//! Telegram transport against an in-process mock of the Bot API

mod common;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bgremove_bot::{
    config::BotConfig,
    transport::{
        ChatTransport, ImageKind, InboundEvent, IncomingImage, StatusHandle, TelegramTransport,
        UpdateSource,
    },
};
use common::{encode, gradient};
use image::ImageFormat;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

const TOKEN: &str = "TESTTOKEN42";

#[derive(Default)]
struct MockApi {
    requests: Mutex<Vec<(String, String)>>,
    file_bytes: Vec<u8>,
}

impl MockApi {
    fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

fn ok(result: Value) -> Json<Value> {
    Json(json!({ "ok": true, "result": result }))
}

fn message(chat_id: i64, message_id: i64) -> Value {
    json!({ "message_id": message_id, "date": 0, "chat": { "id": chat_id, "type": "private" } })
}

async fn method(
    State(api): State<Arc<MockApi>>,
    Path(method): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let text = String::from_utf8_lossy(&body).into_owned();
    api.requests.lock().unwrap().push((method.clone(), text.clone()));
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let chat_id = payload["chat_id"].as_i64().unwrap_or(1);

    match method.as_str() {
        "getMe" => ok(json!({ "id": 1, "is_bot": true, "first_name": "Bot", "username": "bgbot" })),
        "getUpdates" => ok(json!([
            {
                "update_id": 100,
                "message": {
                    "message_id": 1,
                    "date": 0,
                    "chat": { "id": 5, "type": "private" },
                    "photo": [
                        { "file_id": "thumb", "file_unique_id": "a", "width": 90, "height": 90, "file_size": 900 },
                        { "file_id": "full", "file_unique_id": "b", "width": 1280, "height": 1280, "file_size": 90000 }
                    ]
                }
            },
            {
                "update_id": 101,
                "message": {
                    "message_id": 2,
                    "date": 0,
                    "chat": { "id": 5, "type": "private" },
                    "document": { "file_id": "pdf", "file_unique_id": "c", "file_name": "a.pdf", "mime_type": "application/pdf" }
                }
            },
            {
                "update_id": 102,
                "message": {
                    "message_id": 3,
                    "date": 0,
                    "chat": { "id": 6, "type": "private" },
                    "document": { "file_id": "raw", "file_unique_id": "d", "file_name": "cat.png", "mime_type": "image/png", "file_size": 5000 }
                }
            },
            {
                "update_id": 103,
                "message": {
                    "message_id": 4,
                    "date": 0,
                    "chat": { "id": 7, "type": "private" },
                    "text": "/Start@bgbot please"
                }
            },
            { "update_id": 104, "edited_message": { "message_id": 5 } }
        ])),
        "getFile" => {
            if payload["file_id"] == "missing" {
                Json(json!({ "ok": false, "error_code": 400, "description": "Bad Request: file is too big" }))
            } else {
                ok(json!({ "file_id": payload["file_id"], "file_unique_id": "x", "file_path": "photos/file_1.png" }))
            }
        },
        "sendMessage" | "editMessageText" | "sendDocument" => ok(message(chat_id, 77)),
        "deleteMessage" => ok(json!(true)),
        _ => Json(json!({ "ok": false, "error_code": 404, "description": "Not Found" })),
    }
}

async fn file(State(api): State<Arc<MockApi>>, Path(path): Path<String>) -> impl IntoResponse {
    if path == "photos/file_1.png" {
        (StatusCode::OK, api.file_bytes.clone())
    } else {
        (StatusCode::NOT_FOUND, Vec::new())
    }
}

async fn spawn_api() -> (Arc<MockApi>, String) {
    let api = Arc::new(MockApi {
        file_bytes: encode(&gradient(10, 10), ImageFormat::Png),
        ..MockApi::default()
    });
    let app = Router::new()
        .route(&format!("/bot{TOKEN}/{{method}}"), post(method))
        .route(&format!("/file/bot{TOKEN}/{{*path}}"), get(file))
        .with_state(Arc::clone(&api));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (api, format!("http://{addr}"))
}

fn transport(base: &str) -> TelegramTransport {
    let config = BotConfig::builder()
        .bot_token(TOKEN)
        .telegram_api_url(base)
        .inference_token("hf_unused")
        .poll_timeout_secs(1)
        .build()
        .unwrap();
    TelegramTransport::new(&config).unwrap()
}

fn image(file_id: &str) -> IncomingImage {
    IncomingImage {
        chat_id: 5,
        message_id: 1,
        file_id: file_id.to_string(),
        kind: ImageKind::Photo,
        file_size: None,
    }
}

#[tokio::test]
async fn test_get_me_returns_username() {
    let (_api, base) = spawn_api().await;
    assert_eq!(transport(&base).get_me().await.unwrap(), "bgbot");
}

#[tokio::test]
async fn test_poll_updates_classifies_messages() {
    let (api, base) = spawn_api().await;

    let updates = transport(&base).poll_updates(Some(100)).await.unwrap();
    let events: Vec<_> = updates.iter().map(|u| (u.update_id, u.event.clone())).collect();

    assert_eq!(events.len(), 5);
    match &events[0].1 {
        InboundEvent::Image(image) => {
            assert_eq!(image.file_id, "full");
            assert_eq!(image.kind, ImageKind::Photo);
            assert_eq!(image.chat_id, 5);
        },
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(events[1].1, InboundEvent::Ignored);
    match &events[2].1 {
        InboundEvent::Image(image) => {
            assert_eq!(image.file_id, "raw");
            assert_eq!(image.kind, ImageKind::Document);
            assert_eq!(image.file_size, Some(5000));
        },
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        events[3].1,
        InboundEvent::Command {
            chat_id: 7,
            command: "/start".to_string()
        }
    );
    assert_eq!(events[4].1, InboundEvent::Ignored);

    let (method, body) = api.requests().pop().unwrap();
    assert_eq!(method, "getUpdates");
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["offset"], 100);
    assert_eq!(body["timeout"], 1);
}

#[tokio::test]
async fn test_download_fetches_file_bytes() {
    let (api, base) = spawn_api().await;
    let bytes = transport(&base).download(&image("full")).await.unwrap();
    assert_eq!(bytes, api.file_bytes);
}

#[tokio::test]
async fn test_download_error_is_transport_error_without_token() {
    let (_api, base) = spawn_api().await;
    let err = transport(&base).download(&image("missing")).await.unwrap_err();

    assert_eq!(err.kind(), "TransportError");
    assert!(err.to_string().contains("file is too big"));
    assert!(!err.to_string().contains(TOKEN));
}

#[tokio::test]
async fn test_unreachable_api_error_hides_token() {
    let err = transport("http://127.0.0.1:9").get_me().await.unwrap_err();
    assert_eq!(err.kind(), "TransportError");
    assert!(!err.to_string().contains(TOKEN));
}

#[tokio::test]
async fn test_status_message_lifecycle() {
    let (api, base) = spawn_api().await;
    let transport = transport(&base);

    let handle = transport.post_status(5, "working").await.unwrap();
    assert_eq!(
        handle,
        StatusHandle {
            chat_id: 5,
            message_id: 77
        }
    );
    transport.update_status(&handle, "still working").await.unwrap();
    transport.delete_status(&handle).await.unwrap();

    let methods: Vec<String> = api.requests().into_iter().map(|(m, _)| m).collect();
    assert_eq!(methods, vec!["sendMessage", "editMessageText", "deleteMessage"]);
    let (_, body) = api.requests().pop().unwrap();
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["message_id"], 77);
}

#[tokio::test]
async fn test_deliver_result_sends_png_document() {
    let (api, base) = spawn_api().await;
    let png = encode(&gradient(4, 4), ImageFormat::Png);

    transport(&base)
        .deliver_result(5, Some(1), png, "no_bg.png", "done")
        .await
        .unwrap();

    let (method, body) = api.requests().pop().unwrap();
    assert_eq!(method, "sendDocument");
    assert!(body.contains("filename=\"no_bg.png\""));
    assert!(body.contains("image/png"));
    assert!(body.contains("reply_to_message_id"));
    assert!(body.contains("done"));
}

#[test]
fn test_debug_output_hides_token() {
    let printed = format!("{:?}", transport("http://127.0.0.1:9"));
    assert!(!printed.contains(TOKEN));
}
