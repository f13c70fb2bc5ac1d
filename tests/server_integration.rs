/// Integration tests: WebSocket server end to end
///
/// Scenarios:
/// 1. COMPONENT_ADDED is acknowledged, folded into the context and logged
/// 2. Malformed JSON gets one error response and a 1003 close; the server
///    keeps accepting connections
/// 3. Unknown types and invalid payloads do not close the connection
/// 4. A state change from one client is broadcast to every client
/// 5. Connections over the limit are closed with 1008
/// 6. Structure findings, connects and handler failures reach subscribers
use futures_util::{SinkExt, StreamExt};
use mcpwire_lib::config::{ServerConfig, StructureConfig};
use mcpwire_lib::engine::ServerEvent;
use mcpwire_lib::models::MessageType;
use mcpwire_lib::server::McpServer;
use mcpwire_lib::structure::StructureWarning;
use mcpwire_lib::utils::now_utc;
use serde_json::{json, Value};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server(config: ServerConfig) -> (McpServer, String) {
    let mut server = McpServer::new(ServerConfig { port: 0, ..config });
    let addr = server.start().await.expect("Failed to start server");
    (server, format!("ws://{}", addr))
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("Failed to connect");
    ws
}

async fn wait_for_connections(server: &McpServer, count: usize) {
    tokio::time::timeout(WAIT, async {
        while server.connection_count() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Connection count never reached");
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(WsMessage::Text(value.to_string())).await.unwrap();
}

/// Next data or close frame, skipping ping/pong.
async fn next_frame(ws: &mut Ws) -> WsMessage {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Stream ended")
            .expect("Socket error");
        match frame {
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => return other,
        }
    }
}

async fn next_json(ws: &mut Ws) -> Value {
    match next_frame(ws).await {
        WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

/// Next event the predicate picks out, skipping the rest.
async fn next_event<T>(
    events: &mut broadcast::Receiver<ServerEvent>,
    mut pick: impl FnMut(ServerEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(event) {
                        return found;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("Timed out waiting for an event")
}

fn message(kind: &str, payload: Value) -> Value {
    json!({
        "type": kind,
        "payload": payload,
        "timestamp": now_utc(),
        "source": "integration-test"
    })
}

#[tokio::test]
async fn test_component_added_scenario() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let mut ws = connect(&url).await;

    send_json(
        &mut ws,
        message(
            "COMPONENT_ADDED",
            json!({
                "componentName": "Header",
                "filePath": "src/components/Header.tsx",
                "dependencies": ["react"]
            }),
        ),
    )
    .await;

    let response = next_json(&mut ws).await;
    assert_eq!(response["type"], "COMPONENT_ADDED");
    assert_eq!(response["success"], true);
    assert!(response["data"]["actionId"].is_string());

    // broadcast_on_change is on by default
    let broadcast = next_json(&mut ws).await;
    assert_eq!(broadcast["type"], "STATE_UPDATED");
    assert_eq!(broadcast["source"], "server");
    assert_eq!(
        broadcast["payload"]["components"]["Header"]["filePath"],
        "src/components/Header.tsx"
    );

    let context = server.context().await.unwrap();
    let header = context.components.get("Header").expect("component recorded");
    assert_eq!(header.dependencies, vec!["react".to_string()]);

    let log = server.action_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, MessageType::ComponentAdded);
    assert_eq!(log[0].payload["componentName"], "Header");
    assert_eq!(log[0].id, response["data"]["actionId"].as_str().unwrap());
}

#[tokio::test]
async fn test_malformed_json_closes_only_that_connection() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let mut ws = connect(&url).await;

    ws.send(WsMessage::Text("not json".to_string())).await.unwrap();

    let response = next_json(&mut ws).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "MALFORMED_MESSAGE");

    match next_frame(&mut ws).await {
        WsMessage::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Unsupported),
        other => panic!("expected close frame, got {:?}", other),
    }

    // Nothing was logged and the server still serves new clients.
    assert!(server.action_log().await.is_empty());
    let mut second = connect(&url).await;
    send_json(&mut second, message("GET_STATE", json!({}))).await;
    let response = next_json(&mut second).await;
    assert_eq!(response["type"], "GET_STATE");
    assert_eq!(response["success"], true);
}

#[tokio::test]
async fn test_rejections_keep_connection_open() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let mut ws = connect(&url).await;

    send_json(&mut ws, message("NOT_A_TYPE", json!({"a": 1}))).await;
    let response = next_json(&mut ws).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "UNKNOWN_MESSAGE_TYPE");

    send_json(
        &mut ws,
        message(
            "COMPONENT_ADDED",
            json!({"componentName": "", "filePath": "src/A.tsx", "dependencies": []}),
        ),
    )
    .await;
    let response = next_json(&mut ws).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "INVALID_MESSAGE");
    assert!(response["error"].as_str().unwrap().contains("componentName"));

    send_json(&mut ws, message("STATE_UPDATED", json!({"state": {}}))).await;
    let response = next_json(&mut ws).await;
    assert_eq!(response["code"], "HANDLER_FAILED");

    // Queries are answered but never logged.
    send_json(&mut ws, message("GET_CONTEXT", json!({}))).await;
    let response = next_json(&mut ws).await;
    assert_eq!(response["success"], true);
    assert!(response["data"]["components"].is_object());

    assert!(server.action_log().await.is_empty());
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_state_change_is_broadcast_to_all_clients() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    wait_for_connections(&server, 2).await;

    send_json(
        &mut a,
        message(
            "STATE_CHANGED",
            json!({"componentName": "Counter", "stateKey": "count", "oldValue": 0, "newValue": 1}),
        ),
    )
    .await;

    let response = next_json(&mut a).await;
    assert_eq!(response["success"], true);
    let on_a = next_json(&mut a).await;
    let on_b = next_json(&mut b).await;

    for update in [on_a, on_b] {
        assert_eq!(update["type"], "STATE_UPDATED");
        assert_eq!(update["payload"]["state"]["Counter"]["count"], 1);
    }
}

#[tokio::test]
async fn test_connection_limit() {
    let (server, url) = start_server(ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    })
    .await;
    let mut first = connect(&url).await;
    wait_for_connections(&server, 1).await;

    let mut second = connect(&url).await;
    match next_frame(&mut second).await {
        WsMessage::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Policy);
            assert_eq!(frame.reason, "Maximum connections reached");
        }
        other => panic!("expected close frame, got {:?}", other),
    }

    assert_eq!(server.connection_count(), 1);
    send_json(&mut first, message("GET_STATE", json!({}))).await;
    assert_eq!(next_json(&mut first).await["success"], true);
}

#[tokio::test]
async fn test_stop_closes_connections() {
    let (mut server, url) = start_server(ServerConfig::default()).await;
    let mut ws = connect(&url).await;
    wait_for_connections(&server, 1).await;

    server.stop().await;

    match next_frame(&mut ws).await {
        WsMessage::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
        other => panic!("expected close frame, got {:?}", other),
    }
    assert_eq!(server.connection_count(), 0);
    assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());
}

#[tokio::test]
async fn test_structure_findings_are_published() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir(root.join("src")).unwrap();
    fs::write(
        root.join("src/App.tsx"),
        "import React from 'react';\nimport pad from 'left-pad';\n",
    )
    .unwrap();
    fs::write(root.join("package.json"), r#"{"dependencies": {"react": "18.2.0"}}"#).unwrap();
    fs::write(root.join("README.md"), "# Demo\n").unwrap();

    let mut server = McpServer::new(ServerConfig {
        port: 0,
        project_root: Some(root.to_path_buf()),
        structure: StructureConfig {
            required_dirs: vec!["src".to_string(), "docs".to_string()],
            required_files: vec!["README.md".to_string(), "package.json".to_string()],
            required_sections: vec!["## Project Overview".to_string()],
            check_imports: true,
        },
        ..ServerConfig::default()
    });
    let mut events = server.subscribe();
    server.start().await.expect("Failed to start server");

    let mut warnings = Vec::new();
    while warnings.len() < 3 {
        let warning = next_event(&mut events, |event| match event {
            ServerEvent::ValidationWarning(warning) => Some(warning),
            _ => None,
        })
        .await;
        warnings.push(warning);
    }
    assert_eq!(
        warnings,
        vec![
            StructureWarning::MissingEntry {
                message: "Missing required directory: docs".to_string(),
            },
            StructureWarning::MissingSection {
                file: "README.md".to_string(),
                section: "## Project Overview".to_string(),
            },
            StructureWarning::UnknownImport {
                file: "src/App.tsx".to_string(),
                package: "left-pad".to_string(),
            },
        ]
    );

    server.stop().await;
}

#[tokio::test]
async fn test_connect_and_handler_failure_events() {
    let mut server = McpServer::new(ServerConfig {
        port: 0,
        ..ServerConfig::default()
    });
    let mut events = server.subscribe();
    let addr = server.start().await.expect("Failed to start server");
    let mut ws = connect(&format!("ws://{}", addr)).await;

    let (id, count) = next_event(&mut events, |event| match event {
        ServerEvent::ClientConnected { id, count } => Some((id, count)),
        _ => None,
    })
    .await;
    assert_eq!(count, 1);

    send_json(&mut ws, message("STATE_UPDATED", json!({"state": {}}))).await;
    assert_eq!(next_json(&mut ws).await["code"], "HANDLER_FAILED");

    let (connection_id, failure) = next_event(&mut events, |event| match event {
        ServerEvent::Error {
            connection_id,
            message,
        } => Some((connection_id, message)),
        _ => None,
    })
    .await;
    assert_eq!(connection_id, Some(id));
    assert!(failure.contains("STATE_UPDATED"));

    server.stop().await;
}

#[tokio::test]
async fn test_empty_payload_is_checked_field_by_field() {
    let (mut server, url) = start_server(ServerConfig::default()).await;
    let mut ws = connect(&url).await;

    send_json(&mut ws, message("COMPONENT_ADDED", json!({}))).await;
    let response = next_json(&mut ws).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "INVALID_MESSAGE");
    assert!(response["data"]["errors"]
        .as_array()
        .unwrap()
        .contains(&json!("componentName is required for COMPONENT_ADDED")));
    assert_eq!(
        response["data"]["warnings"],
        json!(["Empty payload for COMPONENT_ADDED"])
    );
    assert!(server.action_log().await.is_empty());

    server.stop().await;
}
