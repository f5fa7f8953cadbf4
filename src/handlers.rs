use crate::consts::LISTENER_CHANNEL_DEPTH;
use crate::error::{handle_error, AppError};
use crate::ledger::Leg;
use crate::media::{read_start_meta, MediaConnection, WsConnection};
use crate::orchestrator;
use crate::tasks::{drain_listener_stream, send_plivo_ws_messages};
use crate::types::{AppState, OrderAccepted, OrderRequest, OrderView, Recordings};

use axum::{
    body::Bytes,
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    Json,
};
use futures_util::stream::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Query parameters Plivo puts on webhook and socket urls.  Everything is optional so a sloppy
/// callback is still acknowledged.
#[derive(Deserialize, Debug, Default)]
pub struct WebhookQuery {
    #[serde(default)]
    pub order_id: String,
    #[serde(rename = "CallUUID", default)]
    pub call_uuid: String,
}

fn xml_response(xml: String) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    (headers, xml)
}

fn ack() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn health() -> Json<Value> {
    ack()
}

pub async fn start_order(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<OrderRequest>,
) -> Result<Json<OrderAccepted>, AppError> {
    orchestrator::submit_order(&app_state, request)
        .await
        .map(Json)
}

pub async fn get_order(
    State(app_state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    orchestrator::order_status(&app_state, &order_id).map(Json)
}

pub async fn get_recording(
    State(app_state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<Recordings>, AppError> {
    orchestrator::order_recordings(&app_state, &order_id).map(Json)
}

pub async fn plivo_answer(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
) -> impl IntoResponse {
    let xml = orchestrator::on_target_answered(&app_state, &query.order_id, &query.call_uuid).await;
    xml_response(xml)
}

pub async fn plivo_hangup(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
) -> Json<Value> {
    orchestrator::on_target_hangup(&app_state, &query.order_id).await;
    ack()
}

pub async fn plivo_recording_callback(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Json<Value> {
    trace!(body=?body, "recording callback body");
    let url = extract_recording_url(&body);
    orchestrator::on_recording_ready(&app_state, &query.order_id, Leg::Target, url);
    ack()
}

pub async fn plivo_answer_listener(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
) -> impl IntoResponse {
    let xml =
        orchestrator::on_listener_answered(&app_state, &query.order_id, &query.call_uuid).await;
    xml_response(xml)
}

pub async fn plivo_hangup_listener(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
) -> Json<Value> {
    orchestrator::on_listener_hangup(&app_state, &query.order_id);
    ack()
}

pub async fn plivo_recording_callback_listener(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Json<Value> {
    trace!(body=?body, "listener recording callback body");
    let url = extract_recording_url(&body);
    orchestrator::on_recording_ready(&app_state, &query.order_id, Leg::Listener, url);
    ack()
}

const TOP_LEVEL_URL_FIELDS: &[&str] = &["RecordUrl", "RecordingUrl", "record_url"];
const NESTED_URL_FIELDS: &[&str] = &["record_url", "RecordUrl", "recording_url"];

/// Recording callbacks arrive form- or JSON-encoded, under one of several field names, sometimes
/// inside a stringified `response` object.  First non-empty field in priority order wins.
pub fn extract_recording_url(body: &[u8]) -> Option<String> {
    if let Ok(form) = serde_urlencoded::from_bytes::<HashMap<String, String>>(body) {
        let form = form
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<serde_json::Map<_, _>>();
        if let Some(url) = recording_url_in(&Value::Object(form)) {
            return Some(url);
        }
    }
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| recording_url_in(&value))
}

fn first_field(value: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| value.get(field)?.as_str())
        .find(|url| !url.is_empty())
        .map(str::to_string)
}

fn recording_url_in(value: &Value) -> Option<String> {
    first_field(value, TOP_LEVEL_URL_FIELDS).or_else(|| match value.get("response")? {
        Value::String(nested) => serde_json::from_str::<Value>(nested)
            .ok()
            .and_then(|nested| first_field(&nested, NESTED_URL_FIELDS)),
        nested => first_field(nested, NESTED_URL_FIELDS),
    })
}

pub async fn plivo_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WebhookQuery>,
    State(app_state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!(order=%query.order_id, "websocket connection request");
    ws.on_upgrade(move |socket| call_socket_handler(socket, query.order_id, app_state))
}

/// Target leg: hand the (possibly teed) socket to the voice agent for the life of the call.
async fn call_socket_handler(socket: WebSocket, order_id: String, app_state: Arc<AppState>) {
    let mut connection = WsConnection::new(socket);
    let start_meta = match read_start_meta(&mut connection).await {
        Ok(start_meta) => start_meta,
        Err(e) => {
            handle_error(e).await;
            let _ = connection.close().await;
            return;
        }
    };
    info!(order=%order_id, stream=%start_meta.stream_id, call=%start_meta.call_id, "stream started");

    let session = orchestrator::agent_session(&app_state, &order_id, &start_meta);
    let connection = orchestrator::wire_target_connection(&app_state, &order_id, connection);
    if let Err(e) = app_state.agent.run(connection, session).await {
        handle_error(e).await;
    }
    orchestrator::on_target_media_closed(&app_state, &order_id);
}

pub async fn plivo_ws_listener_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WebhookQuery>,
    State(app_state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!(order=%query.order_id, "listener websocket connection request");
    ws.on_upgrade(move |socket| listener_socket_handler(socket, query.order_id, app_state))
}

/// Listener leg: publish an outbound channel for the tee, then hold the socket open.
async fn listener_socket_handler(socket: WebSocket, order_id: String, app_state: Arc<AppState>) {
    let mut connection = WsConnection::new(socket);
    let start_meta = match read_start_meta(&mut connection).await {
        Ok(start_meta) => start_meta,
        Err(e) => {
            handle_error(e).await;
            let _ = connection.close().await;
            return;
        }
    };
    info!(order=%order_id, stream=%start_meta.stream_id, "listener stream started");

    let (plivo_sink, plivo_stream) = connection.into_inner().split();
    let (outbound_tx, outbound_rx) = mpsc::channel(LISTENER_CHANNEL_DEPTH);
    let forwarder = tokio::spawn(send_plivo_ws_messages(outbound_rx, plivo_sink));
    orchestrator::on_listener_connected(
        &app_state,
        &order_id,
        start_meta.stream_id,
        outbound_tx.downgrade(),
    )
    .await;

    if let Err(e) = drain_listener_stream(plivo_stream).await {
        handle_error(e).await;
    }
    orchestrator::on_listener_disconnected(&app_state, &order_id);
    drop(outbound_tx);
    forwarder.abort();
    debug!(order=%order_id, "listener socket handler done");
}
