//! Event handlers that drive an order through the ledger: the submission itself, provider
//! webhooks for both legs, and media socket connects and disconnects.

use crate::consts::{LISTENER_GREETING, STREAM_CONTENT_TYPE};
use crate::error::AppError;
use crate::ledger::{Leg, OrderCommand, OrderRecord, OrderStatus};
use crate::media::MediaConnection;
use crate::plivo_types::{
    wrap_xml, PlivoOutbound, Response, ResponseAction, SpeakAction, StartMeta, StreamAction,
    XmlFlag,
};
use crate::tee::AudioTee;
use crate::telephony::CallRequest;
use crate::types::{
    AgentSession, AppState, OrderAccepted, OrderRequest, OrderView, Recordings, Restaurant,
};
use crate::utils::normalize_phone_number;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

pub async fn submit_order(
    app_state: &Arc<AppState>,
    request: OrderRequest,
) -> Result<OrderAccepted, AppError> {
    if request.restaurant_query.trim().is_empty() || request.order_items.trim().is_empty() {
        return Err(AppError::BadRequest(
            "restaurant_query and order_items are required",
        ));
    }

    let order_id = app_state.ledger.create(OrderRecord::new(
        request.order_type.clone(),
        request.user_phone.clone(),
    ));
    let restaurant = match resolve_restaurant(app_state, &request).await {
        Ok(restaurant) => restaurant,
        Err(e) => {
            app_state.ledger.update(&order_id, OrderRecord::fail);
            return Err(e);
        }
    };
    let system_prompt = build_system_prompt(&request, &restaurant.name);
    app_state.ledger.update(&order_id, |record| {
        record.set_restaurant(restaurant.clone());
        record.system_prompt = system_prompt;
    });
    info!(order=%order_id, restaurant=%restaurant.name, phone=%restaurant.phone_number, "order created");

    let status = if request.user_phone.trim().is_empty() {
        dial_target(app_state, &order_id).await?;
        OrderStatus::Calling
    } else {
        let listener_phone = normalize_phone_number(&request.user_phone);
        dial_listener(app_state, &order_id, &listener_phone).await?;
        OrderStatus::CallingListener
    };

    Ok(OrderAccepted {
        order_id,
        restaurant,
        status,
    })
}

/// A phone override skips the search entirely.
async fn resolve_restaurant(
    app_state: &Arc<AppState>,
    request: &OrderRequest,
) -> Result<Restaurant, AppError> {
    if !request.phone_override.trim().is_empty() {
        return Ok(Restaurant {
            name: request.restaurant_query.clone(),
            address: String::new(),
            phone_number: normalize_phone_number(&request.phone_override),
            place_id: None,
        });
    }
    app_state
        .places
        .search(&request.restaurant_query)
        .await?
        .ok_or(AppError::NoRestaurant)
}

fn build_system_prompt(request: &OrderRequest, restaurant_name: &str) -> String {
    format!(
        "You are calling {restaurant_name} to place a {order_type} order on behalf of \
         {customer_name}.\n\
         Order: {order_items}\n\
         Payment: {payment_method}\n\
         Delivery address: {delivery_address}\n\
         Special instructions: {special_instructions}\n\
         Be brief and polite, confirm the order and the total, then say goodbye.",
        order_type = request.order_type,
        customer_name = request.customer_name,
        order_items = request.order_items,
        payment_method = request.payment_method,
        delivery_address = request.delivery_address,
        special_instructions = request.special_instructions,
    )
}

/// Place the listener leg and start the order's worker, which will place the target leg once
/// the listener's media socket is up.
async fn dial_listener(
    app_state: &Arc<AppState>,
    order_id: &str,
    listener_phone: &str,
) -> Result<(), AppError> {
    let (commands, mailbox) = mpsc::channel(1);
    app_state.ledger.update(order_id, |record| {
        record.begin_listener_call();
        record.commands = Some(commands);
    });
    tokio::spawn(order_worker(
        app_state.clone(),
        order_id.to_string(),
        mailbox,
    ));

    let config = &app_state.config;
    let request = CallRequest {
        to: listener_phone.to_string(),
        answer_url: config.https_url(&format!("/plivo/answer-listener?order_id={order_id}")),
        hangup_url: config.https_url(&format!("/plivo/hangup-listener?order_id={order_id}")),
    };
    match app_state.telephony.create_call(&request).await {
        Ok(request_id) => {
            info!(order=%order_id, request=%request_id, to=%listener_phone, "listener call initiated");
            app_state.ledger.update(order_id, |record| {
                record.listener_request_id = Some(request_id);
            });
            Ok(())
        }
        Err(e) => {
            error!(order=%order_id, error=%e, "listener call failed");
            app_state.ledger.update(order_id, OrderRecord::fail);
            Err(AppError::Dial(e.to_string()))
        }
    }
}

/// Place the target leg, at most once per order.  Failure marks the order as errored.
pub async fn dial_target(app_state: &Arc<AppState>, order_id: &str) -> Result<(), AppError> {
    let Some(phone) = app_state
        .ledger
        .update(order_id, OrderRecord::begin_target_call)
        .flatten()
    else {
        debug!(order=%order_id, "target leg already placed or order not ready");
        return Ok(());
    };

    let config = &app_state.config;
    let request = CallRequest {
        to: phone.clone(),
        answer_url: config.https_url(&format!("/plivo/answer?order_id={order_id}")),
        hangup_url: config.https_url(&format!("/plivo/hangup?order_id={order_id}")),
    };
    match app_state.telephony.create_call(&request).await {
        Ok(request_id) => {
            info!(order=%order_id, request=%request_id, to=%phone, "restaurant call initiated");
            app_state.ledger.update(order_id, |record| {
                record.target_request_id = Some(request_id);
            });
            Ok(())
        }
        Err(e) => {
            error!(order=%order_id, error=%e, "restaurant call failed");
            app_state.ledger.update(order_id, OrderRecord::fail);
            Err(AppError::Dial(e.to_string()))
        }
    }
}

/// Per-order task for work that happens after the submission request is gone.  Ends when the
/// record drops its mailbox.
async fn order_worker(
    app_state: Arc<AppState>,
    order_id: String,
    mut mailbox: mpsc::Receiver<OrderCommand>,
) {
    while let Some(command) = mailbox.recv().await {
        trace!(order=%order_id, command=?command, "order command");
        match command {
            OrderCommand::DialTarget => {
                // nobody to report to; the ledger already says `error`
                if let Err(e) = dial_target(&app_state, &order_id).await {
                    warn!(order=%order_id, error=%e, "deferred restaurant call failed");
                }
            }
        }
    }
    debug!(order=%order_id, "order worker finished");
}

/// Plivo answer directive: optionally say something, then stream the leg to `url`.
fn stream_directive(greeting: Option<&str>, url: String) -> String {
    let mut actions = vec![];
    if let Some(text) = greeting {
        actions.push(ResponseAction::Speak(SpeakAction {
            text: text.to_string(),
            ..Default::default()
        }));
    }
    actions.push(ResponseAction::Stream(StreamAction {
        url,
        bidirectional: XmlFlag::True,
        keep_call_alive: XmlFlag::True,
        content_type: Some(STREAM_CONTENT_TYPE.to_string()),
    }));
    let xml = wrap_xml(xmlserde::xml_serialize(Response { actions }));
    trace!("answer xml: '{}'", xml);
    xml
}

pub async fn on_listener_answered(
    app_state: &Arc<AppState>,
    order_id: &str,
    call_id: &str,
) -> String {
    info!(order=%order_id, call=%call_id, "listener answered");
    let first_answer = app_state
        .ledger
        .update(order_id, |record| record.listener_answered(call_id))
        .unwrap_or(false);
    if first_answer {
        let callback = app_state.config.https_url(&format!(
            "/plivo/recording-callback-listener?order_id={order_id}"
        ));
        match app_state.telephony.start_recording(call_id, &callback).await {
            Ok(()) => info!(call=%call_id, "listener recording started"),
            Err(e) => error!(call=%call_id, error=%e, "failed to start listener recording"),
        }
    }
    stream_directive(
        Some(LISTENER_GREETING),
        app_state
            .config
            .wss_url(&format!("/plivo/ws-listener?order_id={order_id}")),
    )
}

/// The listener's media socket is up.  The first time, this is what releases the target dial.
pub async fn on_listener_connected(
    app_state: &Arc<AppState>,
    order_id: &str,
    stream_id: String,
    sink: mpsc::WeakSender<PlivoOutbound>,
) {
    let commands = app_state
        .ledger
        .update(order_id, |record| {
            if record.attach_listener(stream_id, sink) {
                record.commands.clone()
            } else {
                None
            }
        })
        .flatten();
    match commands {
        Some(commands) => {
            if commands.send(OrderCommand::DialTarget).await.is_err() {
                warn!(order=%order_id, "order worker is gone; restaurant will not be called");
            }
        }
        None => debug!(order=%order_id, "listener (re)connected; nothing to dial"),
    }
}

pub fn on_listener_disconnected(app_state: &Arc<AppState>, order_id: &str) {
    app_state
        .ledger
        .update(order_id, OrderRecord::detach_listener);
    info!(order=%order_id, "listener media socket closed");
}

pub async fn on_target_answered(
    app_state: &Arc<AppState>,
    order_id: &str,
    call_id: &str,
) -> String {
    info!(order=%order_id, call=%call_id, "call answered");
    let started = app_state
        .ledger
        .update(order_id, |record| record.target_answered(call_id))
        .unwrap_or(false);
    if started {
        let callback = app_state
            .config
            .https_url(&format!("/plivo/recording-callback?order_id={order_id}"));
        match app_state.telephony.start_recording(call_id, &callback).await {
            Ok(()) => info!(call=%call_id, "recording started"),
            Err(e) => error!(call=%call_id, error=%e, "failed to start recording"),
        }
    }
    stream_directive(
        None,
        app_state
            .config
            .wss_url(&format!("/plivo/ws?order_id={order_id}")),
    )
}

/// Pick the connection the voice agent gets: teed to the listener when one is live, raw
/// otherwise.
pub fn wire_target_connection<C: MediaConnection + 'static>(
    app_state: &Arc<AppState>,
    order_id: &str,
    connection: C,
) -> Box<dyn MediaConnection> {
    let tap = app_state
        .ledger
        .read(order_id, OrderRecord::listener_tap)
        .flatten()
        .filter(|(sink, _)| sink.upgrade().is_some());
    match tap {
        Some((sink, listener_stream_id)) => {
            info!(order=%order_id, listener_stream=%listener_stream_id, "teeing call audio to listener");
            Box::new(AudioTee::new(connection, sink, listener_stream_id))
        }
        None => Box::new(connection),
    }
}

pub fn agent_session(app_state: &Arc<AppState>, order_id: &str, start: &StartMeta) -> AgentSession {
    let (system_prompt, order_type) = app_state
        .ledger
        .read(order_id, |record| {
            (record.system_prompt.clone(), record.order_type.clone())
        })
        .unwrap_or_else(|| {
            (
                "You are a helpful assistant.".to_string(),
                "pickup".to_string(),
            )
        });
    AgentSession {
        order_id: order_id.to_string(),
        stream_id: start.stream_id.clone(),
        call_id: start.call_id.clone(),
        system_prompt,
        order_type,
    }
}

pub fn on_target_media_closed(app_state: &Arc<AppState>, order_id: &str) {
    app_state
        .ledger
        .update(order_id, OrderRecord::target_media_closed);
    info!(order=%order_id, "call media socket closed");
}

/// Target leg is over; take the listener down with it.
pub async fn on_target_hangup(app_state: &Arc<AppState>, order_id: &str) {
    info!(order=%order_id, "call hung up");
    let listener_call = app_state
        .ledger
        .update(order_id, OrderRecord::target_hung_up)
        .flatten();
    if let Some(call_id) = listener_call {
        match app_state.telephony.hangup(&call_id).await {
            Ok(()) => info!(call=%call_id, "listener call hung up"),
            Err(e) => warn!(call=%call_id, error=%e, "failed to hang up listener call"),
        }
    }
}

pub fn on_listener_hangup(app_state: &Arc<AppState>, order_id: &str) {
    info!(order=%order_id, "listener hung up");
    app_state
        .ledger
        .update(order_id, OrderRecord::listener_hung_up);
}

pub fn on_recording_ready(app_state: &Arc<AppState>, order_id: &str, leg: Leg, url: Option<String>) {
    info!(order=%order_id, leg=?leg, url=?url, "recording callback");
    if let Some(url) = url {
        app_state
            .ledger
            .update(order_id, |record| record.set_recording(leg, &url));
    }
}

pub fn order_status(app_state: &Arc<AppState>, order_id: &str) -> Result<OrderView, AppError> {
    app_state
        .ledger
        .read(order_id, |record| record.view(order_id))
        .ok_or(AppError::NotFound("Order not found"))
}

pub fn order_recordings(
    app_state: &Arc<AppState>,
    order_id: &str,
) -> Result<Recordings, AppError> {
    app_state
        .ledger
        .read(order_id, OrderRecord::recordings)
        .ok_or(AppError::NotFound("Order not found"))?
        .ok_or(AppError::NotFound("Recording not available yet"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{TICK_BYTES, TICK_MILLIS};
    use crate::mulaw;
    use crate::testing::{
        media_frame, test_state, wait_for, MockPlaces, MockTelephony, ScriptedConnection,
    };
    use crate::utils::b64_decode;

    use axum::extract::ws::Message;
    use std::time::Duration;

    fn tonys(user_phone: &str) -> OrderRequest {
        serde_json::from_value(serde_json::json!({
            "restaurant_query": "Tony's Pizza",
            "order_items": "1 large pepperoni",
            "user_phone": user_phone,
        }))
        .unwrap()
    }

    fn status(app_state: &Arc<AppState>, order_id: &str) -> OrderStatus {
        order_status(app_state, order_id).unwrap().status
    }

    #[tokio::test]
    async fn direct_flow_calls_restaurant_immediately() {
        let telephony = MockTelephony::new();
        let app_state = test_state(telephony.clone(), MockPlaces::tonys());

        let accepted = submit_order(&app_state, tonys("")).await.unwrap();
        assert_eq!(accepted.status, OrderStatus::Calling);
        assert_eq!(accepted.restaurant.phone_number, "+14155550100");
        let calls = telephony.created();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to, "+14155550100");
        assert_eq!(
            calls[0].answer_url,
            format!("https://calls.example.test/plivo/answer?order_id={}", accepted.order_id)
        );
        assert_eq!(status(&app_state, &accepted.order_id), OrderStatus::Calling);
    }

    #[tokio::test]
    async fn listen_in_walkthrough() {
        let telephony = MockTelephony::new();
        let app_state = test_state(telephony.clone(), MockPlaces::tonys());

        let accepted = submit_order(&app_state, tonys("+15551234567")).await.unwrap();
        let order_id = accepted.order_id;
        assert_eq!(accepted.status, OrderStatus::CallingListener);
        // only the listener has been dialed
        let calls = telephony.created();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to, "+15551234567");
        assert!(calls[0].answer_url.contains("/plivo/answer-listener?order_id="));

        on_listener_answered(&app_state, &order_id, "listener-call").await;
        assert_eq!(telephony.recordings(), vec!["listener-call".to_string()]);
        assert_eq!(telephony.created().len(), 1);

        let (listener_tx, _listener_rx) = mpsc::channel(8);
        on_listener_connected(
            &app_state,
            &order_id,
            "listener-stream".to_string(),
            listener_tx.downgrade(),
        )
        .await;
        wait_for(|| telephony.created().len() == 2).await;
        assert_eq!(telephony.created()[1].to, "+14155550100");
        assert_eq!(status(&app_state, &order_id), OrderStatus::ListenerConnected);

        // a reconnect does not dial again
        on_listener_connected(
            &app_state,
            &order_id,
            "listener-stream".to_string(),
            listener_tx.downgrade(),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(telephony.created().len(), 2);

        let xml = on_target_answered(&app_state, &order_id, "target-call").await;
        assert_eq!(status(&app_state, &order_id), OrderStatus::InProgress);
        assert!(xml.contains(&format!(
            "wss://calls.example.test/plivo/ws?order_id={order_id}</Stream>"
        )));
        assert!(xml.contains("bidirectional=\"true\""));
        assert!(xml.contains("keepCallAlive=\"true\""));
        assert!(xml.contains("audio/x-mulaw;rate=8000"));

        on_target_hangup(&app_state, &order_id).await;
        assert_eq!(status(&app_state, &order_id), OrderStatus::Completed);
        assert_eq!(telephony.hangups(), vec!["listener-call".to_string()]);
    }

    #[tokio::test]
    async fn phone_override_skips_search() {
        let telephony = MockTelephony::new();
        let places = MockPlaces::tonys();
        let app_state = test_state(telephony.clone(), places.clone());
        let request: OrderRequest = serde_json::from_value(serde_json::json!({
            "restaurant_query": "Tony's Pizza",
            "order_items": "1 large pepperoni",
            "phone_override": "+14155550000",
        }))
        .unwrap();

        let accepted = submit_order(&app_state, request).await.unwrap();
        assert_eq!(places.searches(), 0);
        assert_eq!(accepted.restaurant.phone_number, "+14155550000");
        assert_eq!(accepted.restaurant.name, "Tony's Pizza");
        assert_eq!(telephony.created()[0].to, "+14155550000");
    }

    #[tokio::test]
    async fn missing_fields_create_nothing() {
        let telephony = MockTelephony::new();
        let places = MockPlaces::tonys();
        let app_state = test_state(telephony.clone(), places.clone());
        let request: OrderRequest =
            serde_json::from_value(serde_json::json!({ "restaurant_query": "Tony's" })).unwrap();
        assert!(matches!(
            submit_order(&app_state, request).await,
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(places.searches(), 0);
        assert!(telephony.created().is_empty());
    }

    #[tokio::test]
    async fn phone_override_still_needs_query() {
        let telephony = MockTelephony::new();
        let app_state = test_state(telephony.clone(), MockPlaces::tonys());
        let request: OrderRequest = serde_json::from_value(serde_json::json!({
            "order_items": "1 large pepperoni",
            "phone_override": "+14155550000",
        }))
        .unwrap();
        assert!(matches!(
            submit_order(&app_state, request).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(telephony.created().is_empty());
    }

    #[tokio::test]
    async fn no_search_result_errors_order() {
        let telephony = MockTelephony::new();
        let app_state = test_state(telephony.clone(), MockPlaces::empty());
        assert!(matches!(
            submit_order(&app_state, tonys("")).await,
            Err(AppError::NoRestaurant)
        ));
        assert!(telephony.created().is_empty());
    }

    #[tokio::test]
    async fn synchronous_dial_failure_is_reported() {
        let telephony = MockTelephony::failing_for("+14155550100");
        let app_state = test_state(telephony.clone(), MockPlaces::tonys());
        assert!(matches!(
            submit_order(&app_state, tonys("")).await,
            Err(AppError::Dial(_))
        ));
    }

    #[tokio::test]
    async fn deferred_dial_failure_lands_in_ledger() {
        let telephony = MockTelephony::failing_for("+14155550100");
        let app_state = test_state(telephony.clone(), MockPlaces::tonys());
        let order_id = submit_order(&app_state, tonys("+15551234567"))
            .await
            .unwrap()
            .order_id;
        let (listener_tx, _listener_rx) = mpsc::channel(8);
        on_listener_connected(&app_state, &order_id, "ls".to_string(), listener_tx.downgrade())
            .await;
        let app = app_state.clone();
        let id = order_id.clone();
        wait_for(move || status(&app, &id) == OrderStatus::Error).await;
    }

    #[tokio::test]
    async fn duplicate_webhooks_are_idempotent() {
        let telephony = MockTelephony::new();
        let app_state = test_state(telephony.clone(), MockPlaces::tonys());
        let order_id = submit_order(&app_state, tonys("")).await.unwrap().order_id;

        on_target_answered(&app_state, &order_id, "target-call").await;
        on_target_answered(&app_state, &order_id, "target-call").await;
        assert_eq!(telephony.recordings().len(), 1);

        on_recording_ready(&app_state, &order_id, Leg::Target, Some("https://r/1.mp3".to_string()));
        on_recording_ready(&app_state, &order_id, Leg::Target, Some("https://r/1.mp3".to_string()));
        on_recording_ready(&app_state, &order_id, Leg::Target, None);
        let view = order_status(&app_state, &order_id).unwrap();
        assert_eq!(view.recording_url.as_deref(), Some("https://r/1.mp3"));
        assert_eq!(view.listener_recording_url, None);

        on_target_hangup(&app_state, &order_id).await;
        on_target_hangup(&app_state, &order_id).await;
        assert_eq!(status(&app_state, &order_id), OrderStatus::Completed);
        assert!(telephony.hangups().is_empty());

        // webhooks for unknown orders are shrugged off
        on_target_hangup(&app_state, "missing").await;
        on_listener_hangup(&app_state, "missing");
        on_recording_ready(&app_state, "missing", Leg::Listener, Some("u".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_listener_connects_dial_restaurant_once() {
        let telephony = MockTelephony::new();
        let app_state = test_state(telephony.clone(), MockPlaces::tonys());
        let order_id = submit_order(&app_state, tonys("+15551234567"))
            .await
            .unwrap()
            .order_id;

        let mut senders = vec![];
        let mut connects = vec![];
        for n in 0..32 {
            let (listener_tx, _listener_rx) = mpsc::channel::<PlivoOutbound>(8);
            let sink = listener_tx.downgrade();
            senders.push(listener_tx);
            let app_state = app_state.clone();
            let order_id = order_id.clone();
            connects.push(tokio::spawn(async move {
                on_listener_connected(&app_state, &order_id, format!("ls-{n}"), sink).await;
            }));
        }
        for connect in connects {
            connect.await.unwrap();
        }

        let mock = telephony.clone();
        wait_for(move || mock.created().len() == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = telephony.created();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].to, "+14155550100");
        assert_eq!(status(&app_state, &order_id), OrderStatus::ListenerConnected);
    }

    #[tokio::test]
    async fn late_answer_after_hangup_changes_nothing() {
        let telephony = MockTelephony::new();
        let app_state = test_state(telephony.clone(), MockPlaces::tonys());
        let order_id = submit_order(&app_state, tonys("")).await.unwrap().order_id;

        on_target_hangup(&app_state, &order_id).await;
        assert_eq!(status(&app_state, &order_id), OrderStatus::Completed);

        let xml = on_target_answered(&app_state, &order_id, "target-call").await;
        assert!(xml.contains("<Stream"));
        assert_eq!(status(&app_state, &order_id), OrderStatus::Completed);
        assert!(telephony.recordings().is_empty());

        on_target_media_closed(&app_state, &order_id);
        assert_eq!(status(&app_state, &order_id), OrderStatus::Completed);
    }

    #[tokio::test]
    async fn recordings_need_a_url() {
        let app_state = test_state(MockTelephony::new(), MockPlaces::tonys());
        let order_id = submit_order(&app_state, tonys("")).await.unwrap().order_id;
        assert!(matches!(
            order_recordings(&app_state, &order_id),
            Err(AppError::NotFound("Recording not available yet"))
        ));
        on_recording_ready(
            &app_state,
            &order_id,
            Leg::Listener,
            Some("https://r/l.mp3".to_string()),
        );
        let recordings = order_recordings(&app_state, &order_id).unwrap();
        assert_eq!(recordings.listener_recording_url.as_deref(), Some("https://r/l.mp3"));
        assert!(matches!(
            order_recordings(&app_state, "missing"),
            Err(AppError::NotFound("Order not found"))
        ));
    }

    #[tokio::test]
    async fn listener_hangup_clears_tap() {
        let telephony = MockTelephony::new();
        let app_state = test_state(telephony.clone(), MockPlaces::tonys());
        let order_id = submit_order(&app_state, tonys("+15551234567"))
            .await
            .unwrap()
            .order_id;
        on_listener_answered(&app_state, &order_id, "listener-call").await;
        let (listener_tx, _listener_rx) = mpsc::channel(8);
        on_listener_connected(&app_state, &order_id, "ls".to_string(), listener_tx.downgrade())
            .await;
        on_listener_hangup(&app_state, &order_id);
        assert_eq!(status(&app_state, &order_id), OrderStatus::ListenerConnected);
        assert!(app_state
            .ledger
            .read(&order_id, OrderRecord::listener_tap)
            .flatten()
            .is_none());

        on_target_answered(&app_state, &order_id, "target-call").await;
        on_target_hangup(&app_state, &order_id).await;
        assert!(telephony.hangups().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn target_socket_is_teed_when_listener_attached() {
        let app_state = test_state(MockTelephony::new(), MockPlaces::tonys());
        let order_id = submit_order(&app_state, tonys("+15551234567"))
            .await
            .unwrap()
            .order_id;
        let (listener_tx, mut listener_rx) = mpsc::channel(8);
        on_listener_connected(
            &app_state,
            &order_id,
            "listener-stream".to_string(),
            listener_tx.downgrade(),
        )
        .await;

        let audio = vec![mulaw::encode(4_000); TICK_BYTES];
        let conn = ScriptedConnection::new(vec![Message::Text(media_frame(&audio))]);
        let mut wired = wire_target_connection(&app_state, &order_id, conn);
        assert!(wired.recv().await.is_some());
        tokio::time::sleep(Duration::from_millis(TICK_MILLIS * 2)).await;

        match listener_rx.try_recv().unwrap() {
            PlivoOutbound::PlayAudio { media, stream_id } => {
                assert_eq!(stream_id.as_deref(), Some("listener-stream"));
                assert_eq!(b64_decode(&media.payload).unwrap(), audio);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn target_socket_is_raw_without_listener() {
        let app_state = test_state(MockTelephony::new(), MockPlaces::tonys());
        let order_id = submit_order(&app_state, tonys("")).await.unwrap().order_id;
        let conn = ScriptedConnection::new(vec![Message::Text(media_frame(&[0x01; 10]))]);
        let mut wired = wire_target_connection(&app_state, &order_id, conn);
        assert!(wired.recv().await.is_some());
        assert!(wired.recv().await.is_none());
    }
}
