//! Websocket endpoint for the telephony media stream, one call per socket.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::trace::TraceLayer;
use tracing::info;

use call_relay_types::audio::TelephonyEncoding;
use call_relay_types::telephony::StartMessage;
use call_relay_types::{InboundMessage, OutboundMessage};

use crate::call::control::CallControl;
use crate::call::{self, CallSession, SessionSettings};
use crate::client::{self, Client, ServerRx};

pub const AUDIO_STREAM_PATH: &str = "/audiostream";

/// Everything a socket needs to set up its call.
pub struct AppState {
    pub agent: Arc<client::Config>,
    pub encoding: TelephonyEncoding,
    pub settings: SessionSettings,
    pub control: Arc<dyn CallControl>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route(AUDIO_STREAM_PATH, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "call relay is running"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Media stream upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialises outbound frames onto the socket until every sender is gone.
async fn write_outbound(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: UnboundedReceiver<OutboundMessage>,
) {
    while let Some(message) = outbound.recv().await {
        match serde_json::to_string(&message) {
            Ok(text) => {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::warn!("failed to write telephony frame: {}", e);
                    break;
                }
            }
            Err(e) => tracing::error!("failed to serialize telephony frame: {}", e),
        }
    }
    let _ = sink.close().await;
}

/// Routes agent events into the session until the agent stream or the call ends.
async fn pump_agent_events(session: Arc<CallSession>, mut events: ServerRx) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let closing = matches!(event, call_relay_types::ServerEvent::Close { .. });
                if let Err(e) = session.on_agent_event(event) {
                    tracing::warn!("call {}: {}", session.call(), e);
                }
                if closing || session.state().is_torn_down() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("call {}: skipped {} agent events", session.call(), skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

struct ActiveCall {
    session: Arc<CallSession>,
    // keeps the agent connection open for the lifetime of the call
    client: Client,
    supervisor: tokio::task::JoinHandle<anyhow::Result<()>>,
}

async fn start_call(
    start: &StartMessage,
    state: &AppState,
    outbound: &tokio::sync::mpsc::UnboundedSender<OutboundMessage>,
) -> anyhow::Result<ActiveCall> {
    let call_id = start.call_identifier();
    let encoding = start
        .media_format()
        .map(|format| format.encoding().clone())
        .unwrap_or_else(|| state.encoding.clone());
    let law = call::companding_law(&encoding)
        .or_else(|| call::companding_law(&state.encoding))
        .ok_or_else(|| anyhow::anyhow!("unsupported encoding {}", encoding.as_str()))?;

    let mut client = client::connect_with_config(1024, state.agent.clone()).await?;
    let agent_events = client.server_events()?;
    info!("call {} bridged to agent session {}", call_id, client.session_id());

    let (session, signals) = CallSession::start(
        call_id,
        law,
        state.settings,
        client.publisher()?,
        outbound.clone(),
    )?;

    tokio::spawn(pump_agent_events(session.clone(), agent_events));
    let supervisor = tokio::spawn(call::supervise(session.clone(), signals, state.control.clone()));

    Ok(ActiveCall {
        session,
        client,
        supervisor,
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("Media stream connected");
    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = tokio::sync::mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outbound(sink, outbound_rx));

    let mut active: Option<ActiveCall> = None;

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                info!("Media stream error: {}", e);
                break;
            }
        };
        let message = match serde_json::from_str::<InboundMessage>(text.as_str()) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("unrecognised telephony frame: {}", e);
                continue;
            }
        };

        match message {
            InboundMessage::Connected(connected) => {
                info!(
                    "Media stream protocol {} version {}",
                    connected.protocol().unwrap_or("unknown"),
                    connected.version().unwrap_or("unknown")
                );
            }
            InboundMessage::Start(start) => {
                if active.is_some() {
                    tracing::warn!("ignoring second start on one stream");
                    continue;
                }
                match start_call(&start, &state, &outbound_tx).await {
                    Ok(call) => active = Some(call),
                    Err(e) => {
                        tracing::error!("failed to start call {}: {:#}", start.call_identifier(), e);
                        if let Err(e) = state.control.hang_up(&start.call_identifier()).await {
                            tracing::error!("failed to hang up: {:#}", e);
                        }
                        break;
                    }
                }
            }
            InboundMessage::Media(media) => {
                if let Some(call) = &active {
                    if let Err(e) = call.session.on_media(&media) {
                        tracing::warn!("call {}: {}", call.session.call(), e);
                    }
                }
            }
            InboundMessage::Mark(mark) => {
                if let Some(call) = &active {
                    if let Err(e) = call.session.on_mark(mark.name()) {
                        tracing::warn!("call {}: {}", call.session.call(), e);
                    }
                }
            }
            InboundMessage::Stop(stop) => {
                info!("call {} stopped by telephony", stop.call_identifier());
                break;
            }
        }
    }

    drop(outbound_tx);
    if let Some(call) = active {
        call.session.on_stop();
        match call.supervisor.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("call {}: teardown failed: {:#}", call.session.call(), e),
            Err(e) => tracing::error!("call {}: supervisor panicked: {}", call.session.call(), e),
        }
        match call.client.stats() {
            Ok(stats) => info!(
                "call {}: {} agent events sent, {} audio chunks received, {} exceptions",
                call.session.call(),
                stats.events_sent(),
                stats.audio_chunks_received(),
                stats.exceptions()
            ),
            Err(e) => tracing::warn!("call {}: {}", call.session.call(), e),
        }
    }
    // the playback controller holds a sender until the session is gone
    writer.abort();
    info!("Media stream closed");
}
