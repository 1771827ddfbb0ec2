use std::sync::{Arc, Mutex};
use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use call_relay_types::events::server::ExceptionEvent;
use crate::client::stats::Stats;
use crate::error::RelayError;
use crate::relay::publisher::CreditPublisher;
use crate::types;

pub mod consts;
pub mod config;
mod utils;
mod stats;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats as ClientStats;

type ServerTx = tokio::sync::broadcast::Sender<types::ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<types::ServerEvent>;

pub struct Connection {
    pub(crate) send_handle: tokio::task::JoinHandle<()>,
    pub(crate) recv_handle: tokio::task::JoinHandle<()>,
}

/// One conversation with the agent.
///
/// Outbound events go through a [`CreditPublisher`]; the send task grants one
/// credit back for every event it has written to the socket.
pub struct Client {
    capacity: usize,
    config: Arc<config::Config>,
    session_id: String,
    publisher: Option<Arc<CreditPublisher<types::ClientEvent>>>,
    s_tx: Option<ServerTx>,
    s_rx: Option<ServerRx>,
    connection: Option<Connection>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    fn new(capacity: usize, config: Arc<config::Config>) -> Self {
        Self {
            capacity,
            config,
            session_id: uuid::Uuid::new_v4().to_string(),
            publisher: None,
            s_tx: None,
            s_rx: None,
            connection: None,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    async fn connect(&mut self) -> anyhow::Result<()> {
        if self.publisher.is_some() {
            anyhow::bail!("already connected");
        }

        let request = utils::build_request(&self.config, &self.session_id)
            .context("failed to build agent request")?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("failed to connect to agent")?;
        tracing::info!("agent session {} connected", self.session_id);

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::unbounded_channel::<types::ClientEvent>();
        let (s_tx, s_rx) = tokio::sync::broadcast::channel(self.capacity);

        let publisher = Arc::new(CreditPublisher::spawn(
            &format!("agent-{}", &self.session_id[..8]),
            move |event: types::ClientEvent| -> Result<(), RelayError> {
                c_tx.send(event).map_err(|_| {
                    RelayError::DispatchInterrupted("agent connection closed".to_string())
                })
            },
        )?);
        publisher.grant(self.config.credit_window())?;

        self.publisher = Some(publisher.clone());
        self.s_tx = Some(s_tx.clone());
        self.s_rx = Some(s_rx);

        let stats = self.stats.clone();
        let send_handle = tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                let last = matches!(event, types::ClientEvent::Disconnection(_));
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                        tracing::trace!("sent {}", event.event_id().unwrap_or("unknown"));
                        if let Ok(mut stats_guard) = stats.lock() {
                            stats_guard.record_sent();
                        }
                        if let Err(e) = publisher.grant(1) {
                            tracing::error!("failed to grant credit: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
                if last {
                    break;
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("failed to close agent socket: {}", e);
            }
        });

        let stats = self.stats.clone();
        let recv_handle = tokio::spawn(async move {
            let mut close_reason = None;
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        if let Ok(mut stats_guard) = stats.lock() {
                            stats_guard.record_exception();
                        }
                        let exception = ExceptionEvent::new("TransportError", &e.to_string());
                        let _ = s_tx.send(types::ServerEvent::Exception(exception));
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<types::ServerEvent>(&text) {
                            Ok(event) => {
                                if let Ok(mut stats_guard) = stats.lock() {
                                    match &event {
                                        types::ServerEvent::AudioResponse(_) => stats_guard.record_audio_chunk(),
                                        types::ServerEvent::Exception(_) => stats_guard.record_exception(),
                                        _ => {}
                                    }
                                }
                                if let Err(e) = s_tx.send(event) {
                                    tracing::error!("failed to send event: {}", e);
                                }
                            }
                            Err(e) => {
                                let json = serde_json::from_str::<serde_json::Value>(&text);
                                json.map(|json| {
                                    tracing::error!("failed to deserialize event: {}, type=> {:?}", e, json.get("type"));
                                }).unwrap_or_else(|_| {
                                    tracing::error!("failed to deserialize event: {}, text=> {:?}", e, text);
                                });
                            }
                        }
                    }
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message of {} bytes", bin.len());
                    }
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        close_reason = frame.map(|f| f.reason.to_string());
                        break;
                    }
                    _ => {}
                }
            }
            let _ = s_tx.send(types::ServerEvent::Close { reason: close_reason });
        });

        self.connection = Some(Connection {
            send_handle,
            recv_handle,
        });
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Hands out the first receiver, which has seen every event, then fresh
    /// subscriptions.
    pub fn server_events(&mut self) -> anyhow::Result<ServerRx> {
        if let Some(rx) = self.s_rx.take() {
            return Ok(rx);
        }
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => anyhow::bail!("not connected yet"),
        }
    }

    pub fn publisher(&self) -> anyhow::Result<Arc<CreditPublisher<types::ClientEvent>>> {
        self.publisher
            .clone()
            .context("not connected yet")
    }

    pub fn stats(&self) -> anyhow::Result<Stats> {
        if let Ok(stats_guard) = self.stats.lock() {
            Ok(stats_guard.clone())
        } else {
            anyhow::bail!("failed to get stats")
        }
    }

    /// Stops the publisher and lets both socket tasks wind down.
    pub fn disconnect(&mut self) {
        if let Some(publisher) = self.publisher.take() {
            publisher.stop();
        }
        if let Some(connection) = self.connection.take() {
            connection.recv_handle.abort();
            drop(connection.send_handle);
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

pub async fn connect_with_config(capacity: usize, config: Arc<config::Config>) -> anyhow::Result<Client> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}
