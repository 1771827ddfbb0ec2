//! One phone call: wiring between the telephony stream, the relay engine and
//! the agent connection.

pub mod control;
pub mod events;

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use call_relay_types::audio::TelephonyEncoding;
use call_relay_types::events::server::AudioResponseEvent;
use call_relay_types::telephony::MediaMessage;
use call_relay_types::{CallIdentifier, ClientEvent, OutboundMessage, ServerEvent};
use call_relay_utils::audio;
use call_relay_utils::g711::CompandingLaw;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::error::RelayError;
use crate::relay::{
    AudioRelayBuffer, CreditPublisher, MarkOutcome, PlaybackController, SessionStateMachine,
};
use control::CallControl;
use events::EventFactory;

pub const DEFAULT_FRAME_SAMPLE_LIMIT: usize = 5000;
/// 20ms of 8kHz PCM16.
pub const DEFAULT_INPUT_CHUNK_BYTES: usize = 320;
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Maps a stream encoding onto its G.711 law.
pub fn companding_law(encoding: &TelephonyEncoding) -> Option<CompandingLaw> {
    match encoding {
        TelephonyEncoding::MuLaw => Some(CompandingLaw::MuLaw),
        TelephonyEncoding::ALaw => Some(CompandingLaw::ALaw),
        TelephonyEncoding::Custom(_) => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub frame_sample_limit: usize,
    pub input_chunk_bytes: usize,
    pub drain_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            frame_sample_limit: DEFAULT_FRAME_SAMPLE_LIMIT,
            input_chunk_bytes: DEFAULT_INPUT_CHUNK_BYTES,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Requests handled by [`supervise`], off the media paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSignal {
    /// Disconnect the agent and hang the call up.
    HangUp,
    /// The telephony stream has ended; disconnect the agent only.
    Stop,
}

/// Where agent speech for the current prompt goes.
enum Outbound {
    Idle,
    Streaming(Arc<AudioRelayBuffer>),
    /// The caller barged in; the rest of the prompt is dropped until its
    /// closing audio event.
    Discarding,
}

pub struct CallSession {
    call: CallIdentifier,
    law: CompandingLaw,
    settings: SessionSettings,
    state: Arc<SessionStateMachine>,
    publisher: Arc<CreditPublisher<ClientEvent>>,
    events: Arc<EventFactory>,
    playback: Arc<PlaybackController>,
    inbound: Arc<AudioRelayBuffer>,
    inbound_pump: Mutex<Option<JoinHandle<()>>>,
    outbound: Mutex<Outbound>,
    disconnect_sent: AtomicBool,
    signals: UnboundedSender<CallSignal>,
}

impl CallSession {
    /// Sets up the relay for a freshly started call and configures the agent.
    pub fn start(
        call: CallIdentifier,
        law: CompandingLaw,
        settings: SessionSettings,
        publisher: Arc<CreditPublisher<ClientEvent>>,
        telephony: UnboundedSender<OutboundMessage>,
    ) -> Result<(Arc<Self>, UnboundedReceiver<CallSignal>), RelayError> {
        let events = Arc::new(EventFactory::new());
        let state = Arc::new(SessionStateMachine::new(
            call.clone(),
            publisher.clone(),
            events.clone(),
        ));
        let playback = Arc::new(PlaybackController::new(
            call.stream_id(),
            law,
            settings.frame_sample_limit,
            telephony,
            state.clone(),
        ));
        let (signals, signal_rx) = tokio::sync::mpsc::unbounded_channel();

        let session = Arc::new(Self {
            call,
            law,
            settings,
            state,
            publisher,
            events,
            playback,
            inbound: Arc::new(AudioRelayBuffer::new()),
            inbound_pump: Mutex::new(None),
            outbound: Mutex::new(Outbound::Idle),
            disconnect_sent: AtomicBool::new(false),
            signals,
        });

        session.publisher.enqueue(session.events.configuration())?;
        let pump = session.spawn_inbound_pump()?;
        *session.inbound_pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);

        tracing::info!("call {} started ({:?})", session.call, law);
        Ok((session, signal_rx))
    }

    pub fn call(&self) -> &CallIdentifier {
        &self.call
    }

    pub fn state(&self) -> &SessionStateMachine {
        &self.state
    }

    fn outbound(&self) -> MutexGuard<'_, Outbound> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal(&self, signal: CallSignal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!("call {}: supervisor gone, dropping {:?}", self.call, signal);
        }
    }

    /// Turns inbound PCM into fixed-size audio input events.
    fn spawn_inbound_pump(self: &Arc<Self>) -> Result<JoinHandle<()>, RelayError> {
        let inbound = self.inbound.clone();
        let publisher = self.publisher.clone();
        let events = self.events.clone();
        let signals = self.signals.clone();
        let chunk_bytes = self.settings.input_chunk_bytes.max(2);
        let call = self.call.clone();

        std::thread::Builder::new()
            .name(format!("inbound-{}", call.stream_id()))
            .spawn(move || {
                let mut reader = &*inbound;
                let mut chunk = vec![0u8; chunk_bytes];
                let mut filled = 0;
                loop {
                    let n = match reader.read(&mut chunk[filled..]) {
                        Ok(n) => n,
                        Err(e) => {
                            tracing::error!("call {}: inbound read failed: {}", call, e);
                            0
                        }
                    };
                    filled += n;
                    if filled < chunk_bytes && n > 0 {
                        continue;
                    }
                    if filled > 0 {
                        if let Err(e) = publisher.enqueue(events.audio_input(&chunk[..filled])) {
                            tracing::warn!("call {}: inbound audio dropped: {}", call, e);
                            let _ = signals.send(CallSignal::HangUp);
                            break;
                        }
                        filled = 0;
                    }
                    if n == 0 {
                        break;
                    }
                }
                tracing::debug!("call {}: inbound pump finished", call);
            })
            .map_err(RelayError::ThreadSpawn)
    }

    /// Expands caller audio into the inbound buffer.
    pub fn on_media(&self, media: &MediaMessage) -> Result<(), RelayError> {
        let pcm = audio::decode_companded(self.law, media.payload());
        if pcm.is_empty() {
            return Ok(());
        }
        match self.inbound.write(&pcm) {
            Err(RelayError::ClosedBuffer) if self.state.is_torn_down() => Ok(()),
            other => other,
        }
    }

    pub fn on_mark(&self, name: &str) -> Result<(), RelayError> {
        tracing::debug!("call {}: mark {} played", self.call, name);
        if self.state.on_mark_acknowledged(name)? == MarkOutcome::HangUp {
            self.signal(CallSignal::HangUp);
        }
        Ok(())
    }

    pub fn on_stop(&self) {
        tracing::info!("call {}: telephony stream stopped", self.call);
        self.signal(CallSignal::Stop);
    }

    pub fn on_agent_event(&self, event: ServerEvent) -> Result<(), RelayError> {
        match event {
            ServerEvent::PlaybackInterruption(interruption) => {
                tracing::info!(
                    "call {}: caller interrupted playback ({})",
                    self.call,
                    interruption.event_reason().unwrap_or("unknown")
                );
                self.playback.interrupt()?;
                let mut outbound = self.outbound();
                match std::mem::replace(&mut *outbound, Outbound::Idle) {
                    Outbound::Streaming(buffer) => {
                        buffer.close();
                        *outbound = Outbound::Discarding;
                    }
                    other => *outbound = other,
                }
            }
            ServerEvent::Transcript(transcript) => {
                tracing::info!("call {}: caller said {:?}", self.call, transcript.transcript());
            }
            ServerEvent::IntentResult(result) => {
                tracing::debug!(
                    "call {}: intent {:?}",
                    self.call,
                    result.session_state().intent().map(|i| i.name())
                );
                if result.closes_dialog() {
                    self.state.on_dialog_closed();
                }
            }
            ServerEvent::TextResponse(text) => {
                for message in text.messages() {
                    tracing::debug!("call {}: agent says {:?}", self.call, message.content());
                }
                if self.state.should_hang_up(text.has_messages()) {
                    tracing::info!("call {}: nothing left to say, hanging up", self.call);
                    self.signal(CallSignal::HangUp);
                }
            }
            ServerEvent::AudioResponse(response) => self.on_audio_response(&response)?,
            ServerEvent::Heartbeat(_) => {
                tracing::trace!("call {}: agent heartbeat", self.call);
            }
            ServerEvent::Exception(exception) => {
                tracing::error!(
                    "call {}: agent exception {}: {}",
                    self.call,
                    exception.error_code(),
                    exception.message()
                );
                self.signal(CallSignal::HangUp);
                return Err(RelayError::AgentStreamFault(exception.message().to_string()));
            }
            ServerEvent::Close { reason } => {
                if self.disconnect_sent.load(Ordering::SeqCst) || self.state.is_torn_down() {
                    tracing::info!("call {}: agent stream ended", self.call);
                    return Ok(());
                }
                let reason = reason.unwrap_or_else(|| "agent stream closed".to_string());
                tracing::error!("call {}: {}", self.call, reason);
                self.signal(CallSignal::HangUp);
                return Err(RelayError::AgentStreamFault(reason));
            }
        }
        Ok(())
    }

    fn on_audio_response(&self, response: &AudioResponseEvent) -> Result<(), RelayError> {
        let mut outbound = self.outbound();
        let buffer = match &*outbound {
            Outbound::Streaming(buffer) => buffer.clone(),
            Outbound::Discarding => {
                if response.audio_chunk().is_some() {
                    tracing::trace!("call {}: dropping audio of an interrupted prompt", self.call);
                    return Ok(());
                }
                *outbound = Outbound::Idle;
                drop(outbound);
                self.end_of_prompt();
                return Ok(());
            }
            Outbound::Idle => {
                let buffer = Arc::new(AudioRelayBuffer::new());
                self.playback.play_in_background(buffer.clone())?;
                *outbound = Outbound::Streaming(buffer.clone());
                buffer
            }
        };

        match response.audio_chunk() {
            Some(chunk) => buffer.write(&audio::decode(chunk)),
            None => {
                *outbound = Outbound::Idle;
                drop(outbound);
                buffer.close();
                self.end_of_prompt();
                Ok(())
            }
        }
    }

    fn end_of_prompt(&self) {
        if self.state.is_dialog_closed() {
            self.disconnect_agent();
        }
    }

    /// Queues the disconnection event, once.
    fn disconnect_agent(&self) {
        if self.disconnect_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("call {}: disconnecting agent", self.call);
        if let Err(e) = self.publisher.enqueue(self.events.disconnection()) {
            tracing::warn!("call {}: could not queue disconnection: {}", self.call, e);
        }
    }

    /// Releases everything the call holds. Runs once; later calls are no-ops.
    pub async fn teardown(&self, hang_up: bool, control: &dyn CallControl) -> anyhow::Result<()> {
        if !self.state.begin_teardown() {
            return Ok(());
        }
        tracing::info!("call {}: tearing down (hang up: {})", self.call, hang_up);

        self.inbound.close();
        if let Outbound::Streaming(buffer) = std::mem::replace(&mut *self.outbound(), Outbound::Idle) {
            buffer.close();
        }
        let pump = self
            .inbound_pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            if !matches!(tokio::task::spawn_blocking(move || pump.join()).await, Ok(Ok(()))) {
                tracing::warn!("call {}: inbound pump did not finish cleanly", self.call);
            }
        }

        self.disconnect_agent();
        let publisher = self.publisher.clone();
        let timeout = self.settings.drain_timeout;
        let drained = tokio::task::spawn_blocking(move || {
            let drained = publisher.drain(timeout);
            publisher.stop();
            drained
        })
        .await
        .context("publisher shutdown panicked")?;
        if !drained {
            tracing::warn!("call {}: agent events still queued at shutdown", self.call);
        }

        if hang_up {
            control
                .hang_up(&self.call)
                .await
                .with_context(|| format!("failed to hang up call {}", self.call))?;
        }
        Ok(())
    }
}

/// Waits for the first teardown request and carries it out.
pub async fn supervise(
    session: Arc<CallSession>,
    mut signals: UnboundedReceiver<CallSignal>,
    control: Arc<dyn CallControl>,
) -> anyhow::Result<()> {
    let Some(signal) = signals.recv().await else {
        return Ok(());
    };
    tracing::debug!("call {}: supervisor got {:?}", session.call(), signal);
    session
        .teardown(signal == CallSignal::HangUp, control.as_ref())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use control::MockCallControl;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct Harness {
        session: Arc<CallSession>,
        signals: UnboundedReceiver<CallSignal>,
        telephony: UnboundedReceiver<OutboundMessage>,
        delivered: Arc<Mutex<Vec<ClientEvent>>>,
    }

    fn harness(input_chunk_bytes: usize) -> Harness {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let delivered = delivered.clone();
            move |event: ClientEvent| -> Result<(), RelayError> {
                delivered.lock().unwrap().push(event);
                Ok(())
            }
        };
        let publisher = Arc::new(CreditPublisher::spawn("call-test", sink).unwrap());
        publisher.grant(64).unwrap();

        let (tx, telephony) = mpsc::unbounded_channel();
        let settings = SessionSettings {
            input_chunk_bytes,
            ..SessionSettings::default()
        };
        let (session, signals) = CallSession::start(
            CallIdentifier::new("AC1", "CA1", "MZ1"),
            CompandingLaw::MuLaw,
            settings,
            publisher,
            tx,
        )
        .unwrap();
        Harness {
            session,
            signals,
            telephony,
            delivered,
        }
    }

    fn server_event(json: &str) -> ServerEvent {
        serde_json::from_str(json).unwrap()
    }

    fn audio_chunk(pcm: &[u8]) -> ServerEvent {
        ServerEvent::AudioResponse(AudioResponseEvent::new(Some(audio::encode(pcm))))
    }

    fn end_of_audio() -> ServerEvent {
        ServerEvent::AudioResponse(AudioResponseEvent::new(None))
    }

    async fn next_message(rx: &mut UnboundedReceiver<OutboundMessage>) -> OutboundMessage {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for telephony")
            .expect("telephony channel closed")
    }

    async fn wait_for_events(delivered: &Mutex<Vec<ClientEvent>>, count: usize) {
        for _ in 0..200 {
            if delivered.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_inbound_media_becomes_audio_input() {
        let mut h = harness(4);
        let media: call_relay_types::InboundMessage = serde_json::from_str(
            r#"{"event":"media","streamSid":"MZ1","media":{"track":"inbound","chunk":"1","timestamp":"0","payload":"AAA="}}"#,
        )
        .unwrap();
        let call_relay_types::InboundMessage::Media(media) = media else {
            panic!("expected media");
        };
        h.session.on_media(&media).unwrap();

        wait_for_events(&h.delivered, 2).await;
        let delivered = h.delivered.lock().unwrap();
        assert!(matches!(delivered[0], ClientEvent::Configuration(_)));
        let ClientEvent::AudioInput(input) = &delivered[1] else {
            panic!("expected audio input");
        };
        let expected: Vec<u8> = [-32124i16, -32124]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(input.audio_chunk(), &audio::encode(&expected));
        assert_eq!(delivered.len(), 2);
        drop(delivered);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.telephony.try_recv().is_err());
        assert!(h.signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_two_chunks_then_end_play_with_one_mark() {
        let mut h = harness(320);
        h.session.on_agent_event(audio_chunk(&[0u8; 200])).unwrap();
        assert!(matches!(next_message(&mut h.telephony).await, OutboundMessage::Media(_)));

        h.session.on_agent_event(audio_chunk(&[0u8; 100])).unwrap();
        assert!(matches!(next_message(&mut h.telephony).await, OutboundMessage::Media(_)));

        h.session.on_agent_event(end_of_audio()).unwrap();
        let OutboundMessage::Mark(mark) = next_message(&mut h.telephony).await else {
            panic!("expected a mark");
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.telephony.try_recv().is_err());

        h.session.on_mark(mark.name()).unwrap();
        wait_for_events(&h.delivered, 2).await;
        assert!(matches!(
            h.delivered.lock().unwrap().last(),
            Some(ClientEvent::PlaybackCompletion(_))
        ));
        assert!(h.signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_interruption_clears_without_mark() {
        let mut h = harness(320);
        h.session.on_agent_event(audio_chunk(&[0u8; 200])).unwrap();
        assert!(matches!(next_message(&mut h.telephony).await, OutboundMessage::Media(_)));

        h.session
            .on_agent_event(server_event(
                r#"{"type":"PlaybackInterruptionEvent","eventReason":"VOICE_START_DETECTED","causedByEventId":"AudioInputEvent-7"}"#,
            ))
            .unwrap();
        assert!(matches!(next_message(&mut h.telephony).await, OutboundMessage::Clear(_)));

        // the agent is still streaming the prompt the caller talked over
        h.session.on_agent_event(audio_chunk(&[0u8; 200])).unwrap();
        h.session.on_agent_event(end_of_audio()).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.telephony.try_recv().is_err());
        assert!(h.session.state().outstanding_label().is_none());
        assert!(!h
            .delivered
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, ClientEvent::PlaybackCompletion(_))));
    }

    #[tokio::test]
    async fn test_next_prompt_after_interruption_plays() {
        let mut h = harness(320);
        h.session.on_agent_event(audio_chunk(&[0u8; 200])).unwrap();
        assert!(matches!(next_message(&mut h.telephony).await, OutboundMessage::Media(_)));
        h.session
            .on_agent_event(server_event(r#"{"type":"PlaybackInterruptionEvent"}"#))
            .unwrap();
        assert!(matches!(next_message(&mut h.telephony).await, OutboundMessage::Clear(_)));
        h.session.on_agent_event(end_of_audio()).unwrap();

        h.session.on_agent_event(audio_chunk(&[0u8; 100])).unwrap();
        h.session.on_agent_event(end_of_audio()).unwrap();
        assert!(matches!(next_message(&mut h.telephony).await, OutboundMessage::Media(_)));
        let OutboundMessage::Mark(mark) = next_message(&mut h.telephony).await else {
            panic!("expected a mark");
        };
        assert_eq!(
            h.session.state().outstanding_label().unwrap().as_str(),
            mark.name()
        );
    }

    #[tokio::test]
    async fn test_interruption_between_prompts_keeps_next_prompt() {
        let mut h = harness(320);
        h.session
            .on_agent_event(server_event(r#"{"type":"PlaybackInterruptionEvent"}"#))
            .unwrap();
        assert!(matches!(next_message(&mut h.telephony).await, OutboundMessage::Clear(_)));

        h.session.on_agent_event(audio_chunk(&[0u8; 100])).unwrap();
        assert!(matches!(next_message(&mut h.telephony).await, OutboundMessage::Media(_)));
    }

    #[tokio::test]
    async fn test_closed_dialog_and_empty_text_hangs_up() {
        let h = harness(320);
        h.session
            .on_agent_event(server_event(
                r#"{"type":"IntentResultEvent","sessionState":{"dialogAction":{"type":"Close"}}}"#,
            ))
            .unwrap();
        h.session
            .on_agent_event(server_event(r#"{"type":"TextResponseEvent","messages":[]}"#))
            .unwrap();

        let mut control = MockCallControl::new();
        control
            .expect_hang_up()
            .withf(|call: &CallIdentifier| call.call_id() == "CA1")
            .times(1)
            .returning(|_| Ok(()));

        supervise(h.session.clone(), h.signals, Arc::new(control))
            .await
            .unwrap();

        assert!(h.session.state().is_torn_down());
        let delivered = h.delivered.lock().unwrap();
        assert!(matches!(delivered.last(), Some(ClientEvent::Disconnection(_))));
    }

    #[tokio::test]
    async fn test_final_mark_after_close_hangs_up() {
        let mut h = harness(320);
        h.session
            .on_agent_event(server_event(
                r#"{"type":"IntentResultEvent","sessionState":{"dialogAction":{"type":"Close"}}}"#,
            ))
            .unwrap();
        h.session
            .on_agent_event(server_event(
                r#"{"type":"TextResponseEvent","messages":[{"content":"Goodbye","contentType":"PlainText"}]}"#,
            ))
            .unwrap();
        assert!(h.signals.try_recv().is_err());

        h.session.on_agent_event(end_of_audio()).unwrap();
        let OutboundMessage::Mark(mark) = next_message(&mut h.telephony).await else {
            panic!("expected a mark");
        };
        wait_for_events(&h.delivered, 2).await;
        assert!(matches!(
            h.delivered.lock().unwrap().last(),
            Some(ClientEvent::Disconnection(_))
        ));

        h.session
            .on_agent_event(ServerEvent::Close { reason: None })
            .unwrap();
        h.session.on_mark(mark.name()).unwrap();
        assert_eq!(h.signals.try_recv().unwrap(), CallSignal::HangUp);
    }

    #[tokio::test]
    async fn test_agent_exception_hangs_up_once() {
        let mut h = harness(320);
        let result = h.session.on_agent_event(server_event(
            r#"{"type":"Exception","errorCode":"InternalServerException","message":"boom"}"#,
        ));
        assert!(matches!(result, Err(RelayError::AgentStreamFault(_))));
        assert_eq!(h.signals.recv().await, Some(CallSignal::HangUp));

        let mut control = MockCallControl::new();
        control.expect_hang_up().times(1).returning(|_| Ok(()));
        h.session.teardown(true, &control).await.unwrap();
        h.session.teardown(true, &control).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_tears_down_without_hanging_up() {
        let h = harness(320);
        h.session.on_stop();

        let mut control = MockCallControl::new();
        control.expect_hang_up().times(0);
        supervise(h.session.clone(), h.signals, Arc::new(control))
            .await
            .unwrap();

        assert!(h.session.state().is_torn_down());
        assert!(matches!(
            h.session.on_media(&MediaMessage::new("MZ1", "AAA=".to_string())),
            Ok(())
        ));
    }
}
