pub mod client;
pub mod server;

use client::*;
use server::*;

/// Events sent to the conversational agent.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "ConfigurationEvent")]
    Configuration(ConfigurationEvent),
    #[serde(rename = "AudioInputEvent")]
    AudioInput(AudioInputEvent),
    #[serde(rename = "PlaybackCompletionEvent")]
    PlaybackCompletion(PlaybackCompletionEvent),
    #[serde(rename = "DisconnectionEvent")]
    Disconnection(DisconnectionEvent),
}

impl ClientEvent {
    pub fn event_id(&self) -> Option<&str> {
        match self {
            ClientEvent::Configuration(e) => e.event_id(),
            ClientEvent::AudioInput(e) => e.event_id(),
            ClientEvent::PlaybackCompletion(e) => e.event_id(),
            ClientEvent::Disconnection(e) => e.event_id(),
        }
    }
}

/// Events received from the conversational agent.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "close")]
    Close {
        reason: Option<String>,
    },
    #[serde(rename = "Exception")]
    Exception(ExceptionEvent),
    #[serde(rename = "PlaybackInterruptionEvent")]
    PlaybackInterruption(PlaybackInterruptionEvent),
    #[serde(rename = "TranscriptEvent")]
    Transcript(TranscriptEvent),
    #[serde(rename = "IntentResultEvent")]
    IntentResult(IntentResultEvent),
    #[serde(rename = "TextResponseEvent")]
    TextResponse(TextResponseEvent),
    #[serde(rename = "AudioResponseEvent")]
    AudioResponse(AudioResponseEvent),
    #[serde(rename = "HeartbeatEvent")]
    Heartbeat(HeartbeatEvent),
}
