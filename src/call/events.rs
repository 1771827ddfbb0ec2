use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use call_relay_types::events::client::{
    AudioInputEvent, ConfigurationEvent, DisconnectionEvent, PlaybackCompletionEvent,
};
use call_relay_types::ClientEvent;
use call_relay_utils::audio;

/// Builds agent events stamped with `<Kind>-<n>` ids from a per-call counter.
#[derive(Debug, Default)]
pub struct EventFactory {
    counter: AtomicU64,
}

impl EventFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, kind: &str) -> String {
        format!("{}-{}", kind, self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    pub fn configuration(&self) -> ClientEvent {
        ClientEvent::Configuration(
            ConfigurationEvent::new()
                .with_event_id(&self.next_id("ConfigurationEvent"))
                .with_client_timestamp_millis(Self::now_millis()),
        )
    }

    /// Wraps a chunk of little-endian PCM16.
    pub fn audio_input(&self, pcm16: &[u8]) -> ClientEvent {
        ClientEvent::AudioInput(
            AudioInputEvent::new(audio::encode(pcm16))
                .with_event_id(&self.next_id("AudioInputEvent"))
                .with_client_timestamp_millis(Self::now_millis()),
        )
    }

    pub fn playback_completion(&self) -> ClientEvent {
        ClientEvent::PlaybackCompletion(
            PlaybackCompletionEvent::new()
                .with_event_id(&self.next_id("PlaybackCompletion"))
                .with_client_timestamp_millis(Self::now_millis()),
        )
    }

    pub fn disconnection(&self) -> ClientEvent {
        ClientEvent::Disconnection(
            DisconnectionEvent::new()
                .with_event_id(&self.next_id("DisconnectionEvent"))
                .with_client_timestamp_millis(Self::now_millis()),
        )
    }
}
