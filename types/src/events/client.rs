use crate::audio::{Base64EncodedAudioBytes, AUDIO_INPUT_CONTENT_TYPE, RESPONSE_CONTENT_TYPE};

/// `ConfigurationEvent`, sent once when the conversation starts
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationEvent {
    event_id: Option<String>,
    client_timestamp_millis: Option<u64>,

    /// The audio format the agent should answer in
    response_content_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    disable_playback: Option<bool>,
}

impl ConfigurationEvent {
    pub fn new() -> Self {
        Self {
            event_id: None,
            client_timestamp_millis: None,
            response_content_type: RESPONSE_CONTENT_TYPE.to_string(),
            disable_playback: None,
        }
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn with_client_timestamp_millis(mut self, millis: u64) -> Self {
        self.client_timestamp_millis = Some(millis);
        self
    }

    pub fn with_response_content_type(mut self, content_type: &str) -> Self {
        self.response_content_type = content_type.to_string();
        self
    }

    pub fn with_disable_playback(mut self, disable: bool) -> Self {
        self.disable_playback = Some(disable);
        self
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response_content_type(&self) -> &str {
        &self.response_content_type
    }
}

impl Default for ConfigurationEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// `AudioInputEvent`, one chunk of caller audio
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInputEvent {
    event_id: Option<String>,
    client_timestamp_millis: Option<u64>,

    /// Linear PCM audio, base64 encoded
    audio_chunk: Base64EncodedAudioBytes,
    content_type: String,
}

impl AudioInputEvent {
    pub fn new(audio_chunk: Base64EncodedAudioBytes) -> Self {
        Self {
            event_id: None,
            client_timestamp_millis: None,
            audio_chunk,
            content_type: AUDIO_INPUT_CONTENT_TYPE.to_string(),
        }
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn with_client_timestamp_millis(mut self, millis: u64) -> Self {
        self.client_timestamp_millis = Some(millis);
        self
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn audio_chunk(&self) -> &Base64EncodedAudioBytes {
        &self.audio_chunk
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// `PlaybackCompletionEvent`, tells the agent the caller has heard the last prompt
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCompletionEvent {
    event_id: Option<String>,
    client_timestamp_millis: Option<u64>,
}

impl PlaybackCompletionEvent {
    pub fn new() -> Self {
        Self {
            event_id: None,
            client_timestamp_millis: None,
        }
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn with_client_timestamp_millis(mut self, millis: u64) -> Self {
        self.client_timestamp_millis = Some(millis);
        self
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }
}

impl Default for PlaybackCompletionEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// `DisconnectionEvent`, the last event of a conversation
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectionEvent {
    event_id: Option<String>,
    client_timestamp_millis: Option<u64>,
}

impl DisconnectionEvent {
    pub fn new() -> Self {
        Self {
            event_id: None,
            client_timestamp_millis: None,
        }
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn with_client_timestamp_millis(mut self, millis: u64) -> Self {
        self.client_timestamp_millis = Some(millis);
        self
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }
}

impl Default for DisconnectionEvent {
    fn default() -> Self {
        Self::new()
    }
}
