mod error;

pub use error::ExceptionEvent;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use crate::audio::Base64EncodedAudioBytes;

/// `PlaybackInterruptionEvent`, the caller barged in over a prompt
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackInterruptionEvent {
    event_id: Option<String>,

    /// Why playback was interrupted, e.g. `DTMF_START_DETECTED`, `TEXT_DETECTED`, `VOICE_START_DETECTED`
    event_reason: Option<String>,
    /// The event that caused the interruption
    caused_by_event_id: Option<String>,
}

impl PlaybackInterruptionEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn event_reason(&self) -> Option<&str> {
        self.event_reason.as_deref()
    }

    pub fn caused_by_event_id(&self) -> Option<&str> {
        self.caused_by_event_id.as_deref()
    }
}

/// `TranscriptEvent`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    event_id: Option<String>,
    transcript: String,
}

impl TranscriptEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogActionType {
    Close,
    ConfirmIntent,
    Delegate,
    ElicitIntent,
    ElicitSlot,
    None,
    Custom(String),
}

impl Serialize for DialogActionType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            DialogActionType::Close => serializer.serialize_str("Close"),
            DialogActionType::ConfirmIntent => serializer.serialize_str("ConfirmIntent"),
            DialogActionType::Delegate => serializer.serialize_str("Delegate"),
            DialogActionType::ElicitIntent => serializer.serialize_str("ElicitIntent"),
            DialogActionType::ElicitSlot => serializer.serialize_str("ElicitSlot"),
            DialogActionType::None => serializer.serialize_str("None"),
            DialogActionType::Custom(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&str> for DialogActionType {
    fn from(s: &str) -> Self {
        match s {
            "Close" => DialogActionType::Close,
            "ConfirmIntent" => DialogActionType::ConfirmIntent,
            "Delegate" => DialogActionType::Delegate,
            "ElicitIntent" => DialogActionType::ElicitIntent,
            "ElicitSlot" => DialogActionType::ElicitSlot,
            "None" => DialogActionType::None,
            _ => DialogActionType::Custom(s.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for DialogActionType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(DialogActionType::from(s.as_str()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogAction {
    #[serde(rename = "type")]
    action_type: DialogActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    slot_to_elicit: Option<String>,
}

impl DialogAction {
    pub fn action_type(&self) -> &DialogActionType {
        &self.action_type
    }

    pub fn slot_to_elicit(&self) -> Option<&str> {
        self.slot_to_elicit.as_deref()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Intent {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
}

impl Intent {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    dialog_action: Option<DialogAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    intent: Option<Intent>,
}

impl SessionState {
    pub fn dialog_action(&self) -> Option<&DialogAction> {
        self.dialog_action.as_ref()
    }

    pub fn intent(&self) -> Option<&Intent> {
        self.intent.as_ref()
    }
}

/// `IntentResultEvent`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResultEvent {
    event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    session_state: SessionState,
}

impl IntentResultEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn input_mode(&self) -> Option<&str> {
        self.input_mode.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn session_state(&self) -> &SessionState {
        &self.session_state
    }

    /// True when the agent has closed the dialog.
    pub fn closes_dialog(&self) -> bool {
        self.session_state
            .dialog_action()
            .is_some_and(|action| action.action_type() == &DialogActionType::Close)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    content: Option<String>,
    content_type: String,
}

impl Message {
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// `TextResponseEvent`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResponseEvent {
    event_id: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
}

impl TextResponseEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }
}

/// `AudioResponseEvent`. A missing chunk marks the end of the current prompt.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioResponseEvent {
    event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_chunk: Option<Base64EncodedAudioBytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

impl AudioResponseEvent {
    pub fn new(audio_chunk: Option<Base64EncodedAudioBytes>) -> Self {
        Self {
            event_id: None,
            audio_chunk,
            content_type: None,
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn audio_chunk(&self) -> Option<&str> {
        self.audio_chunk.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// `HeartbeatEvent`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatEvent {
    event_id: Option<String>,
}

impl HeartbeatEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use crate::ServerEvent;
    use super::DialogActionType;

    #[test]
    fn test_intent_result_closes_dialog() {
        let json = r#"{
            "type": "IntentResultEvent",
            "eventId": "RESPONSE-3",
            "inputMode": "Speech",
            "sessionState": {
                "dialogAction": {"type": "Close"},
                "intent": {"name": "BookHotel", "state": "Fulfilled"}
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        let ServerEvent::IntentResult(result) = event else {
            panic!("expected an intent result");
        };
        assert!(result.closes_dialog());
        assert_eq!(result.session_state().intent().unwrap().name(), "BookHotel");

        let json = r#"{"type":"IntentResultEvent","sessionState":{"dialogAction":{"type":"ElicitSlot","slotToElicit":"CheckInDate"}}}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        let ServerEvent::IntentResult(result) = event else {
            panic!("expected an intent result");
        };
        assert!(!result.closes_dialog());
        assert_eq!(
            result.session_state().dialog_action().unwrap().action_type(),
            &DialogActionType::ElicitSlot
        );
    }

    #[test]
    fn test_audio_response_without_chunk() {
        let json = r#"{"type":"AudioResponseEvent","eventId":"RESPONSE-9","contentType":"audio/pcm; sample-rate=8000"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        let ServerEvent::AudioResponse(audio) = event else {
            panic!("expected an audio response");
        };
        assert_eq!(audio.audio_chunk(), None);
    }

    #[test]
    fn test_text_response_without_messages() {
        let json = r#"{"type":"TextResponseEvent","eventId":"RESPONSE-4"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        let ServerEvent::TextResponse(text) = event else {
            panic!("expected a text response");
        };
        assert!(!text.has_messages());
    }

    #[test]
    fn test_unknown_dialog_action_is_kept() {
        let action: DialogActionType = serde_json::from_str(r#""ElicitLater""#).unwrap();
        assert_eq!(action, DialogActionType::Custom("ElicitLater".to_string()));
        assert_eq!(serde_json::to_string(&action).unwrap(), r#""ElicitLater""#);
    }
}
