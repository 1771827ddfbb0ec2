//! Media stream messages exchanged with the telephony side.
//!
//! Every frame is a JSON text message tagged by `event`. Inbound frames are
//! `connected`, `start`, `media`, `stop` and `mark`; this side only ever sends
//! `media`, `mark` and `clear`.

use crate::audio::{Base64EncodedAudioBytes, TelephonyEncoding};

/// Identity of one telephony leg.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallIdentifier {
    account_id: String,
    call_id: String,
    stream_id: String,
}

impl CallIdentifier {
    pub fn new(account_id: &str, call_id: &str, stream_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            call_id: call_id.to_string(),
            stream_id: stream_id.to_string(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

impl std::fmt::Display for CallIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.account_id, self.call_id, self.stream_id)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event")]
pub enum InboundMessage {
    #[serde(rename = "connected")]
    Connected(ConnectedMessage),
    #[serde(rename = "start")]
    Start(StartMessage),
    #[serde(rename = "media")]
    Media(MediaMessage),
    #[serde(rename = "stop")]
    Stop(StopMessage),
    #[serde(rename = "mark")]
    Mark(MarkMessage),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event")]
pub enum OutboundMessage {
    #[serde(rename = "media")]
    Media(MediaMessage),
    #[serde(rename = "mark")]
    Mark(MarkMessage),
    #[serde(rename = "clear")]
    Clear(ClearMessage),
}

/// `connected` message, metadata only
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConnectedMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl ConnectedMessage {
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// Negotiated audio format of the stream
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    encoding: TelephonyEncoding,
    sample_rate: u32,
    channels: u16,
}

impl MediaFormat {
    pub fn new(encoding: TelephonyEncoding, sample_rate: u32, channels: u16) -> Self {
        Self {
            encoding,
            sample_rate,
            channels,
        }
    }

    pub fn encoding(&self) -> &TelephonyEncoding {
        &self.encoding
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    account_sid: String,
    call_sid: String,
    stream_sid: String,
    #[serde(default)]
    tracks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_format: Option<MediaFormat>,
}

impl StartMetadata {
    pub fn tracks(&self) -> &[String] {
        &self.tracks
    }

    pub fn media_format(&self) -> Option<&MediaFormat> {
        self.media_format.as_ref()
    }
}

/// `start` message
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_number: Option<String>,
    stream_sid: String,
    start: StartMetadata,
}

impl StartMessage {
    pub fn call_identifier(&self) -> CallIdentifier {
        CallIdentifier::new(
            &self.start.account_sid,
            &self.start.call_sid,
            &self.start.stream_sid,
        )
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    pub fn start(&self) -> &StartMetadata {
        &self.start
    }

    pub fn media_format(&self) -> Option<&MediaFormat> {
        self.start.media_format()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MediaPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    /// Companded audio, base64 encoded
    payload: Base64EncodedAudioBytes,
}

/// `media` message, in either direction
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_number: Option<String>,
    stream_sid: String,
    media: MediaPayload,
}

impl MediaMessage {
    pub fn new(stream_sid: &str, payload: Base64EncodedAudioBytes) -> Self {
        Self {
            sequence_number: None,
            stream_sid: stream_sid.to_string(),
            media: MediaPayload {
                track: None,
                chunk: None,
                timestamp: None,
                payload,
            },
        }
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    pub fn payload(&self) -> &str {
        &self.media.payload
    }

    pub fn track(&self) -> Option<&str> {
        self.media.track.as_deref()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopMetadata {
    account_sid: String,
    call_sid: String,
}

/// `stop` message
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_number: Option<String>,
    stream_sid: String,
    stop: StopMetadata,
}

impl StopMessage {
    pub fn call_identifier(&self) -> CallIdentifier {
        CallIdentifier::new(&self.stop.account_sid, &self.stop.call_sid, &self.stream_sid)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Mark {
    name: String,
}

/// `mark` message, sent after an utterance and echoed back once it has played
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_number: Option<String>,
    stream_sid: String,
    mark: Mark,
}

impl MarkMessage {
    pub fn new(stream_sid: &str, name: &str) -> Self {
        Self {
            sequence_number: None,
            stream_sid: stream_sid.to_string(),
            mark: Mark {
                name: name.to_string(),
            },
        }
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    pub fn name(&self) -> &str {
        &self.mark.name
    }
}

/// `clear` message, asks the telephony side to drop audio it has not played yet
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearMessage {
    stream_sid: String,
}

impl ClearMessage {
    pub fn new(stream_sid: &str) -> Self {
        Self {
            stream_sid: stream_sid.to_string(),
        }
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }
}
