use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Both legs of the call run at narrowband telephony rate.
pub const SAMPLE_RATE: u32 = 8000;
pub const CHANNELS: u16 = 1;

/// Content type declared on every `AudioInputEvent`.
pub const AUDIO_INPUT_CONTENT_TYPE: &str =
    "audio/lpcm; sample-rate=8000; sample-size-bits=16; channel-count=1; is-big-endian=false";

/// Response content type requested in the `ConfigurationEvent`.
pub const RESPONSE_CONTENT_TYPE: &str = "audio/pcm; sample-rate=8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyEncoding {
    MuLaw,
    ALaw,
    Custom(String),
}

impl Serialize for TelephonyEncoding {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl TelephonyEncoding {
    pub fn as_str(&self) -> &str {
        match self {
            TelephonyEncoding::MuLaw => "audio/x-mulaw",
            TelephonyEncoding::ALaw => "audio/x-alaw",
            TelephonyEncoding::Custom(s) => s,
        }
    }
}

impl From<&str> for TelephonyEncoding {
    fn from(s: &str) -> Self {
        match s {
            "audio/x-mulaw" | "mulaw" | "ulaw" => TelephonyEncoding::MuLaw,
            "audio/x-alaw" | "alaw" => TelephonyEncoding::ALaw,
            _ => TelephonyEncoding::Custom(s.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for TelephonyEncoding {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(TelephonyEncoding::from(s.as_str()))
    }
}

#[cfg(test)]
mod test {
    use super::TelephonyEncoding;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct FormatConsts {
        #[serde(skip_serializing_if = "Option::is_none")]
        encoding: Option<TelephonyEncoding>,
        #[serde(rename = "sampleRate", skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
    }

    #[test]
    fn test_serialize() {
        let consts = FormatConsts {
            encoding: Some(TelephonyEncoding::MuLaw),
            sample_rate: Some(8000),
        };
        let json = serde_json::to_string(&consts).unwrap();
        let expected = r#"{"encoding":"audio/x-mulaw","sampleRate":8000}"#;
        assert_eq!(json, expected);

        let consts = FormatConsts {
            encoding: Some(TelephonyEncoding::Custom("audio/l16".to_string())),
            sample_rate: None,
        };
        let json = serde_json::to_string(&consts).unwrap();
        let expected = r#"{"encoding":"audio/l16"}"#;
        assert_eq!(json, expected);
    }

    #[test]
    fn test_deserialize() {
        let json = r#"{"encoding":"audio/x-alaw","sampleRate":8000}"#;
        let consts: FormatConsts = serde_json::from_str(json).unwrap();
        assert_eq!(consts.encoding, Some(TelephonyEncoding::ALaw));
        assert_eq!(consts.sample_rate, Some(8000));

        let json = r#"{"encoding":"audio/opus"}"#;
        let consts: FormatConsts = serde_json::from_str(json).unwrap();
        assert_eq!(
            consts.encoding,
            Some(TelephonyEncoding::Custom("audio/opus".to_string()))
        );
        assert_eq!(consts.sample_rate, None);
    }
}
