//! Application configuration, loaded from the environment.
//!
//! A `.env` file is read first when present, which is handy for local runs
//! behind a tunnel.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use call_relay_types::audio::TelephonyEncoding;
use secrecy::SecretString;
use tracing::Level;

use crate::call::{SessionSettings, DEFAULT_DRAIN_TIMEOUT, DEFAULT_FRAME_SAMPLE_LIMIT, DEFAULT_INPUT_CHUNK_BYTES};
use crate::client;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Holds all configuration loaded from the environment.
#[derive(Debug)]
pub struct Config {
    pub bind_address: String,
    pub encoding: TelephonyEncoding,
    pub frame_sample_limit: usize,
    pub input_chunk_bytes: usize,
    pub drain_timeout: Duration,
    pub log_level: Level,
    pub twilio_account_sid: String,
    pub twilio_auth_token: SecretString,
    pub twilio_api_base: String,
    pub agent: Arc<client::Config>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), value)),
        Err(_) => Ok(default),
    }
}

/// Parses a stream encoding name. Only the two G.711 laws are accepted.
pub fn parse_encoding(value: &str) -> Result<TelephonyEncoding, ConfigError> {
    match TelephonyEncoding::from(value.trim()) {
        TelephonyEncoding::Custom(_) => Err(ConfigError::InvalidValue(
            "TELEPHONY_ENCODING".to_string(),
            value.to_string(),
        )),
        encoding => Ok(encoding),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `BIND_ADDRESS`: (Optional) Listen address. Defaults to "0.0.0.0:8080".
    // *   `TELEPHONY_ENCODING`: (Optional) "mulaw" or "alaw". Defaults to "mulaw".
    // *   `FRAME_SAMPLE_LIMIT`: (Optional) Samples per outbound media frame. Defaults to 5000.
    // *   `INPUT_CHUNK_BYTES`: (Optional) PCM bytes per audio input event. Defaults to 320.
    // *   `DRAIN_TIMEOUT_MS`: (Optional) How long teardown waits for queued agent events. Defaults to 2000.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    // *   `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`: Credentials used to hang calls up.
    // *   `TWILIO_API_BASE`: (Optional) Defaults to "https://api.twilio.com".
    // *   `AGENT_BASE_URL`, `AGENT_API_KEY`, `BOT_ID`, `BOT_ALIAS_ID`, `LOCALE_ID`, `AGENT_CREDIT_WINDOW`: agent connection.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let encoding = match env::var("TELEPHONY_ENCODING") {
            Ok(value) => parse_encoding(&value)?,
            Err(_) => TelephonyEncoding::MuLaw,
        };

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidValue("RUST_LOG".to_string(), log_level_str))?;

        let frame_sample_limit = parsed("FRAME_SAMPLE_LIMIT", DEFAULT_FRAME_SAMPLE_LIMIT)?;
        if frame_sample_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "FRAME_SAMPLE_LIMIT".to_string(),
                "0".to_string(),
            ));
        }
        let input_chunk_bytes = parsed("INPUT_CHUNK_BYTES", DEFAULT_INPUT_CHUNK_BYTES)?;
        let drain_timeout = Duration::from_millis(parsed(
            "DRAIN_TIMEOUT_MS",
            DEFAULT_DRAIN_TIMEOUT.as_millis() as u64,
        )?);

        let mut agent = client::Config::builder()
            .with_api_key(&required(client::consts::AGENT_API_KEY)?)
            .with_bot_id(&required(client::consts::BOT_ID)?)
            .with_credit_window(parsed(
                client::consts::CREDIT_WINDOW,
                client::consts::DEFAULT_CREDIT_WINDOW,
            )?);
        if let Ok(base_url) = env::var(client::consts::AGENT_BASE_URL) {
            agent = agent.with_base_url(&base_url);
        }
        if let Ok(alias) = env::var(client::consts::BOT_ALIAS_ID) {
            agent = agent.with_bot_alias_id(&alias);
        }
        if let Ok(locale) = env::var(client::consts::LOCALE_ID) {
            agent = agent.with_locale_id(&locale);
        }

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            encoding,
            frame_sample_limit,
            input_chunk_bytes,
            drain_timeout,
            log_level,
            twilio_account_sid: required("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: SecretString::from(required("TWILIO_AUTH_TOKEN")?),
            twilio_api_base: env::var("TWILIO_API_BASE")
                .unwrap_or_else(|_| DEFAULT_TWILIO_API_BASE.to_string()),
            agent: Arc::new(agent.build()),
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            frame_sample_limit: self.frame_sample_limit,
            input_chunk_bytes: self.input_chunk_bytes,
            drain_timeout: self.drain_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoding() {
        assert_eq!(parse_encoding("mulaw").unwrap(), TelephonyEncoding::MuLaw);
        assert_eq!(parse_encoding("audio/x-alaw").unwrap(), TelephonyEncoding::ALaw);
        assert!(matches!(
            parse_encoding("opus"),
            Err(ConfigError::InvalidValue(name, _)) if name == "TELEPHONY_ENCODING"
        ));
    }
}
