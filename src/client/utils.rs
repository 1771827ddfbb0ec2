use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use crate::client::config::Config;
use crate::client::consts::AUTHORIZATION_HEADER;

pub fn conversation_url(config: &Config, session_id: &str) -> String {
    format!(
        "{}/bots/{}/botAliases/{}/botLocales/{}/sessions/{}/conversation",
        config.base_url(),
        config.bot_id(),
        config.bot_alias_id(),
        config.locale_id(),
        session_id
    )
}

pub fn build_request(config: &Config, session_id: &str) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = conversation_url(config, session_id).into_client_request()?;
    request.headers_mut()
        .insert(
            AUTHORIZATION_HEADER,
            format!("Bearer {}", config.api_key().expose_secret()).as_str().parse()?
        );
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let config = Config::builder()
            .with_base_url("wss://agent.example.com/")
            .with_api_key("secret")
            .with_bot_id("BOT1")
            .with_bot_alias_id("ALIAS1")
            .with_locale_id("en_GB")
            .build();

        let request = build_request(&config, "session-1").unwrap();
        assert_eq!(
            request.uri().to_string(),
            "wss://agent.example.com/bots/BOT1/botAliases/ALIAS1/botLocales/en_GB/sessions/session-1/conversation"
        );
        assert_eq!(request.headers()[AUTHORIZATION_HEADER], "Bearer secret");
    }
}
