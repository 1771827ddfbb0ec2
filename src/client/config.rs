use secrecy::SecretString;

use crate::client::consts;

/// Connection settings for the conversational agent.
pub struct Config {
    base_url: String,
    api_key: SecretString,
    bot_id: String,
    bot_alias_id: String,
    locale_id: String,
    credit_window: u64,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_bot_id(mut self, bot_id: &str) -> Self {
        self.config.bot_id = bot_id.to_string();
        self
    }

    pub fn with_bot_alias_id(mut self, bot_alias_id: &str) -> Self {
        self.config.bot_alias_id = bot_alias_id.to_string();
        self
    }

    pub fn with_locale_id(mut self, locale_id: &str) -> Self {
        self.config.locale_id = locale_id.to_string();
        self
    }

    /// Number of events the agent connection may have in flight at once.
    pub fn with_credit_window(mut self, credit_window: u64) -> Self {
        self.config.credit_window = credit_window.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: consts::BASE_URL.to_string(),
            api_key: std::env::var(consts::AGENT_API_KEY)
                .unwrap_or_default()
                .into(),
            bot_id: String::new(),
            bot_alias_id: consts::DEFAULT_BOT_ALIAS_ID.to_string(),
            locale_id: consts::DEFAULT_LOCALE_ID.to_string(),
            credit_window: consts::DEFAULT_CREDIT_WINDOW,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn bot_alias_id(&self) -> &str {
        &self.bot_alias_id
    }

    pub fn locale_id(&self) -> &str {
        &self.locale_id
    }

    pub fn credit_window(&self) -> u64 {
        self.credit_window
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("bot_id", &self.bot_id)
            .field("bot_alias_id", &self.bot_alias_id)
            .field("locale_id", &self.locale_id)
            .field("credit_window", &self.credit_window)
            .finish_non_exhaustive()
    }
}
