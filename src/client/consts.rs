pub const AGENT_API_KEY: &str = "AGENT_API_KEY";
pub const AGENT_BASE_URL: &str = "AGENT_BASE_URL";
pub const BOT_ID: &str = "BOT_ID";
pub const BOT_ALIAS_ID: &str = "BOT_ALIAS_ID";
pub const LOCALE_ID: &str = "LOCALE_ID";
pub const CREDIT_WINDOW: &str = "AGENT_CREDIT_WINDOW";

pub const BASE_URL: &str = "wss://runtime-v2-lex.us-east-1.amazonaws.com";
pub const DEFAULT_BOT_ALIAS_ID: &str = "TSTALIASID";
pub const DEFAULT_LOCALE_ID: &str = "en_US";
pub const DEFAULT_CREDIT_WINDOW: u64 = 8;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
