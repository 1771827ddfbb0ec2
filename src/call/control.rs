use anyhow::Context;
use call_relay_types::CallIdentifier;
use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
use mockall::automock;

/// Call control on the telephony provider, outside the media stream.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait CallControl: Send + Sync {
    /// Ends the call for every party.
    async fn hang_up(&self, call: &CallIdentifier) -> anyhow::Result<()>;
}

/// Completes calls through the Twilio REST API.
pub struct TwilioCallControl {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: SecretString,
}

impl TwilioCallControl {
    pub fn new(api_base: &str, account_sid: &str, auth_token: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token,
        }
    }

    fn call_url(&self, call: &CallIdentifier) -> String {
        let account = if call.account_id().is_empty() {
            self.account_sid.as_str()
        } else {
            call.account_id()
        };
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.api_base,
            account,
            call.call_id()
        )
    }
}

#[async_trait::async_trait]
impl CallControl for TwilioCallControl {
    async fn hang_up(&self, call: &CallIdentifier) -> anyhow::Result<()> {
        let url = self.call_url(call);
        tracing::info!("hanging up call {}", call);
        self.http
            .post(&url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&[("Status", "completed")])
            .send()
            .await
            .with_context(|| format!("failed to reach {}", url))?
            .error_for_status()
            .with_context(|| format!("call {} was not completed", call))?;
        Ok(())
    }
}
