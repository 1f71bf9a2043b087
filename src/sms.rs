//! Task reminders over SMS.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SmsConfig;
use crate::error::SmsError;

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError>;
}

/// Upper bound on one gateway round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the sender described by `config`: Twilio when fully configured,
/// otherwise one that refuses every message.
pub fn from_config(config: &SmsConfig) -> Result<Arc<dyn SmsSender>, SmsError> {
    match (&config.account_sid, &config.auth_token, &config.from_number) {
        (Some(sid), Some(token), Some(from)) => Ok(Arc::new(TwilioSender::new(
            config.api_base.clone(),
            sid.clone(),
            token.clone(),
            from.clone(),
        )?)),
        _ => {
            warn!("twilio credentials missing, sms reminders are disabled");
            Ok(Arc::new(DisabledSender))
        }
    }
}

/// Sends through the Twilio Messages REST API.
pub struct TwilioSender {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSender {
    pub fn new(
        api_base: String,
        account_sid: String,
        auth_token: String,
        from_number: String,
    ) -> Result<Self, SmsError> {
        Self::with_timeout(api_base, account_sid, auth_token, from_number, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        api_base: String,
        account_sid: String,
        auth_token: String,
        from_number: String,
        timeout: Duration,
    ) -> Result<Self, SmsError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            from_number,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SmsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!(to, "sms reminder sent");
        Ok(())
    }
}

pub struct DisabledSender;

#[async_trait]
impl SmsSender for DisabledSender {
    async fn send(&self, to: &str, _body: &str) -> Result<(), SmsError> {
        warn!(to, "dropping sms reminder, delivery not configured");
        Err(SmsError::NotConfigured)
    }
}
