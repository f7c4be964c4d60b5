use crate::error::{ChannelError, Result};
use crate::traits::DmChannel;
use crate::types::{SenderAction, UserProfile};
use async_trait::async_trait;

const DEFAULT_API_BASE: &str = "https://graph.instagram.com/v25.0";

/// Instagram Graph API client. Sends and presence signals POST to
/// `{base}/me/messages`; profile lookups GET `{base}/{psid}`. The API
/// authenticates via an `access_token` query parameter.
#[derive(Clone)]
pub struct InstagramGraphApi {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl InstagramGraphApi {
    pub fn new(access_token: &str) -> Result<Self> {
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(ChannelError::InvalidInput(
                "instagram access token is required".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            access_token: access_token.to_string(),
        })
    }

    /// Point the client at a different Graph endpoint (tests, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/me/messages", self.api_base.trim_end_matches('/'))
    }

    fn profile_url(&self, sender_id: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), sender_id)
    }

    async fn post_message(&self, payload: &serde_json::Value) -> Result<()> {
        let response = self
            .http
            .post(self.messages_url())
            .query(&[("access_token", self.access_token.as_str())])
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChannelError::Http(format!(
                "instagram send failed: status={status} body={body}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DmChannel for InstagramGraphApi {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<()> {
        let to = recipient_id.trim();
        if to.is_empty() {
            return Err(ChannelError::InvalidInput("recipient_id is required".into()));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ChannelError::InvalidInput("message text is empty".into()));
        }
        self.post_message(&serde_json::json!({
            "recipient": { "id": to },
            "message": { "text": text },
        }))
        .await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn send_action(&self, recipient_id: &str, action: SenderAction) -> Result<()> {
        let to = recipient_id.trim();
        if to.is_empty() {
            return Err(ChannelError::InvalidInput("recipient_id is required".into()));
        }
        self.post_message(&serde_json::json!({
            "recipient": { "id": to },
            "sender_action": action.as_str(),
        }))
        .await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn fetch_username(&self, sender_id: &str) -> Result<Option<String>> {
        let sender_id = sender_id.trim();
        if sender_id.is_empty() {
            return Err(ChannelError::InvalidInput("sender_id is required".into()));
        }

        let response = self
            .http
            .get(self.profile_url(sender_id))
            .query(&[
                ("fields", "name,username"),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChannelError::Http(format!(
                "instagram profile lookup failed: status={status} body={body}"
            )));
        }

        let profile: UserProfile = serde_json::from_str(&body)?;
        Ok(profile
            .username
            .map(|username| username.trim().to_string())
            .filter(|username| !username.is_empty()))
    }
}
