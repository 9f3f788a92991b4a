//! Discord REST delivery
//!
//! Posts replies with `POST /channels/{id}/messages` and shows the typing
//! indicator with `POST /channels/{id}/typing`. Authenticates with a bot
//! token (`Authorization: Bot <token>`).

use super::{ReferencedMessage, ReplySink, ReplyTarget};
use crate::secrets::{scrub, SecretString};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use sdk::errors::EngineError;
use sdk::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct DiscordReplySink {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl std::fmt::Debug for DiscordReplySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordReplySink")
            .field("base_url", &self.base_url)
            .field("token", &self.token)
            .finish()
    }
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_reference: Option<MessageReference<'a>>,
    allowed_mentions: AllowedMentions,
}

#[derive(Serialize)]
struct MessageReference<'a> {
    message_id: &'a str,
    /// Post anyway if the original message was deleted meanwhile.
    fail_if_not_exists: bool,
}

/// Answers never ping roles or `@everyone`; only the replied-to author.
#[derive(Serialize)]
struct AllowedMentions {
    parse: Vec<String>,
    replied_user: bool,
}

#[derive(Deserialize)]
struct MessageObject {
    id: String,
    #[serde(default)]
    content: String,
}

impl DiscordReplySink {
    pub fn new(base_url: &str, token: SecretString) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_request(&self, request: RequestBuilder) -> Result<reqwest::Response, EngineError> {
        let response = request
            .header("Authorization", format!("Bot {}", self.token.unsecure()))
            .send()
            .await
            .map_err(|e| EngineError::Network(scrub(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Discord API returned {}: {}", status, scrub(&body));
            return Err(EngineError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Fetches one message, used to answer a question asked by replying to it.
    pub async fn fetch_message(
        &self,
        channel: &ChannelId,
        message_id: &str,
    ) -> Result<ReferencedMessage, EngineError> {
        let url = self.url(&format!("/channels/{}/messages/{}", channel, message_id));
        let message: MessageObject = self
            .send_request(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Parse(e.to_string()))?;

        Ok(ReferencedMessage {
            id: message.id,
            content: message.content,
        })
    }
}

#[async_trait]
impl ReplySink for DiscordReplySink {
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<(), EngineError> {
        let url = self.url(&format!("/channels/{}/messages", target.channel));
        let body = CreateMessage {
            content: text,
            message_reference: target.message_id.as_deref().map(|id| MessageReference {
                message_id: id,
                fail_if_not_exists: false,
            }),
            allowed_mentions: AllowedMentions {
                parse: Vec::new(),
                replied_user: true,
            },
        };

        self.send_request(self.client.post(url).json(&body)).await?;
        debug!("Posted {} chars to channel {}", text.chars().count(), target.channel);
        Ok(())
    }

    async fn typing(&self, channel: &ChannelId) -> Result<(), EngineError> {
        let url = self.url(&format!("/channels/{}/typing", channel));
        self.send_request(self.client.post(url)).await?;
        Ok(())
    }
}
