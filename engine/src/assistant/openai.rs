use super::{ConversationApi, Result};
use crate::config::AssistantConfig;
use crate::secrets::{scrub, SecretString};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use sdk::errors::EngineError;
use sdk::types::{ConversationId, RunAttempt, RunId, RunStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Client for the Assistants v2 threads/runs REST surface.
pub struct OpenAIThreadsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    organization_id: Option<String>,
    api_version: String,
    assistant_id: String,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RunError {
    fn describe(&self) -> String {
        match (self.code.as_deref(), self.message.as_deref()) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message.to_string(),
            (Some(code), None) => code.to_string(),
            (None, None) => "Unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

impl MessageObject {
    /// Text parts joined with newlines; `None` when there are none.
    fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.value.as_str()),
                ContentPart::Other => None,
            })
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

impl OpenAIThreadsClient {
    pub fn new(config: &AssistantConfig, api_key: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            organization_id: config
                .organization_id
                .clone()
                .filter(|org| !org.trim().is_empty()),
            api_version: config.api_version.clone(),
            assistant_id: config.assistant_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.api_key.unsecure()))
            .header("OpenAI-Beta", &self.api_version);

        match &self.organization_id {
            Some(org) => request.header("OpenAI-Organization", org),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Assistant API returned {}: {}", status, scrub(&body));
            return Err(EngineError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| EngineError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ConversationApi for OpenAIThreadsClient {
    async fn create_conversation(&self, first_message: &str) -> Result<ConversationId> {
        let payload = json!({
            "messages": [
                { "role": "user", "content": first_message }
            ]
        });

        let thread: ThreadObject = self
            .send_json(self.client.post(self.url("/threads")).json(&payload))
            .await?;

        debug!("Created thread {}", thread.id);
        Ok(ConversationId::new(thread.id))
    }

    async fn append_message(&self, conversation: &ConversationId, text: &str) -> Result<()> {
        let url = self.url(&format!("/threads/{}/messages", conversation));
        let payload = json!({ "role": "user", "content": text });

        let _: serde_json::Value = self.send_json(self.client.post(url).json(&payload)).await?;
        Ok(())
    }

    async fn start_run(&self, conversation: &ConversationId) -> Result<RunId> {
        let url = self.url(&format!("/threads/{}/runs", conversation));
        let payload = json!({ "assistant_id": self.assistant_id });

        let run: RunObject = self.send_json(self.client.post(url).json(&payload)).await?;
        debug!("Started run {} ({})", run.id, run.status);
        Ok(RunId::new(run.id))
    }

    async fn get_run_status(
        &self,
        conversation: &ConversationId,
        run: &RunId,
    ) -> Result<RunAttempt> {
        let url = self.url(&format!("/threads/{}/runs/{}", conversation, run));

        let object: RunObject = self.send_json(self.client.get(url)).await?;
        let attempt = RunAttempt::new(
            conversation.clone(),
            RunId::new(object.id),
            object.status,
        );

        Ok(match object.last_error {
            Some(error) => attempt.with_error(error.describe()),
            None => attempt,
        })
    }

    async fn latest_assistant_message(
        &self,
        conversation: &ConversationId,
        run: &RunId,
    ) -> Result<Option<String>> {
        let url = self.url(&format!("/threads/{}/messages", conversation));
        let request = self.client.get(url).query(&[
            ("order", "desc"),
            ("limit", "1"),
            ("run_id", run.as_str()),
        ]);

        let list: MessageList = self.send_json(request).await?;
        Ok(list
            .data
            .iter()
            .filter(|message| message.role == "assistant")
            .find_map(MessageObject::text))
    }

    async fn cancel_run(&self, conversation: &ConversationId, run: &RunId) -> Result<()> {
        let url = self.url(&format!("/threads/{}/runs/{}/cancel", conversation, run));

        let _: serde_json::Value = self.send_json(self.client.post(url)).await?;
        Ok(())
    }
}
