use crate::client::{CompletionProvider, build_http_client};
use crate::error::{LlmError, Result};
use crate::types::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Client for the chat-completions providers (Groq, DeepSeek, Grok,
/// OpenRouter). They share one wire schema and differ only in base URL,
/// model and identification headers.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    title_header: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: build_http_client(),
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            title_header: None,
        }
    }

    /// Attach an `X-Title` identification header (OpenRouter asks callers to
    /// name themselves).
    pub fn with_title_header(mut self, title: impl Into<String>) -> Self {
        self.title_header = Some(title.into());
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(level = "info", skip_all, fields(provider = %self.name, model = %self.model))]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if messages.is_empty() {
            return Err(LlmError::InvalidInput("messages must not be empty".into()));
        }
        let req = ChatCompletionRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire_message).collect(),
        };

        let mut request = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&req);
        if let Some(title) = self.title_header.as_deref() {
            request = request.header("X-Title", title);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "{} chat status={status} body={body}",
                self.name
            )));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyCompletion)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn to_wire_message(message: &ChatMessage) -> WireMessage<'_> {
    WireMessage {
        role: message.role.as_str(),
        content: &message.content,
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_joins_without_duplicate_slash() {
        let client =
            OpenAiCompatClient::new("groq", "https://api.groq.com/openai/v1/", "key", "model");
        assert_eq!(
            client.completions_url(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn wire_messages_keep_order_and_roles() {
        let messages = vec![
            ChatMessage::system("persona"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("how are you?"),
        ];
        let wire: Vec<WireMessage<'_>> = messages.iter().map(to_wire_message).collect();
        let roles: Vec<&str> = wire.iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(wire[3].content, "how are you?");

        let req = ChatCompletionRequest {
            model: "m",
            messages: wire,
        };
        let json = serde_json::to_value(&req).expect("request serializes");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "persona");
    }

    #[test]
    fn empty_or_missing_content_is_an_empty_completion() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#)
                .expect("response parses");
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty());
        assert!(content.is_none());

        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[]}"#).expect("response parses");
        assert!(parsed.choices.is_empty());
    }
}
