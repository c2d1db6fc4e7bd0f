//! Chat completion client.
//!
//! Chat endpoints disagree about where the generated text lives. The adapter
//! normalises every response into a [`ChatReply`] once, so callers only ever
//! see a single canonical string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{PlatformError, PlatformResult, Service};

/// One message in a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// User or assistant turn, as opposed to a system instruction.
    pub fn is_conversation_turn(&self) -> bool {
        self.role == "user" || self.role == "assistant"
    }
}

/// Generated text, tagged with the response field it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// `message.content`
    Message(String),
    /// `choices[0].message.content`
    Choice(String),
    /// `text`
    Text(String),
    /// `content`
    Content(String),
    /// No known field; the whole response stringified.
    Raw(String),
}

impl ChatReply {
    /// Normalise a response body, trying the known fields in order.
    pub fn from_json(value: &Value) -> Self {
        let non_empty = |v: Option<&Value>| {
            v.and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(text) = non_empty(value.pointer("/message/content")) {
            return ChatReply::Message(text);
        }
        if let Some(text) = non_empty(value.pointer("/choices/0/message/content")) {
            return ChatReply::Choice(text);
        }
        if let Some(text) = non_empty(value.get("text")) {
            return ChatReply::Text(text);
        }
        if let Some(text) = non_empty(value.get("content")) {
            return ChatReply::Content(text);
        }

        match value {
            Value::String(s) => ChatReply::Raw(s.clone()),
            other => ChatReply::Raw(other.to_string()),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ChatReply::Message(s)
            | ChatReply::Choice(s)
            | ChatReply::Text(s)
            | ChatReply::Content(s)
            | ChatReply::Raw(s) => s,
        }
    }
}

/// Hosted chat completion endpoint.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> PlatformResult<ChatReply>;

    /// Raw model listing as returned by the endpoint.
    async fn list_models(&self) -> PlatformResult<Value>;
}

/// OpenAI-compatible HTTP chat client.
pub struct HttpChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpChatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

fn chat_error(err: reqwest::Error) -> PlatformError {
    PlatformError::unavailable(Service::Chat, err.to_string())
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> PlatformResult<ChatReply> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(%url, model, "requesting chat completion");

        let response = self
            .authorize(self.client.post(&url))
            .json(&json!({ "model": model, "messages": messages }))
            .send()
            .await
            .map_err(chat_error)?
            .error_for_status()
            .map_err(chat_error)?;

        let body: Value = response.json().await.map_err(chat_error)?;
        Ok(ChatReply::from_json(&body))
    }

    async fn list_models(&self) -> PlatformResult<Value> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(chat_error)?
            .error_for_status()
            .map_err(chat_error)?;

        response.json().await.map_err(chat_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_prefers_message_content() {
        let body = json!({ "message": { "content": "<html>" }, "text": "other" });
        assert_eq!(ChatReply::from_json(&body), ChatReply::Message("<html>".to_string()));
    }

    #[test]
    fn test_reply_reads_openai_choices() {
        let body = json!({ "choices": [{ "message": { "role": "assistant", "content": "hi" } }] });
        assert_eq!(ChatReply::from_json(&body), ChatReply::Choice("hi".to_string()));
    }

    #[test]
    fn test_reply_skips_empty_fields() {
        let body = json!({ "message": { "content": "" }, "text": "", "content": "found" });
        assert_eq!(ChatReply::from_json(&body), ChatReply::Content("found".to_string()));
    }

    #[test]
    fn test_reply_falls_back_to_raw() {
        let body = json!({ "unexpected": 1 });
        assert_eq!(
            ChatReply::from_json(&body).into_text(),
            r#"{"unexpected":1}"#.to_string()
        );
        assert_eq!(
            ChatReply::from_json(&json!("plain")),
            ChatReply::Raw("plain".to_string())
        );
    }
}
