use crate::chat::transcript::CompletionRequest;
use crate::chat::ChatMessage;
use crate::config::AiConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::debug;

pub const NO_REPLY_FALLBACK: &str = "AI has no reply right now.";
pub const UNAVAILABLE_FALLBACK: &str = "AI service is unavailable, please try again later.";

const SYSTEM_PROMPT: &str = "You are Daka AI, a warm and witty assistant with a strong feel for \
local life in Guangzhou. Talk like a friend: natural, light, the occasional emoji. Suggest fun \
landmarks, food and activities now and then, and encourage people to go out and explore.
When the user asks to find a place or jump to it on the map, weave in a short introduction and \
end your reply with a marker of the form [map:<place name>], for example: \"Canton Tower is \
stunning day and night, I've marked it for you [map:广州塔]\". Otherwise just chat.
If asked who founded or runs Daka Map, answer that the founder is Sheng, and never invent other names.";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("AI API key is not configured")]
    MissingApiKey,
    #[error("AI request failed: {0}")]
    Transport(String),
    #[error("AI API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("AI response could not be read: {0}")]
    InvalidResponse(String),
    #[error("AI response contained no text")]
    NoContent,
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl CompletionError {
    /// Text shown in place of a reply.
    pub fn fallback_text(&self) -> &'static str {
        match self {
            Self::NoContent => NO_REPLY_FALLBACK,
            _ => UNAVAILABLE_FALLBACK,
        }
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// OpenAI-compatible chat completions endpoint (DeepSeek by default).
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            model: config.model.clone(),
            http: reqwest::Client::new(),
        }
    }
}

fn role_for(message: &ChatMessage) -> &'static str {
    if message.is_from_assistant() {
        "assistant"
    } else {
        "user"
    }
}

fn build_payload(model: &str, request: &CompletionRequest) -> JsonValue {
    let mut messages = vec![json!({ "role": "system", "content": SYSTEM_PROMPT })];
    messages.extend(
        request
            .history
            .iter()
            .map(|message| json!({ "role": role_for(message), "content": message.text })),
    );

    let location_note = request
        .location
        .map(|location| {
            format!(
                "The user is currently near latitude {}, longitude {}. Tailor suggestions to that location.\n\n",
                location.lat, location.lng
            )
        })
        .unwrap_or_default();
    messages.push(json!({
        "role": "user",
        "content": format!("{location_note}{}", request.message),
    }));

    json!({
        "model": model,
        "messages": messages,
        "temperature": 0.7,
    })
}

fn extract_reply(body: &str) -> Result<String, CompletionError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|err| CompletionError::InvalidResponse(err.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(CompletionError::NoContent)
}

fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

#[async_trait]
impl CompletionBackend for ChatCompletionsClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::MissingApiKey)?;
        let payload = build_payload(&self.model, request);
        debug!(model = %self.model, history = request.history.len(), "requesting completion");

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: truncate_for_error(&body, 500),
            });
        }
        extract_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::{build_payload, extract_reply, CompletionError, NO_REPLY_FALLBACK, UNAVAILABLE_FALLBACK};
    use crate::chat::transcript::CompletionRequest;
    use crate::chat::{ChatMessage, ChatMode, ASSISTANT_NAME};
    use crate::map::LatLng;

    #[test]
    fn payload_maps_history_roles_and_location() {
        let request = CompletionRequest {
            history: vec![
                ChatMessage {
                    sender: ASSISTANT_NAME.to_string(),
                    text: "hello".to_string(),
                    mode: ChatMode::Assistant,
                },
                ChatMessage {
                    sender: "sheng".to_string(),
                    text: "hi".to_string(),
                    mode: ChatMode::Assistant,
                },
            ],
            message: "what's near me?".to_string(),
            location: Some(LatLng::new(23.1, 113.2)),
        };

        let payload = build_payload("deepseek-chat", &request);
        let messages = payload["messages"]
            .as_array()
            .expect("messages should be an array");

        assert_eq!(payload["model"], "deepseek-chat");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "user");
        let last = messages[3]["content"].as_str().expect("content should be text");
        assert!(last.contains("latitude 23.1"));
        assert!(last.ends_with("what's near me?"));
    }

    #[test]
    fn reply_is_trimmed_first_choice() {
        let reply = extract_reply(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Sure! [map:广州塔]\n"}}]}"#,
        )
        .expect("reply should parse");
        assert_eq!(reply, "Sure! [map:广州塔]");
    }

    #[test]
    fn empty_choices_fall_back_to_no_reply() {
        let error = extract_reply(r#"{"choices":[]}"#).expect_err("no choices should fail");
        assert!(matches!(error, CompletionError::NoContent));
        assert_eq!(error.fallback_text(), NO_REPLY_FALLBACK);
        assert_eq!(CompletionError::MissingApiKey.fallback_text(), UNAVAILABLE_FALLBACK);
    }
}
