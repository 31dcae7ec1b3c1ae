//! Streaming client for OpenAI-compatible chat-completion endpoints.
//!
//! Requests are sent with `stream: true`; the response is a Server-Sent
//! Events stream of `data: <json>` lines terminated by `data: [DONE]`.
//! Each JSON chunk carries the next piece of the reply in
//! `choices[0].delta.content`.

use anyhow::Result;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::AskError;

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// A system prompt.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// A parsed line of the event stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine<'a> {
    /// `data: <payload>`
    Data(&'a str),
    /// `data: [DONE]`
    Done,
    /// Comments, other fields and blank lines
    Other,
}

pub(crate) fn parse_sse_line(line: &str) -> SseLine<'_> {
    match line.trim_end_matches('\r').strip_prefix("data:") {
        Some(data) if data.trim() == "[DONE]" => SseLine::Done,
        Some(data) => SseLine::Data(data.trim()),
        None => SseLine::Other,
    }
}

/// Reply text carried by one data payload, if any.
pub(crate) fn delta_content(payload: &str) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
    chunk.choices.into_iter().next()?.delta.content
}

/// Client for one chat-completion endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ChatClient {
    /// Client for `api_url` authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// [`AskError::ApiKeyMissing`] when the key is empty.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, user_agent: &str) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AskError::ApiKeyMissing.into());
        }
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key,
        })
    }

    /// Send `messages` to `model` and stream the reply.
    ///
    /// `on_delta` receives each piece of text as it arrives; the full reply
    /// is returned at the end.
    ///
    /// # Errors
    ///
    /// [`AskError::NetworkError`] for transport failures and
    /// [`AskError::ApiError`] for non-success responses.
    pub async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        mut on_delta: impl FnMut(&str),
    ) -> Result<String> {
        let request = ChatRequest {
            model,
            messages,
            stream: true,
        };
        debug!("POST {} (model {}, {} message(s))", self.api_url, model, messages.len());

        let network = |reason: String| AskError::NetworkError {
            operation: "chat request".to_string(),
            reason,
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AskError::ApiError {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let mut reply = String::new();
        // Returns true once the terminator is seen.
        let mut handle = |line: &[u8]| -> bool {
            let line = String::from_utf8_lossy(line);
            match parse_sse_line(&line) {
                SseLine::Done => return true,
                SseLine::Data(payload) => {
                    if let Some(text) = delta_content(payload) {
                        on_delta(&text);
                        reply.push_str(&text);
                    }
                }
                SseLine::Other => {}
            }
            false
        };

        let mut pending: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        let mut done = false;

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network(e.to_string()))?;
            pending.extend_from_slice(&chunk);

            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                if handle(&line[..line.len() - 1]) {
                    done = true;
                    break 'read;
                }
            }
        }

        // A final line without a trailing newline is still part of the stream.
        if !done && !pending.is_empty() {
            handle(&pending);
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: {\"a\":1}"), SseLine::Data("{\"a\":1}"));
        assert_eq!(parse_sse_line("data:[DONE]\r"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Other);
        assert_eq!(parse_sse_line(""), SseLine::Other);
    }

    #[test]
    fn test_delta_content() {
        let payload = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(delta_content(payload).as_deref(), Some("Hi"));
        assert_eq!(delta_content(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(delta_content("not json"), None);
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let err = ChatClient::new("http://localhost", "  ", "ask/test").err().unwrap();
        assert!(matches!(err.downcast_ref::<AskError>(), Some(AskError::ApiKeyMissing)));
    }

    #[tokio::test]
    async fn test_streams_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\", world\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(format!("{}/chat", server.uri()), "sk-test", "ask/test").unwrap();
        let mut pieces = Vec::new();
        let reply = client
            .stream_chat("qwen-plus", &[ChatMessage::user("hi")], |d| pieces.push(d.to_string()))
            .await
            .unwrap();

        assert_eq!(reply, "Hello, world");
        assert_eq!(pieces, vec!["Hello", ", world"]);
    }

    #[tokio::test]
    async fn test_last_line_without_newline_is_kept() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"4\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"2\"}}]}",
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri(), "sk-test", "ask/test").unwrap();
        let reply = client
            .stream_chat("qwen-plus", &[ChatMessage::user("6*7")], |_| {})
            .await
            .unwrap();
        assert_eq!(reply, "42");
    }

    #[tokio::test]
    async fn test_api_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri(), "sk-bad", "ask/test").unwrap();
        let err = client.stream_chat("qwen-plus", &[], |_| {}).await.unwrap_err();
        match err.downcast_ref::<AskError>() {
            Some(AskError::ApiError { status, body }) => {
                assert_eq!(*status, 401);
                assert_eq!(body, "invalid key");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
