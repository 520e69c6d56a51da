//! Network-hosted Gemini backend over the REST streaming API.

use super::sse::{SseEvent, SseParser};
use super::{Availability, ByteStream, DeltaStream, GenerationProvider};
use crate::error::GenerationError;
use crate::types::{BackendKind, Message, Role};
use async_trait::async_trait;
use duet_rs_config::RemoteConfig;
use futures_util::{StreamExt, stream};
use log::{debug, error, info, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Remote backend that streams `streamGenerateContent` responses.
pub struct RemoteBackend {
    client: reqwest::Client,
    /// Read once at construction; fixed for the process lifetime.
    api_key: Option<String>,
    model: String,
    base_url: String,
    system_instruction: String,
}

impl RemoteBackend {
    /// Build a backend with an explicit credential.
    pub fn new(config: &RemoteConfig, api_key: Option<String>) -> Self {
        let api_key = api_key.filter(|key| !key.trim().is_empty());
        info!(
            "configured remote backend (model={}, credential_present={})",
            config.model,
            api_key.is_some()
        );
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            system_instruction: config.system_instruction.clone(),
        }
    }

    /// Build a backend reading the credential from `config.api_key_env`.
    pub fn from_env(config: &RemoteConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                "remote credential not set; cloud mode unavailable (env={})",
                config.api_key_env
            );
        }
        Self::new(config, api_key)
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }

    fn build_request(&self, history: &[Message], prompt: &str) -> GenerateContentRequest {
        let mut contents = transcript(history);
        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        });
        GenerateContentRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: self.system_instruction.clone(),
                }],
            }),
        }
    }
}

#[async_trait]
impl GenerationProvider for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn probe(&self) -> Availability {
        if self.is_configured() {
            Availability::Ready
        } else {
            Availability::Unavailable
        }
    }

    async fn stream(
        &self,
        history: &[Message],
        prompt: &str,
    ) -> Result<DeltaStream, GenerationError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GenerationError::Configuration(
                "API key is missing. Cannot use Cloud mode.".to_string(),
            ));
        };
        let body = self.build_request(history, prompt);
        debug!(
            "opening remote stream (model={}, history_len={}, prompt_len={})",
            self.model,
            body.contents.len() - 1,
            prompt.len()
        );

        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                error!("remote request failed (model={}, error={})", self.model, err);
                GenerationError::Network(format!("Gemini API request failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read Gemini error body".to_string());
            let message = map_http_error(status, &body_text);
            error!(
                "remote request rejected (model={}, status={}, message={})",
                self.model, status, message
            );
            return Err(GenerationError::Network(message));
        }

        let bytes: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|err| err.to_string())),
        );
        Ok(sse_delta_stream(bytes))
    }
}

/// Map session history to Gemini contents, dropping system and error messages.
fn transcript(history: &[Message]) -> Vec<Content> {
    history
        .iter()
        .filter(|message| message.role != Role::System && !message.is_error)
        .map(|message| Content {
            role: Some(
                match message.role {
                    Role::User => "user",
                    _ => "model",
                }
                .to_string(),
            ),
            parts: vec![Part {
                text: message.content().to_string(),
            }],
        })
        .collect()
}

struct SseDeltaState {
    body: ByteStream,
    parser: SseParser,
    ready: VecDeque<Result<String, GenerationError>>,
    finished: bool,
}

impl SseDeltaState {
    fn enqueue(&mut self, event: SseEvent) {
        if event.data.trim() == "[DONE]" {
            return;
        }
        if event.event.as_deref().is_some_and(|kind| kind != "message") {
            debug!("skipping non-message sse event (event={:?})", event.event);
            return;
        }
        match serde_json::from_str::<StreamChunk>(&event.data) {
            Ok(StreamChunk {
                error: Some(error), ..
            }) => {
                let message = error
                    .message
                    .unwrap_or_else(|| "Gemini stream reported an error".to_string());
                self.ready.push_back(Err(GenerationError::Network(message)));
            }
            Ok(chunk) => {
                let text = chunk.text();
                if !text.is_empty() {
                    self.ready.push_back(Ok(text));
                }
            }
            Err(err) => {
                self.ready.push_back(Err(GenerationError::Network(format!(
                    "malformed Gemini stream chunk: {err}"
                ))));
            }
        }
    }
}

/// Convert an SSE response body into a stream of non-empty text fragments.
///
/// The first error terminates the stream.
pub(crate) fn sse_delta_stream(body: ByteStream) -> DeltaStream {
    let state = SseDeltaState {
        body,
        parser: SseParser::new(),
        ready: VecDeque::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                if item.is_err() {
                    state.ready.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for event in state.parser.push(&chunk) {
                        state.enqueue(event);
                    }
                }
                Some(Err(err)) => {
                    state.ready.push_back(Err(GenerationError::Network(format!(
                        "Gemini stream interrupted: {err}"
                    ))));
                }
                None => {
                    if let Some(event) = state.parser.finish() {
                        state.enqueue(event);
                    }
                    state.finished = true;
                }
            }
        }
    }))
}

/// Turn a non-success response into the upstream error message.
fn map_http_error(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|wrapper| wrapper.error.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("Gemini API returned {status}"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

impl StreamChunk {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageBody;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uuid::Uuid;

    fn body(chunks: Vec<Result<&str, &str>>) -> ByteStream {
        let items: Vec<Result<Vec<u8>, String>> = chunks
            .into_iter()
            .map(|chunk| {
                chunk
                    .map(|text| text.as_bytes().to_vec())
                    .map_err(str::to_string)
            })
            .collect();
        Box::pin(stream::iter(items))
    }

    fn text_event(text: &str) -> String {
        format!(
            "data: {}\r\n\r\n",
            json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
        )
    }

    fn backend(api_key: Option<&str>) -> RemoteBackend {
        RemoteBackend::new(&RemoteConfig::default(), api_key.map(str::to_string))
    }

    #[tokio::test]
    async fn yields_text_fragments_and_skips_empty_ones() {
        let first = text_event("Hello");
        let empty = text_event("");
        let second = text_event(" world");
        let joined = format!("{first}{empty}{second}");
        let (a, b) = joined.split_at(17);
        let deltas: Vec<_> = sse_delta_stream(body(vec![Ok(a), Ok(b)])).collect().await;
        assert_eq!(deltas, vec![Ok("Hello".to_string()), Ok(" world".to_string())]);
    }

    #[tokio::test]
    async fn transport_error_terminates_stream() {
        let first = text_event("partial");
        let deltas: Vec<_> = sse_delta_stream(body(vec![
            Ok(first.as_str()),
            Err("connection reset"),
            Ok(text_event("never").as_str()),
        ]))
        .collect()
        .await;
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0], Ok("partial".to_string()));
        assert!(matches!(
            &deltas[1],
            Err(GenerationError::Network(message)) if message.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn inline_error_payload_maps_to_network_error() {
        let event = format!(
            "data: {}\n\n",
            json!({ "error": { "code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED" } })
        );
        let deltas: Vec<_> = sse_delta_stream(body(vec![Ok(event.as_str())])).collect().await;
        assert_eq!(
            deltas,
            vec![Err(GenerationError::Network("Resource exhausted".to_string()))]
        );
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let backend = backend(None);
        assert!(!backend.is_configured());
        assert_eq!(backend.probe().await, Availability::Unavailable);
        let err = match backend.stream(&[], "hi").await {
            Err(err) => err,
            Ok(_) => panic!("expected configuration error"),
        };
        assert!(matches!(err, GenerationError::Configuration(_)));
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        assert!(!backend(Some("  ")).is_configured());
        assert!(backend(Some("key")).is_configured());
    }

    #[test]
    fn request_excludes_system_and_error_messages() {
        let history = vec![
            Message::user("hi"),
            Message::model(Uuid::new_v4(), "hello", 2),
            Message {
                id: Uuid::new_v4(),
                role: Role::System,
                body: MessageBody::Final("internal".to_string()),
                timestamp: 3,
                is_error: false,
            },
            Message::error("boom"),
        ];
        let request = backend(Some("key")).build_request(&history, "next");
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value["contents"],
            json!([
                { "role": "user", "parts": [{ "text": "hi" }] },
                { "role": "model", "parts": [{ "text": "hello" }] },
                { "role": "user", "parts": [{ "text": "next" }] },
            ])
        );
        assert_eq!(
            value["systemInstruction"]["parts"][0]["text"],
            json!(RemoteConfig::default().system_instruction)
        );
    }

    #[test]
    fn http_errors_prefer_upstream_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            map_http_error(StatusCode::BAD_REQUEST, body),
            "API key not valid."
        );
        assert_eq!(
            map_http_error(StatusCode::BAD_GATEWAY, "<html>"),
            "Gemini API returned 502 Bad Gateway"
        );
    }
}
