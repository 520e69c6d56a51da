//! Local runtime backed by an Ollama-compatible server on the loopback interface.

use super::local::{LocalModelSession, LocalRuntime, LocalRuntimeError, SnapshotStream};
use super::{Availability, ByteStream};
use async_trait::async_trait;
use duet_rs_config::LocalConfig;
use futures_util::{StreamExt, stream};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Runtime that generates with a model served by a local Ollama daemon.
pub struct OllamaRuntime {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaRuntime {
    pub fn new(config: &LocalConfig) -> Self {
        info!(
            "configured local runtime (endpoint={}, model={})",
            config.endpoint, config.model
        );
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl LocalRuntime for OllamaRuntime {
    async fn availability(&self) -> Result<Availability, LocalRuntimeError> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = match self
            .client
            .get(&url)
            .timeout(AVAILABILITY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!("local runtime unreachable (url={url}, error={err})");
                return Ok(Availability::Unavailable);
            }
        };
        if !response.status().is_success() {
            return Err(LocalRuntimeError::Failed(format!(
                "model listing returned {}",
                response.status()
            )));
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|err| LocalRuntimeError::Failed(format!("malformed model listing: {err}")))?;
        let availability = availability_from_tags(&self.model, &tags);
        if availability == Availability::AfterDownload {
            warn!(
                "local model is not installed; run `{}` before generating (endpoint={})",
                pull_command(&self.model),
                self.endpoint
            );
        }
        Ok(availability)
    }

    async fn create_session(
        &self,
        system_prompt: &str,
    ) -> Result<Box<dyn LocalModelSession>, LocalRuntimeError> {
        Ok(Box::new(OllamaSession {
            client: self.client.clone(),
            url: format!("{}/api/generate", self.endpoint),
            model: self.model.clone(),
            system_prompt: system_prompt.to_string(),
            destroyed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

fn availability_from_tags(model: &str, tags: &TagsResponse) -> Availability {
    let installed = tags.models.iter().any(|entry| {
        entry.name == model
            || entry.name.strip_suffix(":latest") == Some(model)
            || (!model.contains(':') && entry.name == format!("{model}:latest"))
    });
    if installed {
        Availability::Ready
    } else {
        Availability::AfterDownload
    }
}

/// Shell command that installs `model` into the local daemon.
fn pull_command(model: &str) -> String {
    format!("ollama pull {model}")
}

struct OllamaSession {
    client: reqwest::Client,
    url: String,
    model: String,
    system_prompt: String,
    /// Set by `destroy`; outstanding streams stop at their next poll.
    destroyed: Arc<AtomicBool>,
}

impl LocalModelSession for OllamaSession {
    fn prompt_streaming(&mut self, prompt: &str) -> SnapshotStream {
        let request = self.client.post(&self.url).json(&GenerateRequest {
            model: &self.model,
            prompt,
            system: &self.system_prompt,
            stream: true,
        });
        let state = GenerateState {
            request: Some(request),
            body: None,
            buffer: Vec::new(),
            text: String::new(),
            destroyed: self.destroyed.clone(),
            finished: false,
        };
        Box::pin(stream::unfold(state, |mut state| async move {
            let item = state.next_snapshot().await?;
            Some((item, state))
        }))
    }

    fn destroy(&mut self) {
        self.destroyed.store(true, Ordering::SeqCst);
        debug!("local model session closed (model={})", self.model);
    }
}

struct GenerateState {
    request: Option<reqwest::RequestBuilder>,
    body: Option<ByteStream>,
    buffer: Vec<u8>,
    /// Cumulative generated text.
    text: String,
    destroyed: Arc<AtomicBool>,
    finished: bool,
}

impl GenerateState {
    async fn next_snapshot(&mut self) -> Option<Result<String, LocalRuntimeError>> {
        loop {
            if self.finished || self.destroyed.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(request) = self.request.take() {
                if let Err(err) = self.open(request).await {
                    self.finished = true;
                    return Some(Err(err));
                }
                continue;
            }
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                if let Some(item) = self.handle_line(&line) {
                    return Some(item);
                }
                continue;
            }
            let Some(body) = self.body.as_mut() else {
                return None;
            };
            match body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(LocalRuntimeError::Failed(format!(
                        "generation stream interrupted: {err}"
                    ))));
                }
                None => {
                    self.finished = true;
                    let rest = std::mem::take(&mut self.buffer);
                    return self.handle_line(&rest);
                }
            }
        }
    }

    async fn open(&mut self, request: reqwest::RequestBuilder) -> Result<(), LocalRuntimeError> {
        let response = request
            .send()
            .await
            .map_err(|err| LocalRuntimeError::Failed(format!("generate request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<GenerateChunk>(&body)
                .ok()
                .and_then(|chunk| chunk.error)
                .unwrap_or(body);
            return Err(LocalRuntimeError::Failed(format!(
                "generate returned {status}: {detail}"
            )));
        }
        self.body = Some(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|err| err.to_string())),
        ));
        Ok(())
    }

    /// Fold one NDJSON line into the cumulative text.
    fn handle_line(&mut self, line: &[u8]) -> Option<Result<String, LocalRuntimeError>> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let chunk: GenerateChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(err) => {
                self.finished = true;
                return Some(Err(LocalRuntimeError::Failed(format!(
                    "malformed generate chunk: {err}"
                ))));
            }
        };
        if let Some(error) = chunk.error {
            self.finished = true;
            return Some(Err(LocalRuntimeError::Failed(error)));
        }
        if chunk.done {
            self.finished = true;
        }
        match chunk.response {
            Some(fragment) if !fragment.is_empty() => {
                self.text.push_str(&fragment);
                Some(Ok(self.text.clone()))
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tags(names: &[&str]) -> TagsResponse {
        TagsResponse {
            models: names
                .iter()
                .map(|name| TagEntry {
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    fn state_with_body(chunks: Vec<&str>) -> GenerateState {
        let items: Vec<Result<Vec<u8>, String>> = chunks
            .into_iter()
            .map(|chunk| Ok(chunk.as_bytes().to_vec()))
            .collect();
        GenerateState {
            request: None,
            body: Some(Box::pin(stream::iter(items))),
            buffer: Vec::new(),
            text: String::new(),
            destroyed: Arc::new(AtomicBool::new(false)),
            finished: false,
        }
    }

    async fn drain(mut state: GenerateState) -> Vec<Result<String, LocalRuntimeError>> {
        let mut items = Vec::new();
        while let Some(item) = state.next_snapshot().await {
            items.push(item);
        }
        items
    }

    #[test]
    fn availability_matches_installed_tags() {
        assert_eq!(
            availability_from_tags("gemma3:1b", &tags(&["gemma3:1b"])),
            Availability::Ready
        );
        assert_eq!(
            availability_from_tags("llama3", &tags(&["llama3:latest"])),
            Availability::Ready
        );
        assert_eq!(
            availability_from_tags("gemma3:1b", &tags(&["llama3:latest"])),
            Availability::AfterDownload
        );
    }

    #[test]
    fn missing_model_hint_names_pull_command() {
        assert_eq!(pull_command("gemma3:1b"), "ollama pull gemma3:1b");
    }

    #[tokio::test]
    async fn ndjson_fragments_accumulate_into_snapshots() {
        let state = state_with_body(vec![
            "{\"response\":\"Hi\",\"done\":false}\n{\"resp",
            "onse\":\" there\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
        ]);
        let items = drain(state).await;
        assert_eq!(items, vec![Ok("Hi".to_string()), Ok("Hi there".to_string())]);
    }

    #[tokio::test]
    async fn error_line_ends_the_stream() {
        let state = state_with_body(vec![
            "{\"response\":\"Hi\"}\n",
            "{\"error\":\"model crashed\"}\n",
            "{\"response\":\"never\"}\n",
        ]);
        let items = drain(state).await;
        assert_eq!(
            items,
            vec![
                Ok("Hi".to_string()),
                Err(LocalRuntimeError::Failed("model crashed".to_string()))
            ]
        );
    }

    #[tokio::test]
    async fn destroyed_session_stops_streaming() {
        let state = state_with_body(vec!["{\"response\":\"Hi\"}\n"]);
        state.destroyed.store(true, Ordering::SeqCst);
        assert_eq!(drain(state).await, Vec::new());
    }
}
