use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;
use crate::services::completion::{
    CompletionClient, CompletionSender, CompletionStream, UpstreamError,
};
use crate::utils::limiters::Limiters;
use anyhow::Result;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
}

// Local response structs
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChoiceChunk>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceChunk {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

/// One `data:` line of the upstream event stream, decoded.
#[derive(Debug, PartialEq)]
enum SseFrame {
    /// Not a data line (comments, `event:` fields, blank separators)
    Ignored,
    Delta {
        content: Option<String>,
        finished: bool,
    },
    /// `data: [DONE]`
    End,
    Malformed(String),
}

fn parse_sse_line(line: &str) -> SseFrame {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseFrame::Ignored;
    };
    let payload = payload.trim();

    if payload == "[DONE]" {
        return SseFrame::End;
    }

    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => match chunk.choices.into_iter().next() {
            Some(choice) => SseFrame::Delta {
                content: choice.delta.content.filter(|c| !c.is_empty()),
                finished: choice.finish_reason.map_or(false, |r| !r.is_empty()),
            },
            None => SseFrame::Delta {
                content: None,
                finished: false,
            },
        },
        Err(e) => SseFrame::Malformed(e.to_string()),
    }
}

/// Reassembles lines from network chunks that may split them anywhere.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&raw).trim().to_string());
        }
        lines
    }

    /// Trailing line without a newline at end of body.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }
}

enum Flow {
    Continue,
    Stop,
}

#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
    limiters: Arc<Limiters>,
}

impl LlmService {
    pub fn new(config: LlmConfig, limiters: Arc<Limiters>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            limiters,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Producer task body: owns the permit and the upstream connection for the whole call.
    async fn produce(self, request: ChatCompletionRequest, api_key: String, tx: CompletionSender) {
        let (_permit, waited) = match Limiters::acquire_timed(
            self.limiters.llm_stream.clone(),
            self.limiters.acquire_timeout,
            "llm_stream",
        )
        .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!("Completion call rejected: {}", e);
                tx.fail(UpstreamError::Busy(e.to_string())).await;
                return;
            }
        };

        debug!(
            "Starting completion stream: messages={}, max_tokens={}, limiter_wait={:?}",
            request.messages.len(),
            request.max_tokens,
            waited
        );

        match self.forward(&request, &api_key, &tx).await {
            Ok(fragments) => {
                info!("Completion stream finished: fragments={}", fragments);
                tx.finish().await;
            }
            Err(e) => {
                warn!("Completion stream failed: {}", e);
                tx.fail(e).await;
            }
        }
    }

    /// Sends the request and forwards every content delta; returns the fragment count.
    async fn forward(
        &self,
        request: &ChatCompletionRequest,
        api_key: &str,
        tx: &CompletionSender,
    ) -> Result<usize, UpstreamError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("accept", "application/json")
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let idle_secs = self.config.stream_idle_timeout_seconds.max(1);
        let idle = Duration::from_secs(idle_secs);
        let mut body = response.bytes_stream();
        let mut buffer = SseLineBuffer::default();
        let mut fragments = 0usize;

        loop {
            let next = tokio::time::timeout(idle, body.next())
                .await
                .map_err(|_| UpstreamError::IdleTimeout(idle_secs))?;

            let (lines, at_eof) = match next {
                Some(Ok(bytes)) => (buffer.push(&bytes), false),
                Some(Err(e)) => {
                    return Err(UpstreamError::Transport(format!("Stream error: {}", e)));
                }
                None => (buffer.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for line in &lines {
                match Self::handle_line(line, tx, &mut fragments).await {
                    Flow::Continue => {}
                    Flow::Stop => return Ok(fragments),
                }
            }

            if at_eof || tx.is_disconnected() {
                return Ok(fragments);
            }
        }
    }

    async fn handle_line(line: &str, tx: &CompletionSender, fragments: &mut usize) -> Flow {
        match parse_sse_line(line) {
            SseFrame::Ignored => Flow::Continue,
            SseFrame::End => Flow::Stop,
            SseFrame::Malformed(e) => {
                warn!("Skipping malformed completion frame: {}", e);
                Flow::Continue
            }
            SseFrame::Delta { content, finished } => {
                if let Some(content) = content {
                    if !tx.fragment(content).await {
                        debug!("Completion reader dropped, releasing upstream connection");
                        return Flow::Stop;
                    }
                    *fragments += 1;
                }
                if finished {
                    Flow::Stop
                } else {
                    Flow::Continue
                }
            }
        }
    }
}

impl CompletionClient for LlmService {
    fn stream(&self, messages: Vec<ChatMessage>, max_tokens: usize) -> CompletionStream {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => return CompletionStream::failed(UpstreamError::MissingCredential),
        };

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            stream: true,
        };

        let (tx, rx) = CompletionStream::channel();
        tokio::spawn(self.clone().produce(request, api_key, tx));
        rx
    }
}
