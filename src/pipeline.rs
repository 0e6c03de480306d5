//! Streaming chat pipeline: one prompt in, a stream of cumulative text out.

use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use std::future::Future;

use crate::config::Config;
use crate::decoder::{LineBuffer, StreamDecoder, decoder_for};
use crate::prompt::{ChatRequest, build_request};

/// What a running request reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Everything received so far, not just the newest delta.
    Chunk(String),
    /// The body ended. Carries the full reply.
    Completed(String),
    /// The request failed. Carries a message fit for the transcript.
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("API Error: {0}")]
    Status(String),
}

pub struct ChatPipeline {
    client: Client,
    config: Config,
}

impl ChatPipeline {
    pub fn new(config: Config) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send `prompt` and stream the reply. The stream always ends with exactly
    /// one `Completed` or `Failed` event.
    pub fn stream(&self, prompt: &str) -> BoxStream<'static, PipelineEvent> {
        let client = self.client.clone();
        let config = self.config.clone();
        let request = build_request(&config, prompt);

        Box::pin(async_stream::stream! {
            tracing::info!(
                provider = %config.provider,
                model = %config.model,
                url = %request.url,
                "sending prompt"
            );

            let response = match send(&client, &request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = %e, "request failed");
                    yield PipelineEvent::Failed(failure_message(&config, &e));
                    return;
                }
            };

            let decoder = decoder_for(config.provider);
            let mut lines = LineBuffer::new();
            let mut accumulated = String::new();
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let e = PipelineError::from(e);
                        tracing::error!(error = %e, "response body failed");
                        yield PipelineEvent::Failed(failure_message(&config, &e));
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    if let Some(delta) = decode(decoder.as_ref(), &line) {
                        accumulated.push_str(&delta);
                        yield PipelineEvent::Chunk(accumulated.clone());
                    }
                }
            }

            if let Some(tail) = lines.finish()
                && let Some(delta) = decode(decoder.as_ref(), &tail)
            {
                accumulated.push_str(&delta);
                yield PipelineEvent::Chunk(accumulated.clone());
            }

            tracing::info!(chars = accumulated.chars().count(), "stream complete");
            yield PipelineEvent::Completed(accumulated);
        })
    }

    /// Callback form of [`ChatPipeline::stream`]. `on_chunk` gets the
    /// cumulative text and is awaited before the next line is read;
    /// `on_complete` runs once, with `None` after a failure (in which case
    /// `on_chunk` has already received the error message).
    pub async fn run<F, Fut, G>(&self, prompt: &str, mut on_chunk: F, on_complete: G)
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = ()>,
        G: FnOnce(Option<String>),
    {
        let mut events = self.stream(prompt);
        while let Some(event) = events.next().await {
            match event {
                PipelineEvent::Chunk(text) => on_chunk(text).await,
                PipelineEvent::Completed(text) => {
                    on_complete(Some(text));
                    return;
                }
                PipelineEvent::Failed(message) => {
                    on_chunk(message).await;
                    on_complete(None);
                    return;
                }
            }
        }
    }
}

async fn send(client: &Client, request: &ChatRequest) -> Result<reqwest::Response, PipelineError> {
    let response = client.post(&request.url).json(&request.body).send().await?;

    let status = response.status();
    if !status.is_success() {
        let reason = status
            .canonical_reason()
            .map(String::from)
            .unwrap_or_else(|| status.as_str().to_string());
        return Err(PipelineError::Status(reason));
    }
    Ok(response)
}

fn decode(decoder: &dyn StreamDecoder, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match decoder.decode_line(line) {
        Ok(Some(delta)) if !delta.is_empty() => Some(delta),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "skipping stream line");
            None
        }
    }
}

/// The inline error shown in place of a reply.
pub fn failure_message(config: &Config, error: &PipelineError) -> String {
    format!(
        "Error: {}. Please check your connection to {}.",
        error, config.provider
    )
}
