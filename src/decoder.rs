//! Provider framing: turning streamed response lines into text deltas.

use serde::Deserialize;

use crate::config::Provider;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed stream line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a `data: ` line, got {0:?}")]
    MissingPrefix(String),
}

/// Extracts the text delta, if any, carried by one non-blank line of a
/// streamed response.
pub trait StreamDecoder: Send {
    fn decode_line(&self, line: &str) -> Result<Option<String>, DecodeError>;
}

pub fn decoder_for(provider: Provider) -> Box<dyn StreamDecoder> {
    match provider {
        Provider::Ollama => Box::new(OllamaDecoder),
        Provider::LmStudio => Box::new(OpenAiCompatDecoder),
    }
}

/// Ollama `/api/generate`: one JSON object per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct OllamaDecoder;

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

impl StreamDecoder for OllamaDecoder {
    fn decode_line(&self, line: &str) -> Result<Option<String>, DecodeError> {
        let chunk: GenerateChunk = serde_json::from_str(line)?;
        // The final summary line is skipped; end of stream is end of body.
        if chunk.done {
            return Ok(None);
        }
        Ok(chunk.response)
    }
}

/// OpenAI-compatible `/chat/completions` server-sent events.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiCompatDecoder;

const SSE_DATA_PREFIX: &str = "data: ";
const SSE_DONE: &str = "[DONE]";

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl StreamDecoder for OpenAiCompatDecoder {
    fn decode_line(&self, line: &str) -> Result<Option<String>, DecodeError> {
        let data = line
            .strip_prefix(SSE_DATA_PREFIX)
            .ok_or_else(|| DecodeError::MissingPrefix(line.to_string()))?;
        if data.trim() == SSE_DONE {
            return Ok(None);
        }
        let chunk: CompletionChunk = serde_json::from_str(data)?;
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content))
    }
}

/// Splits a byte stream into lines. Bytes are held until their newline
/// arrives, so neither a line nor a multi-byte character is ever cut at a
/// chunk boundary.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed (without the newline).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&tail).trim_end_matches('\r').to_string())
    }
}
