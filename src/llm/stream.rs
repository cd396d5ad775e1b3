//! Accumulates a streamed generative-language response into display text.
//!
//! Each SSE event carries a delta, so the running answer is the concatenation
//! of every event's text. A leading role label is held back until it can no
//! longer change, so every update's `delta` extends the previous `text`.

use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::extract::{
    Extraction, extract_response, extract_stream_text, role_prefix_unsettled, strip_role_prefix,
};
use super::provider::TextStream;
use super::sse::SseParser;
use super::types::GenerateContentResponse;
use crate::error::LlmError;

/// Progress reported while a reply streams in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUpdate {
    /// Display text appended since the previous update.
    pub delta: String,
    /// Full display text so far.
    pub text: String,
}

/// Error payload carried inside a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    /// Status code from the error body, when present.
    pub code: Option<u16>,
    pub message: String,
}

impl StreamError {
    fn into_llm_error(self, provider: &str) -> LlmError {
        match self.code {
            Some(status) => LlmError::Api {
                provider: provider.to_string(),
                status,
                message: self.message,
            },
            None => LlmError::RequestFailed {
                provider: provider.to_string(),
                reason: self.message,
            },
        }
    }
}

/// Incremental state for one streamed reply.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    raw: String,
    pending_bytes: Vec<u8>,
    parser: SseParser,
    answer: String,
    /// Bytes of `answer` taken by a role label, fixed once it settles.
    prefix_len: Option<usize>,
    shown_len: usize,
    error: Option<StreamError>,
    events: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the network. A trailing partial UTF-8 sequence is
    /// held back until the next chunk completes it.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<Option<StreamUpdate>, LlmError> {
        self.pending_bytes.extend_from_slice(bytes);

        let decoded = match std::str::from_utf8(&self.pending_bytes) {
            Ok(s) => {
                let s = s.to_string();
                self.pending_bytes.clear();
                s
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let tail = self.pending_bytes.split_off(valid);
                let head = std::mem::replace(&mut self.pending_bytes, tail);
                String::from_utf8_lossy(&head).into_owned()
            }
            Err(_) => {
                let lossy = String::from_utf8_lossy(&self.pending_bytes).into_owned();
                self.pending_bytes.clear();
                lossy
            }
        };

        self.push_str(&decoded)
    }

    /// Feed decoded text.
    pub fn push_str(&mut self, chunk: &str) -> Result<Option<StreamUpdate>, LlmError> {
        if chunk.is_empty() {
            return Ok(None);
        }
        self.raw.push_str(chunk);
        for event in self.parser.feed_str(chunk)? {
            if !event.is_done() {
                self.apply_payload(&event.data);
            }
        }
        Ok(self.take_update(false))
    }

    /// Flush trailing data once the network stream has ended. Any role label
    /// still held back is settled here.
    pub fn finish(&mut self) -> Option<StreamUpdate> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_bytes.clear();
            self.raw.push_str(&tail);
            if let Ok(events) = self.parser.feed_str(&tail) {
                for event in events {
                    self.apply_payload(&event.data);
                }
            }
        }
        if let Some(event) = self.parser.finish().filter(|e| !e.is_done()) {
            self.apply_payload(&event.data);
        }

        // Nothing came through as events: the body may be plain JSON.
        if self.events == 0 {
            let body = self.raw.trim().to_string();
            if body.starts_with('{') {
                self.apply_payload(&body);
            } else {
                let fallback = self.snapshot();
                if let Some(message) = fallback.strip_prefix("Error: ") {
                    self.record_error(None, message.to_string());
                } else if !fallback.is_empty() {
                    self.answer = fallback;
                }
            }
        }

        self.take_update(true)
    }

    /// Latest-payload view of the raw buffer.
    pub fn snapshot(&self) -> String {
        extract_stream_text(&self.raw)
    }

    /// Display text reported so far.
    pub fn text(&self) -> &str {
        &self.answer[self.prefix_len.unwrap_or(0)..][..self.shown_len]
    }

    /// First error encoded in the stream, if any.
    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    fn apply_payload(&mut self, payload: &str) {
        let response = match serde_json::from_str::<GenerateContentResponse>(payload) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, len = payload.len(), "Skipping unparseable stream event");
                return;
            }
        };
        match extract_response(&response) {
            Extraction::Text(text) => {
                self.events += 1;
                self.answer.push_str(&text);
            }
            Extraction::Error(message) => {
                self.events += 1;
                let code = response.error.as_ref().and_then(|e| e.code);
                self.record_error(code, message);
            }
            Extraction::Pending => {
                debug!(raw_len = self.raw.len(), "Stream event without text");
            }
        }
    }

    fn record_error(&mut self, code: Option<u16>, message: String) {
        if self.error.is_none() {
            warn!(error = %message, code = ?code, "Stream payload reported an error");
            self.error = Some(StreamError { code, message });
        }
    }

    fn take_update(&mut self, at_end: bool) -> Option<StreamUpdate> {
        let prefix_len = match self.prefix_len {
            Some(len) => len,
            None if !at_end && role_prefix_unsettled(&self.answer) => return None,
            None => {
                let len = self.answer.len() - strip_role_prefix(&self.answer).len();
                self.prefix_len = Some(len);
                len
            }
        };

        let text = &self.answer[prefix_len..];
        if text.len() <= self.shown_len {
            return None;
        }
        let delta = text[self.shown_len..].to_string();
        self.shown_len = text.len();
        Some(StreamUpdate {
            delta,
            text: text.to_string(),
        })
    }
}

struct Driver<S> {
    inner: S,
    acc: StreamAccumulator,
    provider: &'static str,
    inner_done: bool,
    finished: bool,
}

/// Turn a raw byte stream into a [`TextStream`].
///
/// Yields one update per growth of the display text. An error encoded in the
/// stream ends it, after any text still pending, with `LlmError::Api` when
/// the error carries a status code and `LlmError::RequestFailed` otherwise.
/// A stream that ends without any text ends with `LlmError::InvalidResponse`.
pub fn into_text_stream<S, B, E>(inner: S, provider: &'static str) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let driver = Driver {
        inner,
        acc: StreamAccumulator::new(),
        provider,
        inner_done: false,
        finished: false,
    };

    let stream = futures::stream::unfold(driver, |mut d| async move {
        if d.finished {
            return None;
        }
        loop {
            if let Some(error) = d.acc.error().cloned() {
                if let Some(update) = d.acc.take_update(true) {
                    return Some((Ok(update), d));
                }
                d.finished = true;
                return Some((Err(error.into_llm_error(d.provider)), d));
            }

            if d.inner_done {
                d.finished = true;
                if d.acc.text().is_empty() {
                    let err = LlmError::InvalidResponse {
                        provider: d.provider.to_string(),
                        reason: "stream ended without any text".to_string(),
                    };
                    return Some((Err(err), d));
                }
                return None;
            }

            match d.inner.next().await {
                Some(Ok(chunk)) => match d.acc.push_bytes(chunk.as_ref()) {
                    Ok(Some(update)) => return Some((Ok(update), d)),
                    Ok(None) => {}
                    Err(e) => {
                        d.finished = true;
                        return Some((Err(e), d));
                    }
                },
                Some(Err(e)) => {
                    d.finished = true;
                    return Some((Err(LlmError::Stream(e.to_string())), d));
                }
                None => {
                    d.inner_done = true;
                    if let Some(update) = d.acc.finish() {
                        return Some((Ok(update), d));
                    }
                }
            }
        }
    });

    Box::pin(stream)
}
