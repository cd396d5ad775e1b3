//! Incremental stream text extraction.
//!
//! The caller owns the network stream and keeps appending whatever it has
//! received to one buffer. [`extract_stream_text`] is a pure function of that
//! buffer: it returns the best display text available so far, an empty string
//! when nothing is ready yet, or an `Error: ...` string when the payload
//! encodes an error. Parse failures are never propagated; the next chunk may
//! complete the JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::trace;

use super::types::GenerateContentResponse;

/// Marker that prefixes payload lines in a server-sent-event stream.
pub const DATA_MARKER: &str = "data:";

/// Finish reasons that mean the model refused to produce text.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Role labels the model sometimes echoes before its answer.
const ROLE_LABELS: &[&str] = &["assistant", "ai", "model", "bot", "taskmaster", "taskmaster ai"];

static ROLE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:assistant|ai|model|bot|taskmaster(?:\s+ai)?)\s*:[ \t]*")
        .expect("role prefix regex is valid")
});

/// Outcome of extracting one structured payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Text content of the first candidate.
    Text(String),
    /// Nothing displayable yet (partial JSON, or a chunk without text).
    Pending,
    /// The payload encodes an error.
    Error(String),
}

impl Extraction {
    /// Render as display text: the text itself, `""`, or `Error: <message>`.
    pub fn into_display(self) -> String {
        match self {
            Self::Text(text) => strip_role_prefix(&text).to_string(),
            Self::Pending => String::new(),
            Self::Error(message) => format!("Error: {}", message),
        }
    }
}

/// Best display text for everything received so far.
pub fn extract_stream_text(buffer: &str) -> String {
    if let Some(payload) = last_data_payload(buffer) {
        return extract_payload(payload).into_display();
    }

    // No event framing: the body may be a plain JSON object (error responses)
    // or a JSON array of chunks (array-framed streaming).
    let trimmed = buffer.trim();
    if trimmed.starts_with('{') {
        return extract_payload(trimmed).into_display();
    }
    if trimmed.starts_with('[') {
        return extract_array(trimmed).into_display();
    }
    String::new()
}

/// Extract from a single JSON payload (one event body).
pub fn extract_payload(payload: &str) -> Extraction {
    match serde_json::from_str::<GenerateContentResponse>(payload) {
        Ok(response) => extract_response(&response),
        Err(e) => {
            trace!(error = %e, len = payload.len(), "Payload not parseable yet");
            Extraction::Pending
        }
    }
}

/// Remove a leading role label such as `Assistant:` from model output.
pub fn strip_role_prefix(text: &str) -> &str {
    match ROLE_PREFIX.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Whether more text could still change what [`strip_role_prefix`] removes
/// from `text`: it is blank, a partial label, or a label with nothing after it.
pub fn role_prefix_unsettled(text: &str) -> bool {
    let rest = strip_role_prefix(text);
    if rest.len() != text.len() {
        return rest.trim().is_empty();
    }
    let head = text.trim().to_ascii_lowercase();
    head.is_empty() || ROLE_LABELS.iter().any(|label| label.starts_with(head.as_str()))
}

fn last_data_payload(buffer: &str) -> Option<&str> {
    buffer.lines().rev().find_map(|line| {
        let payload = line.trim_start().strip_prefix(DATA_MARKER)?.trim();
        (!payload.is_empty() && payload != "[DONE]").then_some(payload)
    })
}

fn extract_array(body: &str) -> Extraction {
    let items: Vec<Value> = match serde_json::from_str(body) {
        Ok(items) => items,
        Err(e) => {
            trace!(error = %e, "Array body not parseable yet");
            return Extraction::Pending;
        }
    };
    match items.into_iter().rev().find(Value::is_object) {
        Some(last) => match serde_json::from_value::<GenerateContentResponse>(last) {
            Ok(response) => extract_response(&response),
            Err(_) => Extraction::Pending,
        },
        None => Extraction::Pending,
    }
}

/// Classify an already-parsed response.
pub fn extract_response(response: &GenerateContentResponse) -> Extraction {
    if let Some(error) = &response.error {
        return Extraction::Error(error.describe());
    }

    if let Some(candidate) = response.candidates.first() {
        if let Some(text) = candidate.text() {
            return Extraction::Text(text);
        }
        if let Some(reason) = candidate
            .finish_reason
            .as_deref()
            .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
        {
            return Extraction::Error(format!("response blocked ({})", reason));
        }
    }

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Extraction::Error(format!("prompt blocked ({})", reason));
    }

    Extraction::Pending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_sse_payload() {
        let buf = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#;
        assert_eq!(extract_stream_text(buf), "Hello");
    }

    #[test]
    fn truncated_payload_is_empty() {
        let buf = r#"data: {"candidates":[{"content":{"parts":[{"te"#;
        assert_eq!(extract_stream_text(buf), "");
    }

    #[test]
    fn plain_error_body() {
        let buf = r#"{"error":{"message":"quota exceeded"}}"#;
        assert_eq!(extract_stream_text(buf), "Error: quota exceeded");
    }

    #[test]
    fn error_inside_event() {
        let buf = "data: {\"error\":{\"code\":503,\"message\":\"overloaded\",\"status\":\"UNAVAILABLE\"}}\n\n";
        assert_eq!(extract_stream_text(buf), "Error: overloaded");
    }

    #[test]
    fn uses_last_data_line() {
        let buf = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"first\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"second\"}]}}]}\n\n",
        );
        assert_eq!(extract_stream_text(buf), "second");
    }

    #[test]
    fn partial_last_line_does_not_fall_back_to_previous() {
        let buf = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"first\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"pa",
        );
        assert_eq!(extract_stream_text(buf), "");
    }

    #[test]
    fn done_marker_and_comments_skipped() {
        let buf = concat!(
            ": keep-alive\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]}}]}\r\n\r\n",
            "data: [DONE]\n\n",
        );
        assert_eq!(extract_stream_text(buf), "ok");
    }

    #[test]
    fn role_prefix_trimmed() {
        let buf = r#"data: {"candidates":[{"content":{"parts":[{"text":"Assistant: Sure thing"}]}}]}"#;
        assert_eq!(extract_stream_text(buf), "Sure thing");
        assert_eq!(strip_role_prefix("TaskMaster AI:  hi"), "hi");
        assert_eq!(strip_role_prefix("model:\tok"), "ok");
        assert_eq!(strip_role_prefix("The AI: a primer"), "The AI: a primer");
        assert_eq!(strip_role_prefix("plain"), "plain");
    }

    #[test]
    fn unsettled_role_prefixes() {
        assert!(role_prefix_unsettled(""));
        assert!(role_prefix_unsettled("  "));
        assert!(role_prefix_unsettled("A"));
        assert!(role_prefix_unsettled("Task"));
        assert!(role_prefix_unsettled("TaskMaster A"));
        assert!(role_prefix_unsettled("AI"));
        assert!(role_prefix_unsettled("AI: "));
        assert!(!role_prefix_unsettled("AI: sure"));
        assert!(!role_prefix_unsettled("A quick plan"));
        assert!(!role_prefix_unsettled("Hello"));
        assert!(!role_prefix_unsettled("AI:\nHi"));
    }

    #[test]
    fn text_without_prefix_is_exact() {
        let buf = r#"data: {"candidates":[{"content":{"parts":[{"text":"  spaced out \n"}]}}]}"#;
        assert_eq!(extract_stream_text(buf), "  spaced out \n");
    }

    #[test]
    fn array_framed_body() {
        let buf = r#"[{"candidates":[{"content":{"parts":[{"text":"a"}]}}]},
                      {"candidates":[{"content":{"parts":[{"text":"b"}]}}]}]"#;
        assert_eq!(extract_stream_text(buf), "b");
        assert_eq!(extract_stream_text(r#"[{"candidates":[{"con"#), "");
        assert_eq!(
            extract_stream_text(r#"[{"error":{"code":400,"message":"bad key"}}]"#),
            "Error: bad key"
        );
    }

    #[test]
    fn blocked_responses_are_errors() {
        let buf = r#"data: {"candidates":[{"finishReason":"SAFETY"}]}"#;
        assert_eq!(extract_stream_text(buf), "Error: response blocked (SAFETY)");

        let buf = r#"{"promptFeedback":{"blockReason":"OTHER"}}"#;
        assert_eq!(extract_stream_text(buf), "Error: prompt blocked (OTHER)");
    }

    #[test]
    fn usage_only_chunk_is_pending() {
        let buf = r#"data: {"usageMetadata":{"totalTokenCount":12}}"#;
        assert_eq!(extract_stream_text(buf), "");
        assert_eq!(
            extract_payload(r#"{"candidates":[{"finishReason":"STOP"}]}"#),
            Extraction::Pending
        );
    }

    #[test]
    fn garbage_and_empty_input() {
        assert_eq!(extract_stream_text(""), "");
        assert_eq!(extract_stream_text("   \n\n"), "");
        assert_eq!(extract_stream_text("<html>502 Bad Gateway</html>"), "");
        assert_eq!(extract_stream_text("data: not json"), "");
        assert_eq!(extract_stream_text("data:\n"), "");
    }

    #[test]
    fn idempotent() {
        let inputs = [
            r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#,
            r#"data: {"candidates":[{"content":{"parts":[{"te"#,
            r#"{"error":{"message":"quota exceeded"}}"#,
        ];
        for input in inputs {
            assert_eq!(extract_stream_text(input), extract_stream_text(input));
        }
    }

    #[test]
    fn growing_buffer_converges() {
        let full = r#"data: {"candidates":[{"content":{"parts":[{"text":"Plan your week"}]}}]}"#;
        let mut seen_text = false;
        for end in 0..=full.len() {
            let out = extract_stream_text(&full[..end]);
            if end < full.len() {
                assert_eq!(out, "", "prefix of length {end} produced {out:?}");
            } else {
                assert_eq!(out, "Plan your week");
                seen_text = true;
            }
        }
        assert!(seen_text);
    }
}
