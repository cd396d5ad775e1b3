//! Lift task suggestions out of assistant replies.
//!
//! The system prompt asks the model to append a fenced JSON block when it
//! proposes tasks. Models are inconsistent about the exact shape, so every
//! block is parsed speculatively: an array of tasks, `{"tasks": [...]}`, or a
//! single task object are all accepted and anything else is skipped. A reply
//! with no fenced block at all may still carry a bare `{"tasks": [...]}`
//! object, which is lifted and stripped the same way.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::model::{TaskDraft, TaskPriority};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z]*)[ \t]*\r?\n(.*?)```").expect("fenced block regex is valid")
});

#[derive(Debug, Deserialize)]
struct RawDraft {
    #[serde(alias = "name", alias = "task")]
    title: Option<String>,
    #[serde(default, alias = "details", alias = "notes")]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default, alias = "dueDate", alias = "due")]
    due_date: Option<String>,
}

/// All task drafts found in closed JSON blocks of `text`.
pub fn extract_task_drafts(text: &str) -> Vec<TaskDraft> {
    task_spans(text)
        .into_iter()
        .flat_map(|(_, drafts)| drafts)
        .collect()
}

/// Reply text with task blocks removed.
pub fn strip_task_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (span, _) in task_spans(text) {
        out.push_str(&text[last..span.start]);
        last = span.end;
    }
    out.push_str(&text[last..]);
    out.trim().to_string()
}

/// Byte ranges of the blocks that yield drafts, in order, with their drafts.
///
/// Fenced blocks win; an unfenced `{"tasks": [...]}` object is only
/// considered when the reply has no fenced block at all.
fn task_spans(text: &str) -> Vec<(Range<usize>, Vec<TaskDraft>)> {
    let mut spans: Vec<_> = FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let drafts = drafts_from_json(block_body(&caps)?);
            (!drafts.is_empty()).then(|| (whole.range(), drafts))
        })
        .collect();

    if spans.is_empty() && !FENCED_BLOCK.is_match(text) {
        if let Some(span) = bare_tasks_object(text) {
            let drafts = drafts_from_json(&text[span.clone()]);
            if !drafts.is_empty() {
                spans.push((span, drafts));
            }
        }
    }
    spans
}

fn block_body<'t>(caps: &regex::Captures<'t>) -> Option<&'t str> {
    let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let body = caps.get(2)?.as_str().trim();
    let looks_like_json = body.starts_with('{') || body.starts_with('[');
    if lang.eq_ignore_ascii_case("json") || (lang.is_empty() && looks_like_json) {
        Some(body)
    } else {
        None
    }
}

/// Unfenced `{"tasks": [...]}` somewhere in the text.
fn bare_tasks_object(text: &str) -> Option<Range<usize>> {
    let key = text.find("\"tasks\"")?;
    let start = text[..key].rfind('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| start..end + 1)
}

fn drafts_from_json(body: &str) -> Vec<TaskDraft> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Skipping JSON block that does not parse");
            return Vec::new();
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("tasks") {
            Some(Value::Array(items)) => items,
            Some(_) => return Vec::new(),
            None => vec![Value::Object(map)],
        },
        _ => return Vec::new(),
    };

    items.into_iter().filter_map(draft_from_value).collect()
}

fn draft_from_value(value: Value) -> Option<TaskDraft> {
    let raw: RawDraft = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "Skipping task entry with unexpected shape");
            return None;
        }
    };

    let title = raw.title?.trim().to_string();
    if title.is_empty() {
        return None;
    }

    Some(TaskDraft {
        title,
        description: raw
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        priority: raw.priority.as_deref().and_then(TaskPriority::parse_loose),
        due_date: raw.due_date.as_deref().and_then(parse_due_date),
    })
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
