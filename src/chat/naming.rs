//! Chat naming: ask the model for a short title, fall back to a heuristic.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Title used when nothing better can be derived.
pub const DEFAULT_TITLE: &str = "New Chat";

const MAX_TITLE_CHARS: usize = 40;
const MAX_TITLE_WORDS: usize = 6;
const REPLY_PREVIEW_CHARS: usize = 500;

const FILLER_OPENERS: &[&str] = &[
    "please ",
    "can you ",
    "could you ",
    "would you ",
    "help me ",
    "i want to ",
    "i need to ",
    "i'd like to ",
    "hey ",
    "hi ",
];

/// Names conversations after their first exchange.
pub struct ChatNamer {
    llm: Arc<dyn LlmProvider>,
}

impl ChatNamer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// A title for the conversation. Never fails: model errors are logged and
    /// the heuristic title is used instead.
    pub async fn name(&self, first_message: &str, first_reply: &str) -> String {
        match self.generate(first_message, first_reply).await {
            Ok(Some(title)) => {
                debug!(title = %title, "Chat named by model");
                title
            }
            Ok(None) => {
                warn!("Model returned an unusable chat title");
                heuristic_title(first_message)
            }
            Err(e) => {
                warn!(error = %e, "Chat name generation failed");
                heuristic_title(first_message)
            }
        }
    }

    async fn generate(
        &self,
        first_message: &str,
        first_reply: &str,
    ) -> Result<Option<String>, LlmError> {
        let preview: String = first_reply.chars().take(REPLY_PREVIEW_CHARS).collect();
        let request = CompletionRequest::new(vec![
            ChatMessage::system(format!(
                "You name chat conversations. Reply with a title of at most {} words \
                 that summarises the conversation. No quotes, no punctuation at the end, \
                 nothing else.",
                MAX_TITLE_WORDS
            )),
            ChatMessage::user(format!(
                "User: {}\n\nAssistant: {}",
                first_message, preview
            )),
        ])
        .with_temperature(0.2)
        .with_max_tokens(20);

        let response = self.llm.complete(request).await?;
        Ok(clean_model_title(&response.content))
    }
}

/// Normalise a model-written title; `None` if nothing usable remains.
pub fn clean_model_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_start_matches('#').trim();
    let line = strip_prefix_ci(line, "title:").unwrap_or(line);
    let line = line
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '*' | '`' | '“' | '”' | '_'))
        .trim()
        .trim_end_matches(['.', '!', ':'])
        .trim();

    let title = cap_words(line.split_whitespace(), MAX_TITLE_WORDS * 2);
    (!title.is_empty()).then_some(title)
}

/// Derive a title from the user's first message.
pub fn heuristic_title(message: &str) -> String {
    let sentence = message
        .split(['.', '?', '!', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("");

    let mut rest = sentence;
    while let Some(stripped) = FILLER_OPENERS
        .iter()
        .find_map(|opener| strip_prefix_ci(rest, opener))
    {
        rest = stripped.trim_start();
    }

    let words = rest
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-'))
        .filter(|w| !w.is_empty());
    let title = cap_words(words, MAX_TITLE_WORDS);

    let mut chars = title.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => DEFAULT_TITLE.to_string(),
    }
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
        .map(str::trim_start)
}

/// Join up to `max_words` words, stopping before the title exceeds the char cap.
fn cap_words<'a>(words: impl Iterator<Item = &'a str>, max_words: usize) -> String {
    let mut title = String::new();
    for word in words.take(max_words) {
        let extra = if title.is_empty() { 0 } else { 1 };
        if title.chars().count() + extra + word.chars().count() > MAX_TITLE_CHARS {
            if title.is_empty() {
                title = word.chars().take(MAX_TITLE_CHARS).collect();
            }
            break;
        }
        if extra == 1 {
            title.push(' ');
        }
        title.push_str(word);
    }
    title
}
