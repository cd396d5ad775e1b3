//! Drives one conversation with the assistant.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, warn};

use super::model::Conversation;
use super::naming::ChatNamer;
use crate::config::AssistantConfig;
use crate::error::{ChatError, LlmError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, Role, StreamUpdate};
use crate::tasks::{TaskDraft, extract_task_drafts, strip_task_blocks};

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Number of past messages sent as context.
    pub history_limit: usize,
    /// Stream replies instead of waiting for the full response.
    pub stream: bool,
}

impl From<&AssistantConfig> for SessionConfig {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            history_limit: config.history_limit,
            stream: config.stream,
        }
    }
}

/// Result of one user turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// Reply text with task blocks removed.
    pub text: String,
    /// Tasks the assistant proposed in this reply.
    pub tasks: Vec<TaskDraft>,
    /// Set when this turn gave the conversation its title.
    pub title: Option<String>,
}

/// One conversation with the assistant.
pub struct ChatSession {
    llm: Arc<dyn LlmProvider>,
    namer: ChatNamer,
    config: SessionConfig,
    conversation: Conversation,
}

impl ChatSession {
    pub fn new(llm: Arc<dyn LlmProvider>, config: SessionConfig) -> Self {
        Self {
            namer: ChatNamer::new(Arc::clone(&llm)),
            llm,
            config,
            conversation: Conversation::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn title(&self) -> Option<&str> {
        self.conversation.title.as_deref()
    }

    /// Send a user message and wait for the reply, reporting streamed text
    /// to `on_update` as it arrives.
    ///
    /// On failure the user message is dropped from the conversation again so
    /// the turn can be retried.
    pub async fn send<F>(&mut self, input: &str, mut on_update: F) -> Result<ChatReply, ChatError>
    where
        F: FnMut(&StreamUpdate),
    {
        let input = input.trim();
        if input.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.conversation.push(Role::User, input);
        let request = self.build_request();

        let outcome = if self.config.stream {
            self.stream_reply(request, &mut on_update).await
        } else {
            self.complete_reply(request, &mut on_update).await
        };

        let raw = match outcome {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, conversation = %self.conversation.id, "Reply failed");
                self.conversation.pop();
                return Err(e.into());
            }
        };

        let tasks = extract_task_drafts(&raw);
        let text = strip_task_blocks(&raw);
        let recorded = if text.is_empty() { raw.trim() } else { text.as_str() };
        self.conversation.push(Role::Assistant, recorded);

        info!(
            conversation = %self.conversation.id,
            reply_len = text.len(),
            tasks = tasks.len(),
            "Reply received"
        );

        let title = if self.conversation.title.is_none() {
            let first = self.conversation.first_user_message().unwrap_or(input).to_string();
            let title = self.namer.name(&first, recorded).await;
            self.conversation.title = Some(title.clone());
            Some(title)
        } else {
            None
        };

        Ok(ChatReply { text, tasks, title })
    }

    fn build_request(&self) -> CompletionRequest {
        let mut messages = vec![ChatMessage::system(&self.config.system_prompt)];
        messages.extend(self.conversation.history(self.config.history_limit));
        CompletionRequest::new(messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_output_tokens)
    }

    async fn stream_reply<F>(
        &self,
        request: CompletionRequest,
        on_update: &mut F,
    ) -> Result<String, LlmError>
    where
        F: FnMut(&StreamUpdate),
    {
        let mut stream = self.llm.complete_stream(request).await?;
        let mut text = String::new();
        while let Some(update) = stream.next().await {
            let update = update?;
            on_update(&update);
            text = update.text;
        }
        Ok(text)
    }

    async fn complete_reply<F>(
        &self,
        request: CompletionRequest,
        on_update: &mut F,
    ) -> Result<String, LlmError>
    where
        F: FnMut(&StreamUpdate),
    {
        let response = self.llm.complete(request).await?;
        on_update(&StreamUpdate {
            delta: response.content.clone(),
            text: response.content.clone(),
        });
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::{CompletionResponse, FinishReason, TextStream};

    /// Replays canned replies and records every request it sees.
    struct ScriptedLlm {
        replies: Mutex<Vec<Result<String, ()>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<&str, ()>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn next_reply(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request);
            match self.replies.lock().unwrap().pop() {
                Some(Ok(text)) => Ok(text),
                _ => Err(LlmError::InvalidResponse {
                    provider: "scripted".to_string(),
                    reason: "no reply scripted".to_string(),
                }),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.next_reply(request)?,
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }

        async fn complete_stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError> {
            let text = self.next_reply(request)?;
            let mid = text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i);
            let updates: Vec<Result<StreamUpdate, LlmError>> = vec![
                Ok(StreamUpdate {
                    delta: text[..mid].to_string(),
                    text: text[..mid].to_string(),
                }),
                Ok(StreamUpdate {
                    delta: text[mid..].to_string(),
                    text: text.clone(),
                }),
            ];
            Ok(Box::pin(futures::stream::iter(updates)))
        }
    }

    fn config(stream: bool) -> SessionConfig {
        SessionConfig {
            system_prompt: "sys".to_string(),
            temperature: 0.5,
            max_output_tokens: 128,
            history_limit: 3,
            stream,
        }
    }

    #[tokio::test]
    async fn streamed_turn_names_chat_and_lifts_tasks() {
        let llm = ScriptedLlm::new(vec![
            Ok("Let's get you ready.\n```json\n{\"tasks\": [{\"title\": \"Review notes\", \"priority\": \"high\"}]}\n```"),
            Ok("Exam Prep"),
        ]);
        let mut session = ChatSession::new(llm.clone(), config(true));

        let mut deltas = Vec::new();
        let reply = session
            .send("help me prepare for my exam", |u| deltas.push(u.delta.clone()))
            .await
            .unwrap();

        assert_eq!(deltas.len(), 2);
        assert_eq!(reply.text, "Let's get you ready.");
        assert_eq!(reply.tasks.len(), 1);
        assert_eq!(reply.tasks[0].title, "Review notes");
        assert_eq!(reply.title.as_deref(), Some("Exam Prep"));
        assert_eq!(session.title(), Some("Exam Prep"));

        let entries = &session.conversation().entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].content, "Let's get you ready.");

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests[0].messages[0], ChatMessage::system("sys"));
        assert_eq!(requests[0].messages[1], ChatMessage::user("help me prepare for my exam"));
        assert_eq!(requests[0].max_tokens, Some(128));
    }

    #[tokio::test]
    async fn title_assigned_once() {
        let llm = ScriptedLlm::new(vec![Ok("hi!"), Ok("Greetings"), Ok("again")]);
        let mut session = ChatSession::new(llm.clone(), config(false));

        let first = session.send("hello", |_| {}).await.unwrap();
        assert_eq!(first.title.as_deref(), Some("Greetings"));

        let second = session.send("and again", |_| {}).await.unwrap();
        assert!(second.title.is_none());
        assert_eq!(second.text, "again");
        assert_eq!(session.title(), Some("Greetings"));
        assert_eq!(session.conversation().len(), 4);
    }

    #[tokio::test]
    async fn naming_failure_falls_back_to_heuristic() {
        // Only the chat reply is scripted; the naming call fails.
        let llm = ScriptedLlm::new(vec![Ok("Sure, here's a plan.")]);
        let mut session = ChatSession::new(llm, config(false));

        let reply = session.send("could you plan my weekend trip?", |_| {}).await.unwrap();
        assert_eq!(reply.title.as_deref(), Some("Plan my weekend trip"));
    }

    #[tokio::test]
    async fn failed_reply_rolls_back_user_message() {
        let llm = ScriptedLlm::new(vec![Err(())]);
        let mut session = ChatSession::new(llm, config(true));

        let err = session.send("hello?", |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::Llm(LlmError::InvalidResponse { .. })));
        assert!(session.conversation().is_empty());
        assert!(session.title().is_none());
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let llm = ScriptedLlm::new(vec![]);
        let mut session = ChatSession::new(llm.clone(), config(true));
        assert!(matches!(session.send("   ", |_| {}).await, Err(ChatError::EmptyMessage)));
        assert!(llm.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_limit_applies() {
        let llm = ScriptedLlm::new(vec![Ok("a"), Ok("Title"), Ok("b"), Ok("c")]);
        let mut session = ChatSession::new(llm.clone(), config(false));
        session.send("one", |_| {}).await.unwrap();
        session.send("two", |_| {}).await.unwrap();
        session.send("three", |_| {}).await.unwrap();

        let requests = llm.requests.lock().unwrap();
        let last = requests.last().unwrap();
        // system prompt + 3 most recent entries
        assert_eq!(last.messages.len(), 4);
        assert_eq!(last.messages[1], ChatMessage::user("two"));
        assert_eq!(last.messages[3], ChatMessage::user("three"));
    }

    #[tokio::test]
    async fn unfenced_tasks_object_kept_out_of_history() {
        let llm = ScriptedLlm::new(vec![
            Ok("Add these: {\"tasks\": [{\"title\": \"Water plants\"}]}"),
            Ok("Plant Care"),
        ]);
        let mut session = ChatSession::new(llm, config(false));
        let reply = session.send("my plants look sad", |_| {}).await.unwrap();
        assert_eq!(reply.text, "Add these:");
        assert_eq!(reply.tasks[0].title, "Water plants");
        assert_eq!(session.conversation().entries[1].content, "Add these:");
    }

    #[tokio::test]
    async fn reply_with_only_tasks_is_recorded_raw() {
        let block = "```json\n[{\"title\": \"Stretch\"}]\n```";
        let llm = ScriptedLlm::new(vec![Ok(block), Ok("Stretching")]);
        let mut session = ChatSession::new(llm, config(false));
        let reply = session.send("remind me to stretch", |_| {}).await.unwrap();
        assert_eq!(reply.text, "");
        assert_eq!(reply.tasks.len(), 1);
        assert_eq!(session.conversation().entries[1].content, block);
    }
}
