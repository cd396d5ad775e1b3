//! LLM integration for TaskMaster AI.
//!
//! Talks to the generative-language (Gemini) REST API directly over reqwest.
//! Streamed replies arrive as server-sent events and are turned into display
//! text incrementally by [`extract`] and [`stream`].

pub mod extract;
pub mod gemini;
pub mod provider;
pub mod sse;
pub mod stream;
pub mod types;

pub use extract::{Extraction, extract_payload, extract_stream_text, strip_role_prefix};
pub use gemini::GeminiClient;
pub use provider::*;
pub use stream::{StreamAccumulator, StreamError, StreamUpdate};

use std::sync::Arc;

use crate::config::AssistantConfig;

/// Create the LLM provider described by the configuration.
pub fn create_provider(config: &AssistantConfig) -> Arc<dyn LlmProvider> {
    tracing::info!("Using Gemini (model: {})", config.model);
    Arc::new(
        GeminiClient::new(config.api_key.clone(), config.model.clone())
            .with_base_url(config.api_base.clone()),
    )
}
