//! Conversations with the assistant.

pub mod model;
pub mod naming;
pub mod session;

pub use model::{ChatEntry, Conversation};
pub use naming::{ChatNamer, heuristic_title};
pub use session::{ChatReply, ChatSession, SessionConfig};
