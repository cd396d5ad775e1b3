//! TaskMaster AI assistant core.

pub mod channels;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod tasks;
