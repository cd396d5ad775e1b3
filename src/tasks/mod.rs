//! Tasks proposed by the assistant and the in-memory board they land on.

pub mod extract;
pub mod model;

pub use extract::{extract_task_drafts, strip_task_blocks};
pub use model::{Task, TaskBoard, TaskDraft, TaskPriority, TaskStatus};
