//! Task data model and the in-memory task board.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// How urgent a task is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    /// Lenient parse of model-provided priority labels.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" | "p3" => Some(Self::Low),
            "medium" | "normal" | "med" | "p2" => Some(Self::Medium),
            "high" | "urgent" | "critical" | "p1" => Some(Self::High),
            _ => None,
        }
    }
}

/// Lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

/// A task proposed by the assistant, before it lands on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: None,
            due_date: None,
        }
    }
}

/// A single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Owner of this task.
    pub user_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: title.into(),
            description: None,
            priority: TaskPriority::default(),
            status: TaskStatus::default(),
            due_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_draft(user_id: impl Into<String>, draft: TaskDraft) -> Self {
        let mut task = Self::new(user_id, draft.title);
        task.description = draft.description;
        task.priority = draft.priority.unwrap_or_default();
        task.due_date = draft.due_date;
        task
    }

    /// Short id prefix shown in the CLI.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn is_open(&self) -> bool {
        self.status != TaskStatus::Done
    }

    /// Transition status and bump `updated_at`.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// In-memory task list for one user session.
#[derive(Debug, Default)]
pub struct TaskBoard {
    tasks: Vec<Task>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a drafted task; returns the created task.
    pub fn add_draft(&mut self, user_id: &str, draft: TaskDraft) -> &Task {
        self.insert(Task::from_draft(user_id, draft))
    }

    /// Insert a task at its board position.
    pub fn insert(&mut self, task: Task) -> &Task {
        info!(task_id = %task.id, title = %task.title, "Task added");
        let idx = self
            .tasks
            .partition_point(|t| board_order(t, &task) != Ordering::Greater);
        self.tasks.insert(idx, task);
        &self.tasks[idx]
    }

    /// Mark the open task whose id starts with `id_prefix` as done.
    ///
    /// Returns `None` when no task or more than one task matches.
    pub fn complete(&mut self, id_prefix: &str) -> Option<&Task> {
        self.transition(id_prefix, TaskStatus::Done)
    }

    /// Mark the single open task whose id starts with `id_prefix` as in progress.
    pub fn start(&mut self, id_prefix: &str) -> Option<&Task> {
        self.transition(id_prefix, TaskStatus::InProgress)
    }

    fn transition(&mut self, id_prefix: &str, status: TaskStatus) -> Option<&Task> {
        let prefix = id_prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return None;
        }
        let mut matches = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_open() && t.id.simple().to_string().starts_with(&prefix))
            .map(|(i, _)| i);
        let idx = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        let task = &mut self.tasks[idx];
        task.set_status(status);
        info!(task_id = %task.id, status = ?status, "Task status changed");
        Some(&*task)
    }

    /// Open tasks in board order.
    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_open())
    }

    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// High priority first, then earliest due date (undated last), then oldest.
fn board_order(a: &Task, b: &Task) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
}
