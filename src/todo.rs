// todos/src/todo.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, TodoError};

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_BLOCKED: &str = "blocked";
pub const STATUS_COMPLETED: &str = "completed";

pub const PRIORITY_HIGH: &str = "high";
pub const PRIORITY_MEDIUM: &str = "medium";
pub const PRIORITY_LOW: &str = "low";

/// Type assigned by [`Todo::new`] when the caller leaves it empty.
pub const DEFAULT_TYPE: &str = "task";

/// Types the outer surface advertises. `DEFAULT_TYPE` is deliberately absent;
/// the store itself accepts any non-empty type.
pub const KNOWN_TYPES: &[&str] = &[
    "feature", "bug", "refactor", "research", "prd", "multi-phase", "phase", "subtask",
];

pub fn is_known_type(ty: &str) -> bool { KNOWN_TYPES.contains(&ty) }

/// A named body region; its content is rendered under `## <title>`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionDefinition {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SectionDefinition {
    pub fn new(title: impl Into<String>, order: i64) -> Self {
        Self { title: title.into(), order, ..Default::default() }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Todo {
    pub id: String,
    pub task: String,
    pub started: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
    pub status: String,
    pub priority: String,
    pub todo_type: String,
    pub parent_id: Option<String>,
    pub tags: Vec<String>,
    pub sections: BTreeMap<String, SectionDefinition>,
}

impl Todo {
    /// Build a fresh in-progress todo. The id is left empty; the service assigns it.
    ///
    /// The task is stored as a single line: line breaks fold into spaces.
    pub fn new(task: &str, priority: &str, todo_type: &str) -> Result<Self> {
        let task = single_line(task);
        if task.is_empty() {
            return Err(TodoError::validation("task description cannot be empty"));
        }
        let priority = if priority.trim().is_empty() { PRIORITY_MEDIUM } else { priority.trim() };
        let todo_type = if todo_type.trim().is_empty() { DEFAULT_TYPE } else { todo_type.trim() };
        Ok(Self {
            id: String::new(),
            task,
            started: Utc::now(),
            completed: None,
            status: STATUS_IN_PROGRESS.into(),
            priority: priority.into(),
            todo_type: todo_type.into(),
            parent_id: None,
            tags: vec![],
            sections: BTreeMap::new(),
        })
    }

    pub fn complete(&mut self) {
        self.status = STATUS_COMPLETED.into();
        self.completed = Some(Utc::now());
    }

    pub fn is_completed(&self) -> bool { self.status == STATUS_COMPLETED }

    /// Structural checks only; values outside the advertised sets are kept.
    pub fn validate(&self) -> Result<()> {
        if self.task.trim().is_empty() {
            return Err(TodoError::validation("task description cannot be empty"));
        }
        if self.task.contains(['\n', '\r']) {
            return Err(TodoError::validation("task description must be a single line"));
        }
        for (name, value) in [("status", &self.status), ("priority", &self.priority), ("type", &self.todo_type)] {
            if value.trim().is_empty() {
                return Err(TodoError::validation(format!("{name} cannot be empty")));
            }
        }
        Ok(())
    }

    /// Sections sorted by `order`, ties broken by key.
    pub fn ordered_sections(&self) -> Vec<(&String, &SectionDefinition)> {
        let mut v: Vec<_> = self.sections.iter().collect();
        v.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(b.0)));
        v
    }
}

fn single_line(task: &str) -> String {
    task.split(['\n', '\r']).map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ")
}
