// todos/src/adapter.rs

//! Conversion between [`Todo`] and the flat record handed to the outer
//! request surface. Both directions are total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    error::{ErrorKind, TodoError},
    todo::{SectionDefinition, Todo},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: String,
    pub task: String,
    pub started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    pub status: String,
    pub priority: String,
    #[serde(rename = "type")]
    pub todo_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Sections in render order.
    #[serde(default)]
    pub sections: Vec<SectionRecord>,
    /// Raw markdown as stored, when the caller asked for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl TodoRecord {
    pub fn with_content(todo: &Todo, raw: String) -> Self {
        Self { content: Some(raw), ..Self::from(todo) }
    }
}

impl From<&Todo> for TodoRecord {
    fn from(t: &Todo) -> Self {
        Self {
            id: t.id.clone(),
            task: t.task.clone(),
            started: t.started,
            completed: t.completed,
            status: t.status.clone(),
            priority: t.priority.clone(),
            todo_type: t.todo_type.clone(),
            parent_id: t.parent_id.clone(),
            tags: t.tags.clone(),
            sections: t.ordered_sections().into_iter().map(|(key, s)| SectionRecord {
                key: key.clone(),
                title: s.title.clone(),
                content: s.content.clone(),
                order: s.order,
                metadata: s.metadata.clone(),
            }).collect(),
            content: None,
        }
    }
}

impl From<TodoRecord> for Todo {
    /// Later records win when two sections share a key.
    fn from(r: TodoRecord) -> Self {
        Self {
            id: r.id,
            task: r.task,
            started: r.started,
            completed: r.completed,
            status: r.status,
            priority: r.priority,
            todo_type: r.todo_type,
            parent_id: r.parent_id.filter(|p| !p.is_empty()),
            tags: r.tags,
            sections: r.sections.into_iter().map(|s| (s.key, SectionDefinition {
                title: s.title,
                content: s.content,
                order: s.order,
                metadata: s.metadata,
            })).collect(),
        }
    }
}

/// Error shape for the outer surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
}

impl From<&TodoError> for ErrorRecord {
    fn from(err: &TodoError) -> Self {
        let message = match err.root() {
            nf @ TodoError::NotFound(_) => nf.to_string(),
            _ => err.to_string(),
        };
        Self { kind: err.kind().as_str().to_string(), message }
    }
}

impl ErrorRecord {
    pub fn kind(&self) -> Option<ErrorKind> {
        [ErrorKind::NotFound, ErrorKind::Validation, ErrorKind::Conflict, ErrorKind::Operation, ErrorKind::Permission]
            .into_iter()
            .find(|k| k.as_str() == self.kind)
    }
}
