// todos/src/format.rs

//! Markdown todo documents: a YAML header between `---` fences, a `# task`
//! heading, then one `## title` block per section in ascending order.
//!
//! ```text
//! ---
//! todo_id: write-docs
//! started: 2025-01-15T10:00:00Z
//! status: in_progress
//! priority: medium
//! type: task
//! ---
//!
//! # Write docs
//!
//! ## Notes
//!
//! free-form markdown
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::Range};

use crate::{
    error::{Result, TodoError},
    todo::{SectionDefinition, Todo},
};

const OPEN_FENCE: &str = "---\n";
const CLOSE_FENCE: &str = "\n---\n";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    todo_id: String,
    started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed: Option<DateTime<Utc>>,
    status: String,
    priority: String,
    #[serde(rename = "type")]
    todo_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    sections: BTreeMap<String, SectionHeader>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SectionHeader {
    title: String,
    #[serde(default)]
    order: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl From<&Todo> for Header {
    fn from(t: &Todo) -> Self {
        Self {
            todo_id: t.id.clone(),
            started: t.started,
            completed: t.completed,
            status: t.status.clone(),
            priority: t.priority.clone(),
            todo_type: t.todo_type.clone(),
            parent_id: t.parent_id.clone().filter(|p| !p.is_empty()),
            tags: t.tags.clone(),
            sections: t.sections.iter().map(|(k, s)| (k.clone(), SectionHeader {
                title: s.title.clone(),
                order: s.order,
                metadata: s.metadata.clone(),
            })).collect(),
        }
    }
}

impl Header {
    fn ordered_titles(&self) -> Vec<(&str, &str)> {
        let mut v: Vec<_> = self.sections.iter().collect();
        v.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(b.0)));
        v.into_iter().map(|(k, s)| (k.as_str(), s.title.as_str())).collect()
    }
}

/// Serialize a todo to its on-disk text.
pub fn render(todo: &Todo) -> Result<String> {
    let yaml = serde_yml::to_string(&Header::from(todo))
        .map_err(|e| TodoError::operation(format!("failed to serialize todo header: {e}")))?;
    let yaml = yaml.strip_prefix(OPEN_FENCE).unwrap_or(&yaml);

    let mut out = String::with_capacity(yaml.len() + todo.task.len() + 64);
    out.push_str(OPEN_FENCE);
    out.push_str(yaml);
    if !yaml.ends_with('\n') { out.push('\n'); }
    out.push_str(OPEN_FENCE);
    out.push_str("\n# ");
    out.push_str(&todo.task);
    out.push('\n');
    for (_, s) in todo.ordered_sections() {
        out.push_str("\n## ");
        out.push_str(&s.title);
        out.push_str("\n\n");
        out.push_str(&s.content);
        out.push('\n');
    }
    Ok(out)
}

/// Parse on-disk text back into a todo. Malformed input is a validation error.
pub fn parse(raw: &str) -> Result<Todo> {
    let (header_text, body, _) = split_document(raw)?;
    let header = parse_header(header_text)?;
    let (task, task_end) = task_heading(body)
        .ok_or_else(|| TodoError::validation("todo body has no '# ' task heading"))?;
    let spans = locate_sections(body, task_end, &header.ordered_titles());

    let sections = header.sections.into_iter().map(|(key, s)| {
        let content = spans.get(&key).map(|r| body[r.clone()].to_string()).unwrap_or_default();
        (key, SectionDefinition { title: s.title, content, order: s.order, metadata: s.metadata })
    }).collect();

    let todo = Todo {
        id: header.todo_id,
        task: task.to_string(),
        started: header.started,
        completed: header.completed,
        status: header.status,
        priority: header.priority,
        todo_type: header.todo_type,
        parent_id: header.parent_id.filter(|p| !p.is_empty()),
        tags: header.tags,
        sections,
    };
    todo.validate()?;
    Ok(todo)
}

/// Replace one section's content in raw text, leaving every other byte as it was.
///
/// If the section is declared in the header but its heading cannot be found in
/// the body, the document is re-rendered from its parsed form instead.
pub fn splice_section(raw: &str, key: &str, content: &str) -> Result<String> {
    let (header_text, body, body_offset) = split_document(raw)?;
    let header = parse_header(header_text)?;
    if !header.sections.contains_key(key) {
        return Err(TodoError::validation(format!("unknown section: {key}")));
    }
    let (_, task_end) = task_heading(body)
        .ok_or_else(|| TodoError::validation("todo body has no '# ' task heading"))?;
    let spans = locate_sections(body, task_end, &header.ordered_titles());

    match spans.get(key) {
        Some(span) => {
            let (start, end) = (body_offset + span.start, body_offset + span.end);
            let mut out = String::with_capacity(raw.len() - (end - start) + content.len());
            out.push_str(&raw[..start]);
            out.push_str(content);
            out.push_str(&raw[end..]);
            Ok(out)
        }
        None => {
            let mut todo = parse(raw)?;
            if let Some(s) = todo.sections.get_mut(key) { s.content = content.to_string(); }
            render(&todo)
        }
    }
}

/// Returns `(header, body, body_offset)`.
fn split_document(raw: &str) -> Result<(&str, &str, usize)> {
    let rest = raw.strip_prefix(OPEN_FENCE)
        .ok_or_else(|| TodoError::validation("todo file does not start with a '---' header"))?;
    if let Some(body) = rest.strip_prefix(OPEN_FENCE) {
        return Ok(("", body, 2 * OPEN_FENCE.len()));
    }
    let end = rest.find(CLOSE_FENCE)
        .ok_or_else(|| TodoError::validation("todo header is not terminated by '---'"))?;
    let body_start = end + CLOSE_FENCE.len();
    Ok((&rest[..=end], &rest[body_start..], OPEN_FENCE.len() + body_start))
}

fn parse_header(text: &str) -> Result<Header> {
    serde_yml::from_str(text).map_err(|e| TodoError::validation(format!("invalid todo header: {e}")))
}

/// First `# ` line and the byte offset just past it.
fn task_heading(body: &str) -> Option<(&str, usize)> {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        offset += line.len();
        let line = line.trim_end_matches(['\n', '\r']);
        if let Some(task) = line.strip_prefix("# ") {
            return Some((task.trim(), offset));
        }
    }
    None
}

/// Content byte ranges of each section found in `body`, searched in order from `from`.
fn locate_sections(body: &str, from: usize, titles: &[(&str, &str)]) -> BTreeMap<String, Range<usize>> {
    let mut found = Vec::with_capacity(titles.len());
    let mut cursor = from.saturating_sub(1).min(body.len());
    for (key, title) in titles {
        let marker = format!("\n## {title}\n\n");
        if let Some(pos) = body[cursor..].find(&marker) {
            let start = cursor + pos;
            found.push((*key, start, start + marker.len()));
            cursor = start + marker.len();
        }
    }

    let mut spans = BTreeMap::new();
    for (i, (key, _, content_start)) in found.iter().enumerate() {
        let mut end = found.get(i + 1).map(|(_, next, _)| *next).unwrap_or(body.len());
        if end > *content_start && body.as_bytes()[end - 1] == b'\n' { end -= 1; }
        spans.insert(key.to_string(), *content_start..end);
    }
    spans
}
