// todos/src/service.rs

use chrono::Datelike;
use tracing::{debug, info};

use crate::{
    config::ConfigManager,
    context::OpContext,
    error::{Result, ResultExt, TodoError},
    ident::{derive_base_id, IdAllocator},
    repository::{FileTodoRepository, TodoFilter, TodoRepository},
    todo::{is_known_type, SectionDefinition, Todo, STATUS_COMPLETED},
};

pub const ARCHIVE_INCOMPLETE: &str = "cannot archive incomplete todo";

/// Fields a caller supplies when creating a todo; everything else is derived.
#[derive(Clone, Debug, Default)]
pub struct NewTodo {
    pub task: String,
    pub priority: String,
    pub todo_type: String,
    pub parent_id: Option<String>,
    pub tags: Vec<String>,
}

impl NewTodo {
    pub fn new(task: impl Into<String>, priority: impl Into<String>, todo_type: impl Into<String>) -> Self {
        Self { task: task.into(), priority: priority.into(), todo_type: todo_type.into(), ..Default::default() }
    }
}

/// Lifecycle operations over a repository. Owns the id counters for its lifetime.
#[derive(Debug)]
pub struct TodoService<R = FileTodoRepository> {
    repo: R,
    ids: IdAllocator,
    probe_existing: bool,
}

impl<R: TodoRepository> TodoService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo, ids: IdAllocator::new(), probe_existing: true }
    }

    /// When enabled (the default), id allocation skips ids that already have an active file.
    pub fn probe_existing_ids(mut self, on: bool) -> Self {
        self.probe_existing = on;
        self
    }

    pub fn repository(&self) -> &R { &self.repo }

    pub fn create_todo(&self, ctx: &OpContext, task: &str, priority: &str, todo_type: &str) -> Result<Todo> {
        self.create_todo_with(ctx, NewTodo::new(task, priority, todo_type))
    }

    pub fn create_todo_with(&self, ctx: &OpContext, req: NewTodo) -> Result<Todo> {
        ctx.check()?;
        let mut todo = Todo::new(&req.task, &req.priority, &req.todo_type).context("failed to create todo")?;
        todo.parent_id = req.parent_id.filter(|p| !p.is_empty());
        todo.tags = req.tags;
        if !is_known_type(&todo.todo_type) {
            debug!(todo_type = %todo.todo_type, "creating todo with unlisted type");
        }

        let base = derive_base_id(&todo.task);
        todo.id = self
            .ids
            .try_allocate(&base, |candidate| {
                if self.probe_existing { self.repo.exists(ctx, candidate) } else { Ok(false) }
            })
            .context("failed to allocate todo id")?;

        self.repo.save(ctx, &todo).context("failed to save todo")?;
        info!(id = %todo.id, priority = %todo.priority, todo_type = %todo.todo_type, "created todo");
        Ok(todo)
    }

    /// Create a todo under an existing parent.
    pub fn create_subtodo(&self, ctx: &OpContext, parent_id: &str, task: &str, priority: &str, todo_type: &str) -> Result<Todo> {
        self.repo.find_by_id(ctx, parent_id).context("failed to load parent todo")?;
        let mut req = NewTodo::new(task, priority, todo_type);
        req.parent_id = Some(parent_id.to_string());
        self.create_todo_with(ctx, req)
    }

    pub fn get_todo(&self, ctx: &OpContext, id: &str) -> Result<Todo> {
        self.repo.find_by_id(ctx, id)
    }

    pub fn get_todo_with_content(&self, ctx: &OpContext, id: &str) -> Result<(Todo, String)> {
        self.repo.find_by_id_with_content(ctx, id)
    }

    pub fn list_todos(&self, ctx: &OpContext, status: &str, priority: &str, days: u32) -> Result<Vec<Todo>> {
        let filter = TodoFilter {
            status: Some(status.to_string()).filter(|s| !s.is_empty()),
            priority: Some(priority.to_string()).filter(|p| !p.is_empty()),
            days,
            parent_id: None,
        };
        self.repo.list(ctx, &filter)
    }

    pub fn list_filtered(&self, ctx: &OpContext, filter: &TodoFilter) -> Result<Vec<Todo>> {
        self.repo.list(ctx, filter)
    }

    pub fn list_children(&self, ctx: &OpContext, parent_id: &str) -> Result<Vec<Todo>> {
        let filter = TodoFilter { parent_id: Some(parent_id.to_string()), ..Default::default() };
        self.repo.list(ctx, &filter)
    }

    /// Set a new status; moving to `completed` also stamps the completion time.
    pub fn update_todo_status(&self, ctx: &OpContext, id: &str, status: &str) -> Result<Todo> {
        let status = status.trim();
        if status.is_empty() {
            return Err(TodoError::validation("status cannot be empty"));
        }
        let mut todo = self.repo.find_by_id(ctx, id).context("failed to load todo")?;
        if status == STATUS_COMPLETED {
            todo.complete();
        } else {
            todo.status = status.to_string();
            todo.completed = None;
        }
        self.repo.save(ctx, &todo).context("failed to save todo")?;
        debug!(id, status, "updated todo status");
        Ok(todo)
    }

    /// Move a completed todo into `archive/YYYY/MM/DD/` by its start date.
    pub fn archive_todo(&self, ctx: &OpContext, id: &str) -> Result<()> {
        let todo = self.repo.find_by_id(ctx, id).context("failed to load todo")?;
        if !todo.is_completed() {
            return Err(TodoError::validation(ARCHIVE_INCOMPLETE));
        }
        let path = archive_path_for(&todo);
        self.repo.archive(ctx, id, &path).context("failed to archive todo")?;
        info!(id, archive_path = %path, "archived todo");
        Ok(())
    }

    pub fn delete_todo(&self, ctx: &OpContext, id: &str) -> Result<()> {
        self.repo.delete(ctx, id).context("failed to delete todo")
    }

    pub fn update_todo_section(&self, ctx: &OpContext, id: &str, section: &str, content: &str) -> Result<()> {
        self.repo.update_content(ctx, id, section, content).context("failed to update todo section")
    }

    /// Insert or replace a section definition, keeping the rest of the todo.
    pub fn add_section(&self, ctx: &OpContext, id: &str, key: &str, section: SectionDefinition) -> Result<Todo> {
        if key.trim().is_empty() {
            return Err(TodoError::validation("section key cannot be empty"));
        }
        let mut todo = self.repo.find_by_id(ctx, id).context("failed to load todo")?;
        todo.sections.insert(key.to_string(), section);
        self.repo.save(ctx, &todo).context("failed to save todo")?;
        Ok(todo)
    }
}

impl TodoService<FileTodoRepository> {
    /// Service over the store directory named by the merged configuration.
    pub fn open(cfg: &ConfigManager) -> Self {
        let probe = cfg.get().todos.probe_existing_ids();
        Self::new(cfg.open_repository()).probe_existing_ids(probe)
    }
}

/// `YYYY/MM/DD` of the todo's start date.
pub fn archive_path_for(todo: &Todo) -> String {
    let d = todo.started;
    format!("{:04}/{:02}/{:02}", d.year(), d.month(), d.day())
}
