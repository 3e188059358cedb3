// todos/src/repository.rs

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::{
    fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{
    context::OpContext,
    error::{Result, TodoError},
    format,
    todo::Todo,
};

pub const ARCHIVE_DIR: &str = "archive";
pub const TODO_EXT: &str = "md";

/// AND-combined listing criteria; `None` or empty disables a criterion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TodoFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    /// Keep todos started within the last N days; 0 disables.
    pub days: u32,
    pub parent_id: Option<String>,
}

impl TodoFilter {
    pub fn matches(&self, todo: &Todo) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w.is_empty() || w == have)
        }
        if !eq(&self.status, &todo.status) || !eq(&self.priority, &todo.priority) {
            return false;
        }
        if let Some(parent) = self.parent_id.as_deref().filter(|p| !p.is_empty())
            && todo.parent_id.as_deref() != Some(parent)
        {
            return false;
        }
        if let Some(cutoff) = self.cutoff()
            && todo.started < cutoff
        {
            return false;
        }
        true
    }

    /// Earliest start time kept by `days`; `None` when disabled or older than the clock can express.
    fn cutoff(&self) -> Option<DateTime<Utc>> {
        if self.days == 0 {
            return None;
        }
        TimeDelta::try_days(i64::from(self.days)).and_then(|d| Utc::now().checked_sub_signed(d))
    }
}

/// A file under the store that `list` could not load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct ListOutcome {
    pub todos: Vec<Todo>,
    pub skipped: Vec<SkippedFile>,
}

/// Persistence seam used by the service.
pub trait TodoRepository: Send + Sync {
    fn save(&self, ctx: &OpContext, todo: &Todo) -> Result<()>;
    fn find_by_id(&self, ctx: &OpContext, id: &str) -> Result<Todo>;
    /// The parsed todo together with the file text exactly as stored.
    fn find_by_id_with_content(&self, ctx: &OpContext, id: &str) -> Result<(Todo, String)>;
    fn list_with_report(&self, ctx: &OpContext, filter: &TodoFilter) -> Result<ListOutcome>;
    fn delete(&self, ctx: &OpContext, id: &str) -> Result<()>;
    /// Move an active todo to `archive/<archive_path>/<id>.md`.
    fn archive(&self, ctx: &OpContext, id: &str, archive_path: &str) -> Result<()>;
    fn get_content(&self, ctx: &OpContext, id: &str) -> Result<String>;
    fn update_content(&self, ctx: &OpContext, id: &str, section: &str, content: &str) -> Result<()>;
    fn exists(&self, ctx: &OpContext, id: &str) -> Result<bool>;

    /// Like [`TodoRepository::list_with_report`], dropping the skipped files.
    fn list(&self, ctx: &OpContext, filter: &TodoFilter) -> Result<Vec<Todo>> {
        Ok(self.list_with_report(ctx, filter)?.todos)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepositoryOptions {
    pub file_mode: u32,
    pub dir_mode: u32,
}

impl Default for RepositoryOptions {
    fn default() -> Self { Self { file_mode: 0o600, dir_mode: 0o750 } }
}

/// Todos stored one markdown file each under `base`.
///
/// A single in-process reader/writer lock guards the whole directory: saves,
/// deletes and archives are exclusive, reads run in parallel. Separate
/// instances over the same directory do not coordinate.
#[derive(Debug)]
pub struct FileTodoRepository {
    base: PathBuf,
    opts: RepositoryOptions,
    lock: RwLock<()>,
}

impl FileTodoRepository {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self::with_options(base, RepositoryOptions::default())
    }

    pub fn with_options(base: impl Into<PathBuf>, opts: RepositoryOptions) -> Self {
        Self { base: base.into(), opts, lock: RwLock::new(()) }
    }

    pub fn base_path(&self) -> &Path { &self.base }

    pub fn active_path(&self, id: &str) -> PathBuf {
        self.base.join(format!("{id}.{TODO_EXT}"))
    }

    pub fn archived_path(&self, id: &str, archive_path: &str) -> PathBuf {
        self.base.join(ARCHIVE_DIR).join(archive_path).join(format!("{id}.{TODO_EXT}"))
    }

    fn create_dirs(&self, dir: &Path) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(self.opts.dir_mode);
        }
        builder.create(dir).map_err(|e| TodoError::io("create directory", dir, e))
    }

    /// Write to a hidden sibling, flush it to disk, then rename over the target.
    fn write_atomic(&self, path: &Path, text: &str) -> Result<()> {
        let dir = path.parent().unwrap_or(self.base.as_path());
        self.create_dirs(dir)?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("todo");
        let tmp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));

        let written = (|| -> io::Result<()> {
            let mut opts = fs::OpenOptions::new();
            opts.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                opts.mode(self.opts.file_mode);
            }
            let mut f = opts.open(&tmp)?;
            f.write_all(text.as_bytes())?;
            f.sync_all()
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(TodoError::io("write", &tmp, e));
        }
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            TodoError::io("rename", path, e)
        })
    }

    fn read_active(&self, id: &str) -> Result<String> {
        check_id(id)?;
        let path = self.active_path(id);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TodoError::NotFound(id.to_string())),
            Err(e) => Err(TodoError::io("read", path, e)),
        }
    }
}

impl TodoRepository for FileTodoRepository {
    fn save(&self, ctx: &OpContext, todo: &Todo) -> Result<()> {
        ctx.check()?;
        todo.validate()?;
        check_id(&todo.id)?;
        let text = format::render(todo)?;
        let path = self.active_path(&todo.id);
        let _guard = self.lock.write();
        self.write_atomic(&path, &text)?;
        debug!(id = %todo.id, path = %path.display(), "saved todo");
        Ok(())
    }

    fn find_by_id(&self, ctx: &OpContext, id: &str) -> Result<Todo> {
        self.find_by_id_with_content(ctx, id).map(|(todo, _)| todo)
    }

    fn find_by_id_with_content(&self, ctx: &OpContext, id: &str) -> Result<(Todo, String)> {
        ctx.check()?;
        let text = {
            let _guard = self.lock.read();
            self.read_active(id)?
        };
        let todo = format::parse(&text)?;
        if todo.id != id {
            return Err(TodoError::validation(format!(
                "todo file {id}.{TODO_EXT} declares mismatched id {:?}",
                todo.id
            )));
        }
        debug!(id, "loaded todo");
        Ok((todo, text))
    }

    fn list_with_report(&self, ctx: &OpContext, filter: &TodoFilter) -> Result<ListOutcome> {
        ctx.check()?;
        let _guard = self.lock.read();
        let mut out = ListOutcome::default();
        if !self.base.is_dir() {
            return Ok(out);
        }

        let walker = WalkDir::new(&self.base)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !(e.depth() > 0 && e.file_type().is_dir() && e.file_name() == ARCHIVE_DIR));
        for entry in walker {
            ctx.check()?;
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable store entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|x| x != TODO_EXT) {
                continue;
            }
            let loaded = fs::read_to_string(path)
                .map_err(|e| TodoError::io("read", path, e))
                .and_then(|text| format::parse(&text));
            match loaded {
                Ok(todo) if filter.matches(&todo) => out.todos.push(todo),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unparseable todo file");
                    out.skipped.push(SkippedFile { path: path.to_path_buf(), reason: e.to_string() });
                }
            }
        }
        debug!(count = out.todos.len(), skipped = out.skipped.len(), "listed todos");
        Ok(out)
    }

    fn delete(&self, ctx: &OpContext, id: &str) -> Result<()> {
        ctx.check()?;
        check_id(id)?;
        let path = self.active_path(id);
        let _guard = self.lock.write();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(id, path = %path.display(), "deleted todo");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TodoError::NotFound(id.to_string())),
            Err(e) => Err(TodoError::io("delete", path, e)),
        }
    }

    fn archive(&self, ctx: &OpContext, id: &str, archive_path: &str) -> Result<()> {
        ctx.check()?;
        check_id(id)?;
        check_archive_path(archive_path)?;
        let from = self.active_path(id);
        let to = self.archived_path(id, archive_path);
        let _guard = self.lock.write();
        if !from.is_file() {
            return Err(TodoError::NotFound(id.to_string()));
        }
        if to.exists() {
            return Err(TodoError::Conflict(format!("{} already exists", to.display())));
        }
        if let Some(dir) = to.parent() {
            self.create_dirs(dir)?;
        }
        fs::rename(&from, &to).map_err(|e| TodoError::io("archive", &from, e))?;
        debug!(id, to = %to.display(), "archived todo");
        Ok(())
    }

    fn get_content(&self, ctx: &OpContext, id: &str) -> Result<String> {
        ctx.check()?;
        let _guard = self.lock.read();
        self.read_active(id)
    }

    fn update_content(&self, ctx: &OpContext, id: &str, section: &str, content: &str) -> Result<()> {
        ctx.check()?;
        let _guard = self.lock.write();
        let raw = self.read_active(id)?;
        let updated = format::splice_section(&raw, section, content)?;
        self.write_atomic(&self.active_path(id), &updated)?;
        debug!(id, section, "updated todo section");
        Ok(())
    }

    fn exists(&self, ctx: &OpContext, id: &str) -> Result<bool> {
        ctx.check()?;
        check_id(id)?;
        let _guard = self.lock.read();
        Ok(self.active_path(id).is_file())
    }
}

/// Ids double as file stems, so they must stay inside the store directory.
fn check_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(TodoError::validation("todo id cannot be empty"));
    }
    if id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        return Err(TodoError::validation(format!("invalid todo id: {id:?}")));
    }
    Ok(())
}

fn check_archive_path(archive_path: &str) -> Result<()> {
    let ok = !archive_path.is_empty()
        && Path::new(archive_path).components().all(|c| matches!(c, Component::Normal(_)));
    if ok { Ok(()) } else { Err(TodoError::validation(format!("invalid archive path: {archive_path:?}"))) }
}
