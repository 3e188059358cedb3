// todos/src/config.rs

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, sync::Arc};
use tracing::warn;

use crate::repository::{FileTodoRepository, RepositoryOptions};

/// Config is merged: system -> user -> workspace -> runtime (ephemeral)
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub todos: TodosConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TodosConfig {
    pub dir: Option<PathBuf>,          // default: <workspace>/.codex/todos
    pub file_mode: Option<u32>,        // default: 0o600
    pub dir_mode: Option<u32>,         // default: 0o750
    pub probe_existing_ids: Option<bool>,
}

impl TodosConfig {
    pub fn repository_options(&self) -> RepositoryOptions {
        let d = RepositoryOptions::default();
        RepositoryOptions {
            file_mode: self.file_mode.unwrap_or(d.file_mode),
            dir_mode: self.dir_mode.unwrap_or(d.dir_mode),
        }
    }

    /// Store directory; relative paths resolve against the workspace root.
    pub fn store_dir(&self, workspace_root: &Path) -> PathBuf {
        match &self.dir {
            Some(d) if d.is_absolute() => d.clone(),
            Some(d) => workspace_root.join(d),
            None => workspace_root.join(".codex").join("todos"),
        }
    }

    pub fn probe_existing_ids(&self) -> bool { self.probe_existing_ids.unwrap_or(true) }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope { System, User, Workspace, Runtime }

#[derive(Clone, Debug)]
pub struct ConfigManager {
    inner: Arc<RwLock<Config>>,
    runtime_overlay: Arc<RwLock<Config>>,
    system_dir: PathBuf,
    user_dir: PathBuf,
    workspace_dir: PathBuf,
    workspace_root: PathBuf,
}

impl ConfigManager {
    pub fn load(workspace_root: impl AsRef<Path>) -> Result<Self> {
        let proj = ProjectDirs::from("com", "openai", "codex").context("ProjectDirs")?;
        let system_dir = if cfg!(target_os="windows") { PathBuf::from(r"C:\ProgramData\Codex") } else { PathBuf::from("/etc/codex") };
        let root = workspace_root.as_ref();
        Self::with_dirs(root, system_dir, proj.config_dir().to_path_buf(), root.join(".codex"))
    }

    /// Explicit scope directories; missing directories are treated as empty.
    pub fn with_dirs(workspace_root: impl AsRef<Path>, system_dir: PathBuf, user_dir: PathBuf, workspace_dir: PathBuf) -> Result<Self> {
        let me = Self {
            inner: Arc::new(RwLock::new(Config::default())),
            runtime_overlay: Arc::new(RwLock::new(Config::default())),
            system_dir, user_dir, workspace_dir,
            workspace_root: workspace_root.as_ref().to_path_buf(),
        };
        me.reload_all()?;
        Ok(me)
    }

    fn read_yaml_dir(dir: &Path) -> Config {
        // Merge all *.yaml in directory (lexicographic order)
        let mut cfg = Config::default();
        let Ok(rd) = fs::read_dir(dir) else { return cfg; };
        let mut files: Vec<PathBuf> = rd.filter_map(|e| e.ok().map(|x| x.path()))
                                        .filter(|p| p.extension().is_some_and(|e| e=="yaml"||e=="yml"))
                                        .collect();
        files.sort();
        for f in files {
            let parsed = fs::read_to_string(&f)
                .map_err(anyhow::Error::from)
                .and_then(|text| serde_yml::from_str::<Config>(&text).map_err(anyhow::Error::from));
            match parsed {
                Ok(part) => merge(&mut cfg, &part),
                Err(e) => warn!(path = %f.display(), error = %e, "skipping config file"),
            }
        }
        cfg
    }

    pub fn reload_all(&self) -> Result<()> {
        let mut merged = Config::default();
        merge(&mut merged, &Self::read_yaml_dir(&self.system_dir));
        merge(&mut merged, &Self::read_yaml_dir(&self.user_dir));
        merge(&mut merged, &Self::read_yaml_dir(&self.workspace_dir));
        // runtime overlay (in-memory)
        let rt = self.runtime_overlay.read().clone();
        merge(&mut merged, &rt);
        *self.inner.write() = merged;
        Ok(())
    }

    pub fn get(&self) -> Config { self.inner.read().clone() }

    /// In-memory overlay (not persisted).
    pub fn apply_runtime_overlay(&self, patch: Config) -> Result<()> {
        {
            let mut rt = self.runtime_overlay.write();
            merge(&mut *rt, &patch);
        }
        self.reload_all()
    }

    /// Persist a patch into one scope directory as `<name>`.
    pub fn write_patch_file(&self, scope: Scope, name: &str, patch: &Config) -> Result<PathBuf> {
        use std::io::Write;
        let dir = match scope {
            Scope::System => &self.system_dir,
            Scope::User => &self.user_dir,
            Scope::Workspace => &self.workspace_dir,
            Scope::Runtime => anyhow::bail!("runtime scope is not persisted"),
        };
        fs::create_dir_all(dir).with_context(|| format!("create config dir {}", dir.display()))?;
        let path = dir.join(name);
        let text = serde_yml::to_string(patch).context("serialize config yaml")?;
        let mut f = fs::File::create(&path)?;
        f.write_all(text.as_bytes())?;
        self.reload_all()?;
        Ok(path)
    }

    pub fn store_dir(&self) -> PathBuf { self.get().todos.store_dir(&self.workspace_root) }

    /// A repository rooted at the configured store directory.
    pub fn open_repository(&self) -> FileTodoRepository {
        let cfg = self.get();
        FileTodoRepository::with_options(cfg.todos.store_dir(&self.workspace_root), cfg.todos.repository_options())
    }
}

fn merge(a: &mut Config, b: &Config) {
    if b.todos.dir.is_some() { a.todos.dir = b.todos.dir.clone(); }
    if b.todos.file_mode.is_some() { a.todos.file_mode = b.todos.file_mode; }
    if b.todos.dir_mode.is_some() { a.todos.dir_mode = b.todos.dir_mode; }
    if b.todos.probe_existing_ids.is_some() { a.todos.probe_existing_ids = b.todos.probe_existing_ids; }
}
