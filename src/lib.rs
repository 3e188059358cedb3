pub mod adapter;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod ident;
pub mod repository;
pub mod service;
pub mod todo;

pub use adapter::{ErrorRecord, SectionRecord, TodoRecord};
pub use config::{Config, ConfigManager, Scope, TodosConfig};
pub use context::OpContext;
pub use error::{ErrorKind, Result, ResultExt, TodoError};
pub use ident::{derive_base_id, IdAllocator};
pub use repository::{FileTodoRepository, ListOutcome, RepositoryOptions, SkippedFile, TodoFilter, TodoRepository};
pub use service::{archive_path_for, NewTodo, TodoService};
pub use todo::{SectionDefinition, Todo};
