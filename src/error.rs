// todos/src/error.rs

use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T, E = TodoError> = std::result::Result<T, E>;

/// Coarse category of a [`TodoError`], stable across context wrapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Validation,
    /// Archiving onto an existing archived file.
    Conflict,
    Operation,
    /// Reserved; filesystem permission failures classify as `Operation`.
    Permission,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Operation => "operation",
            Self::Permission => "permission",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("todo not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Operation(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<TodoError>,
    },
}

impl TodoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { op, path: path.into(), source }
    }

    /// Classify the error, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Io { .. } | Self::Operation(_) | Self::Cancelled => ErrorKind::Operation,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// The innermost error once all context wrappers are peeled off.
    pub fn root(&self) -> &TodoError {
        let mut cur = self;
        while let Self::Context { source, .. } = cur {
            cur = source;
        }
        cur
    }

    pub fn is(&self, kind: ErrorKind) -> bool { self.kind() == kind }
    pub fn is_not_found(&self) -> bool { self.is(ErrorKind::NotFound) }
    pub fn is_validation(&self) -> bool { self.is(ErrorKind::Validation) }
    pub fn is_operation(&self) -> bool { self.is(ErrorKind::Operation) }

    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context { context: context.into(), source: Box::new(self) }
    }
}

/// Attach a short operation description to a failing store call.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
