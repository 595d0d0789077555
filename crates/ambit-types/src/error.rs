use compact_str::CompactString;
use std::sync::Arc;
use thiserror::Error;

/// Opaque collaborator fault, carried through uninterpreted.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error taxonomy of the context runtime.
#[derive(Debug, Error)]
pub enum AmbitError {
    /// No record of the requested type anywhere in the scope chain.
    #[error("no state record of type `{type_name}` in scope chain of {scope}")]
    MissingState {
        type_name: &'static str,
        scope: CompactString,
    },

    /// The dependency's async preparation factory faulted.
    #[error("dependency `{type_name}` failed to prepare: {source}")]
    DependencyFailed {
        type_name: &'static str,
        source: BoxError,
    },

    /// A disposable member failed to acquire. Members that had already
    /// succeeded were released before this was raised.
    #[error("resource setup failed: {0}")]
    SetupFailed(BoxError),

    /// One or more disposable releases failed; every member was still
    /// attempted and all failures are collected here.
    #[error("{} resource release(s) failed", .0.len())]
    TeardownFailed(Vec<BoxError>),

    /// Cooperative cancellation was requested for the current unit of work.
    #[error("operation cancelled")]
    Cancelled,

    /// Terminal error of an async queue or stream.
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Terminal error of a single-consumer async sequence.
///
/// Clonable so an already-terminated queue/stream can keep reporting the same
/// outcome to further `next` calls.
#[derive(Clone, Debug, Error)]
pub enum SequenceError {
    #[error("sequence cancelled")]
    Cancelled,

    #[error("sequence failed: {0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),
}

impl SequenceError {
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(Arc::from(error.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
