//! The context engine: scope frames, ambient state lookup and propagation,
//! metrics binding, the process dependency cache, disposable groups, and the
//! background-task lifecycle.
//!
//! The ambient current scope lives in a task-local cell. Entering a scope
//! installs a new frame for exactly the lifetime of the scope body; spawned
//! tasks are seeded with a snapshot frame at spawn time.

use std::sync::Arc;

tokio::task_local! {
    pub(crate) static CURRENT_FRAME: Arc<scope::ScopeFrame>;
}

mod deps;
mod disposables;
mod metrics;
mod registry;
mod scope;
mod task;
mod vars;

pub use deps::{Dependency, DependencyCache, dependencies};
pub use disposables::{Disposable, DisposableGroup, with_resources};
pub use metrics::{MetricsSink, record_metric};
pub use registry::shutdown_background_tasks;
pub use scope::{
    ScopeBuilder, cancel_current, cancelled, checkpoint, current_cancel_token, current_identity,
    lookup, publish, scope,
};
pub use task::{TaskError, TaskHandle, bridge, spawn};
pub use vars::StateEntry;

/// Clones the current task's innermost scope frame, if any.
pub(crate) fn current_frame() -> Option<Arc<scope::ScopeFrame>> {
    CURRENT_FRAME.try_with(Arc::clone).ok()
}
