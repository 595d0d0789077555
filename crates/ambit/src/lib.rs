//! Umbrella crate: one dependency pulls in the whole context toolkit.
//!
//! Most applications only need this crate. The scope tree, ambient state,
//! background tasks, and dependency cache live in [`runtime`]; queues,
//! streams, and cancellation tokens in [`sync`]; plain data types in
//! [`types`]. Everything commonly used is re-exported flat here.

pub use ambit_runtime as runtime;
pub use ambit_sync as sync;
pub use ambit_types as types;

pub use ambit_runtime::{
    Dependency, DependencyCache, Disposable, DisposableGroup, MetricsSink, ScopeBuilder,
    StateEntry, TaskError, TaskHandle, bridge, cancel_current, cancelled, checkpoint,
    current_cancel_token, current_identity, dependencies, lookup, publish, record_metric, scope,
    shutdown_background_tasks, spawn, with_resources,
};
pub use ambit_sync::{
    AsyncQueue, AsyncStream, CancelToken, Emitter, QueueSender, SequenceError, StreamSender, queue,
    stream,
};
pub use ambit_types::{AmbitError, BoxError, Metric, MetricKind, ScopeId, ScopeIdentity, TraceId};

/// Emits a tracing event tagged with the current scope's unique name, so log
/// lines from concurrent flows stay attributable.
pub fn log(level: tracing::Level, message: &str) {
    let scope = current_identity()
        .map(|identity| identity.unique_name())
        .unwrap_or_else(|| "-".into());
    if level == tracing::Level::ERROR {
        tracing::error!(scope = %scope, "{message}");
    } else if level == tracing::Level::WARN {
        tracing::warn!(scope = %scope, "{message}");
    } else if level == tracing::Level::INFO {
        tracing::info!(scope = %scope, "{message}");
    } else if level == tracing::Level::DEBUG {
        tracing::debug!(scope = %scope, "{message}");
    } else {
        tracing::trace!(scope = %scope, "{message}");
    }
}

/// Resolves the process-wide singleton of type `T`, preparing it on first
/// use. Shorthand for [`dependencies()`](dependencies)`.resolve()`.
pub async fn resolve<T: Dependency>() -> Result<std::sync::Arc<T>, AmbitError> {
    dependencies().resolve().await
}

/// Installs (or replaces) the process-wide singleton of type `T`.
pub async fn register<T: Dependency>(instance: T) {
    dependencies().register(instance).await;
}

/// Disposes every process-wide dependency singleton. Call once at shutdown,
/// after [`shutdown_background_tasks`].
pub async fn shutdown_dependencies() {
    dependencies().dispose_all().await;
}
