use std::any::{TypeId, type_name};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ambit_sync::CancelToken;
use ambit_types::{AmbitError, ScopeIdentity};
use compact_str::CompactString;
use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::vars::{AnyRecord, StateEntry, StateMap};
use crate::{CURRENT_FRAME, current_frame, metrics};

/// One node of the live scope chain.
///
/// The chain is a parent-linked list: a frame never mutates its parent's map
/// directly; propagation is a one-shot copy at close. The maps carry a mutex
/// only because spawned tasks keep the chain alive and may look upward while
/// the owner is still publishing.
pub(crate) struct ScopeFrame {
    identity: ScopeIdentity,
    parent: Option<Arc<ScopeFrame>>,
    isolated: bool,
    vars: Mutex<StateMap>,
    sink: Option<Arc<dyn metrics::MetricsSink>>,
    cancel: CancelToken,
    tasks: Mutex<Vec<AbortHandle>>,
    closed: AtomicBool,
}

impl ScopeFrame {
    /// Frame installed at a task boundary: the creator's identity and state
    /// visibility, isolated so nothing propagates back across the boundary,
    /// with a fresh cancellation token for the new unit of work.
    pub(crate) fn for_task(creator: Option<Arc<ScopeFrame>>, label: &str) -> Self {
        let identity = match &creator {
            Some(frame) => frame.identity.clone(),
            None => ScopeIdentity::root(label),
        };
        let sink = creator.as_ref().and_then(|f| f.sink.clone());
        Self {
            identity,
            parent: creator,
            isolated: true,
            vars: Mutex::new(StateMap::default()),
            sink,
            cancel: CancelToken::new(),
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn identity(&self) -> &ScopeIdentity {
        &self.identity
    }

    pub(crate) fn sink(&self) -> Option<&Arc<dyn metrics::MetricsSink>> {
        self.sink.as_ref()
    }

    pub(crate) fn adopt_task(&self, handle: AbortHandle) {
        self.tasks.lock().push(handle);
    }

    /// Nearest record of the keyed type, walking this frame to the root.
    pub(crate) fn lookup_raw(&self, key: TypeId) -> Option<AnyRecord> {
        let mut frame = Some(self);
        while let Some(f) = frame {
            if let Some(value) = f.vars.lock().get(key) {
                return Some(value);
            }
            frame = f.parent.as_deref();
        }
        None
    }

    pub(crate) fn publish_entry(&self, entry: StateEntry) {
        self.vars.lock().insert_entry(entry);
    }

    /// One-shot teardown: abort scope-owned tasks, propagate state upward
    /// unless isolated, fire metrics-exit. Runs on every exit path because
    /// the exit guard calls it from `Drop`.
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        if !self.isolated {
            if let Some(parent) = &self.parent {
                let local = self.vars.lock();
                local.merge_into(&mut parent.vars.lock());
            }
        }
        metrics::emit_exit(self);
    }
}

struct ExitGuard(Arc<ScopeFrame>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Starts building a scope entry. See [`ScopeBuilder::run`].
pub fn scope(label: impl Into<CompactString>) -> ScopeBuilder {
    ScopeBuilder {
        label: label.into(),
        isolated: false,
        sink: None,
        seed: StateMap::default(),
    }
}

/// Configures and enters a scope as a scoped acquisition: the frame exists
/// for exactly the lifetime of the body future and is torn down on every
/// exit path — normal return, early error, panic, or task abort.
pub struct ScopeBuilder {
    label: CompactString,
    isolated: bool,
    sink: Option<Arc<dyn metrics::MetricsSink>>,
    seed: StateMap,
}

impl ScopeBuilder {
    /// State published inside this scope (including seeds) is discarded at
    /// exit instead of propagating to the parent.
    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }

    /// Seeds an initial state record, visible immediately inside the scope.
    pub fn with<T: Send + Sync + 'static>(mut self, record: T) -> Self {
        self.seed.insert(record);
        self
    }

    /// Binds a metrics sink for this scope and its descendants. Nested
    /// scopes inherit the nearest binding; an inner override wins for its
    /// subtree without un-binding the outer one.
    pub fn sink(mut self, sink: Arc<dyn metrics::MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Enters the scope around `body`. With no current scope this
    /// synthesizes a fresh trace root; otherwise it derives a child of the
    /// current identity.
    pub async fn run<F: Future>(self, body: F) -> F::Output {
        let parent = current_frame();
        let identity = match &parent {
            Some(p) => p.identity.child(self.label.clone()),
            None => ScopeIdentity::root(self.label.clone()),
        };
        let sink = self
            .sink
            .or_else(|| parent.as_ref().and_then(|p| p.sink.clone()));
        let cancel = match &parent {
            Some(p) => p.cancel.clone(),
            None => CancelToken::new(),
        };
        let frame = Arc::new(ScopeFrame {
            identity,
            parent,
            isolated: self.isolated,
            vars: Mutex::new(self.seed),
            sink,
            cancel,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        metrics::emit_enter(&frame);
        let guard_frame = Arc::clone(&frame);
        CURRENT_FRAME
            .scope(frame, async move {
                let _exit = ExitGuard(guard_frame);
                body.await
            })
            .await
    }
}

/// Nearest record of type `T` in the current scope chain.
pub fn lookup<T: Send + Sync + 'static>() -> Result<Arc<T>, AmbitError> {
    let missing = |scope: CompactString| AmbitError::MissingState {
        type_name: type_name::<T>(),
        scope,
    };
    let Some(frame) = current_frame() else {
        return Err(missing("<no scope>".into()));
    };
    frame
        .lookup_raw(TypeId::of::<T>())
        .and_then(|any| any.downcast::<T>().ok())
        .ok_or_else(|| missing(frame.identity.unique_name().into()))
}

/// Publishes a record into the current scope's local store. Outside any
/// scope the record is dropped with a diagnostic; publishing is best-effort
/// by design.
pub fn publish<T: Send + Sync + 'static>(record: T) {
    match current_frame() {
        Some(frame) => frame.publish_entry(StateEntry::of(record)),
        None => {
            tracing::warn!(
                record = type_name::<T>(),
                "publish outside any scope; record dropped"
            );
        }
    }
}

/// Identity of the current scope, if any.
pub fn current_identity() -> Option<ScopeIdentity> {
    current_frame().map(|f| f.identity.clone())
}

/// Cancellation token of the current unit of work.
pub fn current_cancel_token() -> Option<CancelToken> {
    current_frame().map(|f| f.cancel.clone())
}

/// Requests cooperative cancellation of the current unit of work. Delivery
/// happens at the next suspension point that checks [`checkpoint`] or
/// selects on [`cancelled`].
pub fn cancel_current() {
    if let Some(frame) = current_frame() {
        frame.cancel.cancel();
    }
}

/// Errors with [`AmbitError::Cancelled`] once the current unit of work has
/// been asked to stop.
pub async fn checkpoint() -> Result<(), AmbitError> {
    let tripped = current_frame().is_some_and(|f| f.cancel.is_cancelled());
    if tripped {
        Err(AmbitError::Cancelled)
    } else {
        Ok(())
    }
}

/// Resolves when the current unit of work is cancelled; pends forever when
/// no scope is installed. Intended for `select!` arms.
pub async fn cancelled() {
    match current_frame() {
        Some(frame) => frame.cancel.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::{cancel_current, checkpoint, current_identity, lookup, publish, scope};
    use ambit_types::AmbitError;

    #[derive(Debug, PartialEq)]
    struct Counter {
        value: u64,
    }

    #[derive(Debug, PartialEq)]
    struct Tag(&'static str);

    #[tokio::test]
    async fn lookup_walks_to_the_root() {
        scope("outer")
            .with(Counter { value: 42 })
            .run(async {
                scope("inner")
                    .run(async {
                        assert_eq!(lookup::<Counter>().unwrap().value, 42);
                    })
                    .await;
            })
            .await;
    }

    #[tokio::test]
    async fn nearest_record_shadows_the_ancestor() {
        scope("outer")
            .with(Counter { value: 42 })
            .run(async {
                // Isolated: the override shadows during the scope and is
                // discarded at exit instead of propagating.
                scope("inner")
                    .isolated()
                    .with(Counter { value: 10 })
                    .run(async {
                        assert_eq!(lookup::<Counter>().unwrap().value, 10);
                    })
                    .await;
                assert_eq!(lookup::<Counter>().unwrap().value, 42);
            })
            .await;
    }

    #[tokio::test]
    async fn seeded_records_propagate_like_published_ones() {
        scope("outer")
            .with(Counter { value: 42 })
            .run(async {
                scope("inner")
                    .with(Counter { value: 10 })
                    .run(async {
                        assert_eq!(lookup::<Counter>().unwrap().value, 10);
                    })
                    .await;
                // Seeds are local entries, so a non-isolated exit copies
                // them up.
                assert_eq!(lookup::<Counter>().unwrap().value, 10);
            })
            .await;
    }

    #[tokio::test]
    async fn nested_publish_propagates_on_exit() {
        scope("outer")
            .run(async {
                assert!(matches!(
                    lookup::<Tag>(),
                    Err(AmbitError::MissingState { .. })
                ));
                scope("inner")
                    .run(async {
                        publish(Tag("set-inside"));
                        assert_eq!(lookup::<Tag>().unwrap().0, "set-inside");
                    })
                    .await;
                // Visible in the parent only after the child exited.
                assert_eq!(lookup::<Tag>().unwrap().0, "set-inside");
            })
            .await;
    }

    #[tokio::test]
    async fn isolated_scopes_discard_their_state() {
        scope("outer")
            .run(async {
                scope("inner")
                    .isolated()
                    .run(async {
                        publish(Tag("leaky"));
                        assert!(lookup::<Tag>().is_ok());
                    })
                    .await;
                assert!(matches!(
                    lookup::<Tag>(),
                    Err(AmbitError::MissingState { .. })
                ));
            })
            .await;
    }

    #[tokio::test]
    async fn propagation_still_runs_when_the_body_faults() {
        let result: Result<(), &str> = scope("outer")
            .run(async {
                let inner: Result<(), &str> = scope("inner")
                    .run(async {
                        publish(Tag("before-fault"));
                        Err("boom")
                    })
                    .await;
                assert_eq!(inner, Err("boom"));
                assert_eq!(lookup::<Tag>().unwrap().0, "before-fault");
                Ok(())
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn identities_nest_and_roots_synthesize_a_trace() {
        scope("root")
            .run(async {
                let root = current_identity().unwrap();
                assert!(root.is_root());
                scope("child")
                    .run(async {
                        let child = current_identity().unwrap();
                        assert_eq!(child.trace_id(), root.trace_id());
                        assert_eq!(child.parent_id(), root.scope_id());
                    })
                    .await;
            })
            .await;
    }

    #[tokio::test]
    async fn missing_state_names_type_and_scope() {
        scope("lonely")
            .run(async {
                let err = lookup::<Counter>().unwrap_err();
                let msg = err.to_string();
                assert!(msg.contains("Counter"), "{msg}");
                assert!(msg.contains("lonely"), "{msg}");
            })
            .await;
    }

    #[tokio::test]
    async fn cancellation_is_visible_at_checkpoints() {
        scope("job")
            .run(async {
                assert!(checkpoint().await.is_ok());
                cancel_current();
                assert!(matches!(
                    checkpoint().await,
                    Err(AmbitError::Cancelled)
                ));
                // Nested scopes share the unit of work's token.
                scope("step")
                    .run(async {
                        assert!(checkpoint().await.is_err());
                    })
                    .await;
            })
            .await;
    }
}
