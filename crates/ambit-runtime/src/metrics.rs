use ambit_types::{BoxError, Metric, ScopeIdentity};

use crate::current_frame;
use crate::scope::ScopeFrame;

/// Pluggable metrics recorder bound to a scope subtree.
///
/// Sinks are best-effort: every error they return is downgraded to a
/// diagnostic log line and never reaches the instrumented caller. An unbound
/// scope and an inert sink are equivalent — both no-op.
pub trait MetricsSink: Send + Sync {
    fn enter_scope(&self, scope: &ScopeIdentity) -> Result<(), BoxError> {
        let _ = scope;
        Ok(())
    }

    fn exit_scope(&self, scope: &ScopeIdentity) -> Result<(), BoxError> {
        let _ = scope;
        Ok(())
    }

    fn record(&self, scope: &ScopeIdentity, metric: &Metric) -> Result<(), BoxError>;
}

pub(crate) fn emit_enter(frame: &ScopeFrame) {
    if let Some(sink) = frame.sink() {
        if let Err(error) = sink.enter_scope(frame.identity()) {
            tracing::warn!(
                scope = %frame.identity(),
                %error,
                "metrics sink rejected scope enter"
            );
        }
    }
}

pub(crate) fn emit_exit(frame: &ScopeFrame) {
    if let Some(sink) = frame.sink() {
        if let Err(error) = sink.exit_scope(frame.identity()) {
            tracing::warn!(
                scope = %frame.identity(),
                %error,
                "metrics sink rejected scope exit"
            );
        }
    }
}

/// Delivers a metric to the nearest bound sink. No-op without a scope or a
/// binding; sink failures are logged, never raised.
pub fn record_metric(metric: Metric) {
    let Some(frame) = current_frame() else {
        tracing::debug!(%metric, "metric recorded outside any scope; dropped");
        return;
    };
    if let Some(sink) = frame.sink() {
        if let Err(error) = sink.record(frame.identity(), &metric) {
            tracing::warn!(
                scope = %frame.identity(),
                %metric,
                %error,
                "metrics sink rejected metric"
            );
        }
    }
}
