use compact_str::CompactString;
use std::fmt;

use crate::primitives::{ScopeId, TraceId, next_scope_id, next_trace_id};

/// Immutable identity node in the scope tree.
///
/// Created once per scope entry and never mutated afterwards. Child scopes
/// and spawned tasks reference (clone) the identity; they never rewrite it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScopeIdentity {
    trace_id: TraceId,
    parent_id: ScopeId,
    scope_id: ScopeId,
    label: CompactString,
}

impl ScopeIdentity {
    /// Synthesizes a fresh root: new trace id, `parent_id == trace_id`.
    pub fn root(label: impl Into<CompactString>) -> Self {
        let trace_id = next_trace_id();
        let parent_id = ScopeId::new(trace_id.as_str());
        Self {
            trace_id,
            parent_id,
            scope_id: next_scope_id(),
            label: label.into(),
        }
    }

    /// Derives a child: same trace, parent id = this scope's id, fresh scope id.
    pub fn child(&self, label: impl Into<CompactString>) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            parent_id: self.scope_id.clone(),
            scope_id: next_scope_id(),
            label: label.into(),
        }
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    pub fn parent_id(&self) -> &ScopeId {
        &self.parent_id
    }

    pub fn scope_id(&self) -> &ScopeId {
        &self.scope_id
    }

    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.as_str() == self.trace_id.as_str()
    }

    /// Deterministic diagnostic name: `[trace_id][label][scope_id]`.
    pub fn unique_name(&self) -> String {
        format!("[{}][{}][{}]", self.trace_id, self.label, self.scope_id)
    }
}

impl fmt::Display for ScopeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}][{}]", self.trace_id, self.label, self.scope_id)
    }
}

#[cfg(test)]
mod tests {
    use super::ScopeIdentity;

    #[test]
    fn root_points_at_its_own_trace() {
        let root = ScopeIdentity::root("job");
        assert!(root.is_root());
        assert_eq!(root.parent_id().as_str(), root.trace_id().as_str());
        assert_eq!(root.label(), "job");
    }

    #[test]
    fn child_keeps_the_trace_and_links_to_the_parent() {
        let root = ScopeIdentity::root("job");
        let child = root.child("step");
        assert!(!child.is_root());
        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.parent_id(), root.scope_id());
        assert_ne!(child.scope_id(), root.scope_id());
    }

    #[test]
    fn unique_name_composes_trace_label_scope() {
        let root = ScopeIdentity::root("job");
        let expected = format!("[{}][job][{}]", root.trace_id(), root.scope_id());
        assert_eq!(root.unique_name(), expected);
    }
}
