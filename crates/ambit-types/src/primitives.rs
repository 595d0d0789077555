use compact_str::CompactString;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque textual trace identifier shared by every scope in one call tree.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId(CompactString);

impl TraceId {
    pub fn new(id: impl Into<CompactString>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque textual scope identifier, unique within the process.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(CompactString);

impl ScopeId {
    pub fn new(id: impl Into<CompactString>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn next_trace_id() -> TraceId {
    TraceId(next_opaque_id())
}

pub(crate) fn next_scope_id() -> ScopeId {
    ScopeId(next_opaque_id())
}

/// Process-prefixed counter id. The prefix mixes pid and wall clock so ids
/// from two processes in one log stream stay distinguishable.
fn next_opaque_id() -> CompactString {
    static PROCESS_PREFIX: OnceLock<u16> = OnceLock::new();
    static COUNTER: AtomicU64 = AtomicU64::new(1);

    let prefix = *PROCESS_PREFIX.get_or_init(|| {
        let pid = std::process::id() as u64;
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        ((seed ^ pid) & 0xFFFF) as u16
    });

    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    CompactString::from(format!("{prefix:04x}{counter:012x}"))
}

#[cfg(test)]
mod tests {
    use super::{next_scope_id, next_trace_id};

    #[test]
    fn ids_are_unique_and_share_the_process_prefix() {
        let a = next_scope_id();
        let b = next_scope_id();
        let t = next_trace_id();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 16);
        assert_eq!(&a.as_str()[..4], &b.as_str()[..4]);
        assert_eq!(&a.as_str()[..4], &t.as_str()[..4]);
    }
}
