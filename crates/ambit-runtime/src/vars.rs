use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub(crate) type AnyRecord = Arc<dyn Any + Send + Sync>;

/// One type-erased state record plus the type name used in diagnostics.
///
/// Records are immutable: a scope overrides a type by publishing a new
/// record, never by mutating an existing one.
#[derive(Clone)]
pub struct StateEntry {
    pub(crate) key: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) value: AnyRecord,
}

impl StateEntry {
    pub fn of<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            key: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for StateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEntry")
            .field("type", &self.type_name)
            .finish()
    }
}

/// Type-keyed map of state records local to one scope frame.
#[derive(Default)]
pub(crate) struct StateMap {
    entries: HashMap<TypeId, StateEntry>,
}

impl StateMap {
    pub(crate) fn insert_entry(&mut self, entry: StateEntry) {
        self.entries.insert(entry.key, entry);
    }

    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.insert_entry(StateEntry::of(value));
    }

    pub(crate) fn get(&self, key: TypeId) -> Option<AnyRecord> {
        self.entries.get(&key).map(|e| Arc::clone(&e.value))
    }

    /// Shallow last-writer-wins copy into `target`: every local entry
    /// overwrites the same key there.
    pub(crate) fn merge_into(&self, target: &mut StateMap) {
        for entry in self.entries.values() {
            target.insert_entry(entry.clone());
        }
    }
}
