//! Shared leaf types for ambit.
//!
//! Identifiers, the immutable scope-identity tree node, metric values and the
//! error taxonomy live here so every subcrate can use them without circular
//! dependencies.

mod error;
mod identity;
mod metric;
mod primitives;

pub use error::{AmbitError, BoxError, SequenceError};
pub use identity::ScopeIdentity;
pub use metric::{Metric, MetricKind};
pub use primitives::{ScopeId, TraceId};
