use compact_str::CompactString;
use std::fmt;

/// A single metric observation delivered to the bound [`MetricsSink`].
///
/// [`MetricsSink`]: https://docs.rs/ambit-runtime
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    pub name: CompactString,
    pub kind: MetricKind,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    TimingMs,
}

impl Metric {
    pub fn counter(name: impl Into<CompactString>, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Counter,
            value,
        }
    }

    pub fn gauge(name: impl Into<CompactString>, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Gauge,
            value,
        }
    }

    pub fn timing_ms(name: impl Into<CompactString>, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::TimingMs,
            value,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MetricKind::Counter => "c",
            MetricKind::Gauge => "g",
            MetricKind::TimingMs => "ms",
        };
        write!(f, "{}:{}|{kind}", self.name, self.value)
    }
}
