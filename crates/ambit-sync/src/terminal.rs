use ambit_types::SequenceError;

/// Monotonic end state shared by the queue and stream primitives.
/// Once set it never transitions again.
#[derive(Clone, Debug)]
pub(crate) enum Terminal {
    Finished,
    Failed(SequenceError),
}

impl Terminal {
    pub(crate) fn resolve<T>(&self) -> Result<Option<T>, SequenceError> {
        match self {
            Terminal::Finished => Ok(None),
            Terminal::Failed(error) => Err(error.clone()),
        }
    }
}
