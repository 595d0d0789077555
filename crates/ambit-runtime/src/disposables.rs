use ambit_types::{AmbitError, BoxError};
use async_trait::async_trait;
use futures::future::join_all;

use crate::current_frame;
use crate::vars::StateEntry;

/// A scope-bound resource with paired async setup and teardown.
///
/// `setup` may hand back state entries to publish into the surrounding
/// scope, so sibling code can look the resource up by type.
#[async_trait]
pub trait Disposable: Send {
    async fn setup(&mut self) -> Result<Vec<StateEntry>, BoxError>;

    async fn dispose(&mut self) -> Result<(), BoxError>;
}

/// An ordered collection of disposables set up and torn down together.
#[derive(Default)]
pub struct DisposableGroup {
    members: Vec<Box<dyn Disposable>>,
}

impl DisposableGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, member: impl Disposable + 'static) {
        self.members.push(Box::new(member));
    }

    pub fn with(mut self, member: impl Disposable + 'static) -> Self {
        self.push(member);
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Runs every member's setup concurrently. If any fail, the members that
    /// did succeed are disposed before the first failure is returned, so a
    /// partial initialization never leaks resources.
    pub async fn initialize(&mut self) -> Result<Vec<StateEntry>, AmbitError> {
        let results = join_all(self.members.iter_mut().map(|member| member.setup())).await;

        let mut entries = Vec::new();
        let mut ready = Vec::new();
        let mut first_failure = None;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(mut published) => {
                    entries.append(&mut published);
                    ready.push(index);
                }
                Err(error) => {
                    if first_failure.is_none() {
                        first_failure = Some(error);
                    }
                }
            }
        }

        let Some(failure) = first_failure else {
            return Ok(entries);
        };

        let cleanups = self
            .members
            .iter_mut()
            .enumerate()
            .filter(|(index, _)| ready.contains(index))
            .map(|(_, member)| member.dispose());
        for result in join_all(cleanups).await {
            if let Err(error) = result {
                tracing::warn!(%error, "cleanup after failed setup also failed");
            }
        }
        Err(AmbitError::SetupFailed(failure))
    }

    /// Tears every member down concurrently. All members get a disposal
    /// attempt even when some fail; failures are collected into one error.
    pub async fn dispose(&mut self) -> Result<(), AmbitError> {
        let results = join_all(self.members.iter_mut().map(|member| member.dispose())).await;
        let failures: Vec<BoxError> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AmbitError::TeardownFailed(failures))
        }
    }
}

/// Sets the group up, publishes its state entries into the current scope,
/// runs `body`, and disposes the group afterwards whether or not the body
/// succeeded. A body error takes precedence over a teardown error.
pub async fn with_resources<F, R>(mut group: DisposableGroup, body: F) -> Result<R, AmbitError>
where
    F: Future<Output = Result<R, AmbitError>>,
{
    let entries = group.initialize().await?;
    if let Some(frame) = current_frame() {
        for entry in entries {
            frame.publish_entry(entry);
        }
    }

    let outcome = body.await;
    let teardown = group.dispose().await;
    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(error)) => Err(error),
        (Err(error), teardown) => {
            if let Err(secondary) = teardown {
                tracing::warn!(error = %secondary, "teardown failed after body error");
            }
            Err(error)
        }
    }
}
