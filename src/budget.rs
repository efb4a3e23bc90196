use crate::error::{Dependency, DependencyFailure, Error, Result, StoreError};
use std::future::Future;
use std::time::Duration;

/// Time budget applied to each collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallBudget {
    limit: Option<Duration>,
}

impl CallBudget {
    pub(crate) fn new(limit: Option<Duration>) -> Self {
        Self { limit }
    }

    /// Runs one collaborator call, mapping store errors and timeouts to
    /// [`Error::DependencyUnavailable`].
    pub(crate) async fn call<T, F>(
        &self,
        dependency: Dependency,
        operation: &'static str,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        let outcome = match self.limit {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome.map_err(DependencyFailure::Failed),
                Err(_) => Err(DependencyFailure::TimedOut(limit)),
            },
            None => call.await.map_err(DependencyFailure::Failed),
        };
        outcome.map_err(|source| Error::DependencyUnavailable {
            dependency,
            operation,
            source,
        })
    }
}
