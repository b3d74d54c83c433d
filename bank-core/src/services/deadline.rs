use std::future::Future;
use std::time::{Duration, Instant};

use crate::domain::result::{Error, Result};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Upper bound on any single collaborator call
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    limit: Duration,
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new(DEFAULT_OPERATION_TIMEOUT)
    }
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Instant by which a balance mutation started now must commit
    ///
    /// Mutations are not raced against a timer: dropping one would not stop
    /// a write already handed to storage. Storage gets this instant instead
    /// and rolls back once it has passed.
    pub fn commit_by(&self) -> Instant {
        Instant::now() + self.limit
    }

    /// Await `call`, failing `Timeout` once the limit passes; the call is
    /// dropped at that point, so only use this for reads and inserts
    pub async fn run<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    limit_ms = self.limit.as_millis() as u64,
                    "operation timed out"
                );
                Err(Error::Timeout {
                    operation: operation.to_string(),
                })
            }
        }
    }
}

/// Fail `Timeout` if `commit_by` has passed; storage calls this before
/// committing a mutation
pub fn ensure_before(commit_by: Instant, operation: &str) -> Result<()> {
    if Instant::now() >= commit_by {
        tracing::warn!(operation, "deadline passed, write abandoned");
        return Err(Error::Timeout {
            operation: operation.to_string(),
        });
    }
    Ok(())
}
