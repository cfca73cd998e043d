//! Polling of long running operations.
//!
//! Every asynchronous platform call (workspace creation, capacity assignment,
//! git sync, notebook jobs, definition retrieval) hands back an
//! [`OperationHandle`]. [`LroPoller`] is the only place that waits on one.
//!
//! ```rust,no_run
//! use platform::{Accepted, FabricClient, FabricConfig, LroPoller, PollPolicy, WorkspacePlatform};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FabricClient::new(FabricConfig::default(), "token")?;
//! let poller = LroPoller::new(PollPolicy::default());
//!
//! if let Accepted::Pending(handle) = client.assign_to_capacity("ws-id", "cap-id").await? {
//!     poller.wait(&client, &handle).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::PollPolicy;
use crate::provider::{ApiError, ApiResult, OperationSource};
use crate::types::{Accepted, OperationHandle, OperationKind, OperationState, OperationStatus};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct LroPoller {
    policy: PollPolicy,
}

impl LroPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Polls until the operation is terminal.
    ///
    /// Returns the final state on success, [`ApiError::OperationFailed`] with the
    /// platform's error payload on failure or cancellation, and
    /// [`ApiError::OperationTimeout`] once the attempt or wall-clock bound is hit.
    pub async fn wait<S>(&self, source: &S, handle: &OperationHandle) -> ApiResult<OperationState>
    where
        S: OperationSource + ?Sized,
    {
        let started = Instant::now();
        info!(operation = %handle, "Polling long running operation");

        if !self.policy.initial_delay.is_zero() {
            tokio::time::sleep(self.policy.initial_delay).await;
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let state = source.operation_state(handle).await?;
            debug!(
                operation = %handle,
                attempt = attempts,
                status = ?state.status,
                percent_complete = ?state.percent_complete,
                "Operation status"
            );

            match state.status {
                OperationStatus::Succeeded => {
                    info!(operation = %handle, attempts, "Operation succeeded");
                    return Ok(state);
                }
                OperationStatus::Failed | OperationStatus::Cancelled => {
                    let detail = state.failure_detail();
                    warn!(operation = %handle, status = ?state.status, %detail, "Operation did not succeed");
                    return Err(ApiError::OperationFailed {
                        status: state.status,
                        detail,
                    });
                }
                _ => {}
            }

            let elapsed = started.elapsed();
            if attempts >= self.policy.max_attempts || elapsed >= self.policy.timeout {
                warn!(operation = %handle, attempts, ?elapsed, "Operation did not finish in time");
                return Err(ApiError::OperationTimeout { attempts, elapsed });
            }

            let delay = self
                .next_delay(handle)
                .min(self.policy.timeout.saturating_sub(elapsed));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Like [`wait`](Self::wait), then fetches the operation's result payload
    /// into [`OperationState::result`]. Job instances have no result resource
    /// and come back with `result` unset.
    pub async fn wait_for_result<S>(
        &self,
        source: &S,
        handle: &OperationHandle,
    ) -> ApiResult<OperationState>
    where
        S: OperationSource + ?Sized,
    {
        let mut state = self.wait(source, handle).await?;
        if handle.kind != OperationKind::JobInstance {
            state.result = Some(source.operation_result(handle).await?);
        }
        Ok(state)
    }

    /// Finishes an [`Accepted`] reply: inline values pass through, pending
    /// operations are polled and their result payload decoded.
    pub async fn settle<S, T>(&self, source: &S, accepted: Accepted<T>) -> ApiResult<T>
    where
        S: OperationSource + ?Sized,
        T: DeserializeOwned,
    {
        match accepted {
            Accepted::Completed(value) => Ok(value),
            Accepted::Pending(handle) => {
                let state = self.wait_for_result(source, &handle).await?;
                Ok(serde_json::from_value(
                    state.result.unwrap_or(serde_json::Value::Null),
                )?)
            }
        }
    }

    /// Finishes an [`Accepted`] reply whose success carries no payload.
    pub async fn complete<S>(&self, source: &S, accepted: Accepted<()>) -> ApiResult<()>
    where
        S: OperationSource + ?Sized,
    {
        if let Accepted::Pending(handle) = accepted {
            self.wait(source, &handle).await?;
        }
        Ok(())
    }

    fn next_delay(&self, handle: &OperationHandle) -> Duration {
        match handle.retry_after {
            Some(retry_after) => retry_after.min(self.policy.max_retry_after()),
            None => self.policy.interval,
        }
    }
}
