// ABOUTME: Safe execution wrapper classifying a unit of work's outcome
// ABOUTME: Captures abort/failure/timeout, re-raises fatal conditions unconverted

use super::error::TestError;
use super::result::ExecutionResult;
use crate::extension::Invocation;

/// Run one unit of work and classify the outcome.
///
/// Completing without error is successful; an abort signal becomes
/// `Aborted(cause)`; any other error becomes `Failed(cause)` — except fatal
/// conditions, which are returned as `Err` unconverted. Reporting a fatal
/// condition as an ordinary failure would mask a compromised execution
/// environment, so it must terminate the enclosing run instead.
pub async fn execute_safely(invocation: Invocation) -> Result<ExecutionResult, TestError> {
    match invocation.proceed().await {
        Ok(()) => Ok(ExecutionResult::successful()),
        Err(error) => {
            if error.is_fatal() {
                return Err(error);
            }
            if matches!(error, TestError::Aborted { .. }) {
                Ok(ExecutionResult::aborted(error))
            } else {
                Ok(ExecutionResult::failed(error))
            }
        }
    }
}
