// ABOUTME: Per-node timeout policy and the interceptor enforcing it
// ABOUTME: Races the wrapped unit against a watchdog deadline and classifies the outcome

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::watchdog::WatchdogScheduler;
use super::{Interceptor, Invocation};
use crate::engine::context::ExecutionContext;
use crate::engine::error::{EngineError, TestError};
use crate::store::Namespace;

pub const TIMEOUT_KEY: &str = "timeout";

/// Store namespace holding the resolved timeout policy for a node. Ancestor
/// read-through of the store is what gives policies their inheritance: a node
/// without its own entry sees the nearest enclosing container's.
pub fn timeout_namespace() -> Namespace {
    Namespace::create(["trellis", "timeout"])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn to_duration(self, value: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(value),
            TimeUnit::Microseconds => Duration::from_micros(value),
            TimeUnit::Milliseconds => Duration::from_millis(value),
            TimeUnit::Seconds => Duration::from_secs(value),
            TimeUnit::Minutes => Duration::from_secs(value.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(value.saturating_mul(3600)),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
        };
        write!(f, "{name}")
    }
}

/// A declared execution time limit: magnitude plus unit.
///
/// The duration must be strictly positive; a non-positive value is a
/// configuration error raised here, before any invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    value: u64,
    unit: TimeUnit,
}

impl TimeoutPolicy {
    pub fn new(value: u64, unit: TimeUnit) -> Result<Self, EngineError> {
        if value == 0 {
            return Err(EngineError::Configuration {
                message: format!("timeout must be positive: {value}"),
            });
        }
        Ok(Self { value, unit })
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn duration(&self) -> Duration {
        self.unit.to_duration(self.value)
    }
}

/// Interceptor enforcing the node's resolved timeout policy.
///
/// Holds an explicitly injected handle to the shared watchdog scheduler; the
/// engine constructs exactly one scheduler per run and hands it to this
/// wrapper. When no policy resolves for a node the interceptor is a
/// pass-through.
pub struct TimeoutInterceptor {
    scheduler: Arc<WatchdogScheduler>,
}

impl TimeoutInterceptor {
    pub fn new(scheduler: Arc<WatchdogScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Interceptor for TimeoutInterceptor {
    async fn intercept(
        &self,
        invocation: Invocation,
        context: Arc<ExecutionContext>,
    ) -> Result<(), TestError> {
        let policy = context
            .store()
            .get::<TimeoutPolicy>(&timeout_namespace(), TIMEOUT_KEY);
        match policy {
            None => invocation.proceed().await,
            Some(policy) => {
                debug!(
                    node_id = %context.node_id(),
                    "enforcing timeout of {} {}", policy.value(), policy.unit()
                );
                TimeoutInvocation {
                    delegate: invocation,
                    policy: *policy,
                    scheduler: Arc::clone(&self.scheduler),
                }
                .proceed()
                .await
            }
        }
    }
}

struct TimeoutInvocation {
    delegate: Invocation,
    policy: TimeoutPolicy,
    scheduler: Arc<WatchdogScheduler>,
}

impl TimeoutInvocation {
    async fn proceed(self) -> Result<(), TestError> {
        let token = self.delegate.cancellation_token();
        let interrupt = {
            let token = token.clone();
            move || token.cancel()
        };
        let watchdog = self
            .scheduler
            .schedule(self.policy.duration(), interrupt)
            .map_err(|error| TestError::failed(error.to_string()))?;

        let mut failure = None;
        let unit = self.delegate.proceed();
        tokio::pin!(unit);
        tokio::select! {
            biased;
            outcome = &mut unit => {
                if let Err(error) = outcome {
                    failure = Some(error);
                }
            }
            _ = token.cancelled() => {
                debug!("watchdog fired; abandoning the running unit");
            }
        }

        // re-check after the unit returns: once the watchdog has committed to
        // firing, the race resolves as a timeout even if the unit finished
        if !watchdog.cancel() {
            failure = Some(TestError::Timeout {
                value: self.policy.value(),
                unit: self.policy.unit(),
                suppressed: failure.map(Box::new),
            });
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
