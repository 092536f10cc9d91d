// ABOUTME: Extension points wrapping a unit of work with before/around/after behavior
// ABOUTME: Defines the invocation contract and the ordered interceptor chain

pub mod timeout;
pub mod watchdog;

pub use timeout::{TimeUnit, TimeoutInterceptor, TimeoutPolicy};
pub use watchdog::{WatchdogHandle, WatchdogScheduler};

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::engine::context::ExecutionContext;
use crate::engine::error::TestError;

/// A single callable unit of work representing "proceed with the next step".
///
/// An invocation is consumed by [`proceed`](Self::proceed), so ownership
/// enforces the at-most-once contract: a wrapper cannot call its delegate
/// twice. A wrapper that never proceeds simply drops the invocation and the
/// underlying unit never runs.
pub struct Invocation {
    future: BoxFuture<'static, Result<(), TestError>>,
    token: CancellationToken,
}

impl Invocation {
    pub fn new(token: CancellationToken, future: BoxFuture<'static, Result<(), TestError>>) -> Self {
        Self { future, token }
    }

    /// An invocation that does nothing, used for containers without a body.
    pub fn noop(token: CancellationToken) -> Self {
        Self::new(token, Box::pin(async { Ok(()) }))
    }

    /// The cancellation token the watchdog signals on timeout. Cooperative
    /// units check it at suspension points; units that ignore it keep running
    /// on their own thread after the invocation has been reported timed out.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn proceed(self) -> Result<(), TestError> {
        self.future.await
    }
}

/// Extension-contributed wrapper around a unit of work.
///
/// An interceptor may run code before calling `proceed` on its delegate, run
/// code after, replace the result, or replace a raised error. It must call
/// `proceed` at most once; skipping it entirely is a valid extension-specific
/// policy.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        invocation: Invocation,
        context: Arc<ExecutionContext>,
    ) -> Result<(), TestError>;
}

/// Folds an ordered list of interceptors around a raw invocation.
pub struct InterceptorChain;

impl InterceptorChain {
    /// Build the composed invocation. `interceptors` is ordered outer-to-inner
    /// (ancestor-contributed wrappers before node-local ones); invoking the
    /// returned invocation triggers the whole chain in that order. With no
    /// interceptors the chain degenerates to a pass-through.
    pub fn build(
        interceptors: &[Arc<dyn Interceptor>],
        context: &Arc<ExecutionContext>,
        raw: Invocation,
    ) -> Invocation {
        let mut invocation = raw;
        for interceptor in interceptors.iter().rev() {
            let interceptor = Arc::clone(interceptor);
            let context = Arc::clone(context);
            let token = invocation.cancellation_token();
            let inner = invocation;
            invocation = Invocation::new(
                token,
                Box::pin(async move { interceptor.intercept(inner, context).await }),
            );
        }
        invocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn context() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::root("node", "node"))
    }

    struct Tracing {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor for Tracing {
        async fn intercept(
            &self,
            invocation: Invocation,
            _context: Arc<ExecutionContext>,
        ) -> Result<(), TestError> {
            self.log.lock().push(format!("{}:before", self.name));
            let outcome = invocation.proceed().await;
            self.log.lock().push(format!("{}:after", self.name));
            outcome
        }
    }

    struct Suppressing;

    #[async_trait]
    impl Interceptor for Suppressing {
        async fn intercept(
            &self,
            invocation: Invocation,
            _context: Arc<ExecutionContext>,
        ) -> Result<(), TestError> {
            match invocation.proceed().await {
                Err(TestError::Failed { .. }) => Ok(()),
                other => other,
            }
        }
    }

    struct ShortCircuiting;

    #[async_trait]
    impl Interceptor for ShortCircuiting {
        async fn intercept(
            &self,
            invocation: Invocation,
            _context: Arc<ExecutionContext>,
        ) -> Result<(), TestError> {
            // deliberately never proceeds; the wrapped unit must not run
            drop(invocation);
            Ok(())
        }
    }

    #[tokio::test]
    async fn chain_runs_outer_to_inner_and_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Tracing {
                name: "outer",
                log: Arc::clone(&log),
            }),
            Arc::new(Tracing {
                name: "inner",
                log: Arc::clone(&log),
            }),
        ];

        let inner_log = Arc::clone(&log);
        let raw = Invocation::new(
            CancellationToken::new(),
            Box::pin(async move {
                inner_log.lock().push("body".to_string());
                Ok(())
            }),
        );

        InterceptorChain::build(&interceptors, &context(), raw)
            .proceed()
            .await
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec!["outer:before", "inner:before", "body", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn empty_chain_is_a_pass_through() {
        let raw = Invocation::new(
            CancellationToken::new(),
            Box::pin(async { Err(TestError::failed("boom")) }),
        );
        let outcome = InterceptorChain::build(&[], &context(), raw).proceed().await;
        assert!(matches!(outcome, Err(TestError::Failed { .. })));
    }

    #[tokio::test]
    async fn a_wrapper_may_replace_a_raised_error() {
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(Suppressing)];
        let raw = Invocation::new(
            CancellationToken::new(),
            Box::pin(async { Err(TestError::failed("swallowed")) }),
        );

        let outcome = InterceptorChain::build(&interceptors, &context(), raw)
            .proceed()
            .await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn a_wrapper_may_skip_the_underlying_unit() {
        let ran = Arc::new(Mutex::new(false));
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(ShortCircuiting)];

        let flag = Arc::clone(&ran);
        let raw = Invocation::new(
            CancellationToken::new(),
            Box::pin(async move {
                *flag.lock() = true;
                Ok(())
            }),
        );

        InterceptorChain::build(&interceptors, &context(), raw)
            .proceed()
            .await
            .unwrap();
        assert!(!*ran.lock());
    }
}
