// ABOUTME: Execution engine walking the node hierarchy depth-first
// ABOUTME: Opens and closes contexts per node, runs interceptor chains, aggregates results

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::context::ExecutionContext;
use super::error::{EngineError, Result};
use super::node::Node;
use super::result::{ExecutionReport, NodeReport};
use super::safe::execute_safely;
use crate::extension::timeout::{timeout_namespace, TimeoutInterceptor, TIMEOUT_KEY};
use crate::extension::watchdog::WatchdogScheduler;
use crate::extension::{Interceptor, InterceptorChain, Invocation};

/// Default grace period granted to the watchdog scheduler on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Walks a node hierarchy, invoking each node through its interceptor chain
/// and the safe executor, and aggregates results into an [`ExecutionReport`].
///
/// The engine owns the single shared [`WatchdogScheduler`] for the run and
/// injects it into the timeout interceptor, which is installed as the
/// outermost base wrapper on every node.
pub struct ExecutionEngine {
    watchdog: Arc<WatchdogScheduler>,
    base_interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ExecutionEngine {
    pub fn new() -> Result<Self> {
        let watchdog = Arc::new(WatchdogScheduler::new()?);
        let base_interceptors: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(TimeoutInterceptor::new(Arc::clone(&watchdog)))];
        Ok(Self {
            watchdog,
            base_interceptors,
        })
    }

    /// Execute the hierarchy rooted at `root` depth-first.
    ///
    /// Contexts close in post-order even when a subtree aborts early. A
    /// fatal error stops the walk and is returned as
    /// [`EngineError::Fatal`] after already-opened contexts have been closed.
    #[instrument(skip(self, root), fields(root_id = %root.id()))]
    pub async fn execute(&self, root: Node) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::new();
        info!(run_id = %report.run_id, "starting execution run");

        let outcome = self
            .execute_node(root, None, self.base_interceptors.clone(), &mut report)
            .await;
        report.mark_completed();
        outcome?;

        info!(
            run_id = %report.run_id,
            total = report.summary.total_nodes,
            successful = report.summary.successful,
            failed = report.summary.failed,
            aborted = report.summary.aborted,
            "execution run finished"
        );
        Ok(report)
    }

    fn execute_node<'a>(
        &'a self,
        node: Node,
        parent: Option<Arc<ExecutionContext>>,
        inherited: Vec<Arc<dyn Interceptor>>,
        report: &'a mut ExecutionReport,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Node {
                id,
                display_name,
                timeout,
                extensions,
                body,
                children,
            } = node;

            let context = Arc::new(match &parent {
                Some(parent) => ExecutionContext::child(parent, &id, &display_name),
                None => ExecutionContext::root(&id, &display_name),
            });

            // publishing the declared policy into the node's scope is what
            // children inherit through the store's ancestor read-through
            if let Some(policy) = timeout {
                context.store().put(&timeout_namespace(), TIMEOUT_KEY, policy);
            }

            let mut interceptors = inherited;
            interceptors.extend(extensions);

            let token = CancellationToken::new();
            let raw = match body {
                Some(body) => {
                    let body_context = Arc::clone(&context);
                    Invocation::new(token.clone(), body(body_context, token.clone()))
                }
                None => Invocation::noop(token),
            };
            let chain = InterceptorChain::build(&interceptors, &context, raw);

            let started_at = Utc::now();
            let started = Instant::now();
            let outcome = execute_safely(chain).await;
            let elapsed = started.elapsed();

            let result = match outcome {
                Ok(result) => result,
                Err(fatal) => {
                    error!(node_id = %id, "fatal error escaped the safe executor: {fatal}");
                    if let Err(teardown) = context.close() {
                        warn!(node_id = %id, "context teardown failed during fatal unwind: {teardown}");
                    }
                    return Err(EngineError::Fatal {
                        message: fatal.to_string(),
                    });
                }
            };

            debug!(node_id = %id, %result, ?elapsed, "node invocation finished");
            let run_children = result.is_successful();
            report.record(NodeReport {
                node_id: id.clone(),
                display_name,
                result,
                started_at,
                elapsed,
                teardown_error: None,
            });

            let mut child_outcome = Ok(());
            if run_children {
                for child in children {
                    child_outcome = self
                        .execute_node(child, Some(Arc::clone(&context)), interceptors.clone(), report)
                        .await;
                    if child_outcome.is_err() {
                        break;
                    }
                }
            } else if !children.is_empty() {
                warn!(
                    node_id = %id,
                    skipped = children.len(),
                    "container did not succeed; child nodes will not execute"
                );
            }

            if let Err(teardown) = context.close() {
                warn!(node_id = %id, "context teardown failed: {teardown}");
                report.record_teardown_error(&id, teardown.to_string());
            }
            child_outcome
        })
    }

    /// Shut down the shared watchdog scheduler, waiting up to `grace` for its
    /// worker to stop.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        info!("shutting down execution engine");
        self.watchdog.shutdown(grace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::TestError;

    #[tokio::test]
    async fn a_single_leaf_executes_successfully() {
        let engine = ExecutionEngine::new().unwrap();
        let root = Node::leaf("leaf", "a leaf", |_context, _token| async { Ok(()) });

        let report = engine.execute(root).await.unwrap();
        assert_eq!(report.summary.total_nodes, 1);
        assert!(report.result("leaf").unwrap().is_successful());
        engine.shutdown(DEFAULT_SHUTDOWN_GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn a_failed_container_body_skips_its_children() {
        let engine = ExecutionEngine::new().unwrap();
        let root = Node::container("root", "Root")
            .with_body(|_context, _token| async { Err(TestError::failed("setup broke")) })
            .with_child(Node::leaf("child", "child", |_context, _token| async {
                Ok(())
            }));

        let report = engine.execute(root).await.unwrap();
        assert!(report.result("root").unwrap().is_failed());
        // the child never ran, so it has no result
        assert!(report.result("child").is_none());
        engine.shutdown(DEFAULT_SHUTDOWN_GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn a_fatal_error_aborts_the_whole_run() {
        let engine = ExecutionEngine::new().unwrap();
        let root = Node::container("root", "Root")
            .with_child(Node::leaf("bad", "bad", |_context, _token| async {
                Err(TestError::fatal("simulated out of memory"))
            }))
            .with_child(Node::leaf("never", "never", |_context, _token| async {
                Ok(())
            }));

        let error = engine.execute(root).await.unwrap_err();
        assert!(matches!(error, EngineError::Fatal { .. }));
        engine.shutdown(DEFAULT_SHUTDOWN_GRACE).await.unwrap();
    }
}
