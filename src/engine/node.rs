// ABOUTME: Node hierarchy consumed by the execution engine
// ABOUTME: Containers and leaves with bodies, declared timeout policies, and extensions

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::error::TestError;
use crate::extension::timeout::TimeoutPolicy;
use crate::extension::Interceptor;

/// Async body of a node. Leaves carry the test itself; a container's body is
/// its own setup, run before any child. The cancellation token is signalled
/// by the watchdog on timeout; cooperative bodies check it at suspension
/// points.
pub type TestBody = Arc<
    dyn Fn(Arc<ExecutionContext>, CancellationToken) -> BoxFuture<'static, Result<(), TestError>>
        + Send
        + Sync,
>;

/// A unit in the execution hierarchy. Nodes are created by discovery
/// (external to this crate), consumed by the engine, and discarded once their
/// subtree completes. Ownership flows parent to children; the parent
/// back-link of the running tree lives on [`ExecutionContext`].
pub struct Node {
    pub(crate) id: String,
    pub(crate) display_name: String,
    pub(crate) timeout: Option<TimeoutPolicy>,
    pub(crate) extensions: Vec<Arc<dyn Interceptor>>,
    pub(crate) body: Option<TestBody>,
    pub(crate) children: Vec<Node>,
}

impl Node {
    pub fn container(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            timeout: None,
            extensions: Vec::new(),
            body: None,
            children: Vec::new(),
        }
    }

    pub fn leaf<F, Fut>(id: impl Into<String>, display_name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Arc<ExecutionContext>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        let mut node = Self::container(id, display_name);
        node.body = Some(Arc::new(move |context, token| {
            Box::pin(body(context, token))
        }));
        node
    }

    /// Declare an explicit timeout policy for this node. Absent a declared
    /// policy, the nearest enclosing container's applies.
    pub fn with_timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = Some(policy);
        self
    }

    pub fn with_extension(mut self, extension: Arc<dyn Interceptor>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Attach a setup body to a container node.
    pub fn with_body<F, Fut>(mut self, body: F) -> Self
    where
        F: Fn(Arc<ExecutionContext>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.body = Some(Arc::new(move |context, token| {
            Box::pin(body(context, token))
        }));
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn timeout(&self) -> Option<&TimeoutPolicy> {
        self.timeout.as_ref()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }
}
