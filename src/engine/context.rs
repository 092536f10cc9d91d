// ABOUTME: Execution context attached to one node's active execution window
// ABOUTME: Owns the node-scoped store and triggers resource teardown on close

use std::sync::Arc;

use tracing::debug;

use crate::store::{ContextStore, StoreError};

/// One context per node during its active execution window.
///
/// The context owns a [`ContextStore`] scoped to its node, chained to the
/// parent's store for ancestor read-through. Closing the context tears down
/// the resources registered in its scope; closing is idempotent.
pub struct ExecutionContext {
    node_id: String,
    display_name: String,
    parent: Option<Arc<ExecutionContext>>,
    store: Arc<ContextStore>,
}

impl ExecutionContext {
    pub fn root(node_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            display_name: display_name.into(),
            parent: None,
            store: Arc::new(ContextStore::root()),
        }
    }

    pub fn child(
        parent: &Arc<ExecutionContext>,
        node_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            display_name: display_name.into(),
            parent: Some(Arc::clone(parent)),
            store: Arc::new(ContextStore::child_of(Arc::clone(&parent.store))),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn parent(&self) -> Option<&Arc<ExecutionContext>> {
        self.parent.as_ref()
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn close(&self) -> Result<(), StoreError> {
        debug!(node_id = %self.node_id, "closing execution context");
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Namespace;

    #[test]
    fn child_context_reads_ancestor_values() {
        let ns = Namespace::create(["ctx"]);
        let root = Arc::new(ExecutionContext::root("root", "Root"));
        root.store().put(&ns, "key", 5_u32);

        let child = ExecutionContext::child(&root, "child", "Child");
        assert_eq!(*child.store().get::<u32>(&ns, "key").unwrap(), 5);
        assert_eq!(child.parent().unwrap().node_id(), "root");
    }

    #[test]
    fn close_is_idempotent() {
        let context = ExecutionContext::root("root", "Root");
        context.close().unwrap();
        context.close().unwrap();
    }
}
