// ABOUTME: Resource lifecycle registry tracking values that need explicit teardown
// ABOUTME: Closes registered resources in reverse-acquisition order when a context ends

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::error::StoreError;

/// Capability trait for stored values that require explicit teardown.
///
/// Values opt into lifecycle management by implementing this trait and being
/// stored via [`ContextStore::put_resource`](super::ContextStore::put_resource).
/// The registry guarantees `close` is invoked at most once per resource.
pub trait CloseableResource: Send + Sync + 'static {
    fn close(&self) -> Result<(), StoreError>;
}

/// Tracks closeable resources for one context and tears them down when the
/// context ends.
#[derive(Default)]
pub struct ResourceRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    resources: Vec<Arc<dyn CloseableResource>>,
    closed: bool,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource for teardown. Registration order is retained so
    /// that `close_all` can release resources in reverse order.
    pub fn register(&self, resource: Arc<dyn CloseableResource>) {
        let mut state = self.inner.lock();
        if state.closed {
            warn!("resource registered after its context closed; it will not be torn down");
            return;
        }
        state.resources.push(resource);
    }

    /// Close every registered resource in reverse registration order.
    ///
    /// Teardown failures are collected rather than stopping at the first one;
    /// if any resource fails to close, a single aggregated error is returned.
    /// The registry drains its list, so no resource is ever closed twice and
    /// a second call is a no-op.
    pub fn close_all(&self) -> Result<(), StoreError> {
        let resources = {
            let mut state = self.inner.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            std::mem::take(&mut state.resources)
        };

        if resources.is_empty() {
            return Ok(());
        }
        debug!("closing {} registered resource(s)", resources.len());

        let mut failures = Vec::new();
        for resource in resources.into_iter().rev() {
            if let Err(error) = resource.close() {
                failures.push(error.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Teardown { failures })
        }
    }
}
