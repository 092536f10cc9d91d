// ABOUTME: Hierarchical namespaced key/value storage attached to execution contexts
// ABOUTME: Lookups read through the ancestor chain; writes always target the local scope

pub mod error;
pub mod resources;

pub use error::StoreError;
pub use resources::{CloseableResource, ResourceRegistry};

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

type AnyValue = Arc<dyn Any + Send + Sync>;

/// An opaque partition key for the store, owned by the extension that created
/// it. Namespaces prevent key collisions between unrelated extensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn create<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoreKey {
    namespace: Namespace,
    key: String,
}

impl StoreKey {
    fn new(namespace: &Namespace, key: &str) -> Self {
        Self {
            namespace: namespace.clone(),
            key: key.to_string(),
        }
    }
}

/// Context-scoped key/value store with read-through to the ancestor chain.
///
/// A child store can read an ancestor's value but writes only to its own
/// scope. Absent lookups return `None`, never an error. Values stored via
/// [`put_resource`](Self::put_resource) are additionally registered with the
/// store's [`ResourceRegistry`] and torn down when the store closes.
pub struct ContextStore {
    parent: Option<Arc<ContextStore>>,
    entries: Mutex<HashMap<StoreKey, AnyValue>>,
    compute_locks: Mutex<HashMap<StoreKey, Arc<Mutex<()>>>>,
    resources: ResourceRegistry,
}

impl ContextStore {
    pub fn root() -> Self {
        Self {
            parent: None,
            entries: Mutex::new(HashMap::new()),
            compute_locks: Mutex::new(HashMap::new()),
            resources: ResourceRegistry::new(),
        }
    }

    pub fn child_of(parent: Arc<ContextStore>) -> Self {
        Self {
            parent: Some(parent),
            entries: Mutex::new(HashMap::new()),
            compute_locks: Mutex::new(HashMap::new()),
            resources: ResourceRegistry::new(),
        }
    }

    /// Look up a value, walking from this store upward through its ancestors.
    /// Returns `None` when the key is absent or holds a different type.
    pub fn get<T>(&self, namespace: &Namespace, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.lookup(&StoreKey::new(namespace, key))
            .and_then(|value| value.downcast::<T>().ok())
    }

    fn lookup(&self, key: &StoreKey) -> Option<AnyValue> {
        if let Some(value) = self.entries.lock().get(key) {
            return Some(Arc::clone(value));
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(key))
    }

    /// Store a value in the local scope, shadowing any ancestor entry.
    pub fn put<T>(&self, namespace: &Namespace, key: &str, value: T)
    where
        T: Any + Send + Sync,
    {
        self.entries
            .lock()
            .insert(StoreKey::new(namespace, key), Arc::new(value));
    }

    /// Store a closeable resource in the local scope and register it for
    /// teardown when this store closes.
    pub fn put_resource<R>(&self, namespace: &Namespace, key: &str, resource: Arc<R>)
    where
        R: CloseableResource,
    {
        self.resources
            .register(Arc::clone(&resource) as Arc<dyn CloseableResource>);
        self.entries
            .lock()
            .insert(StoreKey::new(namespace, key), resource as AnyValue);
    }

    /// Return the stored value for `(namespace, key)`, computing and storing
    /// it locally if absent everywhere in the ancestor chain.
    ///
    /// Single-flight: concurrent callers for the same key serialize on a
    /// per-key lock, so the factory runs at most once per `(namespace, key)`
    /// per store and every caller observes the identical value. The map lock
    /// is not held while the factory runs, so the factory may freely read or
    /// write other keys in this store; only computing a key from its own
    /// factory deadlocks.
    pub fn get_or_compute<T, F>(&self, namespace: &Namespace, key: &str, factory: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let store_key = StoreKey::new(namespace, key);
        if let Some(value) = self
            .lookup(&store_key)
            .and_then(|value| value.downcast::<T>().ok())
        {
            return value;
        }

        let slot = Arc::clone(
            self.compute_locks
                .lock()
                .entry(store_key.clone())
                .or_default(),
        );
        let _serialized = slot.lock();

        // a concurrent caller may have computed the value while we waited
        if let Some(existing) = self.entries.lock().get(&store_key) {
            if let Ok(value) = Arc::clone(existing).downcast::<T>() {
                return value;
            }
        }

        let value = Arc::new(factory());
        self.entries
            .lock()
            .insert(store_key, Arc::clone(&value) as AnyValue);
        value
    }

    /// Close this store, tearing down every registered resource.
    pub fn close(&self) -> Result<(), StoreError> {
        self.resources.close_all()
    }
}
