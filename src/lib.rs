// ABOUTME: Main library module for the trellis test-execution engine
// ABOUTME: Exports all core modules and provides the public API

pub mod engine;
pub mod extension;
pub mod store;

// Re-export commonly used types
pub use engine::{
    execute_safely, EngineError, ExecutionContext, ExecutionEngine, ExecutionReport,
    ExecutionResult, Node, TestError, DEFAULT_SHUTDOWN_GRACE,
};
pub use extension::{
    Interceptor, InterceptorChain, Invocation, TimeUnit, TimeoutInterceptor, TimeoutPolicy,
    WatchdogScheduler,
};
pub use store::{CloseableResource, ContextStore, Namespace, ResourceRegistry, StoreError};

pub type Result<T> = engine::error::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
