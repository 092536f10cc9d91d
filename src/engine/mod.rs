// ABOUTME: Core execution engine modules
// ABOUTME: Context lifecycle, node hierarchy, safe execution, and result aggregation

pub mod context;
pub mod error;
pub mod executor;
pub mod node;
pub mod result;
pub mod safe;

pub use context::ExecutionContext;
pub use error::{EngineError, TestError};
pub use executor::{ExecutionEngine, DEFAULT_SHUTDOWN_GRACE};
pub use node::{Node, TestBody};
pub use result::{ExecutionReport, ExecutionResult, NodeReport, ReportSummary};
pub use safe::execute_safely;
