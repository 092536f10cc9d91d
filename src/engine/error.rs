// ABOUTME: Error taxonomy for the execution engine and for units of work
// ABOUTME: Distinguishes abort, failure, timeout, and fatal conditions

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extension::timeout::TimeUnit;

/// Error raised by a unit of work.
///
/// Abort, failure, and timeout are captured by the safe executor and turned
/// into execution results. Fatal conditions model unrecoverable runtime
/// failures (out-of-memory class); they are never converted into a result and
/// always propagate, aborting the whole run.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TestError {
    #[error("test aborted: {reason}")]
    Aborted { reason: String },

    #[error("{message}")]
    Failed { message: String },

    #[error("Test timed out after {value} {unit}")]
    Timeout {
        value: u64,
        unit: TimeUnit,
        /// The error the interrupted unit produced, if any. Preserved as a
        /// secondary cause rather than discarded; the timeout message always
        /// takes precedence.
        suppressed: Option<Box<TestError>>,
    },

    #[error("fatal error: {message}")]
    Fatal { message: String },
}

impl TestError {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    pub fn suppressed(&self) -> Option<&TestError> {
        match self {
            Self::Timeout { suppressed, .. } => suppressed.as_deref(),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid timeout configuration: {message}")]
    Configuration { message: String },

    #[error("fatal error escaped test execution: {message}")]
    Fatal { message: String },

    #[error("watchdog scheduler is shut down")]
    SchedulerStopped,

    #[error("Scheduled executor could not be stopped in an orderly manner")]
    SchedulerTeardown,

    #[error("failed to start watchdog worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
