// ABOUTME: Error types for the context store and resource lifecycle registry
// ABOUTME: Defines teardown aggregation errors surfaced when a context closes

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to close resource: {message}")]
    ResourceClose { message: String },

    #[error("{} resource(s) failed to close: {}", failures.len(), failures.join("; "))]
    Teardown { failures: Vec<String> },
}

impl StoreError {
    pub fn resource_close(message: impl Into<String>) -> Self {
        Self::ResourceClose {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
