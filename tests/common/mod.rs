// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides shared tracing setup for test runs

#![allow(dead_code)]

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize a test-friendly tracing subscriber once per test binary.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}
