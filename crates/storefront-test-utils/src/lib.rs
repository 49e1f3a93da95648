//! Testing utilities for the Storefront catalog core.
//!
//! Provides scripted mock backends, entity fixtures and a dispatcher
//! harness builder so integration tests can assemble a working catalog
//! core in a few lines.

pub mod builders;
pub mod fixtures;
pub mod mocks;

pub use builders::{TestDispatcherBuilder, TestHarness};
pub use mocks::MockBackend;

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialise tracing for tests, once per process. Respects
/// `RUST_LOG`; defaults to warnings only so test output stays readable.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
