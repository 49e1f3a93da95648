//! Mock implementations of the core's backend seam.

mod backend;

pub use backend::{MockBackend, MockBackendBuilder};
