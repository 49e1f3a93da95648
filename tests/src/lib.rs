//! Integration test suite for the Storefront workspace.
//!
//! The actual tests live under `tests/`; this library target only
//! anchors the package.
