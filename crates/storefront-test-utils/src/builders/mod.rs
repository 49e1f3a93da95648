//! Builders assembling ready-to-use harnesses for tests.

mod dispatcher;

pub use dispatcher::{TestDispatcherBuilder, TestHarness};
