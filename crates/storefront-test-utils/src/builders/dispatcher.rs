//! A builder wiring registry, cache, settings and dispatcher together.

use std::sync::Arc;
use storefront_core::{
    Backend, BackendRegistry, DispatcherConfig, JobDispatcher, ResultCache, Settings,
};

/// Everything a test needs to drive the catalog core
pub struct TestHarness {
    /// The assembled dispatcher
    pub dispatcher: JobDispatcher,
    /// The shared result cache, for seeding and inspection
    pub cache: Arc<ResultCache>,
    /// The settings surface, for toggling backends and gates
    pub settings: Arc<Settings>,
}

/// Builds a [`TestHarness`] from a set of backends.
///
/// Panics on registry construction errors; tests asserting on those
/// errors should call [`BackendRegistry::builder`] directly.
pub struct TestDispatcherBuilder {
    backends: Vec<Arc<dyn Backend>>,
    settings: Arc<Settings>,
    config: DispatcherConfig,
    run_setup: bool,
}

impl Default for TestDispatcherBuilder {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            settings: Arc::new(Settings::new()),
            config: DispatcherConfig::default(),
            run_setup: false,
        }
    }
}

impl TestDispatcherBuilder {
    /// Start with no backends and default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Replace the settings surface
    pub fn with_settings(mut self, settings: Arc<Settings>) -> Self {
        self.settings = settings;
        self
    }

    /// Bound the worker pool to `permits` concurrent invocations
    pub fn with_worker_permits(mut self, permits: usize) -> Self {
        self.config.worker_permits = permits;
        self
    }

    /// Run the backends' setup hooks while building
    pub fn with_setup(mut self) -> Self {
        self.run_setup = true;
        self
    }

    /// Assemble the harness
    pub async fn build(self) -> TestHarness {
        crate::init_tracing();

        let mut builder = BackendRegistry::builder();
        for backend in self.backends {
            builder = builder.register(backend);
        }
        let mut registry = builder.build().expect("registry construction failed");

        let cache = Arc::new(ResultCache::new());
        if self.run_setup {
            registry.setup(&cache, &self.settings).await;
        }

        let dispatcher = JobDispatcher::with_config(
            Arc::new(registry),
            Arc::clone(&cache),
            Arc::clone(&self.settings),
            self.config,
        );
        TestHarness {
            dispatcher,
            cache,
            settings: self.settings,
        }
    }
}
