//! A scripted mock implementation of the [`Backend`] trait.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storefront_core::{
    App, AppList, Backend, BackendBase, BackendCapabilities, BackendContext, CoreError, Job,
    JobAction, RefineFlags,
};

type RefineFn = Box<dyn Fn(&mut App, RefineFlags) -> Result<(), CoreError> + Send + Sync>;

/// A backend whose behavior is scripted up front: canned result lists,
/// forced failures, refine closures and optional latency. Invocation
/// counters let tests assert how much backend work actually happened.
pub struct MockBackend {
    name: String,
    capabilities: BackendCapabilities,
    run_after: Vec<String>,
    apps: Vec<App>,
    execute_error: Option<CoreError>,
    setup_error: Option<CoreError>,
    refresh_error: Option<CoreError>,
    refine_fn: Option<RefineFn>,
    delay: Option<Duration>,
    execute_calls: AtomicUsize,
    refine_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl MockBackend {
    /// Start building a mock backend named `name`
    pub fn named(name: impl Into<String>) -> MockBackendBuilder {
        MockBackendBuilder {
            name: name.into(),
            capabilities: BackendCapabilities::new(),
            run_after: Vec::new(),
            apps: Vec::new(),
            execute_error: None,
            setup_error: None,
            refresh_error: None,
            refine_fn: None,
            delay: None,
        }
    }

    /// How many times `execute` ran
    pub fn execute_count(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    /// How many times `refine_app` ran
    pub fn refine_count(&self) -> usize {
        self.refine_calls.load(Ordering::SeqCst)
    }

    /// How many times `refresh` ran
    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

impl BackendBase for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities.clone()
    }

    fn run_after(&self) -> Vec<String> {
        self.run_after.clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn setup(&self, _ctx: &BackendContext) -> Result<(), CoreError> {
        match &self.setup_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn execute(&self, _job: &Job, ctx: &BackendContext) -> Result<AppList, CoreError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        // safe point: a well-behaved backend checks the token after
        // expensive work
        if ctx.is_cancelled() {
            return Err(CoreError::Cancelled(format!(
                "{} observed cancellation",
                self.name
            )));
        }
        if let Some(err) = &self.execute_error {
            return Err(err.clone());
        }
        let mut list = AppList::new();
        for app in &self.apps {
            list.merge(app.clone());
        }
        Ok(list)
    }

    async fn refine_app(
        &self,
        app: &mut App,
        flags: RefineFlags,
        ctx: &BackendContext,
    ) -> Result<(), CoreError> {
        self.refine_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if ctx.is_cancelled() {
            return Err(CoreError::Cancelled(format!(
                "{} observed cancellation",
                self.name
            )));
        }
        match &self.refine_fn {
            Some(refine) => refine(app, flags),
            None => Ok(()),
        }
    }

    async fn refresh(&self, _cache_age: Duration, ctx: &BackendContext) -> Result<(), CoreError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if ctx.is_cancelled() {
            return Err(CoreError::Cancelled(format!(
                "{} observed cancellation",
                self.name
            )));
        }
        match &self.refresh_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Builder for [`MockBackend`]
pub struct MockBackendBuilder {
    name: String,
    capabilities: BackendCapabilities,
    run_after: Vec<String>,
    apps: Vec<App>,
    execute_error: Option<CoreError>,
    setup_error: Option<CoreError>,
    refresh_error: Option<CoreError>,
    refine_fn: Option<RefineFn>,
    delay: Option<Duration>,
}

impl MockBackendBuilder {
    /// Declare support for `action`
    pub fn with_action(mut self, action: JobAction) -> Self {
        self.capabilities = self.capabilities.with_action(action);
        self
    }

    /// Declare the refinement attributes this backend satisfies
    pub fn with_refine_flags(mut self, flags: RefineFlags) -> Self {
        self.capabilities = self.capabilities.with_refine_flags(flags);
        self
    }

    /// Require `dep` to run before this backend
    pub fn run_after(mut self, dep: impl Into<String>) -> Self {
        self.run_after.push(dep.into());
        self
    }

    /// Script the entities `execute` returns
    pub fn returning(mut self, apps: Vec<App>) -> Self {
        self.apps = apps;
        self
    }

    /// Script a single entity for `execute` to return
    pub fn returning_app(mut self, app: App) -> Self {
        self.apps.push(app);
        self
    }

    /// Make every `execute` fail with `error`
    pub fn failing_with(mut self, error: CoreError) -> Self {
        self.execute_error = Some(error);
        self
    }

    /// Make `setup` fail with `error`
    pub fn setup_failing_with(mut self, error: CoreError) -> Self {
        self.setup_error = Some(error);
        self
    }

    /// Make every `refresh` fail with `error`
    pub fn refresh_failing_with(mut self, error: CoreError) -> Self {
        self.refresh_error = Some(error);
        self
    }

    /// Script the refine behavior
    pub fn refining_with<F>(mut self, refine: F) -> Self
    where
        F: Fn(&mut App, RefineFlags) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.refine_fn = Some(Box::new(refine));
        self
    }

    /// Make every `refine_app` fail with `error`
    pub fn refine_failing_with(mut self, error: CoreError) -> Self {
        self.refine_fn = Some(Box::new(move |_, _| Err(error.clone())));
        self
    }

    /// Sleep for `delay` inside `execute` and `refine_app`, simulating
    /// backend latency
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Build the mock
    pub fn build(self) -> Arc<MockBackend> {
        Arc::new(MockBackend {
            name: self.name,
            capabilities: self.capabilities,
            run_after: self.run_after,
            apps: self.apps,
            execute_error: self.execute_error,
            setup_error: self.setup_error,
            refresh_error: self.refresh_error,
            refine_fn: self.refine_fn,
            delay: self.delay,
            execute_calls: AtomicUsize::new(0),
            refine_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        })
    }
}
