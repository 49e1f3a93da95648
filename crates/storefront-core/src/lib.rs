//!
//! Storefront Core - orchestration core for the Storefront catalog
//!
//! This crate aggregates application metadata, installation state,
//! ratings and firmware-update information from independent backends and
//! presents one deduplicated view. It owns the job dispatcher, the
//! backend registry, the refinement engine and the result cache;
//! backends are opaque capability providers plugged in through the
//! [`Backend`] trait.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Domain layer - entities, jobs, events
pub mod domain;

/// Application services - dispatcher, registry, refinement, cache
pub mod application;

/// Core value types shared across layers
pub mod types;

/// Error types
pub mod error;

// Re-export key types
pub use error::CoreError;
pub use types::{DedupeFlags, Quality, Quirks, RefineFlags};

pub use domain::app::{App, AppId, AppScope, AppState, BundleKind, Review};
pub use domain::app_list::AppList;
pub use domain::events::{FailureEvent, FailureReporter, Severity};
pub use domain::job::{Job, JobAction, JobBuilder, JobId, JobOutcome, JobStatus, JobTarget};

pub use application::cache::{CacheNamespace, CacheValue, ResultCache, RATINGS_TTL};
pub use application::dispatcher::{DispatcherConfig, JobDispatcher};
pub use application::refinery::RefinementEngine;
pub use application::registry::{BackendCapabilities, BackendRegistry, RegistryBuilder};
pub use application::settings::Settings;

/// Everything a backend invocation may touch: the job's cancellation
/// token, the configuration surface, and this backend's cache namespace.
#[derive(Clone)]
pub struct BackendContext {
    token: CancellationToken,
    settings: Arc<Settings>,
    cache: CacheNamespace,
}

impl BackendContext {
    /// Create a context for one backend invocation
    pub fn new(token: CancellationToken, settings: Arc<Settings>, cache: CacheNamespace) -> Self {
        Self {
            token,
            settings,
            cache,
        }
    }

    /// The job's cancellation token.
    ///
    /// Backends check this at safe points: between network calls and
    /// before starting expensive work.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the job has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The configuration surface
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// This backend's cache namespace
    pub fn cache(&self) -> &CacheNamespace {
        &self.cache
    }
}

/// Non-async base trait for backends.
///
/// This trait is object-safe and carries the registration record: the
/// backend's name, its capability set and its ordering constraints.
pub trait BackendBase: Send + Sync {
    /// Unique backend name, e.g. `"packagekit"` or `"ratings"`
    fn name(&self) -> &str;

    /// The actions and refinement attributes this backend can satisfy
    fn capabilities(&self) -> BackendCapabilities;

    /// Names of backends that must run before this one.
    ///
    /// A name that is not registered is ignored; a cycle among
    /// registered backends fails registry construction.
    fn run_after(&self) -> Vec<String> {
        Vec::new()
    }
}

/// An external collaborator providing data or actions for one source:
/// a package manager, a ratings service, a firmware service.
#[async_trait]
pub trait Backend: BackendBase {
    /// One-time initialisation before the first job. A failure disables
    /// the backend for the session.
    async fn setup(&self, ctx: &BackendContext) -> Result<(), CoreError> {
        let _ = ctx;
        Ok(())
    }

    /// Release resources at shutdown
    async fn teardown(&self) {}

    /// Execute the backend's slice of `job`, returning a partial entity
    /// list to be merged with other backends' output.
    async fn execute(&self, job: &Job, ctx: &BackendContext) -> Result<AppList, CoreError>;

    /// Enrich one entity with the requested attributes. Invoked by the
    /// refinement engine in dependency order; implementations only act
    /// on the flags they declared.
    async fn refine_app(
        &self,
        app: &mut App,
        flags: RefineFlags,
        ctx: &BackendContext,
    ) -> Result<(), CoreError> {
        let _ = (app, flags, ctx);
        Ok(())
    }

    /// Bring backend-local caches up to date, treating anything older
    /// than `cache_age` as stale.
    async fn refresh(&self, cache_age: Duration, ctx: &BackendContext) -> Result<(), CoreError> {
        let _ = (cache_age, ctx);
        Ok(())
    }
}
