use crate::application::cache::ResultCache;
use crate::application::refinery::RefinementEngine;
use crate::application::registry::BackendRegistry;
use crate::application::settings::{keys, Settings};
use crate::domain::app::{App, AppState};
use crate::domain::app_list::AppList;
use crate::domain::events::{FailureEvent, FailureReporter};
use crate::domain::job::{Job, JobAction, JobOutcome, JobStatus};
use crate::error::CoreError;
use crate::BackendContext;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tunables for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum concurrent backend invocations; bounds how many blocking
    /// operations run at once
    pub worker_permits: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { worker_permits: 4 }
    }
}

impl DispatcherConfig {
    /// Read the config from the settings surface, falling back to
    /// defaults
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        let permits = settings.get_u64(keys::WORKER_PERMITS, defaults.worker_permits as u64);
        Self {
            worker_permits: (permits as usize).max(1),
        }
    }
}

/// Mutable merge target shared by one job's concurrent backend writers.
///
/// Entries are guarded per identity key through the concurrent map's
/// entry API, so unrelated backends never serialize on a global lock.
/// The staging list is private to the job; callers only ever see the
/// snapshot published on completion.
struct StagingList {
    slots: DashMap<String, App>,
    raw_counter: AtomicUsize,
    dedupe: bool,
}

impl StagingList {
    fn new(dedupe: bool) -> Self {
        Self {
            slots: DashMap::new(),
            raw_counter: AtomicUsize::new(0),
            dedupe,
        }
    }

    fn merge(&self, app: App) {
        if self.dedupe {
            match self.slots.entry(app.unique_key()) {
                dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                    occupied.get_mut().merge_from(app);
                }
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(app);
                }
            }
        } else {
            let n = self.raw_counter.fetch_add(1, Ordering::Relaxed);
            self.slots.insert(format!("{}#{n}", app.unique_key()), app);
        }
    }

    fn merge_list(&self, list: AppList) {
        for app in list.into_vec() {
            self.merge(app);
        }
    }

    fn snapshot(&self) -> AppList {
        let mut apps: Vec<App> = self
            .slots
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        apps.sort_by_key(|app| app.unique_key());
        let mut list = AppList::new();
        for app in apps {
            list.push(app);
        }
        list
    }
}

/// The concurrency core: accepts jobs, fans them out across applicable
/// backends, merges partial results and runs refinement.
///
/// One backend's blocking I/O never delays another: invocations run on
/// separate tasks bounded by a worker-pool semaphore. Cancellation is
/// cooperative; a cancelled job resolves with whatever partial result
/// was merged before the token fired, tagged [`JobStatus::Cancelled`].
pub struct JobDispatcher {
    registry: Arc<BackendRegistry>,
    cache: Arc<ResultCache>,
    settings: Arc<Settings>,
    refinery: RefinementEngine,
    semaphore: Arc<Semaphore>,
    pending_tx: broadcast::Sender<AppList>,
}

impl JobDispatcher {
    /// Create a dispatcher with configuration read from `settings`
    pub fn new(
        registry: Arc<BackendRegistry>,
        cache: Arc<ResultCache>,
        settings: Arc<Settings>,
    ) -> Self {
        let config = DispatcherConfig::from_settings(&settings);
        Self::with_config(registry, cache, settings, config)
    }

    /// Create a dispatcher with an explicit configuration
    pub fn with_config(
        registry: Arc<BackendRegistry>,
        cache: Arc<ResultCache>,
        settings: Arc<Settings>,
        config: DispatcherConfig,
    ) -> Self {
        let refinery = RefinementEngine::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&settings),
        );
        let (pending_tx, _) = broadcast::channel(16);
        Self {
            registry,
            cache,
            settings,
            refinery,
            semaphore: Arc::new(Semaphore::new(config.worker_permits.max(1))),
            pending_tx,
        }
    }

    /// Subscribe to pending-state change notifications.
    ///
    /// A snapshot is broadcast whenever a job mutates installation state
    /// (queued, installing, installed, removing) so the UI can refresh
    /// counts without re-querying. Delivery is best-effort; lagging
    /// subscribers miss intermediate snapshots.
    pub fn subscribe_pending(&self) -> broadcast::Receiver<AppList> {
        self.pending_tx.subscribe()
    }

    /// Submit a job with a fresh cancellation token
    pub async fn submit(&self, job: Job) -> Result<JobOutcome, CoreError> {
        self.submit_with_token(job, CancellationToken::new()).await
    }

    /// Submit a job; cancelling `token` stops new backend invocations
    /// and resolves the job with its partial result
    pub async fn submit_with_token(
        &self,
        job: Job,
        token: CancellationToken,
    ) -> Result<JobOutcome, CoreError> {
        info!(job = %job.id(), action = %job.action(), "job submitted");
        let reporter = Arc::new(FailureReporter::new());
        let staging = Arc::new(StagingList::new(job.dedupe_flags().dedupes()));

        match job.action() {
            action if action.is_exclusive() => {
                self.run_exclusive(&job, &token, &reporter, &staging).await?;
            }
            JobAction::Refine => staging.merge_list(job.target().to_list()),
            JobAction::FileToApp => {
                self.run_first_match(&job, &token, &reporter, &staging)
                    .await?;
            }
            JobAction::Refresh => self.run_refresh(&job, &token, &reporter).await?,
            _ => self.run_fanout(&job, &token, &reporter, &staging).await?,
        }

        let mut list = staging.snapshot();
        if !token.is_cancelled()
            && !job.refine_flags().is_empty()
            && job.action().produces_list()
        {
            self.refinery
                .refine(&mut list, job.refine_flags(), &token, &reporter)
                .await?;
        }

        let status = if token.is_cancelled() {
            JobStatus::Cancelled
        } else {
            JobStatus::Succeeded
        };
        debug!(
            job = %job.id(),
            results = list.len(),
            events = reporter.len(),
            status = ?status,
            "job finished"
        );
        Ok(JobOutcome {
            list,
            events: reporter.take(),
            status,
        })
    }

    /// Release backend resources; call once at shutdown
    pub async fn shutdown(&self) {
        self.registry.teardown().await;
    }

    fn context_for(&self, backend: &str, token: &CancellationToken) -> BackendContext {
        BackendContext::new(
            token.clone(),
            Arc::clone(&self.settings),
            self.cache.namespace(backend),
        )
    }

    fn notify_pending(&self, app: &App) {
        let mut list = AppList::new();
        list.merge(app.clone());
        // no receivers is fine
        let _ = self.pending_tx.send(list);
    }

    /// Fan `job` out across every applicable backend concurrently and
    /// merge the partial results. One backend's failure is recorded as a
    /// warning and never discards another backend's output.
    async fn run_fanout(
        &self,
        job: &Job,
        token: &CancellationToken,
        reporter: &Arc<FailureReporter>,
        staging: &Arc<StagingList>,
    ) -> Result<(), CoreError> {
        let backends = self.registry.resolve(job.action(), &self.settings);
        if backends.is_empty() {
            debug!(action = %job.action(), "no applicable backends, degrading to empty result");
            return Ok(());
        }

        let mut names = Vec::with_capacity(backends.len());
        let mut tasks = Vec::with_capacity(backends.len());
        for backend in backends {
            if token.is_cancelled() {
                break;
            }
            let name = backend.name().to_string();
            let ctx = self.context_for(&name, token);
            let job = job.clone();
            let token = token.clone();
            let reporter = Arc::clone(reporter);
            let staging = Arc::clone(staging);
            let semaphore = Arc::clone(&self.semaphore);
            names.push(name.clone());
            tasks.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                // no new invocations once cancelled
                if token.is_cancelled() {
                    debug!(backend = %name, "skipping cancelled invocation");
                    return;
                }
                match backend.execute(&job, &ctx).await {
                    Ok(partial) => {
                        debug!(backend = %name, results = partial.len(), "backend completed");
                        staging.merge_list(partial);
                    }
                    Err(CoreError::Cancelled(_)) => {
                        debug!(backend = %name, "backend observed cancellation");
                    }
                    Err(err) => {
                        reporter.report(FailureEvent::fanout(job.action(), name, err));
                    }
                }
            }));
        }

        for (name, task) in names.into_iter().zip(join_all(tasks).await) {
            if let Err(err) = task {
                reporter.report(FailureEvent::fanout(
                    job.action(),
                    name,
                    CoreError::Failed(format!("backend task failed: {err}")),
                ));
            }
        }
        Ok(())
    }

    /// Route an install/remove/review job to its single authoritative
    /// backend. That backend's failure is the job's failure.
    async fn run_exclusive(
        &self,
        job: &Job,
        token: &CancellationToken,
        reporter: &Arc<FailureReporter>,
        staging: &Arc<StagingList>,
    ) -> Result<(), CoreError> {
        let mut app = match job.target().as_app() {
            Some(app) => app.clone(),
            None => {
                return Err(CoreError::Configuration(format!(
                    "{} job without a target app",
                    job.action()
                )));
            }
        };

        let backends = self.registry.resolve(job.action(), &self.settings);
        let backend = app
            .managed_by()
            .and_then(|name| backends.iter().find(|b| b.name() == name))
            .or_else(|| backends.first())
            .cloned()
            .ok_or_else(|| {
                CoreError::NotSupported(format!(
                    "no backend can {} {}",
                    job.action(),
                    app.id()
                ))
            })?;

        match job.action() {
            JobAction::Install => {
                app.set_state(AppState::QueuedForInstall);
                self.notify_pending(&app);
                if token.is_cancelled() {
                    app.set_state(AppState::Available);
                    self.notify_pending(&app);
                    staging.merge(app);
                    return Ok(());
                }
                app.set_state(AppState::Installing);
                self.notify_pending(&app);
            }
            JobAction::Remove => {
                app.set_state(AppState::Removing);
                self.notify_pending(&app);
            }
            _ => {}
        }

        let ctx = self.context_for(backend.name(), token);
        match backend.execute(job, &ctx).await {
            Ok(partial) => {
                match job.action() {
                    JobAction::Install => app.set_state(AppState::Installed),
                    JobAction::Remove => app.set_state(AppState::Available),
                    JobAction::SubmitReview => {
                        if let Some(review) = job.review() {
                            app.add_review(review.clone());
                        }
                    }
                    _ => {}
                }
                self.notify_pending(&app);
                staging.merge(app);
                staging.merge_list(partial);
                Ok(())
            }
            Err(err) => {
                // put the entity back into a stable state before failing
                let recovery = match job.action() {
                    JobAction::Install => Some(AppState::Available),
                    JobAction::Remove => Some(AppState::Installed),
                    _ => None,
                };
                if let Some(state) = recovery {
                    app.set_state(state);
                    self.notify_pending(&app);
                }
                staging.merge(app.clone());

                if matches!(err, CoreError::Cancelled(_)) {
                    debug!(backend = backend.name(), "exclusive action cancelled");
                    token.cancel();
                    return Ok(());
                }
                warn!(
                    backend = backend.name(),
                    action = %job.action(),
                    error = %err,
                    "authoritative backend failed"
                );
                reporter.report(FailureEvent::fatal(
                    job.action(),
                    backend.name(),
                    Some(app.id().clone()),
                    err.clone(),
                ));
                Err(err)
            }
        }
    }

    /// Resolve a local file by asking backends in dependency order; the
    /// first backend producing a non-empty result wins.
    async fn run_first_match(
        &self,
        job: &Job,
        token: &CancellationToken,
        reporter: &Arc<FailureReporter>,
        staging: &Arc<StagingList>,
    ) -> Result<(), CoreError> {
        for backend in self.registry.resolve(job.action(), &self.settings) {
            if token.is_cancelled() {
                return Ok(());
            }
            let ctx = self.context_for(backend.name(), token);
            match backend.execute(job, &ctx).await {
                Ok(partial) if !partial.is_empty() => {
                    debug!(backend = backend.name(), "file resolved");
                    staging.merge_list(partial);
                    return Ok(());
                }
                Ok(_) => {}
                Err(CoreError::NotSupported(_)) | Err(CoreError::Cancelled(_)) => {}
                Err(err) => {
                    reporter.report(FailureEvent::fanout(
                        job.action(),
                        backend.name(),
                        err,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Ask every capable backend to bring its local caches up to date.
    /// Failures are warnings; a stale ratings snapshot must not fail an
    /// update check.
    async fn run_refresh(
        &self,
        job: &Job,
        token: &CancellationToken,
        reporter: &Arc<FailureReporter>,
    ) -> Result<(), CoreError> {
        let cache_age = job.cache_age().unwrap_or(Duration::ZERO);
        let backends = self.registry.resolve(job.action(), &self.settings);

        let mut names = Vec::with_capacity(backends.len());
        let mut tasks = Vec::with_capacity(backends.len());
        for backend in backends {
            if token.is_cancelled() {
                break;
            }
            let name = backend.name().to_string();
            let ctx = self.context_for(&name, token);
            let action = job.action();
            let token = token.clone();
            let reporter = Arc::clone(reporter);
            let semaphore = Arc::clone(&self.semaphore);
            names.push(name.clone());
            tasks.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if token.is_cancelled() {
                    return;
                }
                match backend.refresh(cache_age, &ctx).await {
                    Ok(()) => debug!(backend = %name, "backend refreshed"),
                    Err(CoreError::Cancelled(_)) => {}
                    Err(err) => {
                        reporter.report(FailureEvent::fanout(action, name, err));
                    }
                }
            }));
        }

        for (name, task) in names.into_iter().zip(join_all(tasks).await) {
            if let Err(err) = task {
                reporter.report(FailureEvent::fanout(
                    job.action(),
                    name,
                    CoreError::Failed(format!("backend task failed: {err}")),
                ));
            }
        }
        Ok(())
    }
}
