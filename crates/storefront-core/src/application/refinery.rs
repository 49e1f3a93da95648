use crate::application::cache::ResultCache;
use crate::application::registry::BackendRegistry;
use crate::application::settings::{keys, Settings};
use crate::domain::app::App;
use crate::domain::app_list::AppList;
use crate::domain::events::{FailureEvent, FailureReporter};
use crate::domain::job::JobAction;
use crate::error::CoreError;
use crate::types::RefineFlags;
use crate::BackendContext;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Per (entity, flag) refinement state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefineState {
    Unsatisfied,
    InProgress,
    Satisfied,
    Failed,
}

/// Cascades backend calls to satisfy requested attributes on a list of
/// entities.
///
/// Refinement is idempotent: a flag whose attribute is already present
/// on an entity performs no backend work. Backends are invoked in
/// dependency order so a later backend can rely on attributes an
/// earlier one set. Per-entity failures become warning events and the
/// pass continues; infrastructure failures abort the whole pass.
pub struct RefinementEngine {
    registry: Arc<BackendRegistry>,
    cache: Arc<ResultCache>,
    settings: Arc<Settings>,
}

impl RefinementEngine {
    /// Create an engine over the given registry, cache and settings
    pub fn new(
        registry: Arc<BackendRegistry>,
        cache: Arc<ResultCache>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            registry,
            cache,
            settings,
        }
    }

    /// Cheap local check: is `flag`'s attribute already present?
    fn flag_satisfied(app: &App, flag: RefineFlags) -> bool {
        match flag {
            RefineFlags::REQUIRE_DESCRIPTION => app.description().is_some(),
            RefineFlags::REQUIRE_LICENSE => app.license().is_some(),
            RefineFlags::REQUIRE_URL => app.homepage().is_some(),
            RefineFlags::REQUIRE_VERSION => app.version().is_some(),
            RefineFlags::REQUIRE_SIZE => app.size_installed().is_some(),
            RefineFlags::REQUIRE_ICON => app.icon().is_some(),
            RefineFlags::REQUIRE_RATING => app.rating().is_some(),
            RefineFlags::REQUIRE_REVIEWS => !app.reviews().is_empty(),
            RefineFlags::REQUIRE_REVIEW_RATINGS => app.review_ratings().is_some(),
            RefineFlags::REQUIRE_PROVENANCE => app.has_quirk(crate::Quirks::PROVENANCE),
            RefineFlags::REQUIRE_RELATED => app.metadata("related").is_some(),
            _ => false,
        }
    }

    /// Apply configuration gates to the requested flags
    fn effective_flags(&self, mut flags: RefineFlags) -> RefineFlags {
        if !self.settings.get_bool(keys::REQUIRE_SIZE, true) {
            flags.remove(RefineFlags::REQUIRE_SIZE);
        }
        flags
    }

    fn context_for(&self, backend: &str, token: &CancellationToken) -> BackendContext {
        BackendContext::new(
            token.clone(),
            Arc::clone(&self.settings),
            self.cache.namespace(backend),
        )
    }

    /// Refine every entity in `list` until every requested flag is
    /// satisfied or failed, or the job is cancelled.
    pub async fn refine(
        &self,
        list: &mut AppList,
        flags: RefineFlags,
        token: &CancellationToken,
        reporter: &FailureReporter,
    ) -> Result<(), CoreError> {
        let flags = self.effective_flags(flags);
        if flags.is_empty() || list.is_empty() {
            return Ok(());
        }

        // resolve the refiner chain per flag once, in dependency order
        let plan: Vec<(RefineFlags, Vec<_>)> = flags
            .iter()
            .map(|flag| (flag, self.registry.resolve_refiners(flag, &self.settings)))
            .collect();

        let mut states: HashMap<(String, u64), RefineState> = HashMap::new();

        for app in list.iter_mut() {
            let entity_key = app.unique_key();
            for (flag, refiners) in &plan {
                if token.is_cancelled() {
                    debug!("refinement cancelled");
                    return Ok(());
                }

                let state_key = (entity_key.clone(), flag.bits());
                if states.get(&state_key) == Some(&RefineState::Satisfied) {
                    continue;
                }

                if Self::flag_satisfied(app, *flag) {
                    states.insert(state_key, RefineState::Satisfied);
                    continue;
                }

                if refiners.is_empty() {
                    states.insert(state_key, RefineState::Failed);
                    continue;
                }

                let mut state = RefineState::InProgress;
                for backend in refiners {
                    if token.is_cancelled() {
                        debug!("refinement cancelled");
                        return Ok(());
                    }
                    if !backend.capabilities().supports_refine(*flag) {
                        continue;
                    }
                    let ctx = self.context_for(backend.name(), token);
                    match backend.refine_app(app, *flag, &ctx).await {
                        Ok(()) => {
                            if Self::flag_satisfied(app, *flag) {
                                state = RefineState::Satisfied;
                                break;
                            }
                        }
                        Err(err) if err.is_fatal_for_refinement() => {
                            reporter.report(FailureEvent::fatal(
                                JobAction::Refine,
                                backend.name(),
                                Some(app.id().clone()),
                                err.clone(),
                            ));
                            return Err(err);
                        }
                        Err(err) => {
                            reporter.report(FailureEvent::enrichment(
                                JobAction::Refine,
                                backend.name(),
                                app.id().clone(),
                                err,
                            ));
                        }
                    }
                }
                if state == RefineState::InProgress {
                    trace!(app = %entity_key, flag = %flag, "flag not satisfied by any backend");
                    state = RefineState::Failed;
                }
                states.insert(state_key, state);
            }
        }

        let satisfied = states
            .values()
            .filter(|s| **s == RefineState::Satisfied)
            .count();
        let failed = states
            .values()
            .filter(|s| **s == RefineState::Failed)
            .count();
        debug!(satisfied, failed, flags = %flags, "refinement finished");
        Ok(())
    }
}
