use crate::application::cache::ResultCache;
use crate::application::settings::Settings;
use crate::domain::job::JobAction;
use crate::error::CoreError;
use crate::types::RefineFlags;
use crate::{Backend, BackendContext};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The actions and refinement attributes one backend can satisfy
#[derive(Debug, Clone, Default)]
pub struct BackendCapabilities {
    actions: HashSet<JobAction>,
    refine_flags: RefineFlags,
}

impl BackendCapabilities {
    /// An empty capability set
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare support for `action`
    pub fn with_action(mut self, action: JobAction) -> Self {
        self.actions.insert(action);
        self
    }

    /// Declare support for several actions
    pub fn with_actions(mut self, actions: impl IntoIterator<Item = JobAction>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Declare the refinement attributes this backend can satisfy
    pub fn with_refine_flags(mut self, flags: RefineFlags) -> Self {
        self.refine_flags |= flags;
        self
    }

    /// Whether `action` is supported
    pub fn supports_action(&self, action: JobAction) -> bool {
        self.actions.contains(&action)
    }

    /// The refinement attributes this backend can satisfy
    pub fn refine_flags(&self) -> RefineFlags {
        self.refine_flags
    }

    /// Whether any attribute in `flags` is supported
    pub fn supports_refine(&self, flags: RefineFlags) -> bool {
        self.refine_flags.intersects(flags)
    }
}

/// Builder collecting backends before dependency resolution
#[derive(Default)]
pub struct RegistryBuilder {
    backends: Vec<Arc<dyn Backend>>,
}

impl RegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend
    pub fn register(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Resolve the dependency order and build the registry.
    ///
    /// Ordering is a topological sort over the backends' declared
    /// `run_after` constraints; registration order breaks ties so the
    /// result is deterministic. A dependency cycle is a configuration
    /// error reported here, at setup time, not at job time. A
    /// `run_after` naming an unregistered backend is ignored.
    pub fn build(self) -> Result<BackendRegistry, CoreError> {
        let n = self.backends.len();

        let mut index_by_name: HashMap<String, usize> = HashMap::with_capacity(n);
        for (i, backend) in self.backends.iter().enumerate() {
            if index_by_name
                .insert(backend.name().to_string(), i)
                .is_some()
            {
                return Err(CoreError::Configuration(format!(
                    "backend registered twice: {}",
                    backend.name()
                )));
            }
        }

        // run-after edges restricted to registered names
        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, backend) in self.backends.iter().enumerate() {
            for dep in backend.run_after() {
                if let Some(&j) = index_by_name.get(dep.as_str()) {
                    deps[i].push(j);
                }
            }
        }

        let mut placed = vec![false; n];
        let mut ordered: Vec<Arc<dyn Backend>> = Vec::with_capacity(n);
        while ordered.len() < n {
            let mut progressed = false;
            for i in 0..n {
                if placed[i] {
                    continue;
                }
                if deps[i].iter().all(|&j| placed[j]) {
                    placed[i] = true;
                    ordered.push(Arc::clone(&self.backends[i]));
                    progressed = true;
                }
            }
            if !progressed {
                let mut stuck: Vec<&str> = self
                    .backends
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !placed[*i])
                    .map(|(_, b)| b.name())
                    .collect();
                stuck.sort_unstable();
                return Err(CoreError::Configuration(format!(
                    "backend dependency cycle involving: {}",
                    stuck.join(", ")
                )));
            }
        }

        debug!(
            order = ?ordered.iter().map(|b| b.name()).collect::<Vec<_>>(),
            "resolved backend order"
        );
        Ok(BackendRegistry {
            ordered,
            failed_setup: HashSet::new(),
        })
    }
}

/// The dependency-resolved set of registered backends.
///
/// Read-only once [`BackendRegistry::setup`] has run; job execution
/// resolves against it without locking.
pub struct BackendRegistry {
    ordered: Vec<Arc<dyn Backend>>,
    failed_setup: HashSet<String>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field(
                "ordered",
                &self.ordered.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field("failed_setup", &self.failed_setup)
            .finish()
    }
}

impl BackendRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Run each enabled backend's setup hook, in dependency order.
    ///
    /// A backend whose setup fails is disabled for the rest of the
    /// session rather than failing the whole catalog; its absence
    /// surfaces as missing data, not as an error.
    pub async fn setup(&mut self, cache: &Arc<ResultCache>, settings: &Arc<Settings>) {
        for backend in &self.ordered {
            if !settings.backend_enabled(backend.name()) {
                continue;
            }
            let ctx = BackendContext::new(
                CancellationToken::new(),
                Arc::clone(settings),
                cache.namespace(backend.name()),
            );
            if let Err(err) = backend.setup(&ctx).await {
                warn!(backend = backend.name(), error = %err, "backend setup failed, disabling");
                self.failed_setup.insert(backend.name().to_string());
            }
        }
    }

    /// Run every backend's teardown hook, in reverse dependency order
    pub async fn teardown(&self) {
        for backend in self.ordered.iter().rev() {
            backend.teardown().await;
        }
    }

    /// Number of registered backends
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether no backends are registered
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Iterate over the backends in dependency order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.ordered.iter()
    }

    /// Look up a backend by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.ordered.iter().find(|b| b.name() == name)
    }

    fn usable(&self, backend: &Arc<dyn Backend>, settings: &Settings) -> bool {
        settings.backend_enabled(backend.name()) && !self.failed_setup.contains(backend.name())
    }

    /// The ordered backends able to execute `action`.
    ///
    /// Disabled and setup-failed backends are excluded without error;
    /// the dispatcher decides whether an empty result degrades to "no
    /// results" or is a failure for the action.
    pub fn resolve(&self, action: JobAction, settings: &Settings) -> Vec<Arc<dyn Backend>> {
        self.ordered
            .iter()
            .filter(|b| self.usable(b, settings) && b.capabilities().supports_action(action))
            .cloned()
            .collect()
    }

    /// The ordered backends able to satisfy any attribute in `flags`
    pub fn resolve_refiners(
        &self,
        flags: RefineFlags,
        settings: &Settings,
    ) -> Vec<Arc<dyn Backend>> {
        self.ordered
            .iter()
            .filter(|b| self.usable(b, settings) && b.capabilities().supports_refine(flags))
            .cloned()
            .collect()
    }
}
