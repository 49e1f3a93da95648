use crate::domain::app::{App, Review};
use crate::domain::app_list::AppList;
use crate::domain::events::FailureEvent;
use crate::error::CoreError;
use crate::types::{DedupeFlags, RefineFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Value object: job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    fn generate() -> Self {
        JobId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The logical action a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobAction {
    /// List installed applications
    GetInstalled,
    /// List available updates
    GetUpdates,
    /// Full-text search for applications
    Search,
    /// Ask backends to refresh their local caches
    Refresh,
    /// Enrich the target entities with requested attributes
    Refine,
    /// Resolve a local file to an application entity
    FileToApp,
    /// Install the target application
    Install,
    /// Remove the target application
    Remove,
    /// Submit a review for the target application
    SubmitReview,
}

impl JobAction {
    /// Whether the action must be routed to a single authoritative
    /// backend (the entity's management owner) rather than fanned out
    pub fn is_exclusive(self) -> bool {
        matches!(
            self,
            JobAction::Install | JobAction::Remove | JobAction::SubmitReview
        )
    }

    /// Whether the action produces an application list as its primary
    /// result
    pub fn produces_list(self) -> bool {
        !matches!(self, JobAction::Refresh)
    }

    /// Stable name for logs and events
    pub fn as_str(self) -> &'static str {
        match self {
            JobAction::GetInstalled => "get-installed",
            JobAction::GetUpdates => "get-updates",
            JobAction::Search => "search",
            JobAction::Refresh => "refresh",
            JobAction::Refine => "refine",
            JobAction::FileToApp => "file-to-app",
            JobAction::Install => "install",
            JobAction::Remove => "remove",
            JobAction::SubmitReview => "submit-review",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The entities a job operates on
#[derive(Debug, Clone, Default)]
pub enum JobTarget {
    /// No target; the job produces entities instead of consuming them
    #[default]
    None,
    /// A single entity, e.g. the app being installed
    App(Box<App>),
    /// A list of entities, e.g. the rows being refined
    List(AppList),
}

impl JobTarget {
    /// The single target entity, when the target is one entity
    pub fn as_app(&self) -> Option<&App> {
        match self {
            JobTarget::App(app) => Some(app),
            _ => None,
        }
    }

    /// The target entities as a list, cloning a single entity into a
    /// list of one
    pub fn to_list(&self) -> AppList {
        match self {
            JobTarget::None => AppList::new(),
            JobTarget::App(app) => {
                let mut list = AppList::new();
                list.merge((**app).clone());
                list
            }
            JobTarget::List(list) => list.clone(),
        }
    }
}

/// One logical request submitted to the dispatcher.
///
/// Immutable once built; construct through [`Job::builder`], which
/// validates the parameters the action requires.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    action: JobAction,
    refine_flags: RefineFlags,
    dedupe_flags: DedupeFlags,
    target: JobTarget,
    query: Option<String>,
    file: Option<PathBuf>,
    review: Option<Review>,
    cache_age: Option<Duration>,
}

impl Job {
    /// Start building a job for `action`
    pub fn builder(action: JobAction) -> JobBuilder {
        JobBuilder {
            action,
            refine_flags: RefineFlags::NONE,
            dedupe_flags: DedupeFlags::default(),
            target: JobTarget::None,
            query: None,
            file: None,
            review: None,
            cache_age: None,
        }
    }

    /// Unique identifier of this job
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// The action to perform
    pub fn action(&self) -> JobAction {
        self.action
    }

    /// Requested refinement attributes
    pub fn refine_flags(&self) -> RefineFlags {
        self.refine_flags
    }

    /// How raw backend outputs are collapsed
    pub fn dedupe_flags(&self) -> DedupeFlags {
        self.dedupe_flags
    }

    /// The entities the job operates on
    pub fn target(&self) -> &JobTarget {
        &self.target
    }

    /// Search query, for [`JobAction::Search`]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Local file, for [`JobAction::FileToApp`]
    pub fn file(&self) -> Option<&std::path::Path> {
        self.file.as_deref()
    }

    /// Review payload, for [`JobAction::SubmitReview`]
    pub fn review(&self) -> Option<&Review> {
        self.review.as_ref()
    }

    /// Maximum acceptable cache age, for [`JobAction::Refresh`]
    pub fn cache_age(&self) -> Option<Duration> {
        self.cache_age
    }
}

/// Builder for [`Job`]
#[derive(Debug)]
pub struct JobBuilder {
    action: JobAction,
    refine_flags: RefineFlags,
    dedupe_flags: DedupeFlags,
    target: JobTarget,
    query: Option<String>,
    file: Option<PathBuf>,
    review: Option<Review>,
    cache_age: Option<Duration>,
}

impl JobBuilder {
    /// Request refinement attributes on the result entities
    pub fn refine_flags(mut self, flags: RefineFlags) -> Self {
        self.refine_flags = flags;
        self
    }

    /// Override the dedupe mode
    pub fn dedupe_flags(mut self, flags: DedupeFlags) -> Self {
        self.dedupe_flags = flags;
        self
    }

    /// Target a single entity
    pub fn target_app(mut self, app: App) -> Self {
        self.target = JobTarget::App(Box::new(app));
        self
    }

    /// Target a list of entities
    pub fn target_list(mut self, list: AppList) -> Self {
        self.target = JobTarget::List(list);
        self
    }

    /// Set the search query
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set the local file to resolve
    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Set the review payload
    pub fn review(mut self, review: Review) -> Self {
        self.review = Some(review);
        self
    }

    /// Set the maximum acceptable cache age
    pub fn cache_age(mut self, age: Duration) -> Self {
        self.cache_age = Some(age);
        self
    }

    /// Validate and build the job
    pub fn build(self) -> Result<Job, CoreError> {
        match self.action {
            JobAction::Search if self.query.is_none() => {
                return Err(CoreError::Configuration(
                    "search job requires a query".to_string(),
                ));
            }
            JobAction::FileToApp if self.file.is_none() => {
                return Err(CoreError::Configuration(
                    "file-to-app job requires a file".to_string(),
                ));
            }
            JobAction::Install | JobAction::Remove if self.target.as_app().is_none() => {
                return Err(CoreError::Configuration(format!(
                    "{} job requires a target app",
                    self.action
                )));
            }
            JobAction::SubmitReview
                if self.target.as_app().is_none() || self.review.is_none() =>
            {
                return Err(CoreError::Configuration(
                    "submit-review job requires a target app and a review".to_string(),
                ));
            }
            JobAction::Refine if matches!(self.target, JobTarget::None) => {
                return Err(CoreError::Configuration(
                    "refine job requires target entities".to_string(),
                ));
            }
            _ => {}
        }

        Ok(Job {
            id: JobId::generate(),
            action: self.action,
            refine_flags: self.refine_flags,
            dedupe_flags: self.dedupe_flags,
            target: self.target,
            query: self.query,
            file: self.file,
            review: self.review,
            cache_age: self.cache_age,
        })
    }
}

/// Terminal status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// All applicable backends were given the chance to run
    Succeeded,
    /// The job was cancelled; the result holds whatever was merged
    /// before cancellation
    Cancelled,
}

/// The result of one job: the merged entity list, the non-fatal failure
/// events collected along the way, and the terminal status.
#[derive(Debug)]
pub struct JobOutcome {
    /// Merged, deduplicated entities
    pub list: AppList,
    /// Non-fatal per-backend failures
    pub events: Vec<FailureEvent>,
    /// Terminal status
    pub status: JobStatus,
}

impl JobOutcome {
    /// Whether the job ran to completion without cancellation
    pub fn is_complete(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}
