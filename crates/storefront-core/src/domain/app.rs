use crate::types::{Quality, Quirks};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

/// Scope half of an application identity key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AppScope {
    /// Scope not yet known
    Unknown,
    /// Installed or installable system-wide
    System,
    /// Installed or installable per-user
    User,
}

impl AppScope {
    /// Stable text form used in identity keys
    pub fn as_str(self) -> &'static str {
        match self {
            AppScope::Unknown => "*",
            AppScope::System => "system",
            AppScope::User => "user",
        }
    }
}

/// Bundle kind half of an application identity key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BundleKind {
    /// Kind not yet known
    Unknown,
    /// Distribution package
    Package,
    /// Desktop application
    Desktop,
    /// Device firmware
    Firmware,
    /// Addon, codec or other generic component
    Generic,
}

impl BundleKind {
    /// Stable text form used in identity keys
    pub fn as_str(self) -> &'static str {
        match self {
            BundleKind::Unknown => "*",
            BundleKind::Package => "package",
            BundleKind::Desktop => "desktop",
            BundleKind::Firmware => "firmware",
            BundleKind::Generic => "generic",
        }
    }
}

/// Stable identity of one installable/updatable/reviewable unit.
///
/// Two entities with equal identity refer to the same real-world object
/// and must be merged, never duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppId {
    /// Installation scope
    pub scope: AppScope,
    /// Bundle kind
    pub kind: BundleKind,
    /// Origin the entity came from, e.g. a repository name
    pub origin: String,
    /// Primary identifier, e.g. `org.example.App`
    pub id: String,
    /// Version class, e.g. `stable`
    pub branch: String,
}

impl AppId {
    /// Create a new identity key
    pub fn new(
        scope: AppScope,
        kind: BundleKind,
        origin: impl Into<String>,
        id: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            kind,
            origin: origin.into(),
            id: id.into(),
            branch: branch.into(),
        }
    }

    /// Render the identity as its canonical `scope/kind/origin/id/branch`
    /// key, used for cache keys, staging indexes and logs.
    pub fn unique_key(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.scope.as_str(),
            self.kind.as_str(),
            self.origin,
            self.id,
            self.branch
        )
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unique_key())
    }
}

/// Installation state machine of an [`App`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppState {
    /// State not yet determined
    Unknown,
    /// Not installed, available from a backend
    Available,
    /// Waiting in the install queue
    QueuedForInstall,
    /// Install in progress
    Installing,
    /// Installed and up to date
    Installed,
    /// Installed, an update is available
    Updatable,
    /// Installed, an update can be applied without restart
    UpdatableLive,
    /// Removal in progress
    Removing,
}

impl AppState {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Any state may be reset to `Unknown`.
    pub fn can_enter(self, next: AppState) -> bool {
        if next == AppState::Unknown || self == next {
            return true;
        }
        match self {
            AppState::Unknown => true,
            AppState::Available => matches!(
                next,
                AppState::QueuedForInstall | AppState::Installing
            ),
            AppState::QueuedForInstall => {
                matches!(next, AppState::Available | AppState::Installing)
            }
            AppState::Installing => matches!(next, AppState::Installed | AppState::Available),
            AppState::Installed => matches!(
                next,
                AppState::Removing | AppState::Updatable | AppState::UpdatableLive
            ),
            AppState::Updatable | AppState::UpdatableLive => matches!(
                next,
                AppState::Installing | AppState::Installed | AppState::Removing
            ),
            AppState::Removing => matches!(next, AppState::Available | AppState::Installed),
        }
    }

    /// Informativeness rank used when merging two views of one entity.
    ///
    /// Merge keeps the higher-ranked state, which is commutative without
    /// a per-state quality rank.
    pub(crate) fn merge_priority(self) -> u8 {
        match self {
            AppState::Unknown => 0,
            AppState::Available => 1,
            AppState::QueuedForInstall => 2,
            AppState::Installing => 3,
            AppState::Removing => 4,
            AppState::Installed => 5,
            AppState::Updatable => 6,
            AppState::UpdatableLive => 7,
        }
    }
}

/// One user review of an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Stable review identifier from the review service
    pub id: String,
    /// One-line summary
    pub summary: String,
    /// Full review text
    pub text: String,
    /// Star rating as a percentage, 0-100
    pub rating: i32,
    /// Display name of the reviewer
    pub reviewer: String,
    /// Submission date
    pub date: DateTime<Utc>,
}

/// A value plus the quality rank of the write that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ranked<T> {
    value: T,
    quality: Quality,
}

impl<T> Ranked<T> {
    fn accept(slot: &mut Option<Ranked<T>>, quality: Quality, value: T) {
        match slot {
            Some(current) if current.quality >= quality => {}
            _ => *slot = Some(Ranked { value, quality }),
        }
    }
}

/// The shared record describing one installable/updatable item.
///
/// Different backends own different attributes; every attribute write
/// carries a [`Quality`] rank and lands only if it outranks the recorded
/// writer. Merging two `App`s with the same identity is therefore
/// insensitive to merge order as long as writers use distinct ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    id: AppId,
    state: AppState,
    quirks: Quirks,
    name: Option<Ranked<String>>,
    summary: Option<Ranked<String>>,
    description: Option<Ranked<String>>,
    version: Option<Ranked<String>>,
    license: Option<Ranked<String>>,
    homepage: Option<Ranked<String>>,
    icon: Option<Ranked<String>>,
    size_installed: Option<Ranked<u64>>,
    size_download: Option<Ranked<u64>>,
    rating: Option<Ranked<i32>>,
    review_ratings: Option<[u32; 6]>,
    reviews: Vec<Review>,
    provided_ids: BTreeSet<String>,
    metadata: BTreeMap<String, String>,
    managed_by: Option<String>,
    progress: u8,
}

impl App {
    /// Create a new entity in state `Unknown` with no attributes set
    pub fn new(id: AppId) -> Self {
        Self {
            id,
            state: AppState::Unknown,
            quirks: Quirks::NONE,
            name: None,
            summary: None,
            description: None,
            version: None,
            license: None,
            homepage: None,
            icon: None,
            size_installed: None,
            size_download: None,
            rating: None,
            review_ratings: None,
            reviews: Vec::new(),
            provided_ids: BTreeSet::new(),
            metadata: BTreeMap::new(),
            managed_by: None,
            progress: 0,
        }
    }

    /// Create a placeholder entity for an identity whose authoritative
    /// data has not arrived yet. The name is derived from the raw id at
    /// the lowest quality so any real writer replaces it.
    pub fn placeholder(id: AppId) -> Self {
        let mut app = App::new(id);
        app.quirks.insert(Quirks::PLACEHOLDER);
        let derived = app.id.id.clone();
        app.set_name(Quality::Lowest, derived);
        app
    }

    /// The identity key
    pub fn id(&self) -> &AppId {
        &self.id
    }

    /// Canonical identity key string
    pub fn unique_key(&self) -> String {
        self.id.unique_key()
    }

    /// Current installation state
    pub fn state(&self) -> AppState {
        self.state
    }

    /// Move to `state`, enforcing the state machine. An invalid
    /// transition is logged and leaves the state unchanged.
    pub fn set_state(&mut self, state: AppState) {
        if self.state == state {
            return;
        }
        if !self.state.can_enter(state) {
            warn!(
                app = %self.id,
                from = ?self.state,
                to = ?state,
                "ignoring invalid state transition"
            );
            return;
        }
        self.state = state;
    }

    /// Quirk set
    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    /// Whether `quirk` is set
    pub fn has_quirk(&self, quirk: Quirks) -> bool {
        self.quirks.contains(quirk)
    }

    /// Add quirks; quirks are never unset by backends
    pub fn add_quirks(&mut self, quirks: Quirks) {
        self.quirks.insert(quirks);
    }

    /// Display name
    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(|r| r.value.as_str())
    }

    /// Set the display name at `quality`
    pub fn set_name(&mut self, quality: Quality, name: impl Into<String>) {
        Ranked::accept(&mut self.name, quality, name.into());
    }

    /// One-line summary
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_ref().map(|r| r.value.as_str())
    }

    /// Set the summary at `quality`
    pub fn set_summary(&mut self, quality: Quality, summary: impl Into<String>) {
        Ranked::accept(&mut self.summary, quality, summary.into());
    }

    /// Long description
    pub fn description(&self) -> Option<&str> {
        self.description.as_ref().map(|r| r.value.as_str())
    }

    /// Set the description at `quality`
    pub fn set_description(&mut self, quality: Quality, description: impl Into<String>) {
        Ranked::accept(&mut self.description, quality, description.into());
    }

    /// Installable or installed version
    pub fn version(&self) -> Option<&str> {
        self.version.as_ref().map(|r| r.value.as_str())
    }

    /// Set the version at `quality`
    pub fn set_version(&mut self, quality: Quality, version: impl Into<String>) {
        Ranked::accept(&mut self.version, quality, version.into());
    }

    /// Project license
    pub fn license(&self) -> Option<&str> {
        self.license.as_ref().map(|r| r.value.as_str())
    }

    /// Set the license at `quality`
    pub fn set_license(&mut self, quality: Quality, license: impl Into<String>) {
        Ranked::accept(&mut self.license, quality, license.into());
    }

    /// Homepage URL
    pub fn homepage(&self) -> Option<&str> {
        self.homepage.as_ref().map(|r| r.value.as_str())
    }

    /// Set the homepage URL at `quality`
    pub fn set_homepage(&mut self, quality: Quality, homepage: impl Into<String>) {
        Ranked::accept(&mut self.homepage, quality, homepage.into());
    }

    /// Icon name or path
    pub fn icon(&self) -> Option<&str> {
        self.icon.as_ref().map(|r| r.value.as_str())
    }

    /// Set the icon at `quality`
    pub fn set_icon(&mut self, quality: Quality, icon: impl Into<String>) {
        Ranked::accept(&mut self.icon, quality, icon.into());
    }

    /// Installed size in bytes
    pub fn size_installed(&self) -> Option<u64> {
        self.size_installed.as_ref().map(|r| r.value)
    }

    /// Set the installed size at `quality`
    pub fn set_size_installed(&mut self, quality: Quality, size: u64) {
        Ranked::accept(&mut self.size_installed, quality, size);
    }

    /// Download size in bytes
    pub fn size_download(&self) -> Option<u64> {
        self.size_download.as_ref().map(|r| r.value)
    }

    /// Set the download size at `quality`
    pub fn set_size_download(&mut self, quality: Quality, size: u64) {
        Ranked::accept(&mut self.size_download, quality, size);
    }

    /// Aggregate rating percentage, 0-100
    pub fn rating(&self) -> Option<i32> {
        self.rating.as_ref().map(|r| r.value)
    }

    /// Set the aggregate rating at `quality`
    pub fn set_rating(&mut self, quality: Quality, rating: i32) {
        Ranked::accept(&mut self.rating, quality, rating);
    }

    /// Per-star review histogram (index 1..=5 used, index 0 is the total
    /// bucket from services that report one)
    pub fn review_ratings(&self) -> Option<&[u32; 6]> {
        self.review_ratings.as_ref()
    }

    /// Set the review histogram; the first writer wins
    pub fn set_review_ratings(&mut self, ratings: [u32; 6]) {
        if self.review_ratings.is_none() {
            self.review_ratings = Some(ratings);
        }
    }

    /// Reviews fetched so far
    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    /// Add a review, ignoring duplicates by review id
    pub fn add_review(&mut self, review: Review) {
        if !self.reviews.iter().any(|r| r.id == review.id) {
            self.reviews.push(review);
        }
    }

    /// Additional identifiers this entity is known by
    pub fn provided_ids(&self) -> &BTreeSet<String> {
        &self.provided_ids
    }

    /// Record an additional identifier
    pub fn add_provided_id(&mut self, id: impl Into<String>) {
        self.provided_ids.insert(id.into());
    }

    /// Backend-private metadata value for `key`
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Stash backend-private metadata; the first writer per key wins
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Name of the backend that owns install/remove for this entity
    pub fn managed_by(&self) -> Option<&str> {
        self.managed_by.as_deref()
    }

    /// Record the management owner; the first writer wins
    pub fn set_managed_by(&mut self, backend: impl Into<String>) {
        if self.managed_by.is_none() {
            self.managed_by = Some(backend.into());
        }
    }

    /// Install/download progress percentage, 0-100
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Set the progress percentage; values above 100 are clamped
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    /// Whether the entity is currently installed (any installed-family
    /// state)
    pub fn is_installed(&self) -> bool {
        matches!(
            self.state,
            AppState::Installed | AppState::Updatable | AppState::UpdatableLive
        )
    }

    /// Merge another view of the same identity into this one.
    ///
    /// Attribute writes keep their recorded quality ranks, so the result
    /// does not depend on which view arrived first. A placeholder is
    /// replaced wholesale by the first non-placeholder view; only the
    /// higher-ranked state survives the replacement.
    pub fn merge_from(&mut self, incoming: App) {
        debug_assert_eq!(self.id, incoming.id, "merging entities with different identity");

        let self_placeholder = self.quirks.contains(Quirks::PLACEHOLDER);
        let incoming_placeholder = incoming.quirks.contains(Quirks::PLACEHOLDER);

        if self_placeholder && !incoming_placeholder {
            let prior_state = self.state;
            *self = incoming;
            if prior_state.merge_priority() > self.state.merge_priority() {
                self.state = prior_state;
            }
            return;
        }
        if !self_placeholder && incoming_placeholder {
            if incoming.state.merge_priority() > self.state.merge_priority() {
                self.state = incoming.state;
            }
            return;
        }

        if incoming.state.merge_priority() > self.state.merge_priority() {
            self.state = incoming.state;
        }
        self.quirks.insert(incoming.quirks);

        merge_ranked(&mut self.name, incoming.name);
        merge_ranked(&mut self.summary, incoming.summary);
        merge_ranked(&mut self.description, incoming.description);
        merge_ranked(&mut self.version, incoming.version);
        merge_ranked(&mut self.license, incoming.license);
        merge_ranked(&mut self.homepage, incoming.homepage);
        merge_ranked(&mut self.icon, incoming.icon);
        merge_ranked(&mut self.size_installed, incoming.size_installed);
        merge_ranked(&mut self.size_download, incoming.size_download);
        merge_ranked(&mut self.rating, incoming.rating);

        if self.review_ratings.is_none() {
            self.review_ratings = incoming.review_ratings;
        }
        for review in incoming.reviews {
            self.add_review(review);
        }
        self.provided_ids.extend(incoming.provided_ids);
        for (key, value) in incoming.metadata {
            self.metadata.entry(key).or_insert(value);
        }
        if self.managed_by.is_none() {
            self.managed_by = incoming.managed_by;
        }
    }
}

fn merge_ranked<T>(slot: &mut Option<Ranked<T>>, incoming: Option<Ranked<T>>) {
    if let Some(ranked) = incoming {
        Ranked::accept(slot, ranked.quality, ranked.value);
    }
}
