use crate::domain::app::{App, AppId};
use std::collections::HashMap;

/// An identity-unique collection of [`App`] entities produced by one job.
///
/// Entities added through [`AppList::merge`] are deduplicated by identity
/// key on insert; [`AppList::push`] keeps raw entries for callers that
/// asked for no dedupe. Published snapshots iterate in identity-key order
/// so results are deterministic.
#[derive(Debug, Clone, Default)]
pub struct AppList {
    apps: Vec<App>,
    index: HashMap<String, usize>,
}

impl AppList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities in the list
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Iterate over the entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &App> {
        self.apps.iter()
    }

    /// Iterate mutably over the entities
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut App> {
        self.apps.iter_mut()
    }

    /// Look up an entity by identity
    pub fn get(&self, id: &AppId) -> Option<&App> {
        self.index.get(&id.unique_key()).map(|&i| &self.apps[i])
    }

    /// Whether an entity with `id` is present
    pub fn contains(&self, id: &AppId) -> bool {
        self.index.contains_key(&id.unique_key())
    }

    /// Append without deduplication.
    ///
    /// The identity index keeps pointing at the first entry for a key, so
    /// a later [`AppList::dedupe`] folds duplicates into that entry.
    pub fn push(&mut self, app: App) {
        let key = app.unique_key();
        self.apps.push(app);
        let idx = self.apps.len() - 1;
        self.index.entry(key).or_insert(idx);
    }

    /// Merge an entity into the list.
    ///
    /// If an entity with the same identity key exists its attributes are
    /// updated in place through the quality-ranked merge on [`App`];
    /// otherwise the entity is inserted.
    pub fn merge(&mut self, app: App) {
        let key = app.unique_key();
        match self.index.get(&key) {
            Some(&i) => self.apps[i].merge_from(app),
            None => {
                self.apps.push(app);
                self.index.insert(key, self.apps.len() - 1);
            }
        }
    }

    /// Merge every entity of `other` into this list
    pub fn merge_list(&mut self, other: AppList) {
        for app in other.apps {
            self.merge(app);
        }
    }

    /// Collapse duplicate identities in place. Idempotent.
    pub fn dedupe(&mut self) {
        if self.apps.len() == self.index.len() {
            return;
        }
        let mut deduped = AppList::new();
        for app in self.apps.drain(..) {
            deduped.merge(app);
        }
        *self = deduped;
    }

    /// Sort the list by identity key, giving the deterministic order
    /// published snapshots use
    pub fn sort_by_identity(&mut self) {
        self.apps.sort_by_key(|app| app.unique_key());
        self.reindex();
    }

    /// Consume the list, returning the entities
    pub fn into_vec(self) -> Vec<App> {
        self.apps
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, app) in self.apps.iter().enumerate() {
            self.index.entry(app.unique_key()).or_insert(i);
        }
    }
}

impl FromIterator<App> for AppList {
    fn from_iter<I: IntoIterator<Item = App>>(iter: I) -> Self {
        let mut list = AppList::new();
        for app in iter {
            list.merge(app);
        }
        list
    }
}

impl<'a> IntoIterator for &'a AppList {
    type Item = &'a App;
    type IntoIter = std::slice::Iter<'a, App>;

    fn into_iter(self) -> Self::IntoIter {
        self.apps.iter()
    }
}
