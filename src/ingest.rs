/// Ingestion: raw tabs in, routed and persisted tabs out
///
/// Each raw tab moves through `Raw -> Orphan -> {Matched | Unmatched}` and a
/// matched tab ends as either `DuplicateRejected` or `Persisted`. Rejected tabs
/// are dropped with a log entry and never retried.
///
/// Bulk ingestion checks duplicates against one snapshot of each target
/// collection taken before anything in the batch is written. Two tabs with
/// the same URL inside one batch are therefore both accepted unless that URL
/// was already stored.
use crate::collection::Collection;
use crate::error::Result;
use crate::favicon::{bulk_store, default_favicon_url, store_favicon, FaviconCache};
use crate::matcher::{route, Routing};
use crate::storage::TabStore;
use crate::tab_data::{CollectionId, RawTab, Tab, TabInput};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoMatch,
    AmbiguousMatch,
    DuplicateNotAllowed,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoMatch => write!(f, "no matching collection"),
            Rejection::AmbiguousMatch => write!(f, "ambiguous match"),
            Rejection::DuplicateNotAllowed => write!(f, "duplicate not allowed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Routed(CollectionId),
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_routed(&self) -> bool {
        matches!(self, Outcome::Routed(_))
    }
}

/// A tab that found exactly one collection
struct Matched<'a> {
    tab: Tab,
    collection: &'a Collection,
    collection_id: CollectionId,
}

/// Route one orphan, logging soft rejections
fn resolve<'a>(tab: Tab, collections: &'a [Collection]) -> Result<std::result::Result<Matched<'a>, Rejection>> {
    match route(&tab.url, collections) {
        Routing::Unmatched => {
            log::warn!("No matches found for {}", tab.url);
            Ok(Err(Rejection::NoMatch))
        }
        Routing::Ambiguous(tied) => {
            let filters: Vec<String> = tied
                .iter()
                .map(|m| format!("{} ({})", m.filter.source(), m.collection.title))
                .collect();
            log::warn!("Multiple matches found for {}: {}", tab.url, filters.join(", "));
            Ok(Err(Rejection::AmbiguousMatch))
        }
        Routing::Routed(m) => {
            let collection_id = m.collection.require_id()?;
            Ok(Ok(Matched {
                tab,
                collection: m.collection,
                collection_id,
            }))
        }
    }
}

/// The URLs a collection holds right now: its loaded tabs, or the store's
async fn existing_urls<S: TabStore + ?Sized>(
    store: &S,
    collection: &Collection,
    collection_id: CollectionId,
) -> Result<HashSet<String>> {
    match &collection.tabs {
        Some(tabs) => Ok(tabs.iter().map(|t| t.url.clone()).collect()),
        None => Ok(store
            .get_tabs(collection_id)
            .await?
            .into_iter()
            .map(|t| t.url)
            .collect()),
    }
}

fn is_duplicate(matched: &Matched<'_>, existing: &HashSet<String>) -> bool {
    if !matched.collection.allow_duplicates && existing.contains(&matched.tab.url) {
        log::info!("Tab {} is already in {}", matched.tab.url, matched.collection.title);
        return true;
    }
    false
}

fn to_input(matched: &Matched<'_>) -> TabInput {
    TabInput {
        collection_id: matched.collection_id,
        url: matched.tab.url.clone(),
        title: matched.tab.title.clone(),
        favicon_hash: matched.tab.favicon.clone(),
        creation_time: matched.tab.creation_time,
    }
}

/// Routes raw tabs into collections and persists the accepted ones
pub struct Pipeline<'a, S: TabStore + ?Sized> {
    store: &'a S,
    favicons: Option<&'a FaviconCache>,
    fetch_undefined_favicons: bool,
}

impl<'a, S: TabStore + ?Sized> Pipeline<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Pipeline {
            store,
            favicons: None,
            fetch_undefined_favicons: false,
        }
    }

    /// Check favicon existence against this cache instead of the store
    pub fn with_favicon_cache(mut self, cache: &'a FaviconCache) -> Self {
        self.favicons = Some(cache);
        self
    }

    /// Fall back to the site's `/favicon.ico` for tabs reported without one
    pub fn fetch_undefined_favicons(mut self, enabled: bool) -> Self {
        self.fetch_undefined_favicons = enabled;
        self
    }

    fn favicon_source(&self, raw: &RawTab) -> Option<String> {
        if raw.favicon_hash.is_some() {
            return None;
        }
        match &raw.fav_icon_url {
            Some(source) if !source.is_empty() => Some(source.clone()),
            _ if self.fetch_undefined_favicons => default_favicon_url(raw.url.trim()),
            _ => None,
        }
    }

    /// Route and persist a single tab
    pub async fn ingest_one(&self, raw: &RawTab, collections: &[Collection]) -> Result<Outcome> {
        let matched = match resolve(Tab::orphan(raw), collections)? {
            Ok(matched) => matched,
            Err(rejection) => return Ok(Outcome::Rejected(rejection)),
        };

        let existing = existing_urls(self.store, matched.collection, matched.collection_id).await?;
        if is_duplicate(&matched, &existing) {
            return Ok(Outcome::Rejected(Rejection::DuplicateNotAllowed));
        }

        let mut input = to_input(&matched);
        if let Some(source) = self.favicon_source(raw) {
            input.favicon_hash = Some(store_favicon(self.store, self.favicons, &source).await?);
        }

        self.store.add_tab(input).await?;
        log::info!("Tab {} added to {}", matched.tab.url, matched.collection.title);
        Ok(Outcome::Routed(matched.collection_id))
    }

    /// Route and persist many tabs. Outcomes follow input order; favicons and
    /// tabs are each written in one bulk call.
    pub async fn ingest_many(&self, raws: &[RawTab], collections: &[Collection]) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(raws.len());
        let mut snapshots: HashMap<CollectionId, HashSet<String>> = HashMap::new();
        let mut accepted: Vec<(Matched<'_>, Option<String>)> = Vec::new();

        for raw in raws {
            let matched = match resolve(Tab::orphan(raw), collections)? {
                Ok(matched) => matched,
                Err(rejection) => {
                    outcomes.push(Outcome::Rejected(rejection));
                    continue;
                }
            };

            if !snapshots.contains_key(&matched.collection_id) {
                let urls = existing_urls(self.store, matched.collection, matched.collection_id).await?;
                snapshots.insert(matched.collection_id, urls);
            }
            if is_duplicate(&matched, &snapshots[&matched.collection_id]) {
                outcomes.push(Outcome::Rejected(Rejection::DuplicateNotAllowed));
                continue;
            }

            outcomes.push(Outcome::Routed(matched.collection_id));
            accepted.push((matched, self.favicon_source(raw)));
        }

        if accepted.is_empty() {
            return Ok(outcomes);
        }

        let sources: Vec<Option<String>> = accepted.iter().map(|(_, source)| source.clone()).collect();
        let hashes = bulk_store(self.store, self.favicons, &sources).await?;

        let inputs: Vec<TabInput> = accepted
            .iter()
            .zip(hashes)
            .map(|((matched, _), hash)| {
                let mut input = to_input(matched);
                if hash.is_some() {
                    input.favicon_hash = hash;
                }
                input
            })
            .collect();

        self.store.bulk_add_tabs(inputs).await?;
        for (matched, _) in &accepted {
            log::info!("Tab {} added to {}", matched.tab.url, matched.collection.title);
        }
        Ok(outcomes)
    }
}
