/// Application context
///
/// Built once at startup, after settings are loaded, and handed to every
/// component that needs the store, the settings or the favicon cache.
use crate::collection::{Collection, CollectionFields};
use crate::error::{Error, Result, StoreError};
use crate::favicon::{self, FaviconCache};
use crate::ingest::{Outcome, Pipeline};
use crate::settings::{SettingValue, Settings};
use crate::storage::{TabStore, WatchId};
use crate::tab_data::{now_millis, CollectionId, RawTab, Tab};
use std::cell::{Ref, RefCell};
use std::rc::Rc;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

pub struct AppContext<S: TabStore> {
    store: S,
    settings: RefCell<Settings>,
    favicons: Option<Rc<FaviconCache>>,
    favicon_watch: Option<WatchId>,
}

impl<S: TabStore> AppContext<S> {
    /// Apply the log level, then prime the favicon cache when enabled
    pub async fn init(store: S, settings: Settings) -> Result<Self> {
        log::set_max_level(settings.log_level());

        let (favicons, favicon_watch) = if settings.cache_favicons() {
            let (cache, watch) = FaviconCache::attach(&store);
            cache.replace_all(&store.get_all_favicons().await?);
            (Some(cache), Some(watch))
        } else {
            (None, None)
        };

        Ok(AppContext {
            store,
            settings: RefCell::new(settings),
            favicons,
            favicon_watch,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> Ref<'_, Settings> {
        self.settings.borrow()
    }

    /// Change one setting. The favicon cache is only created at startup, so
    /// toggling `cacheFavicons` takes effect after a restart.
    pub fn set_setting(&self, key: &str, value: SettingValue) -> Result<()> {
        let mut settings = self.settings.borrow_mut();
        settings.set(key, value)?;
        log::set_max_level(settings.log_level());
        Ok(())
    }

    pub fn favicon_cache(&self) -> Option<&FaviconCache> {
        self.favicons.as_deref()
    }

    pub fn pipeline(&self) -> Pipeline<'_, S> {
        let pipeline = Pipeline::new(&self.store)
            .fetch_undefined_favicons(self.settings.borrow().fetch_undefined_favicons());
        match self.favicon_cache() {
            Some(cache) => pipeline.with_favicon_cache(cache),
            None => pipeline,
        }
    }

    /// Compile every stored collection, optionally with its tabs
    pub async fn load_collections(&self, with_tabs: bool) -> Result<Vec<Collection>> {
        let records = self.store.get_all_collections().await?;
        let mut collections = Vec::with_capacity(records.len());
        for record in &records {
            let mut collection = Collection::from_record(record)?;
            if with_tabs {
                collection = collection.with_tabs(self.load_tabs(record.id).await?);
            }
            collections.push(collection);
        }
        Ok(collections)
    }

    pub async fn load_collection(&self, id: CollectionId, with_tabs: bool) -> Result<Collection> {
        let record = self
            .store
            .get_collection(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("collection {id}")))?;
        let collection = Collection::from_record(&record)?;
        if with_tabs {
            Ok(collection.with_tabs(self.load_tabs(id).await?))
        } else {
            Ok(collection)
        }
    }

    async fn load_tabs(&self, id: CollectionId) -> Result<Vec<Tab>> {
        Ok(self.store.get_tabs(id).await?.iter().map(Tab::from_record).collect())
    }

    /// Filters are compiled before anything is written; an invalid one
    /// rejects the whole collection.
    pub async fn create_collection(&self, fields: CollectionFields) -> Result<Collection> {
        let collection = Collection::from_fields(&fields)?;
        let id = self.store.add_collection(fields).await?;
        log::info!("Collection {} created", collection.title);
        Ok(collection.with_id(id))
    }

    /// Replace every editable field of a saved collection
    pub async fn edit_collection(&self, collection: &Collection, fields: CollectionFields) -> Result<Collection> {
        let id = collection.require_id()?;
        let edited = Collection::from_fields(&fields)?.with_id(id);
        self.store.update_collection(id, fields.into()).await?;
        Ok(edited)
    }

    /// Delete the collection and all of its tabs
    pub async fn delete_collection(&self, collection: &Collection) -> Result<()> {
        let id = collection.require_id()?;
        let removed = self.store.delete_tabs_where(id).await?;
        self.store.delete_collection(id).await?;
        log::info!("Collection {} deleted with {} tab(s)", collection.title, removed);
        Ok(())
    }

    /// Delete all tabs of the collection, keeping the collection
    pub async fn clear_collection(&self, collection: &Collection) -> Result<usize> {
        let id = collection.require_id()?;
        Ok(self.store.delete_tabs_where(id).await?)
    }

    pub async fn delete_tab(&self, tab: &Tab) -> Result<()> {
        let id = tab.id.ok_or(Error::MissingId("Tab"))?;
        Ok(self.store.delete_tab(id).await?)
    }

    /// Route tabs against the collections as stored right now
    pub async fn send_tabs(&self, raws: &[RawTab]) -> Result<Vec<Outcome>> {
        let collections = self.load_collections(false).await?;
        self.pipeline().ingest_many(raws, &collections).await
    }

    pub async fn send_tab(&self, raw: &RawTab) -> Result<Outcome> {
        let collections = self.load_collections(false).await?;
        self.pipeline().ingest_one(raw, &collections).await
    }

    /// Remove unused favicons unless the last cleanup recorded in the store is
    /// more recent than the configured frequency. Returns `None` when skipped.
    pub async fn cleanup_favicons(&self, now: f64) -> Result<Option<usize>> {
        let interval = self.settings.borrow().favicons_cleanup_hours() * MILLIS_PER_HOUR;
        if let Some(last) = self.store.last_favicons_cleanup().await? {
            if now - last < interval {
                return Ok(None);
            }
        }

        let removed = favicon::cleanup(&self.store).await?;
        self.store.set_last_favicons_cleanup(now).await?;
        Ok(Some(removed))
    }

    pub async fn cleanup_favicons_now(&self) -> Result<Option<usize>> {
        self.cleanup_favicons(now_millis()).await
    }
}

impl<S: TabStore> Drop for AppContext<S> {
    fn drop(&mut self) {
        if let Some(watch) = self.favicon_watch.take() {
            self.store.unwatch(watch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Rejection;
    use crate::settings::{CACHE_FAVICONS, FAVICONS_CLEANUP_FREQUENCY};
    use crate::storage::{MemoryStore, StorageData};
    use futures::executor::block_on;

    fn create_test_context() -> AppContext<MemoryStore> {
        block_on(AppContext::init(MemoryStore::new(), Settings::new())).unwrap()
    }

    fn fields(title: &str, filter_text: &str, priority: i64) -> CollectionFields {
        CollectionFields::new(title, filter_text, priority, false)
    }

    #[test]
    fn test_create_and_load() {
        let ctx = create_test_context();
        let created = block_on(ctx.create_collection(fields("dev", "github.com\n# code", 2))).unwrap();

        let loaded = block_on(ctx.load_collections(true)).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id(), created.id());
        assert_eq!(loaded[0].original_filters().len(), 2);
        assert_eq!(loaded[0].filters().len(), 1);
        assert_eq!(loaded[0].tabs, Some(Vec::new()));
    }

    #[test]
    fn test_invalid_filter_persists_nothing() {
        let ctx = create_test_context();

        let result = block_on(ctx.create_collection(fields("bad", "ok\n/(/", 0)));

        assert!(matches!(result, Err(Error::InvalidFilter(_))));
        assert!(ctx.store().snapshot().collections.is_empty());
    }

    #[test]
    fn test_edit_replaces_fields() {
        let ctx = create_test_context();
        let created = block_on(ctx.create_collection(fields("dev", "github.com", 0))).unwrap();

        let edited = block_on(ctx.edit_collection(&created, fields("code", "gitlab.com\ngithub.com", 4))).unwrap();
        let loaded = block_on(ctx.load_collection(created.id().unwrap(), false)).unwrap();

        assert_eq!(edited, loaded);
        assert_eq!(loaded.title, "code");
        assert_eq!(loaded.priority, 4);
        assert_eq!(loaded.filters().len(), 2);
    }

    #[test]
    fn test_invalid_edit_keeps_old_definition() {
        let ctx = create_test_context();
        let created = block_on(ctx.create_collection(fields("dev", "github.com", 0))).unwrap();

        assert!(block_on(ctx.edit_collection(&created, fields("dev", "/[/", 0))).is_err());

        let loaded = block_on(ctx.load_collection(created.id().unwrap(), false)).unwrap();
        assert_eq!(loaded.original_filters(), ["github.com".to_string()]);
    }

    #[test]
    fn test_transient_collection_operations_fail() {
        let ctx = create_test_context();
        let transient = Collection::new("t", &["x"], 0, false).unwrap();

        assert!(matches!(block_on(ctx.delete_collection(&transient)), Err(Error::MissingId(_))));
        assert!(matches!(block_on(ctx.clear_collection(&transient)), Err(Error::MissingId(_))));
        assert!(matches!(
            block_on(ctx.delete_tab(&Tab::orphan(&RawTab::new("https://x", None)))),
            Err(Error::MissingId("Tab"))
        ));
    }

    #[test]
    fn test_delete_cascades_to_tabs() {
        let ctx = create_test_context();
        let cats = block_on(ctx.create_collection(fields("cats", "cat", 0))).unwrap();
        let dogs = block_on(ctx.create_collection(fields("dogs", "dog", 0))).unwrap();
        block_on(ctx.send_tabs(&[
            RawTab::new("https://cat.example/1", None),
            RawTab::new("https://cat.example/2", None),
            RawTab::new("https://dog.example/1", None),
        ]))
        .unwrap();

        block_on(ctx.delete_collection(&cats)).unwrap();

        let data = ctx.store().snapshot();
        assert_eq!(data.collections.len(), 1);
        assert_eq!(data.tabs.len(), 1);
        assert_eq!(data.tabs[0].collection_id, dogs.id().unwrap());
    }

    #[test]
    fn test_clear_collection() {
        let ctx = create_test_context();
        let cats = block_on(ctx.create_collection(fields("cats", "cat", 0))).unwrap();
        block_on(ctx.send_tab(&RawTab::new("https://cat.example", None))).unwrap();

        assert_eq!(block_on(ctx.clear_collection(&cats)).unwrap(), 1);
        assert_eq!(ctx.store().snapshot().collections.len(), 1);
    }

    #[test]
    fn test_delete_tab() {
        let ctx = create_test_context();
        let cats = block_on(ctx.create_collection(fields("cats", "cat", 0))).unwrap();
        block_on(ctx.send_tab(&RawTab::new("https://cat.example", None))).unwrap();
        let loaded = block_on(ctx.load_collection(cats.id().unwrap(), true)).unwrap();

        block_on(ctx.delete_tab(&loaded.tabs.unwrap()[0])).unwrap();

        assert!(ctx.store().snapshot().tabs.is_empty());
    }

    #[test]
    fn test_default_collection_matches_nothing() {
        let store = MemoryStore::with_data(StorageData::populated());
        let ctx = block_on(AppContext::init(store, Settings::new())).unwrap();

        let outcome = block_on(ctx.send_tab(&RawTab::new("https://x", None))).unwrap();

        assert_eq!(outcome, Outcome::Rejected(Rejection::NoMatch));
    }

    #[test]
    fn test_send_sees_collections_created_later() {
        let ctx = create_test_context();
        let raw = RawTab::new("https://cat.example", None);
        assert_eq!(block_on(ctx.send_tab(&raw)).unwrap(), Outcome::Rejected(Rejection::NoMatch));

        let cats = block_on(ctx.create_collection(fields("cats", "cat", 0))).unwrap();

        assert_eq!(block_on(ctx.send_tab(&raw)).unwrap(), Outcome::Routed(cats.id().unwrap()));
    }

    #[test]
    fn test_favicon_cache_is_primed_and_follows_writes() {
        let mut data = StorageData::new();
        data.add_favicons(vec![crate::favicon::FaviconRecord {
            hash: crate::favicon::hash_favicon("old"),
            image: "old".to_string(),
        }]);
        let ctx = block_on(AppContext::init(MemoryStore::with_data(data), Settings::new())).unwrap();
        assert_eq!(ctx.favicon_cache().map(FaviconCache::len), Some(1));

        block_on(ctx.create_collection(fields("gh", "github.com", 0))).unwrap();
        block_on(ctx.send_tab(&RawTab::new("https://github.com", None))).unwrap();

        assert_eq!(ctx.favicon_cache().map(FaviconCache::len), Some(2));
    }

    #[test]
    fn test_no_cache_when_disabled() {
        let mut settings = Settings::new();
        settings.set(CACHE_FAVICONS, SettingValue::Bool(false)).unwrap();

        let ctx = block_on(AppContext::init(MemoryStore::new(), settings)).unwrap();

        assert!(ctx.favicon_cache().is_none());
    }

    #[test]
    fn test_cleanup_respects_frequency() {
        let ctx = create_test_context();
        ctx.set_setting(FAVICONS_CLEANUP_FREQUENCY, SettingValue::Number(2.0)).unwrap();

        assert_eq!(block_on(ctx.cleanup_favicons(0.0)).unwrap(), Some(0));
        assert_eq!(block_on(ctx.cleanup_favicons(MILLIS_PER_HOUR)).unwrap(), None);
        assert_eq!(block_on(ctx.cleanup_favicons(2.0 * MILLIS_PER_HOUR)).unwrap(), Some(0));
    }

    #[test]
    fn test_cleanup_time_survives_a_new_context() {
        let first = create_test_context();
        assert_eq!(block_on(first.cleanup_favicons(0.0)).unwrap(), Some(0));

        let store = MemoryStore::with_data(first.store().snapshot());
        let second = block_on(AppContext::init(store, Settings::new())).unwrap();

        assert_eq!(block_on(second.cleanup_favicons(MILLIS_PER_HOUR)).unwrap(), None);
        assert_eq!(block_on(second.cleanup_favicons(24.0 * MILLIS_PER_HOUR)).unwrap(), Some(0));
        assert_eq!(second.store().snapshot().last_favicons_cleanup, Some(24.0 * MILLIS_PER_HOUR));
    }
}
