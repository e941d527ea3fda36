/// Storage: the store adapter interface, the serialized store document and
/// an in-memory store
use crate::collection::{
    CollectionFields, CollectionRecord, CollectionUpdate, DEFAULT_COLLECTION_TITLE,
};
use crate::error::StoreError;
use crate::favicon::{FaviconHash, FaviconRecord};
use crate::tab_data::{CollectionId, Tab, TabId, TabInput, TabRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

pub type StoreResult<T> = Result<T, StoreError>;

/// Receives the current tab list of one collection after it changes
pub type TabsListener = Rc<dyn Fn(&[Tab])>;

/// Receives every stored favicon after the favicon set changes
pub type FaviconsListener = Rc<dyn Fn(&[FaviconRecord])>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

/// Persistence boundary. Every async method is a suspension point; the
/// futures are not `Send` because the extension runs on one thread.
#[async_trait(?Send)]
pub trait TabStore {
    async fn get_all_collections(&self) -> StoreResult<Vec<CollectionRecord>>;
    async fn get_collection(&self, id: CollectionId) -> StoreResult<Option<CollectionRecord>>;
    async fn add_collection(&self, fields: CollectionFields) -> StoreResult<CollectionId>;
    async fn update_collection(&self, id: CollectionId, update: CollectionUpdate) -> StoreResult<()>;
    async fn delete_collection(&self, id: CollectionId) -> StoreResult<()>;

    async fn get_tabs(&self, collection_id: CollectionId) -> StoreResult<Vec<TabRecord>>;
    async fn get_all_tabs(&self) -> StoreResult<Vec<TabRecord>>;
    async fn add_tab(&self, input: TabInput) -> StoreResult<TabId>;
    async fn bulk_add_tabs(&self, inputs: Vec<TabInput>) -> StoreResult<Vec<TabId>>;
    async fn delete_tab(&self, id: TabId) -> StoreResult<()>;
    /// Returns the number of deleted tabs
    async fn delete_tabs_where(&self, collection_id: CollectionId) -> StoreResult<usize>;

    async fn get_favicon(&self, hash: &FaviconHash) -> StoreResult<Option<FaviconRecord>>;
    async fn get_all_favicons(&self) -> StoreResult<Vec<FaviconRecord>>;
    async fn bulk_add_favicons(&self, records: Vec<FaviconRecord>) -> StoreResult<()>;
    async fn bulk_delete_favicons(&self, hashes: Vec<FaviconHash>) -> StoreResult<()>;

    /// Time of the last favicon cleanup in epoch millis, shared by every
    /// context opened over the same storage
    async fn last_favicons_cleanup(&self) -> StoreResult<Option<f64>>;
    async fn set_last_favicons_cleanup(&self, at: f64) -> StoreResult<()>;

    /// Live query over one collection's tabs
    fn watch_tabs(&self, collection_id: CollectionId, listener: TabsListener) -> WatchId;
    fn watch_favicons(&self, listener: FaviconsListener) -> WatchId;
    fn unwatch(&self, id: WatchId);
}

/// Root storage structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageData {
    pub collections: Vec<CollectionRecord>,
    pub tabs: Vec<TabRecord>,
    #[serde(default)]
    pub favicons: Vec<FaviconRecord>,
    #[serde(default)]
    pub last_favicons_cleanup: Option<f64>,
}

impl StorageData {
    pub fn new() -> Self {
        StorageData::default()
    }

    /// A fresh store holds a single filterless "default" collection
    pub fn populated() -> Self {
        let mut data = StorageData::new();
        data.add_collection(CollectionFields {
            title: DEFAULT_COLLECTION_TITLE.to_string(),
            filters: Vec::new(),
            priority: 0,
            allow_duplicates: false,
        });
        data
    }

    pub fn add_collection(&mut self, fields: CollectionFields) -> CollectionId {
        let id = CollectionId::new();
        self.collections.push(CollectionRecord { id, fields });
        id
    }

    pub fn get_collection(&self, id: CollectionId) -> Option<&CollectionRecord> {
        self.collections.iter().find(|c| c.id == id)
    }

    pub fn update_collection(&mut self, id: CollectionId, update: CollectionUpdate) -> bool {
        self.collections
            .iter_mut()
            .find(|c| c.id == id)
            .map(|record| update.apply(&mut record.fields))
            .is_some()
    }

    pub fn remove_collection(&mut self, id: CollectionId) -> bool {
        let original_len = self.collections.len();
        self.collections.retain(|c| c.id != id);
        self.collections.len() < original_len
    }

    pub fn tabs_of(&self, collection_id: CollectionId) -> Vec<TabRecord> {
        self.tabs
            .iter()
            .filter(|t| t.collection_id == collection_id)
            .cloned()
            .collect()
    }

    pub fn add_tab(&mut self, input: TabInput) -> TabId {
        let id = TabId::new();
        self.tabs.push(TabRecord::from_input(id, input));
        id
    }

    /// Returns the collection the tab belonged to
    pub fn remove_tab(&mut self, id: TabId) -> Option<CollectionId> {
        let index = self.tabs.iter().position(|t| t.id == id)?;
        Some(self.tabs.remove(index).collection_id)
    }

    pub fn remove_tabs_where(&mut self, collection_id: CollectionId) -> usize {
        let original_len = self.tabs.len();
        self.tabs.retain(|t| t.collection_id != collection_id);
        original_len - self.tabs.len()
    }

    pub fn get_favicon(&self, hash: &FaviconHash) -> Option<&FaviconRecord> {
        self.favicons.iter().find(|f| &f.hash == hash)
    }

    /// Existing hashes are left alone
    pub fn add_favicons(&mut self, records: Vec<FaviconRecord>) -> usize {
        let mut known: HashSet<FaviconHash> = self.favicons.iter().map(|f| f.hash.clone()).collect();
        let before = self.favicons.len();
        for record in records {
            if known.insert(record.hash.clone()) {
                self.favicons.push(record);
            }
        }
        self.favicons.len() - before
    }

    pub fn remove_favicons(&mut self, hashes: &[FaviconHash]) -> usize {
        let original_len = self.favicons.len();
        self.favicons.retain(|f| !hashes.contains(&f.hash));
        original_len - self.favicons.len()
    }

    /// Serialized form kept in browser storage. A JSON string keeps the
    /// flattened collection records intact.
    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Unavailable(format!("Failed to serialize storage: {e}")))
    }

    pub fn from_json(json: &str) -> StoreResult<Self> {
        serde_json::from_str(json).map_err(|e| StoreError::Unavailable(format!("Failed to parse storage: {e}")))
    }

    /// Collections whose tab list differs from `previous`
    pub fn changed_collections(&self, previous: &StorageData) -> HashSet<CollectionId> {
        let mut ids: HashSet<CollectionId> =
            self.tabs.iter().chain(&previous.tabs).map(|t| t.collection_id).collect();
        ids.retain(|id| self.tabs_of(*id) != previous.tabs_of(*id));
        ids
    }

    pub(crate) fn ensure_collection(&self, id: CollectionId) -> StoreResult<()> {
        match self.get_collection(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("collection {id}"))),
        }
    }
}

/// Change-notification registry shared by store implementations
#[derive(Default)]
pub struct Watchers {
    next_id: Cell<u64>,
    tabs: RefCell<Vec<(WatchId, CollectionId, TabsListener)>>,
    favicons: RefCell<Vec<(WatchId, FaviconsListener)>>,
}

impl Watchers {
    fn next(&self) -> WatchId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        WatchId(id)
    }

    pub fn watch_tabs(&self, collection_id: CollectionId, listener: TabsListener) -> WatchId {
        let id = self.next();
        self.tabs.borrow_mut().push((id, collection_id, listener));
        id
    }

    pub fn watch_favicons(&self, listener: FaviconsListener) -> WatchId {
        let id = self.next();
        self.favicons.borrow_mut().push((id, listener));
        id
    }

    pub fn unwatch(&self, id: WatchId) {
        self.tabs.borrow_mut().retain(|(watch, _, _)| *watch != id);
        self.favicons.borrow_mut().retain(|(watch, _)| *watch != id);
    }

    /// Deliver the current tab list of every changed collection
    pub fn notify_tabs(&self, data: &StorageData, changed: &HashSet<CollectionId>) {
        // Listeners are cloned out so they may unwatch while being called
        let listeners: Vec<(CollectionId, TabsListener)> = self
            .tabs
            .borrow()
            .iter()
            .filter(|(_, collection_id, _)| changed.contains(collection_id))
            .map(|(_, collection_id, listener)| (*collection_id, listener.clone()))
            .collect();

        for (collection_id, listener) in listeners {
            let tabs: Vec<Tab> = data.tabs_of(collection_id).iter().map(Tab::from_record).collect();
            listener(&tabs);
        }
    }

    pub fn notify_favicons(&self, data: &StorageData) {
        let listeners: Vec<FaviconsListener> =
            self.favicons.borrow().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(&data.favicons);
        }
    }

    /// Notify whatever differs between two versions of the document
    pub fn notify_changes(&self, previous: &StorageData, current: &StorageData) {
        let changed = current.changed_collections(previous);
        if !changed.is_empty() {
            self.notify_tabs(current, &changed);
        }
        if current.favicons != previous.favicons {
            self.notify_favicons(current);
        }
    }
}

/// A store kept entirely in memory. Backs tests and any host without
/// browser storage.
#[derive(Default)]
pub struct MemoryStore {
    data: RefCell<StorageData>,
    watchers: Watchers,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_data(data: StorageData) -> Self {
        MemoryStore {
            data: RefCell::new(data),
            watchers: Watchers::default(),
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> StorageData {
        self.data.borrow().clone()
    }

    fn tabs_changed(&self, changed: HashSet<CollectionId>) {
        if !changed.is_empty() {
            self.watchers.notify_tabs(&self.data.borrow(), &changed);
        }
    }

    fn favicons_changed(&self) {
        self.watchers.notify_favicons(&self.data.borrow());
    }
}

#[async_trait(?Send)]
impl TabStore for MemoryStore {
    async fn get_all_collections(&self) -> StoreResult<Vec<CollectionRecord>> {
        Ok(self.data.borrow().collections.clone())
    }

    async fn get_collection(&self, id: CollectionId) -> StoreResult<Option<CollectionRecord>> {
        Ok(self.data.borrow().get_collection(id).cloned())
    }

    async fn add_collection(&self, fields: CollectionFields) -> StoreResult<CollectionId> {
        Ok(self.data.borrow_mut().add_collection(fields))
    }

    async fn update_collection(&self, id: CollectionId, update: CollectionUpdate) -> StoreResult<()> {
        if self.data.borrow_mut().update_collection(id, update) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("collection {id}")))
        }
    }

    async fn delete_collection(&self, id: CollectionId) -> StoreResult<()> {
        self.data.borrow_mut().remove_collection(id);
        Ok(())
    }

    async fn get_tabs(&self, collection_id: CollectionId) -> StoreResult<Vec<TabRecord>> {
        Ok(self.data.borrow().tabs_of(collection_id))
    }

    async fn get_all_tabs(&self) -> StoreResult<Vec<TabRecord>> {
        Ok(self.data.borrow().tabs.clone())
    }

    async fn add_tab(&self, input: TabInput) -> StoreResult<TabId> {
        let collection_id = input.collection_id;
        let id = {
            let mut data = self.data.borrow_mut();
            data.ensure_collection(collection_id)?;
            data.add_tab(input)
        };
        self.tabs_changed(HashSet::from([collection_id]));
        Ok(id)
    }

    async fn bulk_add_tabs(&self, inputs: Vec<TabInput>) -> StoreResult<Vec<TabId>> {
        let changed: HashSet<CollectionId> = inputs.iter().map(|i| i.collection_id).collect();
        let ids = {
            let mut data = self.data.borrow_mut();
            for collection_id in &changed {
                data.ensure_collection(*collection_id)?;
            }
            inputs.into_iter().map(|input| data.add_tab(input)).collect()
        };
        self.tabs_changed(changed);
        Ok(ids)
    }

    async fn delete_tab(&self, id: TabId) -> StoreResult<()> {
        let removed = self.data.borrow_mut().remove_tab(id);
        self.tabs_changed(removed.into_iter().collect());
        Ok(())
    }

    async fn delete_tabs_where(&self, collection_id: CollectionId) -> StoreResult<usize> {
        let count = self.data.borrow_mut().remove_tabs_where(collection_id);
        if count > 0 {
            self.tabs_changed(HashSet::from([collection_id]));
        }
        Ok(count)
    }

    async fn get_favicon(&self, hash: &FaviconHash) -> StoreResult<Option<FaviconRecord>> {
        Ok(self.data.borrow().get_favicon(hash).cloned())
    }

    async fn get_all_favicons(&self) -> StoreResult<Vec<FaviconRecord>> {
        Ok(self.data.borrow().favicons.clone())
    }

    async fn bulk_add_favicons(&self, records: Vec<FaviconRecord>) -> StoreResult<()> {
        let added = self.data.borrow_mut().add_favicons(records);
        if added > 0 {
            self.favicons_changed();
        }
        Ok(())
    }

    async fn bulk_delete_favicons(&self, hashes: Vec<FaviconHash>) -> StoreResult<()> {
        let removed = self.data.borrow_mut().remove_favicons(&hashes);
        if removed > 0 {
            self.favicons_changed();
        }
        Ok(())
    }

    async fn last_favicons_cleanup(&self) -> StoreResult<Option<f64>> {
        Ok(self.data.borrow().last_favicons_cleanup)
    }

    async fn set_last_favicons_cleanup(&self, at: f64) -> StoreResult<()> {
        self.data.borrow_mut().last_favicons_cleanup = Some(at);
        Ok(())
    }

    fn watch_tabs(&self, collection_id: CollectionId, listener: TabsListener) -> WatchId {
        self.watchers.watch_tabs(collection_id, listener)
    }

    fn watch_favicons(&self, listener: FaviconsListener) -> WatchId {
        self.watchers.watch_favicons(listener)
    }

    fn unwatch(&self, id: WatchId) {
        self.watchers.unwatch(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn create_test_fields(title: &str) -> CollectionFields {
        CollectionFields {
            title: title.to_string(),
            filters: vec!["example.com".to_string()],
            priority: 0,
            allow_duplicates: false,
        }
    }

    fn create_test_input(collection_id: CollectionId, url: &str) -> TabInput {
        TabInput {
            collection_id,
            url: url.to_string(),
            title: None,
            favicon_hash: None,
            creation_time: 1698508200000.0,
        }
    }

    #[test]
    fn test_storage_data_new() {
        let storage = StorageData::new();
        assert_eq!(storage.collections.len(), 0);
        assert_eq!(storage.tabs.len(), 0);
    }

    #[test]
    fn test_populated_has_default_collection() {
        let storage = StorageData::populated();

        assert_eq!(storage.collections.len(), 1);
        assert_eq!(storage.collections[0].fields.title, DEFAULT_COLLECTION_TITLE);
        assert!(storage.collections[0].fields.filters.is_empty());
    }

    #[test]
    fn test_titles_are_not_unique() {
        let mut storage = StorageData::new();
        let a = storage.add_collection(create_test_fields("reading"));
        let b = storage.add_collection(create_test_fields("reading"));

        assert_ne!(a, b);
        assert_eq!(storage.collections.len(), 2);
    }

    #[test]
    fn test_remove_nonexistent_collection() {
        let mut storage = StorageData::new();
        storage.add_collection(create_test_fields("a"));

        assert!(!storage.remove_collection(CollectionId::new()));
        assert_eq!(storage.collections.len(), 1);
    }

    #[test]
    fn test_remove_tabs_where() {
        let mut storage = StorageData::new();
        let a = storage.add_collection(create_test_fields("a"));
        let b = storage.add_collection(create_test_fields("b"));
        storage.add_tab(create_test_input(a, "https://1"));
        storage.add_tab(create_test_input(a, "https://2"));
        storage.add_tab(create_test_input(b, "https://3"));

        assert_eq!(storage.remove_tabs_where(a), 2);
        assert_eq!(storage.tabs.len(), 1);
        assert_eq!(storage.tabs_of(b).len(), 1);
    }

    #[test]
    fn test_add_favicons_skips_known_hashes() {
        let mut storage = StorageData::new();
        let record = FaviconRecord {
            hash: FaviconHash("abc".to_string()),
            image: "https://x/favicon.ico".to_string(),
        };

        assert_eq!(storage.add_favicons(vec![record.clone(), record.clone()]), 1);
        assert_eq!(storage.add_favicons(vec![record]), 0);
    }

    #[test]
    fn test_serialization() {
        let mut storage = StorageData::new();
        let id = storage.add_collection(create_test_fields("Test"));
        storage.add_tab(create_test_input(id, "https://google.com"));

        let json = serde_json::to_string(&storage).unwrap();
        let deserialized: StorageData = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, storage);
    }

    #[test]
    fn test_json_keeps_collection_fields() {
        let mut storage = StorageData::populated();
        storage.last_favicons_cleanup = Some(1698508200000.0);

        let json = storage.to_json().unwrap();

        assert!(json.contains(r#""title":"default""#));
        assert!(json.contains(r#""lastFaviconsCleanup":"#));
        assert_eq!(StorageData::from_json(&json).unwrap(), storage);
    }

    #[test]
    fn test_document_without_cleanup_time() {
        let storage = StorageData::from_json(r#"{"collections":[],"tabs":[]}"#).unwrap();

        assert_eq!(storage.last_favicons_cleanup, None);
        assert!(storage.favicons.is_empty());
    }

    #[test]
    fn test_changed_collections() {
        let mut previous = StorageData::new();
        let a = previous.add_collection(create_test_fields("a"));
        let b = previous.add_collection(create_test_fields("b"));
        let c = previous.add_collection(create_test_fields("c"));
        previous.add_tab(create_test_input(a, "https://1"));
        previous.add_tab(create_test_input(b, "https://2"));

        let mut current = previous.clone();
        current.add_tab(create_test_input(c, "https://3"));
        current.remove_tabs_where(b);

        assert_eq!(current.changed_collections(&previous), HashSet::from([b, c]));
        assert!(current.changed_collections(&current.clone()).is_empty());
    }

    #[test]
    fn test_notify_changes_between_documents() {
        let mut previous = StorageData::new();
        let a = previous.add_collection(create_test_fields("a"));
        let b = previous.add_collection(create_test_fields("b"));
        let mut current = previous.clone();
        current.add_tab(create_test_input(a, "https://1"));

        let watchers = Watchers::default();
        let seen: Rc<RefCell<Vec<(char, usize)>>> = Rc::default();
        let sink = seen.clone();
        watchers.watch_tabs(a, Rc::new(move |tabs: &[Tab]| sink.borrow_mut().push(('a', tabs.len()))));
        let sink = seen.clone();
        watchers.watch_tabs(b, Rc::new(move |tabs: &[Tab]| sink.borrow_mut().push(('b', tabs.len()))));
        let sink = seen.clone();
        watchers.watch_favicons(Rc::new(move |favicons: &[FaviconRecord]| sink.borrow_mut().push(('f', favicons.len()))));

        watchers.notify_changes(&previous, &current);

        assert_eq!(*seen.borrow(), vec![('a', 1)]);
    }

    #[test]
    fn test_memory_store_rejects_tab_for_unknown_collection() {
        let store = MemoryStore::new();
        let result = block_on(store.add_tab(create_test_input(CollectionId::new(), "https://x")));

        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_memory_store_update_unknown_collection() {
        let store = MemoryStore::new();
        let result = block_on(store.update_collection(CollectionId::new(), CollectionUpdate::default()));

        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_watch_tabs_receives_current_list() {
        let store = MemoryStore::new();
        let id = block_on(store.add_collection(create_test_fields("a"))).unwrap();
        let other = block_on(store.add_collection(create_test_fields("b"))).unwrap();

        let seen: Rc<RefCell<Vec<usize>>> = Rc::default();
        let sink = seen.clone();
        let watch = store.watch_tabs(id, Rc::new(move |tabs: &[Tab]| sink.borrow_mut().push(tabs.len())));

        block_on(store.bulk_add_tabs(vec![
            create_test_input(id, "https://1"),
            create_test_input(id, "https://2"),
        ]))
        .unwrap();
        block_on(store.add_tab(create_test_input(other, "https://3"))).unwrap();
        block_on(store.delete_tabs_where(id)).unwrap();
        store.unwatch(watch);
        block_on(store.add_tab(create_test_input(id, "https://4"))).unwrap();

        assert_eq!(*seen.borrow(), vec![2, 0]);
    }

    #[test]
    fn test_watch_favicons() {
        let store = MemoryStore::new();
        let count = Rc::new(Cell::new(0));
        let sink = count.clone();
        store.watch_favicons(Rc::new(move |favicons: &[FaviconRecord]| sink.set(favicons.len())));

        block_on(store.bulk_add_favicons(vec![FaviconRecord {
            hash: FaviconHash("h".to_string()),
            image: "https://x/favicon.ico".to_string(),
        }]))
        .unwrap();

        assert_eq!(count.get(), 1);
    }
}
