/// Browser bridge: `chrome.tabs` and `chrome.storage.local` through bridge.js
use crate::collection::{CollectionFields, CollectionRecord, CollectionUpdate};
use crate::error::{Error, Result, StoreError};
use crate::favicon::{FaviconHash, FaviconRecord};
use crate::settings::Settings;
use crate::storage::{
    FaviconsListener, StorageData, StoreResult, TabStore, TabsListener, WatchId, Watchers,
};
use crate::tab_data::{CollectionId, RawTab, TabId, TabInput, TabRecord};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

pub const DATA_KEY: &str = "tab_collections_data";
pub const SETTINGS_KEY: &str = "tab_collections_settings";

#[wasm_bindgen(module = "/bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getSelectedTabs() -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn closeTabs(tab_ids: JsValue) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn getStorage(key: &str) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(key: &str, value: JsValue) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn openCollectionsPage() -> std::result::Result<(), JsValue>;

    fn exportToFile(data: &str, filename: &str);

    fn onStorageChanged(key: &str, callback: &Closure<dyn FnMut(JsValue, JsValue)>) -> JsValue;

    fn offStorageChanged(listener: &JsValue);
}

fn unavailable(context: &str, e: impl std::fmt::Debug) -> StoreError {
    StoreError::Unavailable(format!("{}: {:?}", context, e))
}

/// A tab as reported by `chrome.tabs.query`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTab {
    pub id: i32,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
}

impl BrowserTab {
    pub fn to_raw(&self) -> RawTab {
        RawTab {
            fav_icon_url: self.fav_icon_url.clone(),
            ..RawTab::new(self.url.clone(), self.title.clone())
        }
    }
}

/// Highlighted tabs of the current window
pub async fn selected_tabs() -> StoreResult<Vec<BrowserTab>> {
    let tabs_js = getSelectedTabs().await.map_err(|e| unavailable("Failed to get tabs", e))?;
    serde_wasm_bindgen::from_value(tabs_js).map_err(|e| unavailable("Failed to parse tabs", e))
}

pub async fn close_tabs(tab_ids: &[i32]) -> StoreResult<()> {
    let ids_js = serde_wasm_bindgen::to_value(tab_ids).map_err(|e| unavailable("Failed to serialize", e))?;
    closeTabs(ids_js).await.map_err(|e| unavailable("Close failed", e))
}

pub async fn open_collections_page() -> StoreResult<()> {
    openCollectionsPage().await.map_err(|e| unavailable("Failed to open page", e))
}

pub fn export_to_file(data: &str, filename: &str) {
    exportToFile(data, filename);
}

pub async fn load_settings() -> Result<Settings> {
    let saved = getStorage(SETTINGS_KEY)
        .await
        .map_err(|e| unavailable("Failed to get settings", e))?;
    match saved.as_string() {
        Some(json) => Settings::from_json(&json),
        None => Ok(Settings::new()),
    }
}

pub async fn save_settings(settings: &Settings) -> Result<()> {
    let json = settings.to_json()?;
    setStorage(SETTINGS_KEY, JsValue::from_str(&json))
        .await
        .map_err(|e| Error::Store(unavailable("Failed to save settings", e)))
}

/// The stored document is a JSON string
fn encode_document(data: &StorageData) -> StoreResult<JsValue> {
    Ok(JsValue::from_str(&data.to_json()?))
}

/// `None` when nothing has been stored yet
fn decode_document(value: &JsValue) -> StoreResult<Option<StorageData>> {
    if value.is_null() || value.is_undefined() {
        return Ok(None);
    }
    match value.as_string() {
        Some(json) => StorageData::from_json(&json).map(Some),
        None => Err(StoreError::Unavailable("Failed to parse storage: not a string".to_string())),
    }
}

fn forward_change(watchers: &Watchers, new_value: &JsValue, old_value: &JsValue) {
    let current = match decode_document(new_value) {
        Ok(Some(current)) => current,
        Ok(None) => StorageData::new(),
        Err(e) => {
            log::warn!("Ignoring storage change: {}", e);
            return;
        }
    };
    let previous = decode_document(old_value).ok().flatten().unwrap_or_default();
    watchers.notify_changes(&previous, &current);
}

/// Store backed by `chrome.storage.local`. The whole document is read and
/// written back on every change. Watchers hear about writes from every
/// extension page through `chrome.storage.onChanged`, this one included.
pub struct ChromeStore {
    watchers: Rc<Watchers>,
    listener: JsValue,
    _on_changed: Closure<dyn FnMut(JsValue, JsValue)>,
}

impl ChromeStore {
    pub fn new() -> Self {
        let watchers = Rc::new(Watchers::default());
        let sink = watchers.clone();
        let on_changed = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |new_value: JsValue, old_value: JsValue| {
            forward_change(&sink, &new_value, &old_value)
        });
        let listener = onStorageChanged(DATA_KEY, &on_changed);

        ChromeStore {
            watchers,
            listener,
            _on_changed: on_changed,
        }
    }

    /// The stored document; an empty storage area is populated first
    async fn load(&self) -> StoreResult<StorageData> {
        let storage_js = getStorage(DATA_KEY)
            .await
            .map_err(|e| unavailable("Failed to get storage", e))?;

        match decode_document(&storage_js)? {
            Some(data) => Ok(data),
            None => {
                let data = StorageData::populated();
                self.save(&data).await?;
                Ok(data)
            }
        }
    }

    async fn save(&self, data: &StorageData) -> StoreResult<()> {
        setStorage(DATA_KEY, encode_document(data)?)
            .await
            .map_err(|e| unavailable("Failed to save storage", e))
    }
}

impl Default for ChromeStore {
    fn default() -> Self {
        ChromeStore::new()
    }
}

impl Drop for ChromeStore {
    fn drop(&mut self) {
        offStorageChanged(&self.listener);
    }
}

#[async_trait(?Send)]
impl TabStore for ChromeStore {
    async fn get_all_collections(&self) -> StoreResult<Vec<CollectionRecord>> {
        Ok(self.load().await?.collections)
    }

    async fn get_collection(&self, id: CollectionId) -> StoreResult<Option<CollectionRecord>> {
        Ok(self.load().await?.get_collection(id).cloned())
    }

    async fn add_collection(&self, fields: CollectionFields) -> StoreResult<CollectionId> {
        let mut data = self.load().await?;
        let id = data.add_collection(fields);
        self.save(&data).await?;
        Ok(id)
    }

    async fn update_collection(&self, id: CollectionId, update: CollectionUpdate) -> StoreResult<()> {
        let mut data = self.load().await?;
        if !data.update_collection(id, update) {
            return Err(StoreError::NotFound(format!("collection {id}")));
        }
        self.save(&data).await
    }

    async fn delete_collection(&self, id: CollectionId) -> StoreResult<()> {
        let mut data = self.load().await?;
        if data.remove_collection(id) {
            self.save(&data).await?;
        }
        Ok(())
    }

    async fn get_tabs(&self, collection_id: CollectionId) -> StoreResult<Vec<TabRecord>> {
        Ok(self.load().await?.tabs_of(collection_id))
    }

    async fn get_all_tabs(&self) -> StoreResult<Vec<TabRecord>> {
        Ok(self.load().await?.tabs)
    }

    async fn add_tab(&self, input: TabInput) -> StoreResult<TabId> {
        let collection_id = input.collection_id;
        let mut data = self.load().await?;
        data.ensure_collection(collection_id)?;
        let id = data.add_tab(input);
        self.save(&data).await?;
        Ok(id)
    }

    async fn bulk_add_tabs(&self, inputs: Vec<TabInput>) -> StoreResult<Vec<TabId>> {
        let changed: HashSet<CollectionId> = inputs.iter().map(|i| i.collection_id).collect();
        let mut data = self.load().await?;
        for collection_id in &changed {
            data.ensure_collection(*collection_id)?;
        }
        let ids = inputs.into_iter().map(|input| data.add_tab(input)).collect();
        self.save(&data).await?;
        Ok(ids)
    }

    async fn delete_tab(&self, id: TabId) -> StoreResult<()> {
        let mut data = self.load().await?;
        match data.remove_tab(id) {
            Some(_) => self.save(&data).await,
            None => Ok(()),
        }
    }

    async fn delete_tabs_where(&self, collection_id: CollectionId) -> StoreResult<usize> {
        let mut data = self.load().await?;
        let count = data.remove_tabs_where(collection_id);
        if count > 0 {
            self.save(&data).await?;
        }
        Ok(count)
    }

    async fn get_favicon(&self, hash: &FaviconHash) -> StoreResult<Option<FaviconRecord>> {
        Ok(self.load().await?.get_favicon(hash).cloned())
    }

    async fn get_all_favicons(&self) -> StoreResult<Vec<FaviconRecord>> {
        Ok(self.load().await?.favicons)
    }

    async fn bulk_add_favicons(&self, records: Vec<FaviconRecord>) -> StoreResult<()> {
        let mut data = self.load().await?;
        if data.add_favicons(records) > 0 {
            self.save(&data).await?;
        }
        Ok(())
    }

    async fn bulk_delete_favicons(&self, hashes: Vec<FaviconHash>) -> StoreResult<()> {
        let mut data = self.load().await?;
        if data.remove_favicons(&hashes) > 0 {
            self.save(&data).await?;
        }
        Ok(())
    }

    async fn last_favicons_cleanup(&self) -> StoreResult<Option<f64>> {
        Ok(self.load().await?.last_favicons_cleanup)
    }

    async fn set_last_favicons_cleanup(&self, at: f64) -> StoreResult<()> {
        let mut data = self.load().await?;
        data.last_favicons_cleanup = Some(at);
        self.save(&data).await
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
