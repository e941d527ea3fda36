/// Data structures for Tab Collections
use crate::favicon::FaviconHash;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Store-assigned collection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub Uuid);

/// Store-assigned tab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub Uuid);

impl CollectionId {
    pub fn new() -> Self {
        CollectionId(Uuid::new_v4())
    }
}

impl TabId {
    pub fn new() -> Self {
        TabId(Uuid::new_v4())
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Milliseconds since the Unix epoch
#[cfg(target_arch = "wasm32")]
pub fn now_millis() -> f64 {
    js_sys::Date::now()
}

/// Milliseconds since the Unix epoch
#[cfg(not(target_arch = "wasm32"))]
pub fn now_millis() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

/// Trim and percent-decode a URL. Undecodable input is kept as typed.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match percent_decode_str(trimmed).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => trimmed.to_string(),
    }
}

/// A tab as delivered by the browser or an import file, before routing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTab {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Favicon source (URL or data URI) as reported by the browser
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    /// Already-stored favicon, as found in exported JSON
    #[serde(default)]
    pub favicon_hash: Option<FaviconHash>,
    #[serde(default)]
    pub creation_time: Option<f64>,
}

impl RawTab {
    pub fn new(url: impl Into<String>, title: Option<String>) -> RawTab {
        RawTab {
            url: url.into(),
            title,
            ..RawTab::default()
        }
    }
}

/// A tab. `id` and `collection_id` stay `None` until the tab is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: Option<TabId>,
    pub collection_id: Option<CollectionId>,
    pub url: String,
    pub title: Option<String>,
    pub favicon: Option<FaviconHash>,
    pub creation_time: f64,
}

impl Tab {
    /// Build an unrouted tab from a raw snapshot
    pub fn orphan(raw: &RawTab) -> Tab {
        Tab {
            id: None,
            collection_id: None,
            url: normalize_url(&raw.url),
            title: raw.title.clone(),
            favicon: raw.favicon_hash.clone(),
            creation_time: raw.creation_time.unwrap_or_else(now_millis),
        }
    }

    pub fn is_orphan(&self) -> bool {
        self.id.is_none() && self.collection_id.is_none()
    }

    pub fn from_record(record: &TabRecord) -> Tab {
        Tab {
            id: Some(record.id),
            collection_id: Some(record.collection_id),
            url: record.url.clone(),
            title: record.title.clone(),
            favicon: record.favicon_hash.clone(),
            creation_time: record.creation_time,
        }
    }
}

/// Fields needed to persist a routed tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInput {
    pub collection_id: CollectionId,
    pub url: String,
    pub title: Option<String>,
    pub favicon_hash: Option<FaviconHash>,
    pub creation_time: f64,
}

/// A persisted tab row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub id: TabId,
    pub collection_id: CollectionId,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub favicon_hash: Option<FaviconHash>,
    pub creation_time: f64,
}

impl TabRecord {
    pub fn from_input(id: TabId, input: TabInput) -> TabRecord {
        TabRecord {
            id,
            collection_id: input.collection_id,
            url: input.url,
            title: input.title,
            favicon_hash: input.favicon_hash,
            creation_time: input.creation_time,
        }
    }
}
