/// Favicon references, bulk storage and the in-memory favicon cache
///
/// A tab does not own its favicon; it stores the hash of the favicon source
/// and the image lives once in the store's favicon table. Images are kept as
/// the source string (URL or data URI) exactly as the browser reported them.
use crate::storage::{StoreResult, TabStore, WatchId};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use url::Url;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaviconHash(pub String);

impl fmt::Display for FaviconHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaviconRecord {
    pub hash: FaviconHash,
    pub image: String,
}

pub fn hash_favicon(source: &str) -> FaviconHash {
    FaviconHash(format!("{:016x}", xxh3_64(source.as_bytes())))
}

/// Conventional `/favicon.ico` location for pages served over http(s)
pub fn default_favicon_url(page_url: &str) -> Option<String> {
    let url = Url::parse(page_url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.join("/favicon.ico").ok().map(String::from)
}

/// Favicon images by hash.
///
/// The cache reflects the store as of the last delivered change
/// notification, not in real time.
#[derive(Debug, Default)]
pub struct FaviconCache {
    entries: RefCell<HashMap<FaviconHash, String>>,
}

impl FaviconCache {
    pub fn new() -> Self {
        FaviconCache::default()
    }

    /// Create a cache kept current by the store's favicon notifications
    pub fn attach<S: TabStore + ?Sized>(store: &S) -> (Rc<FaviconCache>, WatchId) {
        let cache = Rc::new(FaviconCache::new());
        let listener = Rc::downgrade(&cache);
        let watch = store.watch_favicons(Rc::new(move |favicons: &[FaviconRecord]| {
            if let Some(cache) = listener.upgrade() {
                cache.replace_all(favicons);
                log::debug!("Favicon cache size = {} KB", cache.size_bytes() / 1024);
            }
        }));
        (cache, watch)
    }

    pub fn get(&self, hash: &FaviconHash) -> Option<String> {
        self.entries.borrow().get(hash).cloned()
    }

    pub fn contains(&self, hash: &FaviconHash) -> bool {
        self.entries.borrow().contains_key(hash)
    }

    pub fn put(&self, record: FaviconRecord) {
        self.entries.borrow_mut().insert(record.hash, record.image);
    }

    pub fn invalidate_all(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn replace_all(&self, records: &[FaviconRecord]) {
        let mut entries = self.entries.borrow_mut();
        entries.clear();
        entries.extend(records.iter().map(|r| (r.hash.clone(), r.image.clone())));
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.entries.borrow().values().map(String::len).sum()
    }
}

async fn exists<S: TabStore + ?Sized>(
    store: &S,
    cache: Option<&FaviconCache>,
    hash: &FaviconHash,
) -> StoreResult<bool> {
    match cache {
        Some(cache) => Ok(cache.contains(hash)),
        None => Ok(store.get_favicon(hash).await?.is_some()),
    }
}

/// Store one favicon source, returning its hash
pub async fn store_favicon<S: TabStore + ?Sized>(
    store: &S,
    cache: Option<&FaviconCache>,
    source: &str,
) -> StoreResult<FaviconHash> {
    let hash = hash_favicon(source);
    if !exists(store, cache, &hash).await? {
        store
            .bulk_add_favicons(vec![FaviconRecord {
                hash: hash.clone(),
                image: source.to_string(),
            }])
            .await?;
    }
    Ok(hash)
}

/// Store many favicon sources with a single write. Results line up with
/// `sources`; repeats within the batch are written once.
pub async fn bulk_store<S: TabStore + ?Sized>(
    store: &S,
    cache: Option<&FaviconCache>,
    sources: &[Option<String>],
) -> StoreResult<Vec<Option<FaviconHash>>> {
    let mut results = Vec::with_capacity(sources.len());
    let mut seen = HashSet::new();
    let mut to_store = Vec::new();

    for source in sources {
        let Some(source) = source else {
            results.push(None);
            continue;
        };

        let hash = hash_favicon(source);
        if seen.insert(hash.clone()) && !exists(store, cache, &hash).await? {
            to_store.push(FaviconRecord {
                hash: hash.clone(),
                image: source.clone(),
            });
        }
        results.push(Some(hash));
    }

    if !to_store.is_empty() {
        store.bulk_add_favicons(to_store).await?;
    }
    Ok(results)
}

/// Delete every stored favicon that no tab references. Returns how many went.
pub async fn cleanup<S: TabStore + ?Sized>(store: &S) -> StoreResult<usize> {
    let tabs = store.get_all_tabs().await?;
    let favicons = store.get_all_favicons().await?;

    let referenced: HashSet<&FaviconHash> = tabs.iter().filter_map(|t| t.favicon_hash.as_ref()).collect();
    let unused: Vec<FaviconHash> = favicons
        .into_iter()
        .map(|f| f.hash)
        .filter(|hash| !referenced.contains(hash))
        .collect();

    let count = unused.len();
    if count > 0 {
        store.bulk_delete_favicons(unused).await?;
    }
    log::info!("Favicons cleanup ran, {} removed", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionFields;
    use crate::storage::MemoryStore;
    use crate::tab_data::TabInput;
    use futures::executor::block_on;

    #[test]
    fn test_hash_is_stable_and_distinct() {
        let a = hash_favicon("https://github.com/favicon.ico");

        assert_eq!(a, hash_favicon("https://github.com/favicon.ico"));
        assert_ne!(a, hash_favicon("https://gitlab.com/favicon.ico"));
        assert_eq!(a.0.len(), 16);
    }

    #[test]
    fn test_default_favicon_url() {
        assert_eq!(
            default_favicon_url("https://docs.rs/regex/latest?x=1"),
            Some("https://docs.rs/favicon.ico".to_string())
        );
        assert_eq!(
            default_favicon_url("http://localhost:3000/a/b"),
            Some("http://localhost:3000/favicon.ico".to_string())
        );
        assert_eq!(default_favicon_url("about:blank"), None);
        assert_eq!(default_favicon_url("not a url"), None);
    }

    #[test]
    fn test_cache_operations() {
        let cache = FaviconCache::new();
        let hash = hash_favicon("x");
        cache.put(FaviconRecord {
            hash: hash.clone(),
            image: "data".to_string(),
        });

        assert_eq!(cache.get(&hash).as_deref(), Some("data"));
        assert_eq!(cache.size_bytes(), 4);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_bulk_store_dedupes_and_aligns() {
        let store = MemoryStore::new();
        let sources = vec![
            Some("https://a/favicon.ico".to_string()),
            None,
            Some("https://a/favicon.ico".to_string()),
            Some("https://b/favicon.ico".to_string()),
        ];

        let hashes = block_on(bulk_store(&store, None, &sources)).unwrap();

        assert_eq!(hashes.len(), 4);
        assert_eq!(hashes[1], None);
        assert_eq!(hashes[0], hashes[2]);
        assert_eq!(store.snapshot().favicons.len(), 2);
    }

    #[test]
    fn test_attached_cache_follows_store() {
        let store = MemoryStore::new();
        let (cache, _watch) = FaviconCache::attach(&store);

        let hash = block_on(store_favicon(&store, Some(&*cache), "https://a/favicon.ico")).unwrap();
        assert_eq!(cache.get(&hash).as_deref(), Some("https://a/favicon.ico"));

        // a known hash is not written again
        block_on(bulk_store(&store, Some(&*cache), &[Some("https://a/favicon.ico".to_string())])).unwrap();
        assert_eq!(store.snapshot().favicons.len(), 1);
    }

    #[test]
    fn test_cleanup_removes_unreferenced() {
        let store = MemoryStore::new();
        let used = block_on(store_favicon(&store, None, "https://used/favicon.ico")).unwrap();
        block_on(store_favicon(&store, None, "https://unused/favicon.ico")).unwrap();

        let id = block_on(store.add_collection(CollectionFields::new("a", "", 0, false))).unwrap();
        block_on(store.add_tab(TabInput {
            collection_id: id,
            url: "https://used".to_string(),
            title: None,
            favicon_hash: Some(used.clone()),
            creation_time: 0.0,
        }))
        .unwrap();

        assert_eq!(block_on(cleanup(&store)).unwrap(), 1);
        let remaining = store.snapshot().favicons;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].hash, used);
    }
}
