//! URL -> rendered markup memo shared by every resolution worker.
//!
//! Entries are final once written: there is no TTL and no eviction. The cache can be
//! seeded from a JSON snapshot at startup and written back at shutdown.
//!
//! Concurrent misses for the same URL are coalesced through an in-flight table so
//! that only one caller runs the (network bound) resolution while the rest wait for
//! its result.

use crate::core::error::CacheError;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[derive(Default)]
pub struct ResolutionCache {
    entries: DashMap<String, String>,
    inflight: DashMap<String, Arc<OnceCell<String>>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<String> {
        self.entries.get(url).map(|entry| entry.value().clone())
    }

    pub fn put(&self, url: &str, markup: &str) {
        self.entries.insert(url.to_string(), markup.to_string());
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached markup for `url`, or runs `resolve` and stores its result.
    ///
    /// If several callers miss on the same URL at once, `resolve` runs for only one
    /// of them and the others receive the same markup.
    pub async fn get_or_resolve<F, Fut>(&self, url: &str, resolve: F) -> String
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = String>,
    {
        if let Some(hit) = self.get(url) {
            return hit;
        }

        let cell = self
            .inflight
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let markup = cell
            .get_or_init(|| async move {
                // Another resolution may have finished between our miss and joining the cell
                if let Some(hit) = self.get(url) {
                    return hit;
                }
                let markup = resolve().await;
                self.put(url, &markup);
                markup
            })
            .await
            .clone();

        self.inflight
            .remove_if(url, |_, current| Arc::ptr_eq(current, &cell));
        markup
    }

    /// Adds entries from a snapshot file without touching keys already present.
    ///
    /// A missing file is not an error. Returns how many entries were added.
    pub fn load_snapshot(&self, path: &Path) -> Result<usize, CacheError> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache snapshot at {}", path.display());
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: BTreeMap<String, String> = serde_json::from_str(&json)?;
        let mut added = 0;
        for (url, markup) in snapshot {
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.entries.entry(url) {
                slot.insert(markup);
                added += 1;
            }
        }

        info!("Loaded {} cached embeds from {}", added, path.display());
        Ok(added)
    }

    /// Writes every entry to `path` as a pretty-printed JSON object, sorted by URL.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), CacheError> {
        let snapshot: BTreeMap<String, String> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;

        info!("Saved {} cached embeds to {}", snapshot.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn test_get_put() {
        let cache = ResolutionCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get("https://a"), None);

        cache.put("https://a", "<p>a</p>");
        assert_eq!(cache.get("https://a").as_deref(), Some("<p>a</p>"));
        assert!(cache.contains("https://a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let cache = ResolutionCache::new();
        cache.put("https://a", "<p>a</p>");
        cache.put("https://b", "<p class='oembed-video'>b</p>");
        cache.save_snapshot(&path).unwrap();

        let restored = ResolutionCache::new();
        assert_eq!(restored.load_snapshot(&path).unwrap(), 2);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get("https://a").as_deref(), Some("<p>a</p>"));
        assert_eq!(
            restored.get("https://b").as_deref(),
            Some("<p class='oembed-video'>b</p>")
        );
    }

    #[test]
    fn test_load_never_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            r#"{"https://a": "<p>stale</p>", "https://b": "<p>b</p>"}"#,
        )
        .unwrap();

        let cache = ResolutionCache::new();
        cache.put("https://a", "<p>fresh</p>");

        assert_eq!(cache.load_snapshot(&path).unwrap(), 1);
        assert_eq!(cache.get("https://a").as_deref(), Some("<p>fresh</p>"));
        assert_eq!(cache.get("https://b").as_deref(), Some("<p>b</p>"));
    }

    #[test]
    fn test_missing_snapshot_is_not_an_error() {
        let dir = tempdir().unwrap();
        let cache = ResolutionCache::new();
        assert_eq!(cache.load_snapshot(&dir.path().join("nope.json")).unwrap(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();

        let cache = ResolutionCache::new();
        assert!(matches!(cache.load_snapshot(&path), Err(CacheError::Json(_))));
    }

    #[test]
    fn test_get_or_resolve_uses_cache() {
        let cache = ResolutionCache::new();
        cache.put("https://a", "<p>cached</p>");

        let markup = tokio_test::block_on(
            cache.get_or_resolve("https://a", || async { "<p>resolved</p>".to_string() }),
        );
        assert_eq!(markup, "<p>cached</p>");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_resolve_once() {
        let cache = Arc::new(ResolutionCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..16).map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cache
                    .get_or_resolve("https://a", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        "<p>a</p>".to_string()
                    })
                    .await
            })
        });

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap(), "<p>a</p>");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("https://a").as_deref(), Some("<p>a</p>"));
    }
}
