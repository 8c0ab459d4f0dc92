//! Decoded template cache with TTL support
use dashmap::DashMap;
use image::GrayImage;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Templates are decoded once per TTL window; guides replay the same step
/// template on every retry.
pub struct TemplateCache {
    cache: Arc<DashMap<String, CachedTemplate>>,
    default_ttl: Duration,
}

struct CachedTemplate {
    image: Arc<GrayImage>,
    expires_at: SystemTime,
}

impl TemplateCache {
    pub fn new(default_ttl_secs: u64) -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            default_ttl: Duration::from_secs(default_ttl_secs),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<GrayImage>> {
        if let Some(entry) = self.cache.get(key) {
            if entry.expires_at > SystemTime::now() {
                return Some(Arc::clone(&entry.image));
            }
            drop(entry);
            self.cache.remove(key);
        }
        None
    }

    pub fn put(&self, key: String, image: Arc<GrayImage>, ttl: Option<Duration>) {
        let expires_at = SystemTime::now() + ttl.unwrap_or(self.default_ttl);
        self.cache.insert(key, CachedTemplate { image, expires_at });
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.remove(key);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_round_trip_and_invalidate() {
        let cache = TemplateCache::new(60);
        assert!(cache.is_empty());
        cache.put("tpl-1".to_string(), Arc::new(GrayImage::new(4, 4)), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("tpl-1").map(|img| img.width()), Some(4));
        cache.invalidate("tpl-1");
        assert!(cache.get("tpl-1").is_none());
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache = TemplateCache::new(60);
        cache.put(
            "stale".to_string(),
            Arc::new(GrayImage::new(2, 2)),
            Some(Duration::from_secs(0)),
        );
        assert!(cache.get("stale").is_none());
        assert!(cache.is_empty());
    }
}
