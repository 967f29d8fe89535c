use std::collections::BTreeSet;
use std::sync::Arc;

use cstore_types::{ContentUrl, Timestamp};
use tracing::{debug, warn};

use crate::context::ContentContext;
use crate::error::StoreResult;
use crate::traits::{transfer, ContentReader, ContentStore, ContentWriter};

/// Read-through cache in front of a slower backing store.
///
/// Readers are served from the cache when it holds the URL. On a miss the
/// content is copied from the backing store into the cache first. Writers,
/// enumeration and writability all belong to the backing store.
///
/// Existence uses the reader-based default, so a check may populate the
/// cache as a side effect.
pub struct CachingContentStore {
    backing: Arc<dyn ContentStore>,
    cache: Arc<dyn ContentStore>,
}

impl CachingContentStore {
    pub fn new(backing: Arc<dyn ContentStore>, cache: Arc<dyn ContentStore>) -> Self {
        Self { backing, cache }
    }

    pub fn backing(&self) -> &Arc<dyn ContentStore> {
        &self.backing
    }

    pub fn cache(&self) -> &Arc<dyn ContentStore> {
        &self.cache
    }

    fn populate(&self, source: &dyn ContentReader) -> StoreResult<u64> {
        let writer = self
            .cache
            .writer(ContentContext::for_url(source.url().clone()))?;
        transfer(source, writer)
    }
}

impl ContentStore for CachingContentStore {
    fn is_writable(&self) -> bool {
        self.backing.is_writable()
    }

    fn reader(&self, url: &ContentUrl) -> StoreResult<Box<dyn ContentReader>> {
        let cached = self.cache.reader(url)?;
        if cached.exists()? {
            debug!(%url, "cache hit");
            return Ok(cached);
        }

        let backing = self.backing.reader(url)?;
        if !backing.exists()? {
            return Ok(backing);
        }

        match self.populate(backing.as_ref()) {
            Ok(len) => {
                debug!(%url, len, "cache populated");
                Ok(cached)
            }
            Err(e) => {
                warn!(%url, error = %e, "cache population failed; reading from backing store");
                Ok(backing)
            }
        }
    }

    fn writer(&self, context: ContentContext) -> StoreResult<Box<dyn ContentWriter>> {
        self.backing.writer(context)
    }

    fn urls(
        &self,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> StoreResult<BTreeSet<ContentUrl>> {
        self.backing.urls(from, to)
    }

    fn delete(&self, url: &ContentUrl) -> StoreResult<bool> {
        let deleted = self.backing.delete(url)?;
        self.cache.delete(url)?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::error::StoreError;
    use crate::file::FileContentStore;
    use crate::memory::InMemoryContentStore;
    use crate::traits::{exists_via_reader, ContentStoreExt};

    fn caching() -> (Arc<InMemoryContentStore>, Arc<InMemoryContentStore>, CachingContentStore) {
        let backing = Arc::new(InMemoryContentStore::new());
        let cache = Arc::new(InMemoryContentStore::new());
        let store = CachingContentStore::new(backing.clone(), cache.clone());
        (backing, cache, store)
    }

    /// A cache that refuses every write.
    struct FullCache(InMemoryContentStore);

    impl ContentStore for FullCache {
        fn is_writable(&self) -> bool {
            false
        }

        fn reader(&self, url: &ContentUrl) -> StoreResult<Box<dyn ContentReader>> {
            self.0.reader(url)
        }

        fn writer(&self, _context: ContentContext) -> StoreResult<Box<dyn ContentWriter>> {
            Err(StoreError::ReadOnly)
        }

        fn urls(
            &self,
            from: Option<Timestamp>,
            to: Option<Timestamp>,
        ) -> StoreResult<BTreeSet<ContentUrl>> {
            self.0.urls(from, to)
        }
    }

    #[test]
    fn miss_populates_cache() {
        let (backing, cache, store) = caching();
        let url = backing.put(b"slow bytes").unwrap();
        assert!(!cache.exists(&url).unwrap());

        let reader = store.reader(&url).unwrap();
        assert_eq!(reader.read_all().unwrap(), b"slow bytes");
        assert!(cache.exists(&url).unwrap());
    }

    #[test]
    fn hit_is_served_from_cache() {
        let (backing, cache, store) = caching();
        let url = backing.put(b"original").unwrap();
        store.reader(&url).unwrap();

        // The cached copy survives removal from the backing store.
        backing.delete(&url).unwrap();
        assert_eq!(store.reader(&url).unwrap().read_all().unwrap(), b"original");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_everywhere_gives_lazy_reader() {
        let (_, cache, store) = caching();
        let url = ContentUrl::generate();
        let reader = store.reader(&url).unwrap();
        assert!(!reader.exists().unwrap());
        assert!(!store.exists(&url).unwrap());
        assert!(cache.is_empty());
    }

    #[test]
    fn exists_uses_reader_default() {
        let (backing, _, store) = caching();
        let present = backing.put(b"p").unwrap();
        let absent = ContentUrl::generate();
        for url in [&present, &absent] {
            assert_eq!(
                store.exists(url).unwrap(),
                exists_via_reader(&store, url).unwrap()
            );
        }
        assert!(store.exists(&present).unwrap());
    }

    #[test]
    fn writes_go_to_backing() {
        let (backing, cache, store) = caching();
        let url = store.put(b"new").unwrap();
        assert!(backing.exists(&url).unwrap());
        assert!(cache.is_empty());
        assert_eq!(store.all_urls().unwrap(), backing.all_urls().unwrap());
    }

    #[test]
    fn failed_population_falls_back_to_backing() {
        let backing = Arc::new(InMemoryContentStore::new());
        let store = CachingContentStore::new(
            backing.clone(),
            Arc::new(FullCache(InMemoryContentStore::new())),
        );
        let url = backing.put(b"uncacheable").unwrap();
        assert_eq!(store.reader(&url).unwrap().read_all().unwrap(), b"uncacheable");
    }

    #[test]
    fn open_file_writer_is_never_cached() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Arc::new(FileContentStore::open(dir.path().join("backing")).unwrap());
        let cache = Arc::new(FileContentStore::open(dir.path().join("cache")).unwrap());
        let store = CachingContentStore::new(backing.clone(), cache.clone());
        let url = ContentUrl::generate();

        let mut writer = backing.writer(ContentContext::for_url(url.clone())).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.flush().unwrap();
        assert!(!store.reader(&url).unwrap().exists().unwrap());
        assert!(!cache.exists(&url).unwrap());

        writer.close().unwrap();
        assert_eq!(store.reader(&url).unwrap().read_all().unwrap(), b"hello");
        assert_eq!(cache.reader(&url).unwrap().read_all().unwrap(), b"hello");
    }

    #[test]
    fn delete_evicts_from_both() {
        let (backing, cache, store) = caching();
        let url = backing.put(b"gone").unwrap();
        store.reader(&url).unwrap();
        assert!(store.delete(&url).unwrap());
        assert!(!backing.exists(&url).unwrap());
        assert!(!cache.exists(&url).unwrap());
    }

    #[test]
    fn delete_propagates_unsupported_cache() {
        let backing = Arc::new(InMemoryContentStore::new());
        let store = CachingContentStore::new(
            backing.clone(),
            Arc::new(FullCache(InMemoryContentStore::new())),
        );
        let url = backing.put(b"x").unwrap();
        assert!(matches!(store.delete(&url), Err(StoreError::Unsupported(_))));
    }
}
