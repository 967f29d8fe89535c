use std::collections::BTreeSet;
use std::io::{self, Write};
use std::sync::Arc;

use cstore_types::{ContentUrl, Timestamp};
use tracing::debug;

use crate::config::ReplicationConfig;
use crate::context::ContentContext;
use crate::error::{StoreError, StoreResult};
use crate::traits::{transfer, ContentReader, ContentStore, ContentWriter};

/// A primary store mirrored to zero or more secondaries.
///
/// - Writes go to the primary. A URL held by any secondary already exists,
///   so writers for it are rejected. With outbound replication enabled,
///   closing a writer copies the committed content to every secondary in
///   order.
/// - Reads come from the primary when it has the URL, otherwise from the
///   first secondary that does.
/// - Enumeration is the union of all stores; deletion touches the primary
///   only.
pub struct ReplicatingContentStore {
    primary: Arc<dyn ContentStore>,
    secondaries: Vec<Arc<dyn ContentStore>>,
    config: ReplicationConfig,
}

impl ReplicatingContentStore {
    pub fn new(
        primary: Arc<dyn ContentStore>,
        secondaries: Vec<Arc<dyn ContentStore>>,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            primary,
            secondaries,
            config,
        }
    }

    pub fn primary(&self) -> &Arc<dyn ContentStore> {
        &self.primary
    }

    pub fn secondaries(&self) -> &[Arc<dyn ContentStore>] {
        &self.secondaries
    }
}

impl ContentStore for ReplicatingContentStore {
    fn is_writable(&self) -> bool {
        self.primary.is_writable()
    }

    fn exists(&self, url: &ContentUrl) -> StoreResult<bool> {
        if self.primary.exists(url)? {
            return Ok(true);
        }
        for secondary in &self.secondaries {
            if secondary.exists(url)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reader(&self, url: &ContentUrl) -> StoreResult<Box<dyn ContentReader>> {
        let primary = self.primary.reader(url)?;
        if primary.exists()? {
            return Ok(primary);
        }
        for (index, secondary) in self.secondaries.iter().enumerate() {
            let reader = secondary.reader(url)?;
            if reader.exists()? {
                debug!(%url, secondary = index, "read served by secondary");
                return Ok(reader);
            }
        }
        Ok(primary)
    }

    fn writer(&self, context: ContentContext) -> StoreResult<Box<dyn ContentWriter>> {
        let inner = self.primary.writer(context)?;
        ensure_vacant(&self.secondaries, inner.url())?;
        if !self.config.outbound || self.secondaries.is_empty() {
            return Ok(inner);
        }
        Ok(Box::new(ReplicatingWriter {
            inner,
            primary: Arc::clone(&self.primary),
            secondaries: self.secondaries.clone(),
        }))
    }

    fn urls(
        &self,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> StoreResult<BTreeSet<ContentUrl>> {
        let mut urls = self.primary.urls(from, to)?;
        for secondary in &self.secondaries {
            urls.extend(secondary.urls(from, to)?);
        }
        Ok(urls)
    }

    fn delete(&self, url: &ContentUrl) -> StoreResult<bool> {
        self.primary.delete(url)
    }
}

/// Primary writer that fans the committed content out on close.
struct ReplicatingWriter {
    inner: Box<dyn ContentWriter>,
    primary: Arc<dyn ContentStore>,
    secondaries: Vec<Arc<dyn ContentStore>>,
}

impl Write for ReplicatingWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ContentWriter for ReplicatingWriter {
    fn url(&self) -> &ContentUrl {
        self.inner.url()
    }

    fn source(&self) -> Option<&dyn ContentReader> {
        self.inner.source()
    }

    fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }

    fn close(self: Box<Self>) -> StoreResult<u64> {
        let Self {
            inner,
            primary,
            secondaries,
        } = *self;
        let url = inner.url().clone();
        // A secondary may have taken the URL since the writer was acquired.
        ensure_vacant(&secondaries, &url)?;
        let len = inner.close()?;

        // Replication errors propagate; the primary copy stays committed.
        let committed = primary.reader(&url)?;
        for (index, secondary) in secondaries.iter().enumerate() {
            let writer = secondary.writer(ContentContext::for_url(url.clone()))?;
            transfer(committed.as_ref(), writer)?;
            debug!(%url, secondary = index, len, "content replicated");
        }
        Ok(len)
    }
}

/// Fail with `AlreadyExists` when any secondary holds `url`.
fn ensure_vacant(secondaries: &[Arc<dyn ContentStore>], url: &ContentUrl) -> StoreResult<()> {
    for (index, secondary) in secondaries.iter().enumerate() {
        if secondary.exists(url)? {
            debug!(%url, secondary = index, "url already held by secondary");
            return Err(StoreError::AlreadyExists(url.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileContentStore;
    use crate::memory::InMemoryContentStore;
    use crate::traits::ContentStoreExt;
    use chrono::{Local, TimeZone};

    struct Fixture {
        primary: Arc<InMemoryContentStore>,
        secondaries: Vec<Arc<InMemoryContentStore>>,
        store: ReplicatingContentStore,
    }

    fn fixture(count: usize, outbound: bool) -> Fixture {
        let primary = Arc::new(InMemoryContentStore::new());
        let secondaries: Vec<_> = (0..count).map(|_| Arc::new(InMemoryContentStore::new())).collect();
        let store = ReplicatingContentStore::new(
            primary.clone(),
            secondaries
                .iter()
                .map(|s| s.clone() as Arc<dyn ContentStore>)
                .collect(),
            ReplicationConfig { outbound },
        );
        Fixture {
            primary,
            secondaries,
            store,
        }
    }

    #[test]
    fn close_replicates_to_every_secondary() {
        let f = fixture(2, true);
        let url = f.store.put(b"mirrored").unwrap();
        assert!(f.primary.exists(&url).unwrap());
        for secondary in &f.secondaries {
            assert_eq!(secondary.reader(&url).unwrap().read_all().unwrap(), b"mirrored");
        }
    }

    #[test]
    fn outbound_disabled_writes_primary_only() {
        let f = fixture(1, false);
        let url = f.store.put(b"local").unwrap();
        assert!(f.primary.exists(&url).unwrap());
        assert!(!f.secondaries[0].exists(&url).unwrap());
    }

    #[test]
    fn dropped_writer_replicates_nothing() {
        let f = fixture(1, true);
        let url = ContentUrl::generate();
        {
            let mut writer = f.store.writer(ContentContext::for_url(url.clone())).unwrap();
            writer.put_bytes(b"abandoned").unwrap();
        }
        assert!(!f.store.exists(&url).unwrap());
        assert!(f.secondaries[0].is_empty());
    }

    #[test]
    fn reads_fall_back_to_secondaries() {
        let f = fixture(2, false);
        let url = f.secondaries[1].put(b"only on the second").unwrap();
        assert!(f.store.exists(&url).unwrap());
        assert_eq!(f.store.reader(&url).unwrap().read_all().unwrap(), b"only on the second");
    }

    #[test]
    fn missing_everywhere_gives_lazy_reader() {
        let f = fixture(1, true);
        let url = ContentUrl::generate();
        assert!(!f.store.exists(&url).unwrap());
        assert!(!f.store.reader(&url).unwrap().exists().unwrap());
    }

    #[test]
    fn writer_rejected_when_secondary_holds_url() {
        for outbound in [false, true] {
            let f = fixture(1, outbound);
            let url = ContentUrl::generate();
            f.secondaries[0]
                .writer(ContentContext::for_url(url.clone()))
                .and_then(|mut w| {
                    w.put_bytes(b"old")?;
                    w.close()
                })
                .unwrap();
            assert!(f.store.exists(&url).unwrap());

            let result = f.store.writer(ContentContext::for_url(url.clone()));
            assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
            assert!(!f.primary.exists(&url).unwrap());
            assert!(f.primary.is_empty());
            assert_eq!(f.store.reader(&url).unwrap().read_all().unwrap(), b"old");
        }
    }

    #[test]
    fn secondary_taken_before_close_leaves_primary_untouched() {
        let f = fixture(1, true);
        let url = ContentUrl::generate();
        let mut writer = f.store.writer(ContentContext::for_url(url.clone())).unwrap();
        writer.put_bytes(b"new").unwrap();

        f.secondaries[0]
            .writer(ContentContext::for_url(url.clone()))
            .and_then(|mut w| {
                w.put_bytes(b"old")?;
                w.close()
            })
            .unwrap();

        assert!(matches!(writer.close(), Err(StoreError::AlreadyExists(_))));
        assert!(!f.primary.exists(&url).unwrap());
        assert_eq!(f.store.reader(&url).unwrap().read_all().unwrap(), b"old");
    }

    #[test]
    fn file_replica_blocks_writer_and_serves_reads() {
        let dir = tempfile::tempdir().unwrap();
        let primary = Arc::new(FileContentStore::open(dir.path().join("primary")).unwrap());
        let replica = Arc::new(FileContentStore::open(dir.path().join("replica")).unwrap());
        let store = ReplicatingContentStore::new(
            primary.clone(),
            vec![replica.clone() as Arc<dyn ContentStore>],
            ReplicationConfig { outbound: false },
        );
        let url = replica.put(b"old").unwrap();

        assert!(matches!(
            store.writer(ContentContext::for_url(url.clone())),
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(primary.all_urls().unwrap().is_empty());
        assert!(!dir.path().join("primary/.partial/store").exists());
        assert_eq!(store.reader(&url).unwrap().read_all().unwrap(), b"old");
    }

    #[test]
    fn urls_are_the_union() {
        let f = fixture(1, false);
        let t = |h| Local.with_ymd_and_hms(2024, 6, 10, h, 0, 0).unwrap();
        let a = ContentUrl::generate_at(&t(1));
        let b = ContentUrl::generate_at(&t(2));
        f.primary
            .writer(ContentContext::for_url(a.clone()))
            .and_then(|w| w.close())
            .unwrap();
        f.secondaries[0]
            .writer(ContentContext::for_url(b.clone()))
            .and_then(|w| w.close())
            .unwrap();

        assert_eq!(f.store.all_urls().unwrap(), BTreeSet::from([a.clone(), b.clone()]));
        assert_eq!(f.store.urls(Some(t(2)), None).unwrap(), BTreeSet::from([b]));
    }

    #[test]
    fn delete_touches_primary_only() {
        let f = fixture(1, true);
        let url = f.store.put(b"kept on replica").unwrap();
        assert!(f.store.delete(&url).unwrap());
        assert!(!f.primary.exists(&url).unwrap());
        assert!(f.secondaries[0].exists(&url).unwrap());
        // Still readable through the fallback.
        assert!(f.store.exists(&url).unwrap());
    }
}
