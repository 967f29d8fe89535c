use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock};

use chrono::Local;
use cstore_types::{ContentUrl, Timestamp, UrlTimeRange};
use tracing::debug;

use crate::context::ContentContext;
use crate::error::{StoreError, StoreResult};
use crate::traits::{creation_time, ContentReader, ContentStore, ContentWriter};

/// Committed content and the time it was written.
#[derive(Clone)]
struct Entry {
    data: Arc<[u8]>,
    written_at: Timestamp,
}

/// State of one URL.
#[derive(Clone)]
enum Slot {
    /// A writer is open for the URL; readers do not see it yet.
    Reserved,
    Committed(Entry),
}

type Slots = Arc<RwLock<BTreeMap<ContentUrl, Slot>>>;

/// In-memory, map-based content store.
///
/// Intended for tests and embedding. Readers and writers share the map with
/// the store, so handles stay valid after the store itself is dropped.
pub struct InMemoryContentStore {
    slots: Slots,
}

impl InMemoryContentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            slots: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|slot| matches!(slot, Slot::Committed(_)))
            .count()
    }

    /// Returns `true` if nothing is committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all committed entries.
    pub fn total_bytes(&self) -> u64 {
        self.slots
            .read()
            .expect("lock poisoned")
            .values()
            .map(|slot| match slot {
                Slot::Committed(entry) => entry.data.len() as u64,
                Slot::Reserved => 0,
            })
            .sum()
    }

    /// Remove all committed entries. Open writers keep their reservations.
    pub fn clear(&self) {
        self.slots
            .write()
            .expect("lock poisoned")
            .retain(|_, slot| matches!(slot, Slot::Reserved));
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for InMemoryContentStore {
    fn exists(&self, url: &ContentUrl) -> StoreResult<bool> {
        let map = self.slots.read().expect("lock poisoned");
        Ok(matches!(map.get(url), Some(Slot::Committed(_))))
    }

    fn reader(&self, url: &ContentUrl) -> StoreResult<Box<dyn ContentReader>> {
        Ok(Box::new(MemoryContentReader {
            url: url.clone(),
            slots: Arc::clone(&self.slots),
        }))
    }

    fn writer(&self, context: ContentContext) -> StoreResult<Box<dyn ContentWriter>> {
        let (source, url) = context.into_parts();
        {
            let mut map = self.slots.write().expect("lock poisoned");
            if map.contains_key(&url) {
                return Err(StoreError::AlreadyExists(url));
            }
            map.insert(url.clone(), Slot::Reserved);
        }
        debug!(%url, derived = source.is_some(), "memory writer reserved");
        Ok(Box::new(MemoryContentWriter {
            url,
            source,
            buf: Vec::new(),
            slots: Arc::clone(&self.slots),
            committed: false,
        }))
    }

    fn urls(
        &self,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> StoreResult<BTreeSet<ContentUrl>> {
        let range = UrlTimeRange::new(from, to);
        let map = self.slots.read().expect("lock poisoned");
        Ok(map
            .iter()
            .filter_map(|(url, slot)| match slot {
                Slot::Committed(entry) => creation_time(url, Some(entry.written_at))
                    .filter(|created| range.contains(created))
                    .map(|_| url.clone()),
                Slot::Reserved => None,
            })
            .collect())
    }

    fn delete(&self, url: &ContentUrl) -> StoreResult<bool> {
        let mut map = self.slots.write().expect("lock poisoned");
        if matches!(map.get(url), Some(Slot::Committed(_))) {
            map.remove(url);
            debug!(%url, "memory content deleted");
            return Ok(true);
        }
        Ok(false)
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("content_count", &self.len())
            .finish()
    }
}

struct MemoryContentReader {
    url: ContentUrl,
    slots: Slots,
}

impl MemoryContentReader {
    fn entry(&self) -> Option<Entry> {
        match self.slots.read().expect("lock poisoned").get(&self.url) {
            Some(Slot::Committed(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    fn require_entry(&self) -> StoreResult<Entry> {
        self.entry().ok_or_else(|| StoreError::NotFound(self.url.clone()))
    }
}

impl ContentReader for MemoryContentReader {
    fn url(&self) -> &ContentUrl {
        &self.url
    }

    fn exists(&self) -> StoreResult<bool> {
        Ok(self.entry().is_some())
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.require_entry()?.data.len() as u64)
    }

    fn last_modified(&self) -> StoreResult<Option<Timestamp>> {
        Ok(self.entry().map(|entry| entry.written_at))
    }

    fn open(&self) -> StoreResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.require_entry()?.data)))
    }
}

struct MemoryContentWriter {
    url: ContentUrl,
    source: Option<Box<dyn ContentReader>>,
    buf: Vec<u8>,
    slots: Slots,
    committed: bool,
}

impl Write for MemoryContentWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContentWriter for MemoryContentWriter {
    fn url(&self) -> &ContentUrl {
        &self.url
    }

    fn source(&self) -> Option<&dyn ContentReader> {
        self.source.as_deref()
    }

    fn bytes_written(&self) -> u64 {
        self.buf.len() as u64
    }

    fn close(mut self: Box<Self>) -> StoreResult<u64> {
        let data: Arc<[u8]> = Arc::from(std::mem::take(&mut self.buf));
        let len = data.len() as u64;
        let entry = Entry {
            data,
            written_at: Local::now(),
        };
        self.slots
            .write()
            .expect("lock poisoned")
            .insert(self.url.clone(), Slot::Committed(entry));
        self.committed = true;
        debug!(url = %self.url, len, "memory content committed");
        Ok(len)
    }
}

impl Drop for MemoryContentWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Ok(mut map) = self.slots.write() {
            if matches!(map.get(&self.url), Some(Slot::Reserved)) {
                map.remove(&self.url);
                debug!(url = %self.url, "unclosed memory writer released");
            }
        }
    }
}
