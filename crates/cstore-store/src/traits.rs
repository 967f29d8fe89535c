use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Read, Write};

use cstore_types::{ContentUrl, Timestamp, UrlTimeRange};

use crate::context::ContentContext;
use crate::error::{StoreError, StoreResult};

/// Read access to the content stored under one URL.
///
/// Acquiring a reader does not check that the content exists. Call
/// [`ContentReader::exists`] or handle [`StoreError::NotFound`] from the
/// accessors.
pub trait ContentReader: Send + Sync {
    /// The URL this reader is bound to.
    fn url(&self) -> &ContentUrl;

    /// Whether content is currently stored under the URL.
    fn exists(&self) -> StoreResult<bool>;

    /// Content length in bytes.
    fn size(&self) -> StoreResult<u64>;

    /// When the content was last written, if the backend records it.
    fn last_modified(&self) -> StoreResult<Option<Timestamp>>;

    /// Open a byte stream over the content.
    ///
    /// The stream owns its resources and releases them when dropped.
    fn open(&self) -> StoreResult<Box<dyn Read + Send>>;

    /// Read the whole content into memory.
    fn read_all(&self) -> StoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.open()?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for dyn ContentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentReader({})", self.url())
    }
}

/// Write access to a newly allocated URL.
///
/// Bytes go through [`std::io::Write`]. Content becomes durable on
/// [`ContentWriter::close`]; a writer dropped without closing releases its
/// allocation and leaves nothing behind.
pub trait ContentWriter: Write + Send {
    /// The URL the content will be stored under.
    fn url(&self) -> &ContentUrl;

    /// The existing reader this writer was derived from, if any.
    fn source(&self) -> Option<&dyn ContentReader>;

    /// Bytes accepted so far.
    fn bytes_written(&self) -> u64;

    /// Commit the content. Returns the committed length.
    fn close(self: Box<Self>) -> StoreResult<u64>;

    /// Write a whole buffer.
    fn put_bytes(&mut self, data: &[u8]) -> StoreResult<()> {
        self.write_all(data)?;
        Ok(())
    }

    /// Stream the source reader's content into this writer.
    ///
    /// Returns the number of bytes copied, `0` when there is no source.
    fn copy_source(&mut self) -> StoreResult<u64> {
        let mut input = match self.source() {
            Some(reader) => reader.open()?,
            None => return Ok(0),
        };
        Ok(io::copy(&mut input, self)?)
    }
}

impl fmt::Debug for dyn ContentWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentWriter")
            .field("url", self.url())
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}

/// A backing store for binary content addressed by [`ContentUrl`].
///
/// All implementations must satisfy these invariants:
/// - Content is write-once: [`ContentStore::writer`] fails with
///   [`StoreError::AlreadyExists`] when the URL is stored or reserved by
///   another open writer.
/// - No operation changes a URL's value.
/// - Backend errors are returned unchanged. There is no retry at this layer.
/// - Handles release their resources on every path, including drop.
pub trait ContentStore: Send + Sync {
    /// Whether this store accepts writers.
    fn is_writable(&self) -> bool {
        true
    }

    /// Check whether content is stored under `url`.
    ///
    /// The default acquires a reader and asks it (see [`exists_via_reader`]).
    /// Backends with a cheaper lookup should override this.
    fn exists(&self, url: &ContentUrl) -> StoreResult<bool> {
        exists_via_reader(self, url)
    }

    /// Acquire a reader for `url`. The content need not exist yet.
    fn reader(&self, url: &ContentUrl) -> StoreResult<Box<dyn ContentReader>>;

    /// Acquire a writer for the context's target URL.
    ///
    /// Either a fully usable writer is returned or an error; the target is
    /// reserved before this returns.
    fn writer(&self, context: ContentContext) -> StoreResult<Box<dyn ContentWriter>>;

    /// URLs whose creation time falls in `[from, to)`.
    ///
    /// Creation time is the URL's embedded date partition when present,
    /// otherwise the backend's record of when the content was written.
    fn urls(
        &self,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> StoreResult<BTreeSet<ContentUrl>>;

    /// Delete the content under `url`. Returns `true` if it existed.
    fn delete(&self, url: &ContentUrl) -> StoreResult<bool> {
        Err(StoreError::Unsupported(format!("delete is not supported: {url}")))
    }
}

/// Existence check built only on [`ContentStore::reader`].
///
/// Always pays for reader acquisition.
pub fn exists_via_reader<S: ContentStore + ?Sized>(store: &S, url: &ContentUrl) -> StoreResult<bool> {
    store.reader(url)?.exists()
}

/// Creation time used for range filtering.
pub(crate) fn creation_time(url: &ContentUrl, written_at: Option<Timestamp>) -> Option<Timestamp> {
    url.embedded_time().or(written_at)
}

/// Derived operations available on every [`ContentStore`].
///
/// Blanket-implemented, so backends cannot change their meaning.
pub trait ContentStoreExt: ContentStore {
    /// Every URL in the store; same as `urls(None, None)`.
    fn all_urls(&self) -> StoreResult<BTreeSet<ContentUrl>> {
        self.urls(None, None)
    }

    /// URLs created within `range`.
    fn urls_in(&self, range: UrlTimeRange) -> StoreResult<BTreeSet<ContentUrl>> {
        self.urls(range.from, range.to)
    }

    /// Acquire a writer for `url` derived from an existing reader.
    fn writer_from(
        &self,
        existing: Box<dyn ContentReader>,
        url: ContentUrl,
    ) -> StoreResult<Box<dyn ContentWriter>> {
        self.writer(ContentContext::new(Some(existing), Some(url)))
    }

    /// Store `data` under a freshly generated URL and return it.
    fn put(&self, data: &[u8]) -> StoreResult<ContentUrl> {
        let mut writer = self.writer(ContentContext::fresh())?;
        writer.put_bytes(data)?;
        let url = writer.url().clone();
        writer.close()?;
        Ok(url)
    }
}

impl<S: ContentStore + ?Sized> ContentStoreExt for S {}

/// Copy a reader's content into a writer and commit it.
pub fn transfer(reader: &dyn ContentReader, mut writer: Box<dyn ContentWriter>) -> StoreResult<u64> {
    let mut input = reader.open()?;
    io::copy(&mut input, &mut writer)?;
    writer.close()
}
