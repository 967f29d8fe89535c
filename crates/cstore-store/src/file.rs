use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use cstore_types::{relative_part, ContentUrl, Timestamp, UrlTimeRange, PROTOCOLS};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::FileStoreConfig;
use crate::context::ContentContext;
use crate::error::{StoreError, StoreResult};
use crate::traits::{creation_time, ContentReader, ContentStore, ContentWriter};

/// Directory under the root holding content whose writer is still open.
const PARTIAL_DIR: &str = ".partial";

/// Content store backed by a directory tree.
///
/// A URL maps to `<root>/<scheme>/<relative part>`, so each protocol keeps
/// its own tree and the date partition of generated URLs becomes a
/// `year/month/day/hour/minute` directory hierarchy.
///
/// A writer streams into `<root>/.partial/<scheme>/<relative part>`, created
/// exclusively when the writer is acquired. Closing hard-links the finished
/// file into place, which fails if the URL was committed meanwhile, so a URL
/// is write-once across threads and processes sharing the root. Readers and
/// enumeration never see in-flight content. An unclosed writer deletes its
/// partial file when dropped.
pub struct FileContentStore {
    config: FileStoreConfig,
}

impl FileContentStore {
    /// Open a store from configuration, creating the root if writable.
    pub fn new(config: FileStoreConfig) -> StoreResult<Self> {
        if !config.read_only {
            fs::create_dir_all(&config.root)?;
        } else if !config.root.is_dir() {
            warn!(root = %config.root.display(), "read-only content store root does not exist");
        }
        info!(
            root = %config.root.display(),
            read_only = config.read_only,
            fsync = config.fsync,
            "file content store initialized"
        );
        Ok(Self { config })
    }

    /// Open a writable store rooted at `root` with default settings.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::new(FileStoreConfig::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &FileStoreConfig {
        &self.config
    }

    /// Resolve a URL to the path of its committed file.
    ///
    /// Distinct URLs always resolve to distinct paths: segments that the
    /// filesystem would collapse (empty, `.` or `..`) are rejected.
    pub fn path_for(&self, url: &ContentUrl) -> StoreResult<PathBuf> {
        locate(&self.config.root, url)
    }

    fn partial_root(&self) -> PathBuf {
        self.config.root.join(PARTIAL_DIR)
    }

    /// Build the URL naming a committed file under the root.
    fn url_for(&self, path: &Path) -> Option<ContentUrl> {
        let relative = path.strip_prefix(&self.config.root).ok()?;
        let mut segments = relative.components().map(|c| c.as_os_str().to_str());
        let scheme = segments.next()??;
        let protocol = PROTOCOLS.iter().find(|p| scheme_dir(p) == scheme)?;
        let rest: Vec<&str> = segments.collect::<Option<_>>()?;
        ContentUrl::parse(format!("{protocol}{}", rest.join("/"))).ok()
    }

    /// URL and creation time of a walked file. `None` for directories,
    /// foreign files and files removed while the walk was running.
    fn listed(&self, entry: &DirEntry) -> StoreResult<Option<(ContentUrl, Option<Timestamp>)>> {
        if !entry.file_type().is_file() {
            return Ok(None);
        }
        let Some(url) = self.url_for(entry.path()) else {
            debug!(path = %entry.path().display(), "skipping file with no valid content URL");
            return Ok(None);
        };
        let modified = match entry.metadata() {
            Ok(meta) => meta.modified().ok().map(Timestamp::from),
            Err(e) if vanished(&e) => {
                debug!(%url, "content removed during enumeration");
                return Ok(None);
            }
            Err(e) => return Err(io::Error::from(e).into()),
        };
        let created = creation_time(&url, modified);
        Ok(Some((url, created)))
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl ContentStore for FileContentStore {
    fn is_writable(&self) -> bool {
        !self.config.read_only
    }

    fn exists(&self, url: &ContentUrl) -> StoreResult<bool> {
        is_file(&self.path_for(url)?)
    }

    fn reader(&self, url: &ContentUrl) -> StoreResult<Box<dyn ContentReader>> {
        let path = self.path_for(url)?;
        Ok(Box::new(FileContentReader {
            url: url.clone(),
            path,
        }))
    }

    fn writer(&self, context: ContentContext) -> StoreResult<Box<dyn ContentWriter>> {
        self.ensure_writable()?;
        let (source, url) = context.into_parts();
        let path = self.path_for(&url)?;
        if is_file(&path)? {
            return Err(StoreError::AlreadyExists(url));
        }
        let partial_root = self.partial_root();
        let partial = locate(&partial_root, &url)?;
        let file = match with_parent(&partial, || {
            OpenOptions::new().write(true).create_new(true).open(&partial)
        }) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(url))
            }
            Err(e) => return Err(e.into()),
        };
        let writer = FileContentWriter {
            url,
            path,
            partial,
            partial_root,
            file: Some(BufWriter::new(file)),
            source,
            fsync: self.config.fsync,
            written: 0,
        };
        // Committed between the check and the reservation; drop discards.
        if is_file(&writer.path)? {
            return Err(StoreError::AlreadyExists(writer.url.clone()));
        }
        debug!(
            url = %writer.url,
            path = %writer.path.display(),
            derived = writer.source.is_some(),
            "file writer opened"
        );
        Ok(Box::new(writer))
    }

    fn urls(
        &self,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> StoreResult<BTreeSet<ContentUrl>> {
        let range = UrlTimeRange::new(from, to);
        let mut urls = BTreeSet::new();
        for protocol in PROTOCOLS {
            let tree = self.config.root.join(scheme_dir(protocol));
            if !tree.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&tree) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) if vanished(&e) => continue,
                    Err(e) => return Err(io::Error::from(e).into()),
                };
                if let Some((url, created)) = self.listed(&entry)? {
                    if created.is_some_and(|t| range.contains(&t)) {
                        urls.insert(url);
                    }
                }
            }
        }
        debug!(%range, count = urls.len(), "file urls enumerated");
        Ok(urls)
    }

    fn delete(&self, url: &ContentUrl) -> StoreResult<bool> {
        self.ensure_writable()?;
        let path = self.path_for(url)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                prune_empty_parents(&path, &self.config.root);
                debug!(%url, "file content deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for FileContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContentStore")
            .field("root", &self.config.root)
            .field("read_only", &self.config.read_only)
            .finish()
    }
}

/// Directory name of a protocol's tree: `store://` keeps content in `store/`.
fn scheme_dir(protocol: &str) -> &str {
    protocol.trim_end_matches("://")
}

/// Path of `url` under `base`, one directory level per URL segment.
fn locate(base: &Path, url: &ContentUrl) -> StoreResult<PathBuf> {
    let relative = relative_part(url.as_str())?;
    let mut path = base.join(scheme_dir(url.protocol()));
    for segment in relative.split('/') {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => path.push(segment),
            (None, _) => {
                return Err(StoreError::Backend(format!(
                    "content URL has an empty path segment: {url}"
                )))
            }
            _ => {
                return Err(StoreError::Backend(format!(
                    "content URL escapes store root: {url}"
                )))
            }
        }
    }
    Ok(path)
}

/// Run `op` after creating the parent directories of `path`.
///
/// A concurrent prune can remove a freshly created parent, so `op` is
/// retried once when it fails with `NotFound`.
fn with_parent<T>(path: &Path, op: impl Fn() -> io::Result<T>) -> io::Result<T> {
    let mut retried = false;
    loop {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match op() {
            Err(e) if e.kind() == io::ErrorKind::NotFound && !retried => retried = true,
            result => return result,
        }
    }
}

/// Remove empty directories between `path` and `stop`, exclusive.
fn prune_empty_parents(path: &Path, stop: &Path) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == stop || !current.starts_with(stop) {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

fn vanished(e: &walkdir::Error) -> bool {
    e.io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

fn is_file(path: &Path) -> StoreResult<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn map_missing(url: &ContentUrl, e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(url.clone())
    } else {
        StoreError::Io(e)
    }
}

struct FileContentReader {
    url: ContentUrl,
    path: PathBuf,
}

impl ContentReader for FileContentReader {
    fn url(&self) -> &ContentUrl {
        &self.url
    }

    fn exists(&self) -> StoreResult<bool> {
        is_file(&self.path)
    }

    fn size(&self) -> StoreResult<u64> {
        let meta = fs::metadata(&self.path).map_err(|e| map_missing(&self.url, e))?;
        Ok(meta.len())
    }

    fn last_modified(&self) -> StoreResult<Option<Timestamp>> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.modified().ok().map(Timestamp::from)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn open(&self) -> StoreResult<Box<dyn Read + Send>> {
        let file = File::open(&self.path).map_err(|e| map_missing(&self.url, e))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

struct FileContentWriter {
    url: ContentUrl,
    /// Committed location.
    path: PathBuf,
    /// In-flight location; holds the URL's reservation.
    partial: PathBuf,
    partial_root: PathBuf,
    /// `None` once closed.
    file: Option<BufWriter<File>>,
    source: Option<Box<dyn ContentReader>>,
    fsync: bool,
    written: u64,
}

impl FileContentWriter {
    fn file_mut(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "content writer is closed"))
    }

    /// Link the finished partial file into its committed location.
    fn publish(&self) -> StoreResult<()> {
        match with_parent(&self.path, || fs::hard_link(&self.partial, &self.path)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(self.url.clone()))
            }
            Err(e) => return Err(e.into()),
        }
        self.discard_partial();
        Ok(())
    }

    fn discard_partial(&self) {
        match fs::remove_file(&self.partial) {
            Ok(()) => prune_empty_parents(&self.partial, &self.partial_root),
            Err(e) => warn!(url = %self.url, error = %e, "failed to remove partial content"),
        }
    }
}

impl Write for FileContentWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = self.file_mut()?.write(data)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }
}

impl ContentWriter for FileContentWriter {
    fn url(&self) -> &ContentUrl {
        &self.url
    }

    fn source(&self) -> Option<&dyn ContentReader> {
        self.source.as_deref()
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }

    fn close(mut self: Box<Self>) -> StoreResult<u64> {
        let mut file = self.file.take().ok_or_else(|| {
            StoreError::Backend(format!("content writer already closed: {}", self.url))
        })?;
        let fsync = self.fsync;
        let synced = file.flush().and_then(|()| {
            if fsync {
                file.get_ref().sync_all()
            } else {
                Ok(())
            }
        });
        drop(file);
        if let Err(e) = synced.map_err(StoreError::from).and_then(|()| self.publish()) {
            self.discard_partial();
            return Err(e);
        }
        debug!(url = %self.url, len = self.written, "file content committed");
        Ok(self.written)
    }
}

impl Drop for FileContentWriter {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
            self.discard_partial();
            debug!(url = %self.url, "unclosed file writer discarded");
        }
    }
}
