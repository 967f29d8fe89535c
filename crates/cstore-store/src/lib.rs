//! Content stores for cstore.
//!
//! A content store holds opaque binary payloads named by [`ContentUrl`]s.
//! Callers never learn how a backend lays content out; they only acquire
//! readers and writers through the [`ContentStore`] trait.
//!
//! # Storage Backends
//!
//! All backends implement the [`ContentStore`] trait:
//!
//! - [`InMemoryContentStore`] -- map-based store for tests and embedding
//! - [`FileContentStore`] -- directory tree keyed by the URL's date partition
//! - [`CachingContentStore`] -- read-through cache over another store
//! - [`ReplicatingContentStore`] -- primary store mirrored to secondaries
//!
//! # Design Rules
//!
//! 1. Content is write-once. A URL that is stored or has an open writer
//!    cannot be written again.
//! 2. Readers are lazy: acquiring one does not check existence.
//! 3. Writers commit on `close`; dropping a writer discards its content.
//! 4. Errors from backends are propagated unchanged, never retried.
//! 5. Derived operations ([`ContentStoreExt`], [`exists_via_reader`]) use
//!    only the trait's primitives.
//!
//! ```
//! use cstore_store::{ContentContext, ContentStore, ContentUrl, InMemoryContentStore};
//!
//! let store = InMemoryContentStore::new();
//! let url = ContentUrl::generate();
//! assert!(!store.exists(&url).unwrap());
//!
//! let mut writer = store.writer(ContentContext::for_url(url.clone())).unwrap();
//! writer.put_bytes(b"hello").unwrap();
//! writer.close().unwrap();
//!
//! assert!(store.exists(&url).unwrap());
//! assert_eq!(store.reader(&url).unwrap().read_all().unwrap(), b"hello");
//! ```

pub mod caching;
pub mod config;
pub mod context;
pub mod error;
pub mod file;
pub mod memory;
pub mod replicating;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use caching::CachingContentStore;
pub use config::{FileStoreConfig, ReplicationConfig, StoreConfig};
pub use context::ContentContext;
pub use error::{StoreError, StoreResult};
pub use file::FileContentStore;
pub use memory::InMemoryContentStore;
pub use replicating::ReplicatingContentStore;
pub use traits::{
    exists_via_reader, transfer, ContentReader, ContentStore, ContentStoreExt, ContentWriter,
};
pub use cstore_types::{ContentUrl, Timestamp, UrlTimeRange};
