use std::fmt;

use cstore_types::ContentUrl;

use crate::traits::ContentReader;

/// Per-call arguments for [`ContentStore::writer`](crate::ContentStore::writer).
///
/// Pairs an optional existing reader with the URL the new content will be
/// stored under. The reader is only a hint: a backend may use it to copy or
/// pre-allocate, but the content a writer commits is always exactly what was
/// written to it.
pub struct ContentContext {
    existing: Option<Box<dyn ContentReader>>,
    url: Option<ContentUrl>,
}

impl ContentContext {
    /// Create a context from an optional existing reader and target URL.
    ///
    /// With no URL the store generates one when the writer is acquired.
    pub fn new(existing: Option<Box<dyn ContentReader>>, url: Option<ContentUrl>) -> Self {
        Self { existing, url }
    }

    /// Write new content to a known URL.
    pub fn for_url(url: ContentUrl) -> Self {
        Self::new(None, Some(url))
    }

    /// Write new content to a freshly generated URL.
    pub fn fresh() -> Self {
        Self::new(None, None)
    }

    /// The copy hint, if any.
    pub fn existing_reader(&self) -> Option<&dyn ContentReader> {
        self.existing.as_deref()
    }

    /// The requested target URL, if any.
    pub fn url(&self) -> Option<&ContentUrl> {
        self.url.as_ref()
    }

    /// Split into the copy hint and the target URL, generating the URL if
    /// none was requested.
    pub fn into_parts(self) -> (Option<Box<dyn ContentReader>>, ContentUrl) {
        let url = self.url.unwrap_or_else(ContentUrl::generate);
        (self.existing, url)
    }
}

impl fmt::Debug for ContentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentContext")
            .field("existing", &self.existing.as_ref().map(|r| r.url()))
            .field("url", &self.url)
            .finish()
    }
}
