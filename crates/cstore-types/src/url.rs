use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::UrlError;
use crate::temporal::Timestamp;

/// Protocol prefix of every URL generated by this crate.
pub const STORE_PROTOCOL: &str = "store://";

/// Protocol used by early file stores. Accepted, never generated.
pub const LEGACY_FILE_PROTOCOL: &str = "file://";

/// Recognized protocol prefixes, in match order. The first match wins.
pub const PROTOCOLS: &[&str] = &[STORE_PROTOCOL, LEGACY_FILE_PROTOCOL];

/// Minimum length of the path left after stripping the protocol.
pub const MIN_RELATIVE_LEN: usize = 8;

/// Suffix marking a URL as binary content.
pub const BIN_SUFFIX: &str = ".bin";

/// Strip the protocol from a content URL and return the relative path.
///
/// This is a cheap guard, not a parser: only the protocol and a minimum
/// path length are checked. Backends that need the date partition must
/// parse it themselves (see [`ContentUrl::embedded_time`]).
pub fn relative_part(url: &str) -> Result<&str, UrlError> {
    let protocol = match_protocol(url).ok_or_else(|| UrlError::UnknownProtocol {
        url: url.to_string(),
        expected: PROTOCOLS,
    })?;
    let path = &url[protocol.len()..];
    let len = path.chars().count();
    if len < MIN_RELATIVE_LEN {
        return Err(UrlError::TooShort {
            url: url.to_string(),
            len,
            min: MIN_RELATIVE_LEN,
        });
    }
    Ok(path)
}

fn match_protocol(url: &str) -> Option<&'static str> {
    PROTOCOLS.iter().copied().find(|p| url.starts_with(p))
}

/// Identifier of one stored binary payload.
///
/// A `ContentUrl` is immutable once created. Two URLs are the same content
/// only if their strings are equal; the embedded date path carries no
/// identity of its own.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentUrl(String);

impl ContentUrl {
    /// Generate a new URL partitioned by the current local time.
    pub fn generate() -> Self {
        Self::generate_at(&Local::now())
    }

    /// Generate a new URL partitioned by the given time.
    ///
    /// The calendar fields are taken in the time zone of `time`. Uniqueness
    /// comes from the v4 UUID token, never from the partition.
    pub fn generate_at<Tz: TimeZone>(time: &chrono::DateTime<Tz>) -> Self {
        Self(format!(
            "{STORE_PROTOCOL}{}/{}/{}/{}/{}/{}{BIN_SUFFIX}",
            time.year(),
            time.month(),
            time.day(),
            time.hour(),
            time.minute(),
            uuid::Uuid::new_v4(),
        ))
    }

    /// Validate and wrap an existing URL string.
    pub fn parse(url: impl Into<String>) -> Result<Self, UrlError> {
        let url = url.into();
        relative_part(&url)?;
        Ok(Self(url))
    }

    /// The full URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL with its protocol stripped.
    pub fn relative_part(&self) -> &str {
        // The protocol was matched at construction.
        match match_protocol(&self.0) {
            Some(protocol) => &self.0[protocol.len()..],
            None => &self.0,
        }
    }

    /// The protocol prefix this URL was recognized by.
    pub fn protocol(&self) -> &'static str {
        match_protocol(&self.0).unwrap_or(STORE_PROTOCOL)
    }

    /// Creation minute encoded in the date partition, if the path has one.
    ///
    /// The fields are read in the local calendar, matching
    /// [`ContentUrl::generate`]. Returns `None` for URLs whose path does not
    /// start with a valid `year/month/day/hour/minute/` prefix.
    pub fn embedded_time(&self) -> Option<Timestamp> {
        let mut parts = self.relative_part().split('/');
        let year: i32 = parts.next()?.parse().ok()?;
        let month: u32 = parts.next()?.parse().ok()?;
        let day: u32 = parts.next()?.parse().ok()?;
        let hour: u32 = parts.next()?.parse().ok()?;
        let minute: u32 = parts.next()?.parse().ok()?;
        // A token segment must follow the partition.
        parts.next().filter(|token| !token.is_empty())?;

        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
        Local.from_local_datetime(&naive).earliest()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ContentUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentUrl({})", self.0)
    }
}

impl fmt::Display for ContentUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentUrl {
    type Error = UrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ContentUrl> for String {
    fn from(url: ContentUrl) -> Self {
        url.0
    }
}
