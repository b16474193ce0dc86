//! NEMWEB directory listing client
//!
//! NEMWEB serves plain HTML indexes. Two dialects are seen in the wild:
//!
//! - plain links: `<a href="PUBLIC_X_202206130025_0000000365048508.zip">...</a>`
//! - annotated IIS rows, which carry the modified time and size before the link:
//!   `Monday, June 13, 2022 12:30 AM      20152 <A HREF="/Reports/...zip">...</A>`
//!   (directories show `<dir>` in the size column)
//!
//! Only anchors are consumed, so a pattern match is enough; no DOM is built.
//! Entries whose filename follows the AEMO convention are tagged with the
//! interval they cover.

use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::filename::AemoFilename;
use crate::http::{HttpError, HttpTransport};

#[allow(clippy::expect_used)]
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']?(?P<href>[^"'\s>]+)["']?[^>]*>(?P<text>.*?)</a>"#)
        .expect("anchor pattern compiles")
});

#[allow(clippy::expect_used)]
static ANNOTATED_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?P<modified>[a-z]+,\s+[a-z]+\s+\d{1,2},\s+\d{4}\s+\d{1,2}:\d{2}\s+[ap]m)\s+(?P<size>\d+|&lt;dir&gt;|<dir>)\s+<a\s[^>]*?href\s*=\s*["']?(?P<href>[^"'\s>]+)"#,
    )
    .expect("annotated row pattern compiles")
});

/// Link texts that label listing columns or navigation rather than entries
const HEADER_TEXTS: [&str; 6] = [
    "name",
    "last modified",
    "size",
    "description",
    "parent directory",
    "[to parent directory]",
];

const MODIFIED_FORMAT: &str = "%A, %B %d, %Y %I:%M %p";

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("invalid listing URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Http(#[from] HttpError),
}

/// An anchor as it appears on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirectoryEntry {
    pub name: String,
    pub href: String,
    pub is_directory: bool,
    pub size_bytes: Option<u64>,
    pub last_modified: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

/// A listing entry resolved against the listing URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirlistingEntry {
    pub name: String,
    /// Absolute URL of the entry
    pub link: String,
    pub entry_type: EntryType,
    pub size_bytes: Option<u64>,
    pub modified: Option<NaiveDateTime>,
    /// Interval parsed from an AEMO filename; `None` for directories and
    /// files outside the convention
    pub aemo_interval: Option<NaiveDateTime>,
}

impl DirlistingEntry {
    fn from_raw(raw: RawDirectoryEntry, base: &Url) -> Option<Self> {
        let link = match base.join(&raw.href) {
            Ok(link) => link,
            Err(e) => {
                debug!(href = %raw.href, error = %e, "Skipping unresolvable link");
                return None;
            },
        };

        let entry_type = if raw.is_directory {
            EntryType::Directory
        } else {
            EntryType::File
        };

        let aemo_interval = match entry_type {
            EntryType::File => AemoFilename::parse(&raw.name).ok().map(|f| f.timestamp),
            EntryType::Directory => None,
        };

        Some(Self {
            name: raw.name,
            link: link.to_string(),
            entry_type,
            size_bytes: raw.size_bytes,
            modified: raw.last_modified,
            aemo_interval,
        })
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn filename(&self) -> Option<AemoFilename> {
        AemoFilename::parse(&self.name).ok()
    }
}

/// Entries of one listing page
#[derive(Debug, Clone, Default)]
pub struct DirListing {
    pub url: String,
    pub entries: Vec<DirlistingEntry>,
}

impl DirListing {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &DirlistingEntry> {
        self.entries.iter().filter(|e| e.entry_type == EntryType::File)
    }

    pub fn directories(&self) -> impl Iterator<Item = &DirlistingEntry> {
        self.entries.iter().filter(|e| e.is_directory())
    }

    /// Keep only entries whose name matches `pattern`
    pub fn apply_filter(&mut self, pattern: &Regex) {
        let before = self.entries.len();
        self.entries.retain(|e| pattern.is_match(&e.name));
        debug!(
            url = %self.url,
            pattern = %pattern,
            kept = self.entries.len(),
            dropped = before - self.entries.len(),
            "Applied filename filter"
        );
    }

    /// Oldest first; entries without a modified time sort first
    pub fn sort_by_modified(&mut self) {
        self.entries.sort_by(|a, b| a.modified.cmp(&b.modified));
    }

    /// Most recent interval covered by any file on the page
    pub fn server_latest(&self) -> Option<NaiveDateTime> {
        self.files().filter_map(|e| e.aemo_interval).max()
    }

    /// The file covering the most recent interval
    pub fn latest_by_interval(&self) -> Option<&DirlistingEntry> {
        self.files()
            .filter(|e| e.aemo_interval.is_some())
            .max_by_key(|e| e.aemo_interval)
    }
}

/// Parse a listing page. `base_url` is the page's own URL.
pub fn parse_dirlisting(html: &str, base_url: &str) -> Result<DirListing, ListingError> {
    let base = listing_base(base_url)?;

    let annotations: HashMap<String, (Option<NaiveDateTime>, Option<u64>, bool)> = ANNOTATED_ROW
        .captures_iter(html)
        .map(|caps| {
            let size_token = &caps["size"];
            let is_dir = !size_token.chars().all(|c| c.is_ascii_digit());
            (
                caps["href"].to_string(),
                (
                    parse_modified(&caps["modified"]),
                    size_token.parse().ok(),
                    is_dir,
                ),
            )
        })
        .collect();

    let entries: Vec<DirlistingEntry> = ANCHOR
        .captures_iter(html)
        .filter_map(|caps| {
            let href = caps["href"].to_string();
            let text = decode_entities(caps["text"].trim());
            raw_entry(href, text, &annotations)
        })
        .filter_map(|raw| DirlistingEntry::from_raw(raw, &base))
        .collect();

    if entries.is_empty() && !html.trim().is_empty() {
        warn!(url = %base_url, bytes = html.len(), "Listing page is non-empty but no entries were found");
    }

    Ok(DirListing {
        url: base.to_string(),
        entries,
    })
}

fn raw_entry(
    href: String,
    text: String,
    annotations: &HashMap<String, (Option<NaiveDateTime>, Option<u64>, bool)>,
) -> Option<RawDirectoryEntry> {
    // Sort toggles such as ?C=M;O=A
    if href.starts_with('?') {
        return None;
    }

    if href == "../" || HEADER_TEXTS.contains(&text.to_lowercase().as_str()) {
        return None;
    }

    let (last_modified, size_bytes, annotated_dir) =
        annotations.get(&href).cloned().unwrap_or((None, None, false));

    let is_directory = annotated_dir || href.ends_with('/');
    let name = if text.is_empty() {
        href.trim_end_matches('/').rsplit('/').next().unwrap_or(&href).to_string()
    } else {
        text.trim_end_matches('/').to_string()
    };

    Some(RawDirectoryEntry {
        name,
        href,
        is_directory,
        size_bytes,
        last_modified,
    })
}

fn listing_base(url: &str) -> Result<Url, ListingError> {
    let mut base = Url::parse(url).map_err(|source| ListingError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;

    // Relative hrefs resolve against the directory, not its parent
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    Ok(base)
}

fn parse_modified(value: &str) -> Option<NaiveDateTime> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, MODIFIED_FORMAT).ok()
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Fetches and parses listing pages through an [`HttpTransport`]
#[derive(Clone)]
pub struct DirlistingClient {
    transport: Arc<dyn HttpTransport>,
}

impl DirlistingClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Fetch and parse a listing, surfacing failures
    pub async fn fetch(&self, url: &str) -> Result<DirListing, ListingError> {
        let response = self.transport.get(url).await?;
        let listing = parse_dirlisting(&response.text(), url)?;

        debug!(url = %url, entries = listing.len(), "Fetched directory listing");
        Ok(listing)
    }

    /// Fetch a listing; on failure log and return an empty listing
    pub async fn get_dirlisting(&self, url: &str) -> DirListing {
        match self.fetch(url).await {
            Ok(listing) => listing,
            Err(e) => {
                error!(url = %url, error = %e, "Failed to fetch directory listing");
                DirListing {
                    url: url.to_string(),
                    entries: Vec::new(),
                }
            },
        }
    }
}
