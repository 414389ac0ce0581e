//! Domain projections as they appear on the wire.
//!
//! The store and the sources own the real entities; these are the flat
//! JSON shapes the web client reads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manga {
    pub id: i64,
    /// Owning source id; `None` for orphaned entries.
    pub source: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub thumbnail: String,
    pub library: bool,
    pub initialized: bool,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub number: i64,
    /// Manga id.
    pub manga: i64,
    pub title: String,
    /// Upload time, unix seconds.
    pub uploaded: i64,
    pub downloaded: bool,
    pub read: bool,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub rate: u32,
    pub per: u32,
    pub unit: String,
}

/// One filter a source understands. The fields besides `key` are source
/// defined (`type`, `value`, options...) and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFilter {
    pub key: String,
    #[serde(flatten)]
    pub spec: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub rate_limit: Option<RateLimit>,
    pub has_filters: bool,
    pub filters: Vec<SourceFilter>,
    pub supports_latest: bool,
    pub supports_search: bool,
}

/// A listing entry as scraped from a source, before it has a library id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangaEntry {
    pub title: String,
    pub url: String,
    pub thumbnail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MangaList {
    pub mangas: Vec<MangaEntry>,
    pub has_next_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: i64,
    pub url: String,
}
