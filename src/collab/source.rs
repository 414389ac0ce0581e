use super::network::{NetworkReply, NetworkRequest};
use crate::models::{Chapter, Manga, MangaList, Page, SourceInfo};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Which source request a failed reply belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Latest,
    Search,
    Thumbnail,
    ChapterPages,
    Page,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::Latest => "latest",
            RequestKind::Search => "search",
            RequestKind::Thumbnail => "thumbnail",
            RequestKind::ChapterPages => "chapter_pages",
            RequestKind::Page => "page",
        })
    }
}

/// A per-site adapter: builds outbound requests and parses their replies.
pub trait Source: Send + Sync {
    fn info(&self) -> SourceInfo;

    fn id(&self) -> i64 {
        self.info().id
    }

    fn latest_request(&self, page: i64) -> anyhow::Result<NetworkRequest>;
    fn search_request(&self, query: &str) -> anyhow::Result<NetworkRequest>;
    fn thumbnail_request(&self, manga: &Manga) -> anyhow::Result<NetworkRequest>;
    fn chapter_pages_request(&self, chapter: &Chapter) -> anyhow::Result<NetworkRequest>;
    fn page_request(&self, page: &Page) -> anyhow::Result<NetworkRequest>;

    fn parse_latest(&self, reply: &NetworkReply) -> anyhow::Result<MangaList>;
    fn parse_search_results(&self, reply: &NetworkReply) -> anyhow::Result<MangaList>;
    fn parse_chapter_pages(&self, reply: &NetworkReply, chapter: &Chapter) -> anyhow::Result<Vec<Page>>;

    fn parse_thumbnail(&self, reply: &NetworkReply) -> anyhow::Result<Vec<u8>> {
        Ok(reply.body().to_vec())
    }

    fn parse_page(&self, reply: &NetworkReply, _page: Option<&Page>) -> anyhow::Result<Vec<u8>> {
        Ok(reply.body().to_vec())
    }

    /// Told about upstream failures other than cancellation.
    fn request_error(&self, kind: RequestKind, reply: &NetworkReply) {
        warn!(
            source = self.id(),
            request = %kind,
            url = %reply.url(),
            error = %reply.error(),
            "Source request failed"
        );
    }

    /// Icon bytes (PNG).
    fn icon(&self) -> Option<Vec<u8>> {
        None
    }
}

/// The set of installed sources.
pub trait SourceRegistry: Send + Sync {
    fn sources(&self) -> Vec<Arc<dyn Source>>;

    fn get_source(&self, id: i64) -> Option<Arc<dyn Source>> {
        self.sources().into_iter().find(|s| s.id() == id)
    }

    /// Store the user's filter choices; publishes `SourceFiltersUpdated`.
    fn update_source_filters(&self, source_id: i64, filters: Map<String, Value>) -> anyhow::Result<()>;
}
