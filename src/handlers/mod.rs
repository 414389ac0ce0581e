//! # Handlers Module
//!
//! The HTTP API as a set of handler groups, each an explicit registration
//! table mounted under its base path:
//!
//! | Group | Base path |
//! |-------|-----------|
//! | [`LibraryHandler`] | `/api/library` |
//! | [`CategoryHandler`] | `/api/category` |
//! | [`SourceHandler`] | `/api/sources` |
//! | [`MangaHandler`] | `/api/manga` |
//! | [`ChapterHandler`] | `/api/chapter` |
//! | [`EventsHandler`] | `/api/events` |
//! | [`WebHandler`] | (none) |
//!
//! Mount order matters: the web group's `/<file>` catch-all comes last.
//!
//! Handlers run on the reactor thread and must not block. Anything that
//! goes upstream is issued through [`Network`] and answered from a
//! continuation once the reply arrives.

mod category;
mod chapter;
mod events;
mod library;
mod manga;
mod sources;
mod web;

pub use category::CategoryHandler;
pub use chapter::ChapterHandler;
pub use events::EventsHandler;
pub use library::LibraryHandler;
pub use manga::MangaHandler;
pub use sources::SourceHandler;
pub use web::{WebContext, WebHandler};

use crate::collab::{
    Downloader, Library, Network, NetworkReply, ReplyError, RequestKind, Source, SourceRegistry,
    Updater,
};
use crate::dispatcher::HandlerResponse;
use crate::events::EventBus;
use crate::router::{PatternError, Router};
use crate::server::{HttpResponse, StatusCode};
use crate::static_files;
use serde::Serialize;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// The collaborators the handler groups are built over.
#[derive(Clone)]
pub struct Services {
    pub library: Arc<dyn Library>,
    pub sources: Arc<dyn SourceRegistry>,
    pub network: Arc<dyn Network>,
    pub updater: Arc<dyn Updater>,
    pub downloader: Arc<dyn Downloader>,
    pub bus: EventBus,
}

/// Compose every handler group into one router.
pub fn build_router(services: &Services, web: &WebContext) -> Result<Router, PatternError> {
    let mut router = Router::new();
    router.mount(Rc::new(LibraryHandler::new(services)))?;
    router.mount(Rc::new(CategoryHandler::new(services)))?;
    router.mount(Rc::new(SourceHandler::new(services)))?;
    router.mount(Rc::new(MangaHandler::new(services)))?;
    router.mount(Rc::new(ChapterHandler::new(services)))?;
    router.mount(Rc::new(EventsHandler::new(services)))?;
    router.mount(Rc::new(WebHandler::new(web.clone())))?;
    Ok(router)
}

pub(crate) fn status(code: StatusCode) -> anyhow::Result<HandlerResponse> {
    Ok(HttpResponse::new(code).into())
}

pub(crate) fn json_reply<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<HttpResponse> {
    Ok(HttpResponse::json(serde_json::to_value(value)?))
}

/// Log a failed store mutation and answer 500.
pub(crate) fn store_failed(operation: &str, err: &anyhow::Error) -> HttpResponse {
    warn!(operation, error = %format!("{err:#}"), "Store operation failed");
    HttpResponse::new(StatusCode::InternalServerError)
}

/// The 500 for a failed upstream reply, or `None` when the reply is usable.
///
/// Cancellations are expected (the client navigated away) and are not
/// reported to the source.
pub(crate) fn upstream_failure(
    source: Option<&dyn Source>,
    kind: RequestKind,
    reply: &NetworkReply,
) -> Option<HttpResponse> {
    match reply.error() {
        ReplyError::None => return None,
        ReplyError::Cancelled => {
            debug!(request = %kind, url = %reply.url(), "Upstream request cancelled");
        }
        ReplyError::Other(message) => {
            warn!(request = %kind, url = %reply.url(), error = %message, "Upstream request failed");
            if let Some(source) = source {
                source.request_error(kind, reply);
            }
        }
    }
    Some(HttpResponse::new(StatusCode::InternalServerError))
}

const HOP_BY_HOP: [&str; 4] = ["transfer-encoding", "connection", "keep-alive", "content-length"];

/// Pass image bytes through with the upstream headers.
///
/// Local files carry no headers, so their type is guessed from the
/// extension.
pub(crate) fn image_reply(reply: &NetworkReply, data: Vec<u8>) -> HttpResponse {
    let mut response = reply
        .headers()
        .iter()
        .filter(|(k, _)| !HOP_BY_HOP.iter().any(|h| k.eq_ignore_ascii_case(h)))
        .fold(HttpResponse::ok(), |r, (k, v)| r.with_header(k, v));
    let content_type = match reply.header("content-type") {
        Some(ct) => ct.to_string(),
        None => static_files::content_type(Path::new(reply.url().path())).to_string(),
    };
    response.set_header("Content-Type", content_type);
    response.set_header("Content-Length", data.len());
    response.with_body(data)
}


#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn composition_order_puts_the_catch_all_last() {
        let dir = tempfile::tempdir().unwrap();
        let fx = testing::fixture_with(testing::CannedNetwork::default(), dir.path());
        let router = build_router(&fx.services, &WebContext::default()).unwrap();
        let templates: Vec<_> = router.routes().iter().map(|r| r.template()).collect();
        assert_eq!(templates.first(), Some(&"/api/library/"));
        assert_eq!(templates.last(), Some(&"/assets/<file>"));
        let lib = templates.iter().position(|t| t.starts_with("/api/library")).unwrap();
        let cat = templates.iter().position(|t| t.starts_with("/api/category")).unwrap();
        let src = templates.iter().position(|t| t.starts_with("/api/sources")).unwrap();
        let events = templates.iter().position(|t| t.starts_with("/api/events")).unwrap();
        assert!(lib < cat && cat < src && src < events);
    }

    #[test]
    fn image_reply_drops_hop_by_hop_headers() {
        let url = Url::parse("https://img.example.org/a.webp").unwrap();
        let reply = NetworkReply::ok(url, b"abc".to_vec())
            .with_header("Transfer-Encoding", "chunked")
            .with_header("Cache-Control", "max-age=60");
        let response = image_reply(&reply, b"abc".to_vec());
        assert_eq!(response.header("transfer-encoding"), None);
        assert_eq!(response.header("cache-control"), Some("max-age=60"));
        assert_eq!(response.header("content-type"), Some("image/webp"));
        assert_eq!(response.header("content-length"), Some("3"));
    }

    #[test]
    fn cancelled_upstream_is_500_without_source_notification() {
        let url = Url::parse("https://img.example.org/a.png").unwrap();
        let response = upstream_failure(None, RequestKind::Page, &NetworkReply::cancelled(url.clone()));
        assert_eq!(response.map(|r| r.status), Some(StatusCode::InternalServerError));
        assert!(upstream_failure(None, RequestKind::Page, &NetworkReply::ok(url, Vec::new())).is_none());
    }
}
