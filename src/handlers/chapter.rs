use super::{image_reply, json_reply, status, store_failed, upstream_failure, Services};
use crate::collab::{
    Downloader, Library, Network, NetworkRequest, Priority, RequestKind, Source, SourceRegistry,
};
use crate::dispatcher::{DeferredResponse, Handler, HandlerResponse};
use crate::models::{Chapter, Page};
use crate::router::{HandlerGroup, RouteDef};
use crate::server::{HttpRequest, HttpResponse, StatusCode};
use serde_json::json;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// `/api/chapter`: read status and page delivery.
pub struct ChapterHandler {
    library: Arc<dyn Library>,
    sources: Arc<dyn SourceRegistry>,
    network: Arc<dyn Network>,
    downloader: Arc<dyn Downloader>,
}

impl ChapterHandler {
    pub fn new(services: &Services) -> Self {
        Self {
            library: Arc::clone(&services.library),
            sources: Arc::clone(&services.sources),
            network: Arc::clone(&services.network),
            downloader: Arc::clone(&services.downloader),
        }
    }

    fn chapter(&self, req: &HttpRequest) -> anyhow::Result<Option<Chapter>> {
        self.library.get_chapter_by_id(req.int_param("id")?)
    }

    fn source_of(&self, chapter: &Chapter) -> anyhow::Result<Option<Arc<dyn Source>>> {
        Ok(self
            .library
            .get_manga_by_id(chapter.manga)?
            .and_then(|manga| manga.source)
            .and_then(|id| self.sources.get_source(id)))
    }

    fn get_chapter(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        match self.chapter(&req)? {
            Some(chapter) => Ok(json_reply(&chapter)?.into()),
            None => status(StatusCode::NotFound),
        }
    }

    fn mark_read(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        self.mark(&req, true)
    }

    fn mark_unread(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        self.mark(&req, false)
    }

    /// 200 only when the stored chapter ends up with the requested status.
    fn mark(&self, req: &HttpRequest, read: bool) -> anyhow::Result<HandlerResponse> {
        let Some(chapter) = self.chapter(req)? else {
            debug!(read, "Read status change for unknown chapter");
            return status(StatusCode::InternalServerError);
        };
        if let Err(e) = self.library.mark_chapters_read_status(std::slice::from_ref(&chapter), read) {
            return Ok(store_failed("mark_chapters_read_status", &e).into());
        }
        match self.library.get_chapter_by_id(chapter.id)? {
            Some(updated) if updated.read == read => status(StatusCode::Success),
            _ => {
                warn!(chapter = chapter.id, read, "Read status did not change");
                status(StatusCode::InternalServerError)
            }
        }
    }

    fn get_pages(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(chapter) = self.chapter(&req)? else {
            return status(StatusCode::NotFound);
        };

        if chapter.downloaded {
            let dir = self.downloader.chapter_dir(&chapter);
            let pages = std::fs::read_dir(&dir)?
                .filter_map(Result::ok)
                .filter(|entry| entry.path().is_file())
                .count();
            return Ok(HttpResponse::json(json!({ "pages": pages })).into());
        }

        let Some(source) = self.source_of(&chapter)? else {
            debug!(chapter = chapter.id, "No source for chapter pages");
            return status(StatusCode::NotFound);
        };
        let request = source
            .chapter_pages_request(&chapter)?
            .with_priority(Priority::High);
        let pending = self.network.handle_request(request);
        let library = Arc::clone(&self.library);

        Ok(DeferredResponse::new(req, pending, move |_req, reply| {
            if let Some(failed) = upstream_failure(Some(source.as_ref()), RequestKind::ChapterPages, &reply) {
                return Ok(failed);
            }
            let pages = source.parse_chapter_pages(&reply, &chapter)?;
            if let Err(e) = library.set_chapter_pages(&chapter, &pages) {
                return Ok(store_failed("set_chapter_pages", &e));
            }
            debug!(chapter = chapter.id, pages = pages.len(), "Page table stored");
            Ok(HttpResponse::json(json!({ "pages": pages.len() })))
        })
        .into())
    }

    fn get_page(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(chapter) = self.chapter(&req)? else {
            return status(StatusCode::NotFound);
        };
        let index = req.int_param("index")?;

        let (request, source, page) = if chapter.downloaded {
            let path = self.downloader.chapter_dir(&chapter).join(format!("{index}.png"));
            (NetworkRequest::local_file(&path)?, None, None)
        } else {
            let Some(url) = self.library.chapter_page_url(&chapter, index)? else {
                debug!(chapter = chapter.id, index, "No stored url for page");
                return status(StatusCode::NotFound);
            };
            let Some(source) = self.source_of(&chapter)? else {
                debug!(chapter = chapter.id, "No source for page");
                return status(StatusCode::NotFound);
            };
            let page = Page { number: index, url };
            (source.page_request(&page)?, Some(source), Some(page))
        };

        let pending = self.network.handle_request(request.with_priority(Priority::High));
        Ok(DeferredResponse::new(req, pending, move |_req, reply| {
            if let Some(failed) = upstream_failure(source.as_deref(), RequestKind::Page, &reply) {
                return Ok(failed);
            }
            let data = match &source {
                Some(source) => source.parse_page(&reply, page.as_ref())?,
                None => reply.body().to_vec(),
            };
            Ok(image_reply(&reply, data))
        })
        .into())
    }
}

impl HandlerGroup for ChapterHandler {
    fn base_path(&self) -> &str {
        "/api/chapter"
    }

    fn routes(self: Rc<Self>) -> Vec<RouteDef> {
        vec![
            RouteDef::get("/<id:int>", Handler::bind("get_chapter", &self, Self::get_chapter)),
            RouteDef::post("/<id:int>/read", Handler::bind("mark_chapter_read", &self, Self::mark_read)),
            RouteDef::post("/<id:int>/unread", Handler::bind("mark_chapter_unread", &self, Self::mark_unread)),
            RouteDef::get("/<id:int>/pages", Handler::bind("get_chapter_pages", &self, Self::get_pages)),
            RouteDef::get("/<id:int>/page/<index:int>", Handler::bind("get_page", &self, Self::get_page)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{call, chapter, fixture_with, manga, CannedNetwork, Fixture};
    use super::*;
    use crate::collab::{DirectorySource, MemorySources};
    use crate::models::{Manga, SourceInfo};
    use crate::router::Router;

    fn setup(network: CannedNetwork) -> (tempfile::TempDir, Fixture, Router) {
        let dir = tempfile::tempdir().unwrap();
        let info = SourceInfo {
            id: 1,
            name: "Local".into(),
            base_url: "https://example.org".into(),
            rate_limit: None,
            has_filters: false,
            filters: Vec::new(),
            supports_latest: true,
            supports_search: true,
        };
        let fx = fixture_with(network, dir.path());
        let sources = MemorySources::new(fx.bus.clone())
            .with_source(Arc::new(DirectorySource::new(info, dir.path().join("source"))));
        let fx = fx.with_sources(sources);
        fx.library
            .insert_manga(Manga {
                source: Some(1),
                ..manga(1, true)
            })
            .unwrap();
        let mut router = Router::new();
        router.mount(Rc::new(ChapterHandler::new(&fx.services))).unwrap();
        (dir, fx, router)
    }

    #[tokio::test]
    async fn unknown_chapter_is_404() {
        let (_dir, _fx, router) = setup(CannedNetwork::default());
        let response = call(&router, "GET /api/chapter/77 HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status, StatusCode::NotFound);
    }

    #[tokio::test]
    async fn read_then_unread() {
        let (_dir, fx, router) = setup(CannedNetwork::default());
        fx.library.insert_chapter(chapter(5, 1, 1)).unwrap();

        let read = call(&router, "POST /api/chapter/5/read HTTP/1.1\r\n\r\n").await;
        assert_eq!(read.status, StatusCode::Success);
        assert!(fx.library.get_chapter_by_id(5).unwrap().unwrap().read);

        let unread = call(&router, "POST /api/chapter/5/unread HTTP/1.1\r\n\r\n").await;
        assert_eq!(unread.status, StatusCode::Success);
        assert!(!fx.library.get_chapter_by_id(5).unwrap().unwrap().read);

        let unknown = call(&router, "POST /api/chapter/6/read HTTP/1.1\r\n\r\n").await;
        assert_eq!(unknown.status, StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn downloaded_pages_are_counted_on_disk() {
        let (dir, fx, router) = setup(CannedNetwork::default());
        fx.library
            .insert_chapter(Chapter {
                downloaded: true,
                ..chapter(8, 1, 1)
            })
            .unwrap();
        let chapter_dir = dir.path().join("1").join("8");
        std::fs::create_dir_all(&chapter_dir).unwrap();
        for i in 0..3 {
            std::fs::write(chapter_dir.join(format!("{i}.png")), b"p").unwrap();
        }

        let response = call(&router, "GET /api/chapter/8/pages HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.json_value(), Some(&json!({"pages": 3})));
        assert!(fx.network.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetched_page_table_is_stored() {
        let body = serde_json::to_vec(&json!([
            {"number": 1, "url": "https://img.example.org/b.png"},
            {"number": 0, "url": "https://img.example.org/a.png"}
        ]))
        .unwrap();
        let (_dir, fx, router) = setup(CannedNetwork {
            body,
            ..CannedNetwork::default()
        });
        fx.library.insert_chapter(chapter(9, 1, 1)).unwrap();

        let response = call(&router, "GET /api/chapter/9/pages HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.json_value(), Some(&json!({"pages": 2})));
        assert_eq!(fx.network.seen.lock().unwrap()[0].priority, Priority::High);

        let stored = fx.library.get_chapter_by_id(9).unwrap().unwrap();
        assert_eq!(
            fx.library.chapter_page_url(&stored, 0).unwrap().as_deref(),
            Some("https://img.example.org/a.png")
        );
    }

    #[tokio::test]
    async fn page_without_stored_url_is_404() {
        let (_dir, fx, router) = setup(CannedNetwork::default());
        fx.library.insert_chapter(chapter(10, 1, 1)).unwrap();
        let response = call(&router, "GET /api/chapter/10/page/0 HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status, StatusCode::NotFound);
    }

    #[tokio::test]
    async fn stored_page_is_fetched_at_high_priority() {
        let (_dir, fx, router) = setup(CannedNetwork {
            body: b"img".to_vec(),
            ..CannedNetwork::default()
        });
        let chapter = chapter(11, 1, 1);
        fx.library.insert_chapter(chapter.clone()).unwrap();
        fx.library
            .set_chapter_pages(
                &chapter,
                &[Page {
                    number: 0,
                    url: "https://img.example.org/p0.png".into(),
                }],
            )
            .unwrap();

        let response = call(&router, "GET /api/chapter/11/page/0 HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status, StatusCode::Success);
        assert_eq!(response.body_bytes(), b"img");
        let seen = fx.network.seen.lock().unwrap();
        assert_eq!(seen[0].url.as_str(), "https://img.example.org/p0.png");
        assert_eq!(seen[0].priority, Priority::High);
    }
}
