use super::{image_reply, json_reply, status, upstream_failure, Services};
use crate::collab::{
    Downloader, Library, Network, NetworkRequest, Priority, RequestKind, Source, SourceRegistry,
    Updater,
};
use crate::dispatcher::{DeferredResponse, Handler, HandlerResponse};
use crate::events::{AppEvent, EventBus};
use crate::models::Manga;
use crate::router::{HandlerGroup, RouteDef};
use crate::server::{HttpRequest, StatusCode};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// `/api/manga`: details, chapter lists, refresh and thumbnails.
pub struct MangaHandler {
    library: Arc<dyn Library>,
    sources: Arc<dyn SourceRegistry>,
    network: Arc<dyn Network>,
    updater: Arc<dyn Updater>,
    downloader: Arc<dyn Downloader>,
    bus: EventBus,
}

impl MangaHandler {
    pub fn new(services: &Services) -> Self {
        Self {
            library: Arc::clone(&services.library),
            sources: Arc::clone(&services.sources),
            network: Arc::clone(&services.network),
            updater: Arc::clone(&services.updater),
            downloader: Arc::clone(&services.downloader),
            bus: services.bus.clone(),
        }
    }

    fn manga(&self, req: &HttpRequest) -> anyhow::Result<Option<Manga>> {
        self.library.get_manga_by_id(req.int_param("id")?)
    }

    fn source_of(&self, manga: &Manga) -> Option<Arc<dyn Source>> {
        manga.source.and_then(|id| self.sources.get_source(id))
    }

    fn get_manga(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        match self.manga(&req)? {
            Some(manga) => Ok(json_reply(&manga)?.into()),
            None => status(StatusCode::NotFound),
        }
    }

    fn get_chapters(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(manga) = self.manga(&req)? else {
            return status(StatusCode::NotFound);
        };
        let mut chapters = self.library.get_chapters(&manga)?;
        chapters.sort_by_key(|c| c.number);
        Ok(json_reply(&chapters)?.into())
    }

    fn update_manga(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(manga) = self.manga(&req)? else {
            return status(StatusCode::NotFound);
        };
        let details = self.updater.update_manga_details(&manga);
        let chapters = self.updater.update_manga_chapters(&manga);
        debug!(manga = manga.id, details, chapters, "Manga update finished");
        if !details && !chapters {
            warn!(manga = manga.id, "Manga update failed");
            return status(StatusCode::InternalServerError);
        }

        let current = self.library.get_manga_by_id(manga.id)?.unwrap_or(manga);
        if details {
            self.bus.publish(AppEvent::MangaDetailsUpdated(current.clone()));
        }
        if chapters {
            self.bus.publish(AppEvent::ChapterListUpdated(current));
        }
        status(StatusCode::Success)
    }

    fn get_thumbnail(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(manga) = self.manga(&req)? else {
            return status(StatusCode::NotFound);
        };
        let source = self.source_of(&manga);
        let local = self.downloader.manga_dir(&manga).join("thumbnail.png");

        let request = if manga.library && local.is_file() {
            NetworkRequest::local_file(&local)?
        } else {
            match &source {
                Some(source) => source.thumbnail_request(&manga)?,
                None => {
                    debug!(manga = manga.id, "No source to fetch the thumbnail from");
                    return status(StatusCode::NotFound);
                }
            }
        };

        let pending = self.network.handle_request(request.with_priority(Priority::Low));
        Ok(DeferredResponse::new(req, pending, move |_req, reply| {
            if let Some(failed) = upstream_failure(source.as_deref(), RequestKind::Thumbnail, &reply) {
                return Ok(failed);
            }
            let data = match &source {
                Some(source) if !reply.is_local_file() => source.parse_thumbnail(&reply)?,
                _ => reply.body().to_vec(),
            };
            Ok(image_reply(&reply, data))
        })
        .into())
    }
}

impl HandlerGroup for MangaHandler {
    fn base_path(&self) -> &str {
        "/api/manga"
    }

    fn routes(self: Rc<Self>) -> Vec<RouteDef> {
        vec![
            RouteDef::get("/<id:int>", Handler::bind("get_manga", &self, Self::get_manga)),
            RouteDef::get("/<id:int>/chapters", Handler::bind("get_chapters", &self, Self::get_chapters)),
            RouteDef::post("/<id:int>/update", Handler::bind("update_manga", &self, Self::update_manga)),
            RouteDef::get("/<id:int>/thumbnail", Handler::bind("get_thumbnail", &self, Self::get_thumbnail)),
        ]
    }
}
