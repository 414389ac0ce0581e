use super::{json_reply, status, store_failed, upstream_failure, Services};
use crate::collab::{
    Library, Network, NetworkReply, NetworkRequest, Priority, RequestKind, Source, SourceRegistry,
};
use crate::dispatcher::{DeferredResponse, Handler, HandlerResponse};
use crate::models::{Manga, MangaList, SourceInfo};
use crate::router::{HandlerGroup, RouteDef};
use crate::server::{HttpRequest, HttpResponse, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

#[derive(Serialize)]
struct Listing {
    mangas: Vec<Manga>,
    has_next_page: bool,
}

/// `/api/sources`: installed sources, their listings and filters.
pub struct SourceHandler {
    library: Arc<dyn Library>,
    sources: Arc<dyn SourceRegistry>,
    network: Arc<dyn Network>,
}

impl SourceHandler {
    pub fn new(services: &Services) -> Self {
        Self {
            library: Arc::clone(&services.library),
            sources: Arc::clone(&services.sources),
            network: Arc::clone(&services.network),
        }
    }

    fn source(&self, req: &HttpRequest) -> anyhow::Result<Option<Arc<dyn Source>>> {
        Ok(self.sources.get_source(req.int_param("id")?))
    }

    fn get_sources(&self, _req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let infos: Vec<SourceInfo> = self.sources.sources().iter().map(|s| s.info()).collect();
        Ok(json_reply(&infos)?.into())
    }

    fn get_icon(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(icon) = self.source(&req)?.and_then(|s| s.icon()) else {
            return status(StatusCode::NotFound);
        };
        Ok(HttpResponse::ok()
            .with_header("Content-Type", "image/png")
            .with_header("Content-Length", icon.len())
            .with_body(icon)
            .into())
    }

    fn get_latest(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(source) = self.source(&req)? else {
            return status(StatusCode::NotFound);
        };
        let request = source.latest_request(req.int_param("page")?)?;
        self.listing(req, source, request, RequestKind::Latest)
    }

    fn get_search(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(source) = self.source(&req)? else {
            return status(StatusCode::NotFound);
        };
        let request = source.search_request(req.str_param("name")?)?;
        self.listing(req, source, request, RequestKind::Search)
    }

    /// Fetch a listing page, store new entries and answer with the stored manga.
    fn listing(
        &self,
        req: HttpRequest,
        source: Arc<dyn Source>,
        request: NetworkRequest,
        kind: RequestKind,
    ) -> anyhow::Result<HandlerResponse> {
        let pending = self.network.handle_request(request.with_priority(Priority::High));
        let library = Arc::clone(&self.library);
        Ok(DeferredResponse::new(req, pending, move |_req, reply| {
            if let Some(failed) = upstream_failure(Some(source.as_ref()), kind, &reply) {
                return Ok(failed);
            }
            let list = parse_listing(source.as_ref(), kind, &reply)?;
            let mangas = match library.add_and_get_mangas(source.id(), &list.mangas) {
                Ok(mangas) => mangas,
                Err(e) => return Ok(store_failed("add_and_get_mangas", &e)),
            };
            debug!(source = source.id(), request = %kind, count = mangas.len(), "Listing received");
            json_reply(&Listing {
                mangas,
                has_next_page: list.has_next_page,
            })
        })
        .into())
    }

    fn update_filters(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(source) = self.source(&req)? else {
            return status(StatusCode::NotFound);
        };
        let Some(Value::Array(submitted)) = req.json() else {
            debug!(source = source.id(), "Filter body is not a JSON array");
            return status(StatusCode::BadRequest);
        };
        let filters = accepted_filters(&submitted);
        Ok(match self.sources.update_source_filters(source.id(), filters) {
            Ok(()) => HttpResponse::ok(),
            Err(e) => store_failed("update_source_filters", &e),
        }
        .into())
    }
}

fn parse_listing(source: &dyn Source, kind: RequestKind, reply: &NetworkReply) -> anyhow::Result<MangaList> {
    match kind {
        RequestKind::Search => source.parse_search_results(reply),
        _ => source.parse_latest(reply),
    }
}

/// Keep `LIST` filters whose value is a list of strings and `CHECKBOX`
/// filters as given. Anything else is dropped.
fn accepted_filters(submitted: &[Value]) -> Map<String, Value> {
    submitted
        .iter()
        .filter_map(|filter| {
            let key = filter.get("key")?.as_str()?;
            let value = filter.get("value")?;
            let accepted = match filter.get("type")?.as_str()? {
                "LIST" => value
                    .as_array()
                    .is_some_and(|values| values.iter().all(Value::is_string)),
                "CHECKBOX" => true,
                _ => false,
            };
            accepted.then(|| (key.to_string(), value.clone()))
        })
        .collect()
}

impl HandlerGroup for SourceHandler {
    fn base_path(&self) -> &str {
        "/api/sources"
    }

    fn routes(self: Rc<Self>) -> Vec<RouteDef> {
        vec![
            RouteDef::get("/", Handler::bind("get_sources", &self, Self::get_sources)),
            RouteDef::get("/<id:int>/icon", Handler::bind("get_source_icon", &self, Self::get_icon)),
            RouteDef::get("/<id:int>/latest/<page:int>/", Handler::bind("get_latest", &self, Self::get_latest)),
            RouteDef::get("/<id:int>/search/<name>/", Handler::bind("get_search", &self, Self::get_search)),
            RouteDef::post("/<id:int>/filters", Handler::bind("update_source_filters", &self, Self::update_filters)),
        ]
    }
}
