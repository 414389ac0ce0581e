use super::{json_reply, status, store_failed, Services};
use crate::collab::Library;
use crate::dispatcher::{Handler, HandlerResponse};
use crate::router::{HandlerGroup, RouteDef};
use crate::server::{HttpRequest, HttpResponse, StatusCode};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// `/api/library`: the user's followed manga.
pub struct LibraryHandler {
    library: Arc<dyn Library>,
}

impl LibraryHandler {
    pub fn new(services: &Services) -> Self {
        Self {
            library: Arc::clone(&services.library),
        }
    }

    fn get_library(&self, _req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        Ok(json_reply(&self.library.get_library()?)?.into())
    }

    fn add_manga(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        self.set_library(&req, true)
    }

    fn remove_manga(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        self.set_library(&req, false)
    }

    fn set_library(&self, req: &HttpRequest, library: bool) -> anyhow::Result<HandlerResponse> {
        let id = req.int_param("id")?;
        let Some(manga) = self.library.get_manga_by_id(id)? else {
            return status(StatusCode::NotFound);
        };
        if manga.library == library {
            debug!(manga = id, library, "Library flag already set");
            return status(StatusCode::Success);
        }
        Ok(match self.library.set_library(&manga, library) {
            Ok(()) => HttpResponse::ok(),
            Err(e) => store_failed("set_library", &e),
        }
        .into())
    }
}

impl HandlerGroup for LibraryHandler {
    fn base_path(&self) -> &str {
        "/api/library"
    }

    fn routes(self: Rc<Self>) -> Vec<RouteDef> {
        vec![
            RouteDef::get("/", Handler::bind("get_library", &self, Self::get_library)),
            RouteDef::post("/<id:int>/", Handler::bind("add_manga_to_library", &self, Self::add_manga)),
            RouteDef::delete(
                "/<id:int>/",
                Handler::bind("remove_manga_from_library", &self, Self::remove_manga),
            ),
        ]
    }
}
