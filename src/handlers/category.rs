use super::{json_reply, status, store_failed, Services};
use crate::collab::Library;
use crate::dispatcher::{Handler, HandlerResponse};
use crate::models::Category;
use crate::router::{HandlerGroup, RouteDef};
use crate::server::{HttpRequest, HttpResponse, StatusCode};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// `/api/category`: user-defined groupings of library manga.
pub struct CategoryHandler {
    library: Arc<dyn Library>,
}

enum Membership {
    Add,
    Remove,
}

impl CategoryHandler {
    pub fn new(services: &Services) -> Self {
        Self {
            library: Arc::clone(&services.library),
        }
    }

    fn category(&self, req: &HttpRequest, param: &str) -> anyhow::Result<Option<Category>> {
        self.library.get_category_by_id(req.int_param(param)?)
    }

    fn get_categories(&self, _req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        Ok(json_reply(&self.library.get_categories()?)?.into())
    }

    fn create_category(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let name = req.str_param("name")?;
        Ok(match self.library.create_category(name) {
            Ok(category) => json_reply(&category)?,
            Err(e) => store_failed("create_category", &e),
        }
        .into())
    }

    fn delete_category(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(category) = self.category(&req, "id")? else {
            return status(StatusCode::NotFound);
        };
        Ok(match self.library.delete_category(&category) {
            Ok(()) => HttpResponse::ok(),
            Err(e) => store_failed("delete_category", &e),
        }
        .into())
    }

    fn get_category_mangas(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let Some(category) = self.category(&req, "id")? else {
            return status(StatusCode::NotFound);
        };
        Ok(json_reply(&self.library.get_category_mangas(&category)?)?.into())
    }

    fn add_manga(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        self.update_membership(&req, Membership::Add)
    }

    fn remove_manga(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        self.update_membership(&req, Membership::Remove)
    }

    fn update_membership(&self, req: &HttpRequest, change: Membership) -> anyhow::Result<HandlerResponse> {
        let Some(category) = self.category(req, "category_id")? else {
            return status(StatusCode::NotFound);
        };
        let Some(manga) = self.library.get_manga_by_id(req.int_param("manga_id")?)? else {
            return status(StatusCode::NotFound);
        };
        if !manga.library {
            debug!(manga = manga.id, category = category.id, "Manga is not in the library");
            return status(StatusCode::BadRequest);
        }
        let result = match change {
            Membership::Add => self.library.add_manga_to_category(&manga, &category),
            Membership::Remove => self.library.remove_manga_from_category(&manga, &category),
        };
        Ok(match result {
            Ok(()) => HttpResponse::ok(),
            Err(e) => store_failed("update_category_membership", &e),
        }
        .into())
    }
}

impl HandlerGroup for CategoryHandler {
    fn base_path(&self) -> &str {
        "/api/category"
    }

    fn routes(self: Rc<Self>) -> Vec<RouteDef> {
        vec![
            RouteDef::get("/", Handler::bind("get_categories", &self, Self::get_categories)),
            RouteDef::post("/create/<name>/", Handler::bind("create_category", &self, Self::create_category)),
            RouteDef::delete("/<id:int>/", Handler::bind("delete_category", &self, Self::delete_category)),
            RouteDef::get(
                "/<id:int>/mangas",
                Handler::bind("get_category_mangas", &self, Self::get_category_mangas),
            ),
            RouteDef::post(
                "/<category_id:int>/manga/<manga_id:int>/",
                Handler::bind("add_manga_to_category", &self, Self::add_manga),
            ),
            RouteDef::delete(
                "/<category_id:int>/manga/<manga_id:int>/",
                Handler::bind("remove_manga_from_category", &self, Self::remove_manga),
            ),
        ]
    }
}
