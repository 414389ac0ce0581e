use crate::dispatcher::{Handler, HandlerResponse};
use crate::router::{HandlerGroup, RouteDef};
use crate::server::{HttpRequest, HttpResponse, StatusCode};
use crate::static_files::StaticFiles;
use serde_json::json;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, warn};

/// What the bundled web client needs to know about this server.
#[derive(Debug, Clone, Default)]
pub struct WebContext {
    /// Directory holding `index.html` and `assets/`. `None` serves nothing.
    pub static_dir: Option<PathBuf>,
    pub http_port: u16,
    pub ws_port: u16,
}

/// The web client: `index.html` rendered with the ports, plus static files.
pub struct WebHandler {
    files: Option<StaticFiles>,
    context: serde_json::Value,
}

impl WebHandler {
    pub fn new(web: WebContext) -> Self {
        Self {
            files: web.static_dir.map(StaticFiles::new),
            context: json!({ "http_port": web.http_port, "ws_port": web.ws_port }),
        }
    }

    fn index(&self, _req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        Ok(self.serve("index.html", Some(&self.context)).into())
    }

    fn file(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        Ok(self.serve(req.str_param("file")?, None).into())
    }

    fn asset(&self, req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let path = format!("assets/{}", req.str_param("file")?);
        Ok(self.serve(&path, None).into())
    }

    fn serve(&self, path: &str, ctx: Option<&serde_json::Value>) -> HttpResponse {
        let Some(files) = &self.files else {
            return HttpResponse::new(StatusCode::NotFound);
        };
        match files.load(path, ctx) {
            Ok((body, content_type)) => HttpResponse::ok()
                .with_header("Content-Type", content_type)
                .with_header("Content-Length", body.len())
                .with_body(body),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path, "Static file not found");
                HttpResponse::new(StatusCode::NotFound)
            }
            Err(e) => {
                warn!(path, error = %e, "Static file could not be served");
                HttpResponse::new(StatusCode::InternalServerError)
            }
        }
    }
}

impl HandlerGroup for WebHandler {
    fn base_path(&self) -> &str {
        ""
    }

    fn routes(self: Rc<Self>) -> Vec<RouteDef> {
        vec![
            RouteDef::get("/", Handler::bind("web_index", &self, Self::index)),
            RouteDef::get("/<file>", Handler::bind("web_file", &self, Self::file)),
            RouteDef::get("/assets/<file>", Handler::bind("web_asset", &self, Self::asset)),
        ]
    }
}
