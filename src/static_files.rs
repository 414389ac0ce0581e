//! Files for the bundled web client.

use minijinja::Environment;
use serde_json::Value as JsonValue;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// A directory of static files; `.html` files can be rendered as templates.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

/// MIME type guessed from the file extension.
pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "map" => "application/json",
        "txt" => "text/plain",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a request path under the base directory. Anything that is not
    /// a plain component (`..`, a root, a prefix) is refused.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    /// Read a file, rendering `.html` with `ctx` when one is given.
    pub fn load(&self, url_path: &str, ctx: Option<&JsonValue>) -> io::Result<(Vec<u8>, &'static str)> {
        let path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        if !path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        }
        let ct = content_type(&path);
        if ct == "text/html" {
            if let Some(ctx_val) = ctx {
                let source = fs::read_to_string(&path)?;
                let mut env = Environment::new();
                env.add_template("page", &source).map_err(io::Error::other)?;
                let rendered = env
                    .get_template("page")
                    .and_then(|tmpl| tmpl.render(ctx_val))
                    .map_err(io::Error::other)?;
                return Ok((rendered.into_bytes(), ct));
            }
        }
        Ok((fs::read(&path)?, ct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), "Hello\n").unwrap();
        fs::write(
            dir.path().join("index.html"),
            "<script>const ws = {{ ws_port }};</script>",
        )
        .unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets").join("app.js"), "run()").unwrap();
        dir
    }

    #[test]
    fn test_map_path_prevents_traversal() {
        let sf = StaticFiles::new("/srv/web");
        assert!(sf.map_path("../Cargo.toml").is_none());
        assert!(sf.map_path("assets/../../etc/passwd").is_none());
        assert!(sf.map_path("/etc/passwd").is_some_and(|p| p.starts_with("/srv/web")));
    }

    #[test]
    fn test_load_plain_and_nested_files() {
        let dir = site();
        let sf = StaticFiles::new(dir.path());
        let (bytes, ct) = sf.load("hello.txt", None).unwrap();
        assert_eq!(ct, "text/plain");
        assert_eq!(bytes, b"Hello\n");

        let (bytes, ct) = sf.load("assets/app.js", None).unwrap();
        assert_eq!(ct, "application/javascript");
        assert_eq!(bytes, b"run()");

        let err = sf.load("missing.css", None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(sf.load("assets", None).is_err());
    }

    #[test]
    fn test_render_html_with_ports() {
        let dir = site();
        let sf = StaticFiles::new(dir.path());
        let ctx = json!({ "http_port": 6969, "ws_port": 42069 });
        let (bytes, ct) = sf.load("index.html", Some(&ctx)).unwrap();
        assert_eq!(ct, "text/html");
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "<script>const ws = 42069;</script>"
        );
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("a/0.PNG")), "image/png");
        assert_eq!(content_type(Path::new("cover.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("noext")), "application/octet-stream");
    }
}
