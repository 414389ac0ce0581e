use crate::router::{ParamError, PathParams};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Methods the router dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub const ALL: [Method; 4] = [Method::Get, Method::Post, Method::Put, Method::Delete];

    /// Case-insensitive match against the supported set.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::parse(s).ok_or_else(|| ParseError::UnsupportedMethod(s.to_string()))
    }
}

/// Why a raw request could not be parsed. Every variant is answered with 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    InvalidUtf8,
    MalformedRequestLine(String),
    UnsupportedMethod(String),
    InvalidTarget(String),
    InvalidVersion(String),
    MalformedHeader(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty request"),
            ParseError::InvalidUtf8 => f.write_str("request is not valid UTF-8"),
            ParseError::MalformedRequestLine(l) => write!(f, "malformed request line `{l}`"),
            ParseError::UnsupportedMethod(m) => write!(f, "unsupported method `{m}`"),
            ParseError::InvalidTarget(t) => write!(f, "invalid request target `{t}`"),
            ParseError::InvalidVersion(v) => write!(f, "invalid protocol version `{v}`"),
            ParseError::MalformedHeader(h) => write!(f, "malformed header line `{h}`"),
        }
    }
}

impl std::error::Error for ParseError {}

/// A parsed HTTP request.
///
/// Everything except the path parameters is fixed at parse time; the
/// dispatcher fills in [`HttpRequest::path_params`] once a route matched.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Numeric protocol version, e.g. `1.1`.
    pub version: f32,
    pub path: String,
    /// Header names keep the case they arrived with.
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub query_params: HashMap<String, Vec<String>>,
    path_params: PathParams,
}

impl HttpRequest {
    /// Parse one request from a single read.
    ///
    /// ```
    /// use yomu_server::server::{HttpRequest, Method};
    ///
    /// let req = HttpRequest::parse(b"get /api/library/?page=2 HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    /// assert_eq!(req.method, Method::Get);
    /// assert_eq!(req.path, "/api/library/");
    /// assert_eq!(req.query_first("page"), Some("2"));
    /// assert!(req.body.is_none());
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.is_empty() {
            return Err(ParseError::Empty);
        }
        let text = std::str::from_utf8(data).map_err(|_| ParseError::InvalidUtf8)?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::MalformedRequestLine(request_line.to_string()));
        };

        let method: Method = method.parse()?;
        let (path, query) = split_target(target)?;
        let version = parse_version(version)?;

        let mut headers = HashMap::new();
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| ParseError::MalformedHeader(line.to_string()))?;
            headers.insert(key.to_string(), value.to_string());
        }

        let body = lines.collect::<Vec<_>>().join("\n");
        let body = (!body.is_empty()).then_some(body);

        Ok(HttpRequest {
            method,
            version,
            path,
            headers,
            body,
            query_params: query.map(parse_query_params).unwrap_or_default(),
            path_params: PathParams::new(),
        })
    }

    /// `HTTP/<version>` for the response status line.
    pub fn version_string(&self) -> String {
        format!("HTTP/{:.1}", self.version)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_first(&self, key: &str) -> Option<&str> {
        self.query_params
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub fn set_path_params(&mut self, params: PathParams) {
        self.path_params = params;
    }

    pub fn int_param(&self, name: &str) -> Result<i64, ParamError> {
        self.path_params.int(name)
    }

    pub fn str_param(&self, name: &str) -> Result<&str, ParamError> {
        self.path_params.str(name)
    }

    /// Strict JSON decoding of the body; `None` when absent or invalid.
    pub fn json(&self) -> Option<Value> {
        self.json_as()
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> Option<T> {
        let body = self.body.as_deref()?;
        match serde_json::from_str(body) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(path = %self.path, error = %e, "Request body is not valid JSON");
                None
            }
        }
    }
}

/// Split a request target into path and raw query.
///
/// Origin-form (`/a?b`) is split by hand; absolute-form targets go through
/// the `url` crate.
fn split_target(target: &str) -> Result<(String, Option<&str>), ParseError> {
    if target.starts_with('/') {
        let target = target.split_once('#').map_or(target, |(t, _)| t);
        return Ok(match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query)),
            None => (target.to_string(), None),
        });
    }

    let url = url::Url::parse(target).map_err(|_| ParseError::InvalidTarget(target.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ParseError::InvalidTarget(target.to_string()));
    }
    let query = target
        .split_once('?')
        .map(|(_, q)| q.split_once('#').map_or(q, |(q, _)| q));
    Ok((url.path().to_string(), query))
}

fn parse_version(raw: &str) -> Result<f32, ParseError> {
    raw.strip_prefix("HTTP/")
        .and_then(|v| v.parse::<f32>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| ParseError::InvalidVersion(raw.to_string()))
}

/// Decode a query string into key -> values.
///
/// `+` decodes to a space, percent escapes are resolved and pairs with an
/// empty value are dropped.
pub fn parse_query_params(query: &str) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        if v.is_empty() {
            continue;
        }
        out.entry(k.into_owned()).or_default().push(v.into_owned());
    }
    out
}
