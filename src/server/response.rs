use serde_json::Value;
use std::fmt;

/// Status codes the server produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    SwitchingProtocols,

    Success,
    Created,
    Accepted,
    NonAuthoritativeInformation,
    NoContent,
    ResetContent,
    PartialContent,

    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    RequestTimeout,

    InternalServerError,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            StatusCode::SwitchingProtocols => 101,
            StatusCode::Success => 200,
            StatusCode::Created => 201,
            StatusCode::Accepted => 202,
            StatusCode::NonAuthoritativeInformation => 203,
            StatusCode::NoContent => 204,
            StatusCode::ResetContent => 205,
            StatusCode::PartialContent => 206,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::RequestTimeout => 408,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Symbolic name, e.g. `METHOD_NOT_ALLOWED`.
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::SwitchingProtocols => "SWITCHING_PROTOCOLS",
            StatusCode::Success => "SUCCESS",
            StatusCode::Created => "CREATED",
            StatusCode::Accepted => "ACCEPTED",
            StatusCode::NonAuthoritativeInformation => "NON_AUTHORITATIVE_INFORMATION",
            StatusCode::NoContent => "NO_CONTENT",
            StatusCode::ResetContent => "RESET_CONTENT",
            StatusCode::PartialContent => "PARTIAL_CONTENT",
            StatusCode::BadRequest => "BAD_REQUEST",
            StatusCode::Unauthorized => "UNAUTHORIZED",
            StatusCode::Forbidden => "FORBIDDEN",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            StatusCode::RequestTimeout => "REQUEST_TIMEOUT",
            StatusCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Reason phrase: the name with underscores as spaces, title-cased.
    pub fn reason(self) -> String {
        self.name()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        let mut w = String::with_capacity(word.len());
                        w.push(first.to_ascii_uppercase());
                        w.extend(chars.map(|c| c.to_ascii_lowercase()));
                        w
                    }
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// A response waiting to be encoded.
///
/// The body is either raw bytes or a JSON value; when both are set the JSON
/// value wins, regardless of call order.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    json: Option<Value>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new(StatusCode::Success)
    }
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            json: None,
        }
    }

    /// Empty `200 Success`.
    pub fn ok() -> Self {
        Self::default()
    }

    /// `200 Success` with a JSON body and `Content-Type: application/json`.
    pub fn json(value: Value) -> Self {
        Self::default().with_json(value)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_json(mut self, value: Value) -> Self {
        self.json = Some(value);
        self.set_header("Content-Type", "application/json");
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        self.set_header(name, value);
        self
    }

    /// Insert or replace a header; names compare case-insensitively.
    pub fn set_header(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.headers.push((name.to_string(), value));
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn json_value(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.json {
            Some(v) => v.to_string().into_bytes(),
            None => self.body.clone(),
        }
    }

    /// Wire form: status line, headers, blank line, body.
    ///
    /// Nothing is added implicitly, not even `Content-Length`.
    pub fn encode(&self, version: &str) -> Vec<u8> {
        let body = self.body_bytes();
        let mut head = format!(
            "{version} {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        for (k, v) in &self.headers {
            head.push_str(k);
            head.push_str(": ");
            head.push_str(v);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reason_phrases_are_title_cased_names() {
        assert_eq!(StatusCode::Success.reason(), "Success");
        assert_eq!(StatusCode::NotFound.reason(), "Not Found");
        assert_eq!(StatusCode::MethodNotAllowed.reason(), "Method Not Allowed");
        assert_eq!(
            StatusCode::NonAuthoritativeInformation.reason(),
            "Non Authoritative Information"
        );
        assert_eq!(StatusCode::InternalServerError.to_string(), "500 Internal Server Error");
    }

    #[test]
    fn encodes_without_implicit_headers() {
        let bytes = HttpResponse::new(StatusCode::NotFound).encode("HTTP/1.1");
        assert_eq!(bytes, b"HTTP/1.1 404 Not Found\r\n\r\n");
    }

    #[test]
    fn encodes_headers_then_body() {
        let resp = HttpResponse::ok()
            .with_header("content-type", "text/plain")
            .with_header("content-length", 5)
            .with_body("hello");
        assert_eq!(
            resp.encode("HTTP/1.0"),
            b"HTTP/1.0 200 Success\r\ncontent-type: text/plain\r\ncontent-length: 5\r\n\r\nhello"
        );
    }

    #[test]
    fn json_takes_precedence_over_body() {
        let a = HttpResponse::ok().with_body("raw").with_json(json!({"id": 7}));
        let b = HttpResponse::ok().with_json(json!({"id": 7})).with_body("raw");
        assert_eq!(a.body_bytes(), br#"{"id":7}"#);
        assert_eq!(b.body_bytes(), br#"{"id":7}"#);
        assert_eq!(a.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut resp = HttpResponse::ok().with_header("Content-Type", "image/png");
        resp.set_header("content-type", "image/jpeg");
        assert_eq!(resp.headers().len(), 1);
        assert_eq!(resp.header("CONTENT-TYPE"), Some("image/jpeg"));
    }
}
