//! Route template compiler.
//!
//! Templates use angle-bracket placeholders: `<name>`, `<name:int>` and
//! `<name:float>`. Compilation produces an anchored regex with one capture
//! group per placeholder plus the ordered list of converters that turn each
//! capture into a typed [`PathValue`].
//!
//! ```text
//! /api/manga/<id:int>          ->  ^/api/manga/([0-9]+)/?$
//! /api/sources/<id:int>/search/<name>/
//!                              ->  ^/api/sources/([0-9]+)/search/([\w_.-]+)/?$
//! ```
//!
//! Literal text between placeholders is regex-escaped, and a single trailing
//! slash is always optional.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Maximum number of path parameters stored inline before spilling to the heap.
/// The deepest route in this server has two (`/<category_id>/manga/<manga_id>`).
pub const MAX_INLINE_PARAMS: usize = 4;

static PLACEHOLDER: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"<([a-zA-Z_]+):?([a-zA-Z]+)?>"));

/// Converter attached to a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Str,
}

impl ParamKind {
    /// Unknown type names fall back to `str`.
    pub fn from_type_name(name: Option<&str>) -> Self {
        match name {
            Some("int") => ParamKind::Int,
            Some("float") => ParamKind::Float,
            _ => ParamKind::Str,
        }
    }

    fn capture(self) -> &'static str {
        match self {
            ParamKind::Int => r"([0-9]+)",
            ParamKind::Float => r"([0-9]+\.[0-9]+)",
            ParamKind::Str => r"([\w_.-]+)",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Str => "str",
        }
    }

    /// Convert a captured group.
    ///
    /// The capture patterns only admit well-formed digits, so the one failure
    /// that can still happen is an integer too large for `i64`.
    pub fn convert(self, name: &str, raw: &str) -> Result<PathValue, ParamError> {
        let failed = || ParamError::Conversion {
            name: name.to_string(),
            value: raw.to_string(),
            kind: self,
        };
        match self {
            ParamKind::Int => raw.parse().map(PathValue::Int).map_err(|_| failed()),
            ParamKind::Float => raw.parse().map(PathValue::Float).map_err(|_| failed()),
            ParamKind::Str => Ok(PathValue::Str(raw.to_string())),
        }
    }
}

/// A typed path parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PathValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl PathValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PathValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PathValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PathValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathValue::Int(v) => write!(f, "{v}"),
            PathValue::Float(v) => write!(f, "{v}"),
            PathValue::Str(v) => f.write_str(v),
        }
    }
}

/// Ordered `(name, value)` pairs extracted from a matched path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathParams {
    values: SmallVec<[(Arc<str>, PathValue); MAX_INLINE_PARAMS]>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<Arc<str>>, value: PathValue) {
        let name = name.into();
        if let Some(slot) = self.values.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.values.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&PathValue> {
        self.values
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Integer parameter lookup for handlers.
    pub fn int(&self, name: &str) -> Result<i64, ParamError> {
        match self.get(name) {
            Some(PathValue::Int(v)) => Ok(*v),
            Some(_) => Err(ParamError::WrongType {
                name: name.to_string(),
                expected: ParamKind::Int,
            }),
            None => Err(ParamError::Missing(name.to_string())),
        }
    }

    /// String parameter lookup for handlers.
    pub fn str(&self, name: &str) -> Result<&str, ParamError> {
        match self.get(name) {
            Some(PathValue::Str(v)) => Ok(v),
            Some(_) => Err(ParamError::WrongType {
                name: name.to_string(),
                expected: ParamKind::Str,
            }),
            None => Err(ParamError::Missing(name.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PathValue)> {
        self.values.iter().map(|(n, v)| (n.as_ref(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<N: Into<Arc<str>>> FromIterator<(N, PathValue)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (N, PathValue)>>(iter: I) -> Self {
        let mut params = PathParams::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Failure to turn a matched path into typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    /// A capture matched the pattern but the converter rejected it.
    Conversion {
        name: String,
        value: String,
        kind: ParamKind,
    },
    /// The path no longer matches the route it was resolved against.
    NoMatch(String),
    Missing(String),
    WrongType { name: String, expected: ParamKind },
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::Conversion { name, value, kind } => write!(
                f,
                "path parameter `{name}` value `{value}` is not a valid {}",
                kind.as_str()
            ),
            ParamError::NoMatch(path) => write!(f, "path `{path}` does not match route"),
            ParamError::Missing(name) => write!(f, "missing path parameter `{name}`"),
            ParamError::WrongType { name, expected } => {
                write!(f, "path parameter `{name}` is not {}", expected.as_str())
            }
        }
    }
}

impl std::error::Error for ParamError {}

/// Failure to compile a route template.
#[derive(Debug)]
pub enum PatternError {
    DuplicateParam { template: String, name: String },
    Regex(regex::Error),
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::DuplicateParam { template, name } => {
                write!(f, "template `{template}` declares `{name}` twice")
            }
            PatternError::Regex(e) => write!(f, "invalid route pattern: {e}"),
        }
    }
}

impl std::error::Error for PatternError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PatternError::Regex(e) => Some(e),
            PatternError::DuplicateParam { .. } => None,
        }
    }
}

/// A compiled route template.
#[derive(Debug, Clone)]
pub struct CompiledPath {
    pattern: String,
    regex: Regex,
    params: SmallVec<[(Arc<str>, ParamKind); MAX_INLINE_PARAMS]>,
}

impl CompiledPath {
    /// The regex source. Two templates are the same route iff these are equal.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, ParamKind)> {
        self.params.iter().map(|(n, k)| (n.as_ref(), *k))
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Re-run the match and convert each capture, in template order.
    pub fn extract(&self, path: &str) -> Result<PathParams, ParamError> {
        let caps = self
            .regex
            .captures(path)
            .ok_or_else(|| ParamError::NoMatch(path.to_string()))?;

        let mut out = PathParams::new();
        for (idx, (name, kind)) in self.params.iter().enumerate() {
            let raw = caps.get(idx + 1).map_or("", |m| m.as_str());
            out.insert(Arc::clone(name), kind.convert(name, raw)?);
        }
        Ok(out)
    }
}

/// Compile a route template into an anchored matcher.
pub fn compile(template: &str) -> Result<CompiledPath, PatternError> {
    let mut pattern = String::with_capacity(template.len() + 16);
    let mut params: SmallVec<[(Arc<str>, ParamKind); MAX_INLINE_PARAMS]> = SmallVec::new();
    pattern.push('^');

    let placeholder = PLACEHOLDER
        .as_ref()
        .map_err(|e| PatternError::Regex(e.clone()))?;

    let mut last = 0;
    for caps in placeholder.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let name = caps.get(1).map_or("", |m| m.as_str());
        let kind = ParamKind::from_type_name(caps.get(2).map(|m| m.as_str()));

        if params.iter().any(|(n, _)| n.as_ref() == name) {
            return Err(PatternError::DuplicateParam {
                template: template.to_string(),
                name: name.to_string(),
            });
        }

        pattern.push_str(&regex::escape(&template[last..whole.start()]));
        pattern.push_str(kind.capture());
        params.push((Arc::from(name), kind));
        last = whole.end();
    }
    pattern.push_str(&regex::escape(&template[last..]));

    // Trailing slash is optional either way.
    pattern.push_str(if pattern.ends_with('/') { "?" } else { "/?" });
    pattern.push('$');

    let regex = Regex::new(&pattern).map_err(PatternError::Regex)?;
    Ok(CompiledPath {
        pattern,
        regex,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_template_has_no_params() {
        let c = compile("/api/library/").unwrap();
        assert!(!c.has_params());
        assert_eq!(c.pattern(), "^/api/library/?$");
        assert!(c.is_match("/api/library"));
        assert!(c.is_match("/api/library/"));
        assert!(!c.is_match("/api/library/x"));
    }

    #[test]
    fn int_placeholder_compiles_to_digits() {
        let c = compile("/api/manga/<id:int>").unwrap();
        assert_eq!(c.pattern(), r"^/api/manga/([0-9]+)/?$");
        assert!(c.has_params());
        assert_eq!(c.params().collect::<Vec<_>>(), vec![("id", ParamKind::Int)]);
    }

    #[test]
    fn float_and_default_placeholders() {
        let c = compile("/v/<x:float>/<name>").unwrap();
        assert!(c.is_match("/v/1.5/hello-world_1.txt"));
        assert!(!c.is_match("/v/15/hello"));
        let p = c.extract("/v/1.5/abc").unwrap();
        assert_eq!(p.get("x"), Some(&PathValue::Float(1.5)));
        assert_eq!(p.get("name"), Some(&PathValue::Str("abc".into())));
    }

    #[test]
    fn unknown_type_falls_back_to_str() {
        let c = compile("/x/<slug:uuid>").unwrap();
        assert_eq!(c.params().next(), Some(("slug", ParamKind::Str)));
        assert!(c.is_match("/x/abc.def"));
    }

    #[test]
    fn literal_text_is_escaped() {
        let c = compile("/favicon.ico").unwrap();
        assert!(c.is_match("/favicon.ico"));
        assert!(!c.is_match("/faviconXico"));
    }

    #[test]
    fn params_follow_template_order() {
        let c = compile("/api/category/<category_id:int>/manga/<manga_id:int>/").unwrap();
        let p = c.extract("/api/category/3/manga/9").unwrap();
        let names: Vec<_> = p.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["category_id", "manga_id"]);
        assert_eq!(p.int("category_id").unwrap(), 3);
        assert_eq!(p.int("manga_id").unwrap(), 9);
    }

    #[test]
    fn int_overflow_is_a_conversion_error() {
        let c = compile("/n/<id:int>").unwrap();
        let err = c.extract("/n/99999999999999999999999").unwrap_err();
        assert!(matches!(err, ParamError::Conversion { kind: ParamKind::Int, .. }));
    }

    #[test]
    fn numeric_captures_are_ascii_only() {
        let int = compile("/api/manga/<id:int>").unwrap();
        assert!(!int.is_match("/api/manga/\u{0663}"));
        assert!(!int.is_match("/api/manga/1\u{FF12}"));
        let float = compile("/v/<x:float>").unwrap();
        assert!(!float.is_match("/v/\u{0661}.5"));
        assert!(float.is_match("/v/1.5"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = compile("/<a>/<a:int>").unwrap_err();
        assert!(matches!(err, PatternError::DuplicateParam { .. }));
    }

    #[test]
    fn typed_lookups_report_mismatches() {
        let p: PathParams = vec![("name", PathValue::Str("x".into()))].into_iter().collect();
        assert_eq!(p.str("name").unwrap(), "x");
        assert!(matches!(p.int("name"), Err(ParamError::WrongType { .. })));
        assert!(matches!(p.int("id"), Err(ParamError::Missing(_))));
    }

    #[test]
    fn root_template_matches_empty_and_slash() {
        let c = compile("/").unwrap();
        assert_eq!(c.pattern(), "^/?$");
        assert!(c.is_match("/"));
        assert!(c.is_match(""));
    }
}
