//! # Router Module
//!
//! Path matching and route resolution.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Compiling route templates (`/api/manga/<id:int>`) into anchored regex matchers
//! - Resolving an incoming path to the first matching route, in registration order
//! - Picking the handler for the request method, or reporting 404/405
//! - Extracting typed path parameters from a matched path
//!
//! ## Architecture
//!
//! The router uses a two-phase approach:
//!
//! 1. **Compilation**: at startup, each handler group registers its table. Templates are
//!    compiled once by [`pattern::compile`]; templates compiling to the same pattern share
//!    one [`Route`] whose method table is merged.
//!
//! 2. **Matching**: for each request, routes are tested in registration order. Ordering is
//!    observable: a catch-all such as `/<file>` must be registered after the routes it
//!    would otherwise shadow.
//!
//! ## Example
//!
//! ```rust
//! use yomu_server::dispatcher::Handler;
//! use yomu_server::router::{Resolution, Router};
//! use yomu_server::server::{HttpResponse, Method};
//!
//! let mut router = Router::new();
//! let get = Handler::new("get_manga", |_req| Ok(HttpResponse::ok().into()));
//! router.add_route(Method::Get, "/api/manga/<id:int>", get).unwrap();
//!
//! let route = router.resolve("/api/manga/42/").unwrap();
//! assert_eq!(route.get_params("/api/manga/42/").unwrap().int("id").unwrap(), 42);
//! assert!(matches!(
//!     router.resolve_method(Method::Post, "/api/manga/42/"),
//!     Resolution::MethodNotAllowed { .. }
//! ));
//! assert!(matches!(router.resolve_method(Method::Get, "/api/manga/xx/"), Resolution::NotFound));
//! ```

mod core;
pub mod pattern;

pub use core::{HandlerGroup, Resolution, Route, RouteDef, Router};
pub use pattern::{compile, CompiledPath, ParamError, ParamKind, PathParams, PathValue, PatternError};
