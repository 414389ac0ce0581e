//! HTTP wire types and the reactor the servers run on.

pub mod http_server;
pub mod reactor;
pub mod request;
pub mod response;

pub use http_server::HttpServer;
pub use reactor::{bind, spawn_reactor, ReactorHandle, Shutdown};
pub use request::{parse_query_params, HttpRequest, Method, ParseError};
pub use response::{HttpResponse, StatusCode};
