//! HTTP listener for machined.
//!
//! Requests are resolved against the shared
//! [`OperationTable`](machined::OperationTable): the HTTP method must equal an
//! operation's verb and the path must fit its pattern. The query string and a
//! form-encoded body are merged into the request's form parameters.
//!
//! A successful dispatch answers `200` with `Content-Type: application/json`.
//! A handler error, a handler panic or a malformed form answers `500` with an
//! empty body. Unknown paths get `404`, and a known path asked with the wrong
//! method gets `405`.
//!
//! ```no_run
//! # async fn run(service: std::sync::Arc<machined::Service>) -> Result<(), machined_http::HttpError> {
//! let server = machined_http::HttpServer::bind("127.0.0.1:8080".parse().unwrap(), service).await?;
//! server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod error;
mod router;
mod server;

pub use error::HttpError;
pub use router::router;
pub use server::HttpServer;
