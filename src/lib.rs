//! # respcache
//!
//! An async HTTP/1.1 request pipeline with late-binding response hooks and an
//! in-memory response-caching middleware.
//!
//! Middleware may register an `on_starting` callback that runs once, right
//! before the response headers are finalized. The caching middleware captures
//! the response only after those callbacks have run, so headers they add are
//! replayed verbatim on every cache hit and headers they remove never leak.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use respcache::cache::{CacheControl, ResponseCachingMiddleware};
//! use respcache::middleware::Pipeline;
//! use respcache::server::Server;
//! use respcache::{Response, context::Context};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(|ctx: Context| async move {
//!         ctx.into_response()
//!             .cache_control(CacheControl::public().max_age_secs(60))
//!             .body("Hello, World!")
//!     })
//!     .with(Arc::new(ResponseCachingMiddleware::default()));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(pipeline).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
