//! Serves a cacheable page whose `X-Render-Id` header is decided late.
//!
//! ```text
//! RUST_LOG=debug cargo run --example cached_page
//! curl -i http://127.0.0.1:8080/   # run twice: same X-Render-Id, Age grows
//! ```

use std::sync::Arc;

use respcache::cache::{CacheControl, ResponseCachingMiddleware, ResponseCachingOptions};
use respcache::context::Context;
use respcache::middleware::{LoggerMiddleware, Pipeline, from_fn};
use respcache::{Response, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = match std::env::var("RESPCACHE_OPTIONS") {
        Ok(json) => ResponseCachingOptions::from_json(&json)?,
        Err(_) => ResponseCachingOptions::default(),
    };

    let pipeline = Pipeline::new(|ctx: Context| async move {
        ctx.into_response()
            .cache_control(CacheControl::public().max_age_secs(60))
            .content_type("text/html")
            .body("<h1>Rendered once a minute</h1>")
    })
    .with(Arc::new(LoggerMiddleware))
    .with(Arc::new(ResponseCachingMiddleware::new(options)))
    .with_handler(from_fn(|ctx, next| async move {
        let registered = ctx.on_starting(|res: &mut Response| {
            if res.content_type_value() == Some("text/html") {
                let id = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                res.add_header("X-Render-Id", id.to_string());
            }
        });
        if let Err(e) = registered {
            tracing::warn!(error = %e, "render id hook not registered");
        }
        next.run(ctx).await
    }));

    let server = Server::bind("127.0.0.1:8080").await?;
    tracing::info!(address = %server.local_addr(), "try: curl -i http://127.0.0.1:8080/");
    server.run(pipeline).await?;
    Ok(())
}
