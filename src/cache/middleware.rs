use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{CacheControl, CacheKey, CachedResponse, MemoryStore, ResponseCachingOptions};
use crate::{
    Request, Response, StatusCode,
    context::Context,
    middleware::{BoxFuture, Middleware, Next},
};

/// Middleware that serves repeated requests from stored responses.
///
/// On a miss the rest of the pipeline runs, then every `on_starting` callback
/// registered by those inner stages is fired, and only then is the response
/// captured. Callbacks registered by stages outside this one are left to the
/// enclosing registry and run on every response, hit or miss. Headers those callbacks
/// add are therefore part of the stored copy and identical on every hit, while
/// headers they remove are never stored. A hit returns the stored copy (plus
/// an `Age` header) without calling the next stage, so neither the endpoint
/// nor any callback runs again.
///
/// A request is eligible when it is a GET or HEAD without an `Authorization`
/// header. Request `Cache-Control` is honoured: `no-cache` (or
/// `Pragma: no-cache`) bypasses lookup, `no-store` prevents storage,
/// `max-age` bounds the acceptable age, and `only-if-cached` answers
/// `504 Gateway Timeout` on a miss.
///
/// A response is stored when it is `200 OK`, marked `public`, not `private`,
/// `no-cache` or `no-store`, sets no cookie, does not `Vary: *`, and fits the
/// body limit. Its lifetime is `s-maxage`, else `max-age`, else the configured
/// default; a zero lifetime is not stored.
///
/// Add it before the middleware whose output should be cached:
///
/// ```rust
/// use std::sync::Arc;
/// use respcache::cache::{CacheControl, ResponseCachingMiddleware};
/// use respcache::context::Context;
/// use respcache::middleware::Pipeline;
///
/// let pipeline = Pipeline::new(|ctx: Context| async move {
///     ctx.into_response()
///         .cache_control(CacheControl::public().max_age_secs(60))
///         .body("cached for a minute")
/// })
/// .with(Arc::new(ResponseCachingMiddleware::default()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResponseCachingMiddleware {
    store: MemoryStore,
    options: ResponseCachingOptions,
}

impl ResponseCachingMiddleware {
    pub fn new(options: ResponseCachingOptions) -> Self {
        Self {
            store: MemoryStore::with_scan_frequency(options.expiration_scan_frequency()),
            options,
        }
    }

    /// Uses an existing store, e.g. one shared with another pipeline.
    pub fn with_store(store: MemoryStore, options: ResponseCachingOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn options(&self) -> &ResponseCachingOptions {
        &self.options
    }
}

impl Middleware for ResponseCachingMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxFuture {
        let store = self.store.clone();
        let options = self.options.clone();

        Box::pin(async move {
            if !is_request_cacheable(ctx.request()) {
                return next.run(ctx).await;
            }

            let (key, directives, pragma_no_cache) = {
                let request = ctx.request();
                let pragma_no_cache = request
                    .headers()
                    .get_all("pragma")
                    .any(|v| v.trim().eq_ignore_ascii_case("no-cache"));
                (
                    CacheKey::from_request(request, options.case_sensitive_paths()),
                    CacheControl::from_headers(request.headers()).unwrap_or_default(),
                    pragma_no_cache,
                )
            };

            if !directives.no_cache() && !pragma_no_cache {
                let now = Instant::now();
                if let Some(entry) = store.get(&key) {
                    let age = entry.age(now);
                    if directives.max_age().is_none_or(|limit| age <= limit) {
                        debug!(key = %key, age = age.as_secs(), "served from cache");
                        return entry.to_response(now);
                    }
                    debug!(key = %key, age = age.as_secs(), "cached response older than request max-age");
                }
                if directives.only_if_cached() {
                    debug!(key = %key, "only-if-cached miss");
                    return Response::new(StatusCode::GatewayTimeout);
                }
            }

            // Only callbacks registered by the stages being cached belong in
            // the snapshot; enclosing ones fire per request on every replay.
            let hooks = ctx.scope_hooks();
            let mut response = next.run(ctx).await;
            hooks.fire(&mut response);

            if directives.is_no_store() {
                debug!(key = %key, "request forbids storage");
                return response;
            }

            match storable_ttl(&response, &options) {
                Ok(ttl) => {
                    debug!(key = %key, ttl = ttl.as_secs(), "response stored");
                    store.set(key, CachedResponse::capture(&response, ttl));
                }
                Err(reason) => debug!(key = %key, reason, "response not stored"),
            }
            response
        })
    }
}

fn is_request_cacheable(request: &Request) -> bool {
    request.method().is_cacheable() && !request.headers().contains("authorization")
}

// Lifetime for a storable response, or why it cannot be stored.
fn storable_ttl(
    response: &Response,
    options: &ResponseCachingOptions,
) -> Result<Duration, &'static str> {
    if response.status() != StatusCode::Ok {
        return Err("status is not 200");
    }

    let headers = response.headers();
    let Some(directives) = CacheControl::from_headers(headers) else {
        return Err("no cache-control");
    };
    if !directives.is_public() {
        return Err("not public");
    }
    if directives.is_private() || directives.no_cache() || directives.is_no_store() {
        return Err("private, no-cache or no-store");
    }
    if headers.contains("set-cookie") {
        return Err("sets a cookie");
    }
    if headers
        .get_all("vary")
        .flat_map(|v| v.split(','))
        .any(|v| v.trim() == "*")
    {
        return Err("varies on everything");
    }
    if response.body_ref().len() > options.maximum_body_size() {
        return Err("body exceeds limit");
    }

    let ttl = directives
        .shared_max_age()
        .or(directives.max_age())
        .unwrap_or(options.default_ttl());
    if ttl.is_zero() {
        return Err("zero lifetime");
    }
    Ok(ttl)
}
