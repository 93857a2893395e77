//! Middleware pipeline — composable before/after request handler logic.
//!
//! This module defines the core types for building an ordered middleware stack
//! in front of an endpoint handler. Each middleware wraps the next layer,
//! enabling request inspection, short-circuit responses (a cache hit), and
//! response decoration without coupling handlers to infrastructure concerns.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`Pipeline`] — an endpoint plus its middleware stack; [`Pipeline::dispatch`]
//!   runs a request through it and finalizes the response.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] / [`from_fn`] — build a [`MiddlewareHandler`].
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::sync::atomic::Ordering;
use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, StatusCode, context::Context};

/// Boxed future returned by middleware and handlers.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased endpoint that turns a [`Context`] into a [`Response`].
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture + Send + Sync + 'static>;

/// Conversion trait for async endpoint functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl
/// below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> BoxFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin((self)(ctx))
    }
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] advances the cursor by one position and invokes the next
/// middleware, or the endpoint once the chain is exhausted.
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation.
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    endpoint: Option<Handler>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use respcache::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Converts an async closure into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust
/// use respcache::middleware::from_fn;
///
/// let handler = from_fn(|mut ctx, next| async move {
///     ctx.response_mut().add_header("X-Stage", "outer");
///     next.run(ctx).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> MiddlewareHandler
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx: Context, next: Next| -> BoxFuture { Box::pin(f(ctx, next)) })
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack,
    /// with no endpoint behind it.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            endpoint: None,
            index: 0,
        }
    }

    /// Sets the endpoint invoked once the middleware stack is exhausted.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Handler) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// When the middleware stack is exhausted the endpoint runs. If it built a
    /// fresh response rather than taking the draft, headers left on the draft
    /// are carried underneath the endpoint's own headers. Without an endpoint a `500 Internal Server Error`
    /// response is returned.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            return handler(ctx, self).await;
        }

        let Some(endpoint) = self.endpoint.take() else {
            return Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline");
        };

        let draft = ctx.response().headers().clone();
        let draft_taken = ctx.draft_taken();
        let mut response = endpoint(ctx).await;
        if !draft_taken.load(Ordering::Acquire) {
            response.headers_mut().underlay(draft);
        }
        response
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(ctx).await` without modification.
/// - **Short-circuit** — return a [`Response`] directly without calling `next`.
/// - **Decorate** — call `next.run(ctx).await`, inspect the response, and return
///   a modified copy.
/// - **Defer** — register an `on_starting` callback through
///   [`Context::on_starting`] that inspects the final response.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture;
}

/// An endpoint together with the middleware stack in front of it.
///
/// Middleware added first sits outermost: it sees the request first and the
/// response last.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use respcache::{Method, Request, Response, StatusCode};
/// use respcache::context::Context;
/// use respcache::middleware::{LoggerMiddleware, Pipeline};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("hi") })
///     .with(Arc::new(LoggerMiddleware));
///
/// let response = pipeline.dispatch(Request::new(Method::Get, "/")).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Vec<MiddlewareHandler>,
    endpoint: Handler,
}

impl Pipeline {
    /// Creates a pipeline with no middleware in front of `endpoint`.
    pub fn new(endpoint: impl IntoHandler) -> Self {
        let endpoint: Handler = Arc::new(move |ctx: Context| endpoint.call(ctx));
        Self {
            middlewares: Vec::new(),
            endpoint,
        }
    }

    /// Appends a [`Middleware`] inside the ones already added.
    #[must_use]
    pub fn with<M>(self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        self.with_handler(from_middleware(middleware))
    }

    /// Appends an already type-erased middleware handler.
    #[must_use]
    pub fn with_handler(mut self, handler: MiddlewareHandler) -> Self {
        self.middlewares.push(handler);
        self
    }

    /// Number of middleware layers in front of the endpoint.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the endpoint has no middleware in front of it.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `request` through the middleware stack and endpoint.
    ///
    /// Any `on_starting` callback still pending when the chain returns is fired
    /// here, so the returned response is final and ready to be written.
    pub async fn dispatch(&self, request: Request) -> Response {
        let ctx = Context::new(request);
        let hooks = ctx.hooks().clone();

        let next = Next::new(self.middlewares.clone()).endpoint(Arc::clone(&self.endpoint));
        let mut response = next.run(ctx).await;

        hooks.fire(&mut response);
        response
    }
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// `LoggerMiddleware` does not short-circuit; it always delegates to the next
/// middleware and records timing after the fact.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().clone();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request completed"
            );

            response
        })
    }
}
