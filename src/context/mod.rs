//! Per-request context — the request, its draft response, and late-binding hooks.
//!
//! Middleware receives a [`Context`] and may put headers on the draft response
//! before calling the next stage, or register an `on_starting` callback that
//! runs once the final response is known.

mod hooks;

pub use hooks::{HookError, OnStarting, ResponseHooks};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{Request, Response, StatusCode};

/// Per-request context passed down the middleware chain.
pub struct Context {
    request: Request,
    response: Response,
    hooks: ResponseHooks,
    // Set once the endpoint takes the draft through `into_response`.
    draft_taken: Arc<AtomicBool>,
}

impl Context {
    /// Create a new context from a request, with an empty `200 OK` draft response.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::new(StatusCode::Ok),
            hooks: ResponseHooks::new(),
            draft_taken: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The draft response.
    ///
    /// An endpoint that builds on the draft through
    /// [`into_response`](Self::into_response) owns every header on it,
    /// including removals. For an endpoint that builds a fresh response
    /// instead, draft headers are carried onto it unless it sets the same
    /// header itself.
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Consumes the context and returns its draft response, for endpoints that
    /// build on it directly.
    pub fn into_response(self) -> Response {
        self.draft_taken.store(true, Ordering::Release);
        self.response
    }

    /// Shared flag telling whether the draft was taken by `into_response`.
    pub(crate) fn draft_taken(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.draft_taken)
    }

    /// Handle to this request's late-binding hooks.
    pub fn hooks(&self) -> &ResponseHooks {
        &self.hooks
    }

    /// Gives the stages after this point a registry of their own and returns
    /// a handle to it.
    ///
    /// Callbacks registered earlier stay in the enclosing registry and are
    /// fired by whoever holds it; the caller fires the returned scope.
    pub fn scope_hooks(&mut self) -> ResponseHooks {
        let scope = ResponseHooks::new();
        self.hooks = scope.clone();
        scope
    }

    /// Registers `callback` to run once, after the endpoint completes and
    /// before the response headers are written or cached.
    ///
    /// The callback must not rely on headers that were unset at registration
    /// time; it sees the response as it is when it runs.
    ///
    /// # Errors
    ///
    /// [`HookError::ResponseStarted`] if the response has already started.
    pub fn on_starting<F>(&self, callback: F) -> Result<(), HookError>
    where
        F: FnOnce(&mut Response) + Send + 'static,
    {
        self.hooks.register(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[test]
    fn draft_starts_without_content_type() {
        let ctx = Context::new(Request::new(Method::Get, "/"));
        assert_eq!(ctx.response().content_type_value(), None);
        assert_eq!(ctx.response().status(), StatusCode::Ok);
    }

    #[test]
    fn on_starting_shares_registry_with_hooks_handle() {
        let ctx = Context::new(Request::new(Method::Get, "/"));
        let hooks = ctx.hooks().clone();
        ctx.on_starting(|res: &mut Response| res.add_header("X-Late", "1"))
            .unwrap();
        drop(ctx);

        let mut res = Response::new(StatusCode::Ok);
        assert_eq!(hooks.fire(&mut res), 1);
        assert_eq!(res.headers().get("x-late"), Some("1"));
    }

    #[test]
    fn scoped_hooks_are_separate_from_enclosing_registry() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        let enclosing = ctx.hooks().clone();
        ctx.on_starting(|res: &mut Response| res.add_header("X-Outer", "1"))
            .unwrap();

        let scope = ctx.scope_hooks();
        ctx.on_starting(|res: &mut Response| res.add_header("X-Inner", "1"))
            .unwrap();
        drop(ctx);

        let mut res = Response::new(StatusCode::Ok);
        assert_eq!(scope.fire(&mut res), 1);
        assert!(res.headers().contains("x-inner"));
        assert!(!res.headers().contains("x-outer"));
        assert_eq!(enclosing.pending(), 1);
    }

    #[test]
    fn into_response_marks_draft_taken() {
        let ctx = Context::new(Request::new(Method::Get, "/"));
        let taken = ctx.draft_taken();
        assert!(!taken.load(Ordering::Acquire));
        let _ = ctx.into_response();
        assert!(taken.load(Ordering::Acquire));
    }
}
