//! Late-binding response hooks.
//!
//! A hook is registered while the request is being handled and runs once,
//! after the endpoint has produced its response and before the headers are
//! written or captured. Hooks see the fully resolved response (final status,
//! final `Content-Type`) and may add or remove headers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::Response;

/// A late-binding callback over the outgoing response.
pub type OnStarting = Box<dyn FnOnce(&mut Response) + Send + 'static>;

/// Errors from registering a late-binding hook.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("response has already started; on_starting callbacks can no longer be registered")]
    ResponseStarted,
}

#[derive(Default)]
struct HookState {
    pending: Vec<OnStarting>,
    started: bool,
}

/// Ordered, fire-once registry of `on_starting` callbacks for one response.
///
/// Cloning yields another handle to the same registry, which lets an outer
/// middleware fire callbacks that inner stages registered on a [`Context`]
/// they have since consumed.
///
/// [`Context`]: crate::context::Context
///
/// # Examples
///
/// ```
/// use respcache::{Response, StatusCode, context::ResponseHooks};
///
/// let hooks = ResponseHooks::new();
/// hooks.register(|res: &mut Response| res.add_header("X-First", "1")).unwrap();
/// hooks.register(|res: &mut Response| res.set_header("X-First", "2")).unwrap();
///
/// let mut response = Response::new(StatusCode::Ok);
/// assert_eq!(hooks.fire(&mut response), 2);
/// assert_eq!(response.headers().get("x-first"), Some("2"));
///
/// // A second fire is a no-op.
/// assert_eq!(hooks.fire(&mut response), 0);
/// ```
#[derive(Clone, Default)]
pub struct ResponseHooks {
    state: Arc<Mutex<HookState>>,
}

impl ResponseHooks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` to run once, right before the response starts.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::ResponseStarted`] once the hooks have fired; the
    /// callback is dropped without running.
    pub fn register<F>(&self, callback: F) -> Result<(), HookError>
    where
        F: FnOnce(&mut Response) + Send + 'static,
    {
        let mut state = self.lock();
        if state.started {
            tracing::warn!("on_starting callback registered after the response started");
            return Err(HookError::ResponseStarted);
        }
        state.pending.push(Box::new(callback));
        Ok(())
    }

    /// Runs every pending callback against `response` in registration order
    /// and marks the response as started.
    ///
    /// Returns how many callbacks ran. Only the first call runs anything.
    pub fn fire(&self, response: &mut Response) -> usize {
        let pending = {
            let mut state = self.lock();
            if state.started {
                return 0;
            }
            state.started = true;
            std::mem::take(&mut state.pending)
        };

        let count = pending.len();
        for callback in pending {
            callback(response);
        }
        if count > 0 {
            tracing::debug!(callbacks = count, "on_starting callbacks fired");
        }
        count
    }

    /// Returns `true` once [`fire`](Self::fire) has been called.
    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    /// Number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ResponseHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ResponseHooks")
            .field("pending", &state.pending.len())
            .field("started", &state.started)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::StatusCode;

    #[test]
    fn callbacks_run_in_registration_order() {
        let hooks = ResponseHooks::new();
        for i in 0..3 {
            hooks
                .register(move |res: &mut Response| res.add_header("X-Order", i.to_string()))
                .unwrap();
        }

        let mut res = Response::new(StatusCode::Ok);
        hooks.fire(&mut res);

        let order: Vec<_> = res.headers().get_all("x-order").collect();
        assert_eq!(order, vec!["0", "1", "2"]);
    }

    #[test]
    fn callbacks_run_exactly_once_across_clones() {
        let runs = Arc::new(AtomicUsize::new(0));
        let hooks = ResponseHooks::new();
        let counter = Arc::clone(&runs);
        hooks
            .register(move |_res: &mut Response| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let other = hooks.clone();
        let mut res = Response::new(StatusCode::Ok);
        assert_eq!(other.fire(&mut res), 1);
        assert_eq!(hooks.fire(&mut res), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(hooks.is_started());
    }

    #[test]
    fn register_after_start_is_rejected() {
        let hooks = ResponseHooks::new();
        hooks.fire(&mut Response::new(StatusCode::Ok));

        let err = hooks.register(|_res: &mut Response| {}).unwrap_err();
        assert_eq!(err, HookError::ResponseStarted);
        assert_eq!(hooks.pending(), 0);
    }

    #[test]
    fn callback_sees_final_content_type() {
        let hooks = ResponseHooks::new();
        hooks
            .register(|res: &mut Response| {
                if res.content_type_value() == Some("text/html") {
                    res.add_header("X-Html", "yes");
                }
            })
            .unwrap();

        let mut res = Response::new(StatusCode::Ok).content_type("text/html");
        hooks.fire(&mut res);
        assert_eq!(res.headers().get("x-html"), Some("yes"));
    }
}
