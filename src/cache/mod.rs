//! Response caching — capture finalized responses and replay them.
//!
//! - [`ResponseCachingMiddleware`] — the pipeline stage that looks up and
//!   stores responses.
//! - [`MemoryStore`] / [`CachedResponse`] — the in-memory store and its
//!   immutable entries.
//! - [`CacheKey`] — request identity (method + path).
//! - [`CacheControl`] — `Cache-Control` directives for requests and responses.
//! - [`ResponseCachingOptions`] — limits and defaults.

mod control;
mod key;
mod middleware;
mod options;
mod store;

pub use control::CacheControl;
pub use key::CacheKey;
pub use middleware::ResponseCachingMiddleware;
pub use options::{OptionsError, ResponseCachingOptions};
pub use store::{CachedResponse, MemoryStore};
