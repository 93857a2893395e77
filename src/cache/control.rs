//! `Cache-Control` directive parsing and formatting (RFC 9111 §5.2).

use std::fmt;
use std::time::Duration;

use crate::Headers;

/// The subset of `Cache-Control` directives the response cache acts on.
///
/// Parsing is lenient: unknown directives and malformed delta-seconds are
/// ignored rather than rejected.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use respcache::cache::CacheControl;
///
/// let cc = CacheControl::parse("public, max-age=60, X-Ext=1");
/// assert!(cc.is_public());
/// assert_eq!(cc.max_age(), Some(Duration::from_secs(60)));
/// assert_eq!(cc.to_string(), "public, max-age=60");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    public: bool,
    private: bool,
    no_cache: bool,
    no_store: bool,
    only_if_cached: bool,
    max_age: Option<Duration>,
    shared_max_age: Option<Duration>,
}

impl CacheControl {
    /// Starts a directive set with `public`.
    pub fn public() -> Self {
        Self {
            public: true,
            ..Self::default()
        }
    }

    /// Starts a directive set with `private`.
    pub fn private() -> Self {
        Self {
            private: true,
            ..Self::default()
        }
    }

    /// Starts a directive set with `no-store`.
    pub fn no_store() -> Self {
        Self {
            no_store: true,
            ..Self::default()
        }
    }

    /// Sets `max-age`, truncated to whole seconds.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(Duration::from_secs(max_age.as_secs()));
        self
    }

    /// Sets `max-age` in seconds.
    #[must_use]
    pub fn max_age_secs(self, secs: u64) -> Self {
        self.with_max_age(Duration::from_secs(secs))
    }

    /// Sets `s-maxage` in seconds.
    #[must_use]
    pub fn shared_max_age_secs(mut self, secs: u64) -> Self {
        self.shared_max_age = Some(Duration::from_secs(secs));
        self
    }

    /// Adds `no-cache`.
    #[must_use]
    pub fn with_no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Parses one `Cache-Control` field value.
    pub fn parse(value: &str) -> Self {
        let mut cc = Self::default();
        cc.merge(value);
        cc
    }

    /// Combines every `Cache-Control` field in `headers`, or `None` when the
    /// header is absent.
    pub fn from_headers(headers: &Headers) -> Option<Self> {
        let mut values = headers.get_all("cache-control").peekable();
        values.peek()?;
        let mut cc = Self::default();
        for value in values {
            cc.merge(value);
        }
        Some(cc)
    }

    fn merge(&mut self, value: &str) {
        for directive in value.split(',') {
            let directive = directive.trim();
            if directive.is_empty() {
                continue;
            }
            let (name, argument) = match directive.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
                None => (directive, None),
            };

            match name.to_ascii_lowercase().as_str() {
                "public" => self.public = true,
                "private" => self.private = true,
                "no-cache" => self.no_cache = true,
                "no-store" => self.no_store = true,
                "only-if-cached" => self.only_if_cached = true,
                "max-age" => {
                    if let Some(secs) = argument.and_then(parse_delta_seconds) {
                        self.max_age = Some(secs);
                    }
                }
                "s-maxage" => {
                    if let Some(secs) = argument.and_then(parse_delta_seconds) {
                        self.shared_max_age = Some(secs);
                    }
                }
                _ => {}
            }
        }
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn no_cache(&self) -> bool {
        self.no_cache
    }

    pub fn is_no_store(&self) -> bool {
        self.no_store
    }

    pub fn only_if_cached(&self) -> bool {
        self.only_if_cached
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// `s-maxage`, which overrides `max-age` for shared caches.
    pub fn shared_max_age(&self) -> Option<Duration> {
        self.shared_max_age
    }
}

fn parse_delta_seconds(value: &str) -> Option<Duration> {
    value.parse::<u64>().ok().map(Duration::from_secs)
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.public, "public"),
            (self.private, "private"),
            (self.no_cache, "no-cache"),
            (self.no_store, "no-store"),
            (self.only_if_cached, "only-if-cached"),
        ];

        let mut parts: Vec<String> = flags
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| (*name).to_owned())
            .collect();
        if let Some(max_age) = self.max_age {
            parts.push(format!("max-age={}", max_age.as_secs()));
        }
        if let Some(shared) = self.shared_max_age {
            parts.push(format!("s-maxage={}", shared.as_secs()));
        }

        f.write_str(&parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_formats_public_max_age() {
        let cc = CacheControl::public().with_max_age(Duration::from_secs(60));
        assert_eq!(cc.to_string(), "public, max-age=60");
    }

    #[test]
    fn parse_is_case_insensitive_and_lenient() {
        let cc = CacheControl::parse(" Public ,MAX-AGE=\"30\", s-maxage=abc, no-store");
        assert!(cc.is_public());
        assert!(cc.is_no_store());
        assert_eq!(cc.max_age(), Some(Duration::from_secs(30)));
        assert_eq!(cc.shared_max_age(), None);
    }

    #[test]
    fn from_headers_merges_fields() {
        let mut headers = Headers::new();
        assert!(CacheControl::from_headers(&headers).is_none());

        headers.insert("Cache-Control", "public");
        headers.insert("cache-control", "s-maxage=120");
        let cc = CacheControl::from_headers(&headers).unwrap();
        assert!(cc.is_public());
        assert_eq!(cc.shared_max_age(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn directives_the_cache_ignores_are_dropped() {
        let cc = CacheControl::parse("public, must-revalidate, proxy-revalidate, max-age=5");
        assert_eq!(cc, CacheControl::public().max_age_secs(5));
        assert_eq!(cc.to_string(), "public, max-age=5");
    }

    #[test]
    fn request_directives() {
        let cc = CacheControl::parse("no-cache, only-if-cached, max-age=0");
        assert!(cc.no_cache());
        assert!(cc.only_if_cached());
        assert_eq!(cc.max_age(), Some(Duration::ZERO));
    }
}
