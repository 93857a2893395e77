use std::fmt;

use crate::Request;

// Separates the key components; cannot appear in a method or a request path.
const DELIMITER: char = '\u{1e}';

/// Identity of a cached response: request method plus path.
///
/// Paths compare case-insensitively unless case-sensitive paths are enabled.
/// The query string is not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_request(request: &Request, case_sensitive_paths: bool) -> Self {
        let path = if case_sensitive_paths {
            request.path().to_owned()
        } else {
            request.path().to_ascii_uppercase()
        };
        Self(format!("{}{}{}", request.method(), DELIMITER, path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace(DELIMITER, " "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[test]
    fn paths_fold_case_by_default() {
        let a = CacheKey::from_request(&Request::new(Method::Get, "/Index"), false);
        let b = CacheKey::from_request(&Request::new(Method::Get, "/INDEX"), false);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "GET /INDEX");
    }

    #[test]
    fn case_sensitive_paths_stay_distinct() {
        let a = CacheKey::from_request(&Request::new(Method::Get, "/Index"), true);
        let b = CacheKey::from_request(&Request::new(Method::Get, "/index"), true);
        assert_ne!(a, b);
    }

    #[test]
    fn method_and_query() {
        let get = CacheKey::from_request(&Request::new(Method::Get, "/?a=1"), false);
        let get_other_query = CacheKey::from_request(&Request::new(Method::Get, "/?a=2"), false);
        let head = CacheKey::from_request(&Request::new(Method::Head, "/"), false);
        assert_eq!(get, get_other_query);
        assert_ne!(get, head);
    }
}
