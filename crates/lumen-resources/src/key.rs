//! Locator normalization.
//!
//! Resource locators reach the cache either as absolute URLs
//! (`https://host/api/media/x.png?v=1`), as root-relative paths
//! (`/api/media/x.png?v=1`) or as bare resource ids (`resource-123`).
//! Normalization maps every form that names the same path, query and
//! fragment onto one [`CacheKey`].

use lumen_abstraction::CacheKey;
use reqwest::Url;

/// Canonicalizes a resource locator into a cache key.
///
/// Root-relative locators are already canonical and are kept as-is. Anything
/// else is parsed as an absolute URL and reduced to path + query + fragment,
/// dropping scheme, host and port. Locators that do not parse (bare ids,
/// malformed URLs) are kept verbatim so they still distinguish resources.
#[must_use]
pub fn normalize(locator: &str) -> CacheKey {
    if locator.starts_with('/') {
        return CacheKey::new(locator);
    }

    match Url::parse(locator) {
        Ok(url) => {
            let mut key = url.path().to_string();
            if let Some(query) = url.query() {
                key.push('?');
                key.push_str(query);
            }
            if let Some(fragment) = url.fragment() {
                key.push('#');
                key.push_str(fragment);
            }
            CacheKey::new(key)
        }
        Err(_) => CacheKey::new(locator),
    }
}

/// Normalizes an optional locator, treating blank input as "no resource".
#[must_use]
pub fn normalize_requested(locator: Option<&str>) -> Option<CacheKey> {
    locator
        .map(str::trim)
        .filter(|locator| !locator.is_empty())
        .map(normalize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_and_relative_forms_share_a_key() {
        assert_eq!(
            normalize("https://host/api/media/x.png?v=1"),
            normalize("/api/media/x.png?v=1")
        );
    }

    #[test]
    fn test_relative_path_is_unchanged() {
        assert_eq!(normalize("/some/path").as_str(), "/some/path");
        assert_eq!(normalize("/api/custom/endpoint?x=1#y").as_str(), "/api/custom/endpoint?x=1#y");
    }

    #[test]
    fn test_absolute_url_drops_scheme_host_and_port() {
        assert_eq!(normalize("http://example.com/api/resources/test").as_str(), "/api/resources/test");
        assert_eq!(normalize("https://cdn.example.com:8443/a/b.webp").as_str(), "/a/b.webp");
    }

    #[test]
    fn test_absolute_url_preserves_query_and_fragment() {
        assert_eq!(
            normalize("http://example.com/api/test?query=1#hash").as_str(),
            "/api/test?query=1#hash"
        );
    }

    #[test]
    fn test_bare_id_is_kept_verbatim() {
        assert_eq!(normalize("resource-123").as_str(), "resource-123");
    }

    #[test]
    fn test_malformed_url_fails_open() {
        assert_eq!(normalize("http://[::1").as_str(), "http://[::1");
    }

    #[test]
    fn test_different_hosts_same_path_share_a_key() {
        assert_eq!(
            normalize("https://a.example.com/r/1"),
            normalize("http://b.example.org:8080/r/1")
        );
    }

    #[test]
    fn test_normalize_requested_treats_blank_as_none() {
        assert_eq!(normalize_requested(None), None);
        assert_eq!(normalize_requested(Some("")), None);
        assert_eq!(normalize_requested(Some("   ")), None);
        assert_eq!(normalize_requested(Some(" /r/1 ")), Some(CacheKey::new("/r/1")));
    }
}
