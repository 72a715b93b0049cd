//! URL canonicalization for target pages and post permalinks.

use url::Url;

/// Query parameter that carries the page identity on `profile.php` URLs.
const PROFILE_ID_PARAM: &str = "id";

/// Strip query and fragment from a URL.
///
/// `profile.php?id=...` URLs keep their `id` parameter since it is the only
/// thing identifying the page. Unparseable input is returned trimmed with any
/// query string cut off.
pub fn canonicalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string();
    };

    let profile_id = if parsed.path().ends_with("/profile.php") {
        parsed
            .query_pairs()
            .find(|(k, _)| k == PROFILE_ID_PARAM)
            .map(|(_, v)| v.into_owned())
    } else {
        None
    };

    parsed.set_fragment(None);
    parsed.set_query(None);
    if let Some(id) = profile_id {
        parsed
            .query_pairs_mut()
            .append_pair(PROFILE_ID_PARAM, &id);
    }

    parsed.to_string()
}

/// Resolve a possibly relative link against `base`.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") {
        return None;
    }
    if let Ok(url) = Url::parse(href) {
        return Some(url.to_string());
    }
    Url::parse(base)
        .ok()?
        .join(href)
        .ok()
        .map(|u| u.to_string())
}

/// Derive a short handle for a page URL.
///
/// Uses the profile id for `profile.php` URLs, otherwise the last non-empty
/// path segment, otherwise the host.
pub fn derive_handle(page_url: &str) -> String {
    let Ok(parsed) = Url::parse(page_url) else {
        return page_url.trim_end_matches('/').to_string();
    };

    if parsed.path().ends_with("/profile.php") {
        if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == PROFILE_ID_PARAM) {
            return id.into_owned();
        }
    }

    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .or_else(|| parsed.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_query_and_fragment() {
        assert_eq!(
            canonicalize_url("https://www.facebook.com/acme/posts/pfbid02x?__cft__[0]=abc&__tn__=R#x"),
            "https://www.facebook.com/acme/posts/pfbid02x"
        );
    }

    #[test]
    fn keeps_profile_id() {
        assert_eq!(
            canonicalize_url("https://www.facebook.com/profile.php?id=100064&sk=posts"),
            "https://www.facebook.com/profile.php?id=100064"
        );
    }

    #[test]
    fn unparseable_urls_lose_their_query() {
        assert_eq!(canonicalize_url("/acme/videos/123?ref=x"), "/acme/videos/123");
    }

    #[test]
    fn resolves_relative_links() {
        assert_eq!(
            absolutize("https://www.facebook.com/", "/acme/posts/1").as_deref(),
            Some("https://www.facebook.com/acme/posts/1")
        );
        assert_eq!(absolutize("https://www.facebook.com/", "javascript:void(0)"), None);
    }

    #[test]
    fn handles_from_paths_and_profiles() {
        assert_eq!(derive_handle("https://www.facebook.com/AcmeCorp/"), "AcmeCorp");
        assert_eq!(
            derive_handle("https://www.facebook.com/profile.php?id=100064"),
            "100064"
        );
        assert_eq!(derive_handle("https://www.facebook.com/"), "www.facebook.com");
    }
}
