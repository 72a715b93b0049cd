//! Cookie bundles exported from a logged-in browser.
//!
//! The bundle is read-only: it is read at session bootstrap and never written
//! back, so cookies rotated by the live session are not persisted.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::browser::{SameSite, SessionCookie};
use crate::error::HarvestError;

/// Externally supplied credential cookies.
#[derive(Debug, Clone, Default)]
pub struct CredentialBundle {
    entries: Vec<Value>,
}

impl CredentialBundle {
    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        debug!("Loading credential bundle from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse a JSON array of cookie objects (browser-extension export format).
    pub fn from_json(content: &str) -> Result<Self, HarvestError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| HarvestError::Credentials(format!("invalid JSON: {}", e)))?;
        match value {
            Value::Array(entries) => Ok(Self { entries }),
            _ => Err(HarvestError::Credentials(
                "expected a JSON array of cookies".to_string(),
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a cookie named `name` with a non-empty value is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|c| cookie_name(c) == Some(name) && !cookie_value(c).is_empty())
    }

    /// Cookies ready for injection, scoped to `domain`.
    ///
    /// Expiry is truncated to whole epoch seconds and dropped when it cannot
    /// be read; an unknown SameSite value is dropped the same way. Entries
    /// without a name are skipped.
    pub fn normalized(&self, domain: &str) -> Vec<SessionCookie> {
        self.entries
            .iter()
            .filter_map(|c| {
                let name = cookie_name(c).filter(|n| !n.is_empty())?;
                let mut cookie = SessionCookie::new(name, cookie_value(c), domain);

                if let Some(path) = c.get("path").and_then(Value::as_str) {
                    if path.starts_with('/') {
                        cookie.path = path.to_string();
                    }
                }
                cookie.expires = ["expirationDate", "expires", "expiry"]
                    .iter()
                    .find_map(|key| c.get(*key))
                    .and_then(parse_expiry);
                cookie.same_site = c
                    .get("sameSite")
                    .and_then(Value::as_str)
                    .and_then(SameSite::parse);
                cookie.secure = c.get("secure").and_then(Value::as_bool).unwrap_or(true);
                cookie.http_only = c
                    .get("httpOnly")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);

                Some(cookie)
            })
            .collect()
    }
}

fn cookie_name(c: &Value) -> Option<&str> {
    c.get("name")
        .or_else(|| c.get("key"))
        .and_then(Value::as_str)
}

fn cookie_value(c: &Value) -> &str {
    c.get("value").and_then(Value::as_str).unwrap_or_default()
}

fn parse_expiry(value: &Value) -> Option<i64> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (secs.is_finite() && secs > 0.0).then_some(secs.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"[
        {"name": "c_user", "value": "1000", "domain": "www.facebook.com", "path": "/",
         "expirationDate": 1767225600.123, "sameSite": "no_restriction", "secure": true},
        {"key": "xs", "value": "abc", "domain": ".facebook.com", "expires": "1767225600",
         "sameSite": "lax", "httpOnly": true},
        {"name": "fr", "value": "z", "expiry": "next tuesday", "sameSite": "bogus"},
        {"value": "nameless"}
    ]"#;

    #[test]
    fn parses_and_normalizes() {
        let bundle = CredentialBundle::from_json(EXPORT).unwrap();
        assert_eq!(bundle.len(), 4);
        assert!(bundle.contains("c_user"));
        assert!(bundle.contains("xs"));

        let cookies = bundle.normalized(".facebook.com");
        assert_eq!(cookies.len(), 3);
        assert!(cookies.iter().all(|c| c.domain == ".facebook.com"));

        assert_eq!(cookies[0].expires, Some(1_767_225_600));
        assert_eq!(cookies[0].same_site, Some(SameSite::None));

        assert_eq!(cookies[1].name, "xs");
        assert_eq!(cookies[1].expires, Some(1_767_225_600));
        assert_eq!(cookies[1].same_site, Some(SameSite::Lax));
        assert!(cookies[1].http_only);

        assert_eq!(cookies[2].expires, None);
        assert_eq!(cookies[2].same_site, None);
    }

    #[test]
    fn empty_identity_value_does_not_count() {
        let bundle = CredentialBundle::from_json(r#"[{"name": "c_user", "value": ""}]"#).unwrap();
        assert!(!bundle.contains("c_user"));
    }

    #[test]
    fn rejects_non_array() {
        assert!(matches!(
            CredentialBundle::from_json(r#"{"name": "c_user"}"#),
            Err(HarvestError::Credentials(_))
        ));
    }
}
