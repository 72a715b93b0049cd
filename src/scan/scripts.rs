//! Page scripts that drive and read the feed.
//!
//! Selectors are embedded as JSON string literals so arbitrary CSS survives
//! quoting.

use crate::extract::{LocatorConfig, ANCHOR_ATTRIBUTE};

/// Attribute marking captions already collected during this page load.
pub const SEEN_ATTRIBUTE: &str = "data-harvest-seen";

/// Scripts specialised for one locator.
#[derive(Debug, Clone)]
pub struct FeedScripts {
    snapshot: String,
    dismiss: String,
    followers: String,
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl FeedScripts {
    pub fn new(locator: &LocatorConfig) -> Self {
        Self {
            snapshot: snapshot_script(&locator.caption, locator.link_depth),
            dismiss: dismiss_script(&locator.overlay_close),
            followers: followers_script(&locator.follower_link),
        }
    }

    /// Scroll one step, or jump to the end when within `margin` of it.
    /// Returns `{height, atBottom}`.
    pub fn scroll(&self, increment: u32, margin: u32) -> String {
        format!(
            r#"(() => {{
    const el = document.scrollingElement || document.documentElement;
    const remaining = el.scrollHeight - (window.scrollY + window.innerHeight);
    if (remaining <= {margin}) {{
        window.scrollTo(0, el.scrollHeight);
    }} else {{
        window.scrollBy(0, {increment});
    }}
    const height = el.scrollHeight;
    const atBottom = height - (window.scrollY + window.innerHeight) <= 2;
    return {{ height, atBottom }};
}})()"#
        )
    }

    /// Scroll back up two screens; paired with a jump to the end.
    pub fn scroll_up(&self) -> &'static str {
        "(() => { window.scrollBy(0, -2 * window.innerHeight); return window.scrollY; })()"
    }

    pub fn scroll_to_end(&self) -> &'static str {
        "(() => { const el = document.scrollingElement || document.documentElement; window.scrollTo(0, el.scrollHeight); return el.scrollHeight; })()"
    }

    /// Click visible close buttons. Returns how many were clicked.
    pub fn dismiss(&self) -> &str {
        &self.dismiss
    }

    /// Mark and serialize captions not collected yet.
    /// Returns `[{key, text, html}]`.
    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    /// Texts of follower links in the page header.
    pub fn followers(&self) -> &str {
        &self.followers
    }
}

fn snapshot_script(caption_selector: &str, depth: usize) -> String {
    format!(
        r#"(() => {{
    const SELECTOR = {selector};
    const SEEN = {seen};
    const ANCHOR = {anchor};
    const DEPTH = {depth};
    window.__harvestSeq = window.__harvestSeq || 0;
    const out = [];
    for (const el of document.querySelectorAll(SELECTOR)) {{
        if (el.hasAttribute(SEEN)) continue;
        el.setAttribute(SEEN, '1');
        const key = String(++window.__harvestSeq);
        let text = '';
        let html = null;
        try {{
            for (const btn of el.querySelectorAll('div[role="button"]')) {{
                if (/^see more$/i.test((btn.innerText || '').trim())) btn.click();
            }}
            text = (el.innerText || el.textContent || '').trim();
            let root = el;
            for (let i = 0; i < DEPTH && root.parentElement && root.parentElement !== document.body; i++) {{
                root = root.parentElement;
            }}
            if (el.isConnected) {{
                el.setAttribute(ANCHOR, key);
                html = root.outerHTML;
            }}
        }} catch (e) {{
            html = null;
        }} finally {{
            el.removeAttribute(ANCHOR);
        }}
        out.push({{ key, text, html }});
    }}
    return out;
}})()"#,
        selector = js_string(caption_selector),
        seen = js_string(SEEN_ATTRIBUTE),
        anchor = js_string(ANCHOR_ATTRIBUTE),
        depth = depth,
    )
}

fn dismiss_script(close_selector: &str) -> String {
    format!(
        r#"(() => {{
    let clicked = 0;
    for (const btn of document.querySelectorAll({selector})) {{
        if (btn.offsetParent === null) continue;
        try {{ btn.click(); clicked++; }} catch (e) {{}}
    }}
    return clicked;
}})()"#,
        selector = js_string(close_selector),
    )
}

fn followers_script(link_selector: &str) -> String {
    format!(
        r#"(() => Array.from(document.querySelectorAll({selector}))
    .map(a => (a.innerText || a.textContent || '').trim())
    .filter(t => t.length > 0))()"#,
        selector = js_string(link_selector),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_quoted_as_json() {
        let scripts = FeedScripts::new(&LocatorConfig::default());
        assert!(scripts
            .snapshot()
            .contains(r#"const SELECTOR = "div[data-ad-preview=\"message\"], div[data-ad-comet-preview=\"message\"]";"#));
        assert!(scripts.snapshot().contains("const DEPTH = 15;"));
        assert!(scripts.followers().contains(r#""a[href*=\"followers\"]""#));
    }

    #[test]
    fn scroll_embeds_increment_and_margin() {
        let scripts = FeedScripts::new(&LocatorConfig::default());
        let js = scripts.scroll(1200, 1500);
        assert!(js.contains("window.scrollBy(0, 1200)"));
        assert!(js.contains("remaining <= 1500"));
    }
}
