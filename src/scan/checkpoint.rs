//! The newest persisted post of a page, used to stop re-scanning.

use crate::models::Post;
use crate::parse::parse_canonical;

/// Stop marker for one page visit.
///
/// Feeds are reverse-chronological, so scanning from the top meets the
/// checkpoint before any older, already-stored post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    url: Option<String>,
    caption: Option<String>,
    posted_at: Option<String>,
}

impl Checkpoint {
    /// A checkpoint that never matches (first visit).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_newest(newest: Option<&Post>) -> Self {
        match newest {
            Some(post) => Self {
                url: post.url.clone().filter(|u| !u.is_empty()),
                caption: Some(post.caption.clone()).filter(|c| !c.trim().is_empty()),
                posted_at: post.posted_at.clone(),
            },
            None => Self::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.caption.is_none()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Whether `post` is the checkpoint post.
    ///
    /// URL identity when the checkpoint has one. Otherwise the caption must
    /// match, and when both sides carry a canonical date, the calendar day
    /// too (relative dates drift by hours between visits).
    pub fn matches(&self, post: &Post) -> bool {
        if let Some(url) = &self.url {
            return post.url.as_deref() == Some(url.as_str());
        }

        let Some(caption) = &self.caption else {
            return false;
        };
        if post.url.is_some() || post.caption != *caption {
            return false;
        }

        match (
            self.posted_at.as_deref().and_then(parse_canonical),
            post.timestamp(),
        ) {
            (Some(ours), Some(theirs)) => ours.date() == theirs.date(),
            _ => true,
        }
    }
}
