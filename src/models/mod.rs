//! Data models for harvested channels and posts.

mod channel;
mod post;

pub use channel::{ChannelMeta, ChannelRecord, ChannelSummary, TargetPage};
pub use post::{Post, PostType};
