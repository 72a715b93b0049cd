//! Scroll-driven incremental scanning of a page feed.

mod checkpoint;
mod scanner;
mod scripts;
mod surface;

pub use checkpoint::Checkpoint;
pub use scanner::{FlushTarget, IncrementalScanner, ScanOutcome, StopReason};
pub use scripts::FeedScripts;
pub use surface::{BrowserFeed, FeedSurface, ScrollState};
