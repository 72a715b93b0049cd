//! Shared utility functions.
//!
//! - `links`: canonicalization of page and post URLs

mod links;

pub use links::{absolutize, canonicalize_url, derive_handle};
