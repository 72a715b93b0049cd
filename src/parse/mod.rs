//! Parsers for the human-readable values platforms display.

pub mod count;
pub mod dates;

pub use count::parse_count;
pub use dates::{format_canonical, from_epoch, normalize_date, parse_canonical, CANONICAL_FORMAT};
