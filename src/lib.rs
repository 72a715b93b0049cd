//! Engagement harvester - incremental collection of public post metrics.
//!
//! Drives an authenticated browser session over a fixed list of pages,
//! discovers posts newer than the last persisted one, extracts engagement
//! counts with structural DOM heuristics, and stores them per channel.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod models;
pub mod parse;
pub mod scan;
pub mod schema;
pub mod server;
pub mod session;
pub mod store;
pub mod utils;

pub use error::{HarvestError, StoreError};
