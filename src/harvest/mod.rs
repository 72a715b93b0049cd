//! Page harvesting and the worker pool that drives it.

mod controller;
mod supervisor;

pub use controller::{PageHarvestController, PageHarvester, PageReport};
pub use supervisor::{RunState, RunSummary, TriggerOutcome, WorkerSupervisor};
