//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! router's core workflows. Each use case is a self-contained business
//! operation.
//!
//! Use cases:
//! - `SmartOrderExecutor`: Venue selection, funding and submission
//! - `AccountTracker`: Balance, open-order and position snapshots

pub mod account_tracker;
pub mod executor;

pub use account_tracker::AccountTracker;
pub use executor::{ExecutionFailure, ExecutionReport, ExecutionStep, SmartOrderExecutor};
