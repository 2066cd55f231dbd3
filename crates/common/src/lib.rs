//! Shared identity types used across the billing workspace.

mod types;

pub use types::AggregateId;
