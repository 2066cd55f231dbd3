//! Read models and projections for the CQRS query side.
//!
//! This crate provides the query side of the billing system:
//! - [`Projection`] trait for processing events into read models
//! - [`ReadModel`] trait for query access to denormalized data
//! - [`ProjectionProcessor`] for catch-up and rebuild from the store
//! - [`FactBus`] and [`ProjectionConsumer`] for live fact delivery
//! - [`QueryService`] answering queries from the stock and document views

pub mod error;
pub mod processor;
pub mod projection;
pub mod publisher;
pub mod query;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use publisher::{FactBus, ProjectionConsumer, PublishedFact, topic_for};
pub use query::QueryService;
pub use read_model::ReadModel;
pub use views::{DocumentSummary, DocumentSummaryView, StockView};
