//! Read model views for the CQRS query side.

pub mod document_summary;
pub mod stock;

pub use document_summary::{DocumentSummary, DocumentSummaryView};
pub use stock::StockView;
