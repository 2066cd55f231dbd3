//! Domain layer for the billing system.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits for event-sourced entities
//! - Invoice and CreditNote aggregates with the specification-based
//!   validation they share
//! - The FIFO lot-based inventory engine
//! - AggregateRepository for replay and persistence
//! - BillingService coordinating emission end to end

pub mod aggregate;
pub mod billing;
pub mod error;
pub mod inventory;
pub mod repository;
pub mod service;
pub mod values;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use billing::{
    BillingEvent, CreditNote, CreditNotePolicy, DocumentEmittedData, DocumentError, DocumentKind,
    DocumentStatus, Invoice, SpecSet, StockChangedData,
};
pub use error::DomainError;
pub use inventory::{
    InventoryEngine, InventoryError, InventoryKey, Lot, LotLedger, MovementDirection,
    MovementRecord, StockLevel,
};
pub use repository::AggregateRepository;
pub use service::BillingService;
pub use values::{
    DocumentDates, DocumentLine, LotId, Money, ProductId, TaxRate, WarehouseId,
};
