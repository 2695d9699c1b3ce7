//! Inventory ledger: a single-owner product catalog with per-buyer purchases
//! and a block-bounded refund window.
//!
//! - [`store`] holds the pure decision logic (no IO, no locking).
//! - [`service`] wraps it for concurrent callers: one lock, an append-only
//!   journal and post-commit notifications on an event bus.

pub mod config;
pub mod context;
pub mod product;
pub mod purchase;
pub mod service;
pub mod store;

pub use config::{ConfigError, DEFAULT_REFUND_WINDOW, LedgerConfig};
pub use context::CallContext;
pub use product::Product;
pub use purchase::{PurchaseKey, PurchaseRecord, PurchaseState};
pub use service::{InventoryLedger, LedgerError};
pub use store::{
    AddProduct, BuyProduct, ProductAdded, ProductBought, ProductQuantityUpdated, ProductRefund,
    ProductRestocked, RefundProduct, Store, StoreCommand, StoreEvent, UpdateProductQuantity,
};
