//! Per-buyer purchase records.

use serde::{Deserialize, Serialize};

use storeledger_core::{BlockNumber, CallerId, ProductId};

/// Flat compound key for a purchase record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurchaseKey {
    pub product_id: ProductId,
    pub buyer: CallerId,
}

impl PurchaseKey {
    pub fn new(product_id: ProductId, buyer: CallerId) -> Self {
        Self { product_id, buyer }
    }
}

/// What the ledger remembers about one buyer and one product.
///
/// Records are never removed; a refund only clears `purchased`.
/// `purchased_at` is stale while `purchased` is false.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub purchased: bool,
    pub purchased_at: BlockNumber,
}

impl PurchaseRecord {
    pub fn state(&self) -> PurchaseState {
        if self.purchased {
            PurchaseState::Holding
        } else {
            PurchaseState::Refunded
        }
    }
}

/// Buyer-facing lifecycle of a `(product, buyer)` pair.
///
/// ```text
/// NeverPurchased --buy--> Holding --refund--> Refunded --buy--> Holding
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    NeverPurchased,
    Holding,
    Refunded,
}

impl PurchaseState {
    pub fn of(record: Option<&PurchaseRecord>) -> Self {
        record.map_or(PurchaseState::NeverPurchased, PurchaseRecord::state)
    }

    pub fn is_holding(self) -> bool {
        self == PurchaseState::Holding
    }
}
