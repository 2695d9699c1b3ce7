use serde::{Deserialize, Serialize};

use storeledger_core::ProductId;

/// A catalog entry.
///
/// `id` is the product's position in the catalog and `name` is unique across
/// the catalog; both are fixed at creation. Only `quantity` changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    quantity: u64,
}

impl Product {
    pub(crate) fn new(id: ProductId, name: String, quantity: u64) -> Self {
        Self { id, name, quantity }
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }

    pub(crate) fn set_quantity(&mut self, quantity: u64) {
        self.quantity = quantity;
    }
}
