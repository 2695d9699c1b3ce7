use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use storeledger_core::{
    Aggregate, AggregateRoot, BlockNumber, CallerId, DomainError, DomainResult, ProductId,
};
use storeledger_events::Event;

use crate::config::LedgerConfig;
use crate::product::Product;
use crate::purchase::{PurchaseKey, PurchaseRecord, PurchaseState};

/// Aggregate root: the whole store (catalog + purchase records).
///
/// There is exactly one of these per ledger; every command is decided against
/// it and every event is applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    owner: CallerId,
    refund_window: u64,
    products: Vec<Product>,
    names: HashMap<String, ProductId>,
    purchases: HashMap<PurchaseKey, PurchaseRecord>,
    version: u64,
}

impl Store {
    pub fn new(owner: CallerId, refund_window: u64) -> Self {
        Self {
            owner,
            refund_window,
            products: Vec::new(),
            names: HashMap::new(),
            purchases: HashMap::new(),
            version: 0,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.owner, config.refund_window)
    }

    /// Rebuild state by replaying a journal of events in order.
    pub fn from_events<'a, I>(owner: CallerId, refund_window: u64, events: I) -> Self
    where
        I: IntoIterator<Item = &'a StoreEvent>,
    {
        let mut store = Self::new(owner, refund_window);
        for event in events {
            store.apply(event);
        }
        store
    }

    /// Apply an event from an untrusted journal.
    ///
    /// Rejects events that could not have been produced by `handle` against
    /// the current state; on rejection the store is left untouched.
    pub fn try_apply(&mut self, event: &StoreEvent) -> DomainResult<()> {
        self.check_replayable(event)?;
        self.apply(event);
        Ok(())
    }

    /// All products in creation order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn product(&self, product_id: ProductId) -> Option<&Product> {
        self.products.get(product_id.index()?)
    }

    pub fn product_by_name(&self, name: &str) -> Option<&Product> {
        self.names.get(name).and_then(|id| self.product(*id))
    }

    pub fn purchase_record(
        &self,
        product_id: ProductId,
        buyer: CallerId,
    ) -> Option<&PurchaseRecord> {
        self.purchases.get(&PurchaseKey::new(product_id, buyer))
    }

    pub fn purchase_state(&self, product_id: ProductId, buyer: CallerId) -> PurchaseState {
        PurchaseState::of(self.purchase_record(product_id, buyer))
    }

    fn product_mut(&mut self, product_id: ProductId) -> Option<&mut Product> {
        let index = product_id.index()?;
        self.products.get_mut(index)
    }
}

impl AggregateRoot for Store {
    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddProduct (owner only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddProduct {
    pub caller: CallerId,
    pub name: String,
    pub quantity: u64,
    pub block: BlockNumber,
}

/// Command: UpdateProductQuantity (owner only, overwrites).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductQuantity {
    pub caller: CallerId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub block: BlockNumber,
}

/// Command: BuyProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyProduct {
    pub caller: CallerId,
    pub product_id: ProductId,
    pub block: BlockNumber,
}

/// Command: RefundProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundProduct {
    pub caller: CallerId,
    pub product_id: ProductId,
    pub block: BlockNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreCommand {
    AddProduct(AddProduct),
    UpdateProductQuantity(UpdateProductQuantity),
    BuyProduct(BuyProduct),
    RefundProduct(RefundProduct),
}

impl StoreCommand {
    pub fn caller(&self) -> CallerId {
        match self {
            StoreCommand::AddProduct(c) => c.caller,
            StoreCommand::UpdateProductQuantity(c) => c.caller,
            StoreCommand::BuyProduct(c) => c.caller,
            StoreCommand::RefundProduct(c) => c.caller,
        }
    }

    pub fn block(&self) -> BlockNumber {
        match self {
            StoreCommand::AddProduct(c) => c.block,
            StoreCommand::UpdateProductQuantity(c) => c.block,
            StoreCommand::BuyProduct(c) => c.block,
            StoreCommand::RefundProduct(c) => c.block,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreCommand::AddProduct(_) => "add_product",
            StoreCommand::UpdateProductQuantity(_) => "update_product_quantity",
            StoreCommand::BuyProduct(_) => "buy_product",
            StoreCommand::RefundProduct(_) => "refund_product",
        }
    }
}

/// Event: ProductAdded (a new catalog entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAdded {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u64,
    pub block: BlockNumber,
}

/// Event: ProductRestocked (add-product on an existing name).
///
/// `quantity` is the resulting total, so replay never re-does arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRestocked {
    pub product_id: ProductId,
    pub added: u64,
    pub quantity: u64,
    pub block: BlockNumber,
}

/// Event: ProductQuantityUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductQuantityUpdated {
    pub product_id: ProductId,
    pub quantity: u64,
    pub block: BlockNumber,
}

/// Event: ProductBought (notification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductBought {
    pub buyer: CallerId,
    pub product_id: ProductId,
    pub block: BlockNumber,
}

/// Event: ProductRefund (notification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRefund {
    pub buyer: CallerId,
    pub product_id: ProductId,
    pub block: BlockNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    ProductAdded(ProductAdded),
    ProductRestocked(ProductRestocked),
    ProductQuantityUpdated(ProductQuantityUpdated),
    ProductBought(ProductBought),
    ProductRefund(ProductRefund),
}

impl StoreEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            StoreEvent::ProductAdded(e) => e.product_id,
            StoreEvent::ProductRestocked(e) => e.product_id,
            StoreEvent::ProductQuantityUpdated(e) => e.product_id,
            StoreEvent::ProductBought(e) => e.product_id,
            StoreEvent::ProductRefund(e) => e.product_id,
        }
    }

    /// Buyer-facing notifications (as opposed to catalog maintenance).
    pub fn is_buyer_notification(&self) -> bool {
        matches!(self, StoreEvent::ProductBought(_) | StoreEvent::ProductRefund(_))
    }
}

impl Event for StoreEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::ProductAdded(_) => "store.product.added",
            StoreEvent::ProductRestocked(_) => "store.product.restocked",
            StoreEvent::ProductQuantityUpdated(_) => "store.product.quantity_updated",
            StoreEvent::ProductBought(_) => "store.product.bought",
            StoreEvent::ProductRefund(_) => "store.product.refund",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn block(&self) -> BlockNumber {
        match self {
            StoreEvent::ProductAdded(e) => e.block,
            StoreEvent::ProductRestocked(e) => e.block,
            StoreEvent::ProductQuantityUpdated(e) => e.block,
            StoreEvent::ProductBought(e) => e.block,
            StoreEvent::ProductRefund(e) => e.block,
        }
    }
}

impl Aggregate for Store {
    type Command = StoreCommand;
    type Event = StoreEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StoreEvent::ProductAdded(e) => {
                // Ids are positional; an out-of-sequence id means a foreign journal.
                if e.product_id.index() == Some(self.products.len()) {
                    self.products
                        .push(Product::new(e.product_id, e.name.clone(), e.quantity));
                    self.names.insert(e.name.clone(), e.product_id);
                }
            }
            StoreEvent::ProductRestocked(e) => {
                if let Some(product) = self.product_mut(e.product_id) {
                    product.set_quantity(e.quantity);
                }
            }
            StoreEvent::ProductQuantityUpdated(e) => {
                if let Some(product) = self.product_mut(e.product_id) {
                    product.set_quantity(e.quantity);
                }
            }
            StoreEvent::ProductBought(e) => {
                if let Some(product) = self.product_mut(e.product_id) {
                    let remaining = product.quantity().saturating_sub(1);
                    product.set_quantity(remaining);
                }
                self.purchases.insert(
                    PurchaseKey::new(e.product_id, e.buyer),
                    PurchaseRecord {
                        purchased: true,
                        purchased_at: e.block,
                    },
                );
            }
            StoreEvent::ProductRefund(e) => {
                if let Some(product) = self.product_mut(e.product_id) {
                    let restored = product.quantity().saturating_add(1);
                    product.set_quantity(restored);
                }
                if let Some(record) = self
                    .purchases
                    .get_mut(&PurchaseKey::new(e.product_id, e.buyer))
                {
                    record.purchased = false;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StoreCommand::AddProduct(cmd) => self.handle_add(cmd),
            StoreCommand::UpdateProductQuantity(cmd) => self.handle_update_quantity(cmd),
            StoreCommand::BuyProduct(cmd) => self.handle_buy(cmd),
            StoreCommand::RefundProduct(cmd) => self.handle_refund(cmd),
        }
    }
}

impl Store {
    fn ensure_owner(&self, caller: CallerId) -> DomainResult<()> {
        if caller != self.owner {
            return Err(DomainError::Unauthorized);
        }
        Ok(())
    }

    fn existing(&self, product_id: ProductId) -> DomainResult<&Product> {
        self.product(product_id).ok_or_else(DomainError::not_found)
    }

    fn check_replayable(&self, event: &StoreEvent) -> DomainResult<()> {
        match event {
            StoreEvent::ProductAdded(e) => {
                if e.product_id != self.next_product_id()? {
                    return Err(DomainError::invalid_argument(format!(
                        "product {} added out of sequence",
                        e.product_id
                    )));
                }
                if e.name.is_empty() || self.names.contains_key(&e.name) {
                    return Err(DomainError::invalid_argument(format!(
                        "product name {:?} is empty or already taken",
                        e.name
                    )));
                }
            }
            StoreEvent::ProductRestocked(e) => {
                self.existing(e.product_id)?;
            }
            StoreEvent::ProductQuantityUpdated(e) => {
                self.existing(e.product_id)?;
            }
            StoreEvent::ProductBought(e) => {
                if !self.existing(e.product_id)?.in_stock() {
                    return Err(DomainError::OutOfStock);
                }
                if self.purchase_state(e.product_id, e.buyer).is_holding() {
                    return Err(DomainError::AlreadyPurchased);
                }
            }
            StoreEvent::ProductRefund(e) => {
                self.existing(e.product_id)?;
                if !self.purchase_state(e.product_id, e.buyer).is_holding() {
                    return Err(DomainError::NothingToRefund);
                }
            }
        }
        Ok(())
    }

    fn next_product_id(&self) -> DomainResult<ProductId> {
        u64::try_from(self.products.len())
            .map(ProductId::new)
            .map_err(|_| DomainError::invalid_argument("catalog is full"))
    }

    fn handle_add(&self, cmd: &AddProduct) -> DomainResult<Vec<StoreEvent>> {
        self.ensure_owner(cmd.caller)?;

        if cmd.name.is_empty() {
            return Err(DomainError::invalid_argument("name cannot be empty"));
        }

        if let Some(existing) = self.product_by_name(&cmd.name) {
            let quantity = existing
                .quantity()
                .checked_add(cmd.quantity)
                .ok_or_else(|| DomainError::invalid_argument("quantity overflow"))?;

            return Ok(vec![StoreEvent::ProductRestocked(ProductRestocked {
                product_id: existing.id(),
                added: cmd.quantity,
                quantity,
                block: cmd.block,
            })]);
        }

        Ok(vec![StoreEvent::ProductAdded(ProductAdded {
            product_id: self.next_product_id()?,
            name: cmd.name.clone(),
            quantity: cmd.quantity,
            block: cmd.block,
        })])
    }

    fn handle_update_quantity(
        &self,
        cmd: &UpdateProductQuantity,
    ) -> DomainResult<Vec<StoreEvent>> {
        self.ensure_owner(cmd.caller)?;
        self.existing(cmd.product_id)?;

        Ok(vec![StoreEvent::ProductQuantityUpdated(ProductQuantityUpdated {
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            block: cmd.block,
        })])
    }

    fn handle_buy(&self, cmd: &BuyProduct) -> DomainResult<Vec<StoreEvent>> {
        let product = self.existing(cmd.product_id)?;

        if !product.in_stock() {
            return Err(DomainError::OutOfStock);
        }

        if self.purchase_state(cmd.product_id, cmd.caller).is_holding() {
            return Err(DomainError::AlreadyPurchased);
        }

        Ok(vec![StoreEvent::ProductBought(ProductBought {
            buyer: cmd.caller,
            product_id: cmd.product_id,
            block: cmd.block,
        })])
    }

    fn handle_refund(&self, cmd: &RefundProduct) -> DomainResult<Vec<StoreEvent>> {
        let product = self.existing(cmd.product_id)?;

        let record = match self.purchase_record(cmd.product_id, cmd.caller) {
            Some(record) if record.purchased => record,
            _ => return Err(DomainError::NothingToRefund),
        };

        let elapsed = cmd.block.blocks_since(record.purchased_at);
        if elapsed >= self.refund_window {
            return Err(DomainError::refund_window_expired(elapsed, self.refund_window));
        }

        if product.quantity() == u64::MAX {
            return Err(DomainError::invalid_argument("quantity overflow"));
        }

        Ok(vec![StoreEvent::ProductRefund(ProductRefund {
            buyer: cmd.caller,
            product_id: cmd.product_id,
            block: cmd.block,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REFUND_WINDOW;

    struct Fixture {
        store: Store,
        owner: CallerId,
    }

    impl Fixture {
        fn new() -> Self {
            let owner = CallerId::new();
            Self {
                store: Store::new(owner, DEFAULT_REFUND_WINDOW),
                owner,
            }
        }

        fn run(&mut self, command: StoreCommand) -> DomainResult<Vec<StoreEvent>> {
            let events = self.store.handle(&command)?;
            for event in &events {
                self.store.apply(event);
            }
            Ok(events)
        }

        fn add(&mut self, name: &str, quantity: u64) -> DomainResult<Vec<StoreEvent>> {
            let caller = self.owner;
            self.run(StoreCommand::AddProduct(AddProduct {
                caller,
                name: name.to_string(),
                quantity,
                block: BlockNumber::GENESIS,
            }))
        }

        fn update(
            &mut self,
            caller: CallerId,
            id: u64,
            quantity: u64,
        ) -> DomainResult<Vec<StoreEvent>> {
            self.run(StoreCommand::UpdateProductQuantity(UpdateProductQuantity {
                caller,
                product_id: ProductId::new(id),
                quantity,
                block: BlockNumber::GENESIS,
            }))
        }

        fn buy(&mut self, buyer: CallerId, id: u64, block: u64) -> DomainResult<Vec<StoreEvent>> {
            self.run(StoreCommand::BuyProduct(BuyProduct {
                caller: buyer,
                product_id: ProductId::new(id),
                block: BlockNumber::new(block),
            }))
        }

        fn refund(
            &mut self,
            buyer: CallerId,
            id: u64,
            block: u64,
        ) -> DomainResult<Vec<StoreEvent>> {
            self.run(StoreCommand::RefundProduct(RefundProduct {
                caller: buyer,
                product_id: ProductId::new(id),
                block: BlockNumber::new(block),
            }))
        }

        fn quantity(&self, id: u64) -> u64 {
            self.store.product(ProductId::new(id)).unwrap().quantity()
        }
    }

    #[test]
    fn add_product_creates_entry_with_next_id() {
        let mut fx = Fixture::new();
        let events = fx.add("apple", 1).unwrap();

        match &events[0] {
            StoreEvent::ProductAdded(e) => {
                assert_eq!(e.product_id, ProductId::new(0));
                assert_eq!(e.name, "apple");
                assert_eq!(e.quantity, 1);
            }
            _ => panic!("Expected ProductAdded event"),
        }

        fx.add("pear", 4).unwrap();
        let pear = fx.store.product_by_name("pear").unwrap();
        assert_eq!(pear.id(), ProductId::new(1));
        assert_eq!(pear.quantity(), 4);
    }

    #[test]
    fn add_product_with_existing_name_accumulates() {
        let mut fx = Fixture::new();
        fx.add("orange", 10).unwrap();
        let events = fx.add("orange", 10).unwrap();

        assert!(matches!(
            &events[0],
            StoreEvent::ProductRestocked(e) if e.added == 10 && e.quantity == 20
        ));
        assert_eq!(fx.store.products().len(), 1);

        fx.add("orange", 1).unwrap();
        assert_eq!(fx.store.products().len(), 1);
        assert_eq!(fx.quantity(0), 21);
    }

    #[test]
    fn product_names_are_case_sensitive() {
        let mut fx = Fixture::new();
        fx.add("Kiwi", 1).unwrap();
        fx.add("kiwi", 1).unwrap();
        assert_eq!(fx.store.products().len(), 2);
        assert!(fx.store.product_by_name("KIWI").is_none());
    }

    #[test]
    fn add_product_rejects_non_owner() {
        let mut fx = Fixture::new();
        let err = fx
            .run(StoreCommand::AddProduct(AddProduct {
                caller: CallerId::new(),
                name: "apple".to_string(),
                quantity: 1,
                block: BlockNumber::GENESIS,
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
        assert!(fx.store.products().is_empty());
    }

    #[test]
    fn authorization_is_checked_before_arguments() {
        let mut fx = Fixture::new();
        let err = fx
            .run(StoreCommand::AddProduct(AddProduct {
                caller: CallerId::new(),
                name: String::new(),
                quantity: 1,
                block: BlockNumber::GENESIS,
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);

        let err = fx.update(CallerId::new(), 99, 1).unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[test]
    fn add_product_rejects_empty_name() {
        let mut fx = Fixture::new();
        let err = fx.add("", 1).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
        assert_eq!(fx.store.version(), 0);

        // Only the empty string is rejected; whitespace is a valid name.
        fx.add(" ", 1).unwrap();
        assert_eq!(fx.store.product_by_name(" ").unwrap().id(), ProductId::new(0));
    }

    #[test]
    fn add_product_rejects_quantity_overflow() {
        let mut fx = Fixture::new();
        fx.add("sand", u64::MAX).unwrap();
        let err = fx.add("sand", 1).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
        assert_eq!(fx.quantity(0), u64::MAX);
    }

    #[test]
    fn add_product_with_zero_quantity_is_allowed() {
        let mut fx = Fixture::new();
        fx.add("placeholder", 0).unwrap();
        assert_eq!(fx.quantity(0), 0);
    }

    #[test]
    fn update_quantity_overwrites() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        fx.add("banana", 10).unwrap();
        fx.update(owner, 0, 3).unwrap();
        assert_eq!(fx.quantity(0), 3);
    }

    #[test]
    fn update_quantity_rejects_unknown_product_and_non_owner() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        fx.add("banana", 10).unwrap();

        assert_eq!(fx.update(owner, 1, 3).unwrap_err(), DomainError::NotFound);
        assert_eq!(
            fx.update(CallerId::new(), 0, 3).unwrap_err(),
            DomainError::Unauthorized
        );
        assert_eq!(fx.quantity(0), 10);
    }

    #[test]
    fn buy_decrements_and_records_purchase() {
        let mut fx = Fixture::new();
        let buyer = CallerId::new();
        fx.add("banana", 10).unwrap();

        let events = fx.buy(buyer, 0, 7).unwrap();
        assert_eq!(
            events,
            vec![StoreEvent::ProductBought(ProductBought {
                buyer,
                product_id: ProductId::new(0),
                block: BlockNumber::new(7),
            })]
        );
        assert_eq!(fx.quantity(0), 9);

        let record = fx.store.purchase_record(ProductId::new(0), buyer).unwrap();
        assert!(record.purchased);
        assert_eq!(record.purchased_at, BlockNumber::new(7));
    }

    #[test]
    fn buy_twice_while_holding_is_rejected() {
        let mut fx = Fixture::new();
        let buyer = CallerId::new();
        fx.add("banana", 10).unwrap();

        fx.buy(buyer, 0, 1).unwrap();
        assert_eq!(fx.buy(buyer, 0, 2).unwrap_err(), DomainError::AlreadyPurchased);
        assert_eq!(fx.quantity(0), 9);
    }

    #[test]
    fn buy_rejects_unknown_and_empty_products() {
        let mut fx = Fixture::new();
        fx.add("banana", 0).unwrap();

        assert_eq!(fx.buy(CallerId::new(), 5, 0).unwrap_err(), DomainError::NotFound);
        assert_eq!(fx.buy(CallerId::new(), 0, 0).unwrap_err(), DomainError::OutOfStock);
    }

    #[test]
    fn refund_restores_stock_and_clears_purchase() {
        let mut fx = Fixture::new();
        let buyer = CallerId::new();
        fx.add("banana", 10).unwrap();
        fx.buy(buyer, 0, 10).unwrap();

        let events = fx.refund(buyer, 0, 20).unwrap();
        assert!(matches!(&events[0], StoreEvent::ProductRefund(e) if e.buyer == buyer));
        assert_eq!(fx.quantity(0), 10);
        assert_eq!(
            fx.store.purchase_state(ProductId::new(0), buyer),
            PurchaseState::Refunded
        );

        assert_eq!(fx.refund(buyer, 0, 21).unwrap_err(), DomainError::NothingToRefund);
    }

    #[test]
    fn refund_without_purchase_is_rejected() {
        let mut fx = Fixture::new();
        fx.add("banana", 10).unwrap();
        assert_eq!(
            fx.refund(CallerId::new(), 0, 0).unwrap_err(),
            DomainError::NothingToRefund
        );
        assert_eq!(fx.refund(CallerId::new(), 3, 0).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn refund_window_boundary_is_exclusive() {
        let mut fx = Fixture::new();
        let buyer = CallerId::new();
        fx.add("banana", 10).unwrap();
        fx.buy(buyer, 0, 50).unwrap();

        let err = fx.refund(buyer, 0, 150).unwrap_err();
        assert_eq!(err, DomainError::refund_window_expired(100, 100));
        assert_eq!(fx.quantity(0), 9);

        fx.refund(buyer, 0, 149).unwrap();
        assert_eq!(fx.quantity(0), 10);
    }

    #[test]
    fn refund_after_window_stays_rejected() {
        let mut fx = Fixture::new();
        let buyer = CallerId::new();
        fx.add("banana", 10).unwrap();
        fx.buy(buyer, 0, 0).unwrap();

        assert!(matches!(
            fx.refund(buyer, 0, 101).unwrap_err(),
            DomainError::RefundWindowExpired { elapsed: 101, .. }
        ));
        // Still holding: a second buy stays blocked.
        assert_eq!(fx.buy(buyer, 0, 102).unwrap_err(), DomainError::AlreadyPurchased);
    }

    #[test]
    fn buyer_may_repurchase_after_own_refund() {
        let mut fx = Fixture::new();
        let buyer = CallerId::new();
        fx.add("banana", 1).unwrap();

        fx.buy(buyer, 0, 1).unwrap();
        fx.refund(buyer, 0, 2).unwrap();
        fx.buy(buyer, 0, 300).unwrap();

        let record = fx.store.purchase_record(ProductId::new(0), buyer).unwrap();
        assert_eq!(record.purchased_at, BlockNumber::new(300));
        assert_eq!(fx.quantity(0), 0);

        // The window restarts from the new purchase.
        fx.refund(buyer, 0, 399).unwrap();
    }

    #[test]
    fn refund_cannot_overflow_quantity() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        let buyer = CallerId::new();
        fx.add("banana", 1).unwrap();
        fx.buy(buyer, 0, 0).unwrap();
        fx.update(owner, 0, u64::MAX).unwrap();

        let err = fx.refund(buyer, 0, 1).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
        assert!(fx.store.purchase_state(ProductId::new(0), buyer).is_holding());
    }

    #[test]
    fn multi_buyer_restock_scenario() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        let (b1, b2, b3) = (CallerId::new(), CallerId::new(), CallerId::new());
        fx.add("banana", 1).unwrap();

        fx.buy(b1, 0, 1).unwrap();
        assert_eq!(fx.quantity(0), 0);
        assert_eq!(fx.buy(b2, 0, 2).unwrap_err(), DomainError::OutOfStock);

        fx.update(owner, 0, 1).unwrap();
        fx.buy(b2, 0, 3).unwrap();
        fx.refund(b2, 0, 4).unwrap();
        assert_eq!(fx.quantity(0), 1);

        fx.buy(b3, 0, 5).unwrap();
        assert_eq!(fx.quantity(0), 0);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let mut fx = Fixture::new();
        let buyer = CallerId::new();
        fx.add("banana", 1).unwrap();
        let before = fx.store.clone();

        let cmd = StoreCommand::BuyProduct(BuyProduct {
            caller: buyer,
            product_id: ProductId::new(0),
            block: BlockNumber::new(1),
        });
        let first = fx.store.handle(&cmd).unwrap();
        let second = fx.store.handle(&cmd).unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.store, before);
    }

    #[test]
    fn version_increments_on_apply() {
        let mut fx = Fixture::new();
        let buyer = CallerId::new();
        assert_eq!(fx.store.version(), 0);

        fx.add("banana", 1).unwrap();
        fx.buy(buyer, 0, 1).unwrap();
        fx.refund(buyer, 0, 2).unwrap();
        assert_eq!(fx.store.version(), 3);

        let _ = fx.buy(CallerId::new(), 9, 3);
        assert_eq!(fx.store.version(), 3);
    }

    #[test]
    fn replay_rebuilds_identical_state() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        let buyer = CallerId::new();
        let mut journal = Vec::new();

        journal.extend(fx.add("banana", 2).unwrap());
        journal.extend(fx.add("banana", 3).unwrap());
        journal.extend(fx.add("apple", 1).unwrap());
        journal.extend(fx.buy(buyer, 0, 1).unwrap());
        journal.extend(fx.update(owner, 1, 7).unwrap());
        journal.extend(fx.refund(buyer, 0, 2).unwrap());

        let replayed = Store::from_events(owner, DEFAULT_REFUND_WINDOW, &journal);
        assert_eq!(replayed, fx.store);
    }

    #[test]
    fn try_apply_accepts_a_genuine_journal() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        let buyer = CallerId::new();
        let mut journal = Vec::new();

        journal.extend(fx.add("banana", 2).unwrap());
        journal.extend(fx.add("banana", 1).unwrap());
        journal.extend(fx.buy(buyer, 0, 1).unwrap());
        journal.extend(fx.update(owner, 0, 5).unwrap());
        journal.extend(fx.refund(buyer, 0, 2).unwrap());

        let mut replayed = Store::new(owner, DEFAULT_REFUND_WINDOW);
        for event in &journal {
            replayed.try_apply(event).unwrap();
        }
        assert_eq!(replayed, fx.store);
    }

    #[test]
    fn try_apply_rejects_events_no_command_could_produce() {
        let owner = CallerId::new();
        let buyer = CallerId::new();
        let mut store = Store::new(owner, DEFAULT_REFUND_WINDOW);

        let skipped_id = StoreEvent::ProductAdded(ProductAdded {
            product_id: ProductId::new(5),
            name: "apple".to_string(),
            quantity: 1,
            block: BlockNumber::GENESIS,
        });
        assert!(matches!(
            store.try_apply(&skipped_id).unwrap_err(),
            DomainError::InvalidArgument(_)
        ));

        let unknown_product = StoreEvent::ProductBought(ProductBought {
            buyer,
            product_id: ProductId::new(9),
            block: BlockNumber::new(1),
        });
        assert_eq!(store.try_apply(&unknown_product).unwrap_err(), DomainError::NotFound);

        assert_eq!(store, Store::new(owner, DEFAULT_REFUND_WINDOW));
        assert_eq!(store.purchase_state(ProductId::new(9), buyer), PurchaseState::NeverPurchased);

        let first = StoreEvent::ProductAdded(ProductAdded {
            product_id: ProductId::new(0),
            name: "apple".to_string(),
            quantity: 0,
            block: BlockNumber::GENESIS,
        });
        store.try_apply(&first).unwrap();

        let duplicate_name = StoreEvent::ProductAdded(ProductAdded {
            product_id: ProductId::new(1),
            name: "apple".to_string(),
            quantity: 3,
            block: BlockNumber::new(1),
        });
        assert!(store.try_apply(&duplicate_name).is_err());

        let bought_from_empty = StoreEvent::ProductBought(ProductBought {
            buyer,
            product_id: ProductId::new(0),
            block: BlockNumber::new(1),
        });
        assert_eq!(store.try_apply(&bought_from_empty).unwrap_err(), DomainError::OutOfStock);

        let refund_without_purchase = StoreEvent::ProductRefund(ProductRefund {
            buyer,
            product_id: ProductId::new(0),
            block: BlockNumber::new(2),
        });
        assert_eq!(
            store.try_apply(&refund_without_purchase).unwrap_err(),
            DomainError::NothingToRefund
        );
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn events_have_stable_type_names() {
        let buyer = CallerId::new();
        let bought = StoreEvent::ProductBought(ProductBought {
            buyer,
            product_id: ProductId::new(0),
            block: BlockNumber::new(4),
        });
        assert_eq!(bought.event_type(), "store.product.bought");
        assert_eq!(bought.block(), BlockNumber::new(4));
        assert!(bought.is_buyer_notification());

        let json = serde_json::to_value(&bought).unwrap();
        assert_eq!(json["ProductBought"]["product_id"], 0);
        assert_eq!(json["ProductBought"]["block"], 4);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add(usize, u64),
            Update(u64, u64),
            Buy(usize, u64),
            Refund(usize, u64),
        }

        const NAMES: [&str; 3] = ["apple", "banana", "cherry"];

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0..NAMES.len(), 0u64..5).prop_map(|(n, q)| Op::Add(n, q)),
                (0u64..4, 0u64..5).prop_map(|(id, q)| Op::Update(id, q)),
                (0usize..3, 0u64..4).prop_map(|(b, id)| Op::Buy(b, id)),
                (0usize..3, 0u64..4).prop_map(|(b, id)| Op::Refund(b, id)),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: repeated adds of one name keep one entry holding the sum.
            #[test]
            fn adds_accumulate_into_one_entry(
                quantities in prop::collection::vec(0u64..1_000, 1..20)
            ) {
                let mut fx = Fixture::new();
                for q in &quantities {
                    fx.add("orange", *q).unwrap();
                }
                prop_assert_eq!(fx.store.products().len(), 1);
                prop_assert_eq!(fx.quantity(0), quantities.iter().sum::<u64>());
            }

            /// Property: each successful buy/refund moves quantity by exactly one,
            /// failures move nothing, and no pair holds two purchases.
            #[test]
            fn quantity_moves_by_one_per_buy_or_refund(
                ops in prop::collection::vec(op(), 1..60),
                step in 0u64..60
            ) {
                let mut fx = Fixture::new();
                let owner = fx.owner;
                let buyers = [CallerId::new(), CallerId::new(), CallerId::new()];
                let mut block = 0u64;

                for op in ops {
                    block += step;
                    let before = fx.store.clone();
                    let result = match &op {
                        Op::Add(n, q) => fx.add(NAMES[*n], *q),
                        Op::Update(id, q) => fx.update(owner, *id, *q),
                        Op::Buy(b, id) => fx.buy(buyers[*b], *id, block),
                        Op::Refund(b, id) => fx.refund(buyers[*b], *id, block),
                    };

                    match (&op, result) {
                        (_, Err(_)) => prop_assert_eq!(&fx.store, &before),
                        (Op::Buy(b, id), Ok(_)) => {
                            let pid = ProductId::new(*id);
                            prop_assert!(!before.purchase_state(pid, buyers[*b]).is_holding());
                            prop_assert_eq!(
                                fx.store.product(pid).unwrap().quantity() + 1,
                                before.product(pid).unwrap().quantity()
                            );
                        }
                        (Op::Refund(b, id), Ok(_)) => {
                            let pid = ProductId::new(*id);
                            let bought_at =
                                before.purchase_record(pid, buyers[*b]).unwrap().purchased_at;
                            let elapsed = BlockNumber::new(block).blocks_since(bought_at);
                            prop_assert!(elapsed < DEFAULT_REFUND_WINDOW);
                            prop_assert_eq!(
                                fx.store.product(pid).unwrap().quantity(),
                                before.product(pid).unwrap().quantity() + 1
                            );
                        }
                        _ => {}
                    }
                }

                let names: std::collections::HashSet<&str> =
                    fx.store.products().iter().map(Product::name).collect();
                prop_assert_eq!(names.len(), fx.store.products().len());
            }
        }
    }
}
