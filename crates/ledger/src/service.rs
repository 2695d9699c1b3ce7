//! Ledger service: the store aggregate behind one lock, with a journal and a bus.
//!
//! ```text
//! call (CallContext + args)
//!   ↓
//! 1. take the write lock
//!   ↓
//! 2. Store::handle (pure decision; rejection leaves everything untouched)
//!   ↓
//! 3. Store::apply + append envelopes to the journal
//!   ↓
//! 4. release the lock, publish envelopes to the bus (best effort)
//! ```
//!
//! Reads take the read lock and return owned snapshots, so they can run
//! concurrently with each other and never observe a half-applied call.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use storeledger_core::{Aggregate, AggregateRoot, BlockNumber, CallerId, DomainError, ProductId};
use storeledger_events::{Event, EventBus, EventEnvelope};

use crate::config::{ConfigError, LedgerConfig};
use crate::context::CallContext;
use crate::product::Product;
use crate::purchase::PurchaseState;
use crate::store::{
    AddProduct, BuyProduct, RefundProduct, Store, StoreCommand, StoreEvent, UpdateProductQuantity,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The call was rejected by the store's rules.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Construction-time configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A replayed journal was not a gap-free sequence starting at 1.
    #[error("journal out of order: expected sequence {expected}, found {found}")]
    JournalOutOfOrder { expected: u64, found: u64 },

    /// A replayed event could not have been produced by any accepted call.
    #[error("journal inconsistent at sequence {sequence}: {reason}")]
    JournalInconsistent { sequence: u64, reason: DomainError },

    /// A previous call panicked while holding the state lock.
    #[error("ledger state lock poisoned")]
    Poisoned,
}

impl LedgerError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            LedgerError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct LedgerState {
    store: Store,
    journal: Vec<EventEnvelope<StoreEvent>>,
}

impl LedgerState {
    fn next_sequence(&self) -> u64 {
        self.journal
            .last()
            .map(|e| e.sequence_number() + 1)
            .unwrap_or(1)
    }
}

/// Thread-safe inventory ledger.
///
/// `B` receives every committed event wrapped in an [`EventEnvelope`]. Use
/// `Arc<InMemoryEventBus<_>>` in-process, or any other [`EventBus`].
#[derive(Debug)]
pub struct InventoryLedger<B> {
    config: LedgerConfig,
    state: RwLock<LedgerState>,
    bus: B,
}

impl<B> InventoryLedger<B>
where
    B: EventBus<EventEnvelope<StoreEvent>>,
{
    pub fn new(config: LedgerConfig, bus: B) -> Result<Self, LedgerError> {
        config.validate()?;
        tracing::info!(
            owner = %config.owner,
            refund_window = config.refund_window,
            "inventory ledger initialized"
        );
        Ok(Self {
            state: RwLock::new(LedgerState {
                store: Store::from_config(&config),
                journal: Vec::new(),
            }),
            config,
            bus,
        })
    }

    /// Restore a ledger from a previously exported journal.
    ///
    /// Replayed events are not re-published.
    pub fn rehydrate<I>(config: LedgerConfig, journal: I, bus: B) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = EventEnvelope<StoreEvent>>,
    {
        config.validate()?;
        let mut store = Store::from_config(&config);
        let mut entries = Vec::new();

        for envelope in journal {
            let expected = entries.len() as u64 + 1;
            if envelope.sequence_number() != expected {
                return Err(LedgerError::JournalOutOfOrder {
                    expected,
                    found: envelope.sequence_number(),
                });
            }
            store
                .try_apply(envelope.payload())
                .map_err(|reason| LedgerError::JournalInconsistent {
                    sequence: expected,
                    reason,
                })?;
            entries.push(envelope);
        }

        tracing::info!(
            owner = %config.owner,
            events = entries.len(),
            products = store.products().len(),
            "inventory ledger rehydrated from journal"
        );

        Ok(Self {
            state: RwLock::new(LedgerState {
                store,
                journal: entries,
            }),
            config,
            bus,
        })
    }

    pub fn owner(&self) -> CallerId {
        self.config.owner
    }

    pub fn refund_window(&self) -> u64 {
        self.config.refund_window
    }

    // ─────────────────────────────────────────────────────────────────────
    // Administrator operations
    // ─────────────────────────────────────────────────────────────────────

    /// Add `quantity` units of `name`, creating the product on first sight.
    pub fn add_product(
        &self,
        ctx: CallContext,
        name: impl Into<String>,
        quantity: u64,
    ) -> Result<(), LedgerError> {
        self.execute(StoreCommand::AddProduct(AddProduct {
            caller: ctx.caller(),
            name: name.into(),
            quantity,
            block: ctx.block(),
        }))
        .map(drop)
    }

    /// Overwrite the quantity of an existing product.
    pub fn update_product_quantity(
        &self,
        ctx: CallContext,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<(), LedgerError> {
        self.execute(StoreCommand::UpdateProductQuantity(UpdateProductQuantity {
            caller: ctx.caller(),
            product_id,
            quantity,
            block: ctx.block(),
        }))
        .map(drop)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Buyer operations
    // ─────────────────────────────────────────────────────────────────────

    pub fn buy_product(&self, ctx: CallContext, product_id: ProductId) -> Result<(), LedgerError> {
        self.execute(StoreCommand::BuyProduct(BuyProduct {
            caller: ctx.caller(),
            product_id,
            block: ctx.block(),
        }))
        .map(drop)
    }

    pub fn refund_product(
        &self,
        ctx: CallContext,
        product_id: ProductId,
    ) -> Result<(), LedgerError> {
        self.execute(StoreCommand::RefundProduct(RefundProduct {
            caller: ctx.caller(),
            product_id,
            block: ctx.block(),
        }))
        .map(drop)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads (unrestricted)
    // ─────────────────────────────────────────────────────────────────────

    /// Every product in creation order.
    pub fn get_all_products(&self) -> Result<Vec<Product>, LedgerError> {
        Ok(self.read()?.store.products().to_vec())
    }

    pub fn get_product_by_name(&self, name: &str) -> Result<Product, LedgerError> {
        self.read()?
            .store
            .product_by_name(name)
            .cloned()
            .ok_or(LedgerError::Domain(DomainError::NotFound))
    }

    pub fn get_product(&self, product_id: ProductId) -> Result<Product, LedgerError> {
        self.read()?
            .store
            .product(product_id)
            .cloned()
            .ok_or(LedgerError::Domain(DomainError::NotFound))
    }

    pub fn purchase_state(
        &self,
        product_id: ProductId,
        buyer: CallerId,
    ) -> Result<PurchaseState, LedgerError> {
        Ok(self.read()?.store.purchase_state(product_id, buyer))
    }

    /// Committed events in order, suitable for [`InventoryLedger::rehydrate`].
    pub fn journal(&self) -> Result<Vec<EventEnvelope<StoreEvent>>, LedgerError> {
        Ok(self.read()?.journal.clone())
    }

    /// Number of events applied so far.
    pub fn version(&self) -> Result<u64, LedgerError> {
        Ok(self.read()?.store.version())
    }

    /// Latest block seen in a committed call, if any.
    pub fn last_block(&self) -> Result<Option<BlockNumber>, LedgerError> {
        Ok(self.read()?.journal.last().map(EventEnvelope::block))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, LedgerError> {
        self.state.read().map_err(|_| LedgerError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, LedgerError> {
        self.state.write().map_err(|_| LedgerError::Poisoned)
    }

    fn execute(
        &self,
        command: StoreCommand,
    ) -> Result<Vec<EventEnvelope<StoreEvent>>, LedgerError> {
        let caller = command.caller();
        let block = command.block();

        let committed = {
            let mut state = self.write()?;

            let events = match state.store.handle(&command) {
                Ok(events) => events,
                Err(err) => {
                    tracing::debug!(
                        command = command.name(),
                        caller = %caller,
                        block = block.get(),
                        error = %err,
                        "command rejected"
                    );
                    return Err(err.into());
                }
            };

            let mut committed = Vec::with_capacity(events.len());
            for event in events {
                state.store.apply(&event);
                let envelope = EventEnvelope::new(
                    Uuid::now_v7(),
                    state.next_sequence(),
                    event.event_type(),
                    caller,
                    block,
                    Utc::now(),
                    event,
                );
                state.journal.push(envelope.clone());
                committed.push(envelope);
            }
            committed
        };

        for envelope in &committed {
            tracing::info!(
                event_type = envelope.event_type(),
                sequence = envelope.sequence_number(),
                product_id = envelope.payload().product_id().get(),
                caller = %caller,
                block = block.get(),
                "event committed"
            );

            if let Err(err) = self.bus.publish(envelope.clone()) {
                tracing::warn!(
                    sequence = envelope.sequence_number(),
                    "failed to publish {}: {err:?}",
                    envelope.event_type()
                );
            }
        }

        Ok(committed)
    }
}
