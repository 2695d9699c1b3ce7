use storeledger_core::BlockNumber;

/// A domain-agnostic event.
///
/// Events are immutable facts, versioned for schema evolution and meant to be
/// appended, never rewritten.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "store.product.bought").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Time step at which the event happened.
    fn block(&self) -> BlockNumber;
}
