use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storeledger_core::{BlockNumber, CallerId};

/// Envelope for a committed event: journal position + call metadata.
///
/// This is the unit the ledger appends to its journal and hands to the bus.
///
/// - `sequence_number` is strictly increasing across the whole ledger,
///   starting at 1, so consumers can order and de-duplicate deliveries.
/// - `caller` and `block` are the call context that produced the event.
/// - `recorded_at` is wall-clock time and carries no business meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    sequence_number: u64,
    event_type: String,
    caller: CallerId,
    block: BlockNumber,
    recorded_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        sequence_number: u64,
        event_type: impl Into<String>,
        caller: CallerId,
        block: BlockNumber,
        recorded_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            sequence_number,
            event_type: event_type.into(),
            caller,
            block,
            recorded_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn caller(&self) -> CallerId {
        self.caller
    }

    pub fn block(&self) -> BlockNumber {
        self.block
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
