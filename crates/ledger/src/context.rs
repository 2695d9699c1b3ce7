use serde::{Deserialize, Serialize};

use storeledger_core::{BlockNumber, CallerId};

/// Execution context for one call, supplied by the environment.
///
/// Immutable; the ledger trusts `caller` as unforgeable and never advances
/// `block` itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    caller: CallerId,
    block: BlockNumber,
}

impl CallContext {
    pub fn new(caller: CallerId, block: BlockNumber) -> Self {
        Self { caller, block }
    }

    pub fn caller(&self) -> CallerId {
        self.caller
    }

    pub fn block(&self) -> BlockNumber {
        self.block
    }

    /// Same caller, later block.
    pub fn at(self, block: BlockNumber) -> Self {
        Self { block, ..self }
    }
}
