//! Process-wide tracing setup for whatever hosts the ledger.

/// Tracing subscriber configuration (filters, JSON output).
pub mod tracing;

/// Initialize tracing for the process.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}
