//! The stock-sync core: mapping resolution, the atomic stock ledger, the
//! rate-limited fan-out propagator, and the idempotent order processor.
//!
//! One paid-order event flows: idempotency check against the order log →
//! per line item: mapping resolution → atomic ledger decrement → fan-out of
//! the new count to every sibling graphic variant → incremental audit-log
//! updates → terminal log write.

mod error;
mod ledger;
mod payload;
mod processor;
mod propagator;
mod resolver;

pub use error::{EngineError, Result};
pub use ledger::StockLedger;
pub use payload::{LineItem, OrderPayload};
pub use processor::{
    EngineSettings, OrderProcessor, OverrideOutcome, OverrideRequest, ProcessDisposition,
    ProcessOutcome,
};
pub use propagator::{NullSink, ProgressSink, PropagationSummary, Propagator};
pub use resolver::MappingResolver;
