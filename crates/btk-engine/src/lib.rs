pub mod engine;
pub mod ledger;
pub mod types;

pub use engine::{ReplayEngine, ReplayResult};
pub use ledger::{apply_fill, recompute_from_ledger, LedgerEntry};
pub use types::{BacktestConfig, ExecutionError};
