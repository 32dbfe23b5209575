// Grain Ledger - Core Library
// Bin inventory for a farm: deliveries in, unloads out, one variety per bin.
// Exposes all modules for use in the CLI, the API server, and tests

pub mod error;
pub mod bins;
pub mod transactions;
pub mod engine;
pub mod storage;
pub mod backup;
pub mod session;
pub mod report;
pub mod settings;

// Re-export commonly used types
pub use error::{LedgerError, LedgerResult, LedgerWarning};
pub use bins::{Bin, BinRegistry};
pub use transactions::{Delivery, LedgerEntry, TransactionLog, Unload, TIMESTAMP_FORMAT};
pub use engine::{
    Clock, DeliveryOutcome, DeliveryRequest, LedgerEngine, UnloadOutcome, UnloadRequest,
};
pub use storage::{CsvStore, LedgerStore, LedgerTables, SqliteStore, Table};
pub use backup::{BackupManager, BackupManifest, BackupPolicy};
pub use session::FarmSession;
pub use report::{
    bin_status, reconcile, BinDiscrepancy, BinStatus, FarmSummary, ReconciliationReport,
    VarietyTotal,
};
pub use settings::Settings;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
