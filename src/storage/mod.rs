// 💾 Storage - load/save contract for the three ledger tables
//
// A store loads every table fully into memory and saves every table in
// full after a mutation. The engine never streams or pages.

pub mod csv_store;
pub mod sqlite;

pub use csv_store::CsvStore;
pub use sqlite::SqliteStore;

use crate::bins::{Bin, BinRegistry};
use crate::engine::LedgerEngine;
use crate::error::{LedgerError, LedgerResult};
use crate::transactions::{Delivery, TransactionLog, Unload};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// TABLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    Bins,
    Deliveries,
    Unloads,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Bins, Table::Deliveries, Table::Unloads];

    pub fn file_name(&self) -> &'static str {
        match self {
            Table::Bins => "bin_setup.csv",
            Table::Deliveries => "deliveries.csv",
            Table::Unloads => "unloads.csv",
        }
    }

    /// Column headers, in on-disk order
    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            Table::Bins => &["Bin", "Capacity_bu", "Variety", "Bushels_in_bin"],
            Table::Deliveries => &["Timestamp", "Truck", "Bin", "Variety", "Bushels", "Notes"],
            Table::Unloads => &["Timestamp", "Bin", "Variety", "Bushels", "Destination", "Notes"],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Table::Bins => "bins",
            Table::Deliveries => "deliveries",
            Table::Unloads => "unloads",
        }
    }
}

impl FromStr for Table {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bins" | "bin_setup" => Ok(Table::Bins),
            "deliveries" => Ok(Table::Deliveries),
            "unloads" => Ok(Table::Unloads),
            other => Err(LedgerError::Backup(format!("unknown table \"{}\"", other))),
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Full contents of the three tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerTables {
    pub bins: Vec<Bin>,
    pub deliveries: Vec<Delivery>,
    pub unloads: Vec<Unload>,
}

impl LedgerTables {
    pub fn from_engine(engine: &LedgerEngine) -> Self {
        LedgerTables {
            bins: engine.registry().all().to_vec(),
            deliveries: engine.log().deliveries().to_vec(),
            unloads: engine.log().unloads().to_vec(),
        }
    }

    /// Validate the bin rows and split into registry + log
    pub fn into_state(self) -> LedgerResult<(BinRegistry, TransactionLog)> {
        let registry = BinRegistry::from_bins(self.bins)?;
        let log = TransactionLog::from_records(self.deliveries, self.unloads);
        Ok((registry, log))
    }

    /// Replace one table with the same table from `other`
    pub fn replace_table(&mut self, table: Table, other: LedgerTables) {
        match table {
            Table::Bins => self.bins = other.bins,
            Table::Deliveries => self.deliveries = other.deliveries,
            Table::Unloads => self.unloads = other.unloads,
        }
    }

    pub fn row_count(&self, table: Table) -> usize {
        match table {
            Table::Bins => self.bins.len(),
            Table::Deliveries => self.deliveries.len(),
            Table::Unloads => self.unloads.len(),
        }
    }
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

pub trait LedgerStore: Send {
    /// Read all three tables
    fn load(&self) -> LedgerResult<LedgerTables>;

    /// Replace all three tables
    fn save(&mut self, tables: &LedgerTables) -> LedgerResult<()>;

    /// Human-readable location, for logs and the CLI
    fn describe(&self) -> String;
}
