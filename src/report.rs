// 📊 Reports - farm totals, bin status and ledger reconciliation
//
// Read-only projections over the registry and the log, shaped for the
// dashboard, the bin status table and the API.

use crate::bins::{Bin, BinRegistry};
use crate::transactions::TransactionLog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// FARM SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarietyTotal {
    pub variety: String,
    pub bushels: f64,
    pub bins: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmSummary {
    pub bin_count: usize,
    pub total_capacity: f64,
    pub total_in_bins: f64,
    pub uncapped_bins: usize,
    /// Non-empty varieties only, sorted by name
    pub by_variety: Vec<VarietyTotal>,
}

impl FarmSummary {
    pub fn from_registry(registry: &BinRegistry) -> Self {
        let mut by_variety: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for bin in registry.all().iter().filter(|b| b.is_assigned()) {
            let entry = by_variety.entry(bin.variety.clone()).or_insert((0.0, 0));
            entry.0 += bin.fill;
            entry.1 += 1;
        }

        FarmSummary {
            bin_count: registry.len(),
            total_capacity: registry.all().iter().map(|b| b.capacity).sum(),
            total_in_bins: registry.all().iter().map(|b| b.fill).sum(),
            uncapped_bins: registry.all().iter().filter(|b| b.is_uncapped()).count(),
            by_variety: by_variety
                .into_iter()
                .map(|(variety, (bushels, bins))| VarietyTotal {
                    variety,
                    bushels,
                    bins,
                })
                .collect(),
        }
    }
}

// ============================================================================
// BIN STATUS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinStatus {
    pub bin: String,
    pub variety: String,
    pub capacity: f64,
    pub in_bin: f64,
    /// `None` for uncapped bins
    pub remaining: Option<f64>,
    pub percent_full: f64,
    /// Fill above capacity, carried over from an older table
    pub over_capacity: bool,
}

impl From<&Bin> for BinStatus {
    fn from(bin: &Bin) -> Self {
        BinStatus {
            bin: bin.name.clone(),
            variety: bin.variety.clone(),
            capacity: bin.capacity,
            in_bin: bin.fill,
            remaining: bin.remaining(),
            percent_full: bin.percent_full(),
            over_capacity: bin.is_over_capacity(),
        }
    }
}

pub fn bin_status(registry: &BinRegistry) -> Vec<BinStatus> {
    registry.all().iter().map(BinStatus::from).collect()
}

// ============================================================================
// RECONCILIATION
// ============================================================================

/// A bin whose fill does not match what the log says went in and out.
///
/// Fill resets, cleared log tables and restores all produce these
/// legitimately, so this is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinDiscrepancy {
    pub bin: String,
    pub delivered: f64,
    pub unloaded: f64,
    pub expected_fill: f64,
    pub actual_fill: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub bins_checked: usize,
    pub discrepancies: Vec<BinDiscrepancy>,
    /// Log entries naming bins that no longer exist
    pub orphaned_entries: usize,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Tolerance for floating-point comparisons (bushels)
const TOLERANCE: f64 = 0.01;

pub fn reconcile(registry: &BinRegistry, log: &TransactionLog) -> ReconciliationReport {
    let mut flows: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for d in log.deliveries() {
        flows.entry(d.bin.as_str()).or_insert((0.0, 0.0)).0 += d.bushels;
    }
    for u in log.unloads() {
        flows.entry(u.bin.as_str()).or_insert((0.0, 0.0)).1 += u.bushels;
    }

    let orphaned_entries = log
        .entries()
        .iter()
        .filter(|e| registry.get(e.bin()).is_none())
        .count();

    let discrepancies = registry
        .all()
        .iter()
        .filter_map(|bin| {
            let (delivered, unloaded) = flows.get(bin.name.as_str()).copied().unwrap_or((0.0, 0.0));
            let expected_fill = delivered - unloaded;
            let difference = bin.fill - expected_fill;
            if difference.abs() < TOLERANCE {
                return None;
            }
            Some(BinDiscrepancy {
                bin: bin.name.clone(),
                delivered,
                unloaded,
                expected_fill,
                actual_fill: bin.fill,
                difference,
            })
        })
        .collect();

    ReconciliationReport {
        bins_checked: registry.len(),
        discrepancies,
        orphaned_entries,
    }
}

// ============================================================================
// TESTS
// ============================================================================
