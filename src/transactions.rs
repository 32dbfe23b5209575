// 📜 Transaction Log - append-only record of deliveries and unloads
//
// Entries are never edited once appended. The only way to remove them is
// clearing a whole table.

use serde::{Deserialize, Serialize};

/// Timestamp format used in the Deliveries and Unloads tables
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// RECORDS
// ============================================================================

/// One row of the `Deliveries` table. Field order is the column order on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,

    /// Truck or ticket number
    #[serde(rename = "Truck", default)]
    pub truck: String,

    #[serde(rename = "Bin")]
    pub bin: String,

    #[serde(rename = "Variety", default)]
    pub variety: String,

    /// Bushels actually stored (after any capacity clamp)
    #[serde(rename = "Bushels")]
    pub bushels: f64,

    #[serde(rename = "Notes", default)]
    pub notes: String,
}

/// One row of the `Unloads` table. Field order is the column order on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unload {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,

    #[serde(rename = "Bin")]
    pub bin: String,

    /// Variety the bin held at the time of the unload
    #[serde(rename = "Variety", default)]
    pub variety: String,

    /// Bushels actually taken (after any stock clamp)
    #[serde(rename = "Bushels")]
    pub bushels: f64,

    #[serde(rename = "Destination", default)]
    pub destination: String,

    #[serde(rename = "Notes", default)]
    pub notes: String,
}

/// Borrowed view over either kind of record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LedgerEntry<'a> {
    Delivery(&'a Delivery),
    Unload(&'a Unload),
}

impl<'a> LedgerEntry<'a> {
    pub fn timestamp(&self) -> &'a str {
        match self {
            LedgerEntry::Delivery(d) => &d.timestamp,
            LedgerEntry::Unload(u) => &u.timestamp,
        }
    }

    pub fn bin(&self) -> &'a str {
        match self {
            LedgerEntry::Delivery(d) => &d.bin,
            LedgerEntry::Unload(u) => &u.bin,
        }
    }

    pub fn variety(&self) -> &'a str {
        match self {
            LedgerEntry::Delivery(d) => &d.variety,
            LedgerEntry::Unload(u) => &u.variety,
        }
    }

    pub fn quantity_accepted(&self) -> f64 {
        match self {
            LedgerEntry::Delivery(d) => d.bushels,
            LedgerEntry::Unload(u) => u.bushels,
        }
    }

    /// Signed effect on the bin: positive for deliveries, negative for unloads
    pub fn net_bushels(&self) -> f64 {
        match self {
            LedgerEntry::Delivery(d) => d.bushels,
            LedgerEntry::Unload(u) => -u.bushels,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEntry::Delivery(_) => "Delivery",
            LedgerEntry::Unload(_) => "Unload",
        }
    }
}

// ============================================================================
// TRANSACTION LOG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionLog {
    deliveries: Vec<Delivery>,
    unloads: Vec<Unload>,
}

impl TransactionLog {
    pub fn new() -> Self {
        TransactionLog::default()
    }

    pub fn from_records(deliveries: Vec<Delivery>, unloads: Vec<Unload>) -> Self {
        TransactionLog {
            deliveries,
            unloads,
        }
    }

    pub(crate) fn append_delivery(&mut self, delivery: Delivery) {
        self.deliveries.push(delivery);
    }

    pub(crate) fn append_unload(&mut self, unload: Unload) {
        self.unloads.push(unload);
    }

    /// Drop every delivery record. Returns how many were removed.
    pub fn clear_deliveries(&mut self) -> usize {
        let count = self.deliveries.len();
        self.deliveries.clear();
        tracing::info!(count, "deliveries cleared");
        count
    }

    /// Drop every unload record. Returns how many were removed.
    pub fn clear_unloads(&mut self) -> usize {
        let count = self.unloads.len();
        self.unloads.clear();
        tracing::info!(count, "unloads cleared");
        count
    }

    /// Deliveries in append order
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Unloads in append order
    pub fn unloads(&self) -> &[Unload] {
        &self.unloads
    }

    pub fn deliveries_newest_first(&self) -> Vec<&Delivery> {
        let mut rows: Vec<&Delivery> = self.deliveries.iter().collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows
    }

    pub fn unloads_newest_first(&self) -> Vec<&Unload> {
        let mut rows: Vec<&Unload> = self.unloads.iter().collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows
    }

    /// Every entry in timestamp order. Deliveries sort before unloads that
    /// share the same second.
    pub fn entries(&self) -> Vec<LedgerEntry<'_>> {
        let mut entries: Vec<LedgerEntry<'_>> = self
            .deliveries
            .iter()
            .map(LedgerEntry::Delivery)
            .chain(self.unloads.iter().map(LedgerEntry::Unload))
            .collect();
        // stable sort keeps append order within a kind
        entries.sort_by(|a, b| a.timestamp().cmp(b.timestamp()));
        entries
    }

    pub fn entries_for_bin(&self, bin: &str) -> Vec<LedgerEntry<'_>> {
        self.entries()
            .into_iter()
            .filter(|e| e.bin() == bin)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.deliveries.len() + self.unloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> (Vec<Delivery>, Vec<Unload>) {
        (self.deliveries, self.unloads)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(ts: &str, bin: &str, bushels: f64) -> Delivery {
        Delivery {
            timestamp: ts.to_string(),
            truck: "T-1".to_string(),
            bin: bin.to_string(),
            variety: "Wheat".to_string(),
            bushels,
            notes: String::new(),
        }
    }

    fn unload(ts: &str, bin: &str, bushels: f64) -> Unload {
        Unload {
            timestamp: ts.to_string(),
            bin: bin.to_string(),
            variety: "Wheat".to_string(),
            bushels,
            destination: "Elevator".to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_entries_are_chronological() {
        let mut log = TransactionLog::new();
        log.append_delivery(delivery("2024-09-01 08:00:00", "A", 600.0));
        log.append_unload(unload("2024-09-03 10:00:00", "A", 100.0));
        log.append_delivery(delivery("2024-09-02 09:30:00", "B", 50.0));

        let entries = log.entries();
        let order: Vec<&str> = entries.iter().map(|e| e.timestamp()).collect();
        assert_eq!(
            order,
            vec![
                "2024-09-01 08:00:00",
                "2024-09-02 09:30:00",
                "2024-09-03 10:00:00"
            ]
        );
        assert_eq!(entries[2].kind(), "Unload");
        assert_eq!(entries[2].net_bushels(), -100.0);
    }

    #[test]
    fn test_entries_for_bin() {
        let mut log = TransactionLog::new();
        log.append_delivery(delivery("2024-09-01 08:00:00", "A", 600.0));
        log.append_delivery(delivery("2024-09-01 08:05:00", "B", 50.0));
        log.append_unload(unload("2024-09-02 08:00:00", "A", 200.0));

        let a: f64 = log.entries_for_bin("A").iter().map(|e| e.net_bushels()).sum();
        assert_eq!(a, 400.0);
        assert_eq!(log.entries_for_bin("C").len(), 0);
    }

    #[test]
    fn test_newest_first_views() {
        let mut log = TransactionLog::new();
        log.append_delivery(delivery("2024-09-01 08:00:00", "A", 1.0));
        log.append_delivery(delivery("2024-09-05 08:00:00", "A", 2.0));

        let rows = log.deliveries_newest_first();
        assert_eq!(rows[0].bushels, 2.0);
        // underlying order untouched
        assert_eq!(log.deliveries()[0].bushels, 1.0);
    }

    #[test]
    fn test_clear_tables_independently() {
        let mut log = TransactionLog::new();
        log.append_delivery(delivery("2024-09-01 08:00:00", "A", 1.0));
        log.append_unload(unload("2024-09-02 08:00:00", "A", 1.0));

        assert_eq!(log.clear_deliveries(), 1);
        assert!(log.deliveries().is_empty());
        assert_eq!(log.unloads().len(), 1);

        assert_eq!(log.clear_unloads(), 1);
        assert!(log.is_empty());
    }
}
