// 🧺 Bin Registry - storage bins, their capacity, variety and fill
//
// A bin holds at most one grain variety at a time. Capacity 0 means the
// bin is uncapped. Fill only moves through the ledger engine; everything
// else here is setup and administration.

use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// BIN
// ============================================================================

/// One row of the `Bins` table. Field order is the column order on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    #[serde(rename = "Bin")]
    pub name: String,

    /// Bushels; 0 = uncapped
    #[serde(rename = "Capacity_bu", default, deserialize_with = "blank_as_zero")]
    pub capacity: f64,

    /// Assigned variety; empty = unassigned
    #[serde(rename = "Variety", default)]
    pub variety: String,

    #[serde(rename = "Bushels_in_bin", default, deserialize_with = "blank_as_zero")]
    pub fill: f64,
}

/// Older tables left the numeric cells blank; treat those as zero.
fn blank_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

impl Bin {
    pub fn new(name: &str, capacity: f64, variety: &str) -> Self {
        Bin {
            name: name.trim().to_string(),
            capacity,
            variety: variety.trim().to_string(),
            fill: 0.0,
        }
    }

    /// Empty placeholder bin as created when a farm is first set up
    pub fn placeholder(index: usize) -> Self {
        Bin::new(&format!("Bin {}", index), 0.0, "")
    }

    pub fn is_uncapped(&self) -> bool {
        self.capacity <= 0.0
    }

    pub fn is_assigned(&self) -> bool {
        !self.variety.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.fill <= 0.0
    }

    /// Room left in the bin; `None` when uncapped
    pub fn remaining(&self) -> Option<f64> {
        if self.is_uncapped() {
            None
        } else {
            Some((self.capacity - self.fill).max(0.0))
        }
    }

    /// Fill above a set capacity, only possible in tables written before
    /// deliveries were clamped
    pub fn is_over_capacity(&self) -> bool {
        !self.is_uncapped() && self.fill > self.capacity
    }

    /// Fill as a percentage of capacity, clamped to 0..=100 (0 when uncapped)
    pub fn percent_full(&self) -> f64 {
        if self.is_uncapped() {
            return 0.0;
        }
        (100.0 * self.fill / self.capacity).clamp(0.0, 100.0)
    }
}

fn check_capacity(bin: &str, capacity: f64) -> LedgerResult<()> {
    if !capacity.is_finite() || capacity < 0.0 {
        return Err(LedgerError::InvalidCapacity {
            bin: bin.to_string(),
            reason: format!("{} is not a non-negative number", capacity),
        });
    }
    Ok(())
}

// ============================================================================
// BIN REGISTRY
// ============================================================================

/// The set of bins on the farm, in table order.
///
/// Every mutation validates first and only then touches state, so a
/// failed call leaves the registry exactly as it was.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinRegistry {
    bins: Vec<Bin>,
}

impl BinRegistry {
    pub fn new() -> Self {
        BinRegistry { bins: Vec::new() }
    }

    /// Build a registry from persisted rows, rejecting duplicate names and
    /// negative or non-numeric quantities. Over-capacity rows are kept.
    pub fn from_bins(bins: Vec<Bin>) -> LedgerResult<Self> {
        let mut registry = BinRegistry::new();

        for mut bin in bins {
            bin.name = bin.name.trim().to_string();
            if registry.get(&bin.name).is_some() {
                return Err(LedgerError::DuplicateBin(bin.name));
            }
            check_capacity(&bin.name, bin.capacity)?;
            if !bin.fill.is_finite() || bin.fill < 0.0 {
                return Err(LedgerError::Persistence(format!(
                    "bin \"{}\" has invalid fill {}",
                    bin.name, bin.fill
                )));
            }
            if bin.is_over_capacity() {
                // older tables were never clamped; load them so the
                // capacity can be fixed, deliveries just find no room
                tracing::warn!(
                    bin = %bin.name,
                    fill = bin.fill,
                    capacity = bin.capacity,
                    "bin holds more than its capacity"
                );
            }
            registry.bins.push(bin);
        }

        Ok(registry)
    }

    pub fn add_bin(&mut self, name: &str, capacity: f64, variety: &str) -> LedgerResult<Bin> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidBinName);
        }
        if self.get(name).is_some() {
            return Err(LedgerError::DuplicateBin(name.to_string()));
        }
        check_capacity(name, capacity)?;

        let bin = Bin::new(name, capacity, variety);
        self.bins.push(bin.clone());

        tracing::info!(bin = %bin.name, capacity, variety = %bin.variety, "bin added");
        Ok(bin)
    }

    /// Edit capacity and/or variety.
    ///
    /// Overwriting the variety of a non-empty bin is an unchecked
    /// administrative override: nothing stops it, but it is logged.
    pub fn update_bin(
        &mut self,
        name: &str,
        capacity: Option<f64>,
        variety: Option<&str>,
    ) -> LedgerResult<Bin> {
        let index = self.index_of(name)?;

        if let Some(capacity) = capacity {
            check_capacity(name, capacity)?;
            let fill = self.bins[index].fill;
            if capacity > 0.0 && fill > capacity {
                return Err(LedgerError::InvalidCapacity {
                    bin: name.to_string(),
                    reason: format!("capacity {} is below current fill {}", capacity, fill),
                });
            }
        }

        let bin = &mut self.bins[index];
        if let Some(capacity) = capacity {
            bin.capacity = capacity;
        }
        if let Some(variety) = variety {
            let variety = variety.trim();
            if !bin.is_empty() && bin.variety != variety {
                tracing::warn!(
                    bin = %bin.name,
                    from = %bin.variety,
                    to = %variety,
                    fill = bin.fill,
                    "variety overridden on a non-empty bin"
                );
            }
            bin.variety = variety.to_string();
        }

        tracing::info!(bin = %bin.name, capacity = bin.capacity, variety = %bin.variety, "bin updated");
        Ok(bin.clone())
    }

    pub fn remove_bin(&mut self, name: &str) -> LedgerResult<Bin> {
        let index = self.index_of(name)?;
        let fill = self.bins[index].fill;
        if fill > 0.0 {
            return Err(LedgerError::BinNotEmpty {
                bin: name.to_string(),
                fill,
            });
        }

        let removed = self.bins.remove(index);
        tracing::info!(bin = %removed.name, "bin removed");
        Ok(removed)
    }

    pub fn clear_variety(&mut self, name: &str) -> LedgerResult<Bin> {
        let index = self.index_of(name)?;
        let bin = &mut self.bins[index];
        if bin.fill != 0.0 {
            return Err(LedgerError::BinNotEmpty {
                bin: name.to_string(),
                fill: bin.fill,
            });
        }

        bin.variety.clear();
        tracing::info!(bin = %bin.name, "variety cleared");
        Ok(bin.clone())
    }

    /// Zero every bin's fill. Varieties and capacities stay as they are.
    pub fn reset_all_fill(&mut self) -> usize {
        for bin in self.bins.iter_mut() {
            bin.fill = 0.0;
        }
        tracing::info!(bins = self.bins.len(), "all bins reset to 0 bu");
        self.bins.len()
    }

    /// Add `Bin 1` .. `Bin count` placeholders, skipping names already taken.
    /// Returns how many bins were created.
    pub fn seed_placeholders(&mut self, count: usize) -> usize {
        let mut created = 0;
        for index in 1..=count {
            let bin = Bin::placeholder(index);
            if self.get(&bin.name).is_none() {
                self.bins.push(bin);
                created += 1;
            }
        }
        if created > 0 {
            tracing::info!(created, "placeholder bins seeded");
        }
        created
    }

    /// Look up a bin; surrounding whitespace in `name` is ignored
    pub fn get(&self, name: &str) -> Option<&Bin> {
        let name = name.trim();
        self.bins.iter().find(|b| b.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> LedgerResult<&mut Bin> {
        let name = name.trim();
        self.bins
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| LedgerError::BinNotFound(name.to_string()))
    }

    pub fn all(&self) -> &[Bin] {
        &self.bins
    }

    pub fn names(&self) -> Vec<String> {
        self.bins.iter().map(|b| b.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn into_bins(self) -> Vec<Bin> {
        self.bins
    }

    fn index_of(&self, name: &str) -> LedgerResult<usize> {
        let name = name.trim();
        self.bins
            .iter()
            .position(|b| b.name == name)
            .ok_or_else(|| LedgerError::BinNotFound(name.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(name: &str, capacity: f64, fill: f64, variety: &str) -> BinRegistry {
        BinRegistry::from_bins(vec![Bin {
            name: name.to_string(),
            capacity,
            variety: variety.to_string(),
            fill,
        }])
        .unwrap()
    }

    #[test]
    fn test_add_bin_starts_empty() {
        let mut registry = BinRegistry::new();
        let bin = registry.add_bin("  North  ", 5000.0, " Barley ").unwrap();

        assert_eq!(bin.name, "North");
        assert_eq!(bin.variety, "Barley");
        assert_eq!(bin.fill, 0.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_duplicate_bin_fails() {
        let mut registry = BinRegistry::new();
        registry.add_bin("North", 5000.0, "").unwrap();

        let err = registry.add_bin("North", 100.0, "").unwrap_err();
        assert_eq!(err, LedgerError::DuplicateBin("North".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_bin_rejects_negative_capacity_and_blank_name() {
        let mut registry = BinRegistry::new();

        let err = registry.add_bin("North", -1.0, "").unwrap_err();
        assert_eq!(err.kind(), "InvalidCapacity");

        let err = registry.add_bin("   ", 10.0, "").unwrap_err();
        assert_eq!(err, LedgerError::InvalidBinName);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_bin_changes_capacity_and_variety() {
        let mut registry = registry_with("A", 1000.0, 0.0, "");

        let bin = registry.update_bin("A", Some(2000.0), Some("Oats ")).unwrap();
        assert_eq!(bin.capacity, 2000.0);
        assert_eq!(bin.variety, "Oats");

        let err = registry.update_bin("B", Some(1.0), None).unwrap_err();
        assert_eq!(err, LedgerError::BinNotFound("B".to_string()));
    }

    #[test]
    fn test_update_bin_allows_variety_override_on_full_bin() {
        let mut registry = registry_with("A", 1000.0, 600.0, "Wheat");

        let bin = registry.update_bin("A", None, Some("Durum")).unwrap();
        assert_eq!(bin.variety, "Durum");
        assert_eq!(bin.fill, 600.0);
    }

    #[test]
    fn test_update_bin_refuses_capacity_below_fill() {
        let mut registry = registry_with("A", 1000.0, 600.0, "Wheat");

        let err = registry.update_bin("A", Some(500.0), Some("Corn")).unwrap_err();
        assert_eq!(err.kind(), "InvalidCapacity");

        // nothing applied, not even the variety
        let bin = registry.get("A").unwrap();
        assert_eq!(bin.capacity, 1000.0);
        assert_eq!(bin.variety, "Wheat");

        // uncapping is always allowed
        let bin = registry.update_bin("A", Some(0.0), None).unwrap();
        assert!(bin.is_uncapped());
    }

    #[test]
    fn test_remove_bin_requires_empty() {
        let mut registry = registry_with("A", 1000.0, 10.0, "Wheat");

        let err = registry.remove_bin("A").unwrap_err();
        assert_eq!(err.kind(), "BinNotEmpty");
        assert_eq!(registry.len(), 1);

        registry.get_mut("A").unwrap().fill = 0.0;
        let removed = registry.remove_bin("A").unwrap();
        assert_eq!(removed.name, "A");
        assert!(registry.is_empty());

        let err = registry.remove_bin("A").unwrap_err();
        assert_eq!(err.kind(), "BinNotFound");
    }

    #[test]
    fn test_clear_variety_only_when_empty() {
        let mut registry = registry_with("A", 1000.0, 250.0, "Canola");

        let err = registry.clear_variety("A").unwrap_err();
        assert_eq!(
            err,
            LedgerError::BinNotEmpty {
                bin: "A".to_string(),
                fill: 250.0
            }
        );

        registry.reset_all_fill();
        let bin = registry.clear_variety("A").unwrap();
        assert!(!bin.is_assigned());
    }

    #[test]
    fn test_reset_all_fill_keeps_variety_and_capacity() {
        let mut registry = BinRegistry::new();
        registry.add_bin("A", 1000.0, "Wheat").unwrap();
        registry.add_bin("B", 0.0, "Corn").unwrap();
        registry.get_mut("A").unwrap().fill = 900.0;
        registry.get_mut("B").unwrap().fill = 40_000.0;

        assert_eq!(registry.reset_all_fill(), 2);

        for bin in registry.all() {
            assert_eq!(bin.fill, 0.0);
            assert!(bin.is_assigned(), "{} should keep its variety", bin.name);
        }
        assert_eq!(registry.get("A").unwrap().capacity, 1000.0);
    }

    #[test]
    fn test_seed_placeholders() {
        let mut registry = BinRegistry::new();
        registry.add_bin("Bin 2", 3000.0, "").unwrap();

        let created = registry.seed_placeholders(31);
        assert_eq!(created, 30);
        assert_eq!(registry.len(), 31);

        let bin = registry.get("Bin 31").unwrap();
        assert!(bin.is_uncapped());
        assert!(!bin.is_assigned());
        // existing bin untouched
        assert_eq!(registry.get("Bin 2").unwrap().capacity, 3000.0);
    }

    #[test]
    fn test_from_bins_rejects_broken_rows() {
        let dup = vec![Bin::new("A", 0.0, ""), Bin::new("A", 0.0, "")];
        assert_eq!(BinRegistry::from_bins(dup).unwrap_err().kind(), "DuplicateBin");

        let mut negative = Bin::new("A", 100.0, "Wheat");
        negative.fill = -5.0;
        assert!(BinRegistry::from_bins(vec![negative]).unwrap_err().is_persistence());
    }

    #[test]
    fn test_from_bins_keeps_overfull_rows() {
        let mut overfull = Bin::new("A", 100.0, "Wheat");
        overfull.fill = 150.0;
        let mut registry = BinRegistry::from_bins(vec![overfull]).unwrap();

        let bin = registry.get("A").unwrap();
        assert!(bin.is_over_capacity());
        assert_eq!(bin.fill, 150.0);
        assert_eq!(bin.remaining(), Some(0.0));
        assert_eq!(bin.percent_full(), 100.0);

        // raising capacity to at least the fill repairs it
        assert!(registry.update_bin("A", Some(120.0), None).is_err());
        let bin = registry.update_bin("A", Some(200.0), None).unwrap();
        assert!(!bin.is_over_capacity());
    }

    #[test]
    fn test_lookups_ignore_surrounding_whitespace() {
        let mut registry = BinRegistry::new();
        registry.add_bin(" North ", 500.0, "").unwrap();

        assert_eq!(registry.get("  North").unwrap().name, "North");
        assert_eq!(registry.update_bin("North ", Some(600.0), None).unwrap().capacity, 600.0);
        assert_eq!(registry.clear_variety(" North").unwrap().name, "North");
        assert_eq!(registry.remove_bin(" North ").unwrap().name, "North");
        assert!(registry.is_empty());

        let padded = Bin::new("South", 0.0, "");
        let loaded = BinRegistry::from_bins(vec![Bin {
            name: " South ".to_string(),
            ..padded
        }])
        .unwrap();
        assert_eq!(loaded.all()[0].name, "South");
    }

    #[test]
    fn test_remaining_and_percent() {
        let mut bin = Bin::new("A", 1000.0, "Wheat");
        bin.fill = 250.0;
        assert_eq!(bin.remaining(), Some(750.0));
        assert_eq!(bin.percent_full(), 25.0);

        let uncapped = Bin::new("B", 0.0, "");
        assert_eq!(uncapped.remaining(), None);
        assert_eq!(uncapped.percent_full(), 0.0);
    }
}
