// 🌾 Ledger Engine - applies deliveries and unloads to the bin registry
//
// Each request is validated against the current bin, the applied quantity
// is clamped to what the bin can take (or give), the bin is updated and a
// record of what actually happened is appended to the log.
//
// Rules:
//   - first delivery into an unassigned bin sets its variety
//   - a delivery of another variety is rejected outright (no partial load)
//   - deliveries clamp to remaining capacity, unloads clamp to stock
//   - the log always carries the applied quantity, never the requested one

use crate::bins::BinRegistry;
use crate::error::{LedgerError, LedgerResult, LedgerWarning};
use crate::transactions::{Delivery, TransactionLog, Unload, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Source of transaction timestamps
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

fn local_clock() -> Clock {
    Arc::new(|| chrono::Local::now().naive_local())
}

// ============================================================================
// REQUESTS & OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub bin: String,
    /// May be blank when the bin already has a variety
    #[serde(default)]
    pub variety: String,
    pub bushels: f64,
    #[serde(default)]
    pub truck: String,
    #[serde(default)]
    pub notes: String,
}

impl DeliveryRequest {
    pub fn new(bin: &str, variety: &str, bushels: f64) -> Self {
        DeliveryRequest {
            bin: bin.to_string(),
            variety: variety.to_string(),
            bushels,
            truck: String::new(),
            notes: String::new(),
        }
    }

    pub fn truck(mut self, truck: &str) -> Self {
        self.truck = truck.to_string();
        self
    }

    pub fn notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnloadRequest {
    pub bin: String,
    pub bushels: f64,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub notes: String,
}

impl UnloadRequest {
    pub fn new(bin: &str, bushels: f64, destination: &str) -> Self {
        UnloadRequest {
            bin: bin.to_string(),
            bushels,
            destination: destination.to_string(),
            notes: String::new(),
        }
    }

    pub fn notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }
}

/// What a delivery actually did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub bin: String,
    pub variety: String,
    pub accepted: f64,
    pub fill_after: f64,
    pub warning: Option<LedgerWarning>,
}

/// What an unload actually did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnloadOutcome {
    pub bin: String,
    pub variety: String,
    pub taken: f64,
    pub fill_after: f64,
    pub warning: Option<LedgerWarning>,
}

fn check_quantity(bushels: f64) -> LedgerResult<()> {
    if !bushels.is_finite() || bushels <= 0.0 {
        return Err(LedgerError::InvalidQuantity(bushels));
    }
    Ok(())
}

// ============================================================================
// LEDGER ENGINE
// ============================================================================

/// Owns the bin registry and the transaction log of one farm.
///
/// Cloning an engine snapshots its whole state, which is how callers roll
/// back when persisting a mutation fails.
#[derive(Clone)]
pub struct LedgerEngine {
    registry: BinRegistry,
    log: TransactionLog,
    clock: Clock,
}

impl std::fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("registry", &self.registry)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new(BinRegistry::new(), TransactionLog::new())
    }
}

impl LedgerEngine {
    pub fn new(registry: BinRegistry, log: TransactionLog) -> Self {
        LedgerEngine {
            registry,
            log,
            clock: local_clock(),
        }
    }

    /// Replace the timestamp source (tests, replays)
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &BinRegistry {
        &self.registry
    }

    /// Setup edits go straight to the registry
    pub fn registry_mut(&mut self) -> &mut BinRegistry {
        &mut self.registry
    }

    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    /// Bulk clearing of log tables
    pub fn log_mut(&mut self) -> &mut TransactionLog {
        &mut self.log
    }

    /// Swap in freshly loaded state, keeping the clock
    pub fn replace_state(&mut self, registry: BinRegistry, log: TransactionLog) {
        self.registry = registry;
        self.log = log;
    }

    pub fn into_parts(self) -> (BinRegistry, TransactionLog) {
        (self.registry, self.log)
    }

    fn timestamp(&self) -> String {
        (self.clock)().format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn record_delivery(&mut self, request: &DeliveryRequest) -> LedgerResult<DeliveryOutcome> {
        check_quantity(request.bushels)?;
        let timestamp = self.timestamp();

        let bin = self.registry.get_mut(&request.bin)?;
        let requested = request.variety.trim();

        let variety = if !bin.is_assigned() {
            if requested.is_empty() {
                return Err(LedgerError::MissingVariety(bin.name.clone()));
            }
            requested.to_string()
        } else if requested.is_empty() || requested == bin.variety {
            bin.variety.clone()
        } else {
            tracing::warn!(
                bin = %bin.name,
                assigned = %bin.variety,
                requested = %requested,
                "delivery rejected: variety mismatch"
            );
            return Err(LedgerError::VarietyMismatch {
                bin: bin.name.clone(),
                assigned: bin.variety.clone(),
                requested: requested.to_string(),
            });
        };

        let (accepted, warning) = match bin.remaining() {
            Some(room) if request.bushels > room => (
                room,
                Some(LedgerWarning::ClampedToCapacity {
                    requested: request.bushels,
                    accepted: room,
                    rejected: request.bushels - room,
                }),
            ),
            _ => (request.bushels, None),
        };

        // all checks passed; mutate
        bin.variety = variety.clone();
        let fill_before = bin.fill;
        bin.fill += accepted;
        if !bin.is_uncapped() {
            // rounding guard; never shrinks a bin that was already overfull
            bin.fill = bin.fill.min(bin.capacity.max(fill_before));
        }

        let outcome = DeliveryOutcome {
            bin: bin.name.clone(),
            variety: variety.clone(),
            accepted,
            fill_after: bin.fill,
            warning,
        };

        self.log.append_delivery(Delivery {
            timestamp,
            truck: request.truck.clone(),
            bin: outcome.bin.clone(),
            variety,
            bushels: accepted,
            notes: request.notes.clone(),
        });

        match &outcome.warning {
            Some(warning) => {
                tracing::warn!(bin = %outcome.bin, %warning, "delivery clamped to capacity")
            }
            None => tracing::info!(
                bin = %outcome.bin,
                variety = %outcome.variety,
                accepted,
                fill = outcome.fill_after,
                "delivery recorded"
            ),
        }

        Ok(outcome)
    }

    pub fn record_unload(&mut self, request: &UnloadRequest) -> LedgerResult<UnloadOutcome> {
        check_quantity(request.bushels)?;
        let timestamp = self.timestamp();

        let bin = self.registry.get_mut(&request.bin)?;
        let available = bin.fill;

        let (taken, warning) = if request.bushels > available {
            (
                available,
                Some(LedgerWarning::InsufficientStock {
                    requested: request.bushels,
                    taken: available,
                    shortfall: request.bushels - available,
                }),
            )
        } else {
            (request.bushels, None)
        };

        bin.fill = (bin.fill - taken).max(0.0);
        // variety stays even when the bin runs dry; clearing it is explicit

        let outcome = UnloadOutcome {
            bin: bin.name.clone(),
            variety: bin.variety.clone(),
            taken,
            fill_after: bin.fill,
            warning,
        };

        self.log.append_unload(Unload {
            timestamp,
            bin: outcome.bin.clone(),
            variety: outcome.variety.clone(),
            bushels: taken,
            destination: request.destination.clone(),
            notes: request.notes.clone(),
        });

        match &outcome.warning {
            Some(warning) => {
                tracing::warn!(bin = %outcome.bin, %warning, "unload clamped to stock")
            }
            None => tracing::info!(
                bin = %outcome.bin,
                taken,
                fill = outcome.fill_after,
                "unload recorded"
            ),
        }

        Ok(outcome)
    }
}

// ============================================================================
// TESTS
// ============================================================================
