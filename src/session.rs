// 🚜 Farm Session - engine + store + backups for one farm
//
// Every mutation runs against the in-memory engine first. When it succeeds
// the full tables are saved; when the save fails the engine is put back
// exactly as it was and the caller gets a persistence error to retry on.
//
// Single writer: all mutations take `&mut self`. Callers that share a
// session across threads wrap it in one mutex.

use crate::backup::{BackupManager, BackupManifest, BackupPolicy};
use crate::bins::{Bin, BinRegistry};
use crate::engine::{
    Clock, DeliveryOutcome, DeliveryRequest, LedgerEngine, UnloadOutcome, UnloadRequest,
};
use crate::error::{LedgerError, LedgerResult};
use crate::storage::{LedgerStore, LedgerTables, Table};
use crate::transactions::TransactionLog;

pub struct FarmSession {
    engine: LedgerEngine,
    store: Box<dyn LedgerStore>,
    backups: Option<BackupManager>,
    policy: BackupPolicy,
}

impl FarmSession {
    /// Load the farm from `store`. An empty bin table is seeded with
    /// `seed_bins` placeholder bins and saved straight away.
    pub fn open(
        store: Box<dyn LedgerStore>,
        backups: Option<BackupManager>,
        policy: BackupPolicy,
        seed_bins: usize,
    ) -> LedgerResult<Self> {
        let (registry, log) = store.load()?.into_state()?;
        let mut session = FarmSession {
            engine: LedgerEngine::new(registry, log),
            store,
            backups,
            policy,
        };

        if session.engine.registry().is_empty() && seed_bins > 0 {
            session.apply("seed", |engine| {
                Ok(engine.registry_mut().seed_placeholders(seed_bins))
            })?;
        }

        if session.policy != BackupPolicy::Never {
            session.snapshot("session-start")?;
        }

        tracing::info!(
            store = %session.store.describe(),
            bins = session.engine.registry().len(),
            entries = session.engine.log().len(),
            "farm session opened"
        );
        Ok(session)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.engine = std::mem::take(&mut self.engine).with_clock(clock);
        self
    }

    pub fn engine(&self) -> &LedgerEngine {
        &self.engine
    }

    pub fn registry(&self) -> &BinRegistry {
        self.engine.registry()
    }

    pub fn log(&self) -> &TransactionLog {
        self.engine.log()
    }

    pub fn backups(&self) -> Option<&BackupManager> {
        self.backups.as_ref()
    }

    pub fn store_description(&self) -> String {
        self.store.describe()
    }

    pub fn tables(&self) -> LedgerTables {
        LedgerTables::from_engine(&self.engine)
    }

    /// Run one mutation and persist it, or leave everything untouched.
    fn apply<T>(
        &mut self,
        label: &str,
        op: impl FnOnce(&mut LedgerEngine) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let before = self.engine.clone();

        // engine operations validate before mutating, so an Err here
        // means nothing changed
        let value = op(&mut self.engine)?;

        if self.policy == BackupPolicy::EveryWrite {
            if let Some(backups) = &self.backups {
                if let Err(e) = backups.snapshot(&LedgerTables::from_engine(&before), label) {
                    self.engine = before;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.store.save(&LedgerTables::from_engine(&self.engine)) {
            tracing::error!(operation = label, error = %e, "save failed, in-memory state reverted");
            self.engine = before;
            // a store that got partway must end up holding the reverted state
            if let Err(resave) = self.store.save(&self.tables()) {
                tracing::error!(operation = label, error = %resave, "could not rewrite previous state");
            }
            return Err(match e {
                LedgerError::Persistence(_) => e,
                other => LedgerError::Persistence(other.to_string()),
            });
        }

        Ok(value)
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    pub fn add_bin(&mut self, name: &str, capacity: f64, variety: &str) -> LedgerResult<Bin> {
        self.apply("add-bin", |e| e.registry_mut().add_bin(name, capacity, variety))
    }

    pub fn update_bin(
        &mut self,
        name: &str,
        capacity: Option<f64>,
        variety: Option<&str>,
    ) -> LedgerResult<Bin> {
        self.apply("update-bin", |e| e.registry_mut().update_bin(name, capacity, variety))
    }

    pub fn remove_bin(&mut self, name: &str) -> LedgerResult<Bin> {
        self.apply("remove-bin", |e| e.registry_mut().remove_bin(name))
    }

    pub fn clear_variety(&mut self, name: &str) -> LedgerResult<Bin> {
        self.apply("clear-variety", |e| e.registry_mut().clear_variety(name))
    }

    pub fn reset_all_fill(&mut self) -> LedgerResult<usize> {
        self.apply("reset-fill", |e| Ok(e.registry_mut().reset_all_fill()))
    }

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    pub fn record_delivery(&mut self, request: &DeliveryRequest) -> LedgerResult<DeliveryOutcome> {
        self.apply("delivery", |e| e.record_delivery(request))
    }

    pub fn record_unload(&mut self, request: &UnloadRequest) -> LedgerResult<UnloadOutcome> {
        self.apply("unload", |e| e.record_unload(request))
    }

    pub fn clear_deliveries(&mut self) -> LedgerResult<usize> {
        self.apply("clear-deliveries", |e| Ok(e.log_mut().clear_deliveries()))
    }

    pub fn clear_unloads(&mut self) -> LedgerResult<usize> {
        self.apply("clear-unloads", |e| Ok(e.log_mut().clear_unloads()))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Throw away in-memory state and read the store again
    pub fn reload(&mut self) -> LedgerResult<()> {
        let (registry, log) = self.store.load()?.into_state()?;
        self.engine.replace_state(registry, log);
        tracing::info!(bins = self.engine.registry().len(), "farm reloaded from store");
        Ok(())
    }

    /// Snapshot the current tables
    pub fn snapshot(&self, label: &str) -> LedgerResult<Option<BackupManifest>> {
        match &self.backups {
            Some(backups) => backups.snapshot(&self.tables(), label).map(Some),
            None => Ok(None),
        }
    }

    /// Replace one table (or all three) with a snapshot's copy, save, and
    /// reload. Nothing is merged.
    pub fn restore(&mut self, snapshot_id: &str, table: Option<Table>) -> LedgerResult<()> {
        let backups = self
            .backups
            .as_ref()
            .ok_or_else(|| LedgerError::Backup("backups are not configured".to_string()))?;
        let snapshot = backups.load(snapshot_id)?;

        let tables = match table {
            None => snapshot,
            Some(table) => {
                let mut current = self.store.load()?;
                current.replace_table(table, snapshot);
                current
            }
        };

        // refuse to write tables that would not load back
        tables.clone().into_state()?;
        if self.policy == BackupPolicy::EveryWrite {
            backups.snapshot(&self.tables(), "pre-restore")?;
        }
        self.store.save(&tables)?;
        self.reload()?;

        tracing::info!(
            snapshot = snapshot_id,
            table = table.map(|t| t.name()).unwrap_or("all"),
            "restored from snapshot"
        );
        Ok(())
    }

    /// End the session, taking a closing snapshot if the policy asks for one
    pub fn close(self) -> LedgerResult<()> {
        if self.policy == BackupPolicy::Session {
            self.snapshot("session-end")?;
        }
        tracing::info!(store = %self.store.describe(), "farm session closed");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
