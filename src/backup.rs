// 🗄️ Backups - point-in-time snapshots of the three tables
//
// Each snapshot is a directory holding the tables as CSV plus a manifest
// with a SHA-256 of every file. Restoring verifies the checksums first.
// The engine knows nothing about any of this; the session decides when to
// snapshot.

use crate::error::{LedgerError, LedgerResult};
use crate::storage::csv_store::{decode_table, encode_table, write_file_atomic};
use crate::storage::{LedgerTables, Table};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST: &str = "manifest.json";

// ============================================================================
// POLICY
// ============================================================================

/// When the session takes snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupPolicy {
    Never,
    /// At session start and session end
    Session,
    /// Before every accepted mutation
    EveryWrite,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        BackupPolicy::Session
    }
}

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableChecksum {
    pub table: Table,
    pub file: String,
    pub rows: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub id: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub tables: Vec<TableChecksum>,
}

impl BackupManifest {
    pub fn rows(&self, table: Table) -> usize {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.rows)
            .unwrap_or(0)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "manual".to_string()
    } else {
        cleaned
    }
}

// ============================================================================
// BACKUP MANAGER
// ============================================================================

#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    /// Snapshots to retain; 0 keeps everything
    keep: usize,
}

impl BackupManager {
    pub fn new(dir: impl AsRef<Path>, keep: usize) -> Self {
        BackupManager {
            dir: dir.as_ref().to_path_buf(),
            keep,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// Write a snapshot of `tables`, then rotate old ones away
    pub fn snapshot(&self, tables: &LedgerTables, label: &str) -> LedgerResult<BackupManifest> {
        let created_at = Utc::now();
        let label = sanitize_label(label);
        let short_id = uuid::Uuid::new_v4().simple().to_string();
        let id = format!(
            "{}_{}_{}",
            created_at.format("%Y%m%d_%H%M%S"),
            label,
            &short_id[..8]
        );

        let dir = self.snapshot_dir(&id);
        fs::create_dir_all(&dir)?;

        let mut checksums = Vec::new();
        for table in Table::ALL {
            let bytes = encode_table(table, tables)?;
            write_file_atomic(&dir.join(table.file_name()), &bytes)?;
            checksums.push(TableChecksum {
                table,
                file: table.file_name().to_string(),
                rows: tables.row_count(table),
                sha256: sha256_hex(&bytes),
            });
        }

        let manifest = BackupManifest {
            id,
            label,
            created_at,
            tables: checksums,
        };
        fs::write(dir.join(MANIFEST), serde_json::to_vec_pretty(&manifest)?)?;

        tracing::info!(id = %manifest.id, dir = %dir.display(), "snapshot written");

        let removed = self.rotate()?;
        if removed > 0 {
            tracing::debug!(removed, keep = self.keep, "old snapshots rotated out");
        }
        Ok(manifest)
    }

    /// All snapshots, newest first. Directories without a readable
    /// manifest are skipped.
    pub fn list(&self) -> LedgerResult<Vec<BackupManifest>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut manifests = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path().join(MANIFEST);
            if !path.is_file() {
                continue;
            }
            match fs::read(&path)
                .map_err(LedgerError::from)
                .and_then(|bytes| serde_json::from_slice::<BackupManifest>(&bytes).map_err(LedgerError::from))
            {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable snapshot manifest"),
            }
        }

        manifests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(manifests)
    }

    pub fn latest(&self) -> LedgerResult<Option<BackupManifest>> {
        Ok(self.list()?.into_iter().next())
    }

    fn manifest(&self, id: &str) -> LedgerResult<BackupManifest> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(LedgerError::Backup(format!("invalid snapshot id \"{}\"", id)));
        }
        let path = self.snapshot_dir(id).join(MANIFEST);
        if !path.is_file() {
            return Err(LedgerError::Backup(format!("no snapshot \"{}\"", id)));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Recompute every checksum of a snapshot
    pub fn verify(&self, id: &str) -> LedgerResult<BackupManifest> {
        let manifest = self.manifest(id)?;
        let dir = self.snapshot_dir(id);

        for entry in &manifest.tables {
            let bytes = fs::read(dir.join(&entry.file))?;
            let actual = sha256_hex(&bytes);
            if actual != entry.sha256 {
                return Err(LedgerError::Backup(format!(
                    "snapshot \"{}\": {} checksum mismatch",
                    id, entry.file
                )));
            }
        }
        Ok(manifest)
    }

    /// Read a verified snapshot back into tables
    pub fn load(&self, id: &str) -> LedgerResult<LedgerTables> {
        let manifest = self.verify(id)?;
        let dir = self.snapshot_dir(id);

        let mut tables = LedgerTables::default();
        for entry in &manifest.tables {
            let file = fs::File::open(dir.join(&entry.file))?;
            decode_table(entry.table, file, &mut tables)?;
        }
        Ok(tables)
    }

    /// Delete snapshots beyond the newest `keep`. Returns how many went.
    pub fn rotate(&self) -> LedgerResult<usize> {
        if self.keep == 0 {
            return Ok(0);
        }

        let mut removed = 0;
        for manifest in self.list()?.into_iter().skip(self.keep) {
            fs::remove_dir_all(self.snapshot_dir(&manifest.id))?;
            removed += 1;
        }
        Ok(removed)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::Bin;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("grain-ledger-backup-{}", uuid::Uuid::new_v4()))
    }

    fn tables_with_fill(fill: f64) -> LedgerTables {
        let mut bin = Bin::new("Bin 1", 1000.0, "Wheat");
        bin.fill = fill;
        LedgerTables {
            bins: vec![bin],
            ..LedgerTables::default()
        }
    }

    #[test]
    fn test_snapshot_and_load() {
        let dir = temp_dir();
        let backups = BackupManager::new(&dir, 5);

        let manifest = backups.snapshot(&tables_with_fill(300.0), "session start").unwrap();
        assert!(manifest.id.contains("session-start"));
        assert_eq!(manifest.rows(Table::Bins), 1);
        assert_eq!(manifest.tables.len(), 3);

        let tables = backups.load(&manifest.id).unwrap();
        assert_eq!(tables, tables_with_fill(300.0));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_list_newest_first_and_rotation() {
        let dir = temp_dir();
        let backups = BackupManager::new(&dir, 2);

        let first = backups.snapshot(&tables_with_fill(1.0), "a").unwrap();
        let second = backups.snapshot(&tables_with_fill(2.0), "b").unwrap();
        let third = backups.snapshot(&tables_with_fill(3.0), "c").unwrap();

        let ids: Vec<String> = backups.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![third.id.clone(), second.id]);
        assert!(!dir.join(&first.id).exists(), "oldest snapshot should be rotated out");
        assert_eq!(backups.latest().unwrap().unwrap().id, third.id);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_tampered_snapshot_fails_verification() {
        let dir = temp_dir();
        let backups = BackupManager::new(&dir, 0);
        let manifest = backups.snapshot(&tables_with_fill(500.0), "manual").unwrap();

        let file = dir.join(&manifest.id).join(Table::Bins.file_name());
        fs::write(&file, "Bin,Capacity_bu,Variety,Bushels_in_bin\nBin 1,1000.0,Wheat,999.0\n").unwrap();

        let err = backups.load(&manifest.id).unwrap_err();
        assert_eq!(err.kind(), "BackupFailure");

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_unknown_snapshot() {
        let backups = BackupManager::new(temp_dir(), 3);
        assert!(backups.list().unwrap().is_empty());
        assert_eq!(backups.load("nope").unwrap_err().kind(), "BackupFailure");
        assert_eq!(backups.load("../data").unwrap_err().kind(), "BackupFailure");
    }
}
