// SQLite storage - same three tables, saved inside one SQL transaction
//
// A save either replaces all three tables or none of them, which closes the
// window where bins and the log could disagree after a crash.

use super::{LedgerStore, LedgerTables};
use crate::bins::Bin;
use crate::error::LedgerResult;
use crate::transactions::{Delivery, Unload};
use rusqlite::{params, Connection};
use std::path::Path;

pub fn setup_database(conn: &Connection) -> LedgerResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bins (
            position INTEGER PRIMARY KEY,
            bin TEXT UNIQUE NOT NULL,
            capacity_bu REAL NOT NULL DEFAULT 0,
            variety TEXT NOT NULL DEFAULT '',
            bushels_in_bin REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS deliveries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            truck TEXT NOT NULL DEFAULT '',
            bin TEXT NOT NULL,
            variety TEXT NOT NULL DEFAULT '',
            bushels REAL NOT NULL,
            notes TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS unloads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            bin TEXT NOT NULL,
            variety TEXT NOT NULL DEFAULT '',
            bushels REAL NOT NULL,
            destination TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_deliveries_bin ON deliveries(bin)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_unloads_bin ON unloads(bin)",
        [],
    )?;

    Ok(())
}

pub struct SqliteStore {
    conn: Connection,
    location: String,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn,
            location: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn,
            location: ":memory:".to_string(),
        })
    }

    fn load_bins(&self) -> LedgerResult<Vec<Bin>> {
        let mut stmt = self.conn.prepare(
            "SELECT bin, capacity_bu, variety, bushels_in_bin
             FROM bins
             ORDER BY position",
        )?;

        let bins = stmt
            .query_map([], |row| {
                Ok(Bin {
                    name: row.get(0)?,
                    capacity: row.get(1)?,
                    variety: row.get(2)?,
                    fill: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(bins)
    }

    fn load_deliveries(&self) -> LedgerResult<Vec<Delivery>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, truck, bin, variety, bushels, notes
             FROM deliveries
             ORDER BY id",
        )?;

        let deliveries = stmt
            .query_map([], |row| {
                Ok(Delivery {
                    timestamp: row.get(0)?,
                    truck: row.get(1)?,
                    bin: row.get(2)?,
                    variety: row.get(3)?,
                    bushels: row.get(4)?,
                    notes: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(deliveries)
    }

    fn load_unloads(&self) -> LedgerResult<Vec<Unload>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, bin, variety, bushels, destination, notes
             FROM unloads
             ORDER BY id",
        )?;

        let unloads = stmt
            .query_map([], |row| {
                Ok(Unload {
                    timestamp: row.get(0)?,
                    bin: row.get(1)?,
                    variety: row.get(2)?,
                    bushels: row.get(3)?,
                    destination: row.get(4)?,
                    notes: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(unloads)
    }
}

impl LedgerStore for SqliteStore {
    fn load(&self) -> LedgerResult<LedgerTables> {
        let tables = LedgerTables {
            bins: self.load_bins()?,
            deliveries: self.load_deliveries()?,
            unloads: self.load_unloads()?,
        };

        tracing::debug!(
            db = %self.location,
            bins = tables.bins.len(),
            deliveries = tables.deliveries.len(),
            unloads = tables.unloads.len(),
            "sqlite tables loaded"
        );
        Ok(tables)
    }

    fn save(&mut self, tables: &LedgerTables) -> LedgerResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM bins", [])?;
        tx.execute("DELETE FROM deliveries", [])?;
        tx.execute("DELETE FROM unloads", [])?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO bins (position, bin, capacity_bu, variety, bushels_in_bin)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, bin) in tables.bins.iter().enumerate() {
                insert.execute(params![
                    position as i64,
                    bin.name,
                    bin.capacity,
                    bin.variety,
                    bin.fill,
                ])?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO deliveries (timestamp, truck, bin, variety, bushels, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for d in &tables.deliveries {
                insert.execute(params![d.timestamp, d.truck, d.bin, d.variety, d.bushels, d.notes])?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO unloads (timestamp, bin, variety, bushels, destination, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for u in &tables.unloads {
                insert.execute(params![
                    u.timestamp,
                    u.bin,
                    u.variety,
                    u.bushels,
                    u.destination,
                    u.notes,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(db = %self.location, "sqlite tables saved");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tables() -> LedgerTables {
        let mut bin = Bin::new("Bin 1", 1000.0, "Wheat");
        bin.fill = 400.0;
        LedgerTables {
            bins: vec![Bin::new("Bin 9", 0.0, ""), bin],
            deliveries: vec![Delivery {
                timestamp: "2024-09-14 07:30:00".to_string(),
                truck: "T-7".to_string(),
                bin: "Bin 1".to_string(),
                variety: "Wheat".to_string(),
                bushels: 600.0,
                notes: String::new(),
            }],
            unloads: vec![Unload {
                timestamp: "2024-09-15 07:30:00".to_string(),
                bin: "Bin 1".to_string(),
                variety: "Wheat".to_string(),
                bushels: 200.0,
                destination: "Elevator".to_string(),
                notes: "ticket 44".to_string(),
            }],
        }
    }

    #[test]
    fn test_save_then_load_keeps_row_order() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let tables = sample_tables();

        store.save(&tables).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, tables);
        assert_eq!(loaded.bins[0].name, "Bin 9");
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.save(&sample_tables()).unwrap();

        let mut smaller = sample_tables();
        smaller.deliveries.clear();
        smaller.bins.truncate(1);
        store.save(&smaller).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.bins.len(), 1);
        assert!(loaded.deliveries.is_empty());
        assert_eq!(loaded.unloads.len(), 1);
    }

    #[test]
    fn test_failed_save_leaves_tables_untouched() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let tables = sample_tables();
        store.save(&tables).unwrap();

        // duplicate bin names violate the UNIQUE constraint mid-transaction
        let mut broken = sample_tables();
        broken.bins.push(Bin::new("Bin 9", 0.0, ""));
        broken.deliveries.clear();

        let err = store.save(&broken).unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(store.load().unwrap(), tables);
    }

    #[test]
    fn test_describe() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.describe(), "sqlite::memory:");
    }
}
