// CSV storage - one file per table, headers in fixed column order

use super::{LedgerStore, LedgerTables, Table};
use crate::error::LedgerResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

// ============================================================================
// CODEC (shared with backups)
// ============================================================================

fn read_rows<T: DeserializeOwned, R: Read>(reader: R) -> LedgerResult<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::None).from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

fn write_rows<T: Serialize, W: Write>(writer: W, headers: &[&str], rows: &[T]) -> LedgerResult<()> {
    // header written by hand so empty tables still get one
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(headers)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Parse one table from CSV into `tables`
pub fn decode_table<R: Read>(table: Table, reader: R, tables: &mut LedgerTables) -> LedgerResult<()> {
    match table {
        Table::Bins => tables.bins = read_rows(reader)?,
        Table::Deliveries => tables.deliveries = read_rows(reader)?,
        Table::Unloads => tables.unloads = read_rows(reader)?,
    }
    Ok(())
}

/// Render one table of `tables` as CSV bytes
pub fn encode_table(table: Table, tables: &LedgerTables) -> LedgerResult<Vec<u8>> {
    let mut buf = Vec::new();
    match table {
        Table::Bins => write_rows(&mut buf, table.headers(), &tables.bins)?,
        Table::Deliveries => write_rows(&mut buf, table.headers(), &tables.deliveries)?,
        Table::Unloads => write_rows(&mut buf, table.headers(), &tables.unloads)?,
    }
    Ok(buf)
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("csv.tmp")
}

/// Write `bytes` next to `path` without touching `path` itself
fn stage_file(path: &Path, bytes: &[u8]) -> LedgerResult<PathBuf> {
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(tmp)
}

/// Write via a sibling temp file and rename, so a crash never leaves a
/// half-written table behind.
pub(crate) fn write_file_atomic(path: &Path, bytes: &[u8]) -> LedgerResult<()> {
    let tmp = stage_file(path, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// ============================================================================
// CSV STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    /// Open a data directory, creating it and any missing table files
    pub fn open(dir: impl AsRef<Path>) -> LedgerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let store = CsvStore { dir };
        for table in Table::ALL {
            store.init_table(table)?;
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, table: Table) -> PathBuf {
        self.dir.join(table.file_name())
    }

    fn init_table(&self, table: Table) -> LedgerResult<()> {
        let path = self.path(table);
        if !path.exists() {
            write_file_atomic(&path, &encode_table(table, &LedgerTables::default())?)?;
            tracing::debug!(path = %path.display(), "created empty table");
        }
        Ok(())
    }
}

impl LedgerStore for CsvStore {
    fn load(&self) -> LedgerResult<LedgerTables> {
        let mut tables = LedgerTables::default();
        for table in Table::ALL {
            // a table deleted out from under us comes back empty
            self.init_table(table)?;
            let file = fs::File::open(self.path(table))?;
            decode_table(table, file, &mut tables)?;
        }

        tracing::debug!(
            dir = %self.dir.display(),
            bins = tables.bins.len(),
            deliveries = tables.deliveries.len(),
            unloads = tables.unloads.len(),
            "csv tables loaded"
        );
        Ok(tables)
    }

    fn save(&mut self, tables: &LedgerTables) -> LedgerResult<()> {
        // log tables are swapped in before bins, so a failure between
        // renames never leaves bin fill ahead of the log
        const SWAP_ORDER: [Table; 3] = [Table::Deliveries, Table::Unloads, Table::Bins];

        // stage every table first; a failure here leaves the live files untouched
        let mut staged = Vec::with_capacity(SWAP_ORDER.len());
        for table in SWAP_ORDER {
            let path = self.path(table);
            let result = encode_table(table, tables).and_then(|bytes| stage_file(&path, &bytes));
            match result {
                Ok(tmp) => staged.push((tmp, path)),
                Err(e) => {
                    for (tmp, _) in &staged {
                        fs::remove_file(tmp).ok();
                    }
                    return Err(e);
                }
            }
        }

        for (tmp, path) in staged {
            fs::rename(&tmp, &path)?;
        }

        tracing::debug!(dir = %self.dir.display(), "csv tables saved");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.dir.display())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::Bin;
    use crate::transactions::{Delivery, Unload};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("grain-ledger-csv-{}", uuid::Uuid::new_v4()))
    }

    fn sample_tables() -> LedgerTables {
        let mut wheat = Bin::new("Bin 1", 1000.0, "Wheat");
        wheat.fill = 600.0;
        LedgerTables {
            bins: vec![wheat, Bin::new("Bin 2", 0.0, "")],
            deliveries: vec![Delivery {
                timestamp: "2024-09-14 07:30:00".to_string(),
                truck: "T-7".to_string(),
                bin: "Bin 1".to_string(),
                variety: "Wheat".to_string(),
                bushels: 600.0,
                notes: "first load, dry".to_string(),
            }],
            unloads: vec![Unload {
                timestamp: "2024-09-20 16:00:00".to_string(),
                bin: "Bin 1".to_string(),
                variety: "Wheat".to_string(),
                bushels: 0.0,
                destination: "Elevator".to_string(),
                notes: String::new(),
            }],
        }
    }

    #[test]
    fn test_open_creates_tables_with_headers() {
        let dir = temp_dir();
        let store = CsvStore::open(&dir).unwrap();

        let bins = fs::read_to_string(store.path(Table::Bins)).unwrap();
        assert_eq!(bins, "Bin,Capacity_bu,Variety,Bushels_in_bin\n");
        let unloads = fs::read_to_string(store.path(Table::Unloads)).unwrap();
        assert_eq!(unloads, "Timestamp,Bin,Variety,Bushels,Destination,Notes\n");

        let tables = store.load().unwrap();
        assert_eq!(tables, LedgerTables::default());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_save_then_load() {
        let dir = temp_dir();
        let mut store = CsvStore::open(&dir).unwrap();

        let tables = sample_tables();
        store.save(&tables).unwrap();
        assert_eq!(store.load().unwrap(), tables);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_load_save_is_byte_identical() {
        let dir = temp_dir();
        let mut store = CsvStore::open(&dir).unwrap();

        let bins = "Bin,Capacity_bu,Variety,Bushels_in_bin\n\
                    Bin 1,1000.0,Wheat,600.0\n\
                    Bin 2,0.0,,0.0\n\
                    \"Bin, east\",2500.5,Durum,12.25\n";
        let deliveries = "Timestamp,Truck,Bin,Variety,Bushels,Notes\n\
                          2024-09-14 07:30:00,T-7,Bin 1,Wheat,600.0,\"wet, 14%\"\n";
        fs::write(store.path(Table::Bins), bins).unwrap();
        fs::write(store.path(Table::Deliveries), deliveries).unwrap();
        let unloads_before = fs::read(store.path(Table::Unloads)).unwrap();

        let tables = store.load().unwrap();
        store.save(&tables).unwrap();

        assert_eq!(fs::read_to_string(store.path(Table::Bins)).unwrap(), bins);
        assert_eq!(
            fs::read_to_string(store.path(Table::Deliveries)).unwrap(),
            deliveries
        );
        assert_eq!(fs::read(store.path(Table::Unloads)).unwrap(), unloads_before);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_blank_and_missing_fill_load_as_zero() {
        let dir = temp_dir();
        let store = CsvStore::open(&dir).unwrap();

        fs::write(
            store.path(Table::Bins),
            "Bin,Capacity_bu,Variety\nBin 1,,\nBin 2,500,Oats\n",
        )
        .unwrap();

        let tables = store.load().unwrap();
        assert_eq!(tables.bins[0].capacity, 0.0);
        assert_eq!(tables.bins[0].fill, 0.0);
        assert_eq!(tables.bins[1].capacity, 500.0);
        assert_eq!(tables.bins[1].variety, "Oats");

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_garbage_is_a_persistence_failure() {
        let dir = temp_dir();
        let store = CsvStore::open(&dir).unwrap();
        fs::write(
            store.path(Table::Bins),
            "Bin,Capacity_bu,Variety,Bushels_in_bin\nBin 1,lots,Wheat,0\n",
        )
        .unwrap();

        let err = store.load().unwrap_err();
        assert!(err.is_persistence());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_failed_save_leaves_every_table_untouched() {
        let dir = temp_dir();
        let mut store = CsvStore::open(&dir).unwrap();
        store.save(&sample_tables()).unwrap();
        let before: Vec<String> = Table::ALL
            .iter()
            .map(|t| fs::read_to_string(store.path(*t)).unwrap())
            .collect();

        // a directory where the unloads temp file should go makes staging fail
        let blocker = tmp_path(&store.path(Table::Unloads));
        fs::create_dir_all(&blocker).unwrap();

        let mut changed = sample_tables();
        changed.bins[0].fill = 900.0;
        changed.deliveries[0].bushels = 900.0;
        changed.unloads.clear();
        let err = store.save(&changed).unwrap_err();
        assert!(err.is_persistence());

        let after: Vec<String> = Table::ALL
            .iter()
            .map(|t| fs::read_to_string(store.path(*t)).unwrap())
            .collect();
        assert_eq!(before, after, "no table may be swapped in when staging fails");
        assert!(
            !tmp_path(&store.path(Table::Deliveries)).exists(),
            "staged files are cleaned up"
        );
        assert_eq!(store.load().unwrap(), sample_tables());

        fs::remove_dir_all(dir).ok();
    }
}
