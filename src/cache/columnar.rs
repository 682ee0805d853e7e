use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, Float32Array, Float32Builder, ListArray, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::block_store::BlockStore;
use super::io::{ensure_dir, write_atomic_file};
use crate::error::{DescriptorError, Result};

/// Folder (under the data root) holding one parquet table per block kind.
pub const COLUMNAR_CACHE_DIR: &str = "modular_repr_cache_columnar";

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<String, Vec<f32>>,
    dirty: bool,
}

/// Columnar block cache: `<dataRoot>/modular_repr_cache_columnar/<Block>.parquet`
/// with an `id` column and a `values` list column.
///
/// Tables of the active blocks are read when the store is opened; new rows are
/// buffered and the touched tables rewritten on [`flush`](BlockStore::flush),
/// on [`close`](ColumnarCache::close), or at the latest when the store is dropped.
#[derive(Debug)]
pub struct ColumnarCache {
    root: PathBuf,
    tables: BTreeMap<String, Table>,
    closed: bool,
}

impl ColumnarCache {
    pub fn open<'a>(data_root: &Path, blocks: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let root = data_root.join(COLUMNAR_CACHE_DIR);
        ensure_dir(&root)?;
        let mut tables = BTreeMap::new();
        for block in blocks {
            let path = table_path(&root, block);
            let rows = if path.is_file() {
                read_table(&path)?
            } else {
                BTreeMap::new()
            };
            log::debug!("columnar cache {block}: {} rows", rows.len());
            tables.insert(block.to_string(), Table { rows, dirty: false });
        }
        Ok(ColumnarCache {
            root,
            tables,
            closed: false,
        })
    }

    pub fn table_path(&self, block: &str) -> PathBuf {
        table_path(&self.root, block)
    }

    /// Flush and release. Dropping without calling this still flushes, but
    /// can only log a failure.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush()
    }
}

fn table_path(root: &Path, block: &str) -> PathBuf {
    root.join(format!("{block}.parquet"))
}

fn read_table(path: &Path) -> Result<BTreeMap<String, Vec<f32>>> {
    let file = std::fs::File::open(path).map_err(|e| DescriptorError::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = BTreeMap::new();
    for batch in reader {
        let batch = batch?;
        let ids = batch
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| inconsistent(path, "missing Utf8 'id' column"))?;
        let values = batch
            .column_by_name("values")
            .and_then(|c| c.as_any().downcast_ref::<ListArray>())
            .ok_or_else(|| inconsistent(path, "missing List 'values' column"))?;

        for row in 0..batch.num_rows() {
            let inner = values.value(row);
            let floats = inner
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| inconsistent(path, "'values' items are not Float32"))?;
            rows.insert(ids.value(row).to_string(), floats.values().to_vec());
        }
    }
    Ok(rows)
}

fn inconsistent(path: &Path, what: &str) -> DescriptorError {
    DescriptorError::DataInconsistency(format!("{}: {what}", path.display()))
}

fn encode_table(rows: &BTreeMap<String, Vec<f32>>) -> Result<Vec<u8>> {
    let ids = StringArray::from(rows.keys().map(String::as_str).collect::<Vec<_>>());
    let mut values_builder = ListBuilder::new(Float32Builder::new());
    for row in rows.values() {
        values_builder.values().append_slice(row);
        values_builder.append(true);
    }
    let values = values_builder.finish();

    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("values", values.data_type().clone(), false),
    ]));
    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(ids), Arc::new(values)])?;

    let mut writer = ArrowWriter::try_new(Vec::new(), schema, None)?;
    writer.write(&batch)?;
    Ok(writer.into_inner()?)
}

impl BlockStore for ColumnarCache {
    fn tier(&self) -> &'static str {
        "columnar"
    }

    fn load(&mut self, block: &str, id: &str) -> Result<Option<Vec<f32>>> {
        Ok(self
            .tables
            .get(block)
            .and_then(|t| t.rows.get(id))
            .cloned())
    }

    fn store(&mut self, block: &str, id: &str, values: &[f32]) -> Result<()> {
        let table = self.tables.entry(block.to_string()).or_default();
        table.rows.insert(id.to_string(), values.to_vec());
        table.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for (block, table) in self.tables.iter_mut().filter(|(_, t)| t.dirty) {
            let bytes = encode_table(&table.rows)?;
            write_atomic_file(&table_path(&self.root, block), &bytes)?;
            table.dirty = false;
            log::debug!("columnar cache {block}: wrote {} rows", table.rows.len());
        }
        Ok(())
    }
}

impl Drop for ColumnarCache {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            log::warn!("failed to flush columnar block cache in {}: {e}", self.root.display());
        }
    }
}
