use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, BooleanArray, Int32Array, Int64Array, UInt32Array, UInt64Array};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::filter::FeatureFilter;
use crate::error::DescriptorError;

/// A persisted filter before validation: either indices or a mask.
#[derive(Debug, PartialEq)]
enum RawFilter {
    Indices(Vec<usize>),
    Mask(Vec<bool>),
}

impl RawFilter {
    fn into_filter(self) -> crate::error::Result<FeatureFilter> {
        match self {
            RawFilter::Indices(idx) => FeatureFilter::from_indices(idx),
            RawFilter::Mask(mask) => FeatureFilter::from_mask(&mask),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a persisted feature filter. Dispatch by extension.
///
/// Supported formats:
/// * `.json`    – a flat array of integers (indices) or booleans (mask)
/// * `.csv`     – one column or one row of integers or `true`/`false`
/// * `.parquet` – the first integer (indices) or boolean (mask) column
pub fn load_filter_file(path: &Path) -> crate::error::Result<FeatureFilter> {
    if !path.exists() {
        return Err(DescriptorError::FilterLoad {
            path: path.to_path_buf(),
            cause: anyhow::anyhow!("no such file"),
        });
    }
    let raw = read_raw_filter(path).map_err(|cause| DescriptorError::FilterLoad {
        path: path.to_path_buf(),
        cause,
    })?;
    raw.into_filter()
}

fn read_raw_filter(path: &Path) -> Result<RawFilter> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "json" => load_json(path),
        "csv" | "txt" => load_csv(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// `[0, 3, 4, 9]` or `[true, false, true]`.
fn load_json(path: &Path) -> Result<RawFilter> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let values = root.as_array().context("Expected top-level JSON array")?;

    if values.first().is_some_and(JsonValue::is_boolean) {
        let mask = values
            .iter()
            .enumerate()
            .map(|(j, v)| v.as_bool().with_context(|| format!("[{j}]: not a boolean")))
            .collect::<Result<Vec<_>>>()?;
        return Ok(RawFilter::Mask(mask));
    }

    let indices = values
        .iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_u64()
                .map(|i| i as usize)
                .with_context(|| format!("[{j}]: not a non-negative integer"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RawFilter::Indices(indices))
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// No header row. Values may be laid out as one column or one row; any other
/// shape is rejected.
fn load_csv(path: &Path) -> Result<RawFilter> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context("opening CSV")?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cells: Vec<String> = record
            .iter()
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    let cells: Vec<String> = match rows.as_slice() {
        [] => bail!("CSV file is empty"),
        [single_row] => single_row.clone(),
        many if many.iter().all(|r| r.len() == 1) => many.iter().map(|r| r[0].clone()).collect(),
        _ => bail!("Expected a 1D array (single row or single column)"),
    };

    if cells.iter().all(|c| c == "true" || c == "false") {
        return Ok(RawFilter::Mask(cells.iter().map(|c| c == "true").collect()));
    }

    let indices = cells
        .iter()
        .enumerate()
        .map(|(j, tok)| {
            tok.parse::<usize>()
                .with_context(|| format!("[{j}]: '{tok}' is not a non-negative integer"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RawFilter::Indices(indices))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Reads the first column of the file. Integer columns are indices, boolean
/// columns are masks; nulls are rejected.
fn load_parquet(path: &Path) -> Result<RawFilter> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut indices = Vec::new();
    let mut mask = Vec::new();
    let mut is_mask = None;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        if batch.num_columns() == 0 {
            bail!("Parquet file has no columns");
        }
        let col = batch.column(0);
        if col.null_count() > 0 {
            bail!("Filter column contains nulls");
        }

        match col.data_type() {
            DataType::Boolean => {
                is_mask = Some(true);
                let arr = col
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .context("expected BooleanArray")?;
                mask.extend(arr.iter().map(|v| v.unwrap_or(false)));
            }
            DataType::Int32 => {
                is_mask = Some(false);
                let arr = col
                    .as_any()
                    .downcast_ref::<Int32Array>()
                    .context("expected Int32Array")?;
                for v in arr.values().iter() {
                    indices.push(usize::try_from(*v).context("negative index")?);
                }
            }
            DataType::Int64 => {
                is_mask = Some(false);
                let arr = col
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .context("expected Int64Array")?;
                for v in arr.values().iter() {
                    indices.push(usize::try_from(*v).context("negative index")?);
                }
            }
            DataType::UInt32 => {
                is_mask = Some(false);
                let arr = col
                    .as_any()
                    .downcast_ref::<UInt32Array>()
                    .context("expected UInt32Array")?;
                indices.extend(arr.values().iter().map(|v| *v as usize));
            }
            DataType::UInt64 => {
                is_mask = Some(false);
                let arr = col
                    .as_any()
                    .downcast_ref::<UInt64Array>()
                    .context("expected UInt64Array")?;
                indices.extend(arr.values().iter().map(|v| *v as usize));
            }
            other => bail!("Filter column type is {other:?}, expected integers or booleans"),
        }
    }

    match is_mask {
        Some(true) => Ok(RawFilter::Mask(mask)),
        Some(false) => Ok(RawFilter::Indices(indices)),
        None => bail!("Parquet file contains no rows"),
    }
}
