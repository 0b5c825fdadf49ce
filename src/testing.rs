//! Fixtures for tests of code built on block trees.
//!
//! [`TreeSpec`] describes a synthetic dataset of `column_groups x row_groups` files.
//! Every file carries a shared `key` column plus its own float feature columns, so
//! assembling the tree joins on `key`:
//!
//! ```text
//! root/c0/part.0.csv   key, f0_0 .. f0_9   (rows key0000 .. key0009)
//! root/c0/part.1.csv   key, f0_0 .. f0_9   (rows key0010 .. key0019)
//! root/c1/part.0.csv   key, f1_0 .. f1_9
//! ...
//! ```
//!
//! Feature values are never whole numbers, so CSV type inference always reads them
//! back as floats.
//!
//! ```
//! use ironblocks::testing::{TreeSpec, populate};
//! use ironblocks::{AssembleOptions, Blocks};
//!
//! # fn main() -> ironblocks::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let root = dir.path().to_string_lossy().to_string();
//! let blocks = Blocks::new();
//! populate(blocks.storage(), blocks.codecs(), &root, &TreeSpec::default())?;
//!
//! let table = blocks.assemble(&root, &AssembleOptions::new())?;
//! assert_eq!((table.num_rows(), table.num_columns()), (40, 41));
//! # Ok(())
//! # }
//! ```

use crate::codec::CodecRegistry;
use crate::error::{BlocksError, Result};
use crate::path;
use crate::storage::Storage;
use arrow::array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray};
use std::sync::Arc;

/// Name of the column every fixture file shares.
pub const KEY: &str = "key";

/// Shape of a synthetic block tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSpec {
    pub column_groups: usize,
    pub row_groups: usize,
    /// Rows per file.
    pub rows: usize,
    /// Feature columns per column group, not counting `key`.
    pub columns: usize,
    pub extension: String,
}

impl Default for TreeSpec {
    fn default() -> Self {
        Self {
            column_groups: 4,
            row_groups: 4,
            rows: 10,
            columns: 10,
            extension: ".csv".to_string(),
        }
    }
}

impl TreeSpec {
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    #[must_use]
    pub fn cgroup_name(&self, c: usize) -> String {
        format!("c{c}")
    }

    #[must_use]
    pub fn rgroup_name(&self, r: usize) -> String {
        format!("part.{r}{}", self.extension)
    }

    fn keys(&self, first_row: usize, rows: usize) -> ArrayRef {
        Arc::new(StringArray::from_iter_values(
            (first_row..first_row + rows).map(|i| format!("key{i:04}")),
        ))
    }

    #[allow(clippy::cast_precision_loss)]
    fn features(&self, c: usize, first_row: usize, rows: usize) -> Vec<(String, ArrayRef)> {
        (0..self.columns)
            .map(|j| {
                let values = (first_row..first_row + rows)
                    .map(|i| ((c * 1_000_000 + i * self.columns + j) as f64) + 0.25);
                (
                    format!("f{c}_{j}"),
                    Arc::new(Float64Array::from_iter_values(values)) as ArrayRef,
                )
            })
            .collect()
    }

    /// Contents of the file for column group `c`, row group `r`.
    ///
    /// # Errors
    ///
    /// Only fails if Arrow rejects the generated columns
    pub fn block(&self, c: usize, r: usize) -> Result<RecordBatch> {
        let first_row = r * self.rows;
        let mut columns = vec![(KEY.to_string(), self.keys(first_row, self.rows))];
        columns.extend(self.features(c, first_row, self.rows));
        Ok(RecordBatch::try_from_iter(columns)?)
    }

    /// The fully assembled table: `key`, then every column group's features in order.
    ///
    /// # Errors
    ///
    /// Only fails if Arrow rejects the generated columns
    pub fn wide(&self) -> Result<RecordBatch> {
        let total = self.rows * self.row_groups;
        let mut columns = vec![(KEY.to_string(), self.keys(0, total))];
        for c in 0..self.column_groups {
            columns.extend(self.features(c, 0, total));
        }
        Ok(RecordBatch::try_from_iter(columns)?)
    }
}

/// Write the tree described by `spec` under `root` through `storage`.
///
/// Each file is encoded locally with `codecs` and then written to its final path,
/// so `root` may live on any registered backend. Returns the written paths.
///
/// # Errors
///
/// Returns an error if encoding or a write fails
pub fn populate(
    storage: &dyn Storage,
    codecs: &CodecRegistry,
    root: &str,
    spec: &TreeSpec,
) -> Result<Vec<String>> {
    let scratch = tempfile::tempdir().map_err(|e| BlocksError::io("create scratch dir", e))?;
    let mut written = Vec::new();
    for c in 0..spec.column_groups {
        for r in 0..spec.row_groups {
            let name = spec.rgroup_name(r);
            let local = scratch.path().join(&name);
            let local = local.to_string_lossy();
            codecs.write_table(&spec.block(c, r)?, &local, &Default::default())?;
            let bytes = std::fs::read(&*local)
                .map_err(|e| BlocksError::io(format!("read back {local}"), e))?;

            let dest = path::join(&path::join(root, &spec.cgroup_name(c)), &name);
            storage.write(&dest, &bytes)?;
            written.push(dest);
        }
    }
    Ok(written)
}

/// Assert that two tables hold the same column names and values, in order.
///
/// Field nullability and schema metadata are ignored, since they legitimately
/// differ between a table built in memory and one decoded from a file.
///
/// # Panics
///
/// Panics with the first difference found
#[track_caller]
pub fn assert_same_columns(actual: &RecordBatch, expected: &RecordBatch) {
    let names = |t: &RecordBatch| -> Vec<String> {
        t.schema().fields().iter().map(|f| f.name().clone()).collect()
    };
    assert_eq!(names(actual), names(expected), "column names differ");
    assert_eq!(actual.num_rows(), expected.num_rows(), "row counts differ");
    for (i, name) in names(expected).iter().enumerate() {
        let (a, e) = (actual.column(i).to_data(), expected.column(i).to_data());
        assert!(a == e, "column {name} differs: {:?} vs {:?}", actual.column(i), expected.column(i));
    }
}
