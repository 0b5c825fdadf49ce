//! Division: the inverse of assembly.
//!
//! A table is cut into `n_row_groups` contiguous shards per column group, each shard
//! is encoded into a local staging directory, and everything staged is then copied
//! to the destination in one batched request:
//!
//! ```text
//! staging/c0/part_00000.pq      ->  path/c0/part_00000.pq
//! staging/c0/part_00001.pq      ->  path/c0/part_00001.pq
//! staging/c1/part_00000.pq      ->  path/c1/part_00000.pq
//! ```
//!
//! Without column groups the shards are written directly under `path`.

use crate::Blocks;
use crate::codec::select_columns;
use crate::error::{BlocksError, Result};
use crate::options::{DivideOptions, FormatArgs};
use crate::path;
use crate::storage::{ErrorKind, Storage, StorageError};
use arrow::array::{Array, ArrayRef, RecordBatch};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::{DataType, Field, Schema};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Row counts of a balanced contiguous split of `rows` into `n` shards.
///
/// The first `rows % n` shards get one extra row. `n == 0` yields no shards.
#[must_use]
pub fn split_sizes(rows: usize, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let (base, extra) = (rows / n, rows % n);
    (0..n).map(|i| base + usize::from(i < extra)).collect()
}

/// Zero-copy contiguous shards of `table`, in order.
#[must_use]
pub fn split_table(table: &RecordBatch, n: usize) -> Vec<RecordBatch> {
    let mut offset = 0;
    split_sizes(table.num_rows(), n)
        .into_iter()
        .map(|len| {
            let shard = table.slice(offset, len);
            offset += len;
            shard
        })
        .collect()
}

/// Numeric reading of a string column, or `None` when any value doesn't parse.
fn coerce(column: &ArrayRef) -> Option<ArrayRef> {
    let strict = CastOptions {
        safe: false,
        ..CastOptions::default()
    };
    [DataType::Int64, DataType::Float64]
        .iter()
        .find_map(|target| cast_with_options(column, target, &strict).ok())
}

/// `base/cgroup`, or `base` itself for the implicit column group.
fn group_dir(base: &str, cgroup: Option<&str>) -> String {
    cgroup.map_or_else(|| base.to_string(), |name| path::join(base, name))
}

/// Best-effort numeric coercion: string columns that parse fully as integers become
/// Int64, else fully as floats become Float64. Other columns pass through.
///
/// # Errors
///
/// Only fails if the coerced columns can't be reassembled into a batch
pub fn convert_numeric(table: &RecordBatch) -> Result<RecordBatch> {
    let schema = table.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (field, column) in schema.fields().iter().zip(table.columns()) {
        let coerced = matches!(column.data_type(), DataType::Utf8 | DataType::LargeUtf8)
            .then(|| coerce(column))
            .flatten();
        match coerced {
            Some(array) => {
                log::debug!("Converted column {} to {}", field.name(), array.data_type());
                fields.push(Arc::new(Field::new(
                    field.name(),
                    array.data_type().clone(),
                    field.is_nullable(),
                )));
                columns.push(array);
            }
            None => {
                fields.push(Arc::clone(field));
                columns.push(Arc::clone(column));
            }
        }
    }
    Ok(RecordBatch::try_new(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
    )?)
}

/// Split `table` into row and column groups and write them under `root`.
///
/// Returns the destination path of every shard, column group major.
///
/// # Errors
///
/// - [`BlocksError::InvalidArgument`] for zero row groups, an empty extension, or a
///   column group naming a column the table doesn't have
/// - [`BlocksError::UnsupportedFormat`] / [`BlocksError::MissingDependency`] when the
///   extension has no usable codec
/// - any codec or storage failure; nothing is copied if a shard fails to encode
pub fn divide(
    blocks: &Blocks,
    table: &RecordBatch,
    root: &str,
    opts: &DivideOptions,
) -> Result<Vec<String>> {
    if opts.n_row_groups == 0 {
        return Err(BlocksError::invalid("n_row_groups must be at least 1"));
    }
    let ext = opts.normalized_extension()?;
    blocks.codecs().resolve(&opts.shard_name(0, &ext))?;

    let converted;
    let table = if opts.convert {
        converted = convert_numeric(table)?;
        &converted
    } else {
        table
    };

    let groups: Vec<(Option<&str>, RecordBatch)> = match &opts.column_groups {
        None => vec![(None, table.clone())],
        Some(map) => map
            .iter()
            .map(|(name, columns)| {
                let part = select_columns(table, columns, &format!("column group {name}"))?;
                Ok((Some(name.as_str()), part))
            })
            .collect::<Result<_>>()?,
    };
    log::info!(
        "Dividing {} row(s) into {} row group(s) x {} column group(s) under {root}",
        table.num_rows(),
        opts.n_row_groups,
        groups.len()
    );

    let staging = blocks.staging()?;
    let staging_root = staging.path().to_string_lossy().to_string();
    let mut staged = Vec::new();
    let mut written = Vec::new();
    for (cgroup, part) in &groups {
        let local_dir = group_dir(&staging_root, *cgroup);
        let dest_dir = group_dir(root, *cgroup);
        for (i, shard) in split_table(part, opts.n_row_groups).iter().enumerate() {
            let name = opts.shard_name(i, &ext);
            let local = path::join(&local_dir, &name);
            blocks.codecs().write_table(shard, &local, &opts.write_args)?;
            written.push(path::join(&dest_dir, &name));
            if cgroup.is_none() {
                staged.push(local);
            }
        }
        if cgroup.is_some() {
            staged.push(local_dir);
        }
    }

    let storage = blocks.storage();
    for (cgroup, _) in &groups {
        storage.make_directory(&group_dir(root, *cgroup))?;
    }
    let recursive = opts.column_groups.is_some();
    storage.copy(&staged, root, recursive)?;
    for (cgroup, _) in &groups {
        let dest_dir = group_dir(root, *cgroup);
        let expected: Vec<&str> = written
            .iter()
            .filter(|w| path::parent(w) == dest_dir.trim_end_matches('/'))
            .map(|w| path::basename(w))
            .collect();
        verify_copied(storage, &dest_dir, &expected)?;
    }
    Ok(written)
}

/// Fail unless every name in `expected` is listed under `dir`.
fn verify_copied(storage: &dyn Storage, dir: &str, expected: &[&str]) -> Result<()> {
    let present: BTreeSet<String> = storage
        .list(dir)?
        .iter()
        .map(|p| path::basename(p).to_string())
        .collect();
    let missing: Vec<&str> = expected
        .iter()
        .copied()
        .filter(|name| !present.contains(*name))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(StorageError::new(
        ErrorKind::NotFound,
        format!(
            "{} of {} file(s) missing under {dir} after the copy: {}",
            missing.len(),
            expected.len(),
            missing.join(", ")
        ),
    )
    .into())
}

/// Write one table to one file by staging it locally and copying it into place.
///
/// # Errors
///
/// Returns an error if encoding or the copy fails
pub fn place(blocks: &Blocks, table: &RecordBatch, dest: &str, args: &FormatArgs) -> Result<()> {
    let name = path::basename(dest);
    if !path::has_extension(name) {
        return Err(BlocksError::invalid(format!(
            "{dest} has no extension to select a format"
        )));
    }
    let staging = blocks.staging()?;
    let local = path::join(&staging.path().to_string_lossy(), name);
    blocks.codecs().write_table(table, &local, args)?;

    let dir = match path::parent(dest) {
        "" => ".",
        dir => dir,
    };
    let storage = blocks.storage();
    storage.make_directory(dir)?;
    storage.copy(&[local], dir, false)?;
    verify_copied(storage, dir, &[name])?;
    log::info!("Placed {} row(s) at {dest}", table.num_rows());
    Ok(())
}
