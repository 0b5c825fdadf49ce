//! Reassembly of a block tree into tables.
//!
//! Three entry points share collection as their first step:
//!
//! - [`assemble`] reads everything and returns one joined table
//! - [`iterate`] returns a [`BlockIter`] that reads one unit of work per `next()`
//! - [`partitioned`] returns a [`Partitioned`] handle with one independently
//!   computable [`Partition`] per shared row group, evaluated with `rayon`
//!
//! Every entry point owns its staging directory. [`assemble`] drops it on return,
//! [`BlockIter`] when the iterator is dropped (exhausted or not), and [`Partitioned`]
//! when the last partition handle is dropped.

use crate::Blocks;
use crate::codec::CodecRegistry;
use crate::collect::{Grouping, collect};
use crate::error::{BlocksError, Result};
use crate::join::{concat_tables, merge_all};
use crate::options::AssembleOptions;
use arrow::array::RecordBatch;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tempfile::TempDir;

/// Read every file of one column group and concatenate them in order.
fn read_column_group(
    codecs: &CodecRegistry,
    opts: &AssembleOptions,
    cgroup: Option<&str>,
    files: &[String],
) -> Result<RecordBatch> {
    let args = opts.args_for(cgroup);
    let tables = files
        .iter()
        .map(|f| codecs.read_table(f, &args))
        .collect::<Result<Vec<_>>>()?;
    concat_tables(&tables)
}

/// Read one row group from each column group and join them.
fn read_row_group(
    codecs: &CodecRegistry,
    opts: &AssembleOptions,
    members: &[(Option<String>, String)],
) -> Result<RecordBatch> {
    let tables = members
        .iter()
        .map(|(cgroup, file)| {
            let table = codecs.read_table(file, &opts.args_for(cgroup.as_deref()))?;
            Ok((cgroup.clone(), table))
        })
        .collect::<Result<Vec<_>>>()?;
    merge_all(tables, opts.join, opts.strict)
}

/// One `(column group, file)` per column group for each shared row group, ascending.
fn row_group_members(grouping: &Grouping) -> Vec<(String, Vec<(Option<String>, String)>)> {
    grouping
        .shared_row_groups()
        .into_iter()
        .map(|rgroup| {
            let members = grouping
                .iter()
                .filter_map(|(cgroup, _)| {
                    grouping
                        .member(cgroup, &rgroup)
                        .map(|file| (cgroup.map(str::to_string), file.to_string()))
                })
                .collect();
            (rgroup, members)
        })
        .collect()
}

/// Collect `root` into `staging` using the filters in `opts`.
fn collect_into(
    blocks: &Blocks,
    root: &str,
    opts: &AssembleOptions,
    staging: &TempDir,
) -> Result<Grouping> {
    collect(
        root,
        opts.cgroups.as_deref(),
        opts.rgroups.as_deref(),
        blocks.storage(),
        staging.path(),
    )
}

// ============================================================================
// assemble
// ============================================================================

/// Read the block tree under `root` into a single table.
///
/// Each column group is concatenated over its row groups, then the column groups
/// are joined left to right on their shared columns using `opts.join`.
///
/// # Errors
///
/// Returns an error if collection, decoding, or a join fails
pub fn assemble(blocks: &Blocks, root: &str, opts: &AssembleOptions) -> Result<RecordBatch> {
    let staging = blocks.staging()?;
    let grouping = collect_into(blocks, root, opts, &staging)?;
    log::info!(
        "Assembling {} column group(s) from {root} ({} join)",
        grouping.len(),
        opts.join
    );
    let tables = grouping
        .iter()
        .map(|(cgroup, files)| {
            let table = read_column_group(blocks.codecs(), opts, cgroup, files)?;
            Ok((cgroup.map(str::to_string), table))
        })
        .collect::<Result<Vec<_>>>()?;
    merge_all(tables, opts.join, opts.strict)
}

// ============================================================================
// iterate
// ============================================================================

/// Enumeration axis for [`iterate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Every file on its own (`-1`).
    #[default]
    Cells,
    /// Row groups shared by all column groups, joined (`0`).
    RowGroups,
    /// Column groups, concatenated over their row groups (`1`).
    ColumnGroups,
}

impl TryFrom<i64> for Axis {
    type Error = BlocksError;

    fn try_from(axis: i64) -> Result<Self> {
        match axis {
            -1 => Ok(Self::Cells),
            0 => Ok(Self::RowGroups),
            1 => Ok(Self::ColumnGroups),
            other => Err(BlocksError::invalid(format!(
                "axis must be -1, 0 or 1, got {other}"
            ))),
        }
    }
}

/// One item produced by [`BlockIter`].
///
/// - [`Axis::Cells`]: both names set (column group is `None` for the root group)
/// - [`Axis::RowGroups`]: only `row_group` set
/// - [`Axis::ColumnGroups`]: only `column_group` set
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub column_group: Option<String>,
    pub row_group: Option<String>,
    pub table: RecordBatch,
}

enum Unit {
    Cell {
        cgroup: Option<String>,
        file: String,
    },
    Row {
        rgroup: String,
        members: Vec<(Option<String>, String)>,
    },
    Column {
        cgroup: Option<String>,
        files: Vec<String>,
    },
}

/// Lazy, single-pass sequence of [`Block`]s.
///
/// Files are only read when the next block is requested. The staging directory
/// holding remote files lives as long as the iterator.
pub struct BlockIter {
    units: VecDeque<Unit>,
    codecs: CodecRegistry,
    opts: AssembleOptions,
    _staging: TempDir,
}

impl fmt::Debug for BlockIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockIter")
            .field("remaining", &self.units.len())
            .finish_non_exhaustive()
    }
}

impl BlockIter {
    fn produce(&self, unit: Unit) -> Result<Block> {
        match unit {
            Unit::Cell { cgroup, file } => {
                let table = self
                    .codecs
                    .read_table(&file, &self.opts.args_for(cgroup.as_deref()))?;
                Ok(Block {
                    row_group: Some(crate::path::row_group_of(&file).to_string()),
                    column_group: cgroup,
                    table,
                })
            }
            Unit::Row { rgroup, members } => Ok(Block {
                column_group: None,
                table: read_row_group(&self.codecs, &self.opts, &members)?,
                row_group: Some(rgroup),
            }),
            Unit::Column { cgroup, files } => Ok(Block {
                table: read_column_group(&self.codecs, &self.opts, cgroup.as_deref(), &files)?,
                column_group: cgroup,
                row_group: None,
            }),
        }
    }
}

impl Iterator for BlockIter {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let unit = self.units.pop_front()?;
        Some(self.produce(unit))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.units.len(), Some(self.units.len()))
    }
}

impl ExactSizeIterator for BlockIter {}

/// Enumerate the block tree under `root` along `axis` without reading ahead.
///
/// Collection (listing and staging) happens before this returns; decoding happens
/// one block at a time as the iterator advances.
///
/// # Errors
///
/// Returns an error if collection fails
pub fn iterate(
    blocks: &Blocks,
    root: &str,
    axis: Axis,
    opts: &AssembleOptions,
) -> Result<BlockIter> {
    let staging = blocks.staging()?;
    let grouping = collect_into(blocks, root, opts, &staging)?;

    let units: VecDeque<Unit> = match axis {
        Axis::Cells => grouping
            .into_iter()
            .flat_map(|(cgroup, files)| {
                files.into_iter().map(move |file| Unit::Cell {
                    cgroup: cgroup.clone(),
                    file,
                })
            })
            .collect(),
        Axis::RowGroups => row_group_members(&grouping)
            .into_iter()
            .map(|(rgroup, members)| Unit::Row { rgroup, members })
            .collect(),
        Axis::ColumnGroups => grouping
            .into_iter()
            .map(|(cgroup, files)| Unit::Column { cgroup, files })
            .collect(),
    };
    log::debug!("Iterating {} block(s) of {root} along {axis:?}", units.len());

    Ok(BlockIter {
        units,
        codecs: blocks.codecs().clone(),
        opts: opts.clone(),
        _staging: staging,
    })
}

// ============================================================================
// partitioned
// ============================================================================

/// One shared row group, joined across column groups on demand.
#[derive(Clone)]
pub struct Partition {
    row_group: String,
    members: Vec<(Option<String>, String)>,
    codecs: CodecRegistry,
    opts: Arc<AssembleOptions>,
    _staging: Arc<TempDir>,
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("row_group", &self.row_group)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

impl Partition {
    #[must_use]
    pub fn row_group(&self) -> &str {
        &self.row_group
    }

    /// Files read by this partition, one per column group.
    #[must_use]
    pub fn files(&self) -> Vec<&str> {
        self.members.iter().map(|(_, f)| f.as_str()).collect()
    }

    /// Read and join this row group.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or the join fails
    pub fn compute(&self) -> Result<RecordBatch> {
        read_row_group(&self.codecs, &self.opts, &self.members)
    }
}

/// Lazy table made of one [`Partition`] per shared row group, ascending.
#[derive(Debug, Clone)]
pub struct Partitioned {
    partitions: Vec<Partition>,
}

impl Partitioned {
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    #[must_use]
    pub fn into_partitions(self) -> Vec<Partition> {
        self.partitions
    }

    /// Compute every partition in parallel and concatenate them in row-group order.
    ///
    /// # Errors
    ///
    /// Returns the first partition error, or an error if there are no partitions
    pub fn compute(&self) -> Result<RecordBatch> {
        #[cfg(feature = "parallel")]
        let tables = self
            .partitions
            .par_iter()
            .map(Partition::compute)
            .collect::<Result<Vec<_>>>()?;
        #[cfg(not(feature = "parallel"))]
        let tables = self
            .partitions
            .iter()
            .map(Partition::compute)
            .collect::<Result<Vec<_>>>()?;
        concat_tables(&tables)
    }
}

/// Build a [`Partitioned`] handle over the shared row groups under `root`.
///
/// Staged files stay on disk until every partition handle has been dropped.
///
/// # Errors
///
/// - [`BlocksError::MissingDependency`] without the `parallel` feature
/// - [`BlocksError::NotFound`] when no row group is shared by every column group
/// - any collection error
pub fn partitioned(blocks: &Blocks, root: &str, opts: &AssembleOptions) -> Result<Partitioned> {
    if !cfg!(feature = "parallel") {
        return Err(BlocksError::MissingDependency {
            what: "partitioned assembly".to_string(),
            feature: "parallel",
        });
    }

    let staging = blocks.staging()?;
    let grouping = collect_into(blocks, root, opts, &staging)?;
    let units = row_group_members(&grouping);
    if units.is_empty() {
        return Err(BlocksError::not_found(
            root,
            format!("no row group under {root} is shared by every column group"),
        ));
    }

    let staging = Arc::new(staging);
    let opts = Arc::new(opts.clone());
    let partitions = units
        .into_iter()
        .map(|(row_group, members)| Partition {
            row_group,
            members,
            codecs: blocks.codecs().clone(),
            opts: Arc::clone(&opts),
            _staging: Arc::clone(&staging),
        })
        .collect::<Vec<_>>();
    log::info!("Partitioned {root} into {} row group(s)", partitions.len());
    Ok(Partitioned { partitions })
}
