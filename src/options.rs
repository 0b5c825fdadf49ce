//! Configuration for reads, writes, joins and whole operations.
//!
//! Every options type derives `serde` traits with `#[serde(default)]`, so a job can
//! keep its settings in a JSON file and load them with [`serde_json`]:
//!
//! ```
//! use ironblocks::options::{AssembleOptions, JoinMode};
//!
//! let opts: AssembleOptions = serde_json::from_str(
//!     r#"{ "cgroups": ["c2", "c0"], "join": "left", "cgroup_args": { "c0": { "all_utf8": true } } }"#,
//! ).unwrap();
//! assert_eq!(opts.join, JoinMode::Left);
//! assert_eq!(opts.cgroups.as_deref(), Some(&["c2".to_string(), "c0".to_string()][..]));
//! ```

use crate::error::{BlocksError, Result};
use crate::storage::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Codec arguments
// ============================================================================

/// Parquet column compression used when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    None,
    Snappy,
    Gzip,
    Zstd,
}

/// Arguments handed to a table codec on read or write.
///
/// Unset fields fall back to the codec's defaults. Formats ignore the fields that
/// do not apply to them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatArgs {
    /// CSV: whether the first line holds column names (default `true`).
    pub has_header: Option<bool>,
    /// CSV: field delimiter (default `b','`).
    pub delimiter: Option<u8>,
    /// Keep only these columns, in this order, after decoding.
    pub columns: Option<Vec<String>>,
    /// CSV / JSON Lines: read every column as UTF-8 strings instead of inferring types.
    pub all_utf8: Option<bool>,
    /// Rows per decoded batch before concatenation.
    pub batch_size: Option<usize>,
    /// Parquet: column compression on write.
    pub parquet_compression: Option<ParquetCompression>,
}

impl FormatArgs {
    /// Combine defaults with an override; fields set on `other` win.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            has_header: other.has_header.or(self.has_header),
            delimiter: other.delimiter.or(self.delimiter),
            columns: other.columns.clone().or_else(|| self.columns.clone()),
            all_utf8: other.all_utf8.or(self.all_utf8),
            batch_size: other.batch_size.or(self.batch_size),
            parquet_compression: other.parquet_compression.or(self.parquet_compression),
        }
    }

    #[must_use]
    pub const fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub const fn with_all_utf8(mut self, all_utf8: bool) -> Self {
        self.all_utf8 = Some(all_utf8);
        self
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub const fn with_parquet_compression(mut self, compression: ParquetCompression) -> Self {
        self.parquet_compression = Some(compression);
        self
    }

    pub(crate) fn batch_size_or_default(&self) -> usize {
        self.batch_size.unwrap_or(64 * 1024).max(1)
    }
}

// ============================================================================
// Joins
// ============================================================================

/// Relational strategy used to combine column groups on their shared columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl FromStr for JoinMode {
    type Err = BlocksError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "outer" | "full" => Ok(Self::Outer),
            other => Err(BlocksError::invalid(format!(
                "unknown join mode {other:?}, expected one of inner, left, right, outer"
            ))),
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Outer => "outer",
        })
    }
}

// ============================================================================
// Operation options
// ============================================================================

/// Options shared by `assemble`, `iterate` and `partitioned`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssembleOptions {
    /// Column groups to include, in output order. `None` includes all, alphabetically.
    pub cgroups: Option<Vec<String>>,
    /// Row groups (file base names) to include. `None` includes all.
    pub rgroups: Option<Vec<String>>,
    /// Codec arguments applied to every file.
    pub read_args: FormatArgs,
    /// Per-column-group overrides merged over `read_args`.
    pub cgroup_args: BTreeMap<String, FormatArgs>,
    pub join: JoinMode,
    /// Fail on row-count mismatches between joined column groups instead of warning.
    pub strict: bool,
}

impl AssembleOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cgroups<I, S>(mut self, cgroups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cgroups = Some(cgroups.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_rgroups<I, S>(mut self, rgroups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rgroups = Some(rgroups.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_read_args(mut self, args: FormatArgs) -> Self {
        self.read_args = args;
        self
    }

    #[must_use]
    pub fn with_cgroup_args(mut self, cgroup: impl Into<String>, args: FormatArgs) -> Self {
        self.cgroup_args.insert(cgroup.into(), args);
        self
    }

    #[must_use]
    pub const fn with_join(mut self, join: JoinMode) -> Self {
        self.join = join;
        self
    }

    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Effective read arguments for one column group.
    #[must_use]
    pub fn args_for(&self, cgroup: Option<&str>) -> FormatArgs {
        cgroup
            .and_then(|name| self.cgroup_args.get(name))
            .map_or_else(|| self.read_args.clone(), |o| self.read_args.merged(o))
    }
}

/// Options for `divide`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivideOptions {
    /// Number of row groups per column group; shards differ in size by at most one row.
    pub n_row_groups: usize,
    /// Added to the shard index in file names (`part_00010.pq` for offset 10).
    pub row_group_offset: usize,
    /// Column group name -> columns. `None` writes the whole table without subdirectories.
    pub column_groups: Option<BTreeMap<String, Vec<String>>>,
    /// File extension selecting the codec; a missing leading `.` is added.
    pub extension: String,
    /// Best-effort numeric coercion of string columns before writing.
    pub convert: bool,
    /// Prepended to every file name as `{prefix}_part_00000.pq`.
    pub prefix: Option<String>,
    pub write_args: FormatArgs,
}

impl Default for DivideOptions {
    fn default() -> Self {
        Self {
            n_row_groups: 1,
            row_group_offset: 0,
            column_groups: None,
            extension: ".pq".to_string(),
            convert: false,
            prefix: None,
            write_args: FormatArgs::default(),
        }
    }
}

impl DivideOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_row_groups(mut self, n: usize) -> Self {
        self.n_row_groups = n;
        self
    }

    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.row_group_offset = offset;
        self
    }

    #[must_use]
    pub fn with_column_group<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_groups
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    #[must_use]
    pub const fn with_convert(mut self, convert: bool) -> Self {
        self.convert = convert;
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_write_args(mut self, args: FormatArgs) -> Self {
        self.write_args = args;
        self
    }

    /// The extension with its leading `.`.
    ///
    /// # Errors
    ///
    /// Returns [`BlocksError::InvalidArgument`] for an empty extension
    pub fn normalized_extension(&self) -> Result<String> {
        let ext = self.extension.trim();
        let bare = ext.trim_start_matches('.');
        if bare.is_empty() {
            return Err(BlocksError::invalid(format!(
                "extension {:?} does not name a format",
                self.extension
            )));
        }
        Ok(format!(".{bare}"))
    }

    /// File name of the shard with zero-based index `index`.
    #[must_use]
    pub fn shard_name(&self, index: usize, extension: &str) -> String {
        let n = index + self.row_group_offset;
        match &self.prefix {
            Some(prefix) => format!("{prefix}_part_{n:05}{extension}"),
            None => format!("part_{n:05}{extension}"),
        }
    }
}

/// Settings for a [`Blocks`](crate::Blocks) instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocksConfig {
    /// Directory in which scoped staging directories are created; system temp if unset.
    pub staging_root: Option<PathBuf>,
    /// Backoff applied to transfers involving remote storage.
    pub retry: RetryPolicy,
}
