//! # Ironblocks
//!
//! Store a table as a **directory tree of blocks** and assemble any subset of it back
//! into a single Arrow [`RecordBatch`].
//!
//! The tree layout carries two partitioning axes:
//!
//! ```text
//! dataset/
//!   c0/part_00000.pq    <- column group "c0" (a subset of columns)
//!   c0/part_00001.pq    <- row group "part_00001.pq" (a subset of rows)
//!   c1/part_00000.pq
//!   c1/part_00001.pq
//! ```
//!
//! Files with the same base name in different column-group directories hold the same
//! rows. Within a column group, row groups are concatenated; across column groups,
//! tables are joined on the columns they share.
//!
//! ## Key Features
//!
//! - **Assemble** - read a whole tree, or only some column and row groups, into one table
//! - **Iterate** - stream one file, row group, or column group at a time
//! - **Partitioned** - one lazily computed partition per row group, evaluated with `rayon`
//! - **Divide** - split a table into row groups x column groups and write them out
//! - **Any storage** - local disk, or any backend behind the [`Storage`] trait, with
//!   staging of remote files and retries with exponential backoff
//! - **Formats** - CSV, Parquet, JSON Lines and Arrow IPC, with gzip / zstd / bzip2 / xz
//!   compression suffixes for the text formats (all optional via feature flags)
//!
//! ## Quick Start
//!
//! ```
//! use ironblocks::{AssembleOptions, Blocks, DivideOptions};
//! use ironblocks::testing::TreeSpec;
//!
//! # fn main() -> ironblocks::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let root = dir.path().join("dataset").to_string_lossy().to_string();
//! let blocks = Blocks::new();
//!
//! // Split a 40-row table into 4 row groups of two column groups.
//! let table = TreeSpec::default().wide()?;
//! let opts = DivideOptions::new()
//!     .with_row_groups(4)
//!     .with_column_group("a", ["key", "f0_0", "f0_1"])
//!     .with_column_group("b", ["key", "f1_0"]);
//! blocks.divide(&table, &root, &opts)?;
//!
//! // Read back only column group "b" and the first two row groups.
//! let part = blocks.assemble(
//!     &root,
//!     &AssembleOptions::new()
//!         .with_cgroups(["b"])
//!         .with_rgroups(["part_00000.pq", "part_00001.pq"]),
//! )?;
//! assert_eq!((part.num_rows(), part.num_columns()), (20, 2));
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage
//!
//! [`Blocks::new`] uses a [`FileSystem`](storage::FileSystem), which sends plain paths
//! to the local disk and `scheme://` paths to registered backends:
//!
//! ```
//! use ironblocks::Blocks;
//! use ironblocks::storage::{FileSystem, MemoryStorage, RetryPolicy};
//! use std::sync::Arc;
//!
//! let fs = FileSystem::new()
//!     .with_backend("mem", Arc::new(MemoryStorage::new()))
//!     .with_retry(RetryPolicy::immediate(3));
//! let blocks = Blocks::new().with_storage(Arc::new(fs));
//! ```
//!
//! ## Feature Flags
//!
//! - `io-csv`, `io-parquet`, `io-jsonl` - table codecs (Arrow IPC is always available)
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz`
//! - `parallel` - [`Blocks::partitioned`] and parallel partition evaluation
//!
//! All of them are enabled by default.

pub mod assemble;
pub mod blob;
pub mod codec;
pub mod collect;
pub mod divide;
pub mod error;
pub mod join;
pub mod options;
pub mod path;
pub mod storage;
pub mod testing;

pub use arrow::array::RecordBatch;
pub use assemble::{Axis, Block, BlockIter, Partition, Partitioned};
pub use codec::{CodecRegistry, TableCodec};
pub use collect::Grouping;
pub use error::{BlocksError, Result};
pub use options::{AssembleOptions, BlocksConfig, DivideOptions, FormatArgs, JoinMode};
pub use storage::{FileSystem, Storage};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tempfile::TempDir;

/// Entry point: storage, codecs and configuration shared by every operation.
///
/// Cloning is cheap; clones share the same storage backend.
#[derive(Clone)]
pub struct Blocks {
    storage: Arc<dyn Storage>,
    codecs: CodecRegistry,
    config: BlocksConfig,
}

impl Default for Blocks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Blocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocks")
            .field("codecs", &self.codecs)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Blocks {
    /// Local-disk storage, built-in codecs, default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BlocksConfig::default())
    }

    /// A [`FileSystem`] using `config.retry`, built-in codecs.
    #[must_use]
    pub fn with_config(config: BlocksConfig) -> Self {
        Self {
            storage: Arc::new(FileSystem::new().with_retry(config.retry)),
            codecs: CodecRegistry::default(),
            config,
        }
    }

    /// Replace the storage capability. The replacement brings its own retry policy.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    #[must_use]
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    #[must_use]
    pub const fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    #[must_use]
    pub const fn config(&self) -> &BlocksConfig {
        &self.config
    }

    /// A fresh staging directory under the configured root.
    pub(crate) fn staging(&self) -> Result<TempDir> {
        collect::staging_dir(self.config.staging_root.as_deref())
    }

    /// Collect `root` into `staging` without reading any file.
    ///
    /// # Errors
    ///
    /// See [`collect::collect`]
    pub fn collect(
        &self,
        root: &str,
        cgroups: Option<&[String]>,
        rgroups: Option<&[String]>,
        staging: &std::path::Path,
    ) -> Result<Grouping> {
        collect::collect(root, cgroups, rgroups, self.storage(), staging)
    }

    /// Read the tree under `root` into one table. See [`assemble::assemble`].
    ///
    /// # Errors
    ///
    /// Returns an error if collection, decoding, or a join fails
    pub fn assemble(&self, root: &str, opts: &AssembleOptions) -> Result<RecordBatch> {
        assemble::assemble(self, root, opts)
    }

    /// Lazily enumerate the tree under `root` along `axis`. See [`assemble::iterate`].
    ///
    /// # Errors
    ///
    /// Returns an error if collection fails
    pub fn iterate(&self, root: &str, axis: Axis, opts: &AssembleOptions) -> Result<BlockIter> {
        assemble::iterate(self, root, axis, opts)
    }

    /// One partition per shared row group. See [`assemble::partitioned`].
    ///
    /// # Errors
    ///
    /// Returns an error without the `parallel` feature, or if collection fails
    pub fn partitioned(&self, root: &str, opts: &AssembleOptions) -> Result<Partitioned> {
        assemble::partitioned(self, root, opts)
    }

    /// Split `table` into row and column groups under `root`. See [`divide::divide`].
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options or any codec or storage failure
    pub fn divide(&self, table: &RecordBatch, root: &str, opts: &DivideOptions) -> Result<Vec<String>> {
        divide::divide(self, table, root, opts)
    }

    /// Write `table` to the single file `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the copy fails
    pub fn place(&self, table: &RecordBatch, dest: &str, args: &FormatArgs) -> Result<()> {
        divide::place(self, table, dest, args)
    }

    /// Store any serializable value at `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn pickle<T: Serialize + ?Sized>(&self, value: &T, dest: &str) -> Result<()> {
        blob::pickle(self.storage(), value, dest)
    }

    /// Load a value stored with [`pickle`](Self::pickle).
    ///
    /// # Errors
    ///
    /// Returns an error if the read or deserialization fails
    pub fn unpickle<T: DeserializeOwned>(&self, src: &str) -> Result<T> {
        blob::unpickle(self.storage(), src)
    }
}
