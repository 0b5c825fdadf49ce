//! Table codecs: decode and encode a [`RecordBatch`] by file extension.
//!
//! Dispatch works on the file extension left after stripping a compression suffix,
//! so `part.0.csv.gz` is read by the CSV codec through gzip. The suffix is only
//! stripped when a codec claims the extension beneath it. Built-in codecs:
//!
//! | Extensions                    | Codec       | Feature      |
//! |-------------------------------|-------------|--------------|
//! | `.csv`                        | [`CsvCodec`]     | `io-csv`     |
//! | `.pq`, `.parquet`             | [`ParquetCodec`] | `io-parquet` |
//! | `.json`, `.jsonl`             | [`JsonlCodec`]   | `io-jsonl`   |
//! | `.arrow`, `.ipc`, `.feather`  | [`IpcCodec`]     | always       |
//!
//! A [`CodecRegistry`] is a plain value owned by [`Blocks`](crate::Blocks); there is
//! no process-wide table. Codecs registered with [`CodecRegistry::register`] are
//! consulted before the built-ins.

pub mod compression;
#[cfg(feature = "io-csv")]
pub mod csv;
pub mod ipc;
#[cfg(feature = "io-jsonl")]
pub mod jsonl;
#[cfg(feature = "io-parquet")]
pub mod parquet;

pub use compression::Compression;
#[cfg(feature = "io-csv")]
pub use csv::CsvCodec;
pub use ipc::IpcCodec;
#[cfg(feature = "io-jsonl")]
pub use jsonl::JsonlCodec;
#[cfg(feature = "io-parquet")]
pub use parquet::ParquetCodec;

use crate::error::{BlocksError, Result};
use crate::options::FormatArgs;
use crate::path;
use anyhow::Context;
use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// One file encoding.
///
/// Implementations work on local files only; staging remote files is the caller's
/// job. `compression` is `Some` only for codecs that report
/// [`supports_compression`](Self::supports_compression).
pub trait TableCodec: Send + Sync {
    /// Short name used in error messages.
    fn name(&self) -> &'static str;

    /// Lowercase extensions with their leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether the codec can be wrapped in stream compression.
    fn supports_compression(&self) -> bool {
        false
    }

    /// Decode a whole file into one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or decoded
    fn read(
        &self,
        path: &Path,
        compression: Option<Compression>,
        args: &FormatArgs,
    ) -> anyhow::Result<RecordBatch>;

    /// Encode `batch` into a file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be encoded or written
    fn write(
        &self,
        batch: &RecordBatch,
        path: &Path,
        compression: Option<Compression>,
        args: &FormatArgs,
    ) -> anyhow::Result<()>;
}

/// Extensions of built-in codecs and the feature that provides them.
const KNOWN: &[(&str, &str)] = &[
    (".csv", "io-csv"),
    (".pq", "io-parquet"),
    (".parquet", "io-parquet"),
    (".json", "io-jsonl"),
    (".jsonl", "io-jsonl"),
];

/// Codec dispatch table keyed by extension.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn TableCodec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut codecs: Vec<Arc<dyn TableCodec>> = Vec::new();
        #[cfg(feature = "io-csv")]
        codecs.push(Arc::new(CsvCodec));
        #[cfg(feature = "io-parquet")]
        codecs.push(Arc::new(ParquetCodec));
        #[cfg(feature = "io-jsonl")]
        codecs.push(Arc::new(JsonlCodec));
        codecs.push(Arc::new(IpcCodec));
        Self { codecs }
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.name()))
            .finish()
    }
}

impl CodecRegistry {
    /// Registry with no codecs at all.
    #[must_use]
    pub const fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Add a codec; it takes precedence over every codec registered before it.
    pub fn register(&mut self, codec: Arc<dyn TableCodec>) {
        self.codecs.insert(0, codec);
    }

    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn TableCodec>) -> Self {
        self.register(codec);
        self
    }

    /// Whether some codec, registered or compiled out, claims `ext`.
    fn knows(&self, ext: &str) -> bool {
        self.codecs.iter().any(|c| c.extensions().contains(&ext))
            || KNOWN.iter().any(|(known, _)| *known == ext)
    }

    /// Split `path` into its codec extension and optional compression.
    ///
    /// A compression suffix only counts when the extension under it belongs to a
    /// codec: `a.csv.gz` is gzip-compressed CSV, while `part.0.gz` and `a.gz` are
    /// looked up as `.gz`.
    #[must_use]
    pub fn dispatch_key(&self, path: &str) -> Option<(String, Option<Compression>)> {
        let path = path.trim_end_matches('/');
        let ext = path::extension(path)?.to_ascii_lowercase();
        if let Some(compression) = Compression::from_suffix(&ext) {
            let inner = &path[..path.len() - ext.len()];
            if let Some(inner_ext) = path::extension(inner).map(str::to_ascii_lowercase) {
                if self.knows(&inner_ext) {
                    return Some((inner_ext, Some(compression)));
                }
            }
        }
        Some((ext, None))
    }

    /// Codec and compression for `path`.
    ///
    /// # Errors
    ///
    /// - [`BlocksError::UnsupportedFormat`] when no codec handles the extension
    /// - [`BlocksError::MissingDependency`] when the codec or compression is compiled out
    /// - [`BlocksError::InvalidArgument`] when a binary format carries a compression suffix
    pub fn resolve(&self, path: &str) -> Result<(Arc<dyn TableCodec>, Option<Compression>)> {
        let (ext, compression) = self.dispatch_key(path).ok_or_else(|| BlocksError::UnsupportedFormat {
            path: path.to_string(),
            extension: String::new(),
        })?;

        let Some(codec) = self
            .codecs
            .iter()
            .find(|c| c.extensions().contains(&ext.as_str()))
        else {
            if let Some((_, feature)) = KNOWN.iter().find(|(known, _)| *known == ext) {
                return Err(BlocksError::MissingDependency {
                    what: format!("reading and writing {ext} files"),
                    feature,
                });
            }
            return Err(BlocksError::UnsupportedFormat {
                path: path.to_string(),
                extension: ext,
            });
        };

        if let Some(compression) = compression {
            if !codec.supports_compression() {
                return Err(BlocksError::invalid(format!(
                    "{} files cannot be {}-compressed: {path}",
                    codec.name(),
                    compression.name()
                )));
            }
            if !compression.is_available() {
                return Err(BlocksError::MissingDependency {
                    what: format!("{} compression", compression.name()),
                    feature: compression.feature(),
                });
            }
        }
        Ok((Arc::clone(codec), compression))
    }

    /// Read a local file, keeping only `args.columns` when set.
    ///
    /// # Errors
    ///
    /// Returns an error if dispatch fails, the codec fails, or a requested column
    /// is missing
    pub fn read_table(&self, path: &str, args: &FormatArgs) -> Result<RecordBatch> {
        let (codec, compression) = self.resolve(path)?;
        let batch = codec
            .read(Path::new(path), compression, args)
            .map_err(|source| BlocksError::Codec {
                codec: codec.name().to_string(),
                path: path.to_string(),
                source: source.into(),
            })?;
        match &args.columns {
            Some(columns) => select_columns(&batch, columns, path),
            None => Ok(batch),
        }
    }

    /// Write `batch` to a local file.
    ///
    /// # Errors
    ///
    /// Returns an error if dispatch or encoding fails
    pub fn write_table(&self, batch: &RecordBatch, path: &str, args: &FormatArgs) -> Result<()> {
        let (codec, compression) = self.resolve(path)?;
        codec
            .write(batch, Path::new(path), compression, args)
            .map_err(|source| BlocksError::Codec {
                codec: codec.name().to_string(),
                path: path.to_string(),
                source: source.into(),
            })
    }
}

/// Project `batch` onto `columns`, in that order.
///
/// # Errors
///
/// Returns [`BlocksError::InvalidArgument`] naming the first missing column
pub fn select_columns(batch: &RecordBatch, columns: &[String], path: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let indices = columns
        .iter()
        .map(|name| {
            schema.index_of(name).map_err(|_| {
                BlocksError::invalid(format!("column {name:?} not found in {path}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(batch.project(&indices)?)
}

// ============================================================================
// Helpers shared by the built-in codecs
// ============================================================================

/// Whole file contents, decompressed when `compression` is set.
#[cfg(any(feature = "io-csv", feature = "io-jsonl"))]
pub(crate) fn read_source(path: &Path, compression: Option<Compression>) -> anyhow::Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("open {}", path.display()))?;
    match compression {
        Some(c) => c
            .decompress(&raw)
            .with_context(|| format!("{} decompress {}", c.name(), path.display())),
        None => Ok(raw),
    }
}

/// Write encoded bytes, compressing them first when `compression` is set.
#[cfg(any(feature = "io-csv", feature = "io-jsonl"))]
pub(crate) fn write_sink(
    path: &Path,
    compression: Option<Compression>,
    data: &[u8],
) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let bytes = match compression {
        Some(c) => c
            .compress(data)
            .with_context(|| format!("{} compress {}", c.name(), path.display()))?,
        None => data.to_vec(),
    };
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

/// Create the parent directory of `path` if it has one.
pub(crate) fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    Ok(())
}

/// Same field names, every type replaced by nullable Utf8.
#[cfg(any(feature = "io-csv", feature = "io-jsonl"))]
pub(crate) fn utf8_schema(schema: &Schema) -> Schema {
    Schema::new(
        schema
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    )
}

/// One batch from many; an empty file still yields a zero-row batch.
pub(crate) fn concat_all(schema: &SchemaRef, batches: &[RecordBatch]) -> anyhow::Result<RecordBatch> {
    concat_batches(schema, batches).context("concatenate decoded batches")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_strips_compression_suffix() {
        let codecs = CodecRegistry::default();
        assert_eq!(codecs.dispatch_key("a/b/part.0.csv"), Some((".csv".into(), None)));
        assert_eq!(
            codecs.dispatch_key("a/b/part.0.CSV.GZ"),
            Some((".csv".into(), Some(Compression::Gzip)))
        );
        assert_eq!(codecs.dispatch_key("a/b/archive.gz"), Some((".gz".into(), None)));
        assert_eq!(codecs.dispatch_key("a/b/part.0.gz"), Some((".gz".into(), None)));
        assert_eq!(codecs.dispatch_key("a/b/part.0.tsv.zst"), Some((".zst".into(), None)));
        assert_eq!(codecs.dispatch_key("a/b/dir"), None);
    }

    #[test]
    fn compiled_out_codecs_still_claim_their_suffix() {
        assert_eq!(
            CodecRegistry::empty().dispatch_key("a/part.0.jsonl.xz"),
            Some((".jsonl".into(), Some(Compression::Xz)))
        );
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let codecs = CodecRegistry::default();
        for (path, ext) in [("/d/c0/part.0.xlsx", ".xlsx"), ("/d/c0/part.0.gz", ".gz")] {
            assert!(
                matches!(
                    codecs.resolve(path).err(),
                    Some(BlocksError::UnsupportedFormat { ref extension, .. }) if extension == ext
                ),
                "{path}"
            );
        }
    }

    #[test]
    fn disabled_codec_is_missing_dependency() {
        assert!(matches!(
            CodecRegistry::empty().resolve("/d/c0/part.0.csv").err(),
            Some(BlocksError::MissingDependency { feature: "io-csv", .. })
        ));
    }

    #[test]
    fn binary_formats_reject_compression() {
        assert!(matches!(
            CodecRegistry::default().resolve("/d/c0/part.0.arrow.gz").err(),
            Some(BlocksError::InvalidArgument(_))
        ));
    }

    struct Fixed;

    impl TableCodec for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &[".arrow"]
        }

        fn read(
            &self,
            _path: &Path,
            _compression: Option<Compression>,
            _args: &FormatArgs,
        ) -> anyhow::Result<RecordBatch> {
            anyhow::bail!("fixed codec cannot read")
        }

        fn write(
            &self,
            _batch: &RecordBatch,
            _path: &Path,
            _compression: Option<Compression>,
            _args: &FormatArgs,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn registered_codecs_take_precedence() {
        let registry = CodecRegistry::default().with_codec(Arc::new(Fixed));
        let err = registry
            .read_table("/nowhere/part.0.arrow", &FormatArgs::default())
            .unwrap_err();
        match err {
            BlocksError::Codec { codec, path, .. } => {
                assert_eq!(codec, "fixed");
                assert_eq!(path, "/nowhere/part.0.arrow");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
