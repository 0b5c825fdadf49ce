//! Parquet via the `parquet` crate's Arrow reader and writer.

use super::{Compression, TableCodec, concat_all, ensure_parent};
use crate::options::{FormatArgs, ParquetCompression};
use anyhow::{Context, Result};
use arrow::array::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression as ColumnCompression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetCodec;

fn column_compression(choice: Option<ParquetCompression>) -> ColumnCompression {
    match choice.unwrap_or(ParquetCompression::Snappy) {
        ParquetCompression::None => ColumnCompression::UNCOMPRESSED,
        ParquetCompression::Snappy => ColumnCompression::SNAPPY,
        ParquetCompression::Gzip => ColumnCompression::GZIP(GzipLevel::default()),
        ParquetCompression::Zstd => ColumnCompression::ZSTD(ZstdLevel::default()),
    }
}

impl TableCodec for ParquetCodec {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".pq", ".parquet"]
    }

    fn read(
        &self,
        path: &Path,
        _compression: Option<Compression>,
        args: &FormatArgs,
    ) -> Result<RecordBatch> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("read parquet metadata of {}", path.display()))?;
        let schema = builder.schema().clone();
        let reader = builder
            .with_batch_size(args.batch_size_or_default())
            .build()
            .with_context(|| format!("open parquet reader for {}", path.display()))?;
        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("decode row groups of {}", path.display()))?;
        concat_all(&schema, &batches)
    }

    fn write(
        &self,
        batch: &RecordBatch,
        path: &Path,
        _compression: Option<Compression>,
        args: &FormatArgs,
    ) -> Result<()> {
        ensure_parent(path)?;
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(column_compression(args.parquet_compression))
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .with_context(|| format!("open parquet writer for {}", path.display()))?;
        writer
            .write(batch)
            .with_context(|| format!("write parquet rows to {}", path.display()))?;
        writer
            .close()
            .with_context(|| format!("finalize {}", path.display()))?;
        Ok(())
    }
}
