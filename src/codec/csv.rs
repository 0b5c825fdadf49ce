//! CSV via `arrow::csv`, with schema inference over the whole file.
//!
//! The file is decompressed into memory once, inferred, then decoded from the same
//! buffer. `all_utf8` keeps the inferred column names but reads every value as a
//! string, which is how a column group with mixed or zero-padded identifiers is
//! loaded without losing formatting.

use super::{Compression, TableCodec, concat_all, read_source, utf8_schema, write_sink};
use crate::options::FormatArgs;
use anyhow::{Context, Result};
use arrow::array::RecordBatch;
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCodec;

fn format(args: &FormatArgs) -> Format {
    Format::default()
        .with_header(args.has_header.unwrap_or(true))
        .with_delimiter(args.delimiter.unwrap_or(b','))
}

impl TableCodec for CsvCodec {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".csv"]
    }

    fn supports_compression(&self) -> bool {
        true
    }

    fn read(
        &self,
        path: &Path,
        compression: Option<Compression>,
        args: &FormatArgs,
    ) -> Result<RecordBatch> {
        let data = read_source(path, compression)?;
        let format = format(args);
        let (inferred, _) = format
            .infer_schema(Cursor::new(&data), None)
            .with_context(|| format!("infer CSV schema of {}", path.display()))?;
        let schema = Arc::new(if args.all_utf8.unwrap_or(false) {
            utf8_schema(&inferred)
        } else {
            inferred
        });

        let reader = ReaderBuilder::new(Arc::clone(&schema))
            .with_format(format)
            .with_batch_size(args.batch_size_or_default())
            .build(Cursor::new(data))
            .with_context(|| format!("open CSV reader for {}", path.display()))?;
        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("parse CSV records in {}", path.display()))?;
        concat_all(&schema, &batches)
    }

    fn write(
        &self,
        batch: &RecordBatch,
        path: &Path,
        compression: Option<Compression>,
        args: &FormatArgs,
    ) -> Result<()> {
        let mut buf = Vec::new();
        {
            let mut writer = WriterBuilder::new()
                .with_header(args.has_header.unwrap_or(true))
                .with_delimiter(args.delimiter.unwrap_or(b','))
                .build(&mut buf);
            writer
                .write(batch)
                .with_context(|| format!("serialize CSV rows for {}", path.display()))?;
        }
        write_sink(path, compression, &buf)
    }
}
