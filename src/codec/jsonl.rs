//! JSON Lines via `arrow::json`: one object per line, schema inferred from all lines.
//!
//! Columns come out in the order their keys first appear in the file.

use super::{Compression, TableCodec, concat_all, read_source, utf8_schema, write_sink};
use crate::options::FormatArgs;
use anyhow::{Context, Result};
use arrow::array::RecordBatch;
use arrow::datatypes::{FieldRef, Schema};
use arrow::json::reader::infer_json_schema;
use arrow::json::{LineDelimitedWriter, ReaderBuilder};
use serde_json::{Map, Value};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlCodec;

impl TableCodec for JsonlCodec {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".json", ".jsonl"]
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
        let (inferred, _) = infer_json_schema(Cursor::new(&data), None)
            .with_context(|| format!("infer JSON schema of {}", path.display()))?;
        let inferred = in_key_order(&inferred, &data)
            .with_context(|| format!("scan JSON keys of {}", path.display()))?;
        let all_utf8 = args.all_utf8.unwrap_or(false);
        let schema = Arc::new(if all_utf8 {
            utf8_schema(&inferred)
        } else {
            inferred
        });

        let reader = ReaderBuilder::new(Arc::clone(&schema))
            .with_batch_size(args.batch_size_or_default())
            .with_coerce_primitive(all_utf8)
            .build(Cursor::new(data))
            .with_context(|| format!("open JSON reader for {}", path.display()))?;
        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("parse JSON lines in {}", path.display()))?;
        concat_all(&schema, &batches)
    }

    fn write(
        &self,
        batch: &RecordBatch,
        path: &Path,
        compression: Option<Compression>,
        _args: &FormatArgs,
    ) -> Result<()> {
        let mut buf = Vec::new();
        {
            let mut writer = LineDelimitedWriter::new(&mut buf);
            writer
                .write(batch)
                .with_context(|| format!("serialize JSON lines for {}", path.display()))?;
            writer
                .finish()
                .with_context(|| format!("finish JSON lines for {}", path.display()))?;
        }
        write_sink(path, compression, &buf)
    }
}

/// Reorder `inferred` by first appearance of each key across the objects in `data`.
fn in_key_order(inferred: &Schema, data: &[u8]) -> Result<Schema> {
    let mut order: Vec<String> = Vec::with_capacity(inferred.fields().len());
    for object in serde_json::Deserializer::from_slice(data).into_iter::<Map<String, Value>>() {
        for key in object?.keys() {
            if !order.contains(key) {
                order.push(key.clone());
            }
        }
    }

    let mut fields: Vec<FieldRef> = order
        .iter()
        .filter_map(|name| inferred.field_with_name(name).ok())
        .map(|f| Arc::new(f.clone()))
        .collect();
    fields.extend(
        inferred
            .fields()
            .iter()
            .filter(|f| !order.contains(f.name()))
            .cloned(),
    );
    Ok(Schema::new_with_metadata(fields, inferred.metadata().clone()))
}
