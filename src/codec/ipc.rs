//! Arrow IPC file format (`.arrow`, `.ipc`, `.feather`). Always compiled in.

use super::{Compression, TableCodec, concat_all, ensure_parent};
use crate::options::FormatArgs;
use anyhow::{Context, Result};
use arrow::array::RecordBatch;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct IpcCodec;

impl TableCodec for IpcCodec {
    fn name(&self) -> &'static str {
        "arrow-ipc"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".arrow", ".ipc", ".feather"]
    }

    fn read(
        &self,
        path: &Path,
        _compression: Option<Compression>,
        _args: &FormatArgs,
    ) -> Result<RecordBatch> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let reader = FileReader::try_new(BufReader::new(file), None)
            .with_context(|| format!("read IPC footer of {}", path.display()))?;
        let schema = reader.schema();
        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("decode IPC batches of {}", path.display()))?;
        concat_all(&schema, &batches)
    }

    fn write(
        &self,
        batch: &RecordBatch,
        path: &Path,
        _compression: Option<Compression>,
        _args: &FormatArgs,
    ) -> Result<()> {
        ensure_parent(path)?;
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut writer = FileWriter::try_new(BufWriter::new(file), &batch.schema())
            .with_context(|| format!("open IPC writer for {}", path.display()))?;
        writer
            .write(batch)
            .with_context(|| format!("write IPC batch to {}", path.display()))?;
        writer
            .finish()
            .with_context(|| format!("finalize {}", path.display()))?;
        Ok(())
    }
}
