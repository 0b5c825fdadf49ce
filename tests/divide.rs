use anyhow::Result;
use arrow::array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::DataType;
use ironblocks::testing::{TreeSpec, assert_same_columns};
use ironblocks::{AssembleOptions, Blocks, BlocksError, DivideOptions, FormatArgs};
use std::sync::Arc;
use tempfile::TempDir;

fn scratch() -> Result<(TempDir, String)> {
    let dir = TempDir::new()?;
    let root = dir.path().join("out").to_string_lossy().to_string();
    Ok((dir, root))
}

fn two_groups(opts: DivideOptions) -> DivideOptions {
    opts.with_column_group("c0", ["key", "f0_0", "f0_1", "f0_2"])
        .with_column_group("c1", ["key", "f1_0", "f1_1"])
}

#[test]
fn divide_then_assemble_roundtrips_in_every_format() -> Result<()> {
    let spec = TreeSpec::default();
    let table = spec.wide()?;
    let blocks = Blocks::new();

    for ext in [".pq", ".csv", ".jsonl", ".arrow", "csv.gz"] {
        let (_dir, root) = scratch()?;
        let opts = DivideOptions::new().with_row_groups(3).with_extension(ext);
        blocks.divide(&table, &root, &opts)?;
        let back = blocks.assemble(&root, &AssembleOptions::new())?;
        assert_same_columns(&back, &table);
    }
    Ok(())
}

#[test]
fn more_shards_than_rows_roundtrip_in_every_format() -> Result<()> {
    let table = TreeSpec::default().wide()?.slice(0, 3);
    let blocks = Blocks::new();

    for ext in [".pq", ".csv", ".jsonl", ".arrow", ".csv.gz", ".jsonl.zst"] {
        let (_dir, root) = scratch()?;
        let opts = DivideOptions::new().with_row_groups(5).with_extension(ext);
        let written = blocks.divide(&table, &root, &opts)?;
        assert_eq!(written.len(), 5, "{ext}");
        let back = blocks.assemble(&root, &AssembleOptions::new())?;
        assert_same_columns(&back, &table);
    }
    Ok(())
}

#[test]
fn column_groups_roundtrip_through_a_join() -> Result<()> {
    let table = TreeSpec::default().wide()?;
    let blocks = Blocks::new();
    let (_dir, root) = scratch()?;

    let written = blocks.divide(&table, &root, &two_groups(DivideOptions::new().with_row_groups(4)))?;
    assert_eq!(written.len(), 8);
    assert_eq!(written[0], format!("{root}/c0/part_00000.pq"));
    assert_eq!(written[7], format!("{root}/c1/part_00003.pq"));
    for path in &written {
        assert!(std::path::Path::new(path).is_file(), "{path} missing");
    }

    let back = blocks.assemble(&root, &AssembleOptions::new())?;
    let expected = table.project(&[0, 1, 2, 3, 11, 12])?;
    assert_same_columns(&back, &expected);
    Ok(())
}

#[test]
fn shards_are_balanced_and_ordered() -> Result<()> {
    let table = TreeSpec {
        rows: 23,
        row_groups: 1,
        ..TreeSpec::default()
    }
    .wide()?;
    let blocks = Blocks::new();
    let (_dir, root) = scratch()?;

    let written = blocks.divide(&table, &root, &DivideOptions::new().with_row_groups(5))?;
    let sizes = written
        .iter()
        .map(|path| Ok(blocks.codecs().read_table(path, &FormatArgs::default())?.num_rows()))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(sizes, vec![5, 5, 5, 4, 4]);

    let back = blocks.assemble(&root, &AssembleOptions::new())?;
    assert_same_columns(&back, &table);
    Ok(())
}

#[test]
fn offset_and_prefix_shape_file_names() -> Result<()> {
    let table = TreeSpec::default().wide()?;
    let blocks = Blocks::new();
    let (_dir, root) = scratch()?;

    let opts = DivideOptions::new()
        .with_row_groups(2)
        .with_offset(10)
        .with_prefix("train")
        .with_extension("csv");
    let written = blocks.divide(&table, &root, &opts)?;
    assert_eq!(
        written,
        vec![
            format!("{root}/train_part_00010.csv"),
            format!("{root}/train_part_00011.csv"),
        ]
    );
    Ok(())
}

#[test]
fn convert_coerces_numeric_strings_only() -> Result<()> {
    let table = RecordBatch::try_from_iter([
        ("id", Arc::new(StringArray::from(vec!["1", "2", "3"])) as ArrayRef),
        ("score", Arc::new(StringArray::from(vec!["0.5", "1", "2.5"])) as ArrayRef),
        ("label", Arc::new(StringArray::from(vec!["a", "b", "3"])) as ArrayRef),
    ])?;
    let blocks = Blocks::new();
    let (_dir, root) = scratch()?;

    blocks.divide(&table, &root, &DivideOptions::new().with_convert(true))?;
    let back = blocks.assemble(&root, &AssembleOptions::new())?;
    let types: Vec<DataType> = back
        .schema()
        .fields()
        .iter()
        .map(|f| f.data_type().clone())
        .collect();
    assert_eq!(types, vec![DataType::Int64, DataType::Float64, DataType::Utf8]);
    Ok(())
}

#[test]
fn invalid_divide_options() -> Result<()> {
    let table = TreeSpec::default().wide()?;
    let blocks = Blocks::new();
    let (_dir, root) = scratch()?;

    let err = blocks
        .divide(&table, &root, &DivideOptions::new().with_row_groups(0))
        .unwrap_err();
    assert!(matches!(err, BlocksError::InvalidArgument(_)));

    let err = blocks
        .divide(&table, &root, &DivideOptions::new().with_extension("."))
        .unwrap_err();
    assert!(matches!(err, BlocksError::InvalidArgument(_)));

    let err = blocks
        .divide(
            &table,
            &root,
            &DivideOptions::new().with_column_group("c0", ["key", "nope"]),
        )
        .unwrap_err();
    assert!(matches!(err, BlocksError::InvalidArgument(ref m) if m.contains("nope")));

    let err = blocks
        .divide(&table, &root, &DivideOptions::new().with_extension(".xlsx"))
        .unwrap_err();
    assert!(matches!(err, BlocksError::UnsupportedFormat { .. }));

    assert!(!std::path::Path::new(&root).exists());
    Ok(())
}

#[test]
fn place_writes_a_single_file() -> Result<()> {
    let table = RecordBatch::try_from_iter([(
        "n",
        Arc::new(Int64Array::from(vec![3, 1, 2])) as ArrayRef,
    )])?;
    let blocks = Blocks::new();
    let (_dir, root) = scratch()?;
    let dest = format!("{root}/nested/table.arrow");

    blocks.place(&table, &dest, &FormatArgs::default())?;
    let back = blocks.codecs().read_table(&dest, &FormatArgs::default())?;
    assert_eq!(back, table);

    let err = blocks
        .place(&table, &format!("{root}/no_extension"), &FormatArgs::default())
        .unwrap_err();
    assert!(matches!(err, BlocksError::InvalidArgument(_)));
    Ok(())
}
