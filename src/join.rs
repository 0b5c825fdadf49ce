//! Combining tables: row-wise concatenation within a column group and relational
//! joins across column groups.
//!
//! Joins match rows on every column name the two operands share. Keys are encoded
//! with [`RowConverter`] so composite and mixed-type keys hash the same way, and the
//! right operand's key columns are cast to the left operand's types first.
//!
//! Row order of a join:
//!
//! - inner, left: left operand order, each left row repeated once per match
//! - right: right operand order
//! - outer: ascending key order over the union of both sides' keys, null keys
//!   last; rows with equal keys keep left rows first, each side in its own order

use crate::error::{BlocksError, Result};
use crate::options::JoinMode;
use arrow::array::{
    Array, ArrayRef, RecordBatch, RecordBatchOptions, UInt64Array, new_null_array,
};
use arrow::compute::{SortOptions, cast, concat, concat_batches, take};
use arrow::datatypes::{Field, FieldRef, Schema, SchemaRef};
use arrow::row::{RowConverter, SortField};
use std::collections::HashMap;
use std::sync::Arc;

/// Concatenate tables row-wise, in order.
///
/// The result carries the union of all columns in first-seen order. A table without
/// some column contributes nulls for it. Each column takes the type it has in the
/// first table holding rows for it (the first table naming it otherwise), and other
/// tables' values are cast to that type. Tables with no columns, such as an empty
/// JSON Lines file, only contribute their rows.
///
/// # Errors
///
/// Returns [`BlocksError::InvalidArgument`] for an empty input, or an Arrow error if
/// a cast fails
pub fn concat_tables(tables: &[RecordBatch]) -> Result<RecordBatch> {
    let Some(first) = tables.first() else {
        return Err(BlocksError::invalid("cannot concatenate zero tables"));
    };
    if tables.len() == 1 {
        return Ok(first.clone());
    }
    let schema = union_schema(tables);
    let aligned = tables
        .iter()
        .map(|t| align(t, &schema))
        .collect::<Result<Vec<_>>>()?;
    Ok(concat_batches(&schema, &aligned)?)
}

/// Union of the tables' fields in first-seen order.
///
/// A field is nullable when it is nullable anywhere, holds nulls anywhere, is
/// absent from a table that has rows, or needs a cast somewhere.
fn union_schema(tables: &[RecordBatch]) -> SchemaRef {
    let mut names: Vec<String> = Vec::new();
    for table in tables {
        for field in table.schema().fields() {
            if !names.contains(field.name()) {
                names.push(field.name().clone());
            }
        }
    }

    let fields: Vec<FieldRef> = names
        .iter()
        .filter_map(|name| {
            let holders: Vec<(&RecordBatch, FieldRef)> = tables
                .iter()
                .filter_map(|t| {
                    let schema = t.schema();
                    let field = schema.field_with_name(name).ok()?.clone();
                    Some((t, Arc::new(field)))
                })
                .collect();
            let (_, typed) = holders
                .iter()
                .find(|(t, _)| t.num_rows() > 0)
                .or_else(|| holders.first())?;
            let retyped = holders
                .iter()
                .any(|(_, f)| f.data_type() != typed.data_type());
            let nullable = retyped || tables.iter().any(|t| {
                let schema = t.schema();
                match schema.field_with_name(name) {
                    Ok(f) => {
                        f.is_nullable()
                            || t.column_by_name(name).is_some_and(|c| c.null_count() > 0)
                    }
                    Err(_) => t.num_rows() > 0,
                }
            });
            Some(Arc::new(Field::clone(typed).with_nullable(nullable)))
        })
        .collect();
    Arc::new(Schema::new_with_metadata(fields, first_metadata(tables)))
}

fn first_metadata(tables: &[RecordBatch]) -> HashMap<String, String> {
    tables
        .first()
        .map(|t| t.schema().metadata().clone())
        .unwrap_or_default()
}

fn align(table: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    if table.schema() == *schema {
        return Ok(table.clone());
    }
    let rows = table.num_rows();
    let columns = schema
        .fields()
        .iter()
        .map(|field| match table.column_by_name(field.name()) {
            None => Ok(new_null_array(field.data_type(), rows)),
            Some(column) if column.data_type() == field.data_type() => Ok(Arc::clone(column)),
            Some(column) => Ok(cast(column, field.data_type())?),
        })
        .collect::<Result<Vec<_>>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(schema),
        columns,
        &options,
    )?)
}

/// Ascending with nulls last, the order outer joins sort their keys in.
const KEY_ORDER: SortOptions = SortOptions {
    descending: false,
    nulls_first: false,
};

/// Pairs of (left row, right row); `None` marks the missing side of an outer match.
type Matches = Vec<(Option<u64>, Option<u64>)>;

fn match_rows(
    left_keys: &[ArrayRef],
    right_keys: &[ArrayRef],
    mode: JoinMode,
) -> Result<Matches> {
    let converter = RowConverter::new(
        left_keys
            .iter()
            .map(|k| SortField::new_with_options(k.data_type().clone(), KEY_ORDER))
            .collect(),
    )?;
    let left_rows = converter.convert_columns(left_keys)?;
    let right_rows = converter.convert_columns(right_keys)?;
    let mut out = Matches::new();

    if mode == JoinMode::Right {
        let mut index: HashMap<_, Vec<u64>> = HashMap::new();
        for (l, row) in left_rows.iter().enumerate() {
            index.entry(row).or_default().push(l as u64);
        }
        for (r, row) in right_rows.iter().enumerate() {
            match index.get(&row) {
                Some(hits) => out.extend(hits.iter().map(|&l| (Some(l), Some(r as u64)))),
                None => out.push((None, Some(r as u64))),
            }
        }
        return Ok(out);
    }

    let mut index: HashMap<_, Vec<u64>> = HashMap::new();
    for (r, row) in right_rows.iter().enumerate() {
        index.entry(row).or_default().push(r as u64);
    }
    let mut matched = vec![false; right_rows.num_rows()];
    for (l, row) in left_rows.iter().enumerate() {
        match index.get(&row) {
            Some(hits) => {
                for &r in hits {
                    matched[r as usize] = true;
                    out.push((Some(l as u64), Some(r)));
                }
            }
            None if mode != JoinMode::Inner => out.push((Some(l as u64), None)),
            None => {}
        }
    }
    if mode == JoinMode::Outer {
        out.extend(
            matched
                .iter()
                .enumerate()
                .filter(|(_, hit)| !**hit)
                .map(|(r, _)| (None, Some(r as u64))),
        );
        let key = |&(l, r): &(Option<u64>, Option<u64>)| match l {
            Some(l) => left_rows.row(l as usize),
            None => right_rows.row(r.unwrap_or_default() as usize),
        };
        out.sort_by(|a, b| key(a).cmp(&key(b)));
    }
    Ok(out)
}

/// Join two tables on all shared column names.
///
/// The result holds the left operand's columns in order (shared key columns taken
/// from whichever side matched) followed by the right operand's remaining columns.
///
/// # Errors
///
/// Returns [`BlocksError::InvalidArgument`] when the tables share no column, or an
/// Arrow error when a key column can't be cast to the left operand's type
pub fn join_pair(left: &RecordBatch, right: &RecordBatch, mode: JoinMode) -> Result<RecordBatch> {
    let left_schema = left.schema();
    let right_schema = right.schema();
    let shared: Vec<&str> = left_schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .filter(|name| right_schema.index_of(name).is_ok())
        .collect();
    if shared.is_empty() {
        return Err(BlocksError::invalid(
            "cannot join tables without a shared column",
        ));
    }

    let mut left_keys = Vec::with_capacity(shared.len());
    let mut right_keys = Vec::with_capacity(shared.len());
    for name in &shared {
        let l = Arc::clone(left.column(left_schema.index_of(name)?));
        let r = right.column(right_schema.index_of(name)?);
        right_keys.push(if r.data_type() == l.data_type() {
            Arc::clone(r)
        } else {
            cast(r, l.data_type())?
        });
        left_keys.push(l);
    }

    let matches = match_rows(&left_keys, &right_keys, mode)?;
    let left_len = left.num_rows() as u64;
    let left_idx: UInt64Array = matches.iter().map(|(l, _)| *l).collect();
    let right_idx: UInt64Array = matches.iter().map(|(_, r)| *r).collect();
    let key_idx: UInt64Array = matches
        .iter()
        .map(|(l, r)| l.or_else(|| r.map(|r| left_len + r)))
        .collect();

    let nullable = mode != JoinMode::Inner;
    let field = |f: &FieldRef| -> FieldRef {
        if nullable && !f.is_nullable() {
            Arc::new(Field::clone(f).with_nullable(true))
        } else {
            Arc::clone(f)
        }
    };

    let mut fields = Vec::with_capacity(left.num_columns() + right.num_columns());
    let mut columns = Vec::with_capacity(fields.capacity());
    for (i, f) in left_schema.fields().iter().enumerate() {
        let column = match shared.iter().position(|s| *s == f.name().as_str()) {
            Some(k) => {
                let both = concat(&[left_keys[k].as_ref(), right_keys[k].as_ref()])?;
                take(both.as_ref(), &key_idx, None)?
            }
            None => take(left.column(i).as_ref(), &left_idx, None)?,
        };
        fields.push(field(f));
        columns.push(column);
    }
    for (i, f) in right_schema.fields().iter().enumerate() {
        if shared.contains(&f.name().as_str()) {
            continue;
        }
        fields.push(field(f));
        columns.push(take(right.column(i).as_ref(), &right_idx, None)?);
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Display name of a column group; the implicit root group has no name.
fn label(cgroup: Option<&str>) -> &str {
    cgroup.unwrap_or("<root>")
}

/// Reduce per-column-group tables left to right with [`join_pair`].
///
/// Operands with different row counts are reported with a warning naming both sides,
/// or rejected with [`BlocksError::ShapeMismatch`] when `strict` is set.
///
/// # Errors
///
/// Returns an error for an empty input, a strict shape mismatch, or a failed join
pub fn merge_all(
    tables: Vec<(Option<String>, RecordBatch)>,
    mode: JoinMode,
    strict: bool,
) -> Result<RecordBatch> {
    let mut tables = tables.into_iter();
    let Some((first_name, mut merged)) = tables.next() else {
        return Err(BlocksError::invalid("nothing to merge: no column groups"));
    };
    let mut left_name = label(first_name.as_deref()).to_string();

    for (name, table) in tables {
        let right_name = label(name.as_deref());
        let (left_rows, right_rows) = (merged.num_rows(), table.num_rows());
        if left_rows != right_rows {
            if strict {
                return Err(BlocksError::ShapeMismatch {
                    left: left_name,
                    right: right_name.to_string(),
                    left_rows,
                    right_rows,
                });
            }
            log::warn!(
                "Column groups {left_name} ({left_rows} rows) and {right_name} ({right_rows} rows) have a different number of rows, joining anyway ({mode})"
            );
        }
        merged = join_pair(&merged, &table, mode)?;
        left_name = format!("{left_name}+{right_name}");
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};

    fn batch(key: &[&str], name: &str, values: &[f64]) -> anyhow::Result<RecordBatch> {
        Ok(RecordBatch::try_from_iter([
            ("key", Arc::new(StringArray::from(key.to_vec())) as ArrayRef),
            (name, Arc::new(Float64Array::from(values.to_vec())) as ArrayRef),
        ])?)
    }

    fn keys(table: &RecordBatch) -> Vec<Option<String>> {
        table
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.iter().map(|v| v.map(str::to_string)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn concat_casts_to_first_schema() -> anyhow::Result<()> {
        let a = RecordBatch::try_from_iter([(
            "n",
            Arc::new(Float64Array::from(vec![0.5])) as ArrayRef,
        )])?;
        let b = RecordBatch::try_from_iter([("n", Arc::new(Int64Array::from(vec![2])) as ArrayRef)])?;
        let out = concat_tables(&[a, b])?;
        assert_eq!(out.num_rows(), 2);
        let n = out
            .column(0)
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.values().to_vec());
        assert_eq!(n, Some(vec![0.5, 2.0]));
        assert!(concat_tables(&[]).is_err());
        Ok(())
    }

    #[test]
    fn concat_fills_columns_missing_from_either_side() -> anyhow::Result<()> {
        let narrow = batch(&["a"], "x", &[1.0])?;
        let wide = RecordBatch::try_from_iter([
            ("key", Arc::new(StringArray::from(vec!["b"])) as ArrayRef),
            ("x", Arc::new(Float64Array::from(vec![2.0])) as ArrayRef),
            ("y", Arc::new(Int64Array::from(vec![7])) as ArrayRef),
        ])?;

        for (tables, y) in [
            (vec![narrow.clone(), wide.clone()], vec![None, Some(7)]),
            (vec![wide, narrow], vec![Some(7), None]),
        ] {
            let out = concat_tables(&tables)?;
            let names: Vec<_> = out.schema().fields().iter().map(|f| f.name().clone()).collect();
            assert_eq!(names, ["key", "x", "y"]);
            assert_eq!(out.num_rows(), 2);
            let got = out
                .column(2)
                .as_any()
                .downcast_ref::<Int64Array>()
                .map(|a| a.iter().collect::<Vec<_>>());
            assert_eq!(got, Some(y));
        }
        Ok(())
    }

    #[test]
    fn empty_tables_do_not_decide_column_types() -> anyhow::Result<()> {
        let empty = RecordBatch::try_from_iter([(
            "n",
            Arc::new(StringArray::from(Vec::<&str>::new())) as ArrayRef,
        )])?;
        let no_columns = RecordBatch::new_empty(Arc::new(Schema::empty()));
        let full = RecordBatch::try_from_iter([("n", Arc::new(Int64Array::from(vec![4, 5])) as ArrayRef)])?;

        let out = concat_tables(&[empty, no_columns, full])?;
        assert_eq!(out.num_rows(), 2);
        let n = out
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .map(|a| a.values().to_vec());
        assert_eq!(n, Some(vec![4, 5]));
        Ok(())
    }

    #[test]
    fn join_modes_follow_documented_order() -> anyhow::Result<()> {
        let left = batch(&["a", "b", "c"], "x", &[1.0, 2.0, 3.0])?;
        let right = batch(&["d", "c", "a"], "y", &[4.0, 5.0, 6.0])?;
        let some = |v: &[&str]| v.iter().map(|s| Some((*s).to_string())).collect::<Vec<_>>();

        let inner = join_pair(&left, &right, JoinMode::Inner)?;
        assert_eq!(keys(&inner), some(&["a", "c"]));
        assert_eq!(inner.schema().fields().len(), 3);

        let left_join = join_pair(&left, &right, JoinMode::Left)?;
        assert_eq!(keys(&left_join), some(&["a", "b", "c"]));
        assert_eq!(left_join.column(2).null_count(), 1);

        let right_join = join_pair(&left, &right, JoinMode::Right)?;
        assert_eq!(keys(&right_join), some(&["d", "c", "a"]));
        assert_eq!(right_join.column(1).null_count(), 1);

        let outer = join_pair(&left, &right, JoinMode::Outer)?;
        assert_eq!(keys(&outer), some(&["a", "b", "c", "d"]));
        Ok(())
    }

    #[test]
    fn outer_join_sorts_the_key_union() -> anyhow::Result<()> {
        let left = RecordBatch::try_from_iter([
            ("key", Arc::new(StringArray::from(vec![Some("c"), None, Some("a")])) as ArrayRef),
            ("x", Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0])) as ArrayRef),
        ])?;
        let right = batch(&["b", "c", "c"], "y", &[4.0, 5.0, 6.0])?;

        let outer = join_pair(&left, &right, JoinMode::Outer)?;
        let expected = vec![Some("a"), Some("b"), Some("c"), Some("c"), None]
            .into_iter()
            .map(|k| k.map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(keys(&outer), expected);
        let y = outer
            .column(2)
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.iter().collect::<Vec<_>>());
        assert_eq!(y, Some(vec![None, Some(4.0), Some(5.0), Some(6.0), None]));
        Ok(())
    }

    #[test]
    fn tables_without_shared_columns_cannot_join() -> anyhow::Result<()> {
        let left = batch(&["a"], "x", &[1.0])?;
        let right = RecordBatch::try_from_iter([(
            "other",
            Arc::new(Int64Array::from(vec![1])) as ArrayRef,
        )])?;
        assert!(matches!(
            join_pair(&left, &right, JoinMode::Inner),
            Err(BlocksError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn shape_mismatch_warns_unless_strict() -> anyhow::Result<()> {
        let tables = || -> anyhow::Result<Vec<(Option<String>, RecordBatch)>> {
            Ok(vec![
                (Some("c0".into()), batch(&["a", "b"], "x", &[1.0, 2.0])?),
                (Some("c1".into()), batch(&["a"], "y", &[3.0])?),
            ])
        };
        let merged = merge_all(tables()?, JoinMode::Inner, false)?;
        assert_eq!(merged.num_rows(), 1);

        match merge_all(tables()?, JoinMode::Inner, true) {
            Err(BlocksError::ShapeMismatch {
                left,
                right,
                left_rows,
                right_rows,
            }) => {
                assert_eq!((left.as_str(), right.as_str()), ("c0", "c1"));
                assert_eq!((left_rows, right_rows), (2, 1));
            }
            other => panic!("expected a shape mismatch, got {other:?}"),
        }
        Ok(())
    }
}
