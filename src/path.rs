//! Path classification: row groups, column groups, and directory expansion.
//!
//! A block tree encodes two axes in its layout:
//!
//! ```text
//! root/
//!   c0/part.0.csv   <- column group "c0", row group "part.0.csv"
//!   c0/part.1.csv
//!   c1/part.0.csv   <- same row group, different columns
//!   c1/part.1.csv
//! ```
//!
//! The column group of a file is the name of its parent directory, the row group is
//! its base name. Everything here is pure string manipulation except [`expand`],
//! which asks a [`Storage`] to list directory contents.
//!
//! Paths are `/`-separated strings so that local paths and `scheme://bucket/key`
//! URIs are handled the same way.

use crate::storage::{Storage, StorageResult};
use std::collections::BTreeMap;

/// Files bucketed by column group, keyed in ascending name order (`None` first).
pub type ColumnBuckets = BTreeMap<Option<String>, Vec<String>>;

/// Last segment of `path`, ignoring trailing separators.
#[must_use]
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Everything before the last segment of `path`; empty when there is no parent.
#[must_use]
pub fn parent(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit_once('/')
        .map_or("", |(dir, _)| dir)
}

/// Join a directory and a relative name with a single separator.
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!(
        "{}/{}",
        dir.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}

/// The final `.suffix` of the base name, including the dot.
///
/// Leading dots do not start an extension, so `.hidden` has none.
#[must_use]
pub fn extension(path: &str) -> Option<&str> {
    let name = basename(path);
    let stem_start = name.len() - name.trim_start_matches('.').len();
    name[stem_start..]
        .rfind('.')
        .map(|idx| &name[stem_start + idx..])
}

/// True when the base name carries an extension, i.e. the path names a file.
#[must_use]
pub fn has_extension(path: &str) -> bool {
    extension(path).is_some()
}

/// Column group of a file: the base name of its parent directory.
///
/// Returns `None` for a path with no parent directory, which the collector treats
/// as a single implicit column group.
#[must_use]
pub fn column_group_of(path: &str) -> Option<String> {
    let name = basename(parent(path));
    (!name.is_empty()).then(|| name.to_string())
}

/// Row group of a file: its base name.
#[must_use]
pub fn row_group_of(path: &str) -> &str {
    basename(path)
}

/// Expand directories into the files they contain.
///
/// Paths with an extension are kept as they are; any other path is listed
/// recursively with `path/**`. The result only contains paths with an extension,
/// sorted and free of duplicates.
///
/// # Errors
///
/// Returns an error if listing a directory fails
pub fn expand(paths: &[String], storage: &dyn Storage) -> StorageResult<Vec<String>> {
    let mut expanded = Vec::with_capacity(paths.len());
    for path in paths {
        if has_extension(path) {
            expanded.push(path.clone());
        } else {
            expanded.extend(storage.list(&join(path, "**"))?);
        }
    }
    expanded.retain(|p| has_extension(p));
    expanded.sort();
    expanded.dedup();
    Ok(expanded)
}

/// Keep only paths whose column group is in `cgroups` and whose row group is in
/// `rgroups`. A `None` filter accepts everything.
#[must_use]
pub fn filter(paths: &[String], cgroups: Option<&[String]>, rgroups: Option<&[String]>) -> Vec<String> {
    paths
        .iter()
        .filter(|path| {
            cgroups.is_none_or(|wanted| {
                column_group_of(path).is_some_and(|name| wanted.contains(&name))
            })
        })
        .filter(|path| {
            rgroups.is_none_or(|wanted| wanted.iter().any(|r| r == row_group_of(path)))
        })
        .cloned()
        .collect()
}

/// Bucket paths by column group, preserving the input order within each bucket.
#[must_use]
pub fn group_by_column(paths: &[String]) -> ColumnBuckets {
    let mut buckets = ColumnBuckets::new();
    for path in paths {
        buckets
            .entry(column_group_of(path))
            .or_default()
            .push(path.clone());
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn names_from_paths() {
        assert_eq!(basename("/data/c0/part.0.csv"), "part.0.csv");
        assert_eq!(basename("mem://bucket/c0/"), "c0");
        assert_eq!(parent("/data/c0/part.0.csv"), "/data/c0");
        assert_eq!(parent("part.0.csv"), "");
        assert_eq!(join("/data/", "/c0"), "/data/c0");
        assert_eq!(join("", "c0"), "c0");
    }

    #[test]
    fn extension_detection() {
        assert!(has_extension("/data/c0/part.0.csv"));
        assert!(has_extension("part.csv.gz"));
        assert!(!has_extension("/data/c0"));
        assert!(!has_extension("/data/.hidden"));
        assert!(!has_extension("mem://bucket.name/c0"));
        assert_eq!(extension("a/b/part_00001.pq"), Some(".pq"));
        assert_eq!(extension("a/b/part.csv.gz"), Some(".gz"));
    }

    #[test]
    fn group_identity() {
        assert_eq!(column_group_of("/data/c3/part.1.csv").as_deref(), Some("c3"));
        assert_eq!(column_group_of("part.1.csv"), None);
        assert_eq!(row_group_of("mem://b/c3/part.1.csv"), "part.1.csv");
    }

    #[test]
    fn filter_by_both_axes() {
        let all = paths(&[
            "/d/c0/part.0.csv",
            "/d/c0/part.1.csv",
            "/d/c1/part.0.csv",
            "/d/c1/part.1.csv",
        ]);
        let c = vec!["c1".to_string()];
        let r = vec!["part.0.csv".to_string()];

        assert_eq!(filter(&all, None, None), all);
        assert_eq!(
            filter(&all, Some(&c), None),
            paths(&["/d/c1/part.0.csv", "/d/c1/part.1.csv"])
        );
        assert_eq!(
            filter(&all, None, Some(&r)),
            paths(&["/d/c0/part.0.csv", "/d/c1/part.0.csv"])
        );
        assert_eq!(filter(&all, Some(&c), Some(&r)), paths(&["/d/c1/part.0.csv"]));
    }

    #[test]
    fn grouping_is_alphabetic_and_keeps_member_order() {
        let grouped = group_by_column(&paths(&[
            "/d/b/part.1.csv",
            "/d/a/part.0.csv",
            "/d/b/part.0.csv",
            "loose.csv",
        ]));
        let keys: Vec<_> = grouped.keys().cloned().collect();
        assert_eq!(keys, vec![None, Some("a".to_string()), Some("b".to_string())]);
        assert_eq!(
            grouped[&Some("b".to_string())],
            paths(&["/d/b/part.1.csv", "/d/b/part.0.csv"])
        );
    }
}
