//! Collection: turn a root path into an ordered, locally readable [`Grouping`].
//!
//! Steps, in order:
//!
//! 1. list the root with [`Storage::list`] (nothing listed is [`BlocksError::NotFound`])
//! 2. expand directories into files
//! 3. filter by column group and row group
//! 4. bucket by column group
//! 5. stage every bucket that has a non-local member into a staging subdirectory
//! 6. order buckets by the requested column groups, or alphabetically
//!
//! Staged copies keep their base names, so row-group identity survives staging.

use crate::error::{BlocksError, Result};
use crate::path;
use crate::storage::Storage;
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::TempDir;

/// Ordered mapping from column group to its member files.
///
/// Files within a group are in ascending path order, which for one directory is
/// ascending row-group order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    groups: Vec<(Option<String>, Vec<String>)>,
}

impl Grouping {
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Column groups with their files, in grouping order.
    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &[String])> {
        self.groups
            .iter()
            .map(|(name, files)| (name.as_deref(), files.as_slice()))
    }

    /// Column group names in grouping order; `None` is the implicit root group.
    #[must_use]
    pub fn names(&self) -> Vec<Option<&str>> {
        self.groups.iter().map(|(name, _)| name.as_deref()).collect()
    }

    #[must_use]
    pub fn files(&self, cgroup: Option<&str>) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(name, _)| name.as_deref() == cgroup)
            .map(|(_, files)| files.as_slice())
    }

    /// Row-group names present in every column group, ascending.
    #[must_use]
    pub fn shared_row_groups(&self) -> Vec<String> {
        let mut groups = self.groups.iter().map(|(_, files)| {
            files
                .iter()
                .map(|f| path::row_group_of(f).to_string())
                .collect::<BTreeSet<_>>()
        });
        let Some(first) = groups.next() else {
            return Vec::new();
        };
        groups
            .fold(first, |acc, set| acc.intersection(&set).cloned().collect())
            .into_iter()
            .collect()
    }

    /// The member of `cgroup` whose row group is `rgroup`.
    #[must_use]
    pub fn member(&self, cgroup: Option<&str>, rgroup: &str) -> Option<&str> {
        self.files(cgroup)?
            .iter()
            .find(|f| path::row_group_of(f) == rgroup)
            .map(String::as_str)
    }
}

impl IntoIterator for Grouping {
    type Item = (Option<String>, Vec<String>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

/// Create a fresh staging directory, removed when the returned guard drops.
///
/// # Errors
///
/// Returns [`BlocksError::Io`] if the directory can't be created
pub fn staging_dir(root: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("ironblocks-");
    let dir = match root {
        Some(root) => {
            std::fs::create_dir_all(root).map_err(|e| {
                BlocksError::io(format!("create staging root {}", root.display()), e)
            })?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    };
    dir.map_err(|e| BlocksError::io("create staging directory", e))
}

/// Name of the staging subdirectory for the `index`-th column group.
fn staging_name(index: usize) -> String {
    format!("{index:03}")
}

/// First base name shared by two of `members`.
fn duplicate_name(members: &[String]) -> Option<&str> {
    let mut seen = BTreeSet::new();
    members
        .iter()
        .map(|m| path::basename(m))
        .find(|name| !seen.insert(*name))
}

/// Collect the files under `root` into a [`Grouping`] of locally readable paths.
///
/// `staging` must be a local directory owned by the calling operation; each remote
/// bucket is copied into its own numbered subdirectory of it.
///
/// # Errors
///
/// - [`BlocksError::NotFound`] when `root` lists nothing, when filtering leaves no
///   files, or when a column group named in `cgroups` has no files
/// - [`BlocksError::InvalidArgument`] when a remote column group lists two files
///   with the same base name, which would land on one staged path
/// - [`BlocksError::Connectivity`] when staging fails after the retry budget
/// - [`BlocksError::Storage`] for any other storage failure
pub fn collect(
    root: &str,
    cgroups: Option<&[String]>,
    rgroups: Option<&[String]>,
    storage: &dyn Storage,
    staging: &Path,
) -> Result<Grouping> {
    let listed = storage.list(root)?;
    if listed.is_empty() {
        return Err(BlocksError::not_found(
            root,
            format!("no files found matching {root}"),
        ));
    }

    let files = path::expand(&listed, storage)?;
    let files = path::filter(&files, cgroups, rgroups);
    if files.is_empty() {
        return Err(BlocksError::not_found(
            root,
            format!("no files under {root} match the requested column and row groups"),
        ));
    }

    let mut buckets = path::group_by_column(&files);
    for (index, (cgroup, members)) in buckets.iter_mut().enumerate() {
        if members.iter().all(|m| storage.is_local(m)) {
            log::debug!(
                "Column group {} is local, reading {} file(s) in place",
                cgroup.as_deref().unwrap_or("<root>"),
                members.len()
            );
            continue;
        }
        if let Some(name) = duplicate_name(members) {
            return Err(BlocksError::invalid(format!(
                "column group {} under {root} has more than one file named {name}",
                cgroup.as_deref().unwrap_or("<root>")
            )));
        }
        let dest = staging.join(staging_name(index));
        let dest = dest.to_string_lossy();
        log::debug!(
            "Staging {} file(s) of column group {} into {dest}",
            members.len(),
            cgroup.as_deref().unwrap_or("<root>")
        );
        storage.copy(members, &dest, false)?;
        *members = members
            .iter()
            .map(|m| path::join(&dest, path::basename(m)))
            .collect();
    }

    let groups = match cgroups {
        Some(order) => {
            let mut seen = BTreeSet::new();
            let mut groups = Vec::with_capacity(order.len());
            for name in order {
                if !seen.insert(name.as_str()) {
                    continue;
                }
                let members = buckets.remove(&Some(name.clone())).ok_or_else(|| {
                    BlocksError::not_found(
                        root,
                        format!("column group {name:?} has no files under {root}"),
                    )
                })?;
                groups.push((Some(name.clone()), members));
            }
            groups
        }
        None => buckets.into_iter().collect(),
    };
    Ok(Grouping { groups })
}
