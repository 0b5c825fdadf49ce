//! In-memory object store for tests and examples.
//!
//! Objects are stored under their full `mem://bucket/key` path. Directories are not
//! stored; they exist implicitly whenever some key continues past them. The store
//! reports itself as non-local, so the collector stages its files like any remote
//! object store, and [`MemoryStorage::fail_next`] can inject transient failures to
//! exercise retry behavior.

use super::{ErrorKind, Storage, StorageError, StorageResult, has_glob};
use crate::path;
use glob::{MatchOptions, Pattern};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type ObjectMap = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

#[derive(Debug, Default)]
struct Faults {
    remaining: usize,
    kind: Option<ErrorKind>,
    /// Only this operation fails when set.
    operation: Option<&'static str>,
}

/// [`Storage`] holding every object in memory. Clones share the same objects.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: ObjectMap,
    faults: Arc<Mutex<Faults>>,
}

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with `kind`.
    pub fn fail_next(&self, count: usize, kind: ErrorKind) {
        self.set_faults(None, count, kind);
    }

    /// Make the next `count` calls of one operation (`"list"`, `"read"`, `"write"`,
    /// `"copy"` or `"remove"`) fail with `kind`; other operations are unaffected.
    pub fn fail_next_on(&self, operation: &'static str, count: usize, kind: ErrorKind) {
        self.set_faults(Some(operation), count, kind);
    }

    fn set_faults(&self, operation: Option<&'static str>, count: usize, kind: ErrorKind) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        *faults = Faults {
            remaining: count,
            kind: Some(kind),
            operation,
        };
    }

    /// All stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inject(&self, operation: &str, path: &str) -> StorageResult<()> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if faults.operation.is_some_and(|op| op != operation) {
            return Ok(());
        }
        match faults.kind {
            Some(kind) if faults.remaining > 0 => {
                faults.remaining -= 1;
                Err(StorageError::new(
                    kind,
                    format!("injected failure during {operation} {path}"),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Every directory implied by the stored keys, e.g. `mem://b/c0` for `mem://b/c0/x.csv`.
    fn implied_dirs(keys: &BTreeMap<String, Vec<u8>>) -> BTreeSet<String> {
        let mut dirs = BTreeSet::new();
        for key in keys.keys() {
            let start = key.find("://").map_or(0, |i| i + 3);
            for (idx, _) in key[start..].match_indices('/') {
                dirs.insert(key[..start + idx].to_string());
            }
        }
        dirs
    }
}

impl Storage for MemoryStorage {
    fn is_local(&self, _path: &str) -> bool {
        false
    }

    fn list(&self, pattern: &str) -> StorageResult<Vec<String>> {
        self.inject("list", pattern)?;
        let pattern = pattern.trim_end_matches('/');
        let objects = self.objects();

        let out: BTreeSet<String> = if !has_glob(pattern) {
            if objects.contains_key(pattern) {
                BTreeSet::from([pattern.to_string()])
            } else {
                let prefix = format!("{pattern}/");
                objects
                    .keys()
                    .filter_map(|k| k.strip_prefix(&prefix))
                    .filter_map(|rest| rest.split('/').next())
                    .map(|child| path::join(pattern, child))
                    .collect()
            }
        } else {
            let matcher = Pattern::new(pattern).map_err(|e| {
                StorageError::new(ErrorKind::InvalidInput, format!("invalid glob pattern: {pattern}"))
                    .with_source(e.to_string())
            })?;
            let mut candidates: BTreeSet<String> = objects.keys().cloned().collect();
            if !pattern.contains("**") {
                candidates.extend(Self::implied_dirs(&objects));
            }
            candidates
                .into_iter()
                .filter(|c| matcher.matches_with(c, MATCH))
                .collect()
        };
        drop(objects);
        Ok(out.into_iter().collect())
    }

    fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.inject("read", path)?;
        self.objects().get(path).cloned().ok_or_else(|| {
            StorageError::new(ErrorKind::NotFound, format!("object {path} not found"))
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        self.inject("write", path)?;
        self.objects().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn copy(&self, sources: &[String], dest: &str, recursive: bool) -> StorageResult<()> {
        self.inject("copy", dest)?;
        let mut objects = self.objects();
        for source in sources {
            let target = path::join(dest, path::basename(source));
            if let Some(data) = objects.get(source).cloned() {
                objects.insert(target, data);
                continue;
            }
            let prefix = format!("{}/", source.trim_end_matches('/'));
            let tree: Vec<(String, Vec<u8>)> = objects
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(&prefix)
                        .map(|rel| (path::join(&target, rel), v.clone()))
                })
                .collect();
            if tree.is_empty() {
                return Err(StorageError::new(
                    ErrorKind::NotFound,
                    format!("object {source} not found"),
                ));
            }
            if !recursive {
                return Err(StorageError::new(
                    ErrorKind::InvalidInput,
                    format!("{source} is a directory (not copied without recursive)"),
                ));
            }
            objects.extend(tree);
        }
        Ok(())
    }

    fn remove(&self, paths: &[String], recursive: bool) -> StorageResult<()> {
        self.inject("remove", &paths.join(", "))?;
        let mut objects = self.objects();
        for path in paths {
            if objects.remove(path).is_some() {
                continue;
            }
            let prefix = format!("{}/", path.trim_end_matches('/'));
            let doomed: Vec<String> = objects
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            if doomed.is_empty() {
                return Err(StorageError::new(
                    ErrorKind::NotFound,
                    format!("object {path} not found"),
                ));
            }
            if !recursive {
                return Err(StorageError::new(
                    ErrorKind::InvalidInput,
                    format!("{path} is a directory (not removed without recursive)"),
                ));
            }
            for key in doomed {
                objects.remove(&key);
            }
        }
        Ok(())
    }

    fn is_directory(&self, path: &str) -> StorageResult<bool> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self.objects().keys().any(|k| k.starts_with(&prefix)))
    }

    fn make_directory(&self, _path: &str) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> StorageResult<MemoryStorage> {
        let mem = MemoryStorage::new();
        for c in 0..3 {
            for r in 0..2 {
                mem.write(&format!("mem://b/data/c{c}/part.{r}.csv"), b"x")?;
            }
        }
        Ok(mem)
    }

    #[test]
    fn list_directory_and_patterns() -> anyhow::Result<()> {
        let mem = populated()?;
        assert_eq!(
            mem.list("mem://b/data")?,
            vec!["mem://b/data/c0", "mem://b/data/c1", "mem://b/data/c2"]
        );
        assert_eq!(mem.list("mem://b/data/*")?, mem.list("mem://b/data")?);
        assert_eq!(
            mem.list("mem://b/data/c[01]/part.1.csv")?,
            vec!["mem://b/data/c0/part.1.csv", "mem://b/data/c1/part.1.csv"]
        );
        assert_eq!(mem.list("mem://b/data/**")?.len(), 6);
        assert_eq!(mem.list("mem://b/data/*/*")?.len(), 6);
        assert!(mem.list("mem://b/other/*")?.is_empty());
        Ok(())
    }

    #[test]
    fn copy_and_remove_trees() -> anyhow::Result<()> {
        let mem = populated()?;
        mem.copy(&["mem://b/data/c1".to_string()], "mem://b/copy", true)?;
        assert!(mem.is_directory("mem://b/copy/c1")?);
        assert_eq!(mem.list("mem://b/copy/c1")?.len(), 2);

        mem.remove(&["mem://b/copy".to_string()], true)?;
        assert!(!mem.is_directory("mem://b/copy")?);
        assert_eq!(mem.len(), 6);
        Ok(())
    }

    #[test]
    fn injected_faults_are_consumed() -> anyhow::Result<()> {
        let mem = populated()?;
        mem.fail_next(1, ErrorKind::ServiceUnavailable);
        let err = mem.read("mem://b/data/c0/part.0.csv").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
        assert_eq!(mem.read("mem://b/data/c0/part.0.csv")?, b"x");

        mem.fail_next_on("read", 1, ErrorKind::Timeout);
        assert_eq!(mem.list("mem://b/data")?.len(), 3);
        assert!(mem.read("mem://b/data/c0/part.0.csv").is_err());
        assert!(mem.read("mem://b/data/c0/part.0.csv").is_ok());
        Ok(())
    }
}
