//! Local-disk storage backed by `std::fs` and the `glob` crate.

use super::{ErrorKind, Storage, StorageError, StorageResult, has_glob};
use crate::path;
use glob::glob;
use std::fs;
use std::path::Path;

/// [`Storage`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

fn io_err(context: String) -> impl FnOnce(std::io::Error) -> StorageError {
    move |err| StorageError::from_io(context, &err)
}

fn display(path: &Path) -> String {
    path.to_string_lossy().trim_end_matches('/').to_string()
}

/// Copy a directory tree; `dest` is created if missing.
fn copy_tree(src: &Path, dest: &Path) -> StorageResult<()> {
    fs::create_dir_all(dest).map_err(io_err(format!("mkdir -p {}", dest.display())))?;
    let entries = fs::read_dir(src).map_err(io_err(format!("read dir {}", src.display())))?;
    for entry in entries {
        let entry = entry.map_err(io_err(format!("read dir {}", src.display())))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)
                .map_err(io_err(format!("copy {} -> {}", from.display(), to.display())))?;
        }
    }
    Ok(())
}

impl Storage for LocalStorage {
    fn is_local(&self, _path: &str) -> bool {
        true
    }

    fn list(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let pattern = pattern.trim_end_matches('/');
        let mut out = Vec::new();

        if has_glob(pattern) {
            // `**` listings only report files, so directories never re-enter expansion.
            let files_only = pattern.contains("**");
            // A trailing `**` only matches directories in `glob`.
            let pattern = match pattern.strip_suffix("**") {
                Some(dir) if dir.is_empty() || dir.ends_with('/') => format!("{pattern}/*"),
                _ => pattern.to_string(),
            };
            let pattern = pattern.as_str();
            let entries = glob(pattern).map_err(|e| {
                StorageError::new(ErrorKind::InvalidInput, format!("invalid glob pattern: {pattern}"))
                    .with_source(e.to_string())
            })?;
            for entry in entries {
                let p = entry.map_err(|e| {
                    StorageError::new(
                        ErrorKind::Other,
                        format!("error reading glob entry for pattern: {pattern}"),
                    )
                    .with_source(e.to_string())
                })?;
                if !files_only || p.is_file() {
                    out.push(display(&p));
                }
            }
        } else {
            let p = Path::new(pattern);
            if p.is_dir() {
                let entries =
                    fs::read_dir(p).map_err(io_err(format!("read dir {pattern}")))?;
                for entry in entries {
                    let entry = entry.map_err(io_err(format!("read dir {pattern}")))?;
                    out.push(path::join(pattern, &entry.file_name().to_string_lossy()));
                }
            } else if p.exists() {
                out.push(pattern.to_string());
            }
        }

        out.sort();
        out.dedup();
        Ok(out)
    }

    fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        fs::read(path).map_err(io_err(format!("read {path}")))
    }

    fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let parent = path::parent(path);
        if !parent.is_empty() {
            fs::create_dir_all(parent).map_err(io_err(format!("mkdir -p {parent}")))?;
        }
        fs::write(path, data).map_err(io_err(format!("write {path}")))
    }

    fn copy(&self, sources: &[String], dest: &str, recursive: bool) -> StorageResult<()> {
        fs::create_dir_all(dest).map_err(io_err(format!("mkdir -p {dest}")))?;
        for source in sources {
            let src = Path::new(source);
            let target = Path::new(dest).join(path::basename(source));
            if src.is_dir() {
                if !recursive {
                    return Err(StorageError::new(
                        ErrorKind::InvalidInput,
                        format!("{source} is a directory (not copied without recursive)"),
                    ));
                }
                copy_tree(src, &target)?;
            } else {
                fs::copy(src, &target)
                    .map_err(io_err(format!("copy {source} -> {}", target.display())))?;
            }
        }
        Ok(())
    }

    fn remove(&self, paths: &[String], recursive: bool) -> StorageResult<()> {
        for path in paths {
            let p = Path::new(path);
            let result = if p.is_dir() {
                if recursive {
                    fs::remove_dir_all(p)
                } else {
                    fs::remove_dir(p)
                }
            } else {
                fs::remove_file(p)
            };
            result.map_err(io_err(format!("remove {path}")))?;
        }
        Ok(())
    }

    fn is_directory(&self, path: &str) -> StorageResult<bool> {
        Ok(Path::new(path).is_dir())
    }

    fn make_directory(&self, path: &str) -> StorageResult<()> {
        fs::create_dir_all(path).map_err(io_err(format!("mkdir -p {path}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> anyhow::Result<(TempDir, String)> {
        let dir = TempDir::new()?;
        for c in 0..2 {
            for r in 0..2 {
                let p = dir.path().join(format!("c{c}/part.{r}.csv"));
                fs::create_dir_all(p.parent().unwrap())?;
                fs::write(p, "a\n1\n")?;
            }
        }
        let root = dir.path().to_string_lossy().to_string();
        Ok((dir, root))
    }

    #[test]
    fn list_directory_returns_children() -> anyhow::Result<()> {
        let (_dir, root) = tree()?;
        let listed = LocalStorage.list(&root)?;
        assert_eq!(listed, vec![format!("{root}/c0"), format!("{root}/c1")]);
        Ok(())
    }

    #[test]
    fn list_patterns() -> anyhow::Result<()> {
        let (_dir, root) = tree()?;
        assert_eq!(
            LocalStorage.list(&format!("{root}/*/part.1.csv"))?,
            vec![format!("{root}/c0/part.1.csv"), format!("{root}/c1/part.1.csv")]
        );
        assert_eq!(
            LocalStorage.list(&format!("{root}/**"))?,
            vec![
                format!("{root}/c0/part.0.csv"),
                format!("{root}/c0/part.1.csv"),
                format!("{root}/c1/part.0.csv"),
                format!("{root}/c1/part.1.csv"),
            ]
        );
        assert_eq!(LocalStorage.list(&format!("{root}/c1/**"))?.len(), 2);
        assert_eq!(LocalStorage.list(&format!("{root}/*"))?.len(), 2);
        assert!(LocalStorage.list(&format!("{root}/nope*"))?.is_empty());
        assert!(LocalStorage.list(&format!("{root}/missing"))?.is_empty());
        Ok(())
    }

    #[test]
    fn copy_files_and_trees() -> anyhow::Result<()> {
        let (_dir, root) = tree()?;
        let out = TempDir::new()?;
        let dest = out.path().to_string_lossy().to_string();

        LocalStorage.copy(&[format!("{root}/c0/part.1.csv")], &dest, false)?;
        assert!(out.path().join("part.1.csv").is_file());

        LocalStorage.copy(&[format!("{root}/c1")], &dest, true)?;
        assert!(out.path().join("c1/part.0.csv").is_file());

        let err = LocalStorage
            .copy(&[format!("{root}/c0")], &dest, false)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        Ok(())
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = LocalStorage.read("/definitely/not/here.csv").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
