//! Storage capability: list, read, write, copy and remove files addressed by URI-like paths.
//!
//! The core never talks to a filesystem or object store directly. It goes through the
//! [`Storage`] trait, which has two built-in implementations:
//!
//! - [`LocalStorage`] - the local disk, with glob listing via the `glob` crate
//! - [`MemoryStorage`] - an in-memory object store addressed as `mem://bucket/key`,
//!   treated as remote so that every code path that stages files can be exercised
//!   without a network
//!
//! [`FileSystem`] is the default capability. It dispatches each call on the path's
//! scheme (`scheme://...`) to a registered backend, falling back to [`LocalStorage`]
//! for plain paths and `file://` URIs. Calls that move bytes to or from a non-local
//! backend run under a [`RetryPolicy`]; listing is never retried.
//!
//! ## Synchronous by Design
//! Every operation blocks until it completes. A backend may fan out internally for a
//! bulk `copy`, but callers only ever observe the whole request succeed or fail.
//!
//! ```
//! use ironblocks::storage::{FileSystem, MemoryStorage, Storage};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), ironblocks::storage::StorageError> {
//! let fs = FileSystem::new().with_backend("mem", Arc::new(MemoryStorage::new()));
//! fs.write("mem://bucket/c0/part.0.csv", b"key\nkey00\n")?;
//! assert_eq!(fs.list("mem://bucket/*")?, vec!["mem://bucket/c0".to_string()]);
//! assert!(!fs.is_local("mem://bucket/c0/part.0.csv"));
//! # Ok(())
//! # }
//! ```

pub mod local;
pub mod memory;
pub mod retry;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use retry::RetryPolicy;

use crate::path;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

/// Number of sources handed to a backend in one `copy` request.
pub const COPY_CHUNK_SIZE: usize = 1000;

// ============================================================================
// Core Error Type
// ============================================================================

/// Error reported by a storage backend.
#[derive(Debug, Clone)]
pub struct StorageError {
    pub message: String,
    pub kind: ErrorKind,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    InvalidInput,
    Network,
    Timeout,
    ServiceUnavailable,
    RateLimited,
    Other,
}

impl ErrorKind {
    /// Kinds worth retrying: the request may succeed if sent again later.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::ServiceUnavailable | Self::RateLimited
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl Error for StorageError {}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Wrap an `std::io::Error`, keeping enough of its kind to decide on retries.
    pub fn from_io(context: impl Into<String>, err: &std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let kind = match err.kind() {
            Io::NotFound => ErrorKind::NotFound,
            Io::PermissionDenied => ErrorKind::PermissionDenied,
            Io::InvalidInput | Io::InvalidData => ErrorKind::InvalidInput,
            Io::TimedOut => ErrorKind::Timeout,
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe => ErrorKind::Network,
            _ => ErrorKind::Other,
        };
        Self::new(kind, context).with_source(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// Storage capability
// ============================================================================

/// The set of file operations the collector, assembler and divider rely on.
pub trait Storage: Send + Sync {
    /// Whether `path` can be handed to a codec as-is, without staging a local copy.
    fn is_local(&self, path: &str) -> bool;

    /// List paths matching `pattern`, sorted.
    ///
    /// Supports `*`, `?`, `[...]` within one path segment and `**` across segments.
    /// A plain directory path lists its direct children. Matching nothing is not an
    /// error: an empty vector is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is malformed or the listing itself fails
    fn list(&self, pattern: &str) -> StorageResult<Vec<String>>;

    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist or can't be read
    fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Create or replace a file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written
    fn write(&self, path: &str, data: &[u8]) -> StorageResult<()>;

    /// Copy each source into the directory `dest`, keeping its base name.
    ///
    /// With `recursive`, a source directory is copied as a whole tree under
    /// `dest/<name>`.
    ///
    /// # Errors
    ///
    /// Returns an error if any source is missing or the transfer fails
    fn copy(&self, sources: &[String], dest: &str, recursive: bool) -> StorageResult<()>;

    /// Remove files, or whole directories with `recursive`.
    ///
    /// # Errors
    ///
    /// Returns an error if a path doesn't exist or can't be removed
    fn remove(&self, paths: &[String], recursive: bool) -> StorageResult<()>;

    /// Whether `path` names a directory (or, for object stores, a key prefix).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend can't be queried
    fn is_directory(&self, path: &str) -> StorageResult<bool>;

    /// Create a directory and its parents. Object stores may treat this as a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory can't be created
    fn make_directory(&self, path: &str) -> StorageResult<()>;

    /// Open a file for streaming reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read
    fn open_read(&self, path: &str) -> StorageResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read(path)?)))
    }
}

/// True when `path` contains glob wildcard characters.
#[must_use]
pub fn has_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// The `scheme` of a `scheme://rest` path, if any.
#[must_use]
pub fn scheme(path: &str) -> Option<&str> {
    path.split_once("://").map(|(scheme, _)| scheme)
}

// ============================================================================
// FileSystem: scheme-dispatching default capability
// ============================================================================

/// Default [`Storage`] that routes each path to a backend by URI scheme.
///
/// Plain paths and `file://` URIs go to [`LocalStorage`]; any other scheme must be
/// registered with [`with_backend`](Self::with_backend). Transfers that touch a
/// non-local backend are retried according to the configured [`RetryPolicy`].
#[derive(Clone)]
pub struct FileSystem {
    local: LocalStorage,
    backends: BTreeMap<String, Arc<dyn Storage>>,
    retry: RetryPolicy,
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("schemes", &self.backends.keys().collect::<Vec<_>>())
            .field("retry", &self.retry)
            .finish()
    }
}

impl FileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self {
            local: LocalStorage,
            backends: BTreeMap::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Route paths of the form `scheme://...` to `backend`.
    #[must_use]
    pub fn with_backend(mut self, scheme: impl Into<String>, backend: Arc<dyn Storage>) -> Self {
        self.backends.insert(scheme.into(), backend);
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Key of the backend that owns `path`; `None` for the local disk.
    fn route(path: &str) -> Option<&str> {
        scheme(path).filter(|s| *s != "file")
    }

    fn backend(&self, path: &str) -> StorageResult<(&dyn Storage, String)> {
        match Self::route(path) {
            None => Ok((
                &self.local,
                path.strip_prefix("file://").unwrap_or(path).to_string(),
            )),
            Some(scheme) => self
                .backends
                .get(scheme)
                .map(|b| (b.as_ref(), path.to_string()))
                .ok_or_else(|| {
                    StorageError::new(
                        ErrorKind::InvalidInput,
                        format!("no storage backend registered for {scheme}:// (path {path})"),
                    )
                }),
        }
    }

    /// Run `op` directly for local paths, under the retry policy otherwise.
    fn guarded<T>(
        &self,
        operation: &str,
        path: &str,
        op: impl FnMut() -> StorageResult<T>,
    ) -> StorageResult<T> {
        if Self::route(path).is_none() {
            let mut op = op;
            op()
        } else {
            self.retry.run(&format!("{operation} {path}"), op)
        }
    }

    /// Move one source (file or tree) between two different backends through memory.
    fn transfer(&self, source: &str, dest: &str, recursive: bool) -> StorageResult<()> {
        let (src_backend, src) = self.backend(source)?;
        let (dst_backend, dst) = self.backend(dest)?;
        let target_root = path::join(&dst, path::basename(&src));

        let pairs: Vec<(String, String)> =
            if recursive && src_backend.is_directory(&src)? {
                let prefix = format!("{}/", src.trim_end_matches('/'));
                let pairs: Vec<(String, String)> = src_backend
                    .list(&path::join(&src, "**"))?
                    .into_iter()
                    .filter_map(|file| {
                        let rel = file.strip_prefix(&prefix)?.to_string();
                        Some((file, path::join(&target_root, &rel)))
                    })
                    .collect();
                if pairs.is_empty() {
                    return Err(StorageError::new(
                        ErrorKind::NotFound,
                        format!("directory {source} lists no files to copy to {dest}"),
                    ));
                }
                pairs
            } else {
                vec![(src, target_root)]
            };

        for (from, to) in pairs {
            let data = self.guarded("read", source, || src_backend.read(&from))?;
            self.guarded("write", dest, || dst_backend.write(&to, &data))?;
        }
        Ok(())
    }
}

impl Storage for FileSystem {
    fn is_local(&self, path: &str) -> bool {
        self.backend(path)
            .is_ok_and(|(backend, path)| backend.is_local(&path))
    }

    fn list(&self, pattern: &str) -> StorageResult<Vec<String>> {
        log::info!("Globbing file content in {pattern}");
        let (backend, pattern) = self.backend(pattern)?;
        backend.list(&pattern)
    }

    fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let (backend, local) = self.backend(path)?;
        self.guarded("read", path, || backend.read(&local))
    }

    fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let (backend, local) = self.backend(path)?;
        self.guarded("write", path, || backend.write(&local, data))
    }

    fn copy(&self, sources: &[String], dest: &str, recursive: bool) -> StorageResult<()> {
        if sources.is_empty() {
            return Ok(());
        }
        log::info!("Copying {} source(s) to {dest}", sources.len());
        let (dst_backend, dst) = self.backend(dest)?;
        let dest_route = Self::route(dest).map(str::to_string);

        let (same, cross): (Vec<&String>, Vec<&String>) = sources
            .iter()
            .partition(|s| Self::route(s).map(str::to_string) == dest_route);

        let same: Vec<String> = same
            .into_iter()
            .map(|s| s.strip_prefix("file://").unwrap_or(s).to_string())
            .collect();
        for chunk in same.chunks(COPY_CHUNK_SIZE) {
            self.guarded("copy", dest, || dst_backend.copy(chunk, &dst, recursive))?;
        }
        for source in cross {
            self.transfer(source, dest, recursive)?;
        }
        Ok(())
    }

    fn remove(&self, paths: &[String], recursive: bool) -> StorageResult<()> {
        for path in paths {
            let (backend, local) = self.backend(path)?;
            let target = [local];
            self.guarded("remove", path, || backend.remove(&target, recursive))?;
        }
        Ok(())
    }

    fn is_directory(&self, path: &str) -> StorageResult<bool> {
        let (backend, local) = self.backend(path)?;
        backend.is_directory(&local)
    }

    fn make_directory(&self, path: &str) -> StorageResult<()> {
        let (backend, local) = self.backend(path)?;
        self.guarded("mkdir", path, || backend.make_directory(&local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs_with_memory() -> (FileSystem, MemoryStorage) {
        let mem = MemoryStorage::new();
        let fs = FileSystem::new()
            .with_backend("mem", Arc::new(mem.clone()))
            .with_retry(RetryPolicy::immediate(3));
        (fs, mem)
    }

    #[test]
    fn routes_by_scheme() {
        let (fs, _) = fs_with_memory();
        assert!(fs.is_local("/tmp/a.csv"));
        assert!(fs.is_local("file:///tmp/a.csv"));
        assert!(!fs.is_local("mem://b/a.csv"));
        assert!(!fs.is_local("gs://b/a.csv"));
    }

    #[test]
    fn unknown_scheme_is_invalid_input() {
        let fs = FileSystem::new();
        let err = fs.list("gs://bucket/*").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn copy_between_local_and_memory() -> anyhow::Result<()> {
        let (fs, mem) = fs_with_memory();
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_string_lossy().to_string();
        std::fs::create_dir_all(tmp.path().join("c0"))?;
        std::fs::write(tmp.path().join("c0/part.0.csv"), b"a\n1\n")?;
        std::fs::write(tmp.path().join("c0/part.1.csv"), b"a\n2\n")?;

        fs.copy(&[format!("{root}/c0")], "mem://bucket/data", true)?;
        assert_eq!(
            mem.keys(),
            vec![
                "mem://bucket/data/c0/part.0.csv".to_string(),
                "mem://bucket/data/c0/part.1.csv".to_string(),
            ]
        );

        let back = format!("{root}/back");
        fs.copy(&["mem://bucket/data/c0/part.1.csv".to_string()], &back, false)?;
        assert_eq!(std::fs::read(tmp.path().join("back/part.1.csv"))?, b"a\n2\n");
        Ok(())
    }

    #[test]
    fn copying_an_empty_directory_across_backends_fails() -> anyhow::Result<()> {
        let (fs, mem) = fs_with_memory();
        let tmp = tempfile::tempdir()?;
        std::fs::create_dir_all(tmp.path().join("c0"))?;
        let source = tmp.path().join("c0").to_string_lossy().to_string();

        let err = fs.copy(&[source], "mem://bucket/data", true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(mem.is_empty());
        Ok(())
    }

    #[test]
    fn transient_failures_are_retried_for_remote_paths() -> anyhow::Result<()> {
        let (fs, mem) = fs_with_memory();
        mem.write("mem://b/x.csv", b"x")?;
        mem.fail_next(2, ErrorKind::Network);
        assert_eq!(fs.read("mem://b/x.csv")?, b"x");

        mem.fail_next(5, ErrorKind::Timeout);
        let err = fs.read("mem://b/x.csv").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        Ok(())
    }

    #[test]
    fn listing_is_not_retried() -> anyhow::Result<()> {
        let (fs, mem) = fs_with_memory();
        mem.write("mem://b/x.csv", b"x")?;
        mem.fail_next(1, ErrorKind::Network);
        assert!(fs.list("mem://b/*").is_err());
        Ok(())
    }
}
