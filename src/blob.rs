//! Opaque object persistence next to a block tree.
//!
//! Any `serde` value can be stored as a JSON document at a storage path, local or
//! remote, and loaded back. This is how jobs keep small side artifacts (fitted
//! encoders, split definitions, run metadata) beside the data they describe.

use crate::error::{BlocksError, Result};
use crate::storage::Storage;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize `value` as JSON and write it to `dest`.
///
/// # Errors
///
/// Returns [`BlocksError::Serde`] if the value can't be serialized, or a storage
/// error if the write fails
pub fn pickle<T: Serialize + ?Sized>(storage: &dyn Storage, value: &T, dest: &str) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| BlocksError::Serde {
        context: format!("serialize object for {dest}"),
        source,
    })?;
    storage.write(dest, &bytes)?;
    log::debug!("Pickled {} byte(s) to {dest}", bytes.len());
    Ok(())
}

/// Read the JSON document at `src` back into a `T`.
///
/// # Errors
///
/// Returns a storage error if the read fails, or [`BlocksError::Serde`] if the
/// document doesn't describe a `T`
pub fn unpickle<T: DeserializeOwned>(storage: &dyn Storage, src: &str) -> Result<T> {
    let bytes = storage.read(src)?;
    serde_json::from_slice(&bytes).map_err(|source| BlocksError::Serde {
        context: format!("deserialize object from {src}"),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileSystem, MemoryStorage};
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Split {
        train: Vec<String>,
        test: Vec<String>,
        seed: u64,
    }

    #[test]
    fn roundtrip_through_local_and_memory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let fs = FileSystem::new().with_backend("mem", Arc::new(MemoryStorage::new()));
        let split = Split {
            train: vec!["part_00000.pq".into(), "part_00001.pq".into()],
            test: vec!["part_00002.pq".into()],
            seed: 7,
        };

        let local = format!("{}/meta/split.json", dir.path().display());
        for dest in [local.as_str(), "mem://bucket/meta/split.json"] {
            pickle(&fs, &split, dest)?;
            assert_eq!(unpickle::<Split>(&fs, dest)?, split);
        }
        Ok(())
    }

    #[test]
    fn wrong_shape_is_a_serde_error() -> anyhow::Result<()> {
        let mem = MemoryStorage::new();
        let counts: BTreeMap<String, u32> = BTreeMap::from([("c0".into(), 10)]);
        pickle(&mem, &counts, "mem://b/counts.json")?;
        let err = unpickle::<Split>(&mem, "mem://b/counts.json").unwrap_err();
        assert!(matches!(err, BlocksError::Serde { .. }));
        Ok(())
    }
}
