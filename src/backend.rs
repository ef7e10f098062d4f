//! block storage backends
//!
//! the engine exchanges whole blocks with a backend and never looks inside
//! the transport: local disk here, anything with get/put semantics in
//! principle. no retry logic lives at this layer.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};

/// zstd level for stored blocks (fast, reasonable ratio)
const ZSTD_LEVEL: i32 = 3;

/// how many blocks go into one fanout directory before a new one is started
const MAX_BLOCKS_PER_DIR: usize = 256;

/// a physical block store
pub trait Backend {
    /// fetch a block; a missing block is `Ok(None)`, not an error
    fn get_block(&self, block_id: &str) -> Result<Option<Vec<u8>>>;

    /// store a block under an id, overwriting any previous content
    fn put_block(&mut self, block_id: &str, data: &[u8]) -> Result<()>;

    /// generate an id for a block about to be stored
    fn generate_block_id(&mut self) -> String;

    /// ids of every stored block
    fn list_blocks(&self) -> Result<Vec<String>>;

    /// remove a stored block
    fn remove_block(&mut self, block_id: &str) -> Result<()>;
}

/// local directory block store
///
/// blocks are zstd-compressed files under `blocks/`, sharded into fanout
/// directories of at most 256 entries. writes are atomic: temp file in
/// `tmp/`, fsync, rename, fsync of the containing directory.
pub struct LocalBackend {
    path: PathBuf,
    fanout_dir: String,
    blocks_in_dir: usize,
}

impl LocalBackend {
    /// initialize a new store directory
    pub fn create(path: &Path) -> Result<LocalBackend> {
        if path.join("blocks").exists() {
            return Err(Error::StoreExists(path.to_path_buf()));
        }
        fs::create_dir_all(path.join("blocks")).with_path(path)?;
        fs::create_dir_all(path.join("tmp")).with_path(path)?;
        Ok(LocalBackend::fresh(path))
    }

    /// open an existing store directory
    pub fn open(path: &Path) -> Result<LocalBackend> {
        if !path.join("blocks").is_dir() {
            return Err(Error::NoStore(path.to_path_buf()));
        }
        Ok(LocalBackend::fresh(path))
    }

    fn fresh(path: &Path) -> LocalBackend {
        LocalBackend {
            path: path.to_path_buf(),
            fanout_dir: uuid::Uuid::new_v4().to_string(),
            // force a new fanout directory on first generated id
            blocks_in_dir: MAX_BLOCKS_PER_DIR,
        }
    }

    /// acquire the exclusive store lock for the duration of a session
    pub fn lock(&self) -> Result<StoreLock> {
        let lock_path = self.path.join(".lock");
        let file = File::create(&lock_path).with_path(&lock_path)?;
        let flock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
            .map_err(|_| Error::LockContention)?;
        Ok(StoreLock { _flock: flock })
    }

    fn block_path(&self, block_id: &str) -> PathBuf {
        self.path.join("blocks").join(block_id)
    }
}

/// guard holding the store lock until dropped
pub struct StoreLock {
    _flock: Flock<File>,
}

impl Backend for LocalBackend {
    fn generate_block_id(&mut self) -> String {
        if self.blocks_in_dir >= MAX_BLOCKS_PER_DIR {
            self.fanout_dir = uuid::Uuid::new_v4().to_string();
            self.blocks_in_dir = 0;
        }
        self.blocks_in_dir += 1;
        format!("{}/{}", self.fanout_dir, uuid::Uuid::new_v4())
    }

    fn get_block(&self, block_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.block_path(block_id);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Io {
                    path,
                    source: e,
                })
            }
        };
        let data = zstd::decode_all(&compressed[..]).map_err(|source| Error::Io {
            path,
            source,
        })?;
        Ok(Some(data))
    }

    fn put_block(&mut self, block_id: &str, data: &[u8]) -> Result<()> {
        let compressed = zstd::encode_all(data, ZSTD_LEVEL).map_err(|source| Error::Io {
            path: self.block_path(block_id),
            source,
        })?;

        let final_path = self.block_path(block_id);
        let dir = final_path
            .parent()
            .unwrap_or(&self.path)
            .to_path_buf();
        fs::create_dir_all(&dir).with_path(&dir)?;

        // atomic write: temp -> fsync -> rename -> fsync dir
        let tmp_path = self.path.join("tmp").join(uuid::Uuid::new_v4().to_string());
        {
            let mut tmp = File::create(&tmp_path).with_path(&tmp_path)?;
            tmp.write_all(&compressed).with_path(&tmp_path)?;
            tmp.sync_all().with_path(&tmp_path)?;
        }
        fs::rename(&tmp_path, &final_path).with_path(&final_path)?;
        let dir_file = File::open(&dir).with_path(&dir)?;
        dir_file.sync_all().with_path(&dir)?;
        Ok(())
    }

    fn list_blocks(&self) -> Result<Vec<String>> {
        let blocks_dir = self.path.join("blocks");
        let mut ids = Vec::new();
        for entry in WalkDir::new(&blocks_dir).min_depth(1) {
            let entry = entry.map_err(|e| Error::Io {
                path: blocks_dir.clone(),
                source: e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walkdir error")
                }),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&blocks_dir) {
                ids.push(rel.to_string_lossy().into_owned());
            }
        }
        Ok(ids)
    }

    fn remove_block(&mut self, block_id: &str) -> Result<()> {
        let path = self.block_path(block_id);
        fs::remove_file(&path).with_path(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::create(&dir.path().join("store")).unwrap();
        (dir, backend)
    }

    #[test]
    fn test_create_then_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        LocalBackend::create(&path).unwrap();
        assert!(matches!(
            LocalBackend::create(&path),
            Err(Error::StoreExists(_))
        ));
        LocalBackend::open(&path).unwrap();
    }

    #[test]
    fn test_open_missing() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            LocalBackend::open(&dir.path().join("nope")),
            Err(Error::NoStore(_))
        ));
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, mut backend) = test_backend();
        let id = backend.generate_block_id();
        backend.put_block(&id, b"block contents").unwrap();
        assert_eq!(
            backend.get_block(&id).unwrap(),
            Some(b"block contents".to_vec())
        );
    }

    #[test]
    fn test_get_missing_is_none() {
        let (_dir, backend) = test_backend();
        assert_eq!(backend.get_block("no/such-block").unwrap(), None);
    }

    #[test]
    fn test_put_overwrites() {
        let (_dir, mut backend) = test_backend();
        backend.put_block("host-id", b"v1").unwrap();
        backend.put_block("host-id", b"v2").unwrap();
        assert_eq!(backend.get_block("host-id").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_generated_ids_are_unique_and_sharded() {
        let (_dir, mut backend) = test_backend();
        let a = backend.generate_block_id();
        let b = backend.generate_block_id();
        assert_ne!(a, b);
        assert!(a.contains('/'));
        // same fanout directory while under the per-dir cap
        assert_eq!(
            a.split('/').next().unwrap(),
            b.split('/').next().unwrap()
        );
    }

    #[test]
    fn test_list_and_remove() {
        let (_dir, mut backend) = test_backend();
        let a = backend.generate_block_id();
        let b = backend.generate_block_id();
        backend.put_block(&a, b"a").unwrap();
        backend.put_block(&b, b"b").unwrap();

        let mut listed = backend.list_blocks().unwrap();
        listed.sort();
        let mut expected = vec![a.clone(), b.clone()];
        expected.sort();
        assert_eq!(listed, expected);

        backend.remove_block(&a).unwrap();
        assert_eq!(backend.get_block(&a).unwrap(), None);
        assert_eq!(backend.list_blocks().unwrap(), vec![b]);
    }

    #[test]
    fn test_lock_excludes_second_locker() {
        let (_dir, backend) = test_backend();
        let lock = backend.lock().unwrap();
        assert!(matches!(backend.lock(), Err(Error::LockContention)));
        drop(lock);
        backend.lock().unwrap();
    }
}
