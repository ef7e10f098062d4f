use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::sys::time::TimeVal;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::component::Component;
use crate::delta;
use crate::error::{Error, IoResultExt, Result};
use crate::kind::Kind;
use crate::object::Object;
use crate::stat::parse_stat_component;
use crate::store::Store;

#[derive(Default)]
pub struct RestoreOptions {
    /// restore only these pathnames (and anything under them); everything
    /// when empty
    pub files: Vec<String>,
}

#[derive(Default)]
pub struct RestoreReport {
    pub files_restored: usize,
    /// entries skipped because an object was missing or the kind cannot be
    /// recreated
    pub files_skipped: usize,
}

/// restore a generation into a target directory
pub fn restore<B: Backend>(
    store: &mut Store<B>,
    gen_id: &str,
    target: &Path,
    options: &RestoreOptions,
) -> Result<RestoreReport> {
    let host_id = store.config().effective_host_id();
    info!(%host_id, gen_id, "starting restore");

    let host = store
        .get_host_block(&host_id)?
        .ok_or_else(|| Error::UnknownGeneration(gen_id.to_owned()))?;
    store.load_maps(&host.map_ids)?;
    store.load_contmaps(&host.contmap_ids)?;

    let gen = store
        .get_object(gen_id)?
        .ok_or_else(|| Error::UnknownGeneration(gen_id.to_owned()))?;
    let filelist_ref = gen
        .filelist_ref()
        .ok_or_else(|| Error::UnknownGeneration(gen_id.to_owned()))?
        .to_owned();
    let Some(filelist_object) = store.get_object(&filelist_ref)? else {
        warn!(%filelist_ref, "cannot find file list object");
        return Ok(RestoreReport::default());
    };

    let mut report = RestoreReport::default();
    let mut restored: Vec<(PathBuf, Component)> = Vec::new();
    let mut hardlinks: HashMap<(u64, u64), PathBuf> = HashMap::new();

    for file in filelist_object.find_by_kind(Kind::File) {
        let Some(pathname) = file.first_str_by_kind(Kind::FileName) else {
            warn!("file entry without FILENAME, skipping");
            report.files_skipped += 1;
            continue;
        };
        if !restore_requested(&options.files, pathname) {
            continue;
        }

        let full_pathname = target.join(pathname.trim_start_matches('/'));
        debug!(pathname, "restoring");
        match create_filesystem_entry(store, file, &full_pathname, &mut hardlinks) {
            Ok(true) => {
                report.files_restored += 1;
                restored.push((full_pathname, file.clone()));
            }
            Ok(false) => report.files_skipped += 1,
            Err(e) => {
                warn!(pathname, "could not restore: {e}");
                report.files_skipped += 1;
            }
        }
    }

    // metadata last, so writing children cannot disturb recorded times
    restored.sort_by(|a, b| a.0.cmp(&b.0));
    for (full_pathname, file) in &restored {
        if let Err(e) = apply_metadata(full_pathname, file) {
            warn!(path = %full_pathname.display(), "could not set metadata: {e}");
        }
    }

    Ok(report)
}

/// should this pathname be restored, given an explicit file list
fn restore_requested(files: &[String], pathname: &str) -> bool {
    if files.is_empty() {
        return true;
    }
    files.iter().any(|wanted| {
        pathname == wanted
            || pathname.starts_with(&format!("{}/", wanted.trim_end_matches('/')))
    })
}

/// create one directory entry; returns false for kinds that cannot be
/// recreated
fn create_filesystem_entry<B: Backend>(
    store: &mut Store<B>,
    file: &Component,
    full_pathname: &Path,
    hardlinks: &mut HashMap<(u64, u64), PathBuf>,
) -> Result<bool> {
    let stat_component = file
        .first_by_kind(Kind::Stat)
        .ok_or(Error::MissingObjectHeader(Kind::Stat.name()))?;
    let stat = parse_stat_component(stat_component)?;

    // a previously seen inode with the same (dev, ino) becomes a hardlink
    if !stat.is_dir() {
        if let (Some(nlink), Some(dev), Some(ino)) = (stat.nlink, stat.dev, stat.ino) {
            if nlink > 1 {
                if let Some(existing) = hardlinks.get(&(dev, ino)) {
                    fs::hard_link(existing, full_pathname).with_path(full_pathname)?;
                    return Ok(true);
                }
                hardlinks.insert((dev, ino), full_pathname.to_path_buf());
            }
        }
    }

    if stat.is_dir() {
        fs::create_dir_all(full_pathname).with_path(full_pathname)?;
        return Ok(true);
    }

    if stat.is_regular() {
        if let Some(parent) = full_pathname.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let content = match file.first_str_by_kind(Kind::ContRef) {
            Some(cont_id) => file_contents(store, &cont_id.to_owned())?,
            None => match file.first_str_by_kind(Kind::DeltaRef) {
                Some(delta_id) => reconstruct_contents(store, &delta_id.to_owned())?,
                // a zero-length entry stored with neither ref
                None => Vec::new(),
            },
        };
        let mut out = File::create(full_pathname).with_path(full_pathname)?;
        out.write_all(&content).with_path(full_pathname)?;
        return Ok(true);
    }

    // symlinks, devices and sockets are recorded but not recreated
    debug!(path = %full_pathname.display(), "entry kind not recreatable");
    Ok(false)
}

/// concatenate the FILECHUNK parts referenced by a FILECONTENTS object
fn file_contents<B: Backend>(store: &mut Store<B>, cont_id: &str) -> Result<Vec<u8>> {
    let cont = store.get_object(cont_id)?.ok_or_else(|| Error::MissingBlock {
        block_id: String::new(),
        object_id: cont_id.to_owned(),
    })?;
    let part_ids: Vec<String> = cont
        .find_strs_by_kind(Kind::FilePartRef)
        .into_iter()
        .map(str::to_owned)
        .collect();

    let mut content = Vec::new();
    for part_id in part_ids {
        let part = store.get_object(&part_id)?.ok_or_else(|| Error::MissingBlock {
            block_id: String::new(),
            object_id: part_id.clone(),
        })?;
        if let Some(chunk) = part.first_bytes_by_kind(Kind::FileChunk) {
            content.extend_from_slice(chunk);
        }
    }
    Ok(content)
}

/// replay a delta chain: walk DELTAREF links down to the base CONTREF, then
/// apply each delta oldest-first
fn reconstruct_contents<B: Backend>(store: &mut Store<B>, delta_id: &str) -> Result<Vec<u8>> {
    let mut stack = Vec::new();
    let mut next = Some(delta_id.to_owned());
    while let Some(id) = next {
        let delta = store.get_object(&id)?.ok_or_else(|| Error::MissingBlock {
            block_id: String::new(),
            object_id: id.clone(),
        })?;
        next = delta.first_str_by_kind(Kind::DeltaRef).map(str::to_owned);
        stack.push(delta);
    }

    let base_cont_id = stack
        .last()
        .and_then(|d| d.first_str_by_kind(Kind::ContRef))
        .ok_or_else(|| Error::Delta("delta chain does not end in CONTREF".to_owned()))?
        .to_owned();
    let mut content = file_contents(store, &base_cont_id)?;

    while let Some(delta_object) = stack.pop() {
        let delta_data = delta_data(store, &delta_object)?;
        content = delta::apply_delta(&content, &delta_data)?;
    }
    Ok(content)
}

/// concatenate the DELTADATA parts of one DELTA object
fn delta_data<B: Backend>(store: &mut Store<B>, delta_object: &Object) -> Result<Vec<u8>> {
    let part_ids: Vec<String> = delta_object
        .find_strs_by_kind(Kind::DeltaPartRef)
        .into_iter()
        .map(str::to_owned)
        .collect();
    let mut data = Vec::new();
    for part_id in part_ids {
        let part = store.get_object(&part_id)?.ok_or_else(|| Error::MissingBlock {
            block_id: String::new(),
            object_id: part_id.clone(),
        })?;
        if let Some(chunk) = part.first_bytes_by_kind(Kind::DeltaData) {
            data.extend_from_slice(chunk);
        }
    }
    Ok(data)
}

/// apply recorded permissions and times to a restored entry
fn apply_metadata(path: &Path, file: &Component) -> Result<()> {
    let Some(stat_component) = file.first_by_kind(Kind::Stat) else {
        return Ok(());
    };
    let stat = parse_stat_component(stat_component)?;

    if let Some(mode) = stat.permissions() {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).with_path(path)?;
    }

    if let (Some(atime), Some(mtime)) = (stat.atime, stat.mtime) {
        nix::sys::stat::utimes(
            path,
            &TimeVal::new(atime as i64, 0),
            &TimeVal::new(mtime as i64, 0),
        )
        .map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(e),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::config::Config;
    use crate::ops::{backup, BackupOptions};
    use crate::stat::StatInfo;
    use tempfile::tempdir;

    fn test_store(dir: &Path) -> Store<LocalBackend> {
        let path = dir.join("store");
        let backend = if path.join("blocks").is_dir() {
            LocalBackend::open(&path).unwrap()
        } else {
            LocalBackend::create(&path).unwrap()
        };
        let config = Config {
            host_id: Some("h1".to_string()),
            ..Config::default()
        };
        Store::new(backend, config)
    }

    #[test]
    fn test_backup_restore_roundtrip() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.txt"), b"alpha").unwrap();
        fs::write(source.join("sub/b.txt"), b"beta").unwrap();

        let mut store = test_store(dir.path());
        let report = backup(&mut store, &[&source], &BackupOptions::default()).unwrap();

        let target = dir.path().join("restored");
        let mut store = test_store(dir.path());
        let restore_report = restore(
            &mut store,
            &report.gen_id,
            &target,
            &RestoreOptions::default(),
        )
        .unwrap();

        assert!(restore_report.files_restored >= 4);
        let restored_root = target.join(source.to_string_lossy().trim_start_matches('/'));
        assert_eq!(fs::read(restored_root.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(restored_root.join("sub/b.txt")).unwrap(), b"beta");
    }

    #[test]
    fn test_restore_reconstructs_delta_stored_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("f.txt"), b"the first version of this file").unwrap();

        {
            let mut store = test_store(dir.path());
            backup(&mut store, &[&source], &BackupOptions::default()).unwrap();
        }

        fs::write(source.join("f.txt"), b"the second version of this file").unwrap();
        let report = {
            let mut store = test_store(dir.path());
            backup(&mut store, &[&source], &BackupOptions::default()).unwrap()
        };
        assert_eq!(report.files_delta, 1);

        let target = dir.path().join("restored");
        let mut store = test_store(dir.path());
        restore(&mut store, &report.gen_id, &target, &RestoreOptions::default()).unwrap();

        let restored_root = target.join(source.to_string_lossy().trim_start_matches('/'));
        assert_eq!(
            fs::read(restored_root.join("f.txt")).unwrap(),
            b"the second version of this file"
        );
    }

    #[test]
    fn test_restore_zero_byte_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("empty"), b"").unwrap();

        let mut store = test_store(dir.path());
        let report = backup(&mut store, &[&source], &BackupOptions::default()).unwrap();

        let target = dir.path().join("restored");
        let mut store = test_store(dir.path());
        restore(&mut store, &report.gen_id, &target, &RestoreOptions::default()).unwrap();

        let restored_root = target.join(source.to_string_lossy().trim_start_matches('/'));
        assert_eq!(fs::read(restored_root.join("empty")).unwrap(), b"");
    }

    #[test]
    fn test_restore_subset() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(source.join("keep")).unwrap();
        fs::create_dir_all(source.join("skip")).unwrap();
        fs::write(source.join("keep/wanted.txt"), b"wanted").unwrap();
        fs::write(source.join("skip/unwanted.txt"), b"unwanted").unwrap();

        let mut store = test_store(dir.path());
        let report = backup(&mut store, &[&source], &BackupOptions::default()).unwrap();

        let target = dir.path().join("restored");
        let mut store = test_store(dir.path());
        let options = RestoreOptions {
            files: vec![source.join("keep").to_string_lossy().into_owned()],
        };
        restore(&mut store, &report.gen_id, &target, &options).unwrap();

        let restored_root = target.join(source.to_string_lossy().trim_start_matches('/'));
        assert!(restored_root.join("keep/wanted.txt").exists());
        assert!(!restored_root.join("skip").exists());
    }

    #[test]
    fn test_restore_preserves_mode_and_mtime() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        let file = source.join("f");
        fs::write(&file, b"x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();

        let original = StatInfo::capture(&file).unwrap();

        let mut store = test_store(dir.path());
        let report = backup(&mut store, &[&source], &BackupOptions::default()).unwrap();

        let target = dir.path().join("restored");
        let mut store = test_store(dir.path());
        restore(&mut store, &report.gen_id, &target, &RestoreOptions::default()).unwrap();

        let restored_root = target.join(source.to_string_lossy().trim_start_matches('/'));
        let restored = StatInfo::capture(&restored_root.join("f")).unwrap();
        assert_eq!(restored.permissions(), Some(0o640));
        assert_eq!(restored.mtime, original.mtime);
    }

    #[test]
    fn test_restore_unknown_generation() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let target = dir.path().join("restored");
        assert!(matches!(
            restore(&mut store, "no-such-gen", &target, &RestoreOptions::default()),
            Err(Error::UnknownGeneration(_))
        ));
    }

    #[test]
    fn test_restore_hardlinks() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("original"), b"shared content").unwrap();
        fs::hard_link(source.join("original"), source.join("link")).unwrap();

        let mut store = test_store(dir.path());
        let report = backup(&mut store, &[&source], &BackupOptions::default()).unwrap();

        let target = dir.path().join("restored");
        let mut store = test_store(dir.path());
        restore(&mut store, &report.gen_id, &target, &RestoreOptions::default()).unwrap();

        let restored_root = target.join(source.to_string_lossy().trim_start_matches('/'));
        let a = fs::metadata(restored_root.join("original")).unwrap();
        let b = fs::metadata(restored_root.join("link")).unwrap();
        use std::os::unix::fs::MetadataExt;
        assert_eq!(a.ino(), b.ino());
        assert_eq!(fs::read(restored_root.join("link")).unwrap(), b"shared content");
    }
}
