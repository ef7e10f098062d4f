use tracing::warn;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::filelist::Filelist;
use crate::kind::Kind;
use crate::stat::{parse_stat_component, StatInfo};
use crate::store::Store;

pub struct GenerationInfo {
    pub id: String,
    /// epoch seconds, absent if the generation object cannot be fetched
    pub start: Option<u64>,
    pub end: Option<u64>,
}

pub struct FileEntry {
    pub pathname: String,
    pub stat: StatInfo,
}

/// list the host's generations, oldest first
pub fn generations<B: Backend>(store: &mut Store<B>) -> Result<Vec<GenerationInfo>> {
    let host_id = store.config().effective_host_id();
    let Some(host) = store.get_host_block(&host_id)? else {
        return Ok(Vec::new());
    };
    store.load_maps(&host.map_ids)?;

    let mut list = Vec::new();
    for gen_id in &host.gen_ids {
        let (start, end) = match store.get_object(gen_id)? {
            Some(gen) => (gen.start_time(), gen.end_time()),
            None => {
                warn!(%gen_id, "cannot find info about generation");
                (None, None)
            }
        };
        list.push(GenerationInfo {
            id: gen_id.clone(),
            start,
            end,
        });
    }
    Ok(list)
}

/// list the files of one generation, sorted by pathname
pub fn show_generation<B: Backend>(
    store: &mut Store<B>,
    gen_id: &str,
) -> Result<Vec<FileEntry>> {
    let host_id = store.config().effective_host_id();
    let host = store
        .get_host_block(&host_id)?
        .ok_or_else(|| Error::UnknownGeneration(gen_id.to_owned()))?;
    store.load_maps(&host.map_ids)?;

    let gen = store
        .get_object(gen_id)?
        .ok_or_else(|| Error::UnknownGeneration(gen_id.to_owned()))?;
    let filelist_ref = gen
        .filelist_ref()
        .ok_or_else(|| Error::UnknownGeneration(gen_id.to_owned()))?
        .to_owned();
    let Some(filelist_object) = store.get_object(&filelist_ref)? else {
        warn!(%filelist_ref, "cannot find file list object");
        return Ok(Vec::new());
    };
    let filelist = Filelist::from_object(&filelist_object)?;

    let mut entries = Vec::new();
    for pathname in filelist.paths() {
        let Some(file) = filelist.find(pathname) else {
            continue;
        };
        let Some(stat_component) = file.first_by_kind(Kind::Stat) else {
            warn!(pathname, "file entry without STAT");
            continue;
        };
        entries.push(FileEntry {
            pathname: pathname.to_owned(),
            stat: parse_stat_component(stat_component)?,
        });
    }
    entries.sort_by(|a, b| a.pathname.cmp(&b.pathname));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::config::Config;
    use crate::ops::{backup, BackupOptions};
    use std::fs;
    use std::path::Path;
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
    fn test_generations_empty_store() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        assert!(generations(&mut store).unwrap().is_empty());
    }

    #[test]
    fn test_generations_accumulate_in_order() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("f"), b"x").unwrap();

        let first = {
            let mut store = test_store(dir.path());
            backup(&mut store, &[&source], &BackupOptions::default()).unwrap()
        };
        let second = {
            let mut store = test_store(dir.path());
            backup(&mut store, &[&source], &BackupOptions::default()).unwrap()
        };

        let mut store = test_store(dir.path());
        let list = generations(&mut store).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, first.gen_id);
        assert_eq!(list[1].id, second.gen_id);
        assert!(list[0].start.is_some());
        assert!(list[0].end.unwrap() >= list[0].start.unwrap());
    }

    #[test]
    fn test_show_generation() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("data"), b"1234567").unwrap();

        let report = {
            let mut store = test_store(dir.path());
            backup(&mut store, &[&source], &BackupOptions::default()).unwrap()
        };

        let mut store = test_store(dir.path());
        let entries = show_generation(&mut store, &report.gen_id).unwrap();
        assert_eq!(entries.len(), 2);
        let file = entries
            .iter()
            .find(|e| e.pathname.ends_with("/data"))
            .unwrap();
        assert_eq!(file.stat.size, Some(7));
    }

    #[test]
    fn test_show_unknown_generation() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        assert!(matches!(
            show_generation(&mut store, "nope"),
            Err(Error::UnknownGeneration(_))
        ));
    }
}
