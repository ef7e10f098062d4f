use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::backend::Backend;
use crate::component::Component;
use crate::delta;
use crate::error::{Error, Result};
use crate::filelist::Filelist;
use crate::kind::Kind;
use crate::object::{self, HostBlock, Object};
use crate::stat::StatInfo;
use crate::store::Store;

#[derive(Default)]
pub struct BackupOptions {
    /// glob patterns for pathnames to leave out
    pub excludes: Vec<String>,
}

pub struct BackupReport {
    /// id of the new generation
    pub gen_id: String,
    pub files_total: usize,
    /// entries carried forward because their inode metadata matched
    pub files_unchanged: usize,
    /// changed files stored as a delta against the previous generation
    pub files_delta: usize,
    /// files stored as full content
    pub files_full: usize,
}

/// back up one or more directory trees as a new generation
pub fn backup<B: Backend>(
    store: &mut Store<B>,
    roots: &[&Path],
    options: &BackupOptions,
) -> Result<BackupReport> {
    let host_id = store.config().effective_host_id();
    let excludes = compile_excludes(&options.excludes)?;

    info!(%host_id, "starting backup");
    let host = store
        .get_host_block(&host_id)?
        .unwrap_or_else(|| HostBlock::new(host_id.as_str()));
    store.load_maps(&host.map_ids)?;
    // content maps are not needed: backup never reads file data back

    let prev_filelist = previous_filelist(store, &host)?;

    let start = epoch_now();
    let mut new_filelist = Filelist::new();
    let mut report = BackupReport {
        gen_id: String::new(),
        files_total: 0,
        files_unchanged: 0,
        files_delta: 0,
        files_full: 0,
    };

    for root in roots {
        if !root.is_dir() {
            return Err(Error::NotADirectory(root.to_path_buf()));
        }
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_excluded(&excludes, &e.path().to_string_lossy()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // a file disappearing mid-walk must not abort the run
                    warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            let pathname = entry.path().to_string_lossy().into_owned();
            report.files_total += 1;
            if let Err(e) = backup_single_item(
                store,
                entry.path(),
                &pathname,
                &mut new_filelist,
                &prev_filelist,
                &mut report,
            ) {
                warn!(%pathname, "could not back up entry: {e}");
            }
        }
    }
    let end = epoch_now();

    let filelist_id = object::random_id();
    store.queue_object(&new_filelist.to_object(&filelist_id), false)?;

    let gen_id = object::random_id();
    info!(%gen_id, files = new_filelist.len(), "creating new generation");
    store.queue_object(&Object::generation(gen_id.as_str(), &filelist_id, start, end), false)?;
    store.flush()?;

    let (map_id, contmap_id) = store.commit_mappings()?;

    let mut host = host;
    host.gen_ids.push(gen_id.clone());
    host.map_ids.extend(map_id);
    host.contmap_ids.extend(contmap_id);
    store.put_host_block(&host)?;

    report.gen_id = gen_id;
    Ok(report)
}

/// decide what to store for one directory entry
fn backup_single_item<B: Backend>(
    store: &mut Store<B>,
    path: &Path,
    pathname: &str,
    new_filelist: &mut Filelist,
    prev_filelist: &Filelist,
    report: &mut BackupReport,
) -> Result<()> {
    let stat = StatInfo::capture(path)?;

    if let Some(prev) = prev_filelist.find_matching_inode(pathname, &stat) {
        debug!(pathname, "unchanged, carrying forward");
        new_filelist.add_file_component(pathname, prev.clone());
        report.files_unchanged += 1;
        return Ok(());
    }

    let mut cont_id = None;
    let mut sig_id = None;
    let mut delta_id = None;

    if stat.is_regular() {
        let data = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let id = object::random_id();
        store.queue_object(&Object::signature(id.as_str(), delta::compute_signature(&data)), false)?;
        sig_id = Some(id);

        delta_id = try_delta(store, pathname, prev_filelist.find(pathname), &data)?;
        if delta_id.is_some() {
            report.files_delta += 1;
        } else {
            cont_id = Some(store_file_contents(store, &data)?);
            report.files_full += 1;
        }
    }

    new_filelist.add(
        pathname,
        &stat,
        cont_id.as_deref(),
        sig_id.as_deref(),
        delta_id.as_deref(),
    );
    Ok(())
}

/// store a changed file as a delta against its previous version, when the
/// previous generation kept a signature for it
fn try_delta<B: Backend>(
    store: &mut Store<B>,
    pathname: &str,
    prev: Option<&Component>,
    data: &[u8],
) -> Result<Option<String>> {
    let Some(prev) = prev else { return Ok(None) };
    let Some(prev_sig_id) = prev.first_str_by_kind(Kind::SigRef) else {
        return Ok(None);
    };
    let prev_sig_id = prev_sig_id.to_owned();

    let Some(prev_sig) = store.get_object(&prev_sig_id)? else {
        warn!(pathname, %prev_sig_id, "previous signature object not found");
        return Ok(None);
    };
    let Some(sigdata) = prev_sig.first_bytes_by_kind(Kind::SigData) else {
        warn!(pathname, %prev_sig_id, "signature object has no SIGDATA");
        return Ok(None);
    };

    let delta_data = match delta::compute_delta(sigdata, data) {
        Ok(delta_data) => delta_data,
        Err(e) => {
            warn!(pathname, "delta failed, storing full content: {e}");
            return Ok(None);
        }
    };

    // the delta's basis is whatever the previous entry pointed at
    let prev_cont = prev.first_str_by_kind(Kind::ContRef).map(str::to_owned);
    let prev_delta = prev.first_str_by_kind(Kind::DeltaRef).map(str::to_owned);

    let mut part_ids = Vec::new();
    for chunk in chunks(&delta_data, store.config().block_size) {
        let part_id = object::random_id();
        store.queue_object(&Object::delta_part(part_id.as_str(), chunk), true)?;
        part_ids.push(part_id);
    }

    let delta_id = object::random_id();
    let delta_object = Object::delta(
        delta_id.as_str(),
        &part_ids,
        prev_cont.as_deref(),
        prev_delta.as_deref(),
    );
    store.queue_object(&delta_object, false)?;
    Ok(Some(delta_id))
}

/// store a file's full content as FILEPART chunks under a FILECONTENTS object
fn store_file_contents<B: Backend>(store: &mut Store<B>, data: &[u8]) -> Result<String> {
    let mut part_ids = Vec::new();
    for chunk in chunks(data, store.config().block_size) {
        let part_id = object::random_id();
        store.queue_object(&Object::file_part(part_id.as_str(), chunk), true)?;
        part_ids.push(part_id);
    }
    let cont_id = object::random_id();
    store.queue_object(&Object::file_contents(cont_id.as_str(), &part_ids), false)?;
    Ok(cont_id)
}

fn chunks(data: &[u8], size: usize) -> impl Iterator<Item = &[u8]> {
    // a zero-byte file yields no chunks: its FILECONTENTS has no parts
    data.chunks(size.max(1))
}

fn previous_filelist<B: Backend>(store: &mut Store<B>, host: &HostBlock) -> Result<Filelist> {
    let Some(prev_gen_id) = host.gen_ids.last() else {
        return Ok(Filelist::new());
    };
    let prev_gen_id = prev_gen_id.clone();
    let Some(gen) = store.get_object(&prev_gen_id)? else {
        warn!(%prev_gen_id, "previous generation object not found");
        return Ok(Filelist::new());
    };
    let Some(filelist_ref) = gen.filelist_ref().map(str::to_owned) else {
        warn!(%prev_gen_id, "previous generation has no FILELISTREF");
        return Ok(Filelist::new());
    };
    let Some(filelist_object) = store.get_object(&filelist_ref)? else {
        warn!(%filelist_ref, "previous filelist object not found");
        return Ok(Filelist::new());
    };
    Filelist::from_object(&filelist_object)
}

fn compile_excludes(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| Error::BadExcludePattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn is_excluded(excludes: &[glob::Pattern], pathname: &str) -> bool {
    excludes.iter().any(|p| p.matches(pathname))
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
