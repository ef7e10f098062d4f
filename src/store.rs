//! session façade over backend, queues and mappings
//!
//! one `Store` is exclusively owned by a backup or restore run. metadata
//! objects and file content objects travel through separate queues and
//! separate mappings (MAPREF vs CONTMAPREF in the host block), so a restore
//! that only needs metadata never has to load the content maps.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::backend::Backend;
use crate::block::{self, ObjectQueue};
use crate::component;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::kind::{Kind, ObjectKind};
use crate::mapping::Mapping;
use crate::object::{HostBlock, Object};

/// small most-recently-used object cache
///
/// FILEPART objects are deliberately never cached; their chunks are large
/// and read once.
struct ObjectCache {
    max: usize,
    objects: HashMap<String, Object>,
    mru: VecDeque<String>,
}

impl ObjectCache {
    fn new(max: usize) -> ObjectCache {
        ObjectCache {
            max: max.max(1),
            objects: HashMap::new(),
            mru: VecDeque::new(),
        }
    }

    fn get(&mut self, object_id: &str) -> Option<&Object> {
        if self.objects.contains_key(object_id) {
            self.mru.retain(|id| id != object_id);
            self.mru.push_front(object_id.to_owned());
        }
        self.objects.get(object_id)
    }

    fn put(&mut self, object: Object) {
        let id = object.id().to_owned();
        self.mru.retain(|x| x != &id);
        self.mru.push_front(id.clone());
        self.objects.insert(id, object);
        while self.mru.len() > self.max {
            if let Some(evicted) = self.mru.pop_back() {
                self.objects.remove(&evicted);
            }
        }
    }
}

pub struct Store<B: Backend> {
    backend: B,
    config: Config,
    queue: ObjectQueue,
    content_queue: ObjectQueue,
    map: Mapping,
    contmap: Mapping,
    cache: ObjectCache,
}

impl<B: Backend> Store<B> {
    pub fn new(backend: B, config: Config) -> Store<B> {
        // a cached object without file data is roughly 64 bytes
        let cache_slots = config.block_size / 64;
        Store {
            backend,
            config,
            queue: ObjectQueue::new(),
            content_queue: ObjectQueue::new(),
            map: Mapping::new(),
            contmap: Mapping::new(),
            cache: ObjectCache::new(cache_slots),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// queue an object for storage; `content` selects the file-data queue
    ///
    /// a queue that would outgrow the configured block size is flushed into
    /// a block first.
    pub fn queue_object(&mut self, object: &Object, content: bool) -> Result<()> {
        let encoded = object.encode();
        let (queue, mapping) = if content {
            (&mut self.content_queue, &mut self.contmap)
        } else {
            (&mut self.queue, &mut self.map)
        };
        if queue.combined_size() + encoded.len() > self.config.block_size {
            flush_queue(&mut self.backend, queue, mapping)?;
        }
        queue.add(object.id(), encoded);
        Ok(())
    }

    /// flush both object queues into blocks
    pub fn flush(&mut self) -> Result<()> {
        flush_queue(&mut self.backend, &mut self.queue, &mut self.map)?;
        flush_queue(&mut self.backend, &mut self.content_queue, &mut self.contmap)
    }

    /// fetch an object by id
    ///
    /// an id no mapping knows about is a recoverable miss (`Ok(None)`); a
    /// mapped block that is gone from the backend is an error.
    pub fn get_object(&mut self, object_id: &str) -> Result<Option<Object>> {
        if let Some(object) = self.cache.get(object_id) {
            return Ok(Some(object.clone()));
        }

        let block_id = match self.map.get(object_id).or_else(|| self.contmap.get(object_id)) {
            Some(block_id) => block_id.to_owned(),
            None => {
                warn!(object_id, "no block found that contains object");
                return Ok(None);
            }
        };

        let Some(encoded) = self.backend.get_block(&block_id)? else {
            return Err(Error::MissingBlock {
                block_id,
                object_id: object_id.to_owned(),
            });
        };

        debug!(object_id, %block_id, "decoding fetched block");
        let components = block::decode(&encoded)?;
        let mut wanted = None;
        for object in component::find_by_kind(&components, Kind::Object) {
            let object = Object::from_components(object.children().unwrap_or(&[]).to_vec())?;
            if object.id() == object_id {
                wanted = Some(object.clone());
            }
            if object.kind() != ObjectKind::FilePart {
                self.cache.put(object);
            }
        }
        Ok(wanted)
    }

    /// block an object is known to live in, metadata mapping first
    pub fn block_id_of(&self, object_id: &str) -> Option<&str> {
        self.map.get(object_id).or_else(|| self.contmap.get(object_id))
    }

    /// load previously stored map blocks into the metadata mapping
    pub fn load_maps(&mut self, block_ids: &[String]) -> Result<()> {
        load_into(&mut self.backend, &mut self.map, block_ids)
    }

    /// load previously stored content map blocks into the content mapping
    pub fn load_contmaps(&mut self, block_ids: &[String]) -> Result<()> {
        load_into(&mut self.backend, &mut self.contmap, block_ids)
    }

    /// write the new mapping entries out as map blocks
    ///
    /// returns the ids of the new map and content map blocks, when either
    /// mapping had anything new.
    pub fn commit_mappings(&mut self) -> Result<(Option<String>, Option<String>)> {
        let map_id = commit_mapping(&mut self.backend, &mut self.map)?;
        let contmap_id = commit_mapping(&mut self.backend, &mut self.contmap)?;
        Ok((map_id, contmap_id))
    }

    /// fetch and decode the host block, if the host has one
    pub fn get_host_block(&mut self, host_id: &str) -> Result<Option<HostBlock>> {
        match self.backend.get_block(host_id)? {
            Some(encoded) => Ok(Some(HostBlock::decode(&encoded)?)),
            None => Ok(None),
        }
    }

    /// write the host block (always under the host id, overwriting)
    pub fn put_host_block(&mut self, host: &HostBlock) -> Result<()> {
        self.backend.put_block(&host.host_id, &host.encode())
    }
}

fn flush_queue<B: Backend>(
    backend: &mut B,
    queue: &mut ObjectQueue,
    mapping: &mut Mapping,
) -> Result<()> {
    if queue.is_empty() {
        return Ok(());
    }
    let block_id = backend.generate_block_id();
    debug!(%block_id, size = queue.combined_size(), "flushing object queue");
    let encoded = queue.as_block(&block_id);
    backend.put_block(&block_id, &encoded)?;
    for object_id in queue.ids() {
        mapping.add(object_id, &block_id)?;
    }
    queue.clear();
    Ok(())
}

fn load_into<B: Backend>(
    backend: &mut B,
    mapping: &mut Mapping,
    block_ids: &[String],
) -> Result<()> {
    for block_id in block_ids {
        let Some(encoded) = backend.get_block(block_id)? else {
            return Err(Error::MissingBlock {
                block_id: block_id.clone(),
                object_id: String::new(),
            });
        };
        mapping.decode_block(&encoded)?;
    }
    Ok(())
}

fn commit_mapping<B: Backend>(backend: &mut B, mapping: &mut Mapping) -> Result<Option<String>> {
    if mapping.get_new().is_empty() {
        return Ok(None);
    }
    let block_id = backend.generate_block_id();
    let encoded = mapping.encode_new_to_block(&block_id);
    backend.put_block(&block_id, &encoded)?;
    Ok(Some(block_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::object;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, Store<LocalBackend>) {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::create(&dir.path().join("store")).unwrap();
        (dir, Store::new(backend, Config::default()))
    }

    #[test]
    fn test_queue_flush_get_roundtrip() {
        let (_dir, mut store) = test_store();

        let sig = Object::signature("sig-1", b"sigdata".to_vec());
        store.queue_object(&sig, false).unwrap();
        store.flush().unwrap();

        let fetched = store.get_object("sig-1").unwrap().unwrap();
        assert_eq!(fetched, sig);
    }

    #[test]
    fn test_unknown_object_is_a_miss() {
        let (_dir, mut store) = test_store();
        assert!(store.get_object("never-stored").unwrap().is_none());
    }

    #[test]
    fn test_content_objects_use_content_mapping() {
        let (_dir, mut store) = test_store();

        let part = Object::file_part("part-1", b"chunk");
        store.queue_object(&part, true).unwrap();
        store.flush().unwrap();

        let (map_id, contmap_id) = store.commit_mappings().unwrap();
        assert!(map_id.is_none());
        assert!(contmap_id.is_some());

        assert_eq!(store.get_object("part-1").unwrap().unwrap(), part);
    }

    #[test]
    fn test_auto_flush_on_block_size() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::create(&dir.path().join("store")).unwrap();
        let config = Config {
            block_size: 256,
            ..Config::default()
        };
        let mut store = Store::new(backend, config);

        for i in 0..8 {
            let part = Object::file_part(format!("part-{i}"), &[0u8; 100]);
            store.queue_object(&part, true).unwrap();
        }
        store.flush().unwrap();
        store.commit_mappings().unwrap();

        // more than one content block was written
        let blocks = store.backend().list_blocks().unwrap();
        assert!(blocks.len() > 2);

        for i in 0..8 {
            assert!(store.get_object(&format!("part-{i}")).unwrap().is_some());
        }
    }

    #[test]
    fn test_mappings_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");

        let gen_id;
        let map_id;
        {
            let backend = LocalBackend::create(&path).unwrap();
            let mut store = Store::new(backend, Config::default());
            let gen = Object::generation(object::random_id(), "fl-1", 1, 2);
            gen_id = gen.id().to_owned();
            store.queue_object(&gen, false).unwrap();
            store.flush().unwrap();
            let (m, _) = store.commit_mappings().unwrap();
            map_id = m.unwrap();
        }

        let backend = LocalBackend::open(&path).unwrap();
        let mut store = Store::new(backend, Config::default());
        store.load_maps(&[map_id]).unwrap();
        let fetched = store.get_object(&gen_id).unwrap().unwrap();
        assert_eq!(fetched.filelist_ref(), Some("fl-1"));
    }

    #[test]
    fn test_commit_mappings_idempotent() {
        let (_dir, mut store) = test_store();
        store
            .queue_object(&Object::signature("s", b"x".to_vec()), false)
            .unwrap();
        store.flush().unwrap();

        let (first, _) = store.commit_mappings().unwrap();
        assert!(first.is_some());
        let (second, _) = store.commit_mappings().unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_host_block_roundtrip() {
        let (_dir, mut store) = test_store();
        assert!(store.get_host_block("host-1").unwrap().is_none());

        let mut host = HostBlock::new("host-1");
        host.gen_ids.push("g1".to_string());
        store.put_host_block(&host).unwrap();

        let fetched = store.get_host_block("host-1").unwrap().unwrap();
        assert_eq!(fetched, host);
    }
}
