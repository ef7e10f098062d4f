//! the object-id to block-id index
//!
//! objects are looked up by id, but live inside packed blocks; this index is
//! the indirection between the two. it is append-only: an object id maps to
//! exactly one block id for the life of the index, and remapping is a fatal
//! error, because silently overwriting an entry would orphan stored data.
//!
//! a block holds many objects, so the same block id value repeats across
//! entries. values are interned in a table owned by the instance and shared
//! via `Rc`, one allocation per distinct block.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::warn;

use crate::block::{self, BLOCK_COOKIE};
use crate::component::Component;
use crate::error::{Error, Result};
use crate::kind::Kind;

#[derive(Default)]
pub struct Mapping {
    entries: HashMap<String, Rc<str>>,
    interned: HashSet<Rc<str>>,
    /// object ids added since the last flush, in insertion order
    new_keys: Vec<String>,
}

impl Mapping {
    pub fn new() -> Mapping {
        Mapping::default()
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// block id an object lives in, if known
    pub fn get(&self, object_id: &str) -> Option<&str> {
        self.entries.get(object_id).map(|rc| &**rc)
    }

    /// add a mapping entry and mark it new
    ///
    /// re-adding an identical pair is a no-op; a different block id for an
    /// existing object id is a `MappingConflict`.
    pub fn add(&mut self, object_id: &str, block_id: &str) -> Result<()> {
        self.insert(object_id, block_id, true)
    }

    fn insert(&mut self, object_id: &str, block_id: &str, mark_new: bool) -> Result<()> {
        if let Some(existing) = self.entries.get(object_id) {
            if &**existing == block_id {
                return Ok(());
            }
            return Err(Error::MappingConflict {
                object_id: object_id.to_owned(),
                existing: existing.to_string(),
                conflicting: block_id.to_owned(),
            });
        }
        let interned = self.intern(block_id);
        self.entries.insert(object_id.to_owned(), interned);
        if mark_new {
            self.new_keys.push(object_id.to_owned());
        }
        Ok(())
    }

    fn intern(&mut self, block_id: &str) -> Rc<str> {
        if let Some(existing) = self.interned.get(block_id) {
            return existing.clone();
        }
        let rc: Rc<str> = Rc::from(block_id);
        self.interned.insert(rc.clone());
        rc
    }

    /// object ids added since the last flush, in insertion order
    pub fn get_new(&self) -> &[String] {
        &self.new_keys
    }

    /// forget which entries are new (entries themselves are kept)
    pub fn reset_new(&mut self) {
        self.new_keys.clear();
    }

    /// encode every new entry as OBJMAP components, one per distinct block
    ///
    /// children are BLOCKREF first, then the OBJREFs stored in that block:
    /// block ids repeat far more than object ids, and leading with the
    /// shared value groups better for the backend's compression. ordering
    /// is deterministic: blocks in first-use order, objects in insertion
    /// order.
    pub fn encode_new(&self) -> Vec<Vec<u8>> {
        let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
        for object_id in &self.new_keys {
            let Some(block_id) = self.get(object_id) else {
                continue;
            };
            match groups.iter_mut().find(|(b, _)| *b == block_id) {
                Some((_, ids)) => ids.push(object_id),
                None => groups.push((block_id, vec![object_id])),
            }
        }

        groups
            .into_iter()
            .map(|(block_id, object_ids)| {
                let mut children =
                    vec![Component::leaf(Kind::BlockRef, block_id.as_bytes().to_vec())];
                children.extend(
                    object_ids
                        .into_iter()
                        .map(|id| Component::leaf(Kind::ObjRef, id.as_bytes().to_vec())),
                );
                Component::composite(Kind::ObjMap, children).encode()
            })
            .collect()
    }

    /// encode the new entries into a complete block and mark them flushed
    ///
    /// an immediate second call with no intervening `add` produces a block
    /// with no OBJMAP components.
    pub fn encode_new_to_block(&mut self, block_id: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(BLOCK_COOKIE);
        Component::leaf(Kind::BlkId, block_id.as_bytes().to_vec()).encode_into(&mut out);
        for encoded in self.encode_new() {
            out.extend_from_slice(&encoded);
        }
        self.reset_new();
        out
    }

    /// merge a previously stored map block into the live index
    ///
    /// loaded entries are not marked new, so loading history never causes
    /// it to be re-flushed. conflicts and malformed components are fatal:
    /// a corrupt map risks losing access to backed-up data.
    pub fn decode_block(&mut self, encoded: &[u8]) -> Result<()> {
        let components = block::decode(encoded)?;
        for component in &components {
            if component.kind() != Kind::ObjMap {
                continue;
            }
            let block_id = component.first_str_by_kind(Kind::BlockRef);
            let object_ids: Vec<&str> = component
                .find_by_kind(Kind::ObjRef)
                .into_iter()
                .filter_map(|c| c.str_value())
                .collect();
            let Some(block_id) = block_id else {
                warn!("OBJMAP entry without BLOCKREF, skipping");
                continue;
            };
            let block_id = block_id.to_owned();
            for object_id in object_ids {
                self.insert(object_id, &block_id, false)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component;

    #[test]
    fn test_add_and_get() {
        let mut map = Mapping::new();
        map.add("obj1", "blockA").unwrap();
        assert_eq!(map.get("obj1"), Some("blockA"));
        assert_eq!(map.get("missing"), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_identical_readd_is_noop() {
        let mut map = Mapping::new();
        map.add("obj1", "blockA").unwrap();
        map.add("obj1", "blockA").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_new(), &["obj1".to_string()]);
    }

    #[test]
    fn test_conflicting_readd_fails() {
        let mut map = Mapping::new();
        map.add("obj1", "blockA").unwrap();
        assert!(matches!(
            map.add("obj1", "blockB"),
            Err(Error::MappingConflict { .. })
        ));
        // original entry untouched
        assert_eq!(map.get("obj1"), Some("blockA"));
    }

    #[test]
    fn test_block_ids_are_interned() {
        let mut map = Mapping::new();
        map.add("obj1", "blockA").unwrap();
        map.add("obj2", "blockA").unwrap();
        let a = map.entries.get("obj1").unwrap();
        let b = map.entries.get("obj2").unwrap();
        assert!(Rc::ptr_eq(a, b));
    }

    #[test]
    fn test_get_new_insertion_order() {
        let mut map = Mapping::new();
        map.add("c", "b1").unwrap();
        map.add("a", "b1").unwrap();
        map.add("b", "b2").unwrap();
        assert_eq!(map.get_new(), &["c".to_string(), "a".into(), "b".into()]);
    }

    #[test]
    fn test_encode_new_groups_by_block() {
        let mut map = Mapping::new();
        map.add("o1", "blockA").unwrap();
        map.add("o2", "blockB").unwrap();
        map.add("o3", "blockA").unwrap();

        let encoded = map.encode_new();
        assert_eq!(encoded.len(), 2);

        let (first, _) = Component::decode(&encoded[0], 0).unwrap();
        assert_eq!(first.kind(), Kind::ObjMap);
        let children = first.children().unwrap();
        assert_eq!(children[0].kind(), Kind::BlockRef);
        assert_eq!(children[0].str_value(), Some("blockA"));
        let objrefs: Vec<_> = first
            .find_by_kind(Kind::ObjRef)
            .into_iter()
            .filter_map(|c| c.str_value())
            .collect();
        assert_eq!(objrefs, vec!["o1", "o3"]);
    }

    #[test]
    fn test_flush_idempotence() {
        let mut map = Mapping::new();
        map.add("obj1", "blockA").unwrap();

        let first = map.encode_new_to_block("map1");
        assert!(map.encode_new().is_empty());

        // a second flush block contains no OBJMAP components
        let second = map.encode_new_to_block("map2");
        assert!(second.len() < first.len());
        let components = block::decode(&second).unwrap();
        assert!(component::find_by_kind(&components, Kind::ObjMap).is_empty());
    }

    #[test]
    fn test_decode_block_roundtrip() {
        let mut map = Mapping::new();
        map.add("obj1", "blockA").unwrap();
        map.add("obj2", "blockA").unwrap();
        let encoded = map.encode_new_to_block("mapblock1");

        let mut fresh = Mapping::new();
        fresh.decode_block(&encoded).unwrap();
        assert_eq!(fresh.get("obj1"), Some("blockA"));
        assert_eq!(fresh.get("obj2"), Some("blockA"));
        assert_eq!(fresh.len(), 2);
        // loading history must not create new entries to flush
        assert!(fresh.get_new().is_empty());
        // interning survives the decode: one shared value for the block id
        assert!(Rc::ptr_eq(
            fresh.entries.get("obj1").unwrap(),
            fresh.entries.get("obj2").unwrap()
        ));
    }

    #[test]
    fn test_decode_block_accepts_key_first_order() {
        // blocks written by the older encoder put OBJREFs before BLOCKREF
        let objmap = Component::composite(
            Kind::ObjMap,
            vec![
                Component::leaf(Kind::ObjRef, b"obj1".to_vec()),
                Component::leaf(Kind::BlockRef, b"blockA".to_vec()),
            ],
        );
        let mut encoded = Vec::new();
        encoded.extend_from_slice(BLOCK_COOKIE);
        Component::leaf(Kind::BlkId, b"m1".to_vec()).encode_into(&mut encoded);
        encoded.extend_from_slice(&objmap.encode());

        let mut map = Mapping::new();
        map.decode_block(&encoded).unwrap();
        assert_eq!(map.get("obj1"), Some("blockA"));
    }

    #[test]
    fn test_decode_block_conflict_is_fatal() {
        let mut map = Mapping::new();
        map.add("obj1", "blockA").unwrap();
        let encoded = map.encode_new_to_block("m1");

        let mut other = Mapping::new();
        other.add("obj1", "blockB").unwrap();
        assert!(matches!(
            other.decode_block(&encoded),
            Err(Error::MappingConflict { .. })
        ));
    }

    #[test]
    fn test_decode_block_does_not_disturb_new_set() {
        let mut producer = Mapping::new();
        producer.add("old", "blockA").unwrap();
        let history = producer.encode_new_to_block("m1");

        let mut map = Mapping::new();
        map.add("fresh", "blockB").unwrap();
        map.decode_block(&history).unwrap();
        assert_eq!(map.get_new(), &["fresh".to_string()]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_decode_block_rejects_garbage() {
        let mut map = Mapping::new();
        assert!(map.decode_block(b"definitely not a block").is_err());
    }
}
