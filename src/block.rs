//! stored blocks and the object queue
//!
//! a block is the unit exchanged with the backend: a cookie, a BLKID
//! component naming the block, then one OBJECT composite per stored object.
//! objects are accumulated in an `ObjectQueue` until the session decides the
//! queue is large enough to pack into a block.

use crate::component::{self, Component};
use crate::error::{Error, Result};
use crate::kind::Kind;
use crate::varint;

/// magic cookie at the beginning of every block
pub const BLOCK_COOKIE: &[u8] = b"blockhead\n";

/// encoded objects waiting to be packed into a block
#[derive(Default)]
pub struct ObjectQueue {
    queue: Vec<(String, Vec<u8>)>,
    size: usize,
}

impl ObjectQueue {
    pub fn new() -> ObjectQueue {
        ObjectQueue::default()
    }

    /// add an encoded object under its id
    pub fn add(&mut self, object_id: impl Into<String>, encoded: Vec<u8>) {
        self.size += encoded.len();
        self.queue.push((object_id.into(), encoded));
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.size = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// combined size of all queued encodings
    pub fn combined_size(&self) -> usize {
        self.size
    }

    /// ids of all queued objects, in insertion order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(|(id, _)| id.as_str())
    }

    /// pack the queue into a block
    pub fn as_block(&self, block_id: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_COOKIE.len() + self.size);
        out.extend_from_slice(BLOCK_COOKIE);
        Component::leaf(Kind::BlkId, block_id.as_bytes().to_vec()).encode_into(&mut out);
        for (_, encoded) in &self.queue {
            // an encoded object is already a concatenation of component
            // encodings, which is exactly an OBJECT composite's payload
            varint::encode_into(u64::from(Kind::Object.code()), &mut out);
            varint::encode_into(encoded.len() as u64, &mut out);
            out.extend_from_slice(encoded);
        }
        out
    }
}

/// decode a stored block into its top-level components
pub fn decode(block: &[u8]) -> Result<Vec<Component>> {
    let rest = block
        .strip_prefix(BLOCK_COOKIE)
        .ok_or(Error::BlockWithoutCookie)?;
    let components = Component::decode_all(rest, 0)?;
    if components.is_empty() {
        return Err(Error::EmptyBlock);
    }
    Ok(components)
}

/// the BLKID named inside a decoded block
pub fn block_id(components: &[Component]) -> Option<&str> {
    component::first_str_by_kind(components, Kind::BlkId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ObjectKind;
    use crate::object::Object;

    #[test]
    fn test_queue_accounting() {
        let mut q = ObjectQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.combined_size(), 0);

        q.add("a", vec![1, 2, 3]);
        q.add("b", vec![4, 5]);
        assert!(!q.is_empty());
        assert_eq!(q.combined_size(), 5);
        assert_eq!(q.ids().collect::<Vec<_>>(), vec!["a", "b"]);

        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.combined_size(), 0);
    }

    #[test]
    fn test_block_roundtrip() {
        let obj = Object::new("obj1", ObjectKind::FilePart, vec![]);
        let mut q = ObjectQueue::new();
        q.add("obj1", obj.encode());

        let block = q.as_block("blk1");
        let components = decode(&block).unwrap();
        assert_eq!(block_id(&components), Some("blk1"));

        let objects = component::find_by_kind(&components, Kind::Object);
        assert_eq!(objects.len(), 1);
        let parsed = Object::from_components(objects[0].children().unwrap().to_vec()).unwrap();
        assert_eq!(parsed.id(), "obj1");
    }

    #[test]
    fn test_block_without_cookie() {
        assert!(matches!(
            decode(b"not a block"),
            Err(Error::BlockWithoutCookie)
        ));
    }

    #[test]
    fn test_empty_block() {
        assert!(matches!(decode(BLOCK_COOKIE), Err(Error::EmptyBlock)));
    }
}
