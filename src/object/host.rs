//! the host block, root of trust for one backed-up host
//!
//! a host block is a complete stored block containing a single HOST object:
//! the format version, the ordered generation history (GENREF), and the ids
//! of the mapping blocks (MAPREF) and content mapping blocks (CONTMAPREF)
//! accumulated so far. everything else in the store is reached from here.

use crate::block::{self, ObjectQueue};
use crate::component::{self, Component};
use crate::error::Result;
use crate::kind::{Kind, ObjectKind};
use crate::object::{Object, FORMAT_VERSION};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostBlock {
    pub host_id: String,
    pub gen_ids: Vec<String>,
    pub map_ids: Vec<String>,
    pub contmap_ids: Vec<String>,
}

impl HostBlock {
    pub fn new(host_id: impl Into<String>) -> HostBlock {
        HostBlock {
            host_id: host_id.into(),
            ..HostBlock::default()
        }
    }

    /// encode as a complete stored block (the host block is its own block,
    /// under the host id)
    pub fn encode(&self) -> Vec<u8> {
        let mut components = vec![Component::leaf(
            Kind::FormatVersion,
            FORMAT_VERSION.as_bytes().to_vec(),
        )];
        components.extend(
            self.gen_ids
                .iter()
                .map(|id| Component::leaf(Kind::GenRef, id.as_bytes().to_vec())),
        );
        components.extend(
            self.map_ids
                .iter()
                .map(|id| Component::leaf(Kind::MapRef, id.as_bytes().to_vec())),
        );
        components.extend(
            self.contmap_ids
                .iter()
                .map(|id| Component::leaf(Kind::ContMapRef, id.as_bytes().to_vec())),
        );
        let object = Object::new(self.host_id.clone(), ObjectKind::Host, components);

        let mut queue = ObjectQueue::new();
        queue.add(self.host_id.clone(), object.encode());
        queue.as_block(&self.host_id)
    }

    /// decode a stored host block
    pub fn decode(encoded: &[u8]) -> Result<HostBlock> {
        let components = block::decode(encoded)?;
        let host_id = block::block_id(&components).unwrap_or_default().to_owned();

        let mut host = HostBlock::new(host_id);
        for object in component::find_by_kind(&components, Kind::Object) {
            let object = Object::from_components(object.children().unwrap_or(&[]).to_vec())?;
            for id in object.find_strs_by_kind(Kind::GenRef) {
                host.gen_ids.push(id.to_owned());
            }
            for id in object.find_strs_by_kind(Kind::MapRef) {
                host.map_ids.push(id.to_owned());
            }
            for id in object.find_strs_by_kind(Kind::ContMapRef) {
                host.contmap_ids.push(id.to_owned());
            }
        }
        Ok(host)
    }
}
