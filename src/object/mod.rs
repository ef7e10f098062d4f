//! storage objects: id + kind + ordered components
//!
//! an object is the unit of content addressing. it is immutable once
//! encoded; any change produces a new object under a new id, which is what
//! makes the store append-only and generations cheap to keep.

pub mod host;

pub use host::HostBlock;

use crate::component::{self, Component};
use crate::error::{Error, Result};
use crate::kind::{Kind, ObjectKind};
use crate::stat::{create_stat_component, StatInfo};

/// version of the storage format, written into every host block
pub const FORMAT_VERSION: &str = "1";

/// return a universally unique id for a new object
pub fn random_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// a storage object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    id: String,
    kind: ObjectKind,
    components: Vec<Component>,
}

impl Object {
    pub fn new(id: impl Into<String>, kind: ObjectKind, components: Vec<Component>) -> Object {
        Object {
            id: id.into(),
            kind,
            components,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// append a component
    pub fn add(&mut self, component: Component) {
        self.components.push(component);
    }

    /// all components of a given kind, in order
    pub fn find_by_kind(&self, wanted: Kind) -> Vec<&Component> {
        component::find_by_kind(&self.components, wanted)
    }

    /// string values of all components of a given kind, in order
    pub fn find_strs_by_kind(&self, wanted: Kind) -> Vec<&str> {
        self.find_by_kind(wanted)
            .into_iter()
            .filter_map(|c| c.str_value())
            .collect()
    }

    pub fn first_by_kind(&self, wanted: Kind) -> Option<&Component> {
        component::first_by_kind(&self.components, wanted)
    }

    pub fn first_str_by_kind(&self, wanted: Kind) -> Option<&str> {
        component::first_str_by_kind(&self.components, wanted)
    }

    pub fn first_bytes_by_kind(&self, wanted: Kind) -> Option<&[u8]> {
        component::first_bytes_by_kind(&self.components, wanted)
    }

    pub fn first_varint_by_kind(&self, wanted: Kind) -> Option<u64> {
        component::first_varint_by_kind(&self.components, wanted)
    }

    /// encode as the implicit composite `[OBJID, OBJKIND] + components`
    ///
    /// no outer header: the OBJECT wrapper is added when the object is
    /// packed into a block.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        Component::leaf(Kind::ObjId, self.id.as_bytes().to_vec()).encode_into(&mut out);
        Component::varint(Kind::ObjKind, u64::from(self.kind.code())).encode_into(&mut out);
        for c in &self.components {
            c.encode_into(&mut out);
        }
        out
    }

    /// decode from bytes produced by [`Object::encode`]
    pub fn decode(encoded: &[u8]) -> Result<Object> {
        Object::from_components(Component::decode_all(encoded, 0)?)
    }

    /// build from decoded components; the first two must be OBJID then
    /// OBJKIND, in that order
    pub fn from_components(mut components: Vec<Component>) -> Result<Object> {
        if components.first().map(Component::kind) != Some(Kind::ObjId) {
            return Err(Error::MissingObjectHeader(Kind::ObjId.name()));
        }
        if components.get(1).map(Component::kind) != Some(Kind::ObjKind) {
            return Err(Error::MissingObjectHeader(Kind::ObjKind.name()));
        }
        let id = components[0]
            .str_value()
            .ok_or(Error::MissingObjectHeader(Kind::ObjId.name()))?
            .to_owned();
        let kind_code = components[1]
            .varint_value()
            .ok_or(Error::MissingObjectHeader(Kind::ObjKind.name()))?;
        let kind =
            ObjectKind::from_code(kind_code).ok_or(Error::UnknownObjectKind(kind_code))?;
        components.drain(..2);
        Ok(Object {
            id,
            kind,
            components,
        })
    }

    /// a SIG object holding an opaque rsync signature
    pub fn signature(id: impl Into<String>, sigdata: Vec<u8>) -> Object {
        Object::new(
            id,
            ObjectKind::Signature,
            vec![Component::leaf(Kind::SigData, sigdata)],
        )
    }

    /// a DELTA object: the parts making up the delta plus a reference to
    /// its basis, either full content (CONTREF) or another delta (DELTAREF)
    pub fn delta(
        id: impl Into<String>,
        deltapart_refs: &[String],
        cont_ref: Option<&str>,
        delta_ref: Option<&str>,
    ) -> Object {
        let mut components: Vec<Component> = deltapart_refs
            .iter()
            .map(|r| Component::leaf(Kind::DeltaPartRef, r.as_bytes().to_vec()))
            .collect();
        if let Some(cont_ref) = cont_ref {
            components.push(Component::leaf(Kind::ContRef, cont_ref.as_bytes().to_vec()));
        } else if let Some(delta_ref) = delta_ref {
            components.push(Component::leaf(
                Kind::DeltaRef,
                delta_ref.as_bytes().to_vec(),
            ));
        }
        Object::new(id, ObjectKind::Delta, components)
    }

    /// a GEN object: one completed backup run
    pub fn generation(
        id: impl Into<String>,
        filelist_ref: &str,
        start: u64,
        end: u64,
    ) -> Object {
        Object::new(
            id,
            ObjectKind::Generation,
            vec![
                Component::leaf(Kind::FileListRef, filelist_ref.as_bytes().to_vec()),
                Component::varint(Kind::GenStart, start),
                Component::varint(Kind::GenEnd, end),
            ],
        )
    }

    /// a FILEPART object holding one chunk of file content
    pub fn file_part(id: impl Into<String>, chunk: &[u8]) -> Object {
        Object::new(
            id,
            ObjectKind::FilePart,
            vec![Component::leaf(Kind::FileChunk, chunk.to_vec())],
        )
    }

    /// a FILECONTENTS object: the ordered chunk parts of one file
    pub fn file_contents(id: impl Into<String>, part_refs: &[String]) -> Object {
        let components = part_refs
            .iter()
            .map(|r| Component::leaf(Kind::FilePartRef, r.as_bytes().to_vec()))
            .collect();
        Object::new(id, ObjectKind::FileContents, components)
    }

    /// a DELTAPART object holding one chunk of an rsync delta
    pub fn delta_part(id: impl Into<String>, data: &[u8]) -> Object {
        Object::new(
            id,
            ObjectKind::DeltaPart,
            vec![Component::leaf(Kind::DeltaData, data.to_vec())],
        )
    }

    /// a DIR object: a named directory with its metadata
    pub fn dir(id: impl Into<String>, name: &str, stat: &StatInfo) -> Object {
        Object::new(
            id,
            ObjectKind::Dir,
            vec![
                Component::leaf(Kind::FileName, name.as_bytes().to_vec()),
                create_stat_component(stat),
            ],
        )
    }

    /// FILELISTREF of a generation object
    pub fn filelist_ref(&self) -> Option<&str> {
        self.first_str_by_kind(Kind::FileListRef)
    }

    /// GENSTART of a generation object, epoch seconds
    pub fn start_time(&self) -> Option<u64> {
        self.first_varint_by_kind(Kind::GenStart)
    }

    /// GENEND of a generation object, epoch seconds
    pub fn end_time(&self) -> Option<u64> {
        self.first_varint_by_kind(Kind::GenEnd)
    }
}
