//! tagged binary records, the smallest unit of the wire format
//!
//! a component is `varint(kind) varint(length) payload` on the wire. the
//! payload of a leaf is raw bytes; the payload of a composite is the
//! concatenated encodings of its children. whether a kind is leaf or
//! composite is never written out; the decoder recovers it from the kind
//! registry, so both sides must agree on the registry exactly.

use crate::error::{Error, Result};
use crate::kind::Kind;
use crate::varint;

/// a tagged value: leaf bytes or an ordered list of subcomponents
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Component {
    kind: Kind,
    value: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Value {
    Leaf(Vec<u8>),
    Composite(Vec<Component>),
}

impl Component {
    /// create a leaf component holding raw bytes
    pub fn leaf(kind: Kind, bytes: impl Into<Vec<u8>>) -> Component {
        debug_assert!(!kind.is_composite(), "{} is a composite kind", kind.name());
        Component {
            kind,
            value: Value::Leaf(bytes.into()),
        }
    }

    /// create a composite component from an ordered list of children
    pub fn composite(kind: Kind, children: Vec<Component>) -> Component {
        debug_assert!(kind.is_composite(), "{} is a leaf kind", kind.name());
        Component {
            kind,
            value: Value::Composite(children),
        }
    }

    /// create a leaf component holding a varint-encoded integer
    pub fn varint(kind: Kind, n: u64) -> Component {
        Component::leaf(kind, varint::encode(n))
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.value, Value::Composite(_))
    }

    /// leaf payload bytes, or None for a composite
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.value {
            Value::Leaf(bytes) => Some(bytes),
            Value::Composite(_) => None,
        }
    }

    /// leaf payload as utf-8, or None for a composite or non-utf-8 payload
    pub fn str_value(&self) -> Option<&str> {
        self.bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// leaf payload parsed as a varint, or None
    pub fn varint_value(&self) -> Option<u64> {
        self.bytes().and_then(|b| varint::decode(b, 0).ok()).map(|(v, _)| v)
    }

    /// subcomponents of a composite, or None for a leaf
    pub fn children(&self) -> Option<&[Component]> {
        match &self.value {
            Value::Leaf(_) => None,
            Value::Composite(children) => Some(children),
        }
    }

    /// all subcomponents of a given kind, in order
    pub fn find_by_kind(&self, wanted: Kind) -> Vec<&Component> {
        find_by_kind(self.children().unwrap_or(&[]), wanted)
    }

    /// first subcomponent of a given kind
    pub fn first_by_kind(&self, wanted: Kind) -> Option<&Component> {
        first_by_kind(self.children().unwrap_or(&[]), wanted)
    }

    /// string value of the first subcomponent of a given kind
    pub fn first_str_by_kind(&self, wanted: Kind) -> Option<&str> {
        first_str_by_kind(self.children().unwrap_or(&[]), wanted)
    }

    /// varint value of the first subcomponent of a given kind
    pub fn first_varint_by_kind(&self, wanted: Kind) -> Option<u64> {
        first_varint_by_kind(self.children().unwrap_or(&[]), wanted)
    }

    /// encode to a fresh buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// append the wire encoding to a buffer
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        varint::encode_into(u64::from(self.kind.code()), out);
        match &self.value {
            Value::Leaf(bytes) => {
                varint::encode_into(bytes.len() as u64, out);
                out.extend_from_slice(bytes);
            }
            Value::Composite(children) => {
                let mut payload = Vec::new();
                for child in children {
                    child.encode_into(&mut payload);
                }
                varint::encode_into(payload.len() as u64, out);
                out.extend_from_slice(&payload);
            }
        }
    }

    /// decode one component starting at `pos`, returning it and the position
    /// just past it
    ///
    /// truncated payloads, unknown kinds and children that do not exactly
    /// cover a composite's declared length are all fatal decode errors.
    pub fn decode(buf: &[u8], pos: usize) -> Result<(Component, usize)> {
        let (code, pos) = varint::decode(buf, pos)?;
        let kind = Kind::from_code(code).ok_or(Error::UnknownKind(code))?;
        let (size, pos) = varint::decode(buf, pos)?;
        let end = pos
            .checked_add(usize::try_from(size).map_err(|_| Error::TruncatedPayload {
                pos,
                needed: size,
            })?)
            .filter(|&e| e <= buf.len())
            .ok_or(Error::TruncatedPayload { pos, needed: size })?;

        let component = if kind.is_composite() {
            // children may not read past the declared extent
            let mut children = Vec::new();
            let mut at = pos;
            while at < end {
                let (child, next) = Component::decode(&buf[..end], at)?;
                children.push(child);
                at = next;
            }
            Component::composite(kind, children)
        } else {
            Component::leaf(kind, buf[pos..end].to_vec())
        };
        Ok((component, end))
    }

    /// decode every component from `pos` to the end of the buffer
    pub fn decode_all(buf: &[u8], pos: usize) -> Result<Vec<Component>> {
        let mut components = Vec::new();
        let mut at = pos;
        while at < buf.len() {
            let (component, next) = Component::decode(buf, at)?;
            components.push(component);
            at = next;
        }
        Ok(components)
    }
}

/// all components of a given kind in a list, preserving order
pub fn find_by_kind(components: &[Component], wanted: Kind) -> Vec<&Component> {
    components.iter().filter(|c| c.kind == wanted).collect()
}

/// first component of a given kind in a list
pub fn first_by_kind(components: &[Component], wanted: Kind) -> Option<&Component> {
    components.iter().find(|c| c.kind == wanted)
}

/// string value of the first component of a given kind
pub fn first_str_by_kind(components: &[Component], wanted: Kind) -> Option<&str> {
    first_by_kind(components, wanted).and_then(|c| c.str_value())
}

/// leaf bytes of the first component of a given kind
pub fn first_bytes_by_kind(components: &[Component], wanted: Kind) -> Option<&[u8]> {
    first_by_kind(components, wanted).and_then(|c| c.bytes())
}

/// varint value of the first component of a given kind
pub fn first_varint_by_kind(components: &[Component], wanted: Kind) -> Option<u64> {
    first_by_kind(components, wanted).and_then(|c| c.varint_value())
}
