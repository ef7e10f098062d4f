//! per-generation pathname index
//!
//! a filelist maps each backed-up pathname to its FILE component: the name,
//! the inode metadata, and references to whichever content representation
//! was stored (full content, signature, delta chain). matching a fresh lstat
//! against the previous generation's entry is the skip-unchanged decision.

use std::collections::HashMap;

use crate::component::Component;
use crate::error::Result;
use crate::kind::{Kind, ObjectKind};
use crate::object::Object;
use crate::stat::{create_stat_component, parse_stat_component, StatInfo};

/// build a FILE component for one pathname
///
/// CONTREF, SIGREF and DELTAREF are each optional; a file entry carries at
/// most one of CONTREF or DELTAREF ("full content stored" vs "reconstruct
/// from delta chain").
pub fn file_component(
    pathname: &str,
    stat: &StatInfo,
    contref: Option<&str>,
    sigref: Option<&str>,
    deltaref: Option<&str>,
) -> Component {
    let mut children = vec![
        Component::leaf(Kind::FileName, pathname.as_bytes().to_vec()),
        create_stat_component(stat),
    ];
    if let Some(contref) = contref {
        children.push(Component::leaf(Kind::ContRef, contref.as_bytes().to_vec()));
    }
    if let Some(sigref) = sigref {
        children.push(Component::leaf(Kind::SigRef, sigref.as_bytes().to_vec()));
    }
    if let Some(deltaref) = deltaref {
        children.push(Component::leaf(Kind::DeltaRef, deltaref.as_bytes().to_vec()));
    }
    Component::composite(Kind::File, children)
}

/// stat fields compared when deciding whether a file is unchanged
///
/// atime and ctime are left out on purpose: both can change without the
/// content changing, and comparing them would defeat deduplication.
const MATCH_FIELDS: [fn(&StatInfo) -> Option<u64>; 11] = [
    |st| st.dev,
    |st| st.ino,
    |st| st.mode,
    |st| st.nlink,
    |st| st.uid,
    |st| st.gid,
    |st| st.rdev,
    |st| st.size,
    |st| st.blksize,
    |st| st.blocks,
    |st| st.mtime,
];

/// the files of one backup generation, keyed by pathname
#[derive(Default)]
pub struct Filelist {
    files: HashMap<String, Component>,
}

impl Filelist {
    pub fn new() -> Filelist {
        Filelist::default()
    }

    /// number of files in the list
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// all pathnames currently in the list
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// build and store a FILE component for a pathname, replacing any
    /// earlier entry for it
    pub fn add(
        &mut self,
        pathname: &str,
        stat: &StatInfo,
        contref: Option<&str>,
        sigref: Option<&str>,
        deltaref: Option<&str>,
    ) {
        let component = file_component(pathname, stat, contref, sigref, deltaref);
        self.files.insert(pathname.to_owned(), component);
    }

    /// store a prebuilt FILE component, used when carrying an unchanged
    /// entry forward from the previous generation
    pub fn add_file_component(&mut self, pathname: &str, component: Component) {
        self.files.insert(pathname.to_owned(), component);
    }

    /// the FILE component for a pathname
    pub fn find(&self, pathname: &str) -> Option<&Component> {
        self.files.get(pathname)
    }

    /// the previous FILE component for a pathname, but only if its recorded
    /// metadata matches the fresh lstat
    ///
    /// every compared field must be present on both sides and equal; an
    /// absent field is "not usable", never "zero", so it can never match.
    pub fn find_matching_inode(&self, pathname: &str, stat: &StatInfo) -> Option<&Component> {
        let prev = self.find(pathname)?;
        let prev_stat = parse_stat_component(prev.first_by_kind(Kind::Stat)?).ok()?;
        for get in MATCH_FIELDS {
            match (get(&prev_stat), get(stat)) {
                (Some(a), Some(b)) if a == b => {}
                _ => return None,
            }
        }
        Some(prev)
    }

    /// serialize the whole list as a FILELIST object
    ///
    /// children are sorted by pathname so the encoding is deterministic;
    /// lookup is by pathname, so the order carries no meaning.
    pub fn to_object(&self, object_id: &str) -> Object {
        let mut pathnames: Vec<&str> = self.paths().collect();
        pathnames.sort_unstable();
        let components = pathnames
            .into_iter()
            .map(|p| self.files[p].clone())
            .collect();
        Object::new(object_id, ObjectKind::FileList, components)
    }

    /// rebuild a filelist from a decoded FILELIST object
    pub fn from_object(object: &Object) -> Result<Filelist> {
        let mut filelist = Filelist::new();
        for file in object.find_by_kind(Kind::File) {
            if let Some(pathname) = file.first_str_by_kind(Kind::FileName) {
                filelist.add_file_component(pathname, file.clone());
            }
        }
        Ok(filelist)
    }
}
