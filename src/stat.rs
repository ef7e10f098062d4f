//! inode metadata and its STAT component encoding
//!
//! a STAT component is a composite of per-field varint leaves. a field the
//! filesystem does not supply is omitted on encode and comes back as `None`;
//! it is never written as zero, so comparisons cannot mistake "absent" for
//! "equal to zero".

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::sys::stat::SFlag;

use crate::component::Component;
use crate::error::{Error, IoResultExt, Result};
use crate::kind::Kind;

/// normalized lstat fields
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatInfo {
    pub mode: Option<u64>,
    pub ino: Option<u64>,
    pub dev: Option<u64>,
    pub nlink: Option<u64>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub size: Option<u64>,
    pub atime: Option<u64>,
    pub mtime: Option<u64>,
    pub ctime: Option<u64>,
    pub blocks: Option<u64>,
    pub blksize: Option<u64>,
    pub rdev: Option<u64>,
}

impl StatInfo {
    /// lstat a path (symlinks are not followed)
    pub fn capture(path: &Path) -> Result<StatInfo> {
        let meta = std::fs::symlink_metadata(path).with_path(path)?;
        Ok(StatInfo::from_metadata(&meta))
    }

    /// build from already-fetched metadata
    pub fn from_metadata(meta: &Metadata) -> StatInfo {
        StatInfo {
            mode: Some(u64::from(meta.mode())),
            ino: Some(meta.ino()),
            dev: Some(meta.dev()),
            nlink: Some(meta.nlink()),
            uid: Some(u64::from(meta.uid())),
            gid: Some(u64::from(meta.gid())),
            size: Some(meta.size()),
            // timestamps before the epoch cannot be varint-encoded; treat
            // them as absent
            atime: u64::try_from(meta.atime()).ok(),
            mtime: u64::try_from(meta.mtime()).ok(),
            ctime: u64::try_from(meta.ctime()).ok(),
            blocks: Some(meta.blocks()),
            blksize: Some(meta.blksize()),
            rdev: Some(meta.rdev()),
        }
    }

    fn file_type_bits(&self) -> Option<u64> {
        self.mode.map(|m| m & u64::from(SFlag::S_IFMT.bits()))
    }

    pub fn is_dir(&self) -> bool {
        self.file_type_bits() == Some(u64::from(SFlag::S_IFDIR.bits()))
    }

    pub fn is_regular(&self) -> bool {
        self.file_type_bits() == Some(u64::from(SFlag::S_IFREG.bits()))
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type_bits() == Some(u64::from(SFlag::S_IFLNK.bits()))
    }

    /// permission bits only, for chmod on restore
    pub fn permissions(&self) -> Option<u32> {
        self.mode.map(|m| (m & 0o7777) as u32)
    }
}

/// ordered (field kind, accessor) table shared by encode and parse
const FIELDS: [Kind; 13] = [
    Kind::StMode,
    Kind::StIno,
    Kind::StDev,
    Kind::StNlink,
    Kind::StUid,
    Kind::StGid,
    Kind::StSize,
    Kind::StAtime,
    Kind::StMtime,
    Kind::StCtime,
    Kind::StBlocks,
    Kind::StBlksize,
    Kind::StRdev,
];

fn field(st: &StatInfo, kind: Kind) -> Option<u64> {
    match kind {
        Kind::StMode => st.mode,
        Kind::StIno => st.ino,
        Kind::StDev => st.dev,
        Kind::StNlink => st.nlink,
        Kind::StUid => st.uid,
        Kind::StGid => st.gid,
        Kind::StSize => st.size,
        Kind::StAtime => st.atime,
        Kind::StMtime => st.mtime,
        Kind::StCtime => st.ctime,
        Kind::StBlocks => st.blocks,
        Kind::StBlksize => st.blksize,
        Kind::StRdev => st.rdev,
        _ => None,
    }
}

fn field_mut(st: &mut StatInfo, kind: Kind) -> Option<&mut Option<u64>> {
    match kind {
        Kind::StMode => Some(&mut st.mode),
        Kind::StIno => Some(&mut st.ino),
        Kind::StDev => Some(&mut st.dev),
        Kind::StNlink => Some(&mut st.nlink),
        Kind::StUid => Some(&mut st.uid),
        Kind::StGid => Some(&mut st.gid),
        Kind::StSize => Some(&mut st.size),
        Kind::StAtime => Some(&mut st.atime),
        Kind::StMtime => Some(&mut st.mtime),
        Kind::StCtime => Some(&mut st.ctime),
        Kind::StBlocks => Some(&mut st.blocks),
        Kind::StBlksize => Some(&mut st.blksize),
        Kind::StRdev => Some(&mut st.rdev),
        _ => None,
    }
}

/// build a STAT component; absent fields are omitted
pub fn create_stat_component(st: &StatInfo) -> Component {
    let children = FIELDS
        .iter()
        .filter_map(|&kind| field(st, kind).map(|value| Component::varint(kind, value)))
        .collect();
    Component::composite(Kind::Stat, children)
}

/// parse a STAT component back into StatInfo
///
/// children that are not stat fields mean the component is corrupt.
pub fn parse_stat_component(component: &Component) -> Result<StatInfo> {
    if component.kind() != Kind::Stat {
        return Err(Error::UnknownKind(u64::from(component.kind().code())));
    }
    let children = component
        .children()
        .ok_or(Error::LengthMismatch {
            kind: Kind::Stat.name(),
            declared: 0,
        })?;
    let mut st = StatInfo::default();
    for child in children {
        let slot = field_mut(&mut st, child.kind())
            .ok_or(Error::UnknownKind(u64::from(child.kind().code())))?;
        *slot = child.varint_value();
    }
    Ok(st)
}
