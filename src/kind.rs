//! closed registries of component and object kinds
//!
//! the wire format never tags a component as leaf or composite; that shape is
//! a static property of its kind, shared by encoder and decoder. a kind code
//! is `base << 2` with the composite and reference flags in the low bits, and
//! the numbering is fixed: changing any code is a format break.

/// low bit set on composite kinds
pub const COMPOSITE_FLAG: u32 = 0x01;
/// low bit set on reference kinds (payload is an object or block id)
pub const REF_FLAG: u32 = 0x02;

/// component kinds
///
/// base codes 7-19 are the per-field stat kinds; 22 and 27 are retired and
/// must never be reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Kind {
    ObjId = 1 << 2,
    ObjKind = 2 << 2,
    BlkId = 3 << 2,
    FileChunk = 4 << 2,
    Object = (5 << 2) | COMPOSITE_FLAG,
    ObjMap = (6 << 2) | COMPOSITE_FLAG,
    StMode = 7 << 2,
    StIno = 8 << 2,
    StDev = 9 << 2,
    StNlink = 10 << 2,
    StUid = 11 << 2,
    StGid = 12 << 2,
    StSize = 13 << 2,
    StAtime = 14 << 2,
    StMtime = 15 << 2,
    StCtime = 16 << 2,
    StBlocks = 17 << 2,
    StBlksize = 18 << 2,
    StRdev = 19 << 2,
    ContRef = (20 << 2) | REF_FLAG,
    FileName = 23 << 2,
    SigData = 24 << 2,
    SigRef = (25 << 2) | REF_FLAG,
    GenRef = (26 << 2) | REF_FLAG,
    ObjRef = (28 << 2) | REF_FLAG,
    BlockRef = (29 << 2) | REF_FLAG,
    MapRef = (30 << 2) | REF_FLAG,
    FilePartRef = (31 << 2) | REF_FLAG,
    FormatVersion = 32 << 2,
    File = (33 << 2) | COMPOSITE_FLAG,
    FileListRef = (34 << 2) | REF_FLAG,
    ContMapRef = (35 << 2) | REF_FLAG,
    DeltaRef = (36 << 2) | REF_FLAG,
    DeltaData = 37 << 2,
    Stat = (38 << 2) | COMPOSITE_FLAG,
    GenStart = 39 << 2,
    GenEnd = 40 << 2,
    DeltaPartRef = (41 << 2) | REF_FLAG,
}

impl Kind {
    /// every registered kind, used for code lookup
    pub const ALL: [Kind; 38] = [
        Kind::ObjId,
        Kind::ObjKind,
        Kind::BlkId,
        Kind::FileChunk,
        Kind::Object,
        Kind::ObjMap,
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
        Kind::ContRef,
        Kind::FileName,
        Kind::SigData,
        Kind::SigRef,
        Kind::GenRef,
        Kind::ObjRef,
        Kind::BlockRef,
        Kind::MapRef,
        Kind::FilePartRef,
        Kind::FormatVersion,
        Kind::File,
        Kind::FileListRef,
        Kind::ContMapRef,
        Kind::DeltaRef,
        Kind::DeltaData,
        Kind::Stat,
        Kind::GenStart,
        Kind::GenEnd,
        Kind::DeltaPartRef,
    ];

    /// numeric wire code
    pub fn code(self) -> u32 {
        self as u32
    }

    /// look up a kind from its wire code
    pub fn from_code(code: u64) -> Option<Kind> {
        Kind::ALL.iter().copied().find(|k| u64::from(k.code()) == code)
    }

    /// is this kind's payload a nested component list
    pub fn is_composite(self) -> bool {
        self.code() & COMPOSITE_FLAG != 0
    }

    /// is this kind's payload an object or block id
    pub fn is_ref(self) -> bool {
        self.code() & REF_FLAG != 0
    }

    /// legacy registry name, for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Kind::ObjId => "OBJID",
            Kind::ObjKind => "OBJKIND",
            Kind::BlkId => "BLKID",
            Kind::FileChunk => "FILECHUNK",
            Kind::Object => "OBJECT",
            Kind::ObjMap => "OBJMAP",
            Kind::StMode => "ST_MODE",
            Kind::StIno => "ST_INO",
            Kind::StDev => "ST_DEV",
            Kind::StNlink => "ST_NLINK",
            Kind::StUid => "ST_UID",
            Kind::StGid => "ST_GID",
            Kind::StSize => "ST_SIZE",
            Kind::StAtime => "ST_ATIME",
            Kind::StMtime => "ST_MTIME",
            Kind::StCtime => "ST_CTIME",
            Kind::StBlocks => "ST_BLOCKS",
            Kind::StBlksize => "ST_BLKSIZE",
            Kind::StRdev => "ST_RDEV",
            Kind::ContRef => "CONTREF",
            Kind::FileName => "FILENAME",
            Kind::SigData => "SIGDATA",
            Kind::SigRef => "SIGREF",
            Kind::GenRef => "GENREF",
            Kind::ObjRef => "OBJREF",
            Kind::BlockRef => "BLOCKREF",
            Kind::MapRef => "MAPREF",
            Kind::FilePartRef => "FILEPARTREF",
            Kind::FormatVersion => "FORMATVERSION",
            Kind::File => "FILE",
            Kind::FileListRef => "FILELISTREF",
            Kind::ContMapRef => "CONTMAPREF",
            Kind::DeltaRef => "DELTAREF",
            Kind::DeltaData => "DELTADATA",
            Kind::Stat => "STAT",
            Kind::GenStart => "GENSTART",
            Kind::GenEnd => "GENEND",
            Kind::DeltaPartRef => "DELTAPARTREF",
        }
    }
}

/// object (storage aggregate) kinds
///
/// code 2 used to be INODE and is retired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ObjectKind {
    FilePart = 1,
    Generation = 3,
    Signature = 4,
    Host = 5,
    FileContents = 6,
    FileList = 7,
    Delta = 8,
    DeltaPart = 9,
    Dir = 10,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 9] = [
        ObjectKind::FilePart,
        ObjectKind::Generation,
        ObjectKind::Signature,
        ObjectKind::Host,
        ObjectKind::FileContents,
        ObjectKind::FileList,
        ObjectKind::Delta,
        ObjectKind::DeltaPart,
        ObjectKind::Dir,
    ];

    /// numeric wire code
    pub fn code(self) -> u32 {
        self as u32
    }

    /// look up an object kind from its wire code
    pub fn from_code(code: u64) -> Option<ObjectKind> {
        ObjectKind::ALL
            .iter()
            .copied()
            .find(|k| u64::from(k.code()) == code)
    }

    /// legacy registry name, for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::FilePart => "FILEPART",
            ObjectKind::Generation => "GEN",
            ObjectKind::Signature => "SIG",
            ObjectKind::Host => "HOST",
            ObjectKind::FileContents => "FILECONTENTS",
            ObjectKind::FileList => "FILELIST",
            ObjectKind::Delta => "DELTA",
            ObjectKind::DeltaPart => "DELTAPART",
            ObjectKind::Dir => "DIR",
        }
    }
}
