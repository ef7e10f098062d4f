use std::path::PathBuf;

/// error type for strata operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store not found at {0}")]
    NoStore(PathBuf),

    #[error("store already exists at {0}")]
    StoreExists(PathBuf),

    #[error("truncated varint at offset {0}")]
    TruncatedVarint(usize),

    #[error("malformed varint at offset {0}")]
    BadVarint(usize),

    #[error("unknown component kind {0}")]
    UnknownKind(u64),

    #[error("unknown object kind {0}")]
    UnknownObjectKind(u64),

    #[error("component payload truncated: need {needed} bytes at offset {pos}")]
    TruncatedPayload { pos: usize, needed: u64 },

    #[error("composite length mismatch for kind {kind}: children do not cover {declared} bytes")]
    LengthMismatch { kind: &'static str, declared: u64 },

    #[error("object is missing its {0} header component")]
    MissingObjectHeader(&'static str),

    #[error("block does not start with cookie")]
    BlockWithoutCookie,

    #[error("block has no components")]
    EmptyBlock,

    #[error("object {object_id} already mapped to block {existing}, refusing {conflicting}")]
    MappingConflict {
        object_id: String,
        existing: String,
        conflicting: String,
    },

    #[error("unknown generation: {0}")]
    UnknownGeneration(String),

    #[error("block {block_id} for object {object_id} is missing from the store")]
    MissingBlock {
        block_id: String,
        object_id: String,
    },

    #[error("delta computation failed: {0}")]
    Delta(String),

    #[error("lock contention on store")]
    LockContention,

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("invalid exclude pattern {pattern}: {message}")]
    BadExcludePattern { pattern: String, message: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
