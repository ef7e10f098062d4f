//! strata - incremental backup engine
//!
//! a filesystem tree is decomposed into typed objects in an append-only,
//! content-addressed object store. objects are packed into compressed blocks;
//! an object-id to block-id mapping layer lets blocks be packed densely
//! without ever rewriting a reference. each backup run appends one generation
//! (a filelist plus timestamps) to the host block's linear history.
//!
//! # Core concepts
//!
//! - **Component**: the smallest tagged unit of the wire format, leaf bytes
//!   or nested components
//! - **Object**: an id+kind aggregate of components, the unit of content
//!   addressing
//! - **Block**: the unit exchanged with a storage backend, holding many
//!   objects (zstd-compressed on local disk)
//! - **Mapping**: the object-id to block-id index, flushed incrementally as
//!   OBJMAP blocks
//! - **Filelist**: the per-generation pathname index used to skip unchanged
//!   files
//! - **Generation**: one completed backup run, referenced from the host
//!   block
//!
//! # Example usage
//!
//! ```no_run
//! use std::path::Path;
//! use strata::{backup, BackupOptions, Config, LocalBackend, Store};
//!
//! let backend = LocalBackend::create(Path::new("/path/to/store")).unwrap();
//! let mut store = Store::new(backend, Config::default());
//! let report = backup(&mut store, &[Path::new("/home")], &BackupOptions::default()).unwrap();
//! println!("created generation {}", report.gen_id);
//! ```

mod backend;
mod block;
mod component;
mod config;
mod delta;
mod error;
mod filelist;
mod kind;
mod mapping;
mod object;
mod stat;
mod store;
mod varint;

pub mod ops;

pub use backend::{Backend, LocalBackend, StoreLock};
pub use block::{ObjectQueue, BLOCK_COOKIE};
pub use component::Component;
pub use config::Config;
pub use delta::{apply_delta, compute_delta, compute_signature};
pub use error::{Error, IoResultExt, Result};
pub use filelist::{file_component, Filelist};
pub use kind::{Kind, ObjectKind};
pub use mapping::Mapping;
pub use object::{random_id, HostBlock, Object, FORMAT_VERSION};
pub use ops::{
    backup, forget, generations, restore, show_generation, BackupOptions, BackupReport,
    FileEntry, ForgetStats, GenerationInfo, RestoreOptions, RestoreReport,
};
pub use stat::{create_stat_component, parse_stat_component, StatInfo};
pub use store::Store;
