//! high-level operations on a backup store

mod backup;
mod forget;
mod generations;
mod restore;

pub use backup::{backup, BackupOptions, BackupReport};
pub use forget::{forget, ForgetStats};
pub use generations::{generations, show_generation, FileEntry, GenerationInfo};
pub use restore::{restore, RestoreOptions, RestoreReport};
