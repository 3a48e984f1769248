pub mod archive;
pub mod config;
pub mod entry;
pub mod manifest;
pub mod policy;
pub mod relocation;

pub use archive::*;
pub use config::*;
pub use entry::*;
pub use manifest::*;
pub use policy::*;
pub use relocation::*;
