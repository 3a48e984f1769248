pub mod assembler;
pub mod classify;
pub mod logging;
pub mod manifest;
pub mod policy;
pub mod relocate;
pub mod resolve;
pub mod writer;

pub use assembler::{Assembler, AssemblyReport, AssemblyState};
pub use classify::classify;
pub use policy::PolicyTable;
pub use relocate::{RelocationStats, Relocator};
pub use resolve::{Resolution, ResolveStats, Resolver};
pub use writer::{ArchiveWriter, WriteSummary};

pub use shadejar_api::{AssemblyConfig, AssemblyError, ErrorKind, Result};
