pub mod error;
pub mod models;

// Re-export commonly used types
pub use error::{AssemblyError, ErrorKind, Result};
pub use models::*;
