pub mod reader;
pub mod scanner;
pub mod types;

pub use reader::ArchiveReader;
pub use scanner::ArchiveScanner;
pub use types::{ScanConfig, ScanSummary, ScannedEntry};
