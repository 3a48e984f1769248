use std::path::PathBuf;

/// Fieldless view of [`AssemblyError`], used by callers that only need to
/// branch on the failure class (exit codes, retries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    CorruptArchive,
    AmbiguousPolicy,
    InconsistentRelocation,
    WriteError,
    InvalidConfig,
    Cancelled,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("Input archive not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("Corrupt archive {archive}: {reason}")]
    CorruptArchive { archive: String, reason: String },
    #[error("Ambiguous merge policy for {path}: '{first}' and '{second}' are equally specific")]
    AmbiguousPolicy {
        path: String,
        first: String,
        second: String,
    },
    #[error("Inconsistent relocation of {namespace} at {location}: {reason}")]
    InconsistentRelocation {
        namespace: String,
        location: String,
        reason: String,
    },
    #[error("Failed to write {}: {reason}", path.display())]
    WriteError { path: PathBuf, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Assembly cancelled")]
    Cancelled,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssemblyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssemblyError::NotFound { .. } => ErrorKind::NotFound,
            AssemblyError::CorruptArchive { .. } => ErrorKind::CorruptArchive,
            AssemblyError::AmbiguousPolicy { .. } => ErrorKind::AmbiguousPolicy,
            AssemblyError::InconsistentRelocation { .. } => ErrorKind::InconsistentRelocation,
            AssemblyError::WriteError { .. } => ErrorKind::WriteError,
            AssemblyError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            AssemblyError::Cancelled => ErrorKind::Cancelled,
            AssemblyError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn corrupt(archive: impl ToString, reason: impl ToString) -> Self {
        AssemblyError::CorruptArchive {
            archive: archive.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AssemblyError::WriteError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn relocation(
        namespace: impl ToString,
        location: impl ToString,
        reason: impl ToString,
    ) -> Self {
        AssemblyError::InconsistentRelocation {
            namespace: namespace.to_string(),
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
