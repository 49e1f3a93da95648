use thiserror::Error;

/// Core error type for the Storefront runtime
///
/// The variants form the failure taxonomy shared by backends, the job
/// dispatcher and the refinement engine. Backends map their domain
/// failures onto these classes; the dispatcher decides per class whether
/// a failure is isolated to one backend or fatal for the whole job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The network is unavailable or a remote service could not be reached
    #[error("No network: {0}")]
    NoNetwork(String),

    /// Persisted or downloaded data could not be parsed
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// No backend is able to satisfy the requested action
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Authentication with a remote service failed
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Required integrity data (signatures, checksums) is missing
    #[error("No security data: {0}")]
    NoSecurity(String),

    /// The job was cancelled by the caller
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A download could not be completed
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Local state could not be written
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The backend set or job parameters are misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic failure
    #[error("{0}")]
    Failed(String),
}

impl CoreError {
    /// Whether this failure aborts a whole refinement pass.
    ///
    /// Malformed persisted caches and unwritable local state are
    /// infrastructure failures; a backend hitting one cannot make
    /// progress on any entity, so the refinement engine propagates the
    /// error instead of continuing with the remaining flags.
    pub fn is_fatal_for_refinement(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidFormat(_) | CoreError::WriteFailed(_)
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::InvalidFormat(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Failed(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Failed(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Failed(err.to_string())
    }
}
