use thiserror::Error;

/// Failures in configuration and persistence.
#[derive(Debug, Error)]
pub enum ShioriError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Typed failure reasons returned by coordinator operations.
///
/// None of these is fatal: the detection loop keeps polling and the
/// coordinator keeps serving requests after any of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No credential is present.
    #[error("not authenticated")]
    Unauthenticated,

    /// Nothing has been detected yet.
    #[error("no anime detected")]
    NoDetection,

    /// The remote catalog lookup could not resolve the title.
    #[error("no match found for \"{0}\"")]
    NotFound(String),

    /// Transport or protocol failure talking to the remote service.
    #[error("remote error: {0}")]
    Remote(String),

    /// Another sync or authorization attempt is already in flight.
    #[error("another attempt is in flight")]
    Busy,
}
