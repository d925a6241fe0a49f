/// Crate-boundary error taxonomy: Protocol, Exclusivity, Not-found, I/O,
/// Shutdown, Time-out. Internal plumbing still returns plain
/// `Result<T, String>` where its only consumer immediately logs and
/// disconnects a connection; this type is for callers that need to match on
/// kind instead of parsing a message.
#[derive(Debug, thiserror::Error)]
pub enum HolderError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("session {name:?} has an active attachment")]
    Exclusivity { name: String },
    #[error("session {name:?} not found")]
    NotFound { name: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("shutdown already in progress")]
    ShuttingDown,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

impl From<holdpty_registry::RegistryError> for HolderError {
    fn from(e: holdpty_registry::RegistryError) -> Self {
        match e {
            holdpty_registry::RegistryError::InvalidName(n) => HolderError::Protocol(format!(
                "invalid session name {n:?}"
            )),
            holdpty_registry::RegistryError::NotFound { name } => HolderError::NotFound { name },
            holdpty_registry::RegistryError::Io(e) => HolderError::Io(e),
        }
    }
}
