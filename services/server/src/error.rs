use thiserror::Error;

/// Errors that can abort server startup or a lifecycle transition.
///
/// Per-request failures use [`store_core::StoreError`] instead; this type
/// is reserved for things that prevent the server from running at all.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("config: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("failed to start {subsystem}: {source}")]
    SubsystemStart {
        subsystem: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
