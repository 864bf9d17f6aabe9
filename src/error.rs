use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum GlueError {
    /// No external transceiver is configured. OTG is impossible without one,
    /// so attach aborts.
    #[error("no transceiver configured")]
    NoTransceiver,

    /// The controller is not bound (attach has not completed, or detach has
    /// begun). The event was dropped; callers retry or rely on a later
    /// coalesced event.
    #[error("controller not ready")]
    NotReady,

    /// A bounded register poll did not settle. Non-fatal: transitions log
    /// this and proceed.
    #[error("register poll timed out after {elapsed_ms} ms")]
    RegisterTimeout { elapsed_ms: u64 },

    /// A controller instance is already attached to this glue.
    #[error("controller already attached")]
    AlreadyAttached,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Transceiver or companion PHY fault surfaced at attach time.
    #[error("transceiver error: {0}")]
    Phy(String),
}

/// Result type alias for glue operations
pub type Result<T> = std::result::Result<T, GlueError>;
