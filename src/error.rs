//! Error types with fix suggestions
//!
//! Nothing in the sync core is fatal: every variant here degrades to
//! "no state change" plus a diagnostic at the call site.

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    // ─────────────────────────────────────────────────────────────
    // Configuration (KSM-010 to KSM-011)
    // ─────────────────────────────────────────────────────────────

    #[error("KSM-010: Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("KSM-011: Config error: {reason}")]
    Config { reason: String },

    // ─────────────────────────────────────────────────────────────
    // Transport faults (KSM-020 to KSM-023)
    // ─────────────────────────────────────────────────────────────

    #[error("KSM-020: Connection to {endpoint} failed: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    #[error("KSM-021: Channel is not connected")]
    NotConnected,

    #[error("KSM-022: Transport error: {reason}")]
    Transport { reason: String },

    #[error("KSM-023: Sync client has stopped")]
    ClientStopped,

    // ─────────────────────────────────────────────────────────────
    // Decode faults (KSM-030 to KSM-031)
    // ─────────────────────────────────────────────────────────────

    #[error("KSM-030: Malformed inbound payload: {details}")]
    MalformedPayload { details: String },

    #[error("KSM-031: Invalid '{kind}' event: {details}")]
    InvalidEvent { kind: String, details: String },

    // ─────────────────────────────────────────────────────────────
    // Persistence faults (KSM-040)
    // ─────────────────────────────────────────────────────────────

    #[error("KSM-040: Filter storage error: {reason}")]
    Storage { reason: String },
}

impl SyncError {
    /// Transport faults are recovered by reconnecting, never surfaced
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectFailed { .. } | SyncError::NotConnected | SyncError::Transport { .. }
        )
    }

    /// Decode faults discard the message and leave the connection open
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            SyncError::MalformedPayload { .. } | SyncError::InvalidEvent { .. }
        )
    }
}

impl FixSuggestion for SyncError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            SyncError::InvalidEndpoint { .. } => {
                Some("Use host[:port] with scheme ws or wss, e.g. localhost:8000")
            }
            SyncError::Config { .. } => Some("Check config.toml syntax and field names"),
            SyncError::ConnectFailed { .. } => {
                Some("Verify the snapshot manager is running and reachable from this host")
            }
            SyncError::NotConnected => None,
            SyncError::Transport { .. } => None,
            SyncError::ClientStopped => Some("Start a new client; this one was shut down"),
            SyncError::MalformedPayload { .. } => {
                Some("The server sent a non-JSON frame; check server and client versions match")
            }
            SyncError::InvalidEvent { .. } => {
                Some("The event's fields do not match the expected shape for its kind")
            }
            SyncError::Storage { .. } => Some("Check the state directory exists and is writable"),
        }
    }
}
