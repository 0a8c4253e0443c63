use thiserror::Error;

/// Rejection of the trigger parameters. Each variant maps to one validation rule,
/// checked in declaration order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Param \"batbal_uids\" and \"batbal_amounts\" have different lengths ({ids} vs {amounts})")]
    LengthMismatch { ids: usize, amounts: usize },

    #[error("Param \"batbal_uids\" is invalid: {0:?}")]
    InvalidIds(String),

    #[error("Param \"batbal_amounts\" is invalid: {0:?}")]
    InvalidAmounts(String),

    #[error("Param \"batbal_action\" is invalid: {0:?}")]
    InvalidAction(String),

    #[error("Param \"batbal_asset\" is invalid: {0:?}")]
    InvalidAsset(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreflightViolation {
    #[error("Some players are not in the faction: {0}")]
    IneligibleTarget(String),

    #[error("Amounts to give must be positive: {target_id} has {amount}")]
    NonPositiveGiveAmount { target_id: String, amount: i64 },
}

/// Failure of a single step. Carries the raw diagnostic from the transport.
#[derive(Error, Debug)]
pub enum StepFailure {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Network error: {status} {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Unexpected server response: {0}")]
    UnexpectedResponse(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Receiver id is not a valid integer: {0}")]
    InvalidReceiver(String),

    #[error("Adjustment was rejected: {0}")]
    Rejected(String),

    #[error("UI interaction failed: {0}")]
    Interaction(String),

    #[error("Confirmation channel closed: {0}")]
    ChannelClosed(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error for key {key:?}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize batch state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(
        "An unfinished Batch Balance operation was found that doesn't match the URL parameters. \
         To resume it, clear the URL parameters and reload. \
         To discard it, clear the saved data and reload."
    )]
    ConflictingBatch,

    #[error(transparent)]
    Preflight(#[from] PreflightViolation),

    #[error("Step {index} for player {target_id} failed: {source}")]
    Step {
        index: usize,
        target_id: String,
        #[source]
        source: StepFailure,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Runner is busy: {0}")]
    Busy(String),

    #[error("Deleting saved Batch Balance data requires explicit confirmation")]
    ClearNotConfirmed,
}

impl BatchError {
    /// True when the batch survives the error and the next start or prepare resumes it.
    pub fn is_resumable(&self) -> bool {
        matches!(self, BatchError::Step { .. } | BatchError::Storage(_))
    }
}
