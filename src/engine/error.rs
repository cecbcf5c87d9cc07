use ulid::Ulid;

use crate::model::Ms;

/// Store mutation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WriteOp::Insert => "insert",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        })
    }
}

#[derive(Debug)]
pub enum EngineError {
    InvalidRange { start: Ms, stop: Ms },
    SubjectNotFound(Ulid),
    AlreadyExists(Ulid),
    StoreQueryFailed(String),
    StoreWriteFailed {
        op: WriteOp,
        id: Ulid,
        reason: String,
    },
    /// Stored intervals already overlapped before the call.
    PartitionViolated(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange { start, stop } => {
                write!(f, "invalid range: start {start} is not before stop {stop}")
            }
            EngineError::SubjectNotFound(id) => write!(f, "subject not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::StoreQueryFailed(e) => write!(f, "store query failed: {e}"),
            EngineError::StoreWriteFailed { op, id, reason } => {
                write!(f, "store {op} failed for {id}: {reason}")
            }
            EngineError::PartitionViolated(id) => {
                write!(f, "stored intervals of subject {id} overlap")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
