use crate::native::HandleKind;

/// Errors raised while allocating, marshalling or invoking native handles.
///
/// "Not found" outcomes (no chessboard, no markers) are never reported here;
/// they surface as a `false` flag or an empty result.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("native allocation of a {kind:?} handle failed")]
    Allocation { kind: HandleKind },

    #[error("implausible {what} reported by native {kind:?} handle: {value}")]
    ShapeMismatch {
        kind: HandleKind,
        what: &'static str,
        value: i64,
    },

    #[error("native outputs disagree on {what}: {left} vs {right}")]
    CountMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    #[error("invalid pixel buffer (expected {expected} pixels for {width}x{height}, got {got})")]
    InvalidImage {
        width: u32,
        height: u32,
        expected: usize,
        got: usize,
    },

    #[error("{kind:?} handle belongs to a different native backend")]
    ForeignHandle { kind: HandleKind },

    #[error("native {op} failed: {message}")]
    Native { op: &'static str, message: String },
}

impl BridgeError {
    /// Shorthand used by backends to wrap their own failures.
    pub fn native(op: &'static str, message: impl Into<String>) -> Self {
        Self::Native {
            op,
            message: message.into(),
        }
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
