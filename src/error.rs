//! Error type shared by every workflow module.
//!
//! Domain functions return [`EngineResult`]. The HTTP layer maps each
//! variant to a status code in `server.rs`; nothing on the request path
//! panics.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any write (empty cart, missing field, bad amount).
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A status change outside the transition table.
    #[error("illegal {entity} transition: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Uniqueness collision or a stale precondition (e.g. an already-applied
    /// rebalance suggestion).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn illegal_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::IllegalTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

/// Map a `query_row` miss to `NotFound`, passing every other error through.
pub(crate) fn or_not_found<T>(
    result: rusqlite::Result<T>,
    entity: &'static str,
    id: &str,
) -> EngineResult<T> {
    match result {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(EngineError::not_found(entity, id)),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = EngineError::not_found("order", "ord-1");
        assert_eq!(err.to_string(), "order not found: ord-1");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_or_not_found_maps_missing_row() {
        let res: rusqlite::Result<i64> = Err(rusqlite::Error::QueryReturnedNoRows);
        let err = or_not_found(res, "staff", "s-9").unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "staff", .. }));
    }
}
