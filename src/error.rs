// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// `Unresolved` and `Unavailable` are availability tags carried on results and
// never appear here. Everything below is returned as a value; nothing in the
// core logs an error and carries on.

use uuid::Uuid;

/// Errors returned by the core engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// An indicator or window read needs more points than the series has.
    #[error("insufficient data: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    /// A parameter is out of its valid domain (e.g. `n == 0`).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A tick arrived with a timestamp older than the last accepted tick.
    #[error("out-of-order tick for {symbol}: last {last}, got {got}")]
    OutOfOrderTick { symbol: String, last: i64, got: i64 },

    /// No registered indicator carries this identity.
    #[error("unknown indicator: {0}")]
    UnknownIndicator(Uuid),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_counts() {
        let e = EngineError::InsufficientData { have: 3, need: 7 };
        assert_eq!(e.to_string(), "insufficient data: have 3, need 7");
        let e = EngineError::invalid("n must be positive");
        assert_eq!(e.to_string(), "invalid parameter: n must be positive");
    }
}
