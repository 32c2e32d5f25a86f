//! Error taxonomy for the arena.
//!
//! Only [`ConfigurationError`] ever escapes `run_tournament`. Interpretation
//! failures are absorbed by the fallback policy, runtime anomalies are
//! recorded in the match that produced them, and [`CacheConflict`] signals a
//! broken caller contract on the public cache API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::CacheKey;
use crate::rule::RuleError;

/// Payoff table does not satisfy the dilemma ordering.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PayoffError {
    #[error("payoffs must satisfy T > R > P > S (got T={temptation}, R={reward}, P={punishment}, S={sucker})")]
    Ordering {
        temptation: i32,
        reward: i32,
        punishment: i32,
        sucker: i32,
    },
}

/// Rejected tournament setup. Raised before any match runs.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("duplicate strategy name `{name}`")]
    DuplicateStrategyName { name: String },

    #[error("strategy name must not be blank")]
    BlankStrategyName,

    #[error("rounds per match must be non-negative (got {value})")]
    NegativeRounds { value: i64 },

    #[error("rounds per match {requested} exceeds the limit of {max}")]
    TooManyRounds { requested: u64, max: u32 },

    #[error(transparent)]
    Payoff(#[from] PayoffError),
}

/// Failure while turning strategy text into a decision function.
///
/// Always recovered locally by substituting the fallback strategy.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InterpretationError {
    #[error("translation failed: {0}")]
    Translation(#[from] TranslationError),

    #[error("translator declined the strategy: {reason}")]
    Declined { reason: String },

    #[error("unsafe rule: {0}")]
    UnsafeRule(#[from] RuleError),

    #[error("strategy text is {len} bytes, limit is {max}")]
    TextTooLong { len: usize, max: usize },
}

/// Errors reported by a [`Translator`](crate::translator::Translator).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("translation service unavailable: {0}")]
    Unavailable(String),

    #[error("translation timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("malformed translation response: {0}")]
    Malformed(String),
}

impl TranslationError {
    /// Transport-level failures are worth one more attempt; a malformed
    /// answer will not improve on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, TranslationError::Unavailable(_) | TranslationError::Timeout { .. })
    }
}

/// Attempt to cache a different interpretation under an existing key.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cache already holds a different interpretation for `{key}`")]
pub struct CacheConflict {
    pub key: CacheKey,
}

/// A decision function failed to produce a move.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    #[error("division by zero in `{expr}`")]
    DivisionByZero { expr: String },

    #[error("decision function panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// Which side of a match a record refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seat {
    A,
    B,
}

/// A decision function misbehaved during play.
///
/// The round is scored as if the offending player defected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("round {round}: strategy `{strategy}` (seat {seat:?}) failed: {message}")]
pub struct RuntimeAnomaly {
    pub round: u32,
    pub seat: Seat,
    pub strategy: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(TranslationError::Unavailable("down".into()).is_transient());
        assert!(TranslationError::Timeout { after: Duration::from_millis(5) }.is_transient());
        assert!(!TranslationError::Malformed("bad json".into()).is_transient());
    }

    #[test]
    fn test_payoff_error_wraps_into_configuration() {
        let err: ConfigurationError = PayoffError::Ordering {
            temptation: 1,
            reward: 3,
            punishment: 1,
            sucker: 0,
        }
        .into();
        assert!(err.to_string().contains("T > R > P > S"));
    }

    #[test]
    fn test_anomaly_display() {
        let anomaly = RuntimeAnomaly {
            round: 4,
            seat: Seat::B,
            strategy: "broken".into(),
            message: "boom".into(),
        };
        assert_eq!(anomaly.to_string(), "round 4: strategy `broken` (seat B) failed: boom");
    }
}
