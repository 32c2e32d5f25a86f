//! Payoff matrix for the Prisoner's Dilemma

use serde::{Deserialize, Serialize};

use crate::error::PayoffError;
use crate::strategy::Move;

/// The four outcome payoffs (T, R, P, S).
///
/// Constructed once per tournament and never mutated afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPayoff")]
pub struct PayoffMatrix {
    temptation: i32,
    reward: i32,
    punishment: i32,
    sucker: i32,
}

#[derive(Deserialize)]
struct RawPayoff {
    temptation: i32,
    reward: i32,
    punishment: i32,
    sucker: i32,
}

impl TryFrom<RawPayoff> for PayoffMatrix {
    type Error = PayoffError;

    fn try_from(raw: RawPayoff) -> Result<Self, Self::Error> {
        Self::new(raw.temptation, raw.reward, raw.punishment, raw.sucker)
    }
}

impl PayoffMatrix {
    /// Build a matrix, rejecting tables that break T > R > P > S.
    pub fn new(temptation: i32, reward: i32, punishment: i32, sucker: i32) -> Result<Self, PayoffError> {
        if temptation > reward && reward > punishment && punishment > sucker {
            Ok(Self { temptation, reward, punishment, sucker })
        } else {
            Err(PayoffError::Ordering { temptation, reward, punishment, sucker })
        }
    }

    /// Axelrod's table: T=5, R=3, P=1, S=0.
    pub const fn classic() -> Self {
        Self { temptation: 5, reward: 3, punishment: 1, sucker: 0 }
    }

    pub fn temptation(&self) -> i32 {
        self.temptation
    }

    pub fn reward(&self) -> i32 {
        self.reward
    }

    pub fn punishment(&self) -> i32 {
        self.punishment
    }

    pub fn sucker(&self) -> i32 {
        self.sucker
    }

    /// Returns (score_a, score_b)
    pub fn payoff(&self, a: Move, b: Move) -> (i32, i32) {
        match (a, b) {
            (Move::Cooperate, Move::Cooperate) => (self.reward, self.reward),
            (Move::Cooperate, Move::Defect) => (self.sucker, self.temptation),
            (Move::Defect, Move::Cooperate) => (self.temptation, self.sucker),
            (Move::Defect, Move::Defect) => (self.punishment, self.punishment),
        }
    }

    /// Total score of `own` against `opponent` over their common prefix.
    pub fn total_score(&self, own: &[Move], opponent: &[Move]) -> i64 {
        own.iter()
            .zip(opponent)
            .map(|(&mine, &theirs)| self.payoff(mine, theirs).0 as i64)
            .sum()
    }
}

impl Default for PayoffMatrix {
    fn default() -> Self {
        Self::classic()
    }
}
