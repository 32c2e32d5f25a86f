//! Match execution engine

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

use crate::error::{DecisionError, RuntimeAnomaly, Seat};
use crate::payoff::PayoffMatrix;
use crate::strategy::{DecisionContext, DecisionFunction, InterpretedStrategy, Move};

/// Result of a single round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub move_a: Move,
    pub move_b: Move,
    pub score_a: i32,
    pub score_b: i32,
    /// Decision failures in this round; the failing side was scored as a defect.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<RuntimeAnomaly>,
}

impl RoundRecord {
    pub fn move_of(&self, seat: Seat) -> Move {
        match seat {
            Seat::A => self.move_a,
            Seat::B => self.move_b,
        }
    }

    pub fn score_of(&self, seat: Seat) -> i32 {
        match seat {
            Seat::A => self.score_a,
            Seat::B => self.score_b,
        }
    }
}

/// Round-by-round record of one match, in play order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchHistory {
    pub player_a: String,
    pub player_b: String,
    pub rounds: Vec<RoundRecord>,
}

impl MatchHistory {
    pub fn new(player_a: impl Into<String>, player_b: impl Into<String>) -> Self {
        Self { player_a: player_a.into(), player_b: player_b.into(), rounds: Vec::new() }
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn player(&self, seat: Seat) -> &str {
        match seat {
            Seat::A => &self.player_a,
            Seat::B => &self.player_b,
        }
    }

    pub fn total(&self, seat: Seat) -> i64 {
        self.rounds.iter().map(|r| r.score_of(seat) as i64).sum()
    }

    pub fn total_a(&self) -> i64 {
        self.total(Seat::A)
    }

    pub fn total_b(&self) -> i64 {
        self.total(Seat::B)
    }

    pub fn moves(&self, seat: Seat) -> Vec<Move> {
        self.rounds.iter().map(|r| r.move_of(seat)).collect()
    }

    pub fn cooperations(&self, seat: Seat) -> usize {
        self.rounds.iter().filter(|r| r.move_of(seat) == Move::Cooperate).count()
    }

    pub fn defections(&self, seat: Seat) -> usize {
        self.round_count() - self.cooperations(seat)
    }

    /// `None` for a match with no rounds.
    pub fn cooperation_rate(&self, seat: Seat) -> Option<f64> {
        if self.rounds.is_empty() {
            return None;
        }
        Some(self.cooperations(seat) as f64 / self.round_count() as f64)
    }

    /// Running total after each round.
    pub fn cumulative(&self, seat: Seat) -> Vec<i64> {
        self.rounds
            .iter()
            .scan(0i64, |total, r| {
                *total += r.score_of(seat) as i64;
                Some(*total)
            })
            .collect()
    }

    /// Name of the higher scorer; `None` on a tie.
    pub fn winner(&self) -> Option<&str> {
        match self.total_a().cmp(&self.total_b()) {
            std::cmp::Ordering::Greater => Some(&self.player_a),
            std::cmp::Ordering::Less => Some(&self.player_b),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &RuntimeAnomaly> {
        self.rounds.iter().flat_map(|r| r.anomalies.iter())
    }
}

/// Play one round. Histories are read, never modified; the caller appends
/// the returned moves.
pub fn play_round(
    payoff: &PayoffMatrix,
    strategy_a: &InterpretedStrategy,
    strategy_b: &InterpretedStrategy,
    history_a: &[Move],
    history_b: &[Move],
    round: u32,
) -> RoundRecord {
    let mut anomalies = Vec::new();

    // Both sides decide on the same information: simultaneous moves
    let ctx_a = DecisionContext::new(history_a, history_b, round, payoff);
    let ctx_b = DecisionContext::new(history_b, history_a, round, payoff);
    let move_a = decide_or_defect(strategy_a, &ctx_a, Seat::A, &mut anomalies);
    let move_b = decide_or_defect(strategy_b, &ctx_b, Seat::B, &mut anomalies);

    let (score_a, score_b) = payoff.payoff(move_a, move_b);
    RoundRecord { round, move_a, move_b, score_a, score_b, anomalies }
}

/// Run a complete match between two strategies
///
/// Rounds are strictly sequential: round n sees everything through n-1.
/// Zero rounds gives an empty history.
pub fn run_match(
    payoff: &PayoffMatrix,
    strategy_a: &InterpretedStrategy,
    strategy_b: &InterpretedStrategy,
    rounds: u32,
) -> MatchHistory {
    let capacity = rounds as usize;
    let mut history_a: Vec<Move> = Vec::with_capacity(capacity);
    let mut history_b: Vec<Move> = Vec::with_capacity(capacity);
    let mut history = MatchHistory::new(strategy_a.name(), strategy_b.name());
    history.rounds.reserve(capacity);

    for round in 0..rounds {
        let record = play_round(payoff, strategy_a, strategy_b, &history_a, &history_b, round);
        history_a.push(record.move_a);
        history_b.push(record.move_b);
        history.rounds.push(record);
    }

    history
}

/// A failed or panicking decision counts as a defect.
fn decide_or_defect(
    strategy: &InterpretedStrategy,
    ctx: &DecisionContext<'_>,
    seat: Seat,
    anomalies: &mut Vec<RuntimeAnomaly>,
) -> Move {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| strategy.decide(ctx)))
        .unwrap_or_else(|payload| Err(DecisionError::Panicked(panic_message(payload.as_ref()))));

    match outcome {
        Ok(mv) => mv,
        Err(err) => {
            let anomaly = RuntimeAnomaly {
                round: ctx.round,
                seat,
                strategy: strategy.name().to_string(),
                message: err.to_string(),
            };
            warn!(%anomaly, "decision failed, scoring as defect");
            anomalies.push(anomaly);
            Move::Defect
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Provenance, StrategyBase, StrategyLogic, StrategySpec};
    use std::sync::Arc;

    const PAYOFF: PayoffMatrix = PayoffMatrix::classic();

    #[derive(Debug)]
    struct Explodes;

    impl DecisionFunction for Explodes {
        fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Move, DecisionError> {
            if ctx.round == 2 {
                panic!("boom at round {}", ctx.round);
            }
            Ok(Move::Cooperate)
        }
    }

    #[derive(Debug)]
    struct Refuses;

    impl DecisionFunction for Refuses {
        fn decide(&self, _ctx: &DecisionContext<'_>) -> Result<Move, DecisionError> {
            Err(DecisionError::Other("no move".into()))
        }
    }

    fn custom(name: &str, logic: Arc<dyn DecisionFunction>) -> InterpretedStrategy {
        let spec = StrategySpec::new(name, "custom");
        InterpretedStrategy::new(spec, StrategyLogic::Fallback(logic), Provenance::Fallback)
    }

    fn template(name: &str, base: StrategyBase) -> InterpretedStrategy {
        InterpretedStrategy::template(name, base)
    }

    #[test]
    fn test_cooperator_vs_defector() {
        let result = run_match(
            &PAYOFF,
            &template("nice", StrategyBase::AlwaysCooperate),
            &template("mean", StrategyBase::AlwaysDefect),
            5,
        );
        assert_eq!(result.round_count(), 5);
        assert_eq!(result.total_a(), 0);
        assert_eq!(result.total_b(), 25);
        assert_eq!(result.winner(), Some("mean"));
        assert_eq!(result.cumulative(Seat::B), vec![5, 10, 15, 20, 25]);
    }

    #[test]
    fn test_mutual_cooperation() {
        let result = run_match(
            &PAYOFF,
            &template("a", StrategyBase::AlwaysCooperate),
            &template("b", StrategyBase::AlwaysCooperate),
            17,
        );
        assert_eq!(result.total_a(), 3 * 17);
        assert_eq!(result.total_b(), 3 * 17);
        assert_eq!(result.defections(Seat::A) + result.defections(Seat::B), 0);
        assert_eq!(result.cooperation_rate(Seat::A), Some(1.0));
        assert_eq!(result.winner(), None);
    }

    #[test]
    fn test_tft_vs_defector_history() {
        let result = run_match(
            &PAYOFF,
            &template("tft", StrategyBase::TitForTat),
            &template("alld", StrategyBase::AlwaysDefect),
            4,
        );
        assert_eq!(result.moves(Seat::A), vec![Move::Cooperate, Move::Defect, Move::Defect, Move::Defect]);
        assert_eq!(result.total_a(), 0 + 1 + 1 + 1);
        assert_eq!(result.total_b(), 5 + 1 + 1 + 1);
    }

    #[test]
    fn test_zero_rounds() {
        let result = run_match(
            &PAYOFF,
            &template("a", StrategyBase::TitForTat),
            &template("b", StrategyBase::Pavlov),
            0,
        );
        assert!(result.rounds.is_empty());
        assert_eq!(result.total_a(), 0);
        assert_eq!(result.cooperation_rate(Seat::A), None);
    }

    #[test]
    fn test_play_round_reads_histories() {
        let history_a = vec![Move::Cooperate];
        let history_b = vec![Move::Defect];
        let record = play_round(
            &PAYOFF,
            &template("tft", StrategyBase::TitForTat),
            &template("tft2", StrategyBase::TitForTat),
            &history_a,
            &history_b,
            1,
        );
        assert_eq!(record.move_a, Move::Defect);
        assert_eq!(record.move_b, Move::Cooperate);
        assert_eq!((record.score_a, record.score_b), (5, 0));
        assert_eq!(history_a, vec![Move::Cooperate]);
        assert_eq!(history_b, vec![Move::Defect]);
    }

    #[test]
    fn test_panic_scored_as_defect() {
        let result = run_match(
            &PAYOFF,
            &custom("volatile", Arc::new(Explodes)),
            &template("nice", StrategyBase::AlwaysCooperate),
            4,
        );
        assert_eq!(result.round_count(), 4);
        assert_eq!(result.rounds[2].move_a, Move::Defect);
        assert_eq!(result.rounds[3].move_a, Move::Cooperate);

        let anomalies: Vec<_> = result.anomalies().collect();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].round, 2);
        assert_eq!(anomalies[0].seat, Seat::A);
        assert_eq!(anomalies[0].strategy, "volatile");
        assert!(anomalies[0].message.contains("boom at round 2"));
    }

    #[test]
    fn test_error_scored_as_defect_every_round() {
        let result = run_match(
            &PAYOFF,
            &template("nice", StrategyBase::AlwaysCooperate),
            &custom("stubborn", Arc::new(Refuses)),
            3,
        );
        assert_eq!(result.total_b(), 15);
        assert_eq!(result.anomalies().count(), 3);
        assert!(result.anomalies().all(|a| a.seat == Seat::B));
    }

    #[test]
    fn test_round_record_serialization_skips_empty_anomalies() {
        let record = play_round(
            &PAYOFF,
            &template("a", StrategyBase::AlwaysCooperate),
            &template("b", StrategyBase::AlwaysDefect),
            &[],
            &[],
            0,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("anomalies").is_none());
        assert_eq!(json["move_b"], "defect");
    }
}
