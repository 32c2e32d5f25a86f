//! Strategy definitions and execution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::DecisionError;
use crate::payoff::PayoffMatrix;
use crate::random::SeededRng;
use crate::rule::CompiledRule;

/// A move in the Prisoner's Dilemma
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Move {
    Cooperate,
    Defect,
}

impl Move {
    pub fn flip(self) -> Self {
        match self {
            Move::Cooperate => Move::Defect,
            Move::Defect => Move::Cooperate,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Move::Cooperate => f.write_str("cooperate"),
            Move::Defect => f.write_str("defect"),
        }
    }
}

/// A named, free-form strategy description as submitted by a caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub name: String,
    pub text: String,
}

impl StrategySpec {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(), text: text.into() }
    }
}

/// Everything a decision function may look at when choosing a move.
#[derive(Clone, Copy, Debug)]
pub struct DecisionContext<'a> {
    pub own_history: &'a [Move],
    pub opponent_history: &'a [Move],
    /// 0-indexed
    pub round: u32,
    pub payoff: &'a PayoffMatrix,
}

impl<'a> DecisionContext<'a> {
    pub fn new(
        own_history: &'a [Move],
        opponent_history: &'a [Move],
        round: u32,
        payoff: &'a PayoffMatrix,
    ) -> Self {
        Self { own_history, opponent_history, round, payoff }
    }

    pub fn own_last(&self) -> Option<Move> {
        self.own_history.last().copied()
    }

    pub fn opponent_last(&self) -> Option<Move> {
        self.opponent_history.last().copied()
    }

    /// 1.0 before any move has been played.
    pub fn own_cooperation_rate(&self) -> f64 {
        cooperation_rate(self.own_history)
    }

    pub fn opponent_cooperation_rate(&self) -> f64 {
        cooperation_rate(self.opponent_history)
    }

    pub fn own_total_score(&self) -> i64 {
        self.payoff.total_score(self.own_history, self.opponent_history)
    }

    pub fn opponent_total_score(&self) -> i64 {
        self.payoff.total_score(self.opponent_history, self.own_history)
    }
}

fn cooperation_rate(history: &[Move]) -> f64 {
    if history.is_empty() {
        return 1.0;
    }
    let cooperations = history.iter().filter(|m| **m == Move::Cooperate).count();
    cooperations as f64 / history.len() as f64
}

fn count_defects(history: &[Move]) -> usize {
    history.iter().filter(|m| **m == Move::Defect).count()
}

/// Deterministic mapping from match state to a move.
///
/// Implementations must be pure: the same context always yields the same
/// result. Matches run concurrently and reports must be reproducible.
pub trait DecisionFunction: fmt::Debug + Send + Sync {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Move, DecisionError>;
}

/// Built-in strategy templates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyBase {
    /// Copy opponent's last move. Start with cooperate.
    TitForTat,
    AlwaysDefect,
    AlwaysCooperate,
    /// Cooperate until opponent defects once, then always defect.
    GrimTrigger,
    /// Win-stay, lose-switch.
    Pavlov,
    /// Tit-for-Tat but start with defect.
    SuspiciousTitForTat,
    /// Defect only if opponent defected twice in a row.
    TitForTwoTats,
    /// Retaliate with increasing defection streaks, then forgive.
    Gradual,
    /// Seeded coin flip each round.
    Random,
}

impl StrategyBase {
    pub const ALL: [StrategyBase; 9] = [
        StrategyBase::TitForTat,
        StrategyBase::AlwaysDefect,
        StrategyBase::AlwaysCooperate,
        StrategyBase::GrimTrigger,
        StrategyBase::Pavlov,
        StrategyBase::SuspiciousTitForTat,
        StrategyBase::TitForTwoTats,
        StrategyBase::Gradual,
        StrategyBase::Random,
    ];

    /// Wire name, as used by translation responses.
    pub fn name(self) -> &'static str {
        match self {
            StrategyBase::TitForTat => "tit_for_tat",
            StrategyBase::AlwaysDefect => "always_defect",
            StrategyBase::AlwaysCooperate => "always_cooperate",
            StrategyBase::GrimTrigger => "grim_trigger",
            StrategyBase::Pavlov => "pavlov",
            StrategyBase::SuspiciousTitForTat => "suspicious_tit_for_tat",
            StrategyBase::TitForTwoTats => "tit_for_two_tats",
            StrategyBase::Gradual => "gradual",
            StrategyBase::Random => "random",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|base| base.name() == name)
    }

    pub fn describe(self) -> &'static str {
        match self {
            StrategyBase::TitForTat => "Copies opponent's last move. Starts by cooperating.",
            StrategyBase::AlwaysDefect => "Never cooperates. Always defects.",
            StrategyBase::AlwaysCooperate => "Never defects. Always cooperates.",
            StrategyBase::GrimTrigger => "Cooperates until betrayed, then always defects.",
            StrategyBase::Pavlov => "Repeats move if outcome was good, switches if bad.",
            StrategyBase::SuspiciousTitForTat => "Like Tit-for-Tat, but starts with defect.",
            StrategyBase::TitForTwoTats => "Only retaliates after two consecutive defections.",
            StrategyBase::Gradual => "Retaliates with increasing severity, then forgives.",
            StrategyBase::Random => "Cooperates or defects with equal odds, reproducibly.",
        }
    }
}

impl DecisionFunction for StrategyBase {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Move, DecisionError> {
        Ok(execute_template(*self, ctx, 0))
    }
}

/// Execute a template for one round
pub fn execute_template(base: StrategyBase, ctx: &DecisionContext<'_>, seed: u64) -> Move {
    match base {
        StrategyBase::TitForTat => ctx.opponent_last().unwrap_or(Move::Cooperate),
        StrategyBase::AlwaysDefect => Move::Defect,
        StrategyBase::AlwaysCooperate => Move::Cooperate,
        StrategyBase::GrimTrigger => {
            if count_defects(ctx.opponent_history) > 0 {
                Move::Defect
            } else {
                Move::Cooperate
            }
        }
        StrategyBase::Pavlov => execute_pavlov(ctx),
        StrategyBase::SuspiciousTitForTat => ctx.opponent_last().unwrap_or(Move::Defect),
        StrategyBase::TitForTwoTats => match ctx.opponent_history {
            [.., Move::Defect, Move::Defect] => Move::Defect,
            _ => Move::Cooperate,
        },
        StrategyBase::Gradual => {
            // After N opponent defections we owe N(N+1)/2 of our own
            let theirs = count_defects(ctx.opponent_history);
            let owed = theirs * (theirs + 1) / 2;
            if count_defects(ctx.own_history) < owed {
                Move::Defect
            } else {
                Move::Cooperate
            }
        }
        StrategyBase::Random => {
            if SeededRng::for_round(seed, ctx.round).next_percent() < 50 {
                Move::Cooperate
            } else {
                Move::Defect
            }
        }
    }
}

/// Win-stay, lose-switch. A round is a win when it paid at least R.
fn execute_pavlov(ctx: &DecisionContext<'_>) -> Move {
    let (Some(mine), Some(theirs)) = (ctx.own_last(), ctx.opponent_last()) else {
        return Move::Cooperate;
    };
    let (score, _) = ctx.payoff.payoff(mine, theirs);
    if score >= ctx.payoff.reward() {
        mine
    } else {
        mine.flip()
    }
}

/// Where a strategy's logic came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Cached,
    FreshlyInterpreted,
    Fallback,
}

/// Decision logic behind an interpreted strategy.
#[derive(Clone, Debug)]
pub enum StrategyLogic {
    /// Translator resolved the text to a vetted built-in.
    Template { base: StrategyBase, seed: u64 },
    /// Translator produced a rule that passed validation.
    Interpreted(CompiledRule),
    /// Interpretation failed; the interpreter's fallback plays instead.
    Fallback(Arc<dyn DecisionFunction>),
}

impl PartialEq for StrategyLogic {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                StrategyLogic::Template { base: a, seed: sa },
                StrategyLogic::Template { base: b, seed: sb },
            ) => a == b && sa == sb,
            (StrategyLogic::Interpreted(a), StrategyLogic::Interpreted(b)) => a == b,
            (StrategyLogic::Fallback(a), StrategyLogic::Fallback(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl StrategyLogic {
    pub fn describe(&self) -> String {
        match self {
            StrategyLogic::Template { base, .. } => format!("{}: {}", base.name(), base.describe()),
            StrategyLogic::Interpreted(rule) => rule.to_string(),
            StrategyLogic::Fallback(inner) => format!("fallback ({inner:?})"),
        }
    }
}

impl DecisionFunction for StrategyLogic {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Move, DecisionError> {
        match self {
            StrategyLogic::Template { base, seed } => Ok(execute_template(*base, ctx, *seed)),
            StrategyLogic::Interpreted(rule) => rule.evaluate(ctx),
            StrategyLogic::Fallback(inner) => inner.decide(ctx),
        }
    }
}

/// A [`StrategySpec`] bound to its decision logic.
#[derive(Clone, Debug)]
pub struct InterpretedStrategy {
    pub spec: StrategySpec,
    pub logic: Arc<StrategyLogic>,
    pub provenance: Provenance,
    /// Why interpretation fell back, when it did.
    pub fallback_reason: Option<String>,
}

impl InterpretedStrategy {
    pub fn new(spec: StrategySpec, logic: StrategyLogic, provenance: Provenance) -> Self {
        Self { spec, logic: Arc::new(logic), provenance, fallback_reason: None }
    }

    /// Wrap a built-in template directly, bypassing translation.
    pub fn template(name: impl Into<String>, base: StrategyBase) -> Self {
        let spec = StrategySpec::new(name, base.name());
        Self::new(spec, StrategyLogic::Template { base, seed: 0 }, Provenance::FreshlyInterpreted)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// True when the logic is the fallback, whether fresh or from cache.
    pub fn is_degraded(&self) -> bool {
        matches!(*self.logic, StrategyLogic::Fallback(_))
    }

    /// Same logic, presented under another spec and provenance.
    pub(crate) fn rebind(&self, spec: StrategySpec, provenance: Provenance) -> Self {
        Self {
            spec,
            logic: Arc::clone(&self.logic),
            provenance,
            fallback_reason: self.fallback_reason.clone(),
        }
    }
}

impl DecisionFunction for InterpretedStrategy {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Move, DecisionError> {
        self.logic.decide(ctx)
    }
}
