//! Core of the Strategy Arena
//!
//! Iterated Prisoner's Dilemma where each competitor is described in free
//! text. Two halves:
//! - Strategy Interpreter: text → validated, cached decision logic, with a
//!   fallback when translation fails
//! - Tournament Engine: rounds, matches and round-robin tournaments over
//!   interpreted strategies, deterministic and parallel-safe
//!
//! The library logs through `tracing` and never installs a subscriber.

mod cache;
mod config;
mod error;
mod game;
mod interpreter;
mod pairing;
mod payoff;
mod random;
pub mod rule;
mod strategy;
mod tournament;
pub mod translator;

pub use cache::{CacheKey, InterpretationCache, Inserted};
pub use config::{InterpreterConfig, TournamentConfig};
pub use error::{
    CacheConflict, ConfigurationError, DecisionError, InterpretationError, PayoffError, RuntimeAnomaly, Seat,
    TranslationError,
};
pub use game::{play_round, run_match, MatchHistory, RoundRecord};
pub use interpreter::StrategyInterpreter;
pub use pairing::{match_count, pairing_for_match, round_robin_pairs};
pub use payoff::PayoffMatrix;
pub use random::{fingerprint, SeededRng};
pub use rule::{CompiledRule, RuleError, RuleSpec};
pub use strategy::{
    execute_template, DecisionContext, DecisionFunction, InterpretedStrategy, Move, Provenance, StrategyBase,
    StrategyLogic, StrategySpec,
};
pub use tournament::{validate_round_count, ReportBuilder, StrategyStanding, TournamentEngine, TournamentReport};
pub use translator::{KeywordTranslator, StaticTranslator, TranslationRequest, TranslationResponse, Translator};
