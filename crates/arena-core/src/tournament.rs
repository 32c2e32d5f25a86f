//! Tournament Engine
//!
//! Round robin over a strategy set: interpret every spec, play each
//! unordered pair once, aggregate per-strategy standings. Matches are
//! independent, so they may run on the rayon pool; the report is assembled
//! in canonical pair order and comes out identical either way.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::cache::CacheKey;
use crate::config::TournamentConfig;
use crate::error::{ConfigurationError, RuntimeAnomaly, Seat};
use crate::game::{self, MatchHistory, RoundRecord};
use crate::interpreter::StrategyInterpreter;
use crate::pairing::round_robin_pairs;
use crate::payoff::PayoffMatrix;
use crate::strategy::{InterpretedStrategy, Move, Provenance, StrategySpec};

/// Check a round count that arrived as an untyped integer.
pub fn validate_round_count(value: i64, max: u32) -> Result<u32, ConfigurationError> {
    if value < 0 {
        return Err(ConfigurationError::NegativeRounds { value });
    }
    match u32::try_from(value) {
        Ok(rounds) if rounds <= max => Ok(rounds),
        _ => Err(ConfigurationError::TooManyRounds { requested: value as u64, max }),
    }
}

/// Aggregate result of one strategy across the tournament.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyStanding {
    pub name: String,
    pub total_score: i64,
    pub matches_played: usize,
    pub rounds_played: usize,
    pub cooperations: usize,
    pub anomalies: usize,
    pub provenance: Provenance,
    /// Playing the fallback instead of its own logic.
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    /// Human-readable rendering of the logic that played.
    pub logic: String,
}

impl StrategyStanding {
    fn new(strategy: &InterpretedStrategy) -> Self {
        Self {
            name: strategy.name().to_string(),
            total_score: 0,
            matches_played: 0,
            rounds_played: 0,
            cooperations: 0,
            anomalies: 0,
            provenance: strategy.provenance,
            degraded: strategy.is_degraded(),
            fallback_reason: strategy.fallback_reason.clone(),
            logic: strategy.logic.describe(),
        }
    }

    pub fn cooperation_rate(&self) -> Option<f64> {
        (self.rounds_played > 0).then(|| self.cooperations as f64 / self.rounds_played as f64)
    }

    pub fn average_score_per_round(&self) -> Option<f64> {
        (self.rounds_played > 0).then(|| self.total_score as f64 / self.rounds_played as f64)
    }

    /// Score scaled to 100 rounds, comparable across round counts.
    pub fn normalized_score(&self) -> f64 {
        self.average_score_per_round().map_or(0.0, |avg| avg * 100.0)
    }

    fn absorb(&mut self, history: &MatchHistory, seat: Seat) {
        self.total_score += history.total(seat);
        self.matches_played += 1;
        self.rounds_played += history.round_count();
        self.cooperations += history.cooperations(seat);
        self.anomalies += history.anomalies().filter(|a| a.seat == seat).count();
    }
}

/// Output of one `run_tournament` call. Read-only once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TournamentReport {
    pub rounds_per_match: u32,
    pub payoff: PayoffMatrix,
    pub standings: BTreeMap<String, StrategyStanding>,
    /// Canonical pair order
    pub matches: Vec<MatchHistory>,
}

impl TournamentReport {
    pub fn scores(&self) -> BTreeMap<String, i64> {
        self.standings.iter().map(|(name, s)| (name.clone(), s.total_score)).collect()
    }

    pub fn score(&self, name: &str) -> Option<i64> {
        self.standings.get(name).map(|s| s.total_score)
    }

    pub fn standing(&self, name: &str) -> Option<&StrategyStanding> {
        self.standings.get(name)
    }

    /// Highest total first; ties broken by name.
    pub fn leaderboard(&self) -> Vec<&StrategyStanding> {
        let mut ranked: Vec<_> = self.standings.values().collect();
        ranked.sort_by(|a, b| b.total_score.cmp(&a.total_score).then_with(|| a.name.cmp(&b.name)));
        ranked
    }

    pub fn anomalies(&self) -> Vec<&RuntimeAnomaly> {
        self.matches.iter().flat_map(|m| m.anomalies()).collect()
    }

    /// Strategies that played the fallback.
    pub fn degraded(&self) -> Vec<&StrategyStanding> {
        self.standings.values().filter(|s| s.degraded).collect()
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }
}

/// Accumulates matches one at a time.
///
/// A caller that stops early can still `finish` and get a valid report over
/// the matches recorded so far.
#[derive(Clone, Debug)]
pub struct ReportBuilder {
    rounds_per_match: u32,
    payoff: PayoffMatrix,
    standings: BTreeMap<String, StrategyStanding>,
    matches: Vec<MatchHistory>,
}

impl ReportBuilder {
    pub fn new(strategies: &[InterpretedStrategy], rounds_per_match: u32, payoff: PayoffMatrix) -> Self {
        let standings = strategies.iter().map(|s| (s.name().to_string(), StrategyStanding::new(s))).collect();
        Self { rounds_per_match, payoff, standings, matches: Vec::new() }
    }

    /// Matches naming a player unknown to the builder are kept but not scored.
    pub fn record(&mut self, history: MatchHistory) {
        for seat in [Seat::A, Seat::B] {
            if let Some(standing) = self.standings.get_mut(history.player(seat)) {
                standing.absorb(&history, seat);
            }
        }
        self.matches.push(history);
    }

    pub fn recorded(&self) -> usize {
        self.matches.len()
    }

    pub fn finish(self) -> TournamentReport {
        TournamentReport {
            rounds_per_match: self.rounds_per_match,
            payoff: self.payoff,
            standings: self.standings,
            matches: self.matches,
        }
    }
}

/// Drives rounds, matches and tournaments over interpreted strategies.
#[derive(Debug)]
pub struct TournamentEngine {
    interpreter: Arc<StrategyInterpreter>,
    config: TournamentConfig,
}

impl TournamentEngine {
    pub fn new(interpreter: Arc<StrategyInterpreter>, config: TournamentConfig) -> Self {
        Self { interpreter, config }
    }

    pub fn interpreter(&self) -> &Arc<StrategyInterpreter> {
        &self.interpreter
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    pub fn play_round(
        &self,
        strategy_a: &InterpretedStrategy,
        strategy_b: &InterpretedStrategy,
        history_a: &[Move],
        history_b: &[Move],
        round: u32,
    ) -> RoundRecord {
        game::play_round(&self.config.payoff, strategy_a, strategy_b, history_a, history_b, round)
    }

    pub fn run_match(
        &self,
        strategy_a: &InterpretedStrategy,
        strategy_b: &InterpretedStrategy,
        rounds: u32,
    ) -> MatchHistory {
        game::run_match(&self.config.payoff, strategy_a, strategy_b, rounds)
    }

    /// Interpret `strategies` and play a full round robin.
    ///
    /// Setup problems are reported before any translation or play happens.
    /// Everything after that is absorbed: failed interpretations play the
    /// fallback and misbehaving decisions are recorded as anomalies.
    #[instrument(skip_all, fields(strategies = strategies.len(), rounds_per_match = rounds_per_match))]
    pub fn run_tournament(
        &self,
        strategies: &[StrategySpec],
        rounds_per_match: u32,
    ) -> Result<TournamentReport, ConfigurationError> {
        self.check_setup(strategies.iter().map(|s| s.name.as_str()), rounds_per_match)?;

        let interpreted = self.interpret_all(strategies);
        Ok(self.play_all(&interpreted, rounds_per_match))
    }

    /// Round robin over already-interpreted strategies.
    pub fn run_interpreted(
        &self,
        strategies: &[InterpretedStrategy],
        rounds_per_match: u32,
    ) -> Result<TournamentReport, ConfigurationError> {
        self.check_setup(strategies.iter().map(|s| s.name()), rounds_per_match)?;
        Ok(self.play_all(strategies, rounds_per_match))
    }

    /// Builder pre-loaded with `strategies`, for callers scheduling matches
    /// themselves.
    pub fn report_builder(&self, strategies: &[InterpretedStrategy], rounds_per_match: u32) -> ReportBuilder {
        ReportBuilder::new(strategies, rounds_per_match, self.config.payoff)
    }

    fn check_setup<'a>(
        &self,
        names: impl Iterator<Item = &'a str>,
        rounds_per_match: u32,
    ) -> Result<(), ConfigurationError> {
        if rounds_per_match > self.config.max_rounds_per_match {
            return Err(ConfigurationError::TooManyRounds {
                requested: rounds_per_match as u64,
                max: self.config.max_rounds_per_match,
            });
        }

        let mut seen = HashSet::new();
        for name in names {
            if name.trim().is_empty() {
                return Err(ConfigurationError::BlankStrategyName);
            }
            if !seen.insert(name) {
                return Err(ConfigurationError::DuplicateStrategyName { name: name.to_string() });
            }
        }
        Ok(())
    }

    /// One translation per distinct text, possibly in parallel; repeats are
    /// then served from the cache in input order, so provenance does not
    /// depend on scheduling.
    fn interpret_all(&self, strategies: &[StrategySpec]) -> Vec<InterpretedStrategy> {
        let mut seen = HashSet::new();
        let firsts: Vec<usize> = (0..strategies.len())
            .filter(|&i| seen.insert(CacheKey::from_text(&strategies[i].text)))
            .collect();

        let interpret = |i: &usize| (*i, self.interpreter.interpret_strategy(&strategies[*i]));
        let mut fresh: HashMap<usize, InterpretedStrategy> = if self.config.parallel {
            firsts.par_iter().map(interpret).collect()
        } else {
            firsts.iter().map(interpret).collect()
        };

        strategies
            .iter()
            .enumerate()
            .map(|(i, spec)| fresh.remove(&i).unwrap_or_else(|| self.interpreter.interpret_strategy(spec)))
            .collect()
    }

    fn play_all(&self, strategies: &[InterpretedStrategy], rounds_per_match: u32) -> TournamentReport {
        let schedule = round_robin_pairs(strategies.len());
        info!(
            strategies = strategies.len(),
            matches = schedule.len(),
            rounds_per_match,
            parallel = self.config.parallel,
            "starting tournament"
        );

        let play = |&(a, b): &(usize, usize)| {
            let history = self.run_match(&strategies[a], &strategies[b], rounds_per_match);
            debug!(
                a = %history.player_a,
                b = %history.player_b,
                score_a = history.total_a(),
                score_b = history.total_b(),
                "match finished"
            );
            history
        };
        let matches: Vec<MatchHistory> = if self.config.parallel {
            schedule.par_iter().map(&play).collect()
        } else {
            schedule.iter().map(&play).collect()
        };

        let mut builder = self.report_builder(strategies, rounds_per_match);
        for history in matches {
            builder.record(history);
        }
        let report = builder.finish();

        info!(
            matches = report.match_count(),
            anomalies = report.anomalies().len(),
            degraded = report.degraded().len(),
            "tournament finished"
        );
        report
    }
}
