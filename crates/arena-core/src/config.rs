//! Config for the interpreter and the tournament engine

use std::time::Duration;

use crate::payoff::PayoffMatrix;

/// Settings for [`StrategyInterpreter`](crate::interpreter::StrategyInterpreter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub(crate) timeout: Duration,
    pub(crate) retries: u32,
    pub(crate) max_text_len: usize,
}

impl InterpreterConfig {
    /// Create a configuration with default parameters.
    ///
    /// By default:
    /// - Each translation attempt may take up to 10 seconds.
    /// - A transient failure is retried once.
    /// - Strategy texts longer than 4096 bytes are not sent for translation.
    pub fn new() -> Self {
        Self { timeout: Duration::from_secs(10), retries: 1, max_text_len: 4096 }
    }

    /// Create configuration from `ARENA_*` environment variables.
    ///
    /// Unset or unparsable variables keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();
        if let Some(ms) = parse(&lookup, "ARENA_TRANSLATION_TIMEOUT_MS") {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = parse(&lookup, "ARENA_TRANSLATION_RETRIES") {
            config = config.with_retries(retries);
        }
        if let Some(len) = parse(&lookup, "ARENA_MAX_TEXT_LEN") {
            config = config.with_max_text_len(len);
        }
        config
    }

    /// Upper bound on a single translation attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retries after a transient failure. Clamped to 1.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.min(1);
        self
    }

    pub fn with_max_text_len(mut self, max_text_len: usize) -> Self {
        self.max_text_len = max_text_len;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_text_len(&self) -> usize {
        self.max_text_len
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for [`TournamentEngine`](crate::tournament::TournamentEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TournamentConfig {
    pub(crate) payoff: PayoffMatrix,
    pub(crate) parallel: bool,
    pub(crate) max_rounds_per_match: u32,
}

impl TournamentConfig {
    /// Classic payoffs, matches run in parallel, at most 1000 rounds a match.
    pub fn new() -> Self {
        Self { payoff: PayoffMatrix::classic(), parallel: true, max_rounds_per_match: 1000 }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();
        if let Some(parallel) = parse(&lookup, "ARENA_PARALLEL") {
            config = config.with_parallel(parallel);
        }
        if let Some(max) = parse(&lookup, "ARENA_MAX_ROUNDS") {
            config = config.with_max_rounds_per_match(max);
        }
        config
    }

    pub fn with_payoff(mut self, payoff: PayoffMatrix) -> Self {
        self.payoff = payoff;
        self
    }

    /// Run independent matches on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_rounds_per_match(mut self, max: u32) -> Self {
        self.max_rounds_per_match = max;
        self
    }

    pub fn payoff(&self) -> &PayoffMatrix {
        &self.payoff
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    pub fn max_rounds_per_match(&self) -> u32 {
        self.max_rounds_per_match
    }
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name)?.trim().parse().ok()
}
