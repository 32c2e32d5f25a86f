//! Translation port
//!
//! The interpreter never talks to a language service directly. It hands a
//! [`TranslationRequest`] to a [`Translator`] and gets back a
//! [`TranslationResponse`]: a rule, a template name or an explicit refusal.
//! Two implementations ship with the crate:
//!
//! - [`StaticTranslator`]: canned answers keyed by normalized text, with a
//!   call counter. Used by tests and for offline runs.
//! - [`KeywordTranslator`]: recognizes common phrasings (fixed moves,
//!   alternating sequences, "copy opponent" variants, template names).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::cache::CacheKey;
use crate::error::TranslationError;
use crate::rule::{ClauseSpec, ConditionSpec, OperandSpec, Predicate, RuleSpec};
use crate::strategy::{Move, StrategyBase};

/// What the interpreter sends out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// Normalized strategy text
    pub text: String,
    /// Predicates a returned rule may use
    pub predicates: Vec<String>,
    /// Template names a response may refer to
    pub templates: Vec<String>,
}

impl TranslationRequest {
    pub fn new(key: &CacheKey) -> Self {
        Self {
            text: key.as_str().to_string(),
            predicates: Predicate::ALL.iter().map(|p| p.name().to_string()).collect(),
            templates: StrategyBase::ALL.iter().map(|b| b.name().to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TranslationResponse {
    Rule { rule: RuleSpec },
    Template { name: String },
    Failed { reason: String },
}

impl TranslationResponse {
    pub fn template(base: StrategyBase) -> Self {
        TranslationResponse::Template { name: base.name().to_string() }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        TranslationResponse::Failed { reason: reason.into() }
    }
}

/// Port to whatever turns strategy text into a rule.
///
/// Calls may block; the interpreter bounds each one with a timeout, so
/// implementations must be shareable across threads.
pub trait Translator: Send + Sync + 'static {
    fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse, TranslationError>;
}

// ── StaticTranslator ─────────────────────────────────────────────────

/// Deterministic stub.
///
/// Each text maps to a queue of outcomes. Outcomes are consumed in order and
/// the last one repeats, so a transient failure followed by a success is
/// `[Err(..), Ok(..)]`. Unknown texts answer `failed`.
#[derive(Default)]
pub struct StaticTranslator {
    scripts: Mutex<HashMap<CacheKey, VecDeque<Result<TranslationResponse, TranslationError>>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, text: &str, response: TranslationResponse) -> Self {
        self.with_script(text, vec![Ok(response)])
    }

    pub fn with_error(self, text: &str, error: TranslationError) -> Self {
        self.with_script(text, vec![Err(error)])
    }

    pub fn with_script(self, text: &str, outcomes: Vec<Result<TranslationResponse, TranslationError>>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(CacheKey::from_text(text), outcomes.into());
        self
    }

    /// Sleep this long before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `translate` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for StaticTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTranslator")
            .field("delay", &self.delay)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl Translator for StaticTranslator {
    fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = scripts.get_mut(&CacheKey::from_text(&request.text)) else {
            return Ok(TranslationResponse::failed("no scripted response"));
        };
        let outcome = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        outcome.unwrap_or_else(|| Ok(TranslationResponse::failed("empty script")))
    }
}

// ── KeywordTranslator ────────────────────────────────────────────────

/// Phrase → template, checked in order (longer phrases first).
const TEMPLATE_PHRASES: &[(&str, StrategyBase)] = &[
    ("suspicious tit for tat", StrategyBase::SuspiciousTitForTat),
    ("tit for two tats", StrategyBase::TitForTwoTats),
    ("tit for tat", StrategyBase::TitForTat),
    ("grim trigger", StrategyBase::GrimTrigger),
    ("win stay lose shift", StrategyBase::Pavlov),
    ("win stay lose switch", StrategyBase::Pavlov),
    ("pavlov", StrategyBase::Pavlov),
    ("gradual", StrategyBase::Gradual),
    ("always cooperate", StrategyBase::AlwaysCooperate),
    ("never defect", StrategyBase::AlwaysCooperate),
    ("always defect", StrategyBase::AlwaysDefect),
    ("never cooperate", StrategyBase::AlwaysDefect),
];

const NUMBER_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen", "twenty",
];

const UNITS: &[&str] = &["move", "moves", "round", "rounds", "time", "times", "turn", "turns"];

/// Offline recognizer for plain-English strategies.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordTranslator;

impl KeywordTranslator {
    pub fn new() -> Self {
        Self
    }

    fn recognize(&self, text: &str) -> TranslationResponse {
        let spaced = text.replace(['_', '-'], " ");
        let tokens: Vec<&str> = spaced
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| !t.is_empty())
            .collect();
        let joined = tokens.join(" ");

        if let Some(rule) = conditional(&tokens) {
            return TranslationResponse::Rule { rule };
        }
        if let Some(rule) = sequence(&tokens) {
            return TranslationResponse::Rule { rule };
        }
        if let Some((_, base)) = TEMPLATE_PHRASES.iter().find(|(phrase, _)| joined.contains(phrase)) {
            return TranslationResponse::template(*base);
        }
        simple(&tokens).unwrap_or_else(|| TranslationResponse::failed(format!("no known pattern in `{text}`")))
    }
}

impl Translator for KeywordTranslator {
    fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse, TranslationError> {
        Ok(self.recognize(&request.text))
    }
}

fn parse_action(token: &str) -> Option<Move> {
    match token {
        "cooperate" | "cooperates" | "cooperating" | "cooperation" => Some(Move::Cooperate),
        "defect" | "defects" | "defecting" | "defection" | "betray" => Some(Move::Defect),
        _ => None,
    }
}

fn parse_number(token: &str) -> Option<u32> {
    token
        .parse()
        .ok()
        .or_else(|| NUMBER_WORDS.iter().position(|w| *w == token).map(|n| n as u32))
}

/// `<action> [for] <n> [unit]`, returning the index after the phrase.
fn phase(tokens: &[&str], at: usize) -> Option<(Move, u32, usize)> {
    let action = parse_action(tokens.get(at)?)?;
    let mut i = at + 1;
    if tokens.get(i) == Some(&"for") {
        i += 1;
    }
    let count = parse_number(tokens.get(i)?)?;
    i += 1;
    if tokens.get(i).is_some_and(|t| UNITS.contains(t)) {
        i += 1;
    }
    Some((action, count, i))
}

/// "cooperate 10 moves then defect 5 moves", repeating.
fn sequence(tokens: &[&str]) -> Option<RuleSpec> {
    let (first, n, mut i) = (0..tokens.len()).find_map(|at| phase(tokens, at))?;
    while tokens.get(i).is_some_and(|t| matches!(*t, "then" | "and" | "after" | "that")) {
        i += 1;
    }
    let (second, m, _) = phase(tokens, i)?;
    let period = n.checked_add(m)?;
    if first == second || period == 0 {
        return None;
    }

    // round_index mod (n + m) < n  ->  first action
    Some(RuleSpec::new(
        vec![ClauseSpec::new(
            ConditionSpec::compare(
                OperandSpec::arith(
                    "mod",
                    OperandSpec::predicate(Predicate::RoundIndex.name()),
                    OperandSpec::number(f64::from(period)),
                ),
                "lt",
                OperandSpec::number(f64::from(n)),
            ),
            &first.to_string(),
        )],
        &second.to_string(),
    ))
}

/// "copy opponent", optionally after "cooperate (for the) first 3 moves".
fn conditional(tokens: &[&str]) -> Option<RuleSpec> {
    let copies = tokens.iter().any(|t| matches!(*t, "copy" | "copies" | "mirror" | "mirrors" | "repeat"))
        && tokens.iter().any(|t| t.starts_with("opponent"));
    if !copies {
        return None;
    }

    let mut clauses = Vec::new();
    if let Some(first) = tokens.iter().position(|t| *t == "first") {
        let opening = tokens[..first].iter().find_map(|t| parse_action(t)).unwrap_or(Move::Cooperate);
        if let Some(n) = tokens[first + 1..].iter().find_map(|t| parse_number(t)) {
            clauses.push(ClauseSpec::new(
                ConditionSpec::compare(
                    OperandSpec::predicate(Predicate::RoundIndex.name()),
                    "lt",
                    OperandSpec::number(f64::from(n)),
                ),
                &opening.to_string(),
            ));
        }
    }
    clauses.push(ClauseSpec::new(
        ConditionSpec::compare(
            OperandSpec::predicate(Predicate::OpponentLastMove.name()),
            "eq",
            OperandSpec::mv(Move::Defect),
        ),
        "defect",
    ));
    Some(RuleSpec::new(clauses, "cooperate"))
}

/// Single-action texts: "cooperate", "defect", "random".
fn simple(tokens: &[&str]) -> Option<TranslationResponse> {
    if tokens.iter().any(|t| matches!(*t, "random" | "randomly" | "coin")) {
        return Some(TranslationResponse::Rule { rule: RuleSpec::new(vec![], "random") });
    }
    let actions: Vec<Move> = tokens.iter().filter_map(|t| parse_action(t)).collect();
    match actions.as_slice() {
        [] => None,
        [first, rest @ ..] if rest.iter().all(|m| m == first) => Some(TranslationResponse::template(match first {
            Move::Cooperate => StrategyBase::AlwaysCooperate,
            Move::Defect => StrategyBase::AlwaysDefect,
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payoff::PayoffMatrix;
    use crate::rule::compile;
    use crate::strategy::DecisionContext;
    use Move::{Cooperate as C, Defect as D};

    fn translate(text: &str) -> TranslationResponse {
        KeywordTranslator::new()
            .translate(&TranslationRequest::new(&CacheKey::from_text(text)))
            .unwrap()
    }

    fn moves_of(response: TranslationResponse, rounds: u32) -> Vec<Move> {
        let TranslationResponse::Rule { rule } = response else {
            panic!("expected a rule");
        };
        let rule = compile(&rule, 0).unwrap();
        let payoff = PayoffMatrix::classic();
        (0..rounds)
            .map(|r| rule.evaluate(&DecisionContext::new(&[], &[], r, &payoff)).unwrap())
            .collect()
    }

    #[test]
    fn test_request_carries_vocabulary() {
        let request = TranslationRequest::new(&CacheKey::from_text("  Be   NICE "));
        assert_eq!(request.text, "be nice");
        assert!(request.predicates.contains(&"opponent_last_move".to_string()));
        assert_eq!(request.templates.len(), StrategyBase::ALL.len());
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_string(&TranslationResponse::template(StrategyBase::GrimTrigger)).unwrap();
        assert_eq!(json, r#"{"status":"template","name":"grim_trigger"}"#);
        let failed: TranslationResponse = serde_json::from_str(r#"{"status":"failed","reason":"nope"}"#).unwrap();
        assert_eq!(failed, TranslationResponse::failed("nope"));
    }

    #[test]
    fn test_keyword_templates() {
        assert_eq!(translate("Tit-for-Tat"), TranslationResponse::template(StrategyBase::TitForTat));
        assert_eq!(
            translate("play suspicious tit for tat"),
            TranslationResponse::template(StrategyBase::SuspiciousTitForTat)
        );
        assert_eq!(translate("grim_trigger"), TranslationResponse::template(StrategyBase::GrimTrigger));
        assert_eq!(translate("Always defect."), TranslationResponse::template(StrategyBase::AlwaysDefect));
        assert_eq!(translate("cooperate"), TranslationResponse::template(StrategyBase::AlwaysCooperate));
    }

    #[test]
    fn test_keyword_sequence() {
        let moves = moves_of(translate("cooperate 2 moves then defect 1 move"), 6);
        assert_eq!(moves, vec![C, C, D, C, C, D]);

        let words = moves_of(translate("Defect three rounds and then cooperate two rounds"), 5);
        assert_eq!(words, vec![D, D, D, C, C]);
    }

    #[test]
    fn test_keyword_sequence_overflowing_counts() {
        let huge = translate("cooperate 4294967295 moves then defect 2 moves");
        assert!(matches!(huge, TranslationResponse::Failed { .. }));

        let moves = moves_of(translate("cooperate 4294967294 moves then defect 1 move"), 3);
        assert_eq!(moves, vec![C, C, C]);
    }

    #[test]
    fn test_keyword_conditional() {
        let TranslationResponse::Rule { rule } = translate("cooperate first 3 moves then copy opponent") else {
            panic!("expected rule");
        };
        let rule = compile(&rule, 0).unwrap();
        let payoff = PayoffMatrix::classic();
        // still in the opening even though the opponent defected
        let opening = DecisionContext::new(&[C], &[D], 1, &payoff);
        assert_eq!(rule.evaluate(&opening), Ok(C));
        let later = DecisionContext::new(&[C, C, C], &[C, C, D], 3, &payoff);
        assert_eq!(rule.evaluate(&later), Ok(D));
    }

    #[test]
    fn test_keyword_random() {
        let moves = moves_of(translate("flip a coin"), 4);
        assert_eq!(moves.len(), 4);
    }

    #[test]
    fn test_keyword_unrecognized() {
        assert!(matches!(translate("outsmart everyone"), TranslationResponse::Failed { .. }));
        assert!(matches!(translate("cooperate or defect, who knows"), TranslationResponse::Failed { .. }));
    }

    #[test]
    fn test_static_script_replays_last() {
        let stub = StaticTranslator::new().with_script(
            "flaky",
            vec![
                Err(TranslationError::Unavailable("503".into())),
                Ok(TranslationResponse::template(StrategyBase::Pavlov)),
            ],
        );
        let request = TranslationRequest::new(&CacheKey::from_text("FLAKY"));
        assert!(stub.translate(&request).is_err());
        assert_eq!(stub.translate(&request), Ok(TranslationResponse::template(StrategyBase::Pavlov)));
        assert_eq!(stub.translate(&request), Ok(TranslationResponse::template(StrategyBase::Pavlov)));
        assert_eq!(stub.calls(), 3);

        let unknown = stub.translate(&TranslationRequest::new(&CacheKey::from_text("other"))).unwrap();
        assert!(matches!(unknown, TranslationResponse::Failed { .. }));
    }
}
