//! Strategy Interpreter
//!
//! Turns free-form strategy text into decision logic, once per distinct
//! normalized text:
//!
//! 1. Normalize the text into a [`CacheKey`] and check the cache.
//! 2. On a miss, send a [`TranslationRequest`] to the translator, bounded
//!    by a timeout and retried at most once on transient errors.
//! 3. Validate the answer (rule vocabulary, template names) and compile it.
//! 4. Any failure substitutes the fallback decision function.
//! 5. Cache the outcome, fallbacks included, so bad text is not re-sent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, InterpretationCache, Inserted};
use crate::config::InterpreterConfig;
use crate::error::{CacheConflict, InterpretationError, TranslationError};
use crate::rule::{compile, RuleError};
use crate::strategy::{
    DecisionFunction, InterpretedStrategy, Provenance, StrategyBase, StrategyLogic, StrategySpec,
};
use crate::translator::{TranslationRequest, TranslationResponse, Translator};

pub struct StrategyInterpreter {
    translator: Arc<dyn Translator>,
    cache: InterpretationCache,
    config: InterpreterConfig,
    fallback: Arc<dyn DecisionFunction>,
    translation_calls: AtomicU64,
}

impl StrategyInterpreter {
    /// Interpreter with an empty cache and tit-for-tat as the fallback.
    pub fn new(translator: Arc<dyn Translator>, config: InterpreterConfig) -> Self {
        Self {
            translator,
            cache: InterpretationCache::new(),
            config,
            fallback: Arc::new(StrategyBase::TitForTat),
            translation_calls: AtomicU64::new(0),
        }
    }

    /// Replace the decision function substituted when interpretation fails.
    pub fn with_fallback(mut self, fallback: Arc<dyn DecisionFunction>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Resolve `spec` to decision logic. Never fails: problems end in the
    /// fallback with `fallback_reason` set.
    #[instrument(skip_all, fields(strategy = %spec.name))]
    pub fn interpret_strategy(&self, spec: &StrategySpec) -> InterpretedStrategy {
        let key = CacheKey::from_text(&spec.text);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "interpretation cache hit");
            return hit.rebind(spec.clone(), Provenance::Cached);
        }

        let fresh = match self.resolve(&key) {
            Ok(logic) => {
                debug!(logic = %logic.describe(), "strategy interpreted");
                InterpretedStrategy::new(spec.clone(), logic, Provenance::FreshlyInterpreted)
            }
            Err(err) => {
                warn!(error = %err, "interpretation failed, using fallback");
                self.fallback_for(spec, &err)
            }
        };

        let stored = self.cache.insert_or_get(key, fresh.clone());
        if Arc::ptr_eq(&stored.logic, &fresh.logic) {
            fresh
        } else {
            // lost a race with a concurrent miss on the same key
            stored.rebind(spec.clone(), Provenance::Cached)
        }
    }

    /// Idempotent insert into this interpreter's cache.
    pub fn cache_interpretation(&self, key: CacheKey, interpreted: InterpretedStrategy) -> Result<(), CacheConflict> {
        match self.cache.insert(key, interpreted)? {
            Inserted::New | Inserted::Unchanged => Ok(()),
        }
    }

    /// Lookup only. Never calls the translator.
    pub fn get_cached_interpretation(&self, key: &CacheKey) -> Option<InterpretedStrategy> {
        self.cache.get(key)
    }

    /// Translation attempts made so far, retries included.
    pub fn translation_calls(&self) -> u64 {
        self.translation_calls.load(Ordering::SeqCst)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn fallback_for(&self, spec: &StrategySpec, err: &InterpretationError) -> InterpretedStrategy {
        let mut interpreted = InterpretedStrategy::new(
            spec.clone(),
            StrategyLogic::Fallback(Arc::clone(&self.fallback)),
            Provenance::Fallback,
        );
        interpreted.fallback_reason = Some(err.to_string());
        interpreted
    }

    fn resolve(&self, key: &CacheKey) -> Result<StrategyLogic, InterpretationError> {
        let len = key.as_str().len();
        if len > self.config.max_text_len {
            return Err(InterpretationError::TextTooLong { len, max: self.config.max_text_len });
        }

        let request = TranslationRequest::new(key);
        match self.translate_with_retry(&request)? {
            TranslationResponse::Rule { rule } => Ok(StrategyLogic::Interpreted(compile(&rule, key.fingerprint())?)),
            TranslationResponse::Template { name } => match StrategyBase::from_name(&name) {
                Some(base) => Ok(StrategyLogic::Template { base, seed: key.fingerprint() }),
                None => Err(RuleError::UnknownTemplate { name }.into()),
            },
            TranslationResponse::Failed { reason } => Err(InterpretationError::Declined { reason }),
        }
    }

    fn translate_with_retry(&self, request: &TranslationRequest) -> Result<TranslationResponse, TranslationError> {
        let attempts = 1 + self.config.retries;
        let mut attempt = 1;
        loop {
            match self.translate_once(request) {
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(attempt, error = %err, "translation failed, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// One call, on its own thread so a hung translator cannot stall us
    /// past the timeout. A timed-out thread is left to finish on its own.
    fn translate_once(&self, request: &TranslationRequest) -> Result<TranslationResponse, TranslationError> {
        self.translation_calls.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel();
        let translator = Arc::clone(&self.translator);
        let request = request.clone();
        thread::Builder::new()
            .name("arena-translate".into())
            .spawn(move || {
                // receiver may be gone after a timeout
                let _ = tx.send(translator.translate(&request));
            })
            .map_err(|e| TranslationError::Unavailable(format!("cannot spawn translation thread: {e}")))?;

        match rx.recv_timeout(self.config.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TranslationError::Timeout { after: self.config.timeout }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(TranslationError::Unavailable("translator panicked before answering".into()))
            }
        }
    }
}

impl std::fmt::Debug for StrategyInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyInterpreter")
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .field("translation_calls", &self.translation_calls())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{ClauseSpec, ConditionSpec, OperandSpec, RuleSpec};
    use crate::translator::StaticTranslator;
    use std::time::Duration;

    fn interpreter(stub: StaticTranslator) -> (Arc<StaticTranslator>, StrategyInterpreter) {
        let stub = Arc::new(stub);
        let interpreter = StrategyInterpreter::new(stub.clone(), InterpreterConfig::new());
        (stub, interpreter)
    }

    fn unsafe_rule() -> TranslationResponse {
        TranslationResponse::Rule {
            rule: RuleSpec::new(
                vec![ClauseSpec::new(
                    ConditionSpec::compare(OperandSpec::predicate("read_file"), "eq", OperandSpec::number(1.0)),
                    "defect",
                )],
                "cooperate",
            ),
        }
    }

    #[test]
    fn test_fresh_then_cached() {
        let grim = TranslationResponse::template(StrategyBase::GrimTrigger);
        let (stub, interpreter) = interpreter(StaticTranslator::new().with_response("grim", grim));

        let first = interpreter.interpret_strategy(&StrategySpec::new("a", "grim"));
        assert_eq!(first.provenance, Provenance::FreshlyInterpreted);
        assert!(matches!(*first.logic, StrategyLogic::Template { base: StrategyBase::GrimTrigger, .. }));

        let second = interpreter.interpret_strategy(&StrategySpec::new("b", "  GRIM "));
        assert_eq!(second.provenance, Provenance::Cached);
        assert_eq!(second.name(), "b");
        assert!(Arc::ptr_eq(&first.logic, &second.logic));
        assert_eq!(stub.calls(), 1);
        assert_eq!(interpreter.translation_calls(), 1);
    }

    #[test]
    fn test_unsafe_rule_falls_back_and_is_cached() {
        let (stub, interpreter) = interpreter(StaticTranslator::new().with_response("sneaky", unsafe_rule()));

        let first = interpreter.interpret_strategy(&StrategySpec::new("s", "sneaky"));
        assert_eq!(first.provenance, Provenance::Fallback);
        assert!(first.is_degraded());
        assert!(first.fallback_reason.as_deref().is_some_and(|r| r.contains("read_file")));

        let again = interpreter.interpret_strategy(&StrategySpec::new("s", "sneaky"));
        assert!(again.is_degraded());
        assert_eq!(again.provenance, Provenance::Cached);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn test_declined_and_unknown_template_fall_back() {
        let (_, interpreter) = interpreter(
            StaticTranslator::new()
                .with_response("vague", TranslationResponse::failed("too vague"))
                .with_response("mystery", TranslationResponse::Template { name: "nash".into() }),
        );
        let vague = interpreter.interpret_strategy(&StrategySpec::new("v", "vague"));
        assert_eq!(vague.provenance, Provenance::Fallback);
        assert!(vague.fallback_reason.unwrap().contains("too vague"));

        let mystery = interpreter.interpret_strategy(&StrategySpec::new("m", "mystery"));
        assert_eq!(mystery.provenance, Provenance::Fallback);
        assert!(mystery.fallback_reason.unwrap().contains("nash"));
    }

    #[test]
    fn test_transient_error_retried_once() {
        let (stub, interpreter) = interpreter(StaticTranslator::new().with_script(
            "flaky",
            vec![
                Err(TranslationError::Unavailable("503".into())),
                Ok(TranslationResponse::template(StrategyBase::Pavlov)),
            ],
        ));
        let result = interpreter.interpret_strategy(&StrategySpec::new("f", "flaky"));
        assert_eq!(result.provenance, Provenance::FreshlyInterpreted);
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn test_persistent_outage_gives_up_after_retry() {
        let (stub, interpreter) =
            interpreter(StaticTranslator::new().with_error("down", TranslationError::Unavailable("offline".into())));
        let result = interpreter.interpret_strategy(&StrategySpec::new("d", "down"));
        assert_eq!(result.provenance, Provenance::Fallback);
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn test_malformed_not_retried() {
        let (stub, interpreter) =
            interpreter(StaticTranslator::new().with_error("junk", TranslationError::Malformed("{".into())));
        let result = interpreter.interpret_strategy(&StrategySpec::new("j", "junk"));
        assert_eq!(result.provenance, Provenance::Fallback);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn test_timeout_bounds_each_attempt() {
        let stub = Arc::new(
            StaticTranslator::new()
                .with_response("slow", TranslationResponse::template(StrategyBase::AlwaysDefect))
                .with_delay(Duration::from_millis(500)),
        );
        let config = InterpreterConfig::new().with_timeout(Duration::from_millis(20)).with_retries(0);
        let interpreter = StrategyInterpreter::new(stub, config);

        let result = interpreter.interpret_strategy(&StrategySpec::new("slow", "slow"));
        assert_eq!(result.provenance, Provenance::Fallback);
        assert!(result.fallback_reason.unwrap().contains("timed out"));
        assert_eq!(interpreter.translation_calls(), 1);
    }

    #[test]
    fn test_oversized_text_never_sent() {
        let stub = Arc::new(StaticTranslator::new());
        let interpreter =
            StrategyInterpreter::new(stub.clone(), InterpreterConfig::new().with_max_text_len(8));
        let result = interpreter.interpret_strategy(&StrategySpec::new("long", "cooperate forever and ever"));
        assert_eq!(result.provenance, Provenance::Fallback);
        assert_eq!(stub.calls(), 0);
    }

    #[test]
    fn test_custom_fallback() {
        let (_, interpreter) = interpreter(StaticTranslator::new());
        let custom: Arc<dyn DecisionFunction> = Arc::new(StrategyBase::AlwaysCooperate);
        let interpreter = interpreter.with_fallback(custom.clone());
        let result = interpreter.interpret_strategy(&StrategySpec::new("x", "unknown"));
        assert_eq!(*result.logic, StrategyLogic::Fallback(custom));
    }

    #[test]
    fn test_cache_api() {
        let (stub, interpreter) = interpreter(StaticTranslator::new());
        let key = CacheKey::from_text("always cooperate");
        let value = InterpretedStrategy::template("nice", StrategyBase::AlwaysCooperate);

        assert!(interpreter.get_cached_interpretation(&key).is_none());
        interpreter.cache_interpretation(key.clone(), value.clone()).unwrap();
        interpreter.cache_interpretation(key.clone(), value).unwrap();
        let conflict = interpreter
            .cache_interpretation(key.clone(), InterpretedStrategy::template("mean", StrategyBase::AlwaysDefect));
        assert_eq!(conflict, Err(CacheConflict { key: key.clone() }));

        // pre-seeded entries short-circuit translation
        let hit = interpreter.interpret_strategy(&StrategySpec::new("n", "Always  Cooperate"));
        assert_eq!(hit.provenance, Provenance::Cached);
        assert_eq!(stub.calls(), 0);
        assert_eq!(interpreter.cache_len(), 1);
    }

    #[test]
    fn test_random_seed_from_text() {
        let (_, interpreter) = interpreter(
            StaticTranslator::new()
                .with_response("coin one", TranslationResponse::template(StrategyBase::Random))
                .with_response("coin two", TranslationResponse::template(StrategyBase::Random)),
        );
        let one = interpreter.interpret_strategy(&StrategySpec::new("1", "coin one"));
        let two = interpreter.interpret_strategy(&StrategySpec::new("2", "coin two"));
        assert_ne!(one.logic, two.logic);
    }
}
