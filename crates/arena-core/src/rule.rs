//! Decision rules produced by translation.
//!
//! A translator answers with a [`RuleSpec`]: an ordered list of
//! `when -> then` clauses plus an `otherwise` action, written over a fixed
//! predicate vocabulary. [`compile`] checks a rule against that vocabulary
//! and a set of structural limits, then lowers it into a [`CompiledRule`]
//! that evaluates in bounded time. Nothing is partially accepted: one bad
//! node rejects the whole rule.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DecisionError;
use crate::random::SeededRng;
use crate::strategy::{DecisionContext, Move};

// ── Limits ───────────────────────────────────────────────────────────

/// Maximum number of `when -> then` clauses.
pub const MAX_CLAUSES: usize = 16;

/// Maximum condition + expression nodes across the whole rule.
pub const MAX_NODES: usize = 64;

/// Maximum nesting depth of a single condition.
pub const MAX_DEPTH: usize = 8;

// ── Wire format ──────────────────────────────────────────────────────

/// Rule as received from a translator, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default)]
    pub clauses: Vec<ClauseSpec>,
    pub otherwise: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClauseSpec {
    pub when: ConditionSpec,
    pub then: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSpec {
    All(Vec<ConditionSpec>),
    Any(Vec<ConditionSpec>),
    Not(Box<ConditionSpec>),
    Compare {
        left: OperandSpec,
        op: String,
        right: OperandSpec,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandSpec {
    Predicate(String),
    Number(f64),
    Move(String),
    Arith(Box<ArithSpec>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArithSpec {
    pub op: String,
    pub left: OperandSpec,
    pub right: OperandSpec,
}

// ── Validation errors ────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("predicate `{name}` is not in the allowed vocabulary")]
    UnknownPredicate { name: String },

    #[error("unknown operator `{op}`")]
    UnknownOperator { op: String },

    #[error("unknown action `{action}`")]
    UnknownAction { action: String },

    #[error("unknown move literal `{value}`")]
    UnknownMove { value: String },

    #[error("unknown template `{name}`")]
    UnknownTemplate { name: String },

    #[error("type mismatch: {detail}")]
    TypeMismatch { detail: String },

    #[error("numeric literal must be finite")]
    NonFiniteLiteral,

    #[error("modulo by literal zero")]
    ZeroDivisor,

    #[error("`all`/`any` needs at least one condition")]
    EmptyConnective,

    #[error("rule has {count} clauses, limit is {}", MAX_CLAUSES)]
    TooManyClauses { count: usize },

    #[error("rule exceeds {} nodes", MAX_NODES)]
    TooManyNodes,

    #[error("condition nesting exceeds depth {}", MAX_DEPTH)]
    TooDeep,
}

// ── Vocabulary ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Predicate {
    OwnLastMove,
    OpponentLastMove,
    RoundIndex,
    OwnCooperationRate,
    OpponentCooperationRate,
    OwnTotalScore,
    OpponentTotalScore,
}

impl Predicate {
    pub const ALL: [Predicate; 7] = [
        Predicate::OwnLastMove,
        Predicate::OpponentLastMove,
        Predicate::RoundIndex,
        Predicate::OwnCooperationRate,
        Predicate::OpponentCooperationRate,
        Predicate::OwnTotalScore,
        Predicate::OpponentTotalScore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Predicate::OwnLastMove => "own_last_move",
            Predicate::OpponentLastMove => "opponent_last_move",
            Predicate::RoundIndex => "round_index",
            Predicate::OwnCooperationRate => "own_cooperation_rate",
            Predicate::OpponentCooperationRate => "opponent_cooperation_rate",
            Predicate::OwnTotalScore => "own_total_score",
            Predicate::OpponentTotalScore => "opponent_total_score",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    fn value_type(self) -> ValueType {
        match self {
            Predicate::OwnLastMove | Predicate::OpponentLastMove => ValueType::Move,
            _ => ValueType::Number,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueType {
    Move,
    Number,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn parse(op: &str) -> Result<Self, RuleError> {
        Ok(match op {
            "eq" | "==" => CmpOp::Eq,
            "ne" | "!=" => CmpOp::Ne,
            "lt" | "<" => CmpOp::Lt,
            "le" | "<=" => CmpOp::Le,
            "gt" | ">" => CmpOp::Gt,
            "ge" | ">=" => CmpOp::Ge,
            _ => return Err(RuleError::UnknownOperator { op: op.to_string() }),
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Mod,
}

impl ArithOp {
    fn parse(op: &str) -> Result<Self, RuleError> {
        Ok(match op {
            "add" | "+" => ArithOp::Add,
            "sub" | "-" => ArithOp::Sub,
            "mul" | "*" => ArithOp::Mul,
            "mod" | "%" => ArithOp::Mod,
            _ => return Err(RuleError::UnknownOperator { op: op.to_string() }),
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Mod => "mod",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Cooperate,
    Defect,
    Random,
}

impl Action {
    fn parse(action: &str) -> Result<Self, RuleError> {
        match action {
            "cooperate" => Ok(Action::Cooperate),
            "defect" => Ok(Action::Defect),
            "random" => Ok(Action::Random),
            _ => Err(RuleError::UnknownAction { action: action.to_string() }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Cooperate => f.write_str("cooperate"),
            Action::Defect => f.write_str("defect"),
            Action::Random => f.write_str("random"),
        }
    }
}

fn parse_move(value: &str) -> Result<Move, RuleError> {
    match value {
        "cooperate" => Ok(Move::Cooperate),
        "defect" => Ok(Move::Defect),
        _ => Err(RuleError::UnknownMove { value: value.to_string() }),
    }
}

// ── Compiled form ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Predicate(Predicate),
    Number(f64),
    Move(Move),
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
enum Condition {
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    Compare { left: Expr, op: CmpOp, right: Expr },
}

#[derive(Clone, Debug, PartialEq)]
struct Clause {
    when: Condition,
    then: Action,
}

/// A validated rule, ready to evaluate.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledRule {
    clauses: Vec<Clause>,
    otherwise: Action,
    /// Drives the `random` action.
    seed: u64,
}

/// Validate `spec` against the vocabulary and limits and lower it.
pub fn compile(spec: &RuleSpec, seed: u64) -> Result<CompiledRule, RuleError> {
    if spec.clauses.len() > MAX_CLAUSES {
        return Err(RuleError::TooManyClauses { count: spec.clauses.len() });
    }

    let mut compiler = Compiler { nodes: 0 };
    let clauses = spec
        .clauses
        .iter()
        .map(|clause| {
            Ok(Clause {
                when: compiler.condition(&clause.when, 1)?,
                then: Action::parse(&clause.then)?,
            })
        })
        .collect::<Result<Vec<_>, RuleError>>()?;

    Ok(CompiledRule { clauses, otherwise: Action::parse(&spec.otherwise)?, seed })
}

struct Compiler {
    nodes: usize,
}

impl Compiler {
    fn visit(&mut self, depth: usize) -> Result<(), RuleError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(RuleError::TooManyNodes);
        }
        if depth > MAX_DEPTH {
            return Err(RuleError::TooDeep);
        }
        Ok(())
    }

    fn condition(&mut self, spec: &ConditionSpec, depth: usize) -> Result<Condition, RuleError> {
        self.visit(depth)?;
        match spec {
            ConditionSpec::All(parts) | ConditionSpec::Any(parts) => {
                if parts.is_empty() {
                    return Err(RuleError::EmptyConnective);
                }
                let parts = parts
                    .iter()
                    .map(|part| self.condition(part, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(match spec {
                    ConditionSpec::All(_) => Condition::All(parts),
                    _ => Condition::Any(parts),
                })
            }
            ConditionSpec::Not(inner) => Ok(Condition::Not(Box::new(self.condition(inner, depth + 1)?))),
            ConditionSpec::Compare { left, op, right } => {
                let op = CmpOp::parse(op)?;
                let (left, left_ty) = self.expr(left, depth + 1)?;
                let (right, right_ty) = self.expr(right, depth + 1)?;
                if left_ty != right_ty {
                    return Err(RuleError::TypeMismatch {
                        detail: format!("cannot compare {left_ty:?} with {right_ty:?}"),
                    });
                }
                if left_ty == ValueType::Move && !matches!(op, CmpOp::Eq | CmpOp::Ne) {
                    return Err(RuleError::TypeMismatch {
                        detail: format!("moves only support == and !=, got {}", op.symbol()),
                    });
                }
                Ok(Condition::Compare { left, op, right })
            }
        }
    }

    fn expr(&mut self, spec: &OperandSpec, depth: usize) -> Result<(Expr, ValueType), RuleError> {
        self.visit(depth)?;
        match spec {
            OperandSpec::Predicate(name) => {
                let predicate = Predicate::from_name(name)
                    .ok_or_else(|| RuleError::UnknownPredicate { name: name.clone() })?;
                Ok((Expr::Predicate(predicate), predicate.value_type()))
            }
            OperandSpec::Number(n) => {
                if !n.is_finite() {
                    return Err(RuleError::NonFiniteLiteral);
                }
                Ok((Expr::Number(*n), ValueType::Number))
            }
            OperandSpec::Move(value) => Ok((Expr::Move(parse_move(value)?), ValueType::Move)),
            OperandSpec::Arith(arith) => {
                let op = ArithOp::parse(&arith.op)?;
                let (left, left_ty) = self.expr(&arith.left, depth + 1)?;
                let (right, right_ty) = self.expr(&arith.right, depth + 1)?;
                if left_ty != ValueType::Number || right_ty != ValueType::Number {
                    return Err(RuleError::TypeMismatch {
                        detail: format!("`{}` needs numeric operands", op.symbol()),
                    });
                }
                if op == ArithOp::Mod && right == Expr::Number(0.0) {
                    return Err(RuleError::ZeroDivisor);
                }
                Ok((
                    Expr::Arith { op, left: Box::new(left), right: Box::new(right) },
                    ValueType::Number,
                ))
            }
        }
    }
}

// ── Evaluation ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
enum Value {
    /// `None` before the first round
    Move(Option<Move>),
    Number(f64),
}

impl CompiledRule {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn clause_count(&self) -> usize {
        self.clauses.len()
    }

    /// First matching clause wins; `otherwise` when none match.
    pub fn evaluate(&self, ctx: &DecisionContext<'_>) -> Result<Move, DecisionError> {
        for clause in &self.clauses {
            if eval_condition(&clause.when, ctx)? {
                return Ok(self.act(clause.then, ctx));
            }
        }
        Ok(self.act(self.otherwise, ctx))
    }

    fn act(&self, action: Action, ctx: &DecisionContext<'_>) -> Move {
        match action {
            Action::Cooperate => Move::Cooperate,
            Action::Defect => Move::Defect,
            Action::Random => {
                if SeededRng::for_round(self.seed, ctx.round).next_percent() < 50 {
                    Move::Cooperate
                } else {
                    Move::Defect
                }
            }
        }
    }
}

fn eval_condition(cond: &Condition, ctx: &DecisionContext<'_>) -> Result<bool, DecisionError> {
    match cond {
        Condition::All(parts) => {
            for part in parts {
                if !eval_condition(part, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Any(parts) => {
            for part in parts {
                if eval_condition(part, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not(inner) => Ok(!eval_condition(inner, ctx)?),
        Condition::Compare { left, op, right } => {
            let left = eval_expr(left, ctx)?;
            let right = eval_expr(right, ctx)?;
            match (left, right) {
                (Value::Move(a), Value::Move(b)) => match op {
                    CmpOp::Eq => Ok(a == b),
                    CmpOp::Ne => Ok(a != b),
                    _ => Err(DecisionError::Other(format!("ordering on moves ({})", op.symbol()))),
                },
                (Value::Number(a), Value::Number(b)) => Ok(match op {
                    CmpOp::Eq => a == b,
                    CmpOp::Ne => a != b,
                    CmpOp::Lt => a < b,
                    CmpOp::Le => a <= b,
                    CmpOp::Gt => a > b,
                    CmpOp::Ge => a >= b,
                }),
                _ => Err(DecisionError::Other("compared values of different types".into())),
            }
        }
    }
}

fn eval_expr(expr: &Expr, ctx: &DecisionContext<'_>) -> Result<Value, DecisionError> {
    Ok(match expr {
        Expr::Predicate(p) => match p {
            Predicate::OwnLastMove => Value::Move(ctx.own_last()),
            Predicate::OpponentLastMove => Value::Move(ctx.opponent_last()),
            Predicate::RoundIndex => Value::Number(ctx.round as f64),
            Predicate::OwnCooperationRate => Value::Number(ctx.own_cooperation_rate()),
            Predicate::OpponentCooperationRate => Value::Number(ctx.opponent_cooperation_rate()),
            Predicate::OwnTotalScore => Value::Number(ctx.own_total_score() as f64),
            Predicate::OpponentTotalScore => Value::Number(ctx.opponent_total_score() as f64),
        },
        Expr::Number(n) => Value::Number(*n),
        Expr::Move(m) => Value::Move(Some(*m)),
        Expr::Arith { op, left, right } => {
            let (Value::Number(a), Value::Number(b)) = (eval_expr(left, ctx)?, eval_expr(right, ctx)?) else {
                return Err(DecisionError::Other(format!("`{}` on a move", op.symbol())));
            };
            Value::Number(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Mod => {
                    if b == 0.0 {
                        return Err(DecisionError::DivisionByZero { expr: expr.to_string() });
                    }
                    a.rem_euclid(b)
                }
            })
        }
    })
}

// ── Rendering ────────────────────────────────────────────────────────

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Predicate(p) => f.write_str(p.name()),
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Move(m) => write!(f, "{m}"),
            Expr::Arith { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, parts: &[Condition], sep: &str| -> fmt::Result {
            f.write_str("(")?;
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{part}")?;
            }
            f.write_str(")")
        };
        match self {
            Condition::All(parts) => join(f, parts, "and"),
            Condition::Any(parts) => join(f, parts, "or"),
            Condition::Not(inner) => write!(f, "not {inner}"),
            Condition::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
        }
    }
}

impl fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for clause in &self.clauses {
            write!(f, "if {} then {}; ", clause.when, clause.then)?;
        }
        write!(f, "otherwise {}", self.otherwise)
    }
}

// ── Builders ─────────────────────────────────────────────────────────

impl OperandSpec {
    pub fn predicate(name: &str) -> Self {
        OperandSpec::Predicate(name.to_string())
    }

    pub fn number(n: f64) -> Self {
        OperandSpec::Number(n)
    }

    pub fn mv(m: Move) -> Self {
        OperandSpec::Move(m.to_string())
    }

    pub fn arith(op: &str, left: OperandSpec, right: OperandSpec) -> Self {
        OperandSpec::Arith(Box::new(ArithSpec { op: op.to_string(), left, right }))
    }
}

impl ConditionSpec {
    pub fn compare(left: OperandSpec, op: &str, right: OperandSpec) -> Self {
        ConditionSpec::Compare { left, op: op.to_string(), right }
    }
}

impl ClauseSpec {
    pub fn new(when: ConditionSpec, then: &str) -> Self {
        Self { when, then: then.to_string() }
    }
}

impl RuleSpec {
    pub fn new(clauses: Vec<ClauseSpec>, otherwise: &str) -> Self {
        Self { clauses, otherwise: otherwise.to_string() }
    }
}
