//! Condition Evaluator: a tiny, closed expression language for unlock rules.
//!
//! ```text
//!   condition   := conjunction ( "OR" conjunction )*
//!   conjunction := comparison ( "AND" comparison )*
//!   comparison  := IDENT OP NUMBER
//!   OP          := ">=" | "<=" | ">" | "<" | "==" | "!="
//! ```
//!
//! `AND` binds tighter than `OR`; keywords are case-insensitive. Identifiers
//! come from the closed [`ConditionVar`] set and are looked up in a
//! [`Counters`] snapshot. Nothing is ever executed: a condition is tokenised,
//! parsed into a small tree, and walked.
//!
//! Parsing never fails. A comparison that cannot be understood (unknown
//! identifier, bad operator, non-numeric literal, missing piece) becomes an
//! invalid node that evaluates to `false`, so the rest of the expression,
//! and the rest of a catalog, still work.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tolerance for `==` and `!=`.
const EQ_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// The identifiers a condition may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionVar {
    /// Times the creature was petted.
    PetCount,
    /// Times the creature was fed.
    FeedCount,
    /// Times the creature was played with.
    PlayCount,
    /// All interactions.
    TotalInteractions,
    /// Days since the creature was created, counting the first day.
    TotalDays,
    /// Current streak of consecutive active days.
    ConsecutiveDays,
    /// Affinity, 0–100.
    Intimacy,
    /// Experience level.
    Level,
}

impl ConditionVar {
    /// Every variable.
    pub const ALL: [Self; 8] = [
        Self::PetCount,
        Self::FeedCount,
        Self::PlayCount,
        Self::TotalInteractions,
        Self::TotalDays,
        Self::ConsecutiveDays,
        Self::Intimacy,
        Self::Level,
    ];

    /// Identifier as written in conditions.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PetCount => "pet_count",
            Self::FeedCount => "feed_count",
            Self::PlayCount => "play_count",
            Self::TotalInteractions => "total_interactions",
            Self::TotalDays => "total_days",
            Self::ConsecutiveDays => "consecutive_days",
            Self::Intimacy => "intimacy",
            Self::Level => "level",
        }
    }
}

impl FromStr for ConditionVar {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|v| v.as_str() == s).ok_or(())
    }
}

impl fmt::Display for ConditionVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the values conditions are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Counters {
    /// `pet_count`
    pub pet_count: u64,
    /// `feed_count`
    pub feed_count: u64,
    /// `play_count`
    pub play_count: u64,
    /// `total_interactions`
    pub total_interactions: u64,
    /// `total_days`
    pub total_days: u64,
    /// `consecutive_days`
    pub consecutive_days: u64,
    /// `intimacy`
    pub intimacy: f64,
    /// `level`
    pub level: u64,
}

impl Counters {
    /// Numeric value of `var`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self, var: ConditionVar) -> f64 {
        match var {
            ConditionVar::PetCount => self.pet_count as f64,
            ConditionVar::FeedCount => self.feed_count as f64,
            ConditionVar::PlayCount => self.play_count as f64,
            ConditionVar::TotalInteractions => self.total_interactions as f64,
            ConditionVar::TotalDays => self.total_days as f64,
            ConditionVar::ConsecutiveDays => self.consecutive_days as f64,
            ConditionVar::Intimacy => self.intimacy,
            ConditionVar::Level => self.level as f64,
        }
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CompareOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    /// Apply the operator.
    #[must_use]
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Lt => lhs < rhs,
            Self::Eq => (lhs - rhs).abs() < EQ_EPSILON,
            Self::Ne => (lhs - rhs).abs() >= EQ_EPSILON,
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Op(&'static str),
    And,
    Or,
    Junk(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) | Self::Number(s) | Self::Junk(s) => f.write_str(s),
            Self::Op(s) => f.write_str(s),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
        }
    }
}

fn tokenize(source: &str) -> Vec<Token> {
    const TWO_CHAR_OPS: [&str; 4] = [">=", "<=", "==", "!="];

    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.to_ascii_uppercase().as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                _ => Token::Ident(word),
            });
            continue;
        }

        let signed = (c == '-' || c == '+') && chars.get(i + 1).is_some_and(char::is_ascii_digit);
        if c.is_ascii_digit() || signed {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
            continue;
        }

        if let Some(&next) = chars.get(i + 1) {
            let pair: String = [c, next].iter().collect();
            if let Some(&op) = TWO_CHAR_OPS.iter().find(|op| **op == pair) {
                tokens.push(Token::Op(op));
                i += 2;
                continue;
            }
        }
        match c {
            '>' => tokens.push(Token::Op(">")),
            '<' => tokens.push(Token::Op("<")),
            _ => tokens.push(Token::Junk(c.to_string())),
        }
        i += 1;
    }

    tokens
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Comparison {
    Valid {
        var: ConditionVar,
        op: CompareOp,
        value: f64,
    },
    Invalid,
}

impl Comparison {
    fn evaluate(&self, counters: &Counters) -> bool {
        match self {
            Self::Valid { var, op, value } => op.apply(counters.value(*var), *value),
            Self::Invalid => false,
        }
    }
}

/// A parsed unlock condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    disjuncts: Vec<Vec<Comparison>>,
    problems: Vec<String>,
}

impl Condition {
    /// Parse `source`. Never fails; see [`Condition::problems`].
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let tokens = tokenize(source);
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            problems: Vec::new(),
        };
        let disjuncts = parser.disjunction();
        Self {
            source: source.to_string(),
            disjuncts,
            problems: parser.problems,
        }
    }

    /// Evaluate against `counters`.
    #[must_use]
    pub fn evaluate(&self, counters: &Counters) -> bool {
        self.disjuncts
            .iter()
            .any(|conj| !conj.is_empty() && conj.iter().all(|cmp| cmp.evaluate(counters)))
    }

    /// Whether every comparison parsed cleanly.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.problems.is_empty()
    }

    /// Human-readable descriptions of each malformed part.
    #[must_use]
    pub fn problems(&self) -> &[String] {
        &self.problems
    }

    /// The original text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Parse and evaluate in one step, logging a warning for malformed input.
///
/// Prefer parsing once with [`Condition::parse`] when evaluating repeatedly.
#[must_use]
pub fn evaluate(source: &str, counters: &Counters) -> bool {
    let condition = Condition::parse(source);
    for problem in condition.problems() {
        warn!(condition = source, problem = %problem, "Malformed condition");
    }
    condition.evaluate(counters)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    problems: Vec<String>,
}

impl Parser<'_> {
    fn disjunction(&mut self) -> Vec<Vec<Comparison>> {
        if self.tokens.is_empty() {
            self.problems.push("empty condition".to_string());
            return Vec::new();
        }
        let mut disjuncts = vec![self.conjunction()];
        while self.eat(&Token::Or) {
            disjuncts.push(self.conjunction());
        }
        disjuncts
    }

    fn conjunction(&mut self) -> Vec<Comparison> {
        let mut comparisons = vec![self.comparison()];
        while self.eat(&Token::And) {
            comparisons.push(self.comparison());
        }
        comparisons
    }

    /// Consume everything up to the next keyword and judge it as a unit.
    fn comparison(&mut self) -> Comparison {
        let tokens = self.tokens;
        let start = self.pos;
        while tokens
            .get(self.pos)
            .is_some_and(|t| !matches!(t, Token::And | Token::Or))
        {
            self.pos += 1;
        }
        let parts = &tokens[start..self.pos];

        match parts {
            [Token::Ident(name), Token::Op(op), Token::Number(literal)] => {
                let Ok(var) = name.parse::<ConditionVar>() else {
                    return self.invalid(format!("unknown identifier '{name}'"));
                };
                let Some(op) = CompareOp::parse(op) else {
                    return self.invalid(format!("unknown operator '{op}'"));
                };
                match literal.parse::<f64>() {
                    Ok(value) if value.is_finite() => Comparison::Valid { var, op, value },
                    _ => self.invalid(format!("invalid number '{literal}'")),
                }
            }
            [Token::Ident(name), Token::Op(_), other] => {
                if name.parse::<ConditionVar>().is_err() {
                    self.invalid(format!("unknown identifier '{name}'"))
                } else {
                    self.invalid(format!("expected a number, found '{other}'"))
                }
            }
            [Token::Ident(_), other, ..] if !matches!(other, Token::Op(_)) => {
                self.invalid(format!("expected an operator, found '{other}'"))
            }
            [] => self.invalid("missing comparison".to_string()),
            _ => {
                let text: Vec<String> = parts.iter().map(ToString::to_string).collect();
                self.invalid(format!("malformed comparison '{}'", text.join(" ")))
            }
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.tokens.get(self.pos) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn invalid(&mut self, problem: String) -> Comparison {
        self.problems.push(problem);
        Comparison::Invalid
    }
}
