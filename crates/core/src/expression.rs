//! Restricted arithmetic expression evaluation for calculated fields.
//!
//! Formulas are arithmetic over field codes, e.g. `(HB / RBC) * 10`. The
//! evaluator supports `+ - * / ( )`, unary minus, decimal literals, and
//! identifier tokens that must resolve to entered numeric values. Nothing
//! else: no function calls, no host-language evaluation.
//!
//! A formula that fails to parse or evaluate yields `None` for that field
//! rather than an error; one bad formula must not abort the other
//! calculated fields of an entry.

use crate::report::ResultValue;
use crate::template::Template;
use std::collections::BTreeMap;

/// Why a single formula could not be evaluated.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExprError {
    #[error("unknown field '{0}' in formula")]
    UnknownField(String),
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(formula: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = formula.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

/// Recursive-descent parser/evaluator over the token stream.
///
/// Grammar:
/// ```text
/// expr   := term (('+' | '-') term)*
/// term   := factor (('*' | '/') factor)*
/// factor := NUMBER | IDENT | '(' expr ')' | '-' factor
/// ```
struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    values: &'a BTreeMap<String, f64>,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, values: &'a BTreeMap<String, f64>) -> Self {
        Self {
            tokens,
            pos: 0,
            values,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut acc = self.term()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.next();
                    acc += self.term()?;
                }
                Token::Minus => {
                    self.next();
                    acc -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut acc = self.factor()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.next();
                    acc *= self.factor()?;
                }
                Token::Slash => {
                    self.next();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    acc /= divisor;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn factor(&mut self) -> Result<f64, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Ident(name)) => self
                .values
                .get(&name)
                .copied()
                .ok_or(ExprError::UnknownField(name)),
            Some(Token::Minus) => Ok(-self.factor()?),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken(other.to_string())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(other.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// Rounds to `precision` decimal places for display stability.
pub(crate) fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Evaluates the calculated fields of a template over entered results.
#[derive(Debug, Clone)]
pub struct ExpressionEvaluator {
    precision: u32,
}

impl ExpressionEvaluator {
    /// Creates an evaluator that rounds results to `precision` decimal
    /// places.
    pub fn new(precision: u32) -> Self {
        Self { precision }
    }

    /// Evaluates one formula against a map of numeric field values.
    ///
    /// # Errors
    ///
    /// Returns an [`ExprError`] for malformed formulas, unknown or
    /// non-numeric fields, division by zero, or a non-finite result.
    pub fn evaluate(
        &self,
        formula: &str,
        values: &BTreeMap<String, f64>,
    ) -> Result<f64, ExprError> {
        let tokens = tokenize(formula)?;
        if tokens.is_empty() {
            return Err(ExprError::UnexpectedEnd);
        }
        let mut parser = Parser::new(tokens, values);
        let result = parser.expr()?;
        if let Some(extra) = parser.peek() {
            return Err(ExprError::UnexpectedToken(extra.to_string()));
        }
        if !result.is_finite() {
            return Err(ExprError::NonFinite);
        }
        Ok(round_to(result, self.precision))
    }

    /// Runs every calculated field of `template` over `results`.
    ///
    /// Fields whose formula cannot be evaluated (missing inputs, malformed
    /// expression, division by zero) yield `None` and a warning; the other
    /// fields are unaffected.
    pub fn calculate(
        &self,
        template: &Template,
        results: &BTreeMap<String, ResultValue>,
    ) -> BTreeMap<String, Option<f64>> {
        let numeric: BTreeMap<String, f64> = results
            .iter()
            .filter_map(|(code, value)| value.as_number().map(|n| (code.clone(), n)))
            .collect();

        let mut calculated = BTreeMap::new();
        for field in &template.calculated_fields {
            match self.evaluate(&field.formula, &numeric) {
                Ok(value) => {
                    calculated.insert(field.code.clone(), Some(value));
                }
                Err(err) => {
                    tracing::warn!(
                        field = %field.code,
                        formula = %field.formula,
                        %err,
                        "calculated field skipped"
                    );
                    calculated.insert(field.code.clone(), None);
                }
            }
        }
        calculated
    }
}
